//! Domain types shared by the storage layer and the HTTP application.
//!
//! Everything here is plain data: enums persisted as text, the DTO shapes the
//! API returns, request payloads with their validation rules and paging.

pub mod paging;
pub mod requests;
pub mod types;

pub use paging::{JobFilter, JobQuery, Page};
pub use requests::ValidationError;
