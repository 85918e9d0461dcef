mod applications;
mod employers;
mod job_seekers;
mod jobs;
mod notifications;
mod resumes;
mod users;

use std::{str::FromStr, time::Duration};

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    migrate::MigrateError,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    SqlitePool,
};
use thiserror::Error;
use uuid::Uuid;

use jobboard_core::types::UnknownVariant;

pub use applications::{ApplicationRecord, ApplicationRepository, ApplicationUpdate, NewApplication};
pub use employers::{EmployerFields, EmployerRepository, NewEmployer};
pub use job_seekers::{JobSeekerFields, JobSeekerRepository, NewJobSeeker};
pub use jobs::{JobFields, JobRepository, NewJob};
pub use notifications::{NewNotification, NotificationRepository};
pub use resumes::{NewResume, ResumeFields, ResumeRepository};
pub use users::{NewUser, StoredUser, UserRepository, UserUpdate};

const SQLITE_CONSTRAINT_FOREIGNKEY: &str = "787";
const SQLITE_CONSTRAINT_PRIMARYKEY: &str = "1555";
const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        Self::connect_with(database_url, 5).await
    }

    /// Same as [`Database::connect`] with an explicit pool size.
    pub async fn connect_with(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(StorageError::Connect)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(StorageError::Connect)?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a handle for account rows.
    pub fn users(&self) -> UserRepository {
        UserRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for employer profiles.
    pub fn employers(&self) -> EmployerRepository {
        EmployerRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for job seeker profiles.
    pub fn job_seekers(&self) -> JobSeekerRepository {
        JobSeekerRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for job postings.
    pub fn jobs(&self) -> JobRepository {
        JobRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for job applications.
    pub fn applications(&self) -> ApplicationRepository {
        ApplicationRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for resumes.
    pub fn resumes(&self) -> ResumeRepository {
        ResumeRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for user notifications.
    pub fn notifications(&self) -> NotificationRepository {
        NotificationRepository {
            pool: self.pool.clone(),
        }
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors shared by every repository.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(&'static str),
    #[error("referenced record does not exist")]
    MissingReference,
    #[error("record is still referenced by other rows")]
    InUse,
    #[error("failed to decode stored value: {0}")]
    Decode(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<UnknownVariant> for RepositoryError {
    fn from(err: UnknownVariant) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Maps constraint violations raised by inserts and updates.
fn classify_write(err: sqlx::Error, conflict: &'static str) -> RepositoryError {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|code| code.into_owned());
            match code.as_deref() {
                Some(SQLITE_CONSTRAINT_UNIQUE) | Some(SQLITE_CONSTRAINT_PRIMARYKEY) => {
                    RepositoryError::Conflict(conflict)
                }
                Some(SQLITE_CONSTRAINT_FOREIGNKEY) => RepositoryError::MissingReference,
                _ => RepositoryError::Database(sqlx::Error::Database(db_err)),
            }
        }
        other => RepositoryError::Database(other),
    }
}

/// Maps foreign key violations raised by deletes.
fn classify_delete(err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::Database(db_err)
            if db_err.code().as_deref() == Some(SQLITE_CONSTRAINT_FOREIGNKEY) =>
        {
            RepositoryError::InUse
        }
        other => RepositoryError::Database(other),
    }
}

/// Turns a zero-row write into `NotFound`.
fn expect_affected(rows: u64) -> Result<(), RepositoryError> {
    if rows == 0 {
        Err(RepositoryError::NotFound)
    } else {
        Ok(())
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn to_rfc3339_opt(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(to_rfc3339)
}
