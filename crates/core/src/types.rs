use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised when a persisted enum column holds an unknown value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Returns the canonical database representation.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(
    /// Account role carried in the `role` token claim.
    Role, "role", {
        Admin => "Admin",
        Employer => "Employer",
        JobSeeker => "JobSeeker",
    }
);

text_enum!(
    EmploymentType, "employment type", {
        FullTime => "FullTime",
        PartTime => "PartTime",
        Contract => "Contract",
        Internship => "Internship",
        Temporary => "Temporary",
    }
);

text_enum!(
    /// Publication state of a job posting. Only `Open` jobs accept applications.
    JobStatus, "job status", {
        Open => "Open",
        Closed => "Closed",
        Draft => "Draft",
    }
);

text_enum!(
    ApplicationStatus, "application status", {
        Pending => "Pending",
        Reviewed => "Reviewed",
        Interviewing => "Interviewing",
        Offered => "Offered",
        Rejected => "Rejected",
        Withdrawn => "Withdrawn",
    }
);

text_enum!(
    NotificationKind, "notification kind", {
        ApplicationReceived => "ApplicationReceived",
        ApplicationUpdated => "ApplicationUpdated",
        ApplicationStatusChanged => "ApplicationStatusChanged",
        System => "System",
    }
);

impl Default for JobStatus {
    fn default() -> Self {
        Self::Open
    }
}

impl Default for NotificationKind {
    fn default() -> Self {
        Self::System
    }
}

impl ApplicationStatus {
    /// Statuses the owning employer is allowed to set.
    pub fn is_employer_decision(self) -> bool {
        !matches!(self, Self::Pending | Self::Withdrawn)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserDto {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployerDto {
    pub id: String,
    pub user_id: String,
    pub company_name: String,
    pub description: Option<String>,
    pub website: Option<String>,
    pub location: Option<String>,
    pub industry: Option<String>,
    pub logo_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSeekerDto {
    pub id: String,
    pub user_id: String,
    pub headline: Option<String>,
    pub summary: Option<String>,
    pub location: Option<String>,
    pub skills: Vec<String>,
    pub experience_years: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDto {
    pub id: String,
    pub employer_id: String,
    pub company_name: String,
    pub title: String,
    pub description: String,
    pub requirements: Option<String>,
    pub location: Option<String>,
    pub employment_type: EmploymentType,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub status: JobStatus,
    pub closing_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A job resolved together with the account that owns its employer profile.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOwner {
    pub job: JobDto,
    pub employer_user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDto {
    pub id: String,
    pub job_id: String,
    pub job_title: String,
    pub job_seeker_id: String,
    pub resume_id: String,
    pub cover_letter: Option<String>,
    pub status: ApplicationStatus,
    pub applied_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeDto {
    pub id: String,
    pub job_seeker_id: String,
    pub title: String,
    pub file_url: Option<String>,
    pub content: Option<String>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDto {
    pub id: String,
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_id: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
