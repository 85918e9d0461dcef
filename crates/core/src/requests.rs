use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ApplicationStatus, EmploymentType, JobStatus, NotificationKind, Role, UserDto};

pub const MIN_PASSWORD_LEN: usize = 8;
const MAX_TEXT_LEN: usize = 200;

/// Payload rejected before it reaches storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self(message.into())
    }
}

/// Lowercases and trims an email address, returning an error when it is malformed.
pub fn normalize_email(raw: &str) -> Result<String, ValidationError> {
    let email = raw.trim().to_lowercase();
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ValidationError::new("email must be a valid address"));
    };
    let malformed = local.is_empty()
        || domain.len() < 3
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || domain.contains('@')
        || email.chars().any(char::is_whitespace);
    if malformed {
        return Err(ValidationError::new("email must be a valid address"));
    }
    Ok(email)
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::new(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Trims an optional field, treating blank input as absent.
pub fn optional_text(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn require_text(field: &str, value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new(format!("{field} is required")));
    }
    if trimmed.chars().count() > MAX_TEXT_LEN {
        return Err(ValidationError::new(format!(
            "{field} must be at most {MAX_TEXT_LEN} characters"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub role: Role,
}

impl RegisterUserRequest {
    /// Validates the payload and returns the normalized email.
    pub fn validate(&self) -> Result<String, ValidationError> {
        let email = normalize_email(&self.email)?;
        validate_password(&self.password)?;
        require_text("firstName", &self.first_name)?;
        require_text("lastName", &self.last_name)?;
        if self.role == Role::Admin {
            return Err(ValidationError::new(
                "role must be either Employer or JobSeeker",
            ));
        }
        Ok(email)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserDto,
}

/// Profile update. `role` and `isActive` are honoured for administrators only.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl UpdateUserRequest {
    pub fn validate(&self) -> Result<String, ValidationError> {
        let email = normalize_email(&self.email)?;
        require_text("firstName", &self.first_name)?;
        require_text("lastName", &self.last_name)?;
        Ok(email)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

impl ChangePasswordRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_password(&self.new_password)?;
        if self.new_password == self.current_password {
            return Err(ValidationError::new(
                "new password must differ from the current password",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployerProfile {
    pub company_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
}

impl EmployerProfile {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("companyName", &self.company_name)?;
        if let Some(website) = self.website.as_deref() {
            if !(website.starts_with("http://") || website.starts_with("https://")) {
                return Err(ValidationError::new(
                    "website must start with http:// or https://",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEmployerRequest {
    pub user_id: String,
    #[serde(flatten)]
    pub profile: EmployerProfile,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSeekerProfile {
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub experience_years: Option<u32>,
}

impl JobSeekerProfile {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(headline) = self.headline.as_deref() {
            require_text("headline", headline)?;
        }
        if self.skills.iter().any(|skill| skill.trim().is_empty()) {
            return Err(ValidationError::new("skills must not contain empty entries"));
        }
        if matches!(self.experience_years, Some(years) if years > 70) {
            return Err(ValidationError::new("experienceYears is out of range"));
        }
        Ok(())
    }

    /// Trims skills and drops case-insensitive duplicates, keeping first occurrences.
    pub fn normalized_skills(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::with_capacity(self.skills.len());
        let mut skills = Vec::with_capacity(self.skills.len());
        for skill in &self.skills {
            let trimmed = skill.trim();
            let key = trimmed.to_lowercase();
            if !seen.contains(&key) {
                seen.push(key);
                skills.push(trimmed.to_string());
            }
        }
        skills
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobSeekerRequest {
    pub user_id: String,
    #[serde(flatten)]
    pub profile: JobSeekerProfile,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDraft {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub requirements: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub employment_type: EmploymentType,
    #[serde(default)]
    pub salary_min: Option<i64>,
    #[serde(default)]
    pub salary_max: Option<i64>,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub closing_date: Option<DateTime<Utc>>,
}

impl JobDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("title", &self.title)?;
        if self.description.trim().is_empty() {
            return Err(ValidationError::new("description is required"));
        }
        if self.salary_min.is_some_and(|v| v < 0) || self.salary_max.is_some_and(|v| v < 0) {
            return Err(ValidationError::new("salaries must not be negative"));
        }
        if let (Some(min), Some(max)) = (self.salary_min, self.salary_max) {
            if min > max {
                return Err(ValidationError::new(
                    "salaryMin must not exceed salaryMax",
                ));
            }
        }
        Ok(())
    }

    pub fn status_or_default(&self) -> JobStatus {
        self.status.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub employer_id: String,
    #[serde(flatten)]
    pub draft: JobDraft,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApplicationRequest {
    pub job_id: String,
    pub job_seeker_id: String,
    pub resume_id: String,
    #[serde(default)]
    pub cover_letter: Option<String>,
}

/// Partial update of an application; absent fields stay unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateApplicationRequest {
    #[serde(default)]
    pub status: Option<ApplicationStatus>,
    #[serde(default)]
    pub cover_letter: Option<String>,
    #[serde(default)]
    pub resume_id: Option<String>,
}

impl UpdateApplicationRequest {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.cover_letter.is_none() && self.resume_id.is_none()
    }

    /// Whether the payload touches fields reserved for the applicant.
    pub fn touches_applicant_fields(&self) -> bool {
        self.cover_letter.is_some()
            || self.resume_id.is_some()
            || self.status == Some(ApplicationStatus::Withdrawn)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeDraft {
    pub title: String,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

impl ResumeDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("title", &self.title)?;
        let has_file = self.file_url.as_deref().is_some_and(|v| !v.trim().is_empty());
        let has_content = self.content.as_deref().is_some_and(|v| !v.trim().is_empty());
        if !has_file && !has_content {
            return Err(ValidationError::new(
                "either fileUrl or content must be provided",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResumeRequest {
    pub job_seeker_id: String,
    #[serde(flatten)]
    pub draft: ResumeDraft,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotificationRequest {
    pub user_id: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub kind: NotificationKind,
    #[serde(default)]
    pub related_id: Option<String>,
}

impl CreateNotificationRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("title", &self.title)?;
        if self.message.trim().is_empty() {
            return Err(ValidationError::new("message is required"));
        }
        Ok(())
    }
}
