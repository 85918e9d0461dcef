use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use jobboard_core::types::{ApplicationDto, ApplicationStatus};

use crate::{classify_delete, classify_write, expect_affected, new_id, to_rfc3339, RepositoryError};

const APPLICATION_SELECT: &str = "SELECT a.id, a.job_id, j.title AS job_title, a.job_seeker_id, a.resume_id, \
     a.cover_letter, a.status, a.created_at, a.updated_at, \
     s.user_id AS applicant_user_id, e.user_id AS employer_user_id \
     FROM applications AS a \
     JOIN jobs AS j ON j.id = a.job_id \
     JOIN employers AS e ON e.id = j.employer_id \
     JOIN job_seekers AS s ON s.id = a.job_seeker_id";

/// Repository for job applications.
#[derive(Clone)]
pub struct ApplicationRepository {
    pub(crate) pool: SqlitePool,
}

pub struct NewApplication<'a> {
    pub job_id: &'a str,
    pub job_seeker_id: &'a str,
    pub resume_id: &'a str,
    pub cover_letter: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

/// Full replacement of the mutable columns; callers merge partial edits first.
pub struct ApplicationUpdate<'a> {
    pub resume_id: &'a str,
    pub cover_letter: Option<&'a str>,
    pub status: ApplicationStatus,
    pub updated_at: DateTime<Utc>,
}

/// An application together with the accounts on both sides of it.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationRecord {
    pub application: ApplicationDto,
    pub applicant_user_id: String,
    pub employer_user_id: String,
}

#[derive(Debug, sqlx::FromRow)]
struct ApplicationRow {
    id: String,
    job_id: String,
    job_title: String,
    job_seeker_id: String,
    resume_id: String,
    cover_letter: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    applicant_user_id: String,
    employer_user_id: String,
}

impl ApplicationRow {
    fn into_domain(self) -> Result<ApplicationRecord, RepositoryError> {
        Ok(ApplicationRecord {
            application: ApplicationDto {
                id: self.id,
                job_id: self.job_id,
                job_title: self.job_title,
                job_seeker_id: self.job_seeker_id,
                resume_id: self.resume_id,
                cover_letter: self.cover_letter,
                status: self.status.parse()?,
                applied_at: self.created_at,
                updated_at: self.updated_at,
            },
            applicant_user_id: self.applicant_user_id,
            employer_user_id: self.employer_user_id,
        })
    }
}

impl ApplicationRepository {
    /// Inserts a pending application. A job seeker applies to a job at most once.
    pub async fn insert(&self, record: &NewApplication<'_>) -> Result<ApplicationRecord, RepositoryError> {
        let id = new_id();
        let created_at = to_rfc3339(record.created_at);
        sqlx::query(
            "INSERT INTO applications \
             (id, job_id, job_seeker_id, resume_id, cover_letter, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(record.job_id)
        .bind(record.job_seeker_id)
        .bind(record.resume_id)
        .bind(record.cover_letter)
        .bind(ApplicationStatus::Pending.as_str())
        .bind(&created_at)
        .bind(&created_at)
        .execute(&self.pool)
        .await
        .map_err(|err| classify_write(err, "already applied to this job"))?;

        self.find(&id).await
    }

    pub async fn find(&self, id: &str) -> Result<ApplicationRecord, RepositoryError> {
        let sql = format!("{APPLICATION_SELECT} WHERE a.id = ?");
        let row = sqlx::query_as::<_, ApplicationRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        row.into_domain()
    }

    pub async fn list_for_job(&self, job_id: &str) -> Result<Vec<ApplicationDto>, RepositoryError> {
        self.list_where("a.job_id", job_id).await
    }

    pub async fn list_for_job_seeker(&self, job_seeker_id: &str) -> Result<Vec<ApplicationDto>, RepositoryError> {
        self.list_where("a.job_seeker_id", job_seeker_id).await
    }

    async fn list_where(&self, column: &'static str, value: &str) -> Result<Vec<ApplicationDto>, RepositoryError> {
        let sql = format!("{APPLICATION_SELECT} WHERE {column} = ? ORDER BY a.created_at DESC, a.rowid DESC");
        let rows = sqlx::query_as::<_, ApplicationRow>(&sql)
            .bind(value)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| row.into_domain().map(|record| record.application))
            .collect()
    }

    pub async fn update(&self, id: &str, change: &ApplicationUpdate<'_>) -> Result<ApplicationRecord, RepositoryError> {
        let result = sqlx::query(
            "UPDATE applications SET resume_id = ?, cover_letter = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(change.resume_id)
        .bind(change.cover_letter)
        .bind(change.status.as_str())
        .bind(to_rfc3339(change.updated_at))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|err| classify_write(err, "application conflicts with an existing row"))?;
        expect_affected(result.rows_affected())?;

        self.find(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM applications WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(classify_delete)?;
        expect_affected(result.rows_affected())
    }
}
