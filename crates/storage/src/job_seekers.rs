use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use jobboard_core::types::JobSeekerDto;

use crate::{classify_delete, classify_write, expect_affected, new_id, to_rfc3339, RepositoryError};

const JOB_SEEKER_COLUMNS: &str = "id, user_id, headline, summary, location, skills_json, experience_years, created_at, updated_at";

/// Repository for job seeker profiles.
#[derive(Clone)]
pub struct JobSeekerRepository {
    pub(crate) pool: SqlitePool,
}

/// Editable job seeker profile fields.
pub struct JobSeekerFields<'a> {
    pub headline: Option<&'a str>,
    pub summary: Option<&'a str>,
    pub location: Option<&'a str>,
    pub skills: &'a [String],
    pub experience_years: Option<u32>,
}

pub struct NewJobSeeker<'a> {
    pub user_id: &'a str,
    pub fields: JobSeekerFields<'a>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct JobSeekerRow {
    id: String,
    user_id: String,
    headline: Option<String>,
    summary: Option<String>,
    location: Option<String>,
    skills_json: String,
    experience_years: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl JobSeekerRow {
    fn into_domain(self) -> Result<JobSeekerDto, RepositoryError> {
        let skills: Vec<String> = serde_json::from_str(&self.skills_json)?;
        let experience_years = self
            .experience_years
            .map(u32::try_from)
            .transpose()
            .map_err(|err| RepositoryError::Decode(format!("experience_years: {err}")))?;
        Ok(JobSeekerDto {
            id: self.id,
            user_id: self.user_id,
            headline: self.headline,
            summary: self.summary,
            location: self.location,
            skills,
            experience_years,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl JobSeekerRepository {
    /// Inserts a profile. A user owns at most one job seeker profile.
    pub async fn insert(&self, record: &NewJobSeeker<'_>) -> Result<JobSeekerDto, RepositoryError> {
        let id = new_id();
        let created_at = to_rfc3339(record.created_at);
        let skills_json = serde_json::to_string(record.fields.skills)?;
        sqlx::query(
            "INSERT INTO job_seekers \
             (id, user_id, headline, summary, location, skills_json, experience_years, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(record.user_id)
        .bind(record.fields.headline)
        .bind(record.fields.summary)
        .bind(record.fields.location)
        .bind(&skills_json)
        .bind(record.fields.experience_years.map(i64::from))
        .bind(&created_at)
        .bind(&created_at)
        .execute(&self.pool)
        .await
        .map_err(|err| classify_write(err, "user already has a job seeker profile"))?;

        self.find(&id).await
    }

    pub async fn find(&self, id: &str) -> Result<JobSeekerDto, RepositoryError> {
        let sql = format!("SELECT {JOB_SEEKER_COLUMNS} FROM job_seekers WHERE id = ?");
        let row = sqlx::query_as::<_, JobSeekerRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        row.into_domain()
    }

    pub async fn find_by_user(&self, user_id: &str) -> Result<JobSeekerDto, RepositoryError> {
        let sql = format!("SELECT {JOB_SEEKER_COLUMNS} FROM job_seekers WHERE user_id = ?");
        let row = sqlx::query_as::<_, JobSeekerRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        row.into_domain()
    }

    pub async fn list(&self) -> Result<Vec<JobSeekerDto>, RepositoryError> {
        let sql = format!("SELECT {JOB_SEEKER_COLUMNS} FROM job_seekers ORDER BY created_at DESC, rowid DESC");
        let rows = sqlx::query_as::<_, JobSeekerRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(JobSeekerRow::into_domain).collect()
    }

    pub async fn update(
        &self,
        id: &str,
        fields: &JobSeekerFields<'_>,
        updated_at: DateTime<Utc>,
    ) -> Result<JobSeekerDto, RepositoryError> {
        let skills_json = serde_json::to_string(fields.skills)?;
        let result = sqlx::query(
            "UPDATE job_seekers \
             SET headline = ?, summary = ?, location = ?, skills_json = ?, experience_years = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(fields.headline)
        .bind(fields.summary)
        .bind(fields.location)
        .bind(&skills_json)
        .bind(fields.experience_years.map(i64::from))
        .bind(to_rfc3339(updated_at))
        .bind(id)
        .execute(&self.pool)
        .await?;
        expect_affected(result.rows_affected())?;

        self.find(id).await
    }

    /// Deletes a profile together with its resumes and applications.
    pub async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM job_seekers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(classify_delete)?;
        expect_affected(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use jobboard_core::types::Role;

    #[tokio::test]
    async fn skills_survive_storage() {
        let db = setup_db().await;
        let user_id = insert_user(&db, "seeker@example.com", Role::JobSeeker).await;
        let skills = vec!["Rust".to_string(), "SQL".to_string()];
        let repo = db.job_seekers();

        let seeker = repo
            .insert(&NewJobSeeker {
                user_id: &user_id,
                fields: JobSeekerFields {
                    headline: Some("Systems programmer"),
                    summary: None,
                    location: Some("Lisbon"),
                    skills: &skills,
                    experience_years: Some(7),
                },
                created_at: ts(0),
            })
            .await
            .expect("insert");
        assert_eq!(seeker.skills, skills);
        assert_eq!(seeker.experience_years, Some(7));

        let loaded = repo.find_by_user(&user_id).await.expect("find by user");
        assert_eq!(loaded, seeker);
    }

    #[tokio::test]
    async fn second_profile_conflicts_and_update_replaces() {
        let db = setup_db().await;
        let (user_id, seeker_id) = insert_job_seeker(&db, "seeker@example.com").await;
        let repo = db.job_seekers();

        let err = repo
            .insert(&NewJobSeeker {
                user_id: &user_id,
                fields: JobSeekerFields {
                    headline: None,
                    summary: None,
                    location: None,
                    skills: &[],
                    experience_years: None,
                },
                created_at: ts(0),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        let skills = vec!["Go".to_string()];
        let updated = repo
            .update(
                &seeker_id,
                &JobSeekerFields {
                    headline: Some("Gopher"),
                    summary: Some("Likes channels"),
                    location: None,
                    skills: &skills,
                    experience_years: Some(2),
                },
                ts(30),
            )
            .await
            .expect("update");
        assert_eq!(updated.headline.as_deref(), Some("Gopher"));
        assert_eq!(updated.skills, skills);
        assert_eq!(updated.updated_at, ts(30));
        assert_eq!(repo.list().await.expect("list").len(), 1);
    }
}
