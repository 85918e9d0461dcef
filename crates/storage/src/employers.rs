use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use jobboard_core::types::EmployerDto;

use crate::{classify_delete, classify_write, expect_affected, new_id, to_rfc3339, RepositoryError};

const EMPLOYER_COLUMNS: &str = "id, user_id, company_name, description, website, location, industry, logo_url, created_at, updated_at";

/// Repository for employer profiles.
#[derive(Clone)]
pub struct EmployerRepository {
    pub(crate) pool: SqlitePool,
}

/// Editable employer profile fields.
pub struct EmployerFields<'a> {
    pub company_name: &'a str,
    pub description: Option<&'a str>,
    pub website: Option<&'a str>,
    pub location: Option<&'a str>,
    pub industry: Option<&'a str>,
    pub logo_url: Option<&'a str>,
}

pub struct NewEmployer<'a> {
    pub user_id: &'a str,
    pub fields: EmployerFields<'a>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct EmployerRow {
    id: String,
    user_id: String,
    company_name: String,
    description: Option<String>,
    website: Option<String>,
    location: Option<String>,
    industry: Option<String>,
    logo_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<EmployerRow> for EmployerDto {
    fn from(row: EmployerRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            company_name: row.company_name,
            description: row.description,
            website: row.website,
            location: row.location,
            industry: row.industry,
            logo_url: row.logo_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl EmployerRepository {
    /// Inserts a profile. A user owns at most one employer profile.
    pub async fn insert(&self, record: &NewEmployer<'_>) -> Result<EmployerDto, RepositoryError> {
        let id = new_id();
        let created_at = to_rfc3339(record.created_at);
        sqlx::query(
            "INSERT INTO employers \
             (id, user_id, company_name, description, website, location, industry, logo_url, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(record.user_id)
        .bind(record.fields.company_name)
        .bind(record.fields.description)
        .bind(record.fields.website)
        .bind(record.fields.location)
        .bind(record.fields.industry)
        .bind(record.fields.logo_url)
        .bind(&created_at)
        .bind(&created_at)
        .execute(&self.pool)
        .await
        .map_err(|err| classify_write(err, "user already has an employer profile"))?;

        self.find(&id).await
    }

    pub async fn find(&self, id: &str) -> Result<EmployerDto, RepositoryError> {
        let sql = format!("SELECT {EMPLOYER_COLUMNS} FROM employers WHERE id = ?");
        let row = sqlx::query_as::<_, EmployerRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        Ok(row.into())
    }

    pub async fn find_by_user(&self, user_id: &str) -> Result<EmployerDto, RepositoryError> {
        let sql = format!("SELECT {EMPLOYER_COLUMNS} FROM employers WHERE user_id = ?");
        let row = sqlx::query_as::<_, EmployerRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        Ok(row.into())
    }

    pub async fn list(&self) -> Result<Vec<EmployerDto>, RepositoryError> {
        let sql = format!("SELECT {EMPLOYER_COLUMNS} FROM employers ORDER BY company_name, id");
        let rows = sqlx::query_as::<_, EmployerRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(EmployerDto::from).collect())
    }

    /// Replaces the profile fields.
    pub async fn update(
        &self,
        id: &str,
        fields: &EmployerFields<'_>,
        updated_at: DateTime<Utc>,
    ) -> Result<EmployerDto, RepositoryError> {
        let result = sqlx::query(
            "UPDATE employers \
             SET company_name = ?, description = ?, website = ?, location = ?, industry = ?, logo_url = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(fields.company_name)
        .bind(fields.description)
        .bind(fields.website)
        .bind(fields.location)
        .bind(fields.industry)
        .bind(fields.logo_url)
        .bind(to_rfc3339(updated_at))
        .bind(id)
        .execute(&self.pool)
        .await?;
        expect_affected(result.rows_affected())?;

        self.find(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM employers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(classify_delete)?;
        expect_affected(result.rows_affected())
    }
}
