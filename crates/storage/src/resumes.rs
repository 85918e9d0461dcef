use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use jobboard_core::types::ResumeDto;

use crate::{classify_delete, classify_write, expect_affected, new_id, to_rfc3339, RepositoryError};

const RESUME_COLUMNS: &str =
    "id, job_seeker_id, title, file_url, content, is_default, created_at, updated_at";

/// Repository for resumes.
///
/// Every mutation that touches `is_default` runs in a transaction so a job
/// seeker never ends up with two default resumes, and never with zero while
/// at least one resume exists.
#[derive(Clone)]
pub struct ResumeRepository {
    pub(crate) pool: SqlitePool,
}

pub struct ResumeFields<'a> {
    pub title: &'a str,
    pub file_url: Option<&'a str>,
    pub content: Option<&'a str>,
}

pub struct NewResume<'a> {
    pub job_seeker_id: &'a str,
    pub fields: ResumeFields<'a>,
    /// Requests the default flag. The first resume of a job seeker is always default.
    pub make_default: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct ResumeRow {
    id: String,
    job_seeker_id: String,
    title: String,
    file_url: Option<String>,
    content: Option<String>,
    is_default: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ResumeRow> for ResumeDto {
    fn from(row: ResumeRow) -> Self {
        Self {
            id: row.id,
            job_seeker_id: row.job_seeker_id,
            title: row.title,
            file_url: row.file_url,
            content: row.content,
            is_default: row.is_default,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

async fn clear_default(
    tx: &mut Transaction<'_, Sqlite>,
    job_seeker_id: &str,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE resumes SET is_default = 0 WHERE job_seeker_id = ? AND is_default = 1")
        .bind(job_seeker_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn owner_of(
    tx: &mut Transaction<'_, Sqlite>,
    id: &str,
) -> Result<(String, bool), RepositoryError> {
    let row = sqlx::query("SELECT job_seeker_id, is_default FROM resumes WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;
    Ok((row.get("job_seeker_id"), row.get("is_default")))
}

impl ResumeRepository {
    pub async fn insert(&self, record: &NewResume<'_>) -> Result<ResumeDto, RepositoryError> {
        let id = new_id();
        let created_at = to_rfc3339(record.created_at);
        let mut tx = self.pool.begin().await?;

        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM resumes WHERE job_seeker_id = ?")
            .bind(record.job_seeker_id)
            .fetch_one(&mut *tx)
            .await?;
        let is_default = record.make_default || existing == 0;
        if is_default {
            clear_default(&mut tx, record.job_seeker_id).await?;
        }

        sqlx::query(
            "INSERT INTO resumes \
             (id, job_seeker_id, title, file_url, content, is_default, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(record.job_seeker_id)
        .bind(record.fields.title)
        .bind(record.fields.file_url)
        .bind(record.fields.content)
        .bind(is_default)
        .bind(&created_at)
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .map_err(|err| classify_write(err, "job seeker already has a default resume"))?;

        tx.commit().await?;
        self.find(&id).await
    }

    pub async fn find(&self, id: &str) -> Result<ResumeDto, RepositoryError> {
        let sql = format!("SELECT {RESUME_COLUMNS} FROM resumes WHERE id = ?");
        let row = sqlx::query_as::<_, ResumeRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        Ok(row.into())
    }

    /// Lists resumes with the default first, then most recently updated.
    pub async fn list_for_job_seeker(&self, job_seeker_id: &str) -> Result<Vec<ResumeDto>, RepositoryError> {
        let sql = format!(
            "SELECT {RESUME_COLUMNS} FROM resumes WHERE job_seeker_id = ? \
             ORDER BY is_default DESC, updated_at DESC, rowid DESC"
        );
        let rows = sqlx::query_as::<_, ResumeRow>(&sql)
            .bind(job_seeker_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(ResumeDto::from).collect())
    }

    /// Replaces the editable fields; `make_default` moves the default flag onto this resume.
    pub async fn update(
        &self,
        id: &str,
        fields: &ResumeFields<'_>,
        make_default: bool,
        updated_at: DateTime<Utc>,
    ) -> Result<ResumeDto, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let (job_seeker_id, is_default) = owner_of(&mut tx, id).await?;
        if make_default && !is_default {
            clear_default(&mut tx, &job_seeker_id).await?;
        }

        sqlx::query(
            "UPDATE resumes SET title = ?, file_url = ?, content = ?, is_default = ?, updated_at = ? WHERE id = ?",
        )
        .bind(fields.title)
        .bind(fields.file_url)
        .bind(fields.content)
        .bind(is_default || make_default)
        .bind(to_rfc3339(updated_at))
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.find(id).await
    }

    pub async fn set_default(&self, id: &str, updated_at: DateTime<Utc>) -> Result<ResumeDto, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let (job_seeker_id, is_default) = owner_of(&mut tx, id).await?;
        if !is_default {
            clear_default(&mut tx, &job_seeker_id).await?;
            let result = sqlx::query("UPDATE resumes SET is_default = 1, updated_at = ? WHERE id = ?")
                .bind(to_rfc3339(updated_at))
                .bind(id)
                .execute(&mut *tx)
                .await?;
            expect_affected(result.rows_affected())?;
        }
        tx.commit().await?;
        self.find(id).await
    }

    /// Deletes a resume. Fails with `InUse` while an application references it.
    /// When the default is removed the most recently updated remaining resume takes over.
    pub async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let (job_seeker_id, was_default) = owner_of(&mut tx, id).await?;

        sqlx::query("DELETE FROM resumes WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(classify_delete)?;

        if was_default {
            sqlx::query(
                "UPDATE resumes SET is_default = 1 WHERE id = \
                 (SELECT id FROM resumes WHERE job_seeker_id = ? ORDER BY updated_at DESC, rowid DESC LIMIT 1)",
            )
            .bind(&job_seeker_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Whether the resume was submitted with an application to a job owned by `employer_user_id`.
    pub async fn is_shared_with_employer(
        &self,
        id: &str,
        employer_user_id: &str,
    ) -> Result<bool, RepositoryError> {
        let shared: i64 = sqlx::query_scalar(
            "SELECT EXISTS( \
                 SELECT 1 FROM applications AS a \
                 JOIN jobs AS j ON j.id = a.job_id \
                 JOIN employers AS e ON e.id = j.employer_id \
                 WHERE a.resume_id = ? AND e.user_id = ?)",
        )
        .bind(id)
        .bind(employer_user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(shared != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use crate::NewApplication;

    fn resume<'a>(job_seeker_id: &'a str, title: &'a str, make_default: bool, at: i64) -> NewResume<'a> {
        NewResume {
            job_seeker_id,
            fields: ResumeFields {
                title,
                file_url: Some("https://files.test/cv.pdf"),
                content: None,
            },
            make_default,
            created_at: ts(at),
        }
    }

    async fn defaults(db: &crate::Database, job_seeker_id: &str) -> Vec<String> {
        db.resumes()
            .list_for_job_seeker(job_seeker_id)
            .await
            .expect("list")
            .into_iter()
            .filter(|r| r.is_default)
            .map(|r| r.title)
            .collect()
    }

    #[tokio::test]
    async fn first_resume_becomes_default() {
        let db = setup_db().await;
        let (_, seeker) = insert_job_seeker(&db, "seeker@example.com").await;
        let repo = db.resumes();

        let first = repo.insert(&resume(&seeker, "First", false, 0)).await.expect("insert");
        assert!(first.is_default);
        let second = repo.insert(&resume(&seeker, "Second", false, 1)).await.expect("insert");
        assert!(!second.is_default);

        assert_eq!(defaults(&db, &seeker).await, vec!["First"]);
    }

    #[tokio::test]
    async fn explicit_default_moves_flag() {
        let db = setup_db().await;
        let (_, seeker) = insert_job_seeker(&db, "seeker@example.com").await;
        let repo = db.resumes();
        repo.insert(&resume(&seeker, "First", false, 0)).await.expect("insert");
        let second = repo.insert(&resume(&seeker, "Second", true, 1)).await.expect("insert");
        assert!(second.is_default);
        assert_eq!(defaults(&db, &seeker).await, vec!["Second"]);

        let third = repo.insert(&resume(&seeker, "Third", false, 2)).await.expect("insert");
        repo.set_default(&third.id, ts(3)).await.expect("set default");
        assert_eq!(defaults(&db, &seeker).await, vec!["Third"]);

        let fields = ResumeFields {
            title: "First (updated)",
            file_url: None,
            content: Some("Plain text resume"),
        };
        let listed = repo.list_for_job_seeker(&seeker).await.expect("list");
        let first_id = listed
            .iter()
            .find(|r| r.title == "First")
            .map(|r| r.id.clone())
            .expect("first present");
        let updated = repo.update(&first_id, &fields, true, ts(4)).await.expect("update");
        assert!(updated.is_default);
        assert_eq!(updated.content.as_deref(), Some("Plain text resume"));
        assert_eq!(defaults(&db, &seeker).await, vec!["First (updated)"]);
    }

    #[tokio::test]
    async fn deleting_default_promotes_latest_remaining() {
        let db = setup_db().await;
        let (_, seeker) = insert_job_seeker(&db, "seeker@example.com").await;
        let repo = db.resumes();
        let first = repo.insert(&resume(&seeker, "First", false, 0)).await.expect("insert");
        repo.insert(&resume(&seeker, "Second", false, 1)).await.expect("insert");
        repo.insert(&resume(&seeker, "Third", false, 2)).await.expect("insert");

        repo.delete(&first.id).await.expect("delete");
        assert_eq!(defaults(&db, &seeker).await, vec!["Third"]);
        assert!(matches!(repo.delete(&first.id).await, Err(RepositoryError::NotFound)));
    }

    #[tokio::test]
    async fn referenced_resume_cannot_be_deleted() {
        let db = setup_db().await;
        let (employer_user, employer_id) = insert_employer(&db, "boss@example.com").await;
        let (_, seeker) = insert_job_seeker(&db, "seeker@example.com").await;
        let job_id = insert_job(&db, &employer_id, "Engineer", 0).await;
        let resume_id = insert_resume(&db, &seeker, "CV").await;
        db.applications()
            .insert(&NewApplication {
                job_id: &job_id,
                job_seeker_id: &seeker,
                resume_id: &resume_id,
                cover_letter: None,
                created_at: ts(5),
            })
            .await
            .expect("apply");

        let err = db.resumes().delete(&resume_id).await.unwrap_err();
        assert!(matches!(err, RepositoryError::InUse));
        assert!(db
            .resumes()
            .is_shared_with_employer(&resume_id, &employer_user)
            .await
            .expect("shared"));
        assert!(!db
            .resumes()
            .is_shared_with_employer(&resume_id, "someone-else")
            .await
            .expect("shared"));
    }
}
