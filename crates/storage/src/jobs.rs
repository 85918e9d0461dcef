use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use jobboard_core::types::{EmploymentType, JobDto, JobOwner, JobStatus};
use jobboard_core::JobFilter;

use crate::{
    classify_delete, classify_write, expect_affected, new_id, to_rfc3339, to_rfc3339_opt,
    RepositoryError,
};

const JOB_SELECT: &str = "SELECT j.id, j.employer_id, e.company_name, e.user_id AS employer_user_id, \
     j.title, j.description, j.requirements, j.location, j.employment_type, j.salary_min, j.salary_max, \
     j.status, j.closing_date, j.created_at, j.updated_at \
     FROM jobs AS j JOIN employers AS e ON e.id = j.employer_id";

/// Repository for job postings.
#[derive(Clone)]
pub struct JobRepository {
    pub(crate) pool: SqlitePool,
}

/// Editable job posting fields.
pub struct JobFields<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub requirements: Option<&'a str>,
    pub location: Option<&'a str>,
    pub employment_type: EmploymentType,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub status: JobStatus,
    pub closing_date: Option<DateTime<Utc>>,
}

pub struct NewJob<'a> {
    pub employer_id: &'a str,
    pub fields: JobFields<'a>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    employer_id: String,
    company_name: String,
    employer_user_id: String,
    title: String,
    description: String,
    requirements: Option<String>,
    location: Option<String>,
    employment_type: String,
    salary_min: Option<i64>,
    salary_max: Option<i64>,
    status: String,
    closing_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl JobRow {
    fn into_domain(self) -> Result<JobOwner, RepositoryError> {
        Ok(JobOwner {
            job: JobDto {
                id: self.id,
                employer_id: self.employer_id,
                company_name: self.company_name,
                title: self.title,
                description: self.description,
                requirements: self.requirements,
                location: self.location,
                employment_type: self.employment_type.parse()?,
                salary_min: self.salary_min,
                salary_max: self.salary_max,
                status: self.status.parse()?,
                closing_date: self.closing_date,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
            employer_user_id: self.employer_user_id,
        })
    }
}

/// Escapes LIKE wildcards so user input matches literally.
fn like_pattern(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('%');
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, filter: &JobFilter) {
    builder.push(" WHERE j.status = ");
    builder.push_bind(filter.status.as_str());
    if let Some(search) = filter.search.as_deref() {
        let pattern = like_pattern(search);
        builder.push(" AND (j.title LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" ESCAPE '\\' OR j.description LIKE ");
        builder.push_bind(pattern);
        builder.push(" ESCAPE '\\')");
    }
    if let Some(location) = filter.location.as_deref() {
        builder.push(" AND j.location LIKE ");
        builder.push_bind(like_pattern(location));
        builder.push(" ESCAPE '\\'");
    }
    if let Some(employment_type) = filter.employment_type {
        builder.push(" AND j.employment_type = ");
        builder.push_bind(employment_type.as_str());
    }
    if let Some(employer_id) = filter.employer_id.clone() {
        builder.push(" AND j.employer_id = ");
        builder.push_bind(employer_id);
    }
    if let Some(min_salary) = filter.min_salary {
        builder.push(" AND COALESCE(j.salary_max, j.salary_min) >= ");
        builder.push_bind(min_salary);
    }
}

impl JobRepository {
    pub async fn insert(&self, record: &NewJob<'_>) -> Result<JobDto, RepositoryError> {
        let id = new_id();
        let created_at = to_rfc3339(record.created_at);
        let fields = &record.fields;
        sqlx::query(
            "INSERT INTO jobs \
             (id, employer_id, title, description, requirements, location, employment_type, salary_min, salary_max, status, closing_date, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(record.employer_id)
        .bind(fields.title)
        .bind(fields.description)
        .bind(fields.requirements)
        .bind(fields.location)
        .bind(fields.employment_type.as_str())
        .bind(fields.salary_min)
        .bind(fields.salary_max)
        .bind(fields.status.as_str())
        .bind(to_rfc3339_opt(fields.closing_date))
        .bind(&created_at)
        .bind(&created_at)
        .execute(&self.pool)
        .await
        .map_err(|err| classify_write(err, "job already exists"))?;

        self.find(&id).await
    }

    pub async fn find(&self, id: &str) -> Result<JobDto, RepositoryError> {
        Ok(self.find_with_employer(id).await?.job)
    }

    /// Loads a job together with the user id that owns its employer profile.
    pub async fn find_with_employer(&self, id: &str) -> Result<JobOwner, RepositoryError> {
        let sql = format!("{JOB_SELECT} WHERE j.id = ?");
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        row.into_domain()
    }

    /// Every posting of an employer regardless of status, newest first.
    pub async fn list_for_employer(&self, employer_id: &str) -> Result<Vec<JobDto>, RepositoryError> {
        let sql = format!("{JOB_SELECT} WHERE j.employer_id = ? ORDER BY j.created_at DESC, j.rowid DESC");
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(employer_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| row.into_domain().map(|owner| owner.job))
            .collect()
    }

    /// Runs a filtered search and returns the requested page plus the total match count.
    pub async fn search(&self, filter: &JobFilter) -> Result<(Vec<JobDto>, u64), RepositoryError> {
        let mut count_builder = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) FROM jobs AS j JOIN employers AS e ON e.id = j.employer_id",
        );
        push_filters(&mut count_builder, filter);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut builder = QueryBuilder::<Sqlite>::new(JOB_SELECT);
        push_filters(&mut builder, filter);
        builder.push(" ORDER BY j.created_at DESC, j.rowid DESC LIMIT ");
        builder.push_bind(i64::from(filter.page_size));
        builder.push(" OFFSET ");
        builder.push_bind(filter.offset());
        let rows: Vec<JobRow> = builder.build_query_as().fetch_all(&self.pool).await?;

        let jobs = rows
            .into_iter()
            .map(|row| row.into_domain().map(|owner| owner.job))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((jobs, total.max(0) as u64))
    }

    pub async fn update(
        &self,
        id: &str,
        fields: &JobFields<'_>,
        updated_at: DateTime<Utc>,
    ) -> Result<JobDto, RepositoryError> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET title = ?, description = ?, requirements = ?, location = ?, employment_type = ?, \
                 salary_min = ?, salary_max = ?, status = ?, closing_date = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(fields.title)
        .bind(fields.description)
        .bind(fields.requirements)
        .bind(fields.location)
        .bind(fields.employment_type.as_str())
        .bind(fields.salary_min)
        .bind(fields.salary_max)
        .bind(fields.status.as_str())
        .bind(to_rfc3339_opt(fields.closing_date))
        .bind(to_rfc3339(updated_at))
        .bind(id)
        .execute(&self.pool)
        .await?;
        expect_affected(result.rows_affected())?;

        self.find(id).await
    }

    /// Deletes a posting and its applications.
    pub async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
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
    use jobboard_core::JobQuery;

    fn fields<'a>(title: &'a str, status: JobStatus) -> JobFields<'a> {
        JobFields {
            title,
            description: "Ship features",
            requirements: Some("3+ years"),
            location: Some("Berlin"),
            employment_type: EmploymentType::Contract,
            salary_min: Some(60_000),
            salary_max: None,
            status,
            closing_date: Some(ts(86_400)),
        }
    }

    #[tokio::test]
    async fn find_with_employer_resolves_owner() {
        let db = setup_db().await;
        let (user_id, employer_id) = insert_employer(&db, "boss@example.com").await;
        let job_id = insert_job(&db, &employer_id, "Engineer", 0).await;

        let owner = db.jobs().find_with_employer(&job_id).await.expect("find");
        assert_eq!(owner.employer_user_id, user_id);
        assert_eq!(owner.job.company_name, "Acme");
        assert_eq!(owner.job.status, JobStatus::Open);
    }

    #[tokio::test]
    async fn insert_for_unknown_employer_is_missing_reference() {
        let db = setup_db().await;
        let err = db
            .jobs()
            .insert(&NewJob {
                employer_id: "missing",
                fields: fields("Ghost", JobStatus::Open),
                created_at: ts(0),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::MissingReference));
    }

    #[tokio::test]
    async fn search_filters_and_pages_newest_first() {
        let db = setup_db().await;
        let (_, employer_id) = insert_employer(&db, "boss@example.com").await;
        let (_, other_employer) = insert_employer(&db, "other@example.com").await;
        for i in 0..5 {
            insert_job(&db, &employer_id, &format!("Rust Engineer {i}"), i).await;
        }
        insert_job(&db, &other_employer, "Python Developer", 10).await;
        db.jobs()
            .insert(&NewJob {
                employer_id: &employer_id,
                fields: fields("Rust Architect", JobStatus::Closed),
                created_at: ts(20),
            })
            .await
            .expect("insert closed");

        let filter = JobFilter::from(JobQuery {
            search: Some("rust".to_string()),
            page: Some(1),
            page_size: Some(2),
            ..JobQuery::default()
        });
        let (jobs, total) = db.jobs().search(&filter).await.expect("search");
        assert_eq!(total, 5);
        let titles: Vec<&str> = jobs.iter().map(|job| job.title.as_str()).collect();
        assert_eq!(titles, vec!["Rust Engineer 4", "Rust Engineer 3"]);

        let filter = JobFilter::from(JobQuery {
            search: Some("rust".to_string()),
            page: Some(3),
            page_size: Some(2),
            ..JobQuery::default()
        });
        let (jobs, _) = db.jobs().search(&filter).await.expect("search");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].title, "Rust Engineer 0");

        let filter = JobFilter::from(JobQuery {
            status: Some(JobStatus::Closed),
            employment_type: Some(EmploymentType::Contract),
            ..JobQuery::default()
        });
        let (jobs, total) = db.jobs().search(&filter).await.expect("search");
        assert_eq!(total, 1);
        assert_eq!(jobs[0].title, "Rust Architect");

        let filter = JobFilter::from(JobQuery {
            employer_id: Some(other_employer.clone()),
            ..JobQuery::default()
        });
        let (jobs, _) = db.jobs().search(&filter).await.expect("search");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].employer_id, other_employer);
    }

    #[tokio::test]
    async fn search_treats_wildcards_literally_and_filters_salary() {
        let db = setup_db().await;
        let (_, employer_id) = insert_employer(&db, "boss@example.com").await;
        insert_job(&db, &employer_id, "100% remote engineer", 0).await;
        insert_job(&db, &employer_id, "Onsite engineer", 1).await;

        let filter = JobFilter::from(JobQuery {
            search: Some("100%".to_string()),
            ..JobQuery::default()
        });
        let (jobs, total) = db.jobs().search(&filter).await.expect("search");
        assert_eq!(total, 1);
        assert_eq!(jobs[0].title, "100% remote engineer");

        let filter = JobFilter::from(JobQuery {
            min_salary: Some(80_000),
            ..JobQuery::default()
        });
        let (_, total) = db.jobs().search(&filter).await.expect("search");
        assert_eq!(total, 0);

        let filter = JobFilter::from(JobQuery {
            min_salary: Some(70_000),
            location: Some("remote".to_string()),
            ..JobQuery::default()
        });
        let (_, total) = db.jobs().search(&filter).await.expect("search");
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn update_and_list_for_employer() {
        let db = setup_db().await;
        let (_, employer_id) = insert_employer(&db, "boss@example.com").await;
        let job_id = insert_job(&db, &employer_id, "Engineer", 0).await;

        let updated = db
            .jobs()
            .update(&job_id, &fields("Senior Engineer", JobStatus::Closed), ts(50))
            .await
            .expect("update");
        assert_eq!(updated.title, "Senior Engineer");
        assert_eq!(updated.status, JobStatus::Closed);
        assert_eq!(updated.closing_date, Some(ts(86_400)));
        assert_eq!(updated.salary_max, None);

        let listed = db.jobs().list_for_employer(&employer_id).await.expect("list");
        assert_eq!(listed.len(), 1);

        db.jobs().delete(&job_id).await.expect("delete");
        assert!(matches!(
            db.jobs().delete(&job_id).await,
            Err(RepositoryError::NotFound)
        ));
    }
}
