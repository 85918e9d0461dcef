use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::info;

use jobboard_core::requests::{optional_text, CreateJobRequest, JobDraft};
use jobboard_core::types::{JobDto, JobOwner, JobStatus};
use jobboard_core::{JobFilter, JobQuery, Page};
use jobboard_storage::{JobFields, NewJob};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::router::AppState;

pub struct JobService<'a> {
    state: &'a AppState,
}

fn fields(draft: &JobDraft, status: JobStatus) -> JobFields<'_> {
    JobFields {
        title: draft.title.trim(),
        description: draft.description.trim(),
        requirements: optional_text(draft.requirements.as_deref()),
        location: optional_text(draft.location.as_deref()),
        employment_type: draft.employment_type,
        salary_min: draft.salary_min,
        salary_max: draft.salary_max,
        status,
        closing_date: draft.closing_date,
    }
}

impl<'a> JobService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    pub async fn search(&self, query: JobQuery) -> Result<Page<JobDto>, ApiError> {
        let filter = JobFilter::from(query);
        let (items, total) = self.state.storage().jobs().search(&filter).await?;
        Ok(Page::new(items, total, filter.page, filter.page_size))
    }

    pub async fn get(&self, id: &str) -> Result<JobDto, ApiError> {
        self.state
            .storage()
            .jobs()
            .find(id)
            .await
            .map_err(ApiError::lookup("job"))
    }

    pub async fn list_for_employer(&self, employer_id: &str) -> Result<Vec<JobDto>, ApiError> {
        self.state.employers().get(employer_id).await?;
        Ok(self.state.storage().jobs().list_for_employer(employer_id).await?)
    }

    pub async fn create(&self, caller: &AuthUser, request: CreateJobRequest) -> Result<JobDto, ApiError> {
        request.draft.validate()?;
        let employer = self.state.employers().owned(caller, &request.employer_id).await?;
        let job = self
            .state
            .storage()
            .jobs()
            .insert(&NewJob {
                employer_id: &employer.id,
                fields: fields(&request.draft, request.draft.status_or_default()),
                created_at: self.state.now(),
            })
            .await
            .map_err(ApiError::lookup("employer"))?;
        info!(stage = "app", job_id = %job.id, employer_id = %employer.id, "job posted");
        Ok(job)
    }

    /// Loads a job and checks the caller owns its employer profile.
    pub async fn owned(&self, caller: &AuthUser, id: &str) -> Result<JobOwner, ApiError> {
        let owner = self
            .state
            .storage()
            .jobs()
            .find_with_employer(id)
            .await
            .map_err(ApiError::lookup("job"))?;
        caller.require_self_or_admin(&owner.employer_user_id)?;
        Ok(owner)
    }

    /// Replaces the posting. An omitted `status` keeps the current one.
    pub async fn update(&self, caller: &AuthUser, id: &str, draft: JobDraft) -> Result<JobDto, ApiError> {
        draft.validate()?;
        let owner = self.owned(caller, id).await?;
        let status = draft.status.unwrap_or(owner.job.status);
        self.state
            .storage()
            .jobs()
            .update(id, &fields(&draft, status), self.state.now())
            .await
            .map_err(ApiError::lookup("job"))
    }

    /// Removes the posting together with its applications.
    pub async fn delete(&self, caller: &AuthUser, id: &str) -> Result<(), ApiError> {
        self.owned(caller, id).await?;
        self.state
            .storage()
            .jobs()
            .delete(id)
            .await
            .map_err(ApiError::lookup("job"))?;
        info!(stage = "app", job_id = %id, "job deleted");
        Ok(())
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(search_jobs).post(create_job))
        .route("/employer/:employer_id", get(jobs_for_employer))
        .route("/:id", get(get_job).put(update_job).delete(delete_job))
}

async fn search_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> Result<Json<Page<JobDto>>, ApiError> {
    state.jobs().search(query).await.map(Json)
}

async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<JobDto>, ApiError> {
    state.jobs().get(&id).await.map(Json)
}

async fn jobs_for_employer(
    State(state): State<AppState>,
    Path(employer_id): Path<String>,
) -> Result<Json<Vec<JobDto>>, ApiError> {
    state.jobs().list_for_employer(&employer_id).await.map(Json)
}

async fn create_job(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<JobDto>), ApiError> {
    let job = state.jobs().create(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

async fn update_job(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(draft): Json<JobDraft>,
) -> Result<Json<JobDto>, ApiError> {
    state.jobs().update(&caller, &id, draft).await.map(Json)
}

async fn delete_job(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.jobs().delete(&caller, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    };

    use super::*;
    use axum::http::Method;
    use chrono::{DateTime, Duration, Utc};
    use serde_json::json;

    use crate::test_support::*;

    fn ticking_clock() -> crate::router::Clock {
        let start = DateTime::parse_from_rfc3339("2024-05-01T09:00:00Z")
            .expect("timestamp")
            .with_timezone(&Utc);
        let ticks = Arc::new(AtomicI64::new(0));
        Arc::new(move || start + Duration::seconds(ticks.fetch_add(1, Ordering::SeqCst)))
    }

    fn posting(employer_id: &str, title: &str) -> serde_json::Value {
        json!({
            "employerId": employer_id,
            "title": title,
            "description": "Ship reliable services",
            "location": "Remote",
            "employmentType": "FullTime",
            "salaryMin": 60000,
            "salaryMax": 90000,
        })
    }

    #[tokio::test]
    async fn employer_posts_and_public_reads() {
        let state = setup_state().await;
        let (boss, profile) = employer(&state, "boss@example.com").await;

        let (status, job) = send(
            &state,
            Method::POST,
            "/api/Job",
            Some(&boss.token),
            Some(posting(&profile.id, "Rust Engineer")),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(job["status"], "Open");
        assert_eq!(job["companyName"], "Acme");

        let id = job["id"].as_str().expect("id");
        let (status, fetched) = send(&state, Method::GET, &format!("/api/Job/{id}"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["title"], "Rust Engineer");

        let (status, listed) = send(
            &state,
            Method::GET,
            &format!("/api/Job/employer/{}", profile.id),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().map(Vec::len), Some(1));

        let (status, _) = send(&state, Method::GET, "/api/Job/employer/missing", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn posting_validation_and_ownership() {
        let state = setup_state().await;
        let (boss, profile) = employer(&state, "boss@example.com").await;
        let (rival, _) = employer(&state, "rival@example.com").await;

        let mut inverted = posting(&profile.id, "Backwards");
        inverted["salaryMin"] = json!(100000);
        let (status, problem) = send(&state, Method::POST, "/api/Job", Some(&boss.token), Some(inverted)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(problem["type"], "validation_failed");

        let (status, _) = send(
            &state,
            Method::POST,
            "/api/Job",
            Some(&rival.token),
            Some(posting(&profile.id, "Not yours")),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let job = open_job(&state, &boss, &profile, "Rust Engineer").await;
        let uri = format!("/api/Job/{}", job.id);
        let mut closed = posting(&profile.id, "Rust Engineer");
        closed["status"] = json!("Closed");

        let (status, _) = send(&state, Method::PUT, &uri, Some(&rival.token), Some(closed.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, updated) = send(&state, Method::PUT, &uri, Some(&boss.token), Some(closed)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["status"], "Closed");

        let (status, _) = send(&state, Method::DELETE, &uri, Some(&boss.token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&state, Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn edit_without_status_keeps_closed_posting_closed() {
        let state = setup_state().await;
        let (boss, profile) = employer(&state, "boss@example.com").await;
        let job = open_job(&state, &boss, &profile, "Rust Engineer").await;
        let uri = format!("/api/Job/{}", job.id);

        let mut closed = posting(&profile.id, "Rust Engineer");
        closed["status"] = json!("Closed");
        let (status, _) = send(&state, Method::PUT, &uri, Some(&boss.token), Some(closed)).await;
        assert_eq!(status, StatusCode::OK);

        let typo_fix = json!({
            "title": "Rust Engineer (typo fixed)",
            "description": "Ship reliable services",
            "employmentType": "FullTime",
        });
        let (status, edited) = send(&state, Method::PUT, &uri, Some(&boss.token), Some(typo_fix)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(edited["title"], "Rust Engineer (typo fixed)");
        assert_eq!(edited["status"], "Closed");

        let (_, listed) = send(&state, Method::GET, "/api/Job", None, None).await;
        assert_eq!(listed["totalCount"], 0);
    }

    #[tokio::test]
    async fn search_filters_and_pages_newest_first() {
        let state = setup_state().await.with_clock(ticking_clock());
        let (boss, profile) = employer(&state, "boss@example.com").await;
        for n in 0..5 {
            open_job(&state, &boss, &profile, &format!("Rust Engineer {n}")).await;
        }
        open_job(&state, &boss, &profile, "Python Developer").await;

        let (status, page) = send(&state, Method::GET, "/api/Job?search=RUST&pageSize=2&page=1", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["totalCount"], 5);
        assert_eq!(page["totalPages"], 3);
        assert_eq!(page["pageSize"], 2);
        assert_eq!(page["items"][0]["title"], "Rust Engineer 4");
        assert_eq!(page["items"][1]["title"], "Rust Engineer 3");

        let (_, last) = send(&state, Method::GET, "/api/Job?search=rust&pageSize=2&page=3", None, None).await;
        assert_eq!(last["items"].as_array().map(Vec::len), Some(1));
        assert_eq!(last["items"][0]["title"], "Rust Engineer 0");

        let (_, rich) = send(&state, Method::GET, "/api/Job?minSalary=90000", None, None).await;
        assert_eq!(rich["totalCount"], 0);
        let (_, affordable) = send(&state, Method::GET, "/api/Job?minSalary=80000&location=remote", None, None).await;
        assert_eq!(affordable["totalCount"], 6);

        let (_, defaults) = send(&state, Method::GET, "/api/Job?pageSize=500", None, None).await;
        assert_eq!(defaults["pageSize"], 100);
        assert_eq!(defaults["page"], 1);
        let (_, closed) = send(&state, Method::GET, "/api/Job?status=Closed", None, None).await;
        assert_eq!(closed["totalCount"], 0);
    }
}
