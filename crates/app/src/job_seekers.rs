use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::info;

use jobboard_core::requests::{optional_text, CreateJobSeekerRequest, JobSeekerProfile};
use jobboard_core::types::{JobSeekerDto, Role};
use jobboard_storage::{JobSeekerFields, NewJobSeeker};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::router::AppState;

pub struct JobSeekerService<'a> {
    state: &'a AppState,
}

fn fields<'p>(profile: &'p JobSeekerProfile, skills: &'p [String]) -> JobSeekerFields<'p> {
    JobSeekerFields {
        headline: optional_text(profile.headline.as_deref()),
        summary: optional_text(profile.summary.as_deref()),
        location: optional_text(profile.location.as_deref()),
        skills,
        experience_years: profile.experience_years,
    }
}

impl<'a> JobSeekerService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Candidate directory for recruiters.
    pub async fn list(&self, caller: &AuthUser) -> Result<Vec<JobSeekerDto>, ApiError> {
        caller.require_role(Role::Employer)?;
        Ok(self.state.storage().job_seekers().list().await?)
    }

    pub async fn get(&self, id: &str) -> Result<JobSeekerDto, ApiError> {
        self.state
            .storage()
            .job_seekers()
            .find(id)
            .await
            .map_err(ApiError::lookup("job seeker"))
    }

    pub async fn get_by_user(&self, user_id: &str) -> Result<JobSeekerDto, ApiError> {
        self.state
            .storage()
            .job_seekers()
            .find_by_user(user_id)
            .await
            .map_err(ApiError::lookup("job seeker"))
    }

    pub async fn create(&self, caller: &AuthUser, request: CreateJobSeekerRequest) -> Result<JobSeekerDto, ApiError> {
        caller.require_self_or_admin(&request.user_id)?;
        request.profile.validate()?;
        let owner = self
            .state
            .storage()
            .users()
            .find(&request.user_id)
            .await
            .map_err(ApiError::lookup("user"))?;
        if owner.role != Role::JobSeeker {
            return Err(ApiError::validation("user does not have the JobSeeker role"));
        }

        let skills = request.profile.normalized_skills();
        let seeker = self
            .state
            .storage()
            .job_seekers()
            .insert(&NewJobSeeker {
                user_id: &owner.id,
                fields: fields(&request.profile, &skills),
                created_at: self.state.now(),
            })
            .await
            .map_err(ApiError::lookup("user"))?;
        info!(stage = "app", job_seeker_id = %seeker.id, user_id = %owner.id, "job seeker profile created");
        Ok(seeker)
    }

    /// Loads a profile and checks the caller owns it.
    pub async fn owned(&self, caller: &AuthUser, id: &str) -> Result<JobSeekerDto, ApiError> {
        let seeker = self.get(id).await?;
        caller.require_self_or_admin(&seeker.user_id)?;
        Ok(seeker)
    }

    pub async fn update(&self, caller: &AuthUser, id: &str, profile: JobSeekerProfile) -> Result<JobSeekerDto, ApiError> {
        profile.validate()?;
        self.owned(caller, id).await?;
        let skills = profile.normalized_skills();
        self.state
            .storage()
            .job_seekers()
            .update(id, &fields(&profile, &skills), self.state.now())
            .await
            .map_err(ApiError::lookup("job seeker"))
    }

    pub async fn delete(&self, caller: &AuthUser, id: &str) -> Result<(), ApiError> {
        self.owned(caller, id).await?;
        self.state
            .storage()
            .job_seekers()
            .delete(id)
            .await
            .map_err(ApiError::lookup("job seeker"))?;
        info!(stage = "app", job_seeker_id = %id, "job seeker profile deleted");
        Ok(())
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_job_seekers).post(create_job_seeker))
        .route("/user/:user_id", get(job_seeker_for_user))
        .route(
            "/:id",
            get(get_job_seeker)
                .put(update_job_seeker)
                .delete(delete_job_seeker),
        )
}

async fn list_job_seekers(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<Json<Vec<JobSeekerDto>>, ApiError> {
    state.job_seekers().list(&caller).await.map(Json)
}

async fn get_job_seeker(
    State(state): State<AppState>,
    _caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<JobSeekerDto>, ApiError> {
    state.job_seekers().get(&id).await.map(Json)
}

async fn job_seeker_for_user(
    State(state): State<AppState>,
    _caller: AuthUser,
    Path(user_id): Path<String>,
) -> Result<Json<JobSeekerDto>, ApiError> {
    state.job_seekers().get_by_user(&user_id).await.map(Json)
}

async fn create_job_seeker(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(request): Json<CreateJobSeekerRequest>,
) -> Result<(StatusCode, Json<JobSeekerDto>), ApiError> {
    let seeker = state.job_seekers().create(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(seeker)))
}

async fn update_job_seeker(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(profile): Json<JobSeekerProfile>,
) -> Result<Json<JobSeekerDto>, ApiError> {
    state.job_seekers().update(&caller, &id, profile).await.map(Json)
}

async fn delete_job_seeker(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.job_seekers().delete(&caller, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
