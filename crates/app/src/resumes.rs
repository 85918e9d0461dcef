use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::info;

use jobboard_core::requests::{optional_text, CreateResumeRequest, ResumeDraft};
use jobboard_core::types::ResumeDto;
use jobboard_storage::{NewResume, RepositoryError, ResumeFields};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::router::AppState;

pub struct ResumeService<'a> {
    state: &'a AppState,
}

fn fields(draft: &ResumeDraft) -> ResumeFields<'_> {
    ResumeFields {
        title: draft.title.trim(),
        file_url: optional_text(draft.file_url.as_deref()),
        content: optional_text(draft.content.as_deref()),
    }
}

impl<'a> ResumeService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Loads a resume without any access check.
    pub async fn lookup(&self, id: &str) -> Result<ResumeDto, ApiError> {
        self.state
            .storage()
            .resumes()
            .find(id)
            .await
            .map_err(ApiError::lookup("resume"))
    }

    /// Loads a resume and checks the caller owns the job seeker profile behind it.
    async fn owned(&self, caller: &AuthUser, id: &str) -> Result<ResumeDto, ApiError> {
        let resume = self.lookup(id).await?;
        self.state.job_seekers().owned(caller, &resume.job_seeker_id).await?;
        Ok(resume)
    }

    pub async fn create(&self, caller: &AuthUser, request: CreateResumeRequest) -> Result<ResumeDto, ApiError> {
        request.draft.validate()?;
        let seeker = self.state.job_seekers().owned(caller, &request.job_seeker_id).await?;
        let resume = self
            .state
            .storage()
            .resumes()
            .insert(&NewResume {
                job_seeker_id: &seeker.id,
                fields: fields(&request.draft),
                make_default: request.draft.is_default,
                created_at: self.state.now(),
            })
            .await
            .map_err(ApiError::lookup("job seeker"))?;
        info!(stage = "app", resume_id = %resume.id, job_seeker_id = %seeker.id, default = resume.is_default, "resume created");
        Ok(resume)
    }

    /// Owners and admins always see a resume; employers only once it was sent to one of their jobs.
    pub async fn get(&self, caller: &AuthUser, id: &str) -> Result<ResumeDto, ApiError> {
        let resume = self.lookup(id).await?;
        if caller.is_admin() {
            return Ok(resume);
        }
        let seeker = self.state.job_seekers().get(&resume.job_seeker_id).await?;
        if seeker.user_id == caller.user_id {
            return Ok(resume);
        }
        let shared = self
            .state
            .storage()
            .resumes()
            .is_shared_with_employer(id, &caller.user_id)
            .await?;
        if shared {
            Ok(resume)
        } else {
            Err(ApiError::Forbidden("not allowed to view this resume"))
        }
    }

    pub async fn list_for_job_seeker(&self, caller: &AuthUser, job_seeker_id: &str) -> Result<Vec<ResumeDto>, ApiError> {
        self.state.job_seekers().owned(caller, job_seeker_id).await?;
        Ok(self
            .state
            .storage()
            .resumes()
            .list_for_job_seeker(job_seeker_id)
            .await?)
    }

    pub async fn update(&self, caller: &AuthUser, id: &str, draft: ResumeDraft) -> Result<ResumeDto, ApiError> {
        draft.validate()?;
        self.owned(caller, id).await?;
        self.state
            .storage()
            .resumes()
            .update(id, &fields(&draft), draft.is_default, self.state.now())
            .await
            .map_err(ApiError::lookup("resume"))
    }

    pub async fn set_default(&self, caller: &AuthUser, id: &str) -> Result<ResumeDto, ApiError> {
        self.owned(caller, id).await?;
        let resume = self
            .state
            .storage()
            .resumes()
            .set_default(id, self.state.now())
            .await
            .map_err(ApiError::lookup("resume"))?;
        info!(stage = "app", resume_id = %id, "default resume changed");
        Ok(resume)
    }

    pub async fn delete(&self, caller: &AuthUser, id: &str) -> Result<(), ApiError> {
        self.owned(caller, id).await?;
        self.state
            .storage()
            .resumes()
            .delete(id)
            .await
            .map_err(|err| match err {
                RepositoryError::InUse => ApiError::Conflict("resume is attached to an application".to_string()),
                other => ApiError::lookup("resume")(other),
            })?;
        info!(stage = "app", resume_id = %id, "resume deleted");
        Ok(())
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_resume))
        .route("/jobseeker/:job_seeker_id", get(resumes_for_job_seeker))
        .route("/:id", get(get_resume).put(update_resume).delete(delete_resume))
        .route("/:id/default", put(make_default))
}

async fn create_resume(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(request): Json<CreateResumeRequest>,
) -> Result<(StatusCode, Json<ResumeDto>), ApiError> {
    let resume = state.resumes().create(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(resume)))
}

async fn get_resume(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ResumeDto>, ApiError> {
    state.resumes().get(&caller, &id).await.map(Json)
}

async fn resumes_for_job_seeker(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(job_seeker_id): Path<String>,
) -> Result<Json<Vec<ResumeDto>>, ApiError> {
    state.resumes().list_for_job_seeker(&caller, &job_seeker_id).await.map(Json)
}

async fn update_resume(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(draft): Json<ResumeDraft>,
) -> Result<Json<ResumeDto>, ApiError> {
    state.resumes().update(&caller, &id, draft).await.map(Json)
}

async fn make_default(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ResumeDto>, ApiError> {
    state.resumes().set_default(&caller, &id).await.map(Json)
}

async fn delete_resume(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.resumes().delete(&caller, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
