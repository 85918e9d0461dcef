use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use metrics::counter;
use tracing::info;

use jobboard_core::requests::{optional_text, CreateApplicationRequest, UpdateApplicationRequest};
use jobboard_core::types::{ApplicationDto, ApplicationStatus, JobStatus, NotificationKind};
use jobboard_storage::{ApplicationRecord, ApplicationUpdate, NewApplication};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::notify::NotificationDraft;
use crate::router::AppState;

pub struct ApplicationService<'a> {
    state: &'a AppState,
}

impl<'a> ApplicationService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    pub async fn create(
        &self,
        caller: &AuthUser,
        request: CreateApplicationRequest,
    ) -> Result<ApplicationDto, ApiError> {
        let seeker = self.state.job_seekers().owned(caller, &request.job_seeker_id).await?;
        let job = self.state.jobs().get(&request.job_id).await?;
        if job.status != JobStatus::Open {
            return Err(ApiError::validation("job is not accepting applications"));
        }
        self.check_resume(&request.resume_id, &seeker.id).await?;

        let record = self
            .state
            .storage()
            .applications()
            .insert(&NewApplication {
                job_id: &job.id,
                job_seeker_id: &seeker.id,
                resume_id: &request.resume_id,
                cover_letter: optional_text(request.cover_letter.as_deref()),
                created_at: self.state.now(),
            })
            .await
            .map_err(ApiError::lookup("job"))?;
        counter!("applications_submitted_total").increment(1);
        info!(stage = "app", application_id = %record.application.id, job_id = %job.id, "application submitted");

        let draft = NotificationDraft {
            kind: NotificationKind::ApplicationReceived,
            title: "New application received".to_string(),
            message: format!("A candidate applied for \"{}\".", job.title),
            related_id: Some(record.application.id.clone()),
        };
        self.state
            .notifier()
            .notify_employer(&job.id, &draft, self.state.now())
            .await;

        Ok(record.application)
    }

    /// The resume must exist and belong to the applying job seeker.
    async fn check_resume(&self, resume_id: &str, job_seeker_id: &str) -> Result<(), ApiError> {
        let resume = self.state.resumes().lookup(resume_id).await?;
        if resume.job_seeker_id != job_seeker_id {
            return Err(ApiError::validation("resume does not belong to the job seeker"));
        }
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<ApplicationRecord, ApiError> {
        self.state
            .storage()
            .applications()
            .find(id)
            .await
            .map_err(ApiError::lookup("application"))
    }

    pub async fn get(&self, caller: &AuthUser, id: &str) -> Result<ApplicationDto, ApiError> {
        let record = self.load(id).await?;
        let allowed = caller.is_admin()
            || caller.user_id == record.applicant_user_id
            || caller.user_id == record.employer_user_id;
        if !allowed {
            return Err(ApiError::Forbidden("not allowed to view this application"));
        }
        Ok(record.application)
    }

    pub async fn list_for_job(&self, caller: &AuthUser, job_id: &str) -> Result<Vec<ApplicationDto>, ApiError> {
        self.state.jobs().owned(caller, job_id).await?;
        Ok(self.state.storage().applications().list_for_job(job_id).await?)
    }

    pub async fn list_for_job_seeker(
        &self,
        caller: &AuthUser,
        job_seeker_id: &str,
    ) -> Result<Vec<ApplicationDto>, ApiError> {
        self.state.job_seekers().owned(caller, job_seeker_id).await?;
        Ok(self
            .state
            .storage()
            .applications()
            .list_for_job_seeker(job_seeker_id)
            .await?)
    }

    /// Applies a partial update.
    ///
    /// The applicant edits the cover letter, the resume, or withdraws. The
    /// employer moves the status through review. Withdrawn applications are final.
    pub async fn update(
        &self,
        caller: &AuthUser,
        id: &str,
        request: UpdateApplicationRequest,
    ) -> Result<ApplicationDto, ApiError> {
        let record = self.load(id).await?;
        let current = &record.application;
        let is_applicant = caller.user_id == record.applicant_user_id;
        let is_employer = caller.user_id == record.employer_user_id;
        if !(is_applicant || is_employer || caller.is_admin()) {
            return Err(ApiError::Forbidden("not allowed to modify this application"));
        }
        if request.is_empty() {
            return Err(ApiError::validation("no changes requested"));
        }
        if current.status == ApplicationStatus::Withdrawn {
            return Err(ApiError::validation("a withdrawn application cannot be changed"));
        }
        if request.touches_applicant_fields() && !(is_applicant || caller.is_admin()) {
            return Err(ApiError::Forbidden("only the applicant can change this field"));
        }
        if let Some(status) = request.status {
            if status.is_employer_decision() && !(is_employer || caller.is_admin()) {
                return Err(ApiError::Forbidden("only the employer can change the review status"));
            }
            if status == ApplicationStatus::Pending && current.status != ApplicationStatus::Pending {
                return Err(ApiError::validation("an application cannot return to Pending"));
            }
        }
        if let Some(resume_id) = request.resume_id.as_deref() {
            self.check_resume(resume_id, &current.job_seeker_id).await?;
        }

        let status = request.status.unwrap_or(current.status);
        let cover_letter = match request.cover_letter.as_deref() {
            Some(text) => optional_text(Some(text)),
            None => current.cover_letter.as_deref(),
        };
        let updated = self
            .state
            .storage()
            .applications()
            .update(
                id,
                &ApplicationUpdate {
                    resume_id: request.resume_id.as_deref().unwrap_or(&current.resume_id),
                    cover_letter,
                    status,
                    updated_at: self.state.now(),
                },
            )
            .await
            .map_err(ApiError::lookup("application"))?;
        let application = updated.application;
        info!(stage = "app", application_id = %application.id, status = application.status.as_str(), "application updated");

        let now = self.state.now();
        let draft = NotificationDraft {
            kind: NotificationKind::ApplicationUpdated,
            title: "Application updated".to_string(),
            message: format!(
                "An application for \"{}\" was updated. Current status: {}.",
                application.job_title, application.status
            ),
            related_id: Some(application.id.clone()),
        };
        self.state
            .notifier()
            .notify_employer(&application.job_id, &draft, now)
            .await;

        if status != current.status && status.is_employer_decision() {
            let draft = NotificationDraft {
                kind: NotificationKind::ApplicationStatusChanged,
                title: "Application status changed".to_string(),
                message: format!(
                    "Your application for \"{}\" is now {}.",
                    application.job_title, application.status
                ),
                related_id: Some(application.id.clone()),
            };
            self.state
                .notifier()
                .notify_user(&record.applicant_user_id, &draft, now)
                .await;
        }

        Ok(application)
    }

    pub async fn delete(&self, caller: &AuthUser, id: &str) -> Result<(), ApiError> {
        let record = self.load(id).await?;
        if !(caller.is_admin() || caller.user_id == record.applicant_user_id) {
            return Err(ApiError::Forbidden("only the applicant can delete an application"));
        }
        self.state
            .storage()
            .applications()
            .delete(id)
            .await
            .map_err(ApiError::lookup("application"))?;
        info!(stage = "app", application_id = %id, "application deleted");
        Ok(())
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::post(create_application))
        .route("/job/:job_id", get(applications_for_job))
        .route("/jobseeker/:job_seeker_id", get(applications_for_job_seeker))
        .route(
            "/:id",
            get(get_application)
                .put(update_application)
                .delete(delete_application),
        )
}

async fn create_application(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(request): Json<CreateApplicationRequest>,
) -> Result<(StatusCode, Json<ApplicationDto>), ApiError> {
    let application = state.applications().create(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(application)))
}

async fn get_application(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApplicationDto>, ApiError> {
    state.applications().get(&caller, &id).await.map(Json)
}

async fn applications_for_job(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(job_id): Path<String>,
) -> Result<Json<Vec<ApplicationDto>>, ApiError> {
    state.applications().list_for_job(&caller, &job_id).await.map(Json)
}

async fn applications_for_job_seeker(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(job_seeker_id): Path<String>,
) -> Result<Json<Vec<ApplicationDto>>, ApiError> {
    state
        .applications()
        .list_for_job_seeker(&caller, &job_seeker_id)
        .await
        .map(Json)
}

async fn update_application(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateApplicationRequest>,
) -> Result<Json<ApplicationDto>, ApiError> {
    state.applications().update(&caller, &id, request).await.map(Json)
}

async fn delete_application(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.applications().delete(&caller, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
