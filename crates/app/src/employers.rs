use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::info;

use jobboard_core::requests::{optional_text, CreateEmployerRequest, EmployerProfile};
use jobboard_core::types::{EmployerDto, Role};
use jobboard_storage::{EmployerFields, NewEmployer};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::router::AppState;

pub struct EmployerService<'a> {
    state: &'a AppState,
}

fn fields(profile: &EmployerProfile) -> EmployerFields<'_> {
    EmployerFields {
        company_name: profile.company_name.trim(),
        description: optional_text(profile.description.as_deref()),
        website: optional_text(profile.website.as_deref()),
        location: optional_text(profile.location.as_deref()),
        industry: optional_text(profile.industry.as_deref()),
        logo_url: optional_text(profile.logo_url.as_deref()),
    }
}

impl<'a> EmployerService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    pub async fn list(&self) -> Result<Vec<EmployerDto>, ApiError> {
        Ok(self.state.storage().employers().list().await?)
    }

    pub async fn get(&self, id: &str) -> Result<EmployerDto, ApiError> {
        self.state
            .storage()
            .employers()
            .find(id)
            .await
            .map_err(ApiError::lookup("employer"))
    }

    pub async fn get_by_user(&self, user_id: &str) -> Result<EmployerDto, ApiError> {
        self.state
            .storage()
            .employers()
            .find_by_user(user_id)
            .await
            .map_err(ApiError::lookup("employer"))
    }

    pub async fn create(&self, caller: &AuthUser, request: CreateEmployerRequest) -> Result<EmployerDto, ApiError> {
        caller.require_self_or_admin(&request.user_id)?;
        request.profile.validate()?;
        let owner = self
            .state
            .storage()
            .users()
            .find(&request.user_id)
            .await
            .map_err(ApiError::lookup("user"))?;
        if owner.role != Role::Employer {
            return Err(ApiError::validation("user does not have the Employer role"));
        }

        let employer = self
            .state
            .storage()
            .employers()
            .insert(&NewEmployer {
                user_id: &owner.id,
                fields: fields(&request.profile),
                created_at: self.state.now(),
            })
            .await
            .map_err(ApiError::lookup("user"))?;
        info!(stage = "app", employer_id = %employer.id, user_id = %owner.id, "employer profile created");
        Ok(employer)
    }

    /// Loads a profile and checks the caller owns it.
    pub async fn owned(&self, caller: &AuthUser, id: &str) -> Result<EmployerDto, ApiError> {
        let employer = self.get(id).await?;
        caller.require_self_or_admin(&employer.user_id)?;
        Ok(employer)
    }

    pub async fn update(&self, caller: &AuthUser, id: &str, profile: EmployerProfile) -> Result<EmployerDto, ApiError> {
        profile.validate()?;
        self.owned(caller, id).await?;
        self.state
            .storage()
            .employers()
            .update(id, &fields(&profile), self.state.now())
            .await
            .map_err(ApiError::lookup("employer"))
    }

    pub async fn delete(&self, caller: &AuthUser, id: &str) -> Result<(), ApiError> {
        self.owned(caller, id).await?;
        self.state
            .storage()
            .employers()
            .delete(id)
            .await
            .map_err(ApiError::lookup("employer"))?;
        info!(stage = "app", employer_id = %id, "employer profile deleted");
        Ok(())
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_employers).post(create_employer))
        .route("/user/:user_id", get(employer_for_user))
        .route(
            "/:id",
            get(get_employer).put(update_employer).delete(delete_employer),
        )
}

async fn list_employers(State(state): State<AppState>) -> Result<Json<Vec<EmployerDto>>, ApiError> {
    state.employers().list().await.map(Json)
}

async fn get_employer(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EmployerDto>, ApiError> {
    state.employers().get(&id).await.map(Json)
}

async fn employer_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<EmployerDto>, ApiError> {
    state.employers().get_by_user(&user_id).await.map(Json)
}

async fn create_employer(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(request): Json<CreateEmployerRequest>,
) -> Result<(StatusCode, Json<EmployerDto>), ApiError> {
    let employer = state.employers().create(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(employer)))
}

async fn update_employer(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(profile): Json<EmployerProfile>,
) -> Result<Json<EmployerDto>, ApiError> {
    state.employers().update(&caller, &id, profile).await.map(Json)
}

async fn delete_employer(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.employers().delete(&caller, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use serde_json::json;

    use crate::test_support::*;

    #[tokio::test]
    async fn owner_creates_profile_once() {
        let state = setup_state().await;
        let boss = account(&state, "boss@example.com", Role::Employer).await;
        let body = json!({
            "userId": boss.user.id,
            "companyName": "  Acme  ",
            "website": "https://acme.example.com",
        });

        let (status, created) = send(&state, Method::POST, "/api/Employer", Some(&boss.token), Some(body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["companyName"], "Acme");
        assert_eq!(created["userId"], boss.user.id.as_str());

        let (status, problem) = send(&state, Method::POST, "/api/Employer", Some(&boss.token), Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(problem["type"], "conflict");

        let (status, by_user) = send(
            &state,
            Method::GET,
            &format!("/api/Employer/user/{}", boss.user.id),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(by_user["id"], created["id"]);

        let (status, listed) = send(&state, Method::GET, "/api/Employer", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn create_checks_role_caller_and_user() {
        let state = setup_state().await;
        let seeker = account(&state, "seeker@example.com", Role::JobSeeker).await;
        let boss = account(&state, "boss@example.com", Role::Employer).await;

        let (status, _) = send(
            &state,
            Method::POST,
            "/api/Employer",
            Some(&seeker.token),
            Some(json!({ "userId": seeker.user.id, "companyName": "Nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &state,
            Method::POST,
            "/api/Employer",
            Some(&seeker.token),
            Some(json!({ "userId": boss.user.id, "companyName": "Hijack" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &state,
            Method::POST,
            "/api/Employer",
            None,
            Some(json!({ "userId": boss.user.id, "companyName": "Anon" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let admin = admin(&state).await;
        let (status, _) = send(
            &state,
            Method::POST,
            "/api/Employer",
            Some(&admin.token),
            Some(json!({ "userId": "missing", "companyName": "Ghost" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_and_delete_require_owner() {
        let state = setup_state().await;
        let (boss, profile) = employer(&state, "boss@example.com").await;
        let (rival, _) = employer(&state, "rival@example.com").await;
        let uri = format!("/api/Employer/{}", profile.id);

        let (status, _) = send(&state, Method::PUT, &uri, Some(&rival.token), Some(json!({ "companyName": "Stolen" }))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, updated) = send(
            &state,
            Method::PUT,
            &uri,
            Some(&boss.token),
            Some(json!({ "companyName": "Acme Rockets", "industry": "Aerospace" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["companyName"], "Acme Rockets");
        assert_eq!(updated["industry"], "Aerospace");

        let (status, _) = send(&state, Method::PUT, &uri, Some(&boss.token), Some(json!({ "companyName": " " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&state, Method::DELETE, &uri, Some(&rival.token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(&state, Method::DELETE, &uri, Some(&boss.token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&state, Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
