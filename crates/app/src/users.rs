use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use metrics::counter;
use tracing::info;

use jobboard_core::requests::{
    normalize_email, optional_text, validate_password, ChangePasswordRequest, LoginRequest,
    LoginResponse, RegisterUserRequest, UpdateUserRequest,
};
use jobboard_core::types::{Role, UserDto};
use jobboard_storage::{NewUser, RepositoryError, UserUpdate};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::router::AppState;

const INVALID_CREDENTIALS: &str = "invalid email or password";

/// Account registration, login and profile maintenance.
pub struct UserService<'a> {
    state: &'a AppState,
}

impl<'a> UserService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    pub async fn register(&self, request: RegisterUserRequest) -> Result<UserDto, ApiError> {
        let email = request.validate()?;
        let user = self
            .insert(
                &email,
                &request.password,
                (&request.first_name, &request.last_name),
                optional_text(request.phone.as_deref()),
                request.role,
            )
            .await?;
        counter!("users_registered_total", "role" => user.role.as_str()).increment(1);
        info!(stage = "auth", user_id = %user.id, role = user.role.as_str(), "user registered");
        Ok(user)
    }

    async fn insert(
        &self,
        email: &str,
        password: &str,
        (first_name, last_name): (&str, &str),
        phone: Option<&str>,
        role: Role,
    ) -> Result<UserDto, ApiError> {
        let password_hash = self.state.passwords().hash(password)?;
        self.state
            .storage()
            .users()
            .insert(&NewUser {
                email,
                password_hash: &password_hash,
                first_name: first_name.trim(),
                last_name: last_name.trim(),
                phone,
                role,
                created_at: self.state.now(),
            })
            .await
            .map_err(duplicate_email)
    }

    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse, ApiError> {
        let email = normalize_email(&request.email).map_err(|_| ApiError::Unauthorized(INVALID_CREDENTIALS))?;
        let stored = self.state.storage().users().find_by_email(&email).await?;
        let Some(stored) = stored.filter(|stored| {
            self.state
                .passwords()
                .verify(&request.password, &stored.password_hash)
        }) else {
            counter!("auth_login_total", "result" => "invalid").increment(1);
            return Err(ApiError::Unauthorized(INVALID_CREDENTIALS));
        };
        if !stored.user.is_active {
            counter!("auth_login_total", "result" => "inactive").increment(1);
            return Err(ApiError::Forbidden("account is deactivated"));
        }

        let (token, expires_at) = self
            .state
            .tokens()
            .issue(&stored.user, self.state.now())
            .map_err(|err| ApiError::Internal(err.to_string()))?;
        counter!("auth_login_total", "result" => "success").increment(1);
        info!(stage = "auth", user_id = %stored.user.id, "login succeeded");
        Ok(LoginResponse {
            token,
            expires_at,
            user: stored.user,
        })
    }

    pub async fn list(&self, caller: &AuthUser) -> Result<Vec<UserDto>, ApiError> {
        caller.require_admin()?;
        Ok(self.state.storage().users().list().await?)
    }

    pub async fn get(&self, caller: &AuthUser, id: &str) -> Result<UserDto, ApiError> {
        caller.require_self_or_admin(id)?;
        self.state
            .storage()
            .users()
            .find(id)
            .await
            .map_err(ApiError::lookup("user"))
    }

    pub async fn update(
        &self,
        caller: &AuthUser,
        id: &str,
        request: UpdateUserRequest,
    ) -> Result<UserDto, ApiError> {
        caller.require_self_or_admin(id)?;
        let email = request.validate()?;
        let current = self.get(caller, id).await?;

        let role = request.role.unwrap_or(current.role);
        let is_active = request.is_active.unwrap_or(current.is_active);
        if !caller.is_admin() && (role != current.role || is_active != current.is_active) {
            return Err(ApiError::Forbidden("only administrators can change role or status"));
        }
        if role != current.role {
            if let Some(profile_role) = self.profile_role(id).await? {
                if profile_role != role {
                    return Err(ApiError::Conflict(format!(
                        "user has a {profile_role} profile; delete it before changing role"
                    )));
                }
            }
        }

        self.state
            .storage()
            .users()
            .update(
                id,
                &UserUpdate {
                    email: &email,
                    first_name: request.first_name.trim(),
                    last_name: request.last_name.trim(),
                    phone: optional_text(request.phone.as_deref()),
                    role,
                    is_active,
                    updated_at: self.state.now(),
                },
            )
            .await
            .map_err(|err| match err {
                RepositoryError::NotFound => ApiError::NotFound("user"),
                other => duplicate_email(other),
            })
    }

    /// Role of the profile the user owns, if any.
    async fn profile_role(&self, user_id: &str) -> Result<Option<Role>, ApiError> {
        let storage = self.state.storage();
        match storage.employers().find_by_user(user_id).await {
            Ok(_) => return Ok(Some(Role::Employer)),
            Err(RepositoryError::NotFound) => {}
            Err(err) => return Err(err.into()),
        }
        match storage.job_seekers().find_by_user(user_id).await {
            Ok(_) => Ok(Some(Role::JobSeeker)),
            Err(RepositoryError::NotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Only the account holder may change a password, and only with the current one.
    pub async fn change_password(
        &self,
        caller: &AuthUser,
        id: &str,
        request: ChangePasswordRequest,
    ) -> Result<(), ApiError> {
        if caller.user_id != id {
            return Err(ApiError::Forbidden("passwords can only be changed by their owner"));
        }
        request.validate()?;
        let stored = self
            .state
            .storage()
            .users()
            .find_stored(id)
            .await
            .map_err(ApiError::lookup("user"))?;
        if !self
            .state
            .passwords()
            .verify(&request.current_password, &stored.password_hash)
        {
            return Err(ApiError::validation("current password is incorrect"));
        }

        let password_hash = self.state.passwords().hash(&request.new_password)?;
        self.state
            .storage()
            .users()
            .update_password(id, &password_hash, self.state.now())
            .await
            .map_err(ApiError::lookup("user"))?;
        info!(stage = "auth", user_id = %id, "password changed");
        Ok(())
    }

    pub async fn delete(&self, caller: &AuthUser, id: &str) -> Result<(), ApiError> {
        caller.require_self_or_admin(id)?;
        self.state
            .storage()
            .users()
            .delete(id)
            .await
            .map_err(ApiError::lookup("user"))?;
        info!(stage = "app", user_id = %id, deleted_by = %caller.user_id, "user deleted");
        Ok(())
    }

    /// Creates the administrator account unless the email is already registered.
    pub async fn seed_admin(&self, email: &str, password: &str) -> Result<Option<UserDto>, ApiError> {
        let email = normalize_email(email)?;
        validate_password(password)?;
        if self.state.storage().users().find_by_email(&email).await?.is_some() {
            return Ok(None);
        }
        let user = self
            .insert(&email, password, ("System", "Administrator"), None, Role::Admin)
            .await?;
        info!(stage = "app", user_id = %user.id, "administrator account seeded");
        Ok(Some(user))
    }
}

fn duplicate_email(err: RepositoryError) -> ApiError {
    match err {
        RepositoryError::Conflict(_) => ApiError::DuplicateEmail,
        other => other.into(),
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/register", post(register_user))
        .route("/login", post(login_user))
        .route("/me", get(current_user))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
        .route("/:id/password", put(change_password))
}

async fn register_user(
    State(state): State<AppState>,
    Json(request): Json<RegisterUserRequest>,
) -> Result<(StatusCode, Json<UserDto>), ApiError> {
    let user = state.users().register(request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn login_user(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    state.users().login(request).await.map(Json)
}

async fn list_users(State(state): State<AppState>, caller: AuthUser) -> Result<Json<Vec<UserDto>>, ApiError> {
    state.users().list(&caller).await.map(Json)
}

async fn current_user(State(state): State<AppState>, caller: AuthUser) -> Result<Json<UserDto>, ApiError> {
    state.users().get(&caller, &caller.user_id).await.map(Json)
}

async fn get_user(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<UserDto>, ApiError> {
    state.users().get(&caller, &id).await.map(Json)
}

async fn update_user(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<UserDto>, ApiError> {
    state.users().update(&caller, &id, request).await.map(Json)
}

async fn change_password(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    state.users().change_password(&caller, &id, request).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_user(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.users().delete(&caller, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
