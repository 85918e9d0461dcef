use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use jobboard_core::requests::CreateNotificationRequest;
use jobboard_core::types::NotificationDto;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::notify::NotificationDraft;
use crate::router::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub updated: u64,
}

pub struct NotificationService<'a> {
    state: &'a AppState,
}

impl<'a> NotificationService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Manual notification issued by an administrator.
    pub async fn create(
        &self,
        caller: &AuthUser,
        request: CreateNotificationRequest,
    ) -> Result<NotificationDto, ApiError> {
        caller.require_admin()?;
        request.validate()?;
        let recipient = self
            .state
            .storage()
            .users()
            .find(&request.user_id)
            .await
            .map_err(ApiError::lookup("user"))?;
        let draft = NotificationDraft {
            kind: request.kind,
            title: request.title.trim().to_string(),
            message: request.message.trim().to_string(),
            related_id: request.related_id,
        };
        self.state
            .notifier()
            .create(&recipient.id, &draft, self.state.now())
            .await
            .map_err(ApiError::lookup("user"))
    }

    async fn owned(&self, caller: &AuthUser, id: &str) -> Result<NotificationDto, ApiError> {
        let notification = self
            .state
            .storage()
            .notifications()
            .find(id)
            .await
            .map_err(ApiError::lookup("notification"))?;
        caller.require_self_or_admin(&notification.user_id)?;
        Ok(notification)
    }

    pub async fn get(&self, caller: &AuthUser, id: &str) -> Result<NotificationDto, ApiError> {
        self.owned(caller, id).await
    }

    pub async fn list_for_user(
        &self,
        caller: &AuthUser,
        user_id: &str,
        query: NotificationQuery,
    ) -> Result<Vec<NotificationDto>, ApiError> {
        caller.require_self_or_admin(user_id)?;
        Ok(self
            .state
            .storage()
            .notifications()
            .list_for_user(user_id, query.unread_only)
            .await?)
    }

    pub async fn unread_count(&self, caller: &AuthUser, user_id: &str) -> Result<UnreadCount, ApiError> {
        caller.require_self_or_admin(user_id)?;
        let count = self.state.storage().notifications().unread_count(user_id).await?;
        Ok(UnreadCount { count })
    }

    pub async fn mark_read(&self, caller: &AuthUser, id: &str) -> Result<NotificationDto, ApiError> {
        self.owned(caller, id).await?;
        self.state
            .storage()
            .notifications()
            .mark_read(id)
            .await
            .map_err(ApiError::lookup("notification"))
    }

    pub async fn mark_all_read(&self, caller: &AuthUser, user_id: &str) -> Result<MarkedRead, ApiError> {
        caller.require_self_or_admin(user_id)?;
        let updated = self.state.storage().notifications().mark_all_read(user_id).await?;
        info!(stage = "app", user_id, updated, "notifications marked read");
        Ok(MarkedRead { updated })
    }

    pub async fn delete(&self, caller: &AuthUser, id: &str) -> Result<(), ApiError> {
        self.owned(caller, id).await?;
        self.state
            .storage()
            .notifications()
            .delete(id)
            .await
            .map_err(ApiError::lookup("notification"))
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_notification))
        .route("/:id", get(get_notification).delete(delete_notification))
        .route("/:id/read", put(mark_notification_read))
        .route("/user/:user_id", get(notifications_for_user))
        .route("/user/:user_id/unread-count", get(unread_for_user))
        .route("/user/:user_id/read-all", put(mark_all_for_user))
}

async fn create_notification(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(request): Json<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<NotificationDto>), ApiError> {
    let notification = state.notifications().create(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}

async fn get_notification(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<NotificationDto>, ApiError> {
    state.notifications().get(&caller, &id).await.map(Json)
}

async fn delete_notification(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.notifications().delete(&caller, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn mark_notification_read(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<NotificationDto>, ApiError> {
    state.notifications().mark_read(&caller, &id).await.map(Json)
}

async fn notifications_for_user(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(user_id): Path<String>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Vec<NotificationDto>>, ApiError> {
    state
        .notifications()
        .list_for_user(&caller, &user_id, query)
        .await
        .map(Json)
}

async fn unread_for_user(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(user_id): Path<String>,
) -> Result<Json<UnreadCount>, ApiError> {
    state.notifications().unread_count(&caller, &user_id).await.map(Json)
}

async fn mark_all_for_user(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(user_id): Path<String>,
) -> Result<Json<MarkedRead>, ApiError> {
    state.notifications().mark_all_read(&caller, &user_id).await.map(Json)
}
