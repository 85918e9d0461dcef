use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use jobboard_mail::Mailer;
use jobboard_storage::Database;
use jobboard_util::Environment;

use crate::applications::{self, ApplicationService};
use crate::auth::{Passwords, TokenService};
use crate::employers::{self, EmployerService};
use crate::job_seekers::{self, JobSeekerService};
use crate::jobs::{self, JobService};
use crate::notifications::{self, NotificationService};
use crate::notify::Notifier;
use crate::resumes::{self, ResumeService};
use crate::telemetry;
use crate::users::{self, UserService};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    tokens: TokenService,
    passwords: Passwords,
    notifier: Notifier,
    clock: Clock,
}

impl AppState {
    pub fn new(
        metrics: PrometheusHandle,
        storage: Database,
        tokens: TokenService,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let notifier = Notifier::new(storage.clone(), mailer);
        Self {
            metrics,
            storage,
            tokens,
            passwords: Passwords::default(),
            notifier,
            clock: Arc::new(Utc::now),
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn passwords(&self) -> &Passwords {
        &self.passwords
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn users(&self) -> UserService<'_> {
        UserService::new(self)
    }

    pub fn employers(&self) -> EmployerService<'_> {
        EmployerService::new(self)
    }

    pub fn job_seekers(&self) -> JobSeekerService<'_> {
        JobSeekerService::new(self)
    }

    pub fn jobs(&self) -> JobService<'_> {
        JobService::new(self)
    }

    pub fn applications(&self) -> ApplicationService<'_> {
        ApplicationService::new(self)
    }

    pub fn resumes(&self) -> ResumeService<'_> {
        ResumeService::new(self)
    }

    pub fn notifications(&self) -> NotificationService<'_> {
        NotificationService::new(self)
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .nest("/api/User", users::routes())
        .nest("/api/Employer", employers::routes())
        .nest("/api/JobSeeker", job_seekers::routes())
        .nest("/api/Job", jobs::routes())
        .nest("/api/Application", applications::routes())
        .nest("/api/Resume", resumes::routes())
        .nest("/api/Notification", notifications::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS policy for the browser frontend.
///
/// Explicit origins win; without them development is permissive and other
/// environments send no CORS headers.
pub fn cors_layer(environment: Environment, allowed_origins: &[String]) -> Option<CorsLayer> {
    if allowed_origins.is_empty() {
        return environment.is_development().then(CorsLayer::permissive);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(stage = "app", %origin, error = %err, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::test_support::setup_state;

    #[tokio::test]
    async fn healthz_returns_ok() {
        let app = app_router(setup_state().await);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_exports_build_info() {
        let app = app_router(setup_state().await);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::OK);
        let collected = response
            .into_body()
            .collect()
            .await
            .expect("body should read");
        let body = String::from_utf8(collected.to_bytes().to_vec()).expect("utf-8");
        assert!(body.contains("app_build_info"));
        assert!(body.contains("app_uptime_seconds"));
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let app = app_router(setup_state().await);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/Nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn cors_depends_on_environment_and_origins() {
        assert!(cors_layer(Environment::Development, &[]).is_some());
        assert!(cors_layer(Environment::Production, &[]).is_none());
        let origins = vec!["https://jobs.example.com".to_string()];
        assert!(cors_layer(Environment::Production, &origins).is_some());
    }
}
