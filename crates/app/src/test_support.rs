//! Fixtures shared by the HTTP and service tests.

use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use jobboard_core::requests::{
    CreateEmployerRequest, CreateJobRequest, CreateJobSeekerRequest, CreateResumeRequest,
    EmployerProfile, JobDraft, JobSeekerProfile, RegisterUserRequest, ResumeDraft,
};
use jobboard_core::types::{EmployerDto, EmploymentType, JobDto, JobSeekerDto, ResumeDto, Role, UserDto};
use jobboard_mail::{MemoryMailer, OutgoingEmail};
use jobboard_storage::Database;
use jobboard_util::AuthConfig;

use crate::auth::{AuthUser, TokenService};
use crate::router::{app_router, AppState};
use crate::telemetry;

pub const PASSWORD: &str = "s3cret-password";

pub fn auth_config() -> AuthConfig {
    AuthConfig {
        jwt_secret: b"test-secret".to_vec(),
        issuer: "jobboard".into(),
        audience: "jobboard-clients".into(),
        token_ttl_minutes: 60,
    }
}

pub async fn setup_state() -> AppState {
    setup_state_with_mailer(Arc::new(MemoryMailer::new())).await
}

pub async fn setup_state_with_mailer(mailer: Arc<MemoryMailer>) -> AppState {
    let metrics = telemetry::init_metrics().expect("metrics init");
    let database = Database::connect("sqlite::memory:").await.expect("connect");
    database.run_migrations().await.expect("migrations");
    AppState::new(metrics, database, TokenService::new(&auth_config()), mailer)
}

pub async fn register(state: &AppState, email: &str, role: Role) -> UserDto {
    state
        .users()
        .register(RegisterUserRequest {
            email: email.to_string(),
            password: PASSWORD.to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            phone: None,
            role,
        })
        .await
        .expect("register")
}

pub fn token_for(state: &AppState, user: &UserDto) -> String {
    state.tokens().issue(user, state.now()).expect("issue token").0
}

pub fn caller(user: &UserDto) -> AuthUser {
    AuthUser {
        user_id: user.id.clone(),
        role: user.role,
        email: user.email.clone(),
    }
}

/// A registered account together with a bearer token for it.
pub struct Account {
    pub user: UserDto,
    pub token: String,
}

impl Account {
    pub fn caller(&self) -> AuthUser {
        caller(&self.user)
    }
}

pub async fn account(state: &AppState, email: &str, role: Role) -> Account {
    let user = register(state, email, role).await;
    let token = token_for(state, &user);
    Account { user, token }
}

pub async fn admin(state: &AppState) -> Account {
    let user = state
        .users()
        .seed_admin("admin@example.com", PASSWORD)
        .await
        .expect("seed admin")
        .expect("admin created");
    let token = token_for(state, &user);
    Account { user, token }
}

pub async fn employer(state: &AppState, email: &str) -> (Account, EmployerDto) {
    let account = account(state, email, Role::Employer).await;
    let profile = state
        .employers()
        .create(
            &account.caller(),
            CreateEmployerRequest {
                user_id: account.user.id.clone(),
                profile: EmployerProfile {
                    company_name: "Acme".to_string(),
                    location: Some("Berlin".to_string()),
                    ..EmployerProfile::default()
                },
            },
        )
        .await
        .expect("employer profile");
    (account, profile)
}

pub async fn job_seeker(state: &AppState, email: &str) -> (Account, JobSeekerDto) {
    let account = account(state, email, Role::JobSeeker).await;
    let profile = state
        .job_seekers()
        .create(
            &account.caller(),
            CreateJobSeekerRequest {
                user_id: account.user.id.clone(),
                profile: JobSeekerProfile {
                    headline: Some("Engineer".to_string()),
                    skills: vec!["Rust".to_string()],
                    ..JobSeekerProfile::default()
                },
            },
        )
        .await
        .expect("job seeker profile");
    (account, profile)
}

pub fn job_draft(title: &str) -> JobDraft {
    JobDraft {
        title: title.to_string(),
        description: "Build things".to_string(),
        requirements: None,
        location: Some("Remote".to_string()),
        employment_type: EmploymentType::FullTime,
        salary_min: Some(50_000),
        salary_max: Some(80_000),
        status: None,
        closing_date: None,
    }
}

pub async fn open_job(state: &AppState, owner: &Account, employer: &EmployerDto, title: &str) -> JobDto {
    state
        .jobs()
        .create(
            &owner.caller(),
            CreateJobRequest {
                employer_id: employer.id.clone(),
                draft: job_draft(title),
            },
        )
        .await
        .expect("job")
}

pub async fn resume(state: &AppState, owner: &Account, seeker: &JobSeekerDto, title: &str) -> ResumeDto {
    state
        .resumes()
        .create(
            &owner.caller(),
            CreateResumeRequest {
                job_seeker_id: seeker.id.clone(),
                draft: ResumeDraft {
                    title: title.to_string(),
                    file_url: Some("https://files.example.com/cv.pdf".to_string()),
                    content: None,
                    is_default: false,
                },
            },
        )
        .await
        .expect("resume")
}

/// Sends one request through the full router and decodes the JSON body (`Null` when empty).
pub async fn send(
    state: &AppState,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    };

    let response = app_router(state.clone())
        .oneshot(request)
        .await
        .expect("handler should respond");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should read")
        .to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, json)
}

/// Waits for the background mail task to deliver at least `count` messages.
pub async fn wait_for_mail(mailer: &MemoryMailer, count: usize) -> Vec<OutgoingEmail> {
    for _ in 0..100 {
        let sent = mailer.sent().await;
        if sent.len() >= count {
            return sent;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {count} emails, got {:?}", mailer.sent().await);
}
