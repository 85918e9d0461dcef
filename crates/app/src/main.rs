mod applications;
mod auth;
mod employers;
mod error;
mod job_seekers;
mod jobs;
mod notifications;
mod notify;
mod problem;
mod resumes;
mod router;
mod telemetry;
mod users;

#[cfg(test)]
mod test_support;

use std::net::SocketAddr;

use tracing::info;
use jobboard_storage::Database;
use jobboard_util::{load_env_file, AppConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let storage = Database::connect_with(&config.database_url, config.database_max_connections).await?;
    storage.run_migrations().await?;
    info!(stage = "app", max_connections = config.database_max_connections, "database ready");

    let tokens = auth::TokenService::new(&config.auth);
    let mailer = jobboard_mail::from_config(&config.mail)?;
    let state = router::AppState::new(metrics, storage, tokens, mailer);

    if let Some((email, password)) = &config.admin_seed {
        state.users().seed_admin(email, password).await?;
    }

    let mut app = router::app_router(state);
    if let Some(cors) = router::cors_layer(config.environment, &config.cors_allowed_origins) {
        app = app.layer(cors);
    }

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await.map_err(|err| err.into())
}
