use std::{env, fmt, net::SocketAddr, str::FromStr};

use super::server_bind_address;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://jobboard.db";
pub const DEFAULT_JWT_ISSUER: &str = "jobboard";
pub const DEFAULT_JWT_AUDIENCE: &str = "jobboard-clients";
pub const DEFAULT_MAIL_FROM: &str = "Job Board <no-reply@jobboard.local>";
/// Upper bound for `JWT_TTL_MINUTES`: one year.
pub const MAX_TOKEN_TTL_MINUTES: i64 = 525_600;

const DEVELOPMENT_JWT_SECRET: &str = "jobboard-development-secret-change-me";

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns `true` when the current environment should behave as development.
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Token signing parameters.
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: Vec<u8>,
    pub issuer: String,
    pub audience: String,
    pub token_ttl_minutes: i64,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("token_ttl_minutes", &self.token_ttl_minutes)
            .finish()
    }
}

/// Outgoing mail transport selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailTransport {
    Log,
    Smtp {
        host: String,
        port: u16,
        username: Option<String>,
        password: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub from: String,
    pub transport: MailTransport,
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    pub database_max_connections: u32,
    pub auth: AuthConfig,
    pub mail: MailConfig,
    pub cors_allowed_origins: Vec<String>,
    /// Credentials of the admin account seeded at startup, when both are set.
    pub admin_seed: Option<(String, String)>,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;

        let database_url = optional_var("DATABASE_URL")
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let database_max_connections = parse_var("DATABASE_MAX_CONNECTIONS", 5u32)?;

        let jwt_secret = match optional_var("JWT_SECRET") {
            Some(secret) => secret.into_bytes(),
            None if environment == Environment::Production => {
                return Err(ConfigError::MissingVar("JWT_SECRET"))
            }
            None => DEVELOPMENT_JWT_SECRET.as_bytes().to_vec(),
        };
        let auth = AuthConfig {
            jwt_secret,
            issuer: optional_var("JWT_ISSUER").unwrap_or_else(|| DEFAULT_JWT_ISSUER.to_string()),
            audience: optional_var("JWT_AUDIENCE")
                .unwrap_or_else(|| DEFAULT_JWT_AUDIENCE.to_string()),
            token_ttl_minutes: parse_bounded_var("JWT_TTL_MINUTES", 60i64, MAX_TOKEN_TTL_MINUTES)?,
        };

        let mail = MailConfig {
            from: optional_var("MAIL_FROM").unwrap_or_else(|| DEFAULT_MAIL_FROM.to_string()),
            transport: mail_transport()?,
        };

        let cors_allowed_origins = optional_var("CORS_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let admin_seed = match (optional_var("ADMIN_EMAIL"), optional_var("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some((email, password)),
            _ => None,
        };

        Ok(Self {
            bind_addr,
            environment,
            database_url,
            database_max_connections,
            auth,
            mail,
            cors_allowed_origins,
            admin_seed,
        })
    }
}

fn mail_transport() -> Result<MailTransport, ConfigError> {
    let kind = optional_var("MAIL_TRANSPORT").unwrap_or_else(|| "log".to_string());
    match kind.as_str() {
        "log" => Ok(MailTransport::Log),
        "smtp" => Ok(MailTransport::Smtp {
            host: optional_var("SMTP_HOST").ok_or(ConfigError::MissingVar("SMTP_HOST"))?,
            port: parse_var("SMTP_PORT", 587u16)?,
            username: optional_var("SMTP_USERNAME"),
            password: optional_var("SMTP_PASSWORD"),
        }),
        other => Err(ConfigError::InvalidMailTransport(other.to_string())),
    }
}

/// Reads a variable, treating empty values as unset.
fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional_var(name) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidNumber {
            name,
            value: raw.clone(),
        }),
        None => Ok(default),
    }
}

/// Like [`parse_var`], but rejects values outside `1..=max`.
fn parse_bounded_var(name: &'static str, default: i64, max: i64) -> Result<i64, ConfigError> {
    let value = parse_var(name, default)?;
    if (1..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidNumber {
            name,
            value: value.to_string(),
        })
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    InvalidNumber { name: &'static str, value: String },
    MissingVar(&'static str),
    InvalidMailTransport(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::InvalidNumber { name, value } => {
                write!(f, "{name} must be a number (got {value})")
            }
            Self::MissingVar(name) => write!(f, "{name} must be set"),
            Self::InvalidMailTransport(value) => {
                write!(f, "MAIL_TRANSPORT must be 'log' or 'smtp' (got {value})")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
