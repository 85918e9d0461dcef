//! Outbound email delivery.
//!
//! Notifications are persisted first and mailed second; every [`Mailer`]
//! is treated as best-effort by its callers.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::{
    address::AddressError,
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use jobboard_util::{MailConfig, MailTransport};

/// A plain-text message addressed to a single recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(#[from] AddressError),
    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("smtp delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("mailer unavailable")]
    Unavailable,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError>;
}

/// Builds the mailer selected by configuration.
pub fn from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>, MailError> {
    match &config.transport {
        MailTransport::Log => Ok(Arc::new(LogMailer::new(config.from.clone()))),
        MailTransport::Smtp {
            host,
            port,
            username,
            password,
        } => {
            let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)?.port(*port);
            if let (Some(username), Some(password)) = (username, password) {
                builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
            }
            let from: Mailbox = config.from.parse()?;
            Ok(Arc::new(SmtpMailer {
                from,
                transport: builder.build(),
            }))
        }
    }
}

/// Writes messages to the log instead of delivering them.
#[derive(Debug, Clone)]
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        info!(
            stage = "mail",
            from = %self.from,
            to = %email.to,
            subject = %email.subject,
            body = %email.body,
            "email logged"
        );
        Ok(())
    }
}

pub struct SmtpMailer {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    fn build_message(&self, email: &OutgoingEmail) -> Result<Message, MailError> {
        let to: Mailbox = email.to.parse()?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())?;
        Ok(message)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        let message = self.build_message(email)?;
        self.transport.send(message).await?;
        info!(stage = "mail", to = %email.to, subject = %email.subject, "email delivered");
        Ok(())
    }
}

/// Collects messages in memory. Used by tests and local tooling.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    failing: bool,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer that rejects every message with [`MailError::Unavailable`].
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub async fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        if self.failing {
            return Err(MailError::Unavailable);
        }
        self.sent.lock().await.push(email.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> OutgoingEmail {
        OutgoingEmail {
            to: "seeker@example.com".into(),
            subject: "Application received".into(),
            body: "Thanks for applying".into(),
        }
    }

    #[tokio::test]
    async fn memory_mailer_records_messages() {
        let mailer = MemoryMailer::new();
        mailer.send(&email()).await.expect("send");
        assert_eq!(mailer.sent().await, vec![email()]);

        let failing = MemoryMailer::failing();
        assert!(matches!(failing.send(&email()).await, Err(MailError::Unavailable)));
        assert!(failing.sent().await.is_empty());
    }

    #[tokio::test]
    async fn log_transport_accepts_anything() {
        let mailer = from_config(&MailConfig {
            from: "no-reply@jobboard.local".into(),
            transport: MailTransport::Log,
        })
        .expect("log mailer");
        mailer.send(&email()).await.expect("logged");
    }

    #[tokio::test]
    async fn smtp_mailer_rejects_bad_addresses() {
        let config = MailConfig {
            from: "not an address".into(),
            transport: MailTransport::Smtp {
                host: "smtp.example.com".into(),
                port: 587,
                username: None,
                password: None,
            },
        };
        assert!(matches!(from_config(&config), Err(MailError::Address(_))));

        let mailer = SmtpMailer {
            from: "no-reply@jobboard.local".parse().expect("mailbox"),
            transport: AsyncSmtpTransport::<Tokio1Executor>::relay("smtp.example.com")
                .expect("relay")
                .build(),
        };
        let mut bad = email();
        bad.to = "nobody".into();
        assert!(matches!(mailer.build_message(&bad), Err(MailError::Address(_))));
        let message = mailer.build_message(&email()).expect("message");
        let raw = String::from_utf8(message.formatted()).expect("utf8");
        assert!(raw.contains("Subject: Application received"));
    }
}
