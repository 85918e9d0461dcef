use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::{info, warn};

use jobboard_core::types::{NotificationDto, NotificationKind};
use jobboard_mail::{Mailer, OutgoingEmail};
use jobboard_storage::{Database, NewNotification, RepositoryError};

/// Message content shared by in-app notifications and their emails.
#[derive(Debug, Clone)]
pub struct NotificationDraft {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related_id: Option<String>,
}

/// Persists notifications and mails them on a background task.
#[derive(Clone)]
pub struct Notifier {
    storage: Database,
    mailer: Arc<dyn Mailer>,
}

impl Notifier {
    pub fn new(storage: Database, mailer: Arc<dyn Mailer>) -> Self {
        Self { storage, mailer }
    }

    pub async fn create(
        &self,
        user_id: &str,
        draft: &NotificationDraft,
        now: DateTime<Utc>,
    ) -> Result<NotificationDto, RepositoryError> {
        let notification = self
            .storage
            .notifications()
            .insert(&NewNotification {
                user_id,
                kind: draft.kind,
                title: &draft.title,
                message: &draft.message,
                related_id: draft.related_id.as_deref(),
                created_at: now,
            })
            .await?;
        counter!("notifications_created_total", "kind" => draft.kind.as_str()).increment(1);
        self.spawn_email(&notification);
        Ok(notification)
    }

    /// Notifies the account that owns the job's employer profile.
    ///
    /// Never fails: lookup and persistence errors are logged and dropped.
    pub async fn notify_employer(&self, job_id: &str, draft: &NotificationDraft, now: DateTime<Utc>) {
        let owner = match self.storage.jobs().find_with_employer(job_id).await {
            Ok(owner) => owner,
            Err(RepositoryError::NotFound) => {
                warn!(stage = "notify", job_id, "employer for job not found; skipping notification");
                return;
            }
            Err(err) => {
                warn!(stage = "notify", job_id, error = %err, "employer lookup failed; skipping notification");
                return;
            }
        };
        self.notify_user(&owner.employer_user_id, draft, now).await;
    }

    /// Fail-open variant of [`Notifier::create`].
    pub async fn notify_user(&self, user_id: &str, draft: &NotificationDraft, now: DateTime<Utc>) {
        if let Err(err) = self.create(user_id, draft, now).await {
            warn!(stage = "notify", user_id, kind = draft.kind.as_str(), error = %err, "failed to persist notification");
        }
    }

    fn spawn_email(&self, notification: &NotificationDto) {
        let storage = self.storage.clone();
        let mailer = self.mailer.clone();
        let notification = notification.clone();
        tokio::spawn(async move {
            let recipient = match storage.users().find(&notification.user_id).await {
                Ok(user) => user,
                Err(err) => {
                    warn!(stage = "mail", user_id = %notification.user_id, error = %err, "recipient lookup failed");
                    counter!("email_dispatch_total", "result" => "skipped").increment(1);
                    return;
                }
            };
            let email = OutgoingEmail {
                to: recipient.email,
                subject: notification.title,
                body: notification.message,
            };
            match mailer.send(&email).await {
                Ok(()) => {
                    counter!("email_dispatch_total", "result" => "sent").increment(1);
                    info!(stage = "mail", notification_id = %notification.id, "notification email dispatched");
                }
                Err(err) => {
                    counter!("email_dispatch_total", "result" => "failed").increment(1);
                    warn!(stage = "mail", notification_id = %notification.id, error = %err, "notification email failed");
                }
            }
        });
    }
}
