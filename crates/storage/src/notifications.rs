use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use jobboard_core::types::{NotificationDto, NotificationKind};

use crate::{classify_write, expect_affected, new_id, to_rfc3339, RepositoryError};

const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, title, message, related_id, is_read, created_at";

/// Repository for in-app notifications.
#[derive(Clone)]
pub struct NotificationRepository {
    pub(crate) pool: SqlitePool,
}

pub struct NewNotification<'a> {
    pub user_id: &'a str,
    pub kind: NotificationKind,
    pub title: &'a str,
    pub message: &'a str,
    pub related_id: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: String,
    user_id: String,
    kind: String,
    title: String,
    message: String,
    related_id: Option<String>,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl NotificationRow {
    fn into_domain(self) -> Result<NotificationDto, RepositoryError> {
        Ok(NotificationDto {
            id: self.id,
            user_id: self.user_id,
            kind: self.kind.parse()?,
            title: self.title,
            message: self.message,
            related_id: self.related_id,
            is_read: self.is_read,
            created_at: self.created_at,
        })
    }
}

impl NotificationRepository {
    pub async fn insert(&self, record: &NewNotification<'_>) -> Result<NotificationDto, RepositoryError> {
        let id = new_id();
        sqlx::query(
            "INSERT INTO notifications (id, user_id, kind, title, message, related_id, is_read, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&id)
        .bind(record.user_id)
        .bind(record.kind.as_str())
        .bind(record.title)
        .bind(record.message)
        .bind(record.related_id)
        .bind(to_rfc3339(record.created_at))
        .execute(&self.pool)
        .await
        .map_err(|err| classify_write(err, "notification already exists"))?;

        self.find(&id).await
    }

    pub async fn find(&self, id: &str) -> Result<NotificationDto, RepositoryError> {
        let sql = format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?");
        let row = sqlx::query_as::<_, NotificationRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        row.into_domain()
    }

    /// Newest first.
    pub async fn list_for_user(
        &self,
        user_id: &str,
        unread_only: bool,
    ) -> Result<Vec<NotificationDto>, RepositoryError> {
        let filter = if unread_only { " AND is_read = 0" } else { "" };
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE user_id = ?{filter} \
             ORDER BY created_at DESC, rowid DESC"
        );
        let rows = sqlx::query_as::<_, NotificationRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(NotificationRow::into_domain).collect()
    }

    pub async fn unread_count(&self, user_id: &str) -> Result<u64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as u64)
    }

    /// Marks one notification read. Already-read rows are left as they are.
    pub async fn mark_read(&self, id: &str) -> Result<NotificationDto, RepositoryError> {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_affected(result.rows_affected())?;
        self.find(id).await
    }

    /// Returns how many notifications flipped to read.
    pub async fn mark_all_read(&self, user_id: &str) -> Result<u64, RepositoryError> {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_affected(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use jobboard_core::types::Role;

    fn note<'a>(user_id: &'a str, title: &'a str, at: i64) -> NewNotification<'a> {
        NewNotification {
            user_id,
            kind: NotificationKind::ApplicationReceived,
            title,
            message: "Someone applied",
            related_id: Some("application-1"),
            created_at: ts(at),
        }
    }

    #[tokio::test]
    async fn listing_is_newest_first_and_filters_unread() {
        let db = setup_db().await;
        let user = insert_user(&db, "boss@example.com", Role::Employer).await;
        let repo = db.notifications();
        let older = repo.insert(&note(&user, "older", 0)).await.expect("insert");
        repo.insert(&note(&user, "newer", 10)).await.expect("insert");
        assert_eq!(older.kind, NotificationKind::ApplicationReceived);
        assert!(!older.is_read);

        let titles: Vec<String> = repo
            .list_for_user(&user, false)
            .await
            .expect("list")
            .into_iter()
            .map(|n| n.title)
            .collect();
        assert_eq!(titles, vec!["newer", "older"]);

        let read = repo.mark_read(&older.id).await.expect("mark read");
        assert!(read.is_read);
        assert_eq!(repo.unread_count(&user).await.expect("count"), 1);
        let unread = repo.list_for_user(&user, true).await.expect("list unread");
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].title, "newer");
    }

    #[tokio::test]
    async fn mark_all_read_only_touches_one_user() {
        let db = setup_db().await;
        let first = insert_user(&db, "a@example.com", Role::JobSeeker).await;
        let second = insert_user(&db, "b@example.com", Role::JobSeeker).await;
        let repo = db.notifications();
        repo.insert(&note(&first, "one", 0)).await.expect("insert");
        repo.insert(&note(&first, "two", 1)).await.expect("insert");
        repo.insert(&note(&second, "three", 2)).await.expect("insert");

        assert_eq!(repo.mark_all_read(&first).await.expect("mark all"), 2);
        assert_eq!(repo.mark_all_read(&first).await.expect("mark all"), 0);
        assert_eq!(repo.unread_count(&first).await.expect("count"), 0);
        assert_eq!(repo.unread_count(&second).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn unknown_user_and_missing_rows() {
        let db = setup_db().await;
        let repo = db.notifications();
        let err = repo.insert(&note("missing", "ghost", 0)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::MissingReference));
        assert!(matches!(repo.mark_read("missing").await, Err(RepositoryError::NotFound)));
        assert!(matches!(repo.delete("missing").await, Err(RepositoryError::NotFound)));
    }
}
