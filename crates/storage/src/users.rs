use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use jobboard_core::types::{Role, UserDto};

use crate::{classify_delete, classify_write, expect_affected, new_id, to_rfc3339, RepositoryError};

const USER_COLUMNS: &str =
    "id, email, password_hash, first_name, last_name, phone, role, is_active, created_at, updated_at";

/// Repository for account rows.
#[derive(Clone)]
pub struct UserRepository {
    pub(crate) pool: SqlitePool,
}

/// Data required to create an account. `email` must already be normalized.
pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub phone: Option<&'a str>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Profile fields replaced by an update.
pub struct UserUpdate<'a> {
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub phone: Option<&'a str>,
    pub role: Role,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

/// Account together with its password hash. Never leaves the service layer.
#[derive(Debug, Clone)]
pub struct StoredUser {
    pub user: UserDto,
    pub password_hash: String,
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    phone: Option<String>,
    role: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_domain(self) -> Result<StoredUser, RepositoryError> {
        Ok(StoredUser {
            user: UserDto {
                id: self.id,
                email: self.email,
                first_name: self.first_name,
                last_name: self.last_name,
                phone: self.phone,
                role: self.role.parse()?,
                is_active: self.is_active,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
            password_hash: self.password_hash,
        })
    }
}

impl UserRepository {
    /// Inserts a new account, reporting a conflict when the email is taken.
    pub async fn insert(&self, record: &NewUser<'_>) -> Result<UserDto, RepositoryError> {
        let id = new_id();
        let created_at = to_rfc3339(record.created_at);
        sqlx::query(
            "INSERT INTO users \
             (id, email, password_hash, first_name, last_name, phone, role, is_active, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
        )
        .bind(&id)
        .bind(record.email)
        .bind(record.password_hash)
        .bind(record.first_name)
        .bind(record.last_name)
        .bind(record.phone)
        .bind(record.role.as_str())
        .bind(&created_at)
        .bind(&created_at)
        .execute(&self.pool)
        .await
        .map_err(|err| classify_write(err, "email already registered"))?;

        self.find(&id).await
    }

    pub async fn find(&self, id: &str) -> Result<UserDto, RepositoryError> {
        Ok(self.find_stored(id).await?.user)
    }

    /// Loads an account with its password hash.
    pub async fn find_stored(&self, id: &str) -> Result<StoredUser, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        row.into_domain()
    }

    /// Looks up an account by normalized email.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<StoredUser>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.map(UserRow::into_domain).transpose()
    }

    pub async fn list(&self) -> Result<Vec<UserDto>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at, email");
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| row.into_domain().map(|stored| stored.user))
            .collect()
    }

    pub async fn update(&self, id: &str, update: &UserUpdate<'_>) -> Result<UserDto, RepositoryError> {
        let result = sqlx::query(
            "UPDATE users \
             SET email = ?, first_name = ?, last_name = ?, phone = ?, role = ?, is_active = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(update.email)
        .bind(update.first_name)
        .bind(update.last_name)
        .bind(update.phone)
        .bind(update.role.as_str())
        .bind(update.is_active)
        .bind(to_rfc3339(update.updated_at))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|err| classify_write(err, "email already registered"))?;
        expect_affected(result.rows_affected())?;

        self.find(id).await
    }

    pub async fn update_password(
        &self,
        id: &str,
        password_hash: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(to_rfc3339(updated_at))
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_affected(result.rows_affected())
    }

    /// Deletes an account; profiles, jobs, applications and notifications cascade.
    pub async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(classify_delete)?;
        expect_affected(result.rows_affected())
    }
}
