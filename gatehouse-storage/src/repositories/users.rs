//! User records
//!
//! Emails are stored lowercased; lookups lowercase their input so the
//! at-most-one-user-per-email invariant holds regardless of caller casing.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::entities::UserRecord;
use crate::error::{StorageError, StorageResult};

pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub(crate) fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, record: &UserRecord) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO users (user_id, email, display_name, provider_id, subject, enabled, \
             created_at, last_login_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&record.user_id)
        .bind(record.email.to_lowercase())
        .bind(&record.display_name)
        .bind(&record.provider_id)
        .bind(&record.subject)
        .bind(record.enabled)
        .bind(record.created_at)
        .bind(record.last_login_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, user_id: &str) -> StorageResult<UserRecord> {
        let row = sqlx::query("SELECT * FROM users WHERE user_id = ?1")
            .bind(user_id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| StorageError::not_found("user", user_id))?;
        Self::from_row(row)
    }

    pub async fn get_by_email(&self, email: &str) -> StorageResult<Option<UserRecord>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?1")
            .bind(email.to_lowercase())
            .fetch_optional(self.pool)
            .await?;
        row.map(Self::from_row).transpose()
    }

    pub async fn get_by_subject(
        &self,
        provider_id: &str,
        subject: &str,
    ) -> StorageResult<Option<UserRecord>> {
        let row = sqlx::query("SELECT * FROM users WHERE provider_id = ?1 AND subject = ?2")
            .bind(provider_id)
            .bind(subject)
            .fetch_optional(self.pool)
            .await?;
        row.map(Self::from_row).transpose()
    }

    pub async fn list(&self) -> StorageResult<Vec<UserRecord>> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY email")
            .fetch_all(self.pool)
            .await?;
        rows.into_iter().map(Self::from_row).collect()
    }

    /// Record a successful login and refresh identity fields that the
    /// provider may have changed (display name, subject linkage)
    pub async fn touch_login(
        &self,
        user_id: &str,
        display_name: &str,
        provider_id: &str,
        subject: &str,
    ) -> StorageResult<()> {
        let affected = sqlx::query(
            "UPDATE users SET last_login_at = ?2, display_name = ?3, provider_id = ?4, \
             subject = ?5 WHERE user_id = ?1",
        )
        .bind(user_id)
        .bind(Utc::now())
        .bind(display_name)
        .bind(provider_id)
        .bind(subject)
        .execute(self.pool)
        .await?
        .rows_affected();
        if affected == 0 {
            return Err(StorageError::not_found("user", user_id));
        }
        Ok(())
    }

    pub async fn set_enabled(&self, user_id: &str, enabled: bool) -> StorageResult<()> {
        let affected = sqlx::query("UPDATE users SET enabled = ?2 WHERE user_id = ?1")
            .bind(user_id)
            .bind(enabled)
            .execute(self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(StorageError::not_found("user", user_id));
        }
        Ok(())
    }

    fn from_row(row: sqlx::sqlite::SqliteRow) -> StorageResult<UserRecord> {
        Ok(UserRecord {
            user_id: row.get("user_id"),
            email: row.get("email"),
            display_name: row.get("display_name"),
            provider_id: row.get("provider_id"),
            subject: row.get("subject"),
            enabled: row.get("enabled"),
            created_at: row.get::<DateTime<Utc>, _>("created_at"),
            last_login_at: row.get::<Option<DateTime<Utc>>, _>("last_login_at"),
        })
    }
}
