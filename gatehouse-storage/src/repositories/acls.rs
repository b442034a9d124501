//! Per-user, per-server tool ACLs

use sqlx::{Row, SqlitePool};

use crate::entities::AclRecord;
use crate::error::{StorageError, StorageResult};

pub struct AclRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AclRepository<'a> {
    pub(crate) fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn set(&self, record: &AclRecord) -> StorageResult<()> {
        let allowed = record
            .allowed_tools
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        sqlx::query(
            "INSERT INTO server_acls (user_id, server_id, allowed_tools) VALUES (?1, ?2, ?3) \
             ON CONFLICT (user_id, server_id) DO UPDATE SET allowed_tools = excluded.allowed_tools",
        )
        .bind(&record.user_id)
        .bind(&record.server_id)
        .bind(allowed)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, user_id: &str, server_id: &str) -> StorageResult<Option<AclRecord>> {
        let row = sqlx::query(
            "SELECT * FROM server_acls WHERE user_id = ?1 AND server_id = ?2",
        )
        .bind(user_id)
        .bind(server_id)
        .fetch_optional(self.pool)
        .await?;
        row.map(Self::from_row).transpose()
    }

    pub async fn list_for_user(&self, user_id: &str) -> StorageResult<Vec<AclRecord>> {
        let rows = sqlx::query("SELECT * FROM server_acls WHERE user_id = ?1")
            .bind(user_id)
            .fetch_all(self.pool)
            .await?;
        rows.into_iter().map(Self::from_row).collect()
    }

    pub async fn clear(&self, user_id: &str, server_id: &str) -> StorageResult<()> {
        let affected =
            sqlx::query("DELETE FROM server_acls WHERE user_id = ?1 AND server_id = ?2")
                .bind(user_id)
                .bind(server_id)
                .execute(self.pool)
                .await?
                .rows_affected();
        if affected == 0 {
            return Err(StorageError::not_found("server_acl", server_id));
        }
        Ok(())
    }

    fn from_row(row: sqlx::sqlite::SqliteRow) -> StorageResult<AclRecord> {
        let allowed: Option<String> = row.get("allowed_tools");
        Ok(AclRecord {
            user_id: row.get("user_id"),
            server_id: row.get("server_id"),
            allowed_tools: allowed.map(|raw| serde_json::from_str(&raw)).transpose()?,
        })
    }
}
