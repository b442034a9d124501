//! Upstream server records

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::entities::ServerRecord;
use crate::error::{StorageError, StorageResult};

use super::parse_json_opt;

pub struct ServerRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ServerRepository<'a> {
    pub(crate) fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a server record. A conflicting URL on a different
    /// server id surfaces as `Conflict`.
    pub async fn put(&self, record: &ServerRecord) -> StorageResult<()> {
        let capabilities = record
            .capabilities
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let server_info = record
            .server_info
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            "INSERT INTO servers (server_id, name, url, description, capabilities, \
             protocol_version, server_info, tool_count, enabled, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) \
             ON CONFLICT (server_id) DO UPDATE SET \
             name = excluded.name, url = excluded.url, description = excluded.description, \
             capabilities = excluded.capabilities, protocol_version = excluded.protocol_version, \
             server_info = excluded.server_info, tool_count = excluded.tool_count, \
             enabled = excluded.enabled, updated_at = excluded.updated_at",
        )
        .bind(&record.server_id)
        .bind(&record.name)
        .bind(&record.url)
        .bind(&record.description)
        .bind(capabilities)
        .bind(&record.protocol_version)
        .bind(server_info)
        .bind(record.tool_count)
        .bind(record.enabled)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, server_id: &str) -> StorageResult<ServerRecord> {
        let row = sqlx::query("SELECT * FROM servers WHERE server_id = ?1")
            .bind(server_id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| StorageError::not_found("server", server_id))?;
        Self::from_row(row)
    }

    pub async fn get_by_url(&self, url: &str) -> StorageResult<Option<ServerRecord>> {
        let row = sqlx::query("SELECT * FROM servers WHERE url = ?1")
            .bind(url)
            .fetch_optional(self.pool)
            .await?;
        row.map(Self::from_row).transpose()
    }

    pub async fn list(&self, enabled_only: bool) -> StorageResult<Vec<ServerRecord>> {
        let query = if enabled_only {
            "SELECT * FROM servers WHERE enabled = 1 ORDER BY name"
        } else {
            "SELECT * FROM servers ORDER BY name"
        };
        let rows = sqlx::query(query).fetch_all(self.pool).await?;
        rows.into_iter().map(Self::from_row).collect()
    }

    /// Update the discovery snapshot after a successful handshake
    pub async fn update_discovery(
        &self,
        server_id: &str,
        capabilities: &serde_json::Value,
        protocol_version: &str,
        server_info: Option<&serde_json::Value>,
        tool_count: i64,
    ) -> StorageResult<()> {
        let affected = sqlx::query(
            "UPDATE servers SET capabilities = ?2, protocol_version = ?3, server_info = ?4, \
             tool_count = ?5, updated_at = ?6 WHERE server_id = ?1",
        )
        .bind(server_id)
        .bind(serde_json::to_string(capabilities)?)
        .bind(protocol_version)
        .bind(server_info.map(serde_json::to_string).transpose()?)
        .bind(tool_count)
        .bind(Utc::now())
        .execute(self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(StorageError::not_found("server", server_id));
        }
        Ok(())
    }

    /// Delete the record; related ACL rows go with it via FK cascade
    pub async fn delete(&self, server_id: &str) -> StorageResult<()> {
        let affected = sqlx::query("DELETE FROM servers WHERE server_id = ?1")
            .bind(server_id)
            .execute(self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(StorageError::not_found("server", server_id));
        }
        Ok(())
    }

    fn from_row(row: sqlx::sqlite::SqliteRow) -> StorageResult<ServerRecord> {
        Ok(ServerRecord {
            server_id: row.get("server_id"),
            name: row.get("name"),
            url: row.get("url"),
            description: row.get("description"),
            capabilities: parse_json_opt(row.get("capabilities"))?,
            protocol_version: row.get("protocol_version"),
            server_info: parse_json_opt(row.get("server_info"))?,
            tool_count: row.get("tool_count"),
            enabled: row.get("enabled"),
            created_at: row.get::<DateTime<Utc>, _>("created_at"),
            updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::entities::ServerRecord;
    use crate::pool::Store;
    use chrono::Utc;

    fn record(id: &str, url: &str) -> ServerRecord {
        ServerRecord {
            server_id: id.to_string(),
            name: format!("server-{}", id),
            url: url.to_string(),
            description: None,
            capabilities: Some(serde_json::json!({"tools": []})),
            protocol_version: Some("2025-06-18".to_string()),
            server_info: None,
            tool_count: 0,
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = Store::open_in_memory().await.unwrap();
        let rec = record("abc123", "http://up.example/mcp");
        store.servers().put(&rec).await.unwrap();

        let loaded = store.servers().get("abc123").await.unwrap();
        assert_eq!(loaded.url, "http://up.example/mcp");
        assert_eq!(loaded.capabilities, Some(serde_json::json!({"tools": []})));
    }

    #[tokio::test]
    async fn test_duplicate_url_conflicts() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .servers()
            .put(&record("a", "http://dup.example/mcp"))
            .await
            .unwrap();
        let err = store
            .servers()
            .put(&record("b", "http://dup.example/mcp"))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::StorageError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = Store::open_in_memory().await.unwrap();
        let err = store.servers().delete("nope").await.unwrap_err();
        assert!(matches!(err, crate::StorageError::NotFound { .. }));
    }
}
