//! Gateway config key/value store

use sqlx::{Row, SqlitePool};

use crate::error::StorageResult;

pub struct ConfigRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ConfigRepository<'a> {
    pub(crate) fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> StorageResult<Option<serde_json::Value>> {
        let row = sqlx::query("SELECT value FROM config WHERE key = ?1")
            .bind(key)
            .fetch_optional(self.pool)
            .await?;
        match row {
            Some(row) => {
                let raw: String = row.get("value");
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    pub async fn set(&self, key: &str, value: &serde_json::Value) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO config (key, value, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT (key) DO UPDATE SET value = excluded.value, \
             updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(serde_json::to_string(value)?)
        .bind(chrono::Utc::now())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn all(&self) -> StorageResult<Vec<(String, serde_json::Value)>> {
        let rows = sqlx::query("SELECT key, value FROM config ORDER BY key")
            .fetch_all(self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                let raw: String = row.get("value");
                Ok((row.get("key"), serde_json::from_str(&raw)?))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::pool::Store;

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let store = Store::open_in_memory().await.unwrap();
        let value = serde_json::json!({"rate_limit_rpm": 120, "origins": ["http://a"]});
        store.config().set("limits", &value).await.unwrap();
        let loaded = store.config().get("limits").await.unwrap();
        assert_eq!(loaded, Some(value));

        // Overwrite wins
        store.config().set("limits", &serde_json::json!(5)).await.unwrap();
        assert_eq!(
            store.config().get("limits").await.unwrap(),
            Some(serde_json::json!(5))
        );
    }
}
