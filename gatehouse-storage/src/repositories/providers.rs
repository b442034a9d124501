//! OAuth provider records

use sqlx::{Row, SqlitePool};

use crate::entities::ProviderRecord;
use crate::error::{StorageError, StorageResult};

use super::parse_string_vec;

pub struct ProviderRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ProviderRepository<'a> {
    pub(crate) fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn put(&self, record: &ProviderRecord) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO oauth_providers (provider_id, provider_name, client_id, \
             client_secret_ciphertext, authorize_url, token_url, userinfo_url, scopes, enabled) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
             ON CONFLICT (provider_id) DO UPDATE SET \
             provider_name = excluded.provider_name, client_id = excluded.client_id, \
             client_secret_ciphertext = excluded.client_secret_ciphertext, \
             authorize_url = excluded.authorize_url, token_url = excluded.token_url, \
             userinfo_url = excluded.userinfo_url, scopes = excluded.scopes, \
             enabled = excluded.enabled",
        )
        .bind(&record.provider_id)
        .bind(&record.provider_name)
        .bind(&record.client_id)
        .bind(&record.client_secret_ciphertext)
        .bind(&record.authorize_url)
        .bind(&record.token_url)
        .bind(&record.userinfo_url)
        .bind(serde_json::to_string(&record.scopes)?)
        .bind(record.enabled)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, provider_id: &str) -> StorageResult<ProviderRecord> {
        let row = sqlx::query("SELECT * FROM oauth_providers WHERE provider_id = ?1")
            .bind(provider_id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| StorageError::not_found("oauth_provider", provider_id))?;
        Self::from_row(row)
    }

    pub async fn list(&self, enabled_only: bool) -> StorageResult<Vec<ProviderRecord>> {
        let query = if enabled_only {
            "SELECT * FROM oauth_providers WHERE enabled = 1 ORDER BY provider_name"
        } else {
            "SELECT * FROM oauth_providers ORDER BY provider_name"
        };
        let rows = sqlx::query(query).fetch_all(self.pool).await?;
        rows.into_iter().map(Self::from_row).collect()
    }

    pub async fn delete(&self, provider_id: &str) -> StorageResult<()> {
        let affected = sqlx::query("DELETE FROM oauth_providers WHERE provider_id = ?1")
            .bind(provider_id)
            .execute(self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(StorageError::not_found("oauth_provider", provider_id));
        }
        Ok(())
    }

    fn from_row(row: sqlx::sqlite::SqliteRow) -> StorageResult<ProviderRecord> {
        Ok(ProviderRecord {
            provider_id: row.get("provider_id"),
            provider_name: row.get("provider_name"),
            client_id: row.get("client_id"),
            client_secret_ciphertext: row.get("client_secret_ciphertext"),
            authorize_url: row.get("authorize_url"),
            token_url: row.get("token_url"),
            userinfo_url: row.get("userinfo_url"),
            scopes: parse_string_vec(row.get("scopes"))?,
            enabled: row.get("enabled"),
        })
    }
}
