//! AD/LDAP group DN to role mappings

use sqlx::{Row, SqlitePool};

use crate::entities::AdGroupMapping;
use crate::error::{StorageError, StorageResult};

use super::parse_string_vec;

pub struct MappingRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> MappingRepository<'a> {
    pub(crate) fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn put(&self, mapping: &AdGroupMapping) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO ad_group_mappings (dn, role_ids) VALUES (?1, ?2) \
             ON CONFLICT (dn) DO UPDATE SET role_ids = excluded.role_ids",
        )
        .bind(&mapping.dn)
        .bind(serde_json::to_string(&mapping.role_ids)?)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, dn: &str) -> StorageResult<Option<AdGroupMapping>> {
        let row = sqlx::query("SELECT * FROM ad_group_mappings WHERE dn = ?1")
            .bind(dn)
            .fetch_optional(self.pool)
            .await?;
        row.map(Self::from_row).transpose()
    }

    pub async fn list(&self) -> StorageResult<Vec<AdGroupMapping>> {
        let rows = sqlx::query("SELECT * FROM ad_group_mappings ORDER BY dn")
            .fetch_all(self.pool)
            .await?;
        rows.into_iter().map(Self::from_row).collect()
    }

    pub async fn delete(&self, dn: &str) -> StorageResult<()> {
        let affected = sqlx::query("DELETE FROM ad_group_mappings WHERE dn = ?1")
            .bind(dn)
            .execute(self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(StorageError::not_found("ad_group_mapping", dn));
        }
        Ok(())
    }

    fn from_row(row: sqlx::sqlite::SqliteRow) -> StorageResult<AdGroupMapping> {
        Ok(AdGroupMapping {
            dn: row.get("dn"),
            role_ids: parse_string_vec(row.get("role_ids"))?,
        })
    }
}
