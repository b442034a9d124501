//! Roles and role bindings

use sqlx::{Row, SqlitePool};

use crate::entities::RoleRecord;
use crate::error::{StorageError, StorageResult};

use super::parse_string_vec;

pub struct RoleRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> RoleRepository<'a> {
    pub(crate) fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn put(&self, record: &RoleRecord) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO roles (role_id, name, description, permissions, is_system) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT (role_id) DO UPDATE SET \
             name = excluded.name, description = excluded.description, \
             permissions = excluded.permissions",
        )
        .bind(&record.role_id)
        .bind(&record.name)
        .bind(&record.description)
        .bind(serde_json::to_string(&record.permissions)?)
        .bind(record.is_system)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, role_id: &str) -> StorageResult<RoleRecord> {
        let row = sqlx::query("SELECT * FROM roles WHERE role_id = ?1")
            .bind(role_id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| StorageError::not_found("role", role_id))?;
        Self::from_row(row)
    }

    pub async fn get_by_name(&self, name: &str) -> StorageResult<Option<RoleRecord>> {
        let row = sqlx::query("SELECT * FROM roles WHERE name = ?1")
            .bind(name)
            .fetch_optional(self.pool)
            .await?;
        row.map(Self::from_row).transpose()
    }

    pub async fn list(&self) -> StorageResult<Vec<RoleRecord>> {
        let rows = sqlx::query("SELECT * FROM roles ORDER BY name")
            .fetch_all(self.pool)
            .await?;
        rows.into_iter().map(Self::from_row).collect()
    }

    pub async fn delete(&self, role_id: &str) -> StorageResult<()> {
        let affected = sqlx::query("DELETE FROM roles WHERE role_id = ?1")
            .bind(role_id)
            .execute(self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(StorageError::not_found("role", role_id));
        }
        Ok(())
    }

    pub async fn assign(&self, user_id: &str, role_id: &str) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO role_bindings (user_id, role_id) VALUES (?1, ?2) \
             ON CONFLICT (user_id, role_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(role_id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn revoke(&self, user_id: &str, role_id: &str) -> StorageResult<()> {
        let affected =
            sqlx::query("DELETE FROM role_bindings WHERE user_id = ?1 AND role_id = ?2")
                .bind(user_id)
                .bind(role_id)
                .execute(self.pool)
                .await?
                .rows_affected();
        if affected == 0 {
            return Err(StorageError::not_found("role_binding", role_id));
        }
        Ok(())
    }

    /// Roles bound to a user, in binding order
    pub async fn roles_for_user(&self, user_id: &str) -> StorageResult<Vec<RoleRecord>> {
        let rows = sqlx::query(
            "SELECT r.* FROM roles r \
             JOIN role_bindings b ON b.role_id = r.role_id \
             WHERE b.user_id = ?1 ORDER BY r.name",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        rows.into_iter().map(Self::from_row).collect()
    }

    fn from_row(row: sqlx::sqlite::SqliteRow) -> StorageResult<RoleRecord> {
        Ok(RoleRecord {
            role_id: row.get("role_id"),
            name: row.get("name"),
            description: row.get("description"),
            permissions: parse_string_vec(row.get("permissions"))?,
            is_system: row.get("is_system"),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::entities::{RoleRecord, UserRecord};
    use crate::pool::Store;
    use chrono::Utc;

    fn role(id: &str, name: &str, perms: &[&str]) -> RoleRecord {
        RoleRecord {
            role_id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            permissions: perms.iter().map(|s| s.to_string()).collect(),
            is_system: false,
        }
    }

    #[tokio::test]
    async fn test_bindings_roundtrip() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .users()
            .insert(&UserRecord {
                user_id: "u1".to_string(),
                email: "u1@x.example".to_string(),
                display_name: String::new(),
                provider_id: None,
                subject: None,
                enabled: true,
                created_at: Utc::now(),
                last_login_at: None,
            })
            .await
            .unwrap();
        store.roles().put(&role("r1", "ops", &["server:view"])).await.unwrap();
        store.roles().put(&role("r2", "exec", &["tool:execute"])).await.unwrap();

        store.roles().assign("u1", "r1").await.unwrap();
        store.roles().assign("u1", "r2").await.unwrap();
        // Assigning twice is a no-op
        store.roles().assign("u1", "r1").await.unwrap();

        let roles = store.roles().roles_for_user("u1").await.unwrap();
        assert_eq!(roles.len(), 2);

        store.roles().revoke("u1", "r1").await.unwrap();
        let roles = store.roles().roles_for_user("u1").await.unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].name, "exec");
    }
}
