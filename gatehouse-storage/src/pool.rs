//! Store bootstrap: pool construction, migrations, seeding

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

use gatehouse_config::DatabaseConfig;

use crate::entities::RoleRecord;
use crate::error::{StorageError, StorageResult};
use crate::repositories::{
    AclRepository, AuditRepository, ConfigRepository, MappingRepository, ProviderRepository,
    RoleRepository, ServerRepository, UserRepository,
};

/// Embedded migrations, applied in order at startup
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Handle to the embedded relational store.
///
/// Cloning is cheap; all clones share one pool. Sqlite serializes writes,
/// reads run concurrently under WAL.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open or create the database file and apply pending migrations
    pub async fn open(config: &DatabaseConfig) -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", config.path))
            .map_err(|e| StorageError::Database(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory store for tests
    pub async fn open_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Database(e.to_string()))?
            .foreign_keys(true);

        // A single connection keeps the in-memory database alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> StorageResult<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Migration(e.to_string()))
    }

    /// Seed system roles and default gateway config when absent.
    ///
    /// Role definitions come from the RBAC layer so that the store stays
    /// agnostic of the permission vocabulary. Existing rows are not touched.
    pub async fn bootstrap(
        &self,
        system_roles: &[RoleRecord],
        default_config: &[(&str, serde_json::Value)],
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        for role in system_roles {
            let permissions = serde_json::to_string(&role.permissions)?;
            sqlx::query(
                "INSERT INTO roles (role_id, name, description, permissions, is_system) \
                 VALUES (?1, ?2, ?3, ?4, 1) \
                 ON CONFLICT (name) DO NOTHING",
            )
            .bind(&role.role_id)
            .bind(&role.name)
            .bind(&role.description)
            .bind(&permissions)
            .execute(&mut *tx)
            .await?;
        }

        let now = chrono::Utc::now();
        for (key, value) in default_config {
            sqlx::query(
                "INSERT INTO config (key, value, updated_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT (key) DO NOTHING",
            )
            .bind(key)
            .bind(serde_json::to_string(value)?)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!("store bootstrap complete");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn servers(&self) -> ServerRepository<'_> {
        ServerRepository::new(&self.pool)
    }

    pub fn providers(&self) -> ProviderRepository<'_> {
        ProviderRepository::new(&self.pool)
    }

    pub fn users(&self) -> UserRepository<'_> {
        UserRepository::new(&self.pool)
    }

    pub fn roles(&self) -> RoleRepository<'_> {
        RoleRepository::new(&self.pool)
    }

    pub fn acls(&self) -> AclRepository<'_> {
        AclRepository::new(&self.pool)
    }

    pub fn mappings(&self) -> MappingRepository<'_> {
        MappingRepository::new(&self.pool)
    }

    pub fn config(&self) -> ConfigRepository<'_> {
        ConfigRepository::new(&self.pool)
    }

    pub fn audit(&self) -> AuditRepository<'_> {
        AuditRepository::new(&self.pool)
    }
}
