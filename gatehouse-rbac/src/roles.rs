//! Role management with system-role protection

use std::collections::HashSet;

use uuid::Uuid;

use gatehouse_storage::{RoleRecord, Store};

use crate::error::{RbacError, RbacResult};
use crate::models::Permission;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";
pub const ROLE_VIEWER: &str = "viewer";

/// Role assigned to users created through their first OAuth callback
pub const DEFAULT_ROLE: &str = ROLE_USER;

/// System role definitions seeded at startup
pub fn system_roles() -> Vec<RoleRecord> {
    vec![
        role_record(
            ROLE_ADMIN,
            "Full administrative access",
            Permission::ALL.iter().copied().collect(),
        ),
        role_record(
            ROLE_USER,
            "Tool execution and read access",
            vec![
                Permission::ServerView,
                Permission::ToolView,
                Permission::ToolExecute,
                Permission::ConfigView,
            ],
        ),
        role_record(
            ROLE_VIEWER,
            "Read-only access",
            vec![Permission::ServerView, Permission::ToolView],
        ),
    ]
}

/// Minimum permission set a system role can never drop below
pub fn system_minimum(name: &str) -> Option<HashSet<Permission>> {
    system_roles()
        .into_iter()
        .find(|r| r.name == name)
        .map(|r| {
            r.permissions
                .iter()
                .filter_map(|p| p.parse().ok())
                .collect()
        })
}

fn role_record(name: &str, description: &str, permissions: Vec<Permission>) -> RoleRecord {
    RoleRecord {
        role_id: format!("role-{}", name),
        name: name.to_string(),
        description: description.to_string(),
        permissions: permissions.iter().map(|p| p.as_str().to_string()).collect(),
        is_system: true,
    }
}

/// Role CRUD guarded by the system-role rules
#[derive(Clone)]
pub struct RoleService {
    store: Store,
}

impl RoleService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> RbacResult<Vec<RoleRecord>> {
        Ok(self.store.roles().list().await?)
    }

    pub async fn create(
        &self,
        name: &str,
        description: &str,
        permissions: &[String],
    ) -> RbacResult<RoleRecord> {
        let parsed = parse_permissions(permissions)?;
        let record = RoleRecord {
            role_id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            permissions: parsed.iter().map(|p| p.as_str().to_string()).collect(),
            is_system: false,
        };
        self.store.roles().put(&record).await?;
        Ok(record)
    }

    /// Update a role's description and permission set. System roles may gain
    /// permissions but never drop below their seeded minima.
    pub async fn update(
        &self,
        role_id: &str,
        description: Option<&str>,
        permissions: Option<&[String]>,
    ) -> RbacResult<RoleRecord> {
        let mut record = self.store.roles().get(role_id).await?;

        if let Some(desc) = description {
            record.description = desc.to_string();
        }
        if let Some(raw) = permissions {
            let requested = parse_permissions(raw)?;
            if record.is_system {
                let minimum = system_minimum(&record.name).unwrap_or_default();
                if !minimum.is_subset(&requested) {
                    return Err(RbacError::immutable(&record.name, "reduced below its minimum"));
                }
            }
            record.permissions = requested.iter().map(|p| p.as_str().to_string()).collect();
        }

        self.store.roles().put(&record).await?;
        Ok(record)
    }

    pub async fn delete(&self, role_id: &str) -> RbacResult<()> {
        let record = self.store.roles().get(role_id).await?;
        if record.is_system {
            return Err(RbacError::immutable(&record.name, "deleted"));
        }
        self.store.roles().delete(role_id).await?;
        Ok(())
    }
}

fn parse_permissions(raw: &[String]) -> RbacResult<HashSet<Permission>> {
    raw.iter()
        .map(|s| {
            s.parse::<Permission>()
                .map_err(|_| RbacError::UnknownPermission(s.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_system_role_cannot_be_deleted() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .bootstrap(&system_roles(), &[])
            .await
            .unwrap();
        let service = RoleService::new(store);

        let err = service.delete("role-admin").await.unwrap_err();
        assert!(matches!(err, RbacError::SystemRoleImmutable { .. }));
    }

    #[tokio::test]
    async fn test_viewer_cannot_gain_then_lose_minimum() {
        let store = Store::open_in_memory().await.unwrap();
        store.bootstrap(&system_roles(), &[]).await.unwrap();
        let service = RoleService::new(store);

        // Growing the set is allowed
        let updated = service
            .update(
                "role-viewer",
                None,
                Some(&[
                    "server:view".to_string(),
                    "tool:view".to_string(),
                    "audit:view".to_string(),
                ]),
            )
            .await
            .unwrap();
        assert!(updated.permissions.contains(&"audit:view".to_string()));

        // Dropping below the seeded minimum is not
        let err = service
            .update("role-viewer", None, Some(&["audit:view".to_string()]))
            .await
            .unwrap_err();
        assert!(matches!(err, RbacError::SystemRoleImmutable { .. }));
    }

    #[tokio::test]
    async fn test_custom_role_lifecycle() {
        let store = Store::open_in_memory().await.unwrap();
        let service = RoleService::new(store);

        let role = service
            .create("ops", "operations", &["server:view".to_string(), "server:test".to_string()])
            .await
            .unwrap();
        let err = service
            .create("bad", "", &["tool:fly".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, RbacError::UnknownPermission(_)));

        service.delete(&role.role_id).await.unwrap();
    }
}
