//! Permission enforcement with a copy-on-write cache
//!
//! Effective permissions are the union over a user's bound roles. The cache
//! maps user id to an immutable permission set; readers clone the current
//! snapshot `Arc` and never block writers. Binding or role changes
//! invalidate affected entries.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use gatehouse_audit::{AuditEvent, AuditKind, AuditRecorder};
use gatehouse_storage::Store;

use crate::error::RbacResult;
use crate::models::Permission;

type PermissionSnapshot = HashMap<String, Arc<HashSet<Permission>>>;

/// Permission checker shared across request handlers
#[derive(Clone)]
pub struct Enforcer {
    store: Store,
    audit: AuditRecorder,
    cache: Arc<RwLock<Arc<PermissionSnapshot>>>,
}

impl Enforcer {
    pub fn new(store: Store, audit: AuditRecorder) -> Self {
        Self {
            store,
            audit,
            cache: Arc::new(RwLock::new(Arc::new(HashMap::new()))),
        }
    }

    /// Effective permission set for a user, from cache or recomputed
    pub async fn effective_permissions(
        &self,
        user_id: &str,
    ) -> RbacResult<Arc<HashSet<Permission>>> {
        {
            let snapshot = self.cache.read().await.clone();
            if let Some(perms) = snapshot.get(user_id) {
                return Ok(perms.clone());
            }
        }

        let roles = self.store.roles().roles_for_user(user_id).await?;
        let perms: HashSet<Permission> = roles
            .iter()
            .flat_map(|r| r.permissions.iter())
            .filter_map(|p| p.parse().ok())
            .collect();
        let perms = Arc::new(perms);

        // Swap in a new snapshot containing the computed entry
        let mut guard = self.cache.write().await;
        let mut next: PermissionSnapshot = (**guard).clone();
        next.insert(user_id.to_string(), perms.clone());
        *guard = Arc::new(next);

        Ok(perms)
    }

    /// O(1) permission check over the cached union
    pub async fn has_permission(&self, user_id: &str, permission: Permission) -> RbacResult<bool> {
        Ok(self.effective_permissions(user_id).await?.contains(&permission))
    }

    /// Check that `user_id` may invoke `tool_name` on `server_id`.
    ///
    /// Requires `tool:execute`; an ACL row for (user, server) restricts the
    /// allowed tool set, where an absent set means every tool. Denials emit
    /// an `authz.denied` audit event.
    pub async fn can_use_tool(
        &self,
        user_id: &str,
        server_id: &str,
        tool_name: &str,
    ) -> RbacResult<bool> {
        if !self.has_permission(user_id, Permission::ToolExecute).await? {
            self.audit_denial(user_id, server_id, tool_name, "missing tool:execute")
                .await;
            return Ok(false);
        }

        if let Some(acl) = self.store.acls().get(user_id, server_id).await? {
            if let Some(allowed) = acl.allowed_tools {
                if !allowed.iter().any(|t| t == tool_name) {
                    self.audit_denial(user_id, server_id, tool_name, "tool not in ACL")
                        .await;
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    /// Record a permission denial for a non-tool permission check
    pub async fn audit_permission_denied(&self, user_id: &str, permission: Permission) {
        let email = self.lookup_email(user_id).await;
        let mut event = AuditEvent::failure(AuditKind::AuthzDenied)
            .resource("permission", permission.as_str())
            .details(serde_json::json!({"permission": permission.as_str()}));
        if let Some(email) = email {
            event = event.user(user_id, email);
        } else {
            event.user_id = Some(user_id.to_string());
        }
        self.audit.record(event).await;
    }

    /// Drop the cached entry for one user
    pub async fn invalidate(&self, user_id: &str) {
        let mut guard = self.cache.write().await;
        if guard.contains_key(user_id) {
            let mut next: PermissionSnapshot = (**guard).clone();
            next.remove(user_id);
            *guard = Arc::new(next);
            debug!(user_id, "permission cache invalidated");
        }
    }

    /// Drop every cached entry (role definitions changed)
    pub async fn invalidate_all(&self) {
        let mut guard = self.cache.write().await;
        *guard = Arc::new(HashMap::new());
    }

    async fn audit_denial(&self, user_id: &str, server_id: &str, tool_name: &str, reason: &str) {
        let email = self.lookup_email(user_id).await;
        let mut event = AuditEvent::failure(AuditKind::AuthzDenied)
            .resource("tool", tool_name)
            .action("tools/call")
            .details(serde_json::json!({"server_id": server_id, "reason": reason}));
        if let Some(email) = email {
            event = event.user(user_id, email);
        } else {
            event.user_id = Some(user_id.to_string());
        }
        self.audit.record(event).await;
    }

    async fn lookup_email(&self, user_id: &str) -> Option<String> {
        self.store.users().get(user_id).await.ok().map(|u| u.email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::system_roles;
    use chrono::Utc;
    use gatehouse_storage::{AclRecord, AuditQuery, UserRecord};

    async fn setup() -> (Store, Enforcer) {
        let store = Store::open_in_memory().await.unwrap();
        store.bootstrap(&system_roles(), &[]).await.unwrap();
        let (audit, _writer) = AuditRecorder::spawn(store.clone(), 64);
        let enforcer = Enforcer::new(store.clone(), audit);
        (store, enforcer)
    }

    async fn add_user(store: &Store, user_id: &str, role: &str) {
        store
            .users()
            .insert(&UserRecord {
                user_id: user_id.to_string(),
                email: format!("{}@x.example", user_id),
                display_name: String::new(),
                provider_id: None,
                subject: None,
                enabled: true,
                created_at: Utc::now(),
                last_login_at: None,
            })
            .await
            .unwrap();
        store
            .roles()
            .assign(user_id, &format!("role-{}", role))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_admin_has_everything_viewer_cannot_execute() {
        let (store, enforcer) = setup().await;
        add_user(&store, "root", "admin").await;
        add_user(&store, "watcher", "viewer").await;

        for perm in Permission::ALL {
            assert!(enforcer.has_permission("root", *perm).await.unwrap());
        }
        assert!(!enforcer
            .has_permission("watcher", Permission::ToolExecute)
            .await
            .unwrap());
        assert!(enforcer
            .has_permission("watcher", Permission::ServerView)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_acl_restricts_tools_and_audits_denial() {
        let (store, enforcer) = setup().await;
        add_user(&store, "dev", "user").await;
        store
            .servers()
            .put(&gatehouse_storage::ServerRecord {
                server_id: "srv1".to_string(),
                name: "srv1".to_string(),
                url: "http://srv1.example/mcp".to_string(),
                description: None,
                capabilities: None,
                protocol_version: None,
                server_info: None,
                tool_count: 0,
                enabled: true,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        store
            .acls()
            .set(&AclRecord {
                user_id: "dev".to_string(),
                server_id: "srv1".to_string(),
                allowed_tools: Some(vec!["search".to_string()]),
            })
            .await
            .unwrap();

        assert!(enforcer.can_use_tool("dev", "srv1", "search").await.unwrap());
        assert!(!enforcer.can_use_tool("dev", "srv1", "rank").await.unwrap());

        // The denial must be auditable with the user's email attached
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let denials = store
            .audit()
            .query(&AuditQuery {
                kind: Some("authz.denied".to_string()),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(denials.len(), 1);
        assert_eq!(denials[0].user_email.as_deref(), Some("dev@x.example"));
        assert_eq!(denials[0].resource_id.as_deref(), Some("rank"));
    }

    #[tokio::test]
    async fn test_cache_invalidation_on_binding_change() {
        let (store, enforcer) = setup().await;
        add_user(&store, "temp", "viewer").await;

        assert!(!enforcer
            .has_permission("temp", Permission::ToolExecute)
            .await
            .unwrap());

        store.roles().assign("temp", "role-user").await.unwrap();
        // Stale until invalidated
        assert!(!enforcer
            .has_permission("temp", Permission::ToolExecute)
            .await
            .unwrap());
        enforcer.invalidate("temp").await;
        assert!(enforcer
            .has_permission("temp", Permission::ToolExecute)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_absent_acl_allows_with_execute() {
        let (store, enforcer) = setup().await;
        add_user(&store, "dev", "user").await;
        assert!(enforcer.can_use_tool("dev", "anysrv", "anytool").await.unwrap());
    }
}
