//! Shared application state
//!
//! One explicit aggregate composed of the component handles, passed to every
//! handler; no module-level singletons.

use std::sync::Arc;

use gatehouse_audit::AuditRecorder;
use gatehouse_auth::AuthService;
use gatehouse_config::GatehouseConfig;
use gatehouse_mcp::{Registry, SessionManager, ToolRouter};
use gatehouse_rbac::{Enforcer, RoleService};
use gatehouse_storage::Store;

use crate::middleware::rate_limit::RateLimiter;

/// Everything a request handler can reach
#[derive(Clone)]
pub struct GatewayCore {
    pub config: Arc<GatehouseConfig>,
    pub store: Store,
    pub audit: AuditRecorder,
    pub enforcer: Enforcer,
    pub roles: RoleService,
    pub auth: AuthService,
    pub registry: Registry,
    pub router: ToolRouter,
    pub sessions: SessionManager,
    pub rate_limiter: Arc<RateLimiter>,
}
