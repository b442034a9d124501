//! Role-based access control for the Gatehouse MCP gateway
//!
//! Users carry roles; roles carry permission sets; effective permissions are
//! the set union. Per-server/per-tool ACL rows further restrict tool
//! execution for individual users.

pub mod enforcer;
pub mod error;
pub mod models;
pub mod roles;

pub use enforcer::Enforcer;
pub use error::{RbacError, RbacResult};
pub use models::Permission;
pub use roles::{system_roles, RoleService, DEFAULT_ROLE, ROLE_ADMIN, ROLE_USER, ROLE_VIEWER};
