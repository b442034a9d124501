//! RBAC error types

use thiserror::Error;

/// Result type for RBAC operations
pub type RbacResult<T> = Result<T, RbacError>;

/// Errors raised by role management and permission checks
#[derive(Debug, Error)]
pub enum RbacError {
    #[error("Role not found: {0}")]
    RoleNotFound(String),

    #[error("System role '{name}' cannot be {operation}")]
    SystemRoleImmutable { name: String, operation: String },

    #[error("Unknown permission: {0}")]
    UnknownPermission(String),

    #[error(transparent)]
    Storage(#[from] gatehouse_storage::StorageError),
}

impl RbacError {
    pub fn immutable(name: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::SystemRoleImmutable {
            name: name.into(),
            operation: operation.into(),
        }
    }
}
