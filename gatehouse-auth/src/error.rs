//! Authentication error types

use thiserror::Error;

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Errors raised by the authentication plane
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication failed: {reason}")]
    Unauthenticated { reason: String },

    #[error("Unknown or expired login flow")]
    FlowNotFound,

    #[error("Provider error: {provider_id}: {message}")]
    Provider {
        provider_id: String,
        message: String,
    },

    #[error("Account disabled: {user_id}")]
    AccountDisabled { user_id: String },

    #[error("Key file error: {0}")]
    KeyFile(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error(transparent)]
    Storage(#[from] gatehouse_storage::StorageError),

    #[error(transparent)]
    Rbac(#[from] gatehouse_rbac::RbacError),
}

impl AuthError {
    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::Unauthenticated {
            reason: reason.into(),
        }
    }

    pub fn provider(provider_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider_id: provider_id.into(),
            message: message.into(),
        }
    }

    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto(message.into())
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AuthError::Unauthenticated {
            reason: err.to_string(),
        }
    }
}
