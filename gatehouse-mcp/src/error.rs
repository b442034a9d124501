//! Error taxonomy for gateway operations
//!
//! Every error maps to a JSON-RPC error code plus a stable kind string
//! carried in the error `data`, and to an HTTP status for REST surfaces.

use thiserror::Error;

/// Result type for MCP operations
pub type McpResult<T> = Result<T, McpError>;

/// Gateway error kinds
#[derive(Error, Debug)]
pub enum McpError {
    /// Malformed JSON-RPC or missing fields
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    /// Missing, invalid, or expired token
    #[error("Unauthenticated: {reason}")]
    Unauthenticated { reason: String },

    /// RBAC or ACL denied
    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    /// Unknown session, server, or tool
    #[error("Not found: {resource_type}: {resource_id}")]
    NotFound {
        resource_type: String,
        resource_id: String,
    },

    /// Unsupported MCP method
    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    /// Protocol version outside the accept set
    #[error("Unsupported protocol version: {version}")]
    UnsupportedProtocol { version: String },

    /// Call before notifications/initialized
    #[error("Session not initialized")]
    NotInitialized,

    /// Upstream returned an error
    #[error("Upstream error: {message}")]
    UpstreamError { message: String },

    /// Upstream deadline exceeded
    #[error("Upstream timeout")]
    UpstreamTimeout,

    /// Token bucket empty
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Unique constraint violated
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Unexpected failure; detail stays server-side
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl McpError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::Unauthenticated {
            reason: reason.into(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn not_found(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }

    pub fn tool_not_found(tool_name: impl Into<String>) -> Self {
        Self::not_found("tool", tool_name)
    }

    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::MethodNotFound {
            method: method.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::UpstreamError {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable kind string carried in error payloads
    pub fn kind(&self) -> &'static str {
        match self {
            McpError::BadRequest { .. } => "BAD_REQUEST",
            McpError::Unauthenticated { .. } => "UNAUTHENTICATED",
            McpError::Forbidden { .. } => "FORBIDDEN",
            McpError::NotFound { .. } => "NOT_FOUND",
            McpError::MethodNotFound { .. } => "METHOD_NOT_FOUND",
            McpError::UnsupportedProtocol { .. } => "UNSUPPORTED_PROTOCOL",
            McpError::NotInitialized => "NOT_INITIALIZED",
            McpError::UpstreamError { .. } => "UPSTREAM_ERROR",
            McpError::UpstreamTimeout => "UPSTREAM_TIMEOUT",
            McpError::RateLimited => "RATE_LIMITED",
            McpError::Conflict { .. } => "CONFLICT",
            McpError::Internal { .. } => "INTERNAL",
        }
    }

    /// JSON-RPC error code
    pub fn json_rpc_code(&self) -> i32 {
        match self {
            McpError::BadRequest { .. } => -32600,
            McpError::MethodNotFound { .. } => -32601,
            McpError::NotInitialized => -32002,
            McpError::Internal { .. } => -32603,
            McpError::Unauthenticated { .. } => -32010,
            McpError::Forbidden { .. } => -32011,
            McpError::NotFound { .. } => -32012,
            McpError::UnsupportedProtocol { .. } => -32013,
            McpError::UpstreamError { .. } => -32014,
            McpError::UpstreamTimeout => -32015,
            McpError::RateLimited => -32016,
            McpError::Conflict { .. } => -32017,
        }
    }

    /// HTTP status for REST surfaces
    pub fn http_status(&self) -> u16 {
        match self {
            McpError::BadRequest { .. } | McpError::UnsupportedProtocol { .. } => 400,
            McpError::Unauthenticated { .. } => 401,
            McpError::Forbidden { .. } => 403,
            McpError::NotFound { .. } | McpError::MethodNotFound { .. } => 404,
            McpError::NotInitialized | McpError::Conflict { .. } => 409,
            McpError::RateLimited => 429,
            McpError::UpstreamError { .. } => 502,
            McpError::UpstreamTimeout => 504,
            McpError::Internal { .. } => 500,
        }
    }

    /// Message safe to return to clients. Internal detail is replaced.
    pub fn public_message(&self) -> String {
        match self {
            McpError::Internal { .. } => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::bad_request(err.to_string())
    }
}

impl From<reqwest::Error> for McpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            McpError::UpstreamTimeout
        } else {
            McpError::UpstreamError {
                message: err.to_string(),
            }
        }
    }
}

impl From<gatehouse_storage::StorageError> for McpError {
    fn from(err: gatehouse_storage::StorageError) -> Self {
        match err {
            gatehouse_storage::StorageError::NotFound {
                resource_type,
                resource_id,
            } => McpError::NotFound {
                resource_type,
                resource_id,
            },
            gatehouse_storage::StorageError::Conflict { message } => McpError::Conflict { message },
            other => McpError::internal(other.to_string()),
        }
    }
}

impl From<gatehouse_rbac::RbacError> for McpError {
    fn from(err: gatehouse_rbac::RbacError) -> Self {
        McpError::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_status_mapping() {
        assert_eq!(McpError::RateLimited.kind(), "RATE_LIMITED");
        assert_eq!(McpError::RateLimited.http_status(), 429);
        assert_eq!(McpError::NotInitialized.http_status(), 409);
        assert_eq!(McpError::method_not_found("x").json_rpc_code(), -32601);
        assert_eq!(McpError::UpstreamTimeout.http_status(), 504);
    }

    #[test]
    fn test_internal_detail_not_exposed() {
        let err = McpError::internal("sqlite disk I/O error at offset 4096");
        assert_eq!(err.public_message(), "internal error");
        assert!(McpError::forbidden("denied").public_message().contains("denied"));
    }
}
