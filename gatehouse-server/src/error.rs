//! HTTP error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use gatehouse_mcp::McpError;

/// Wrapper giving gateway errors an HTTP response shape
pub struct ApiError(pub McpError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({
            "error": {
                "kind": self.0.kind(),
                "message": self.0.public_message(),
            }
        });
        (status, Json(body)).into_response()
    }
}

impl From<McpError> for ApiError {
    fn from(err: McpError) -> Self {
        Self(err)
    }
}

impl From<gatehouse_auth::AuthError> for ApiError {
    fn from(err: gatehouse_auth::AuthError) -> Self {
        Self(auth_error_to_mcp(err))
    }
}

impl From<gatehouse_storage::StorageError> for ApiError {
    fn from(err: gatehouse_storage::StorageError) -> Self {
        Self(McpError::from(err))
    }
}

/// Authentication failures all surface as UNAUTHENTICATED; infrastructure
/// failures as INTERNAL with detail kept server-side.
pub fn auth_error_to_mcp(err: gatehouse_auth::AuthError) -> McpError {
    use gatehouse_auth::AuthError;
    match err {
        AuthError::Unauthenticated { reason } => McpError::unauthenticated(reason),
        AuthError::FlowNotFound => McpError::unauthenticated("login flow expired"),
        AuthError::AccountDisabled { .. } => McpError::unauthenticated("account disabled"),
        AuthError::Provider { .. } => McpError::unauthenticated("login failed"),
        AuthError::Storage(e) => McpError::from(e),
        other => McpError::internal(other.to_string()),
    }
}

/// Role management failures map onto the conflict/forbidden taxonomy
pub fn rbac_error_to_mcp(err: gatehouse_rbac::RbacError) -> McpError {
    use gatehouse_rbac::RbacError;
    match err {
        RbacError::RoleNotFound(id) => McpError::not_found("role", id),
        RbacError::SystemRoleImmutable { name, operation } => McpError::Conflict {
            message: format!("system role '{}' cannot be {}", name, operation),
        },
        RbacError::UnknownPermission(p) => McpError::bad_request(format!("unknown permission '{}'", p)),
        RbacError::Storage(e) => McpError::from(e),
    }
}
