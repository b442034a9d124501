//! Bearer token extraction and principal resolution

use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;

use gatehouse_auth::Principal;
use gatehouse_mcp::McpError;

use crate::error::{auth_error_to_mcp, ApiError};
use crate::state::GatewayCore;

/// Resolve `Authorization: Bearer` into a [`Principal`] extension.
///
/// Requests without a token pass through unauthenticated; route handlers
/// that require identity use the [`CurrentUser`] extractor, which rejects
/// with UNAUTHENTICATED when the extension is absent.
pub async fn auth_middleware(
    State(core): State<GatewayCore>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let bearer = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.to_string());

    if let Some(token) = bearer {
        let principal = core
            .auth
            .verify(&token)
            .await
            .map_err(|e| ApiError(auth_error_to_mcp(e)))?;
        request.extensions_mut().insert(principal);
    }

    Ok(next.run(request).await)
}

/// Extractor for handlers that require an authenticated principal
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Principal);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| ApiError(McpError::unauthenticated("missing bearer token")))
    }
}
