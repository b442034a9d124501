//! Origin guard against the configured allowlist

use axum::extract::{Request, State};
use axum::http::header::ORIGIN;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use gatehouse_audit::{AuditEvent, AuditKind};
use gatehouse_mcp::McpError;

use crate::error::ApiError;
use crate::state::GatewayCore;

/// Reject browser requests from origins outside `allowed_origins`.
/// Requests without an Origin header (CLI clients) pass through.
pub async fn origin_guard(
    State(core): State<GatewayCore>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(ORIGIN)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());

    if let Some(origin) = origin {
        let cors = &core.config.cors;
        let allowed = cors.allows_any()
            || cors
                .allowed_origins
                .iter()
                .any(|candidate| candidate.trim_end_matches('/') == origin.trim_end_matches('/'));
        if !allowed {
            warn!(%origin, "request origin rejected");
            core.audit
                .record(
                    AuditEvent::failure(AuditKind::OriginRejected)
                        .details(serde_json::json!({"origin": origin})),
                )
                .await;
            return ApiError(McpError::forbidden("origin not allowed")).into_response();
        }
    }

    next.run(request).await
}
