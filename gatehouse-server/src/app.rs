//! Router assembly
//!
//! Middleware order per request: request id → origin guard → rate limit →
//! bearer auth → handler. Non-streaming surfaces get the baseline request
//! timeout; /mcp is exempt so SSE streams are not cut.

use axum::http::{header, HeaderValue, Method};
use axum::middleware;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::auth::auth_middleware;
use crate::middleware::origin::origin_guard;
use crate::middleware::rate_limit::rate_limit_middleware;
use crate::middleware::request_id::request_id_middleware;
use crate::routes;
use crate::state::GatewayCore;

pub fn build_app(core: GatewayCore) -> Router {
    let rest = Router::new()
        .route("/manage", post(routes::manage::manage_endpoint))
        .route("/auth/providers", get(routes::auth::providers))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/callback", get(routes::auth::callback))
        .route("/auth/user", get(routes::auth::user))
        .route("/auth/logout", post(routes::auth::logout))
        .layer(TimeoutLayer::new(core.config.server.request_timeout));

    Router::new()
        .route("/mcp", post(routes::mcp::mcp_endpoint))
        .merge(rest)
        .route("/healthz", get(healthz))
        .nest_service("/ui", ServeDir::new(&core.config.server.ui_dir))
        .layer(middleware::from_fn_with_state(core.clone(), auth_middleware))
        .layer(middleware::from_fn_with_state(
            core.clone(),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(core.clone(), origin_guard))
        .layer(cors_layer(&core))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(core)
}

fn cors_layer(core: &GatewayCore) -> CorsLayer {
    let origins = if core.config.cors.allows_any() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            core.config
                .cors
                .allowed_origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        )
    };
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::HeaderName::from_static("mcp-session-id"),
            header::HeaderName::from_static("mcp-protocol-version"),
        ])
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}
