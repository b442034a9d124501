//! REST authentication endpoints

use axum::extract::{Query, State};
use axum::http::{header::LOCATION, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::state::GatewayCore;

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub provider_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub state: String,
    pub code: String,
}

/// GET /auth/providers — public list of enabled providers
pub async fn providers(State(core): State<GatewayCore>) -> Result<Response, ApiError> {
    let providers = core.auth.public_providers().await?;
    Ok(Json(providers).into_response())
}

/// POST /auth/login?provider_id=... — 302 to the provider authorize URL
pub async fn login(
    State(core): State<GatewayCore>,
    Query(query): Query<LoginQuery>,
) -> Result<Response, ApiError> {
    let authorize_url = core.auth.initiate(&query.provider_id).await?;
    Ok(found(&authorize_url))
}

/// GET /auth/callback?state=...&code=... — 302 to the UI with the token in
/// the URL fragment
pub async fn callback(
    State(core): State<GatewayCore>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, ApiError> {
    let (token, _claims) = core.auth.callback(&query.state, &query.code).await?;
    let target = format!("{}#token={}", core.config.auth.ui_redirect_url, token);
    Ok(found(&target))
}

/// GET /auth/user — the verified principal
pub async fn user(CurrentUser(principal): CurrentUser) -> Response {
    Json(serde_json::json!({
        "user_id": principal.user_id,
        "email": principal.email,
        "name": principal.name,
        "provider_id": principal.provider_id,
    }))
    .into_response()
}

/// POST /auth/logout — 204; the client drops its token
pub async fn logout(
    State(core): State<GatewayCore>,
    CurrentUser(principal): CurrentUser,
) -> Response {
    core.auth.logout(&principal).await;
    StatusCode::NO_CONTENT.into_response()
}

fn found(location: &str) -> Response {
    let mut response = StatusCode::FOUND.into_response();
    if let Ok(value) = HeaderValue::from_str(location) {
        response.headers_mut().insert(LOCATION, value);
    }
    response
}
