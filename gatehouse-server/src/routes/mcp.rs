//! The MCP edge: POST /mcp
//!
//! Responses are a single JSON object, or an SSE stream when the upstream
//! streams. Errors raised after a stream has begun are emitted as a terminal
//! `data:` event before close.

use std::convert::Infallible;

use axum::extract::State;
use axum::http::header::ACCEPT;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use serde_json::{json, Value};

use gatehouse_mcp::proto::{methods, InitializeParams, ToolsCallParams};
use gatehouse_mcp::{
    validate_protocol_version, Caller, JsonRpcRequest, JsonRpcResponse, McpError,
    SESSION_ID_HEADER,
};
use gatehouse_rbac::Permission;

use crate::middleware::CurrentUser;
use crate::state::GatewayCore;

/// POST /mcp
pub async fn mcp_endpoint(
    State(core): State<GatewayCore>,
    CurrentUser(principal): CurrentUser,
    headers: HeaderMap,
    Json(request): Json<JsonRpcRequest>,
) -> Response {
    let id = request.id.clone();
    if let Err(err) = request.validate() {
        return rpc_error(&err, id);
    }

    match request.method.as_str() {
        methods::INITIALIZE => initialize(&core, &principal.user_id, &headers, request).await,
        methods::PING => JsonRpcResponse::success(json!({}), id).into_json_response(),
        methods::INITIALIZED => initialized(&core, &principal.user_id, &headers).await,
        methods::TOOLS_LIST => tools_list(&core, &principal, &headers, id).await,
        methods::TOOLS_CALL => tools_call(&core, &principal, &headers, request).await,
        other => rpc_error(&McpError::method_not_found(other), id),
    }
}

async fn initialize(
    core: &GatewayCore,
    user_id: &str,
    headers: &HeaderMap,
    request: JsonRpcRequest,
) -> Response {
    let id = request.id.clone();

    let accept = headers
        .get(ACCEPT)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();
    if !(accept.contains("application/json") && accept.contains("text/event-stream")) {
        return rpc_error(
            &McpError::bad_request("Accept must include application/json and text/event-stream"),
            id,
        );
    }

    let params: InitializeParams = match request
        .params
        .ok_or_else(|| McpError::bad_request("initialize requires params"))
        .and_then(|p| serde_json::from_value(p).map_err(McpError::from))
    {
        Ok(params) => params,
        Err(err) => return rpc_error(&err, id),
    };

    if !validate_protocol_version(&params.protocol_version) {
        return rpc_error(
            &McpError::UnsupportedProtocol {
                version: params.protocol_version,
            },
            id,
        );
    }

    let session_id = core.sessions.create(user_id, &params.protocol_version).await;
    let result = json!({
        "protocolVersion": params.protocol_version,
        "capabilities": {"tools": {"listChanged": false}},
        "serverInfo": {"name": "gatehouse", "version": env!("CARGO_PKG_VERSION")}
    });

    let mut response = JsonRpcResponse::success(result, id).into_json_response();
    if let Ok(value) = HeaderValue::from_str(&session_id) {
        response.headers_mut().insert(SESSION_ID_HEADER, value);
    }
    response
}

async fn initialized(core: &GatewayCore, user_id: &str, headers: &HeaderMap) -> Response {
    let Some(session_id) = session_header(headers) else {
        return rpc_error(&McpError::NotInitialized, None);
    };
    match core.sessions.mark_initialized(&session_id, user_id).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(err) => rpc_error(&err, None),
    }
}

async fn tools_list(
    core: &GatewayCore,
    principal: &gatehouse_auth::Principal,
    headers: &HeaderMap,
    id: Option<Value>,
) -> Response {
    if let Err(err) = ready_session(core, &principal.user_id, headers).await {
        return rpc_error(&err, id);
    }

    match core
        .enforcer
        .has_permission(&principal.user_id, Permission::ToolView)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            core.enforcer
                .audit_permission_denied(&principal.user_id, Permission::ToolView)
                .await;
            return rpc_error(&McpError::forbidden("tool:view required"), id);
        }
        Err(err) => return rpc_error(&McpError::from(err), id),
    }

    match core.router.list_tools().await {
        Ok(result) => JsonRpcResponse::success(result, id).into_json_response(),
        Err(err) => rpc_error(&err, id),
    }
}

async fn tools_call(
    core: &GatewayCore,
    principal: &gatehouse_auth::Principal,
    headers: &HeaderMap,
    request: JsonRpcRequest,
) -> Response {
    let id = request.id.clone();
    if let Err(err) = ready_session(core, &principal.user_id, headers).await {
        return rpc_error(&err, id);
    }

    let params: ToolsCallParams = match request
        .params
        .ok_or_else(|| McpError::bad_request("tools/call requires params"))
        .and_then(|p| serde_json::from_value(p).map_err(McpError::from))
    {
        Ok(params) => params,
        Err(err) => return rpc_error(&err, id),
    };

    let caller = Caller {
        user_id: principal.user_id.clone(),
        email: principal.email.clone(),
    };

    let routed = match core.router.call_tool(&caller, &params, id.clone()).await {
        Ok(routed) => routed,
        Err(err) => return rpc_error(&err, id),
    };

    if routed.streaming {
        let client_id = id.clone();
        let idle_timeout = core.config.server.stream_idle_timeout;
        let mut messages = routed.messages;
        let events = async_stream::stream! {
            loop {
                let item = match tokio::time::timeout(idle_timeout, messages.next()).await {
                    Ok(Some(item)) => item,
                    Ok(None) => break,
                    Err(_) => {
                        let terminal = McpError::UpstreamTimeout.to_response(client_id.clone());
                        yield Ok::<_, Infallible>(sse_event(&terminal));
                        break;
                    }
                };
                let message = match item {
                    Ok(message) => message,
                    Err(err) => {
                        // Terminal error event, then close
                        let terminal = err.to_response(client_id.clone());
                        yield Ok::<_, Infallible>(sse_event(&terminal));
                        break;
                    }
                };
                yield Ok(sse_event(&message));
            }
        };
        return Sse::new(events).keep_alive(KeepAlive::default()).into_response();
    }

    // Unary: drain the stream so the routing layer finishes its accounting
    let messages: Vec<_> = routed.messages.collect().await;
    let mut response = None;
    for item in messages {
        match item {
            Ok(message) => {
                response = Some(message);
            }
            Err(err) => return rpc_error(&err, id),
        }
    }
    match response {
        Some(message) => message.into_json_response(),
        None => rpc_error(&McpError::upstream("upstream closed without a response"), id),
    }
}

async fn ready_session(
    core: &GatewayCore,
    user_id: &str,
    headers: &HeaderMap,
) -> Result<(), McpError> {
    let session_id = session_header(headers).ok_or(McpError::NotInitialized)?;
    core.sessions.touch_ready(&session_id, user_id).await?;
    Ok(())
}

fn session_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
}

fn sse_event(message: &JsonRpcResponse) -> Event {
    Event::default().data(serde_json::to_string(message).unwrap_or_else(|_| "{}".to_string()))
}

fn rpc_error(err: &McpError, id: Option<Value>) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err.to_response(id))).into_response()
}

/// JSON-RPC responses are HTTP 200 with application/json
trait IntoJsonResponse {
    fn into_json_response(self) -> Response;
}

impl IntoJsonResponse for JsonRpcResponse {
    fn into_json_response(self) -> Response {
        Json(self).into_response()
    }
}
