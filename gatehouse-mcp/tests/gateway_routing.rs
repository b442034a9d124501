//! Routing across stub upstream MCP servers

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use gatehouse_audit::AuditRecorder;
use gatehouse_mcp::{
    server_id_for_url, Caller, JsonRpcRequest, McpError, Registry, ToolCatalog, ToolRouter,
    ToolsCallParams, UpstreamClient,
};
use gatehouse_rbac::{system_roles, Enforcer};
use gatehouse_storage::{AuditQuery, Store, UserRecord};

/// Stub upstream MCP server with a mutable tool set and call counters
#[derive(Clone, Default)]
struct Upstream {
    tools: Arc<Mutex<Vec<String>>>,
    method_calls: Arc<Mutex<HashMap<String, usize>>>,
}

impl Upstream {
    fn new(tools: &[&str]) -> Self {
        Self {
            tools: Arc::new(Mutex::new(tools.iter().map(|s| s.to_string()).collect())),
            method_calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn calls(&self, method: &str) -> usize {
        *self.method_calls.lock().await.get(method).unwrap_or(&0)
    }

    async fn set_tools(&self, tools: &[&str]) {
        *self.tools.lock().await = tools.iter().map(|s| s.to_string()).collect();
    }
}

async fn upstream_handler(
    State(state): State<Upstream>,
    Json(request): Json<JsonRpcRequest>,
) -> axum::response::Response {
    *state
        .method_calls
        .lock()
        .await
        .entry(request.method.clone())
        .or_insert(0) += 1;

    match request.method.as_str() {
        "initialize" => {
            let mut headers = HeaderMap::new();
            headers.insert("mcp-session-id", "up-session-1".parse().unwrap());
            let body = json!({
                "jsonrpc": "2.0",
                "id": request.id,
                "result": {
                    "protocolVersion": "2025-06-18",
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "stub-upstream", "version": "0.0.1"}
                }
            });
            (headers, Json(body)).into_response()
        }
        "notifications/initialized" => StatusCode::ACCEPTED.into_response(),
        "tools/list" => {
            let tools: Vec<Value> = state
                .tools
                .lock()
                .await
                .iter()
                .map(|name| {
                    json!({
                        "name": name,
                        "description": format!("{} tool", name),
                        "inputSchema": {
                            "type": "object",
                            "properties": {"q": {"type": "string"}},
                            "required": []
                        }
                    })
                })
                .collect();
            Json(json!({
                "jsonrpc": "2.0",
                "id": request.id,
                "result": {"tools": tools}
            }))
            .into_response()
        }
        "tools/call" => {
            let name = request
                .params
                .as_ref()
                .and_then(|p| p.get("name"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if state.tools.lock().await.contains(&name) {
                Json(json!({
                    "jsonrpc": "2.0",
                    "id": request.id,
                    "result": {"content": [{"type": "text", "text": format!("ok:{}", name)}]}
                }))
                .into_response()
            } else {
                Json(json!({
                    "jsonrpc": "2.0",
                    "id": request.id,
                    "error": {"code": -32601, "message": format!("Tool not found: {}", name)}
                }))
                .into_response()
            }
        }
        other => Json(json!({
            "jsonrpc": "2.0",
            "id": request.id,
            "error": {"code": -32601, "message": format!("Method not found: {}", other)}
        }))
        .into_response(),
    }
}

async fn spawn_upstream(state: Upstream) -> String {
    let app = Router::new().route("/", post(upstream_handler)).with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/", addr)
}

struct Gateway {
    store: Store,
    registry: Registry,
    router: ToolRouter,
}

async fn build_gateway() -> Gateway {
    let store = Store::open_in_memory().await.unwrap();
    store.bootstrap(&system_roles(), &[]).await.unwrap();
    let (audit, _writer) = AuditRecorder::spawn(store.clone(), 64);
    let enforcer = Enforcer::new(store.clone(), audit.clone());
    let client = UpstreamClient::new(Duration::from_secs(5)).unwrap();
    let config = gatehouse_config::UpstreamConfig::default();
    let registry = Registry::new(store.clone(), client.clone(), &config);
    let router = ToolRouter::new(
        registry.clone(),
        ToolCatalog::new(),
        enforcer,
        audit,
        client,
        &config,
    );
    Gateway {
        store,
        registry,
        router,
    }
}

async fn add_user(store: &Store, user_id: &str, role: &str) -> Caller {
    store
        .users()
        .insert(&UserRecord {
            user_id: user_id.to_string(),
            email: format!("{}@x.example", user_id),
            display_name: String::new(),
            provider_id: None,
            subject: None,
            enabled: true,
            created_at: chrono::Utc::now(),
            last_login_at: None,
        })
        .await
        .unwrap();
    store
        .roles()
        .assign(user_id, &format!("role-{}", role))
        .await
        .unwrap();
    Caller {
        user_id: user_id.to_string(),
        email: format!("{}@x.example", user_id),
    }
}

fn short(url: &str) -> String {
    server_id_for_url(url)[..8].to_string()
}

#[tokio::test]
async fn test_catalog_merges_two_upstreams_with_collision() {
    let a = Upstream::new(&["search"]);
    let b = Upstream::new(&["search", "rank"]);
    let url_a = spawn_upstream(a).await;
    let url_b = spawn_upstream(b).await;

    let gw = build_gateway().await;
    gw.registry.add_server(&url_a, Some("a")).await.unwrap();
    gw.registry.add_server(&url_b, Some("b")).await.unwrap();

    let listing = gw.router.list_tools().await.unwrap();
    let tools = listing["tools"].as_array().unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();

    let mut expected = vec![
        "rank".to_string(),
        format!("search@{}", short(&url_a)),
        format!("search@{}", short(&url_b)),
    ];
    expected.sort();
    assert_eq!(names, expected.iter().map(String::as_str).collect::<Vec<_>>());
    for tool in tools {
        assert_eq!(tool["inputSchema"]["type"], "object");
    }
}

#[tokio::test]
async fn test_call_routes_to_owner_and_remaps_id() {
    let b = Upstream::new(&["rank"]);
    let url_b = spawn_upstream(b.clone()).await;

    let gw = build_gateway().await;
    gw.registry.add_server(&url_b, None).await.unwrap();
    let caller = add_user(&gw.store, "dev", "user").await;

    let call = gw
        .router
        .call_tool(
            &caller,
            &ToolsCallParams {
                name: "rank".to_string(),
                arguments: Some(json!({"q": "abc"})),
            },
            Some(json!(42)),
        )
        .await
        .unwrap();

    let messages: Vec<_> = call.messages.collect().await;
    assert_eq!(messages.len(), 1);
    let message = messages[0].as_ref().unwrap();
    assert_eq!(message.id, Some(json!(42)));
    assert_eq!(
        message.result.as_ref().unwrap()["content"][0]["text"],
        "ok:rank"
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    let invoked = gw
        .store
        .audit()
        .query(&AuditQuery {
            kind: Some("tool.invoked".to_string()),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(invoked.len(), 1);
    assert_eq!(invoked[0].user_email.as_deref(), Some("dev@x.example"));
}

#[tokio::test]
async fn test_viewer_denied_without_upstream_contact() {
    let b = Upstream::new(&["rank"]);
    let url_b = spawn_upstream(b.clone()).await;

    let gw = build_gateway().await;
    gw.registry.add_server(&url_b, None).await.unwrap();
    let caller = add_user(&gw.store, "watcher", "viewer").await;

    let calls_before = b.calls("tools/call").await;
    let err = gw
        .router
        .call_tool(
            &caller,
            &ToolsCallParams {
                name: "rank".to_string(),
                arguments: None,
            },
            Some(json!(1)),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "FORBIDDEN");
    assert_eq!(b.calls("tools/call").await, calls_before);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let denials = gw
        .store
        .audit()
        .query(&AuditQuery {
            kind: Some("authz.denied".to_string()),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(denials.len(), 1);
    assert_eq!(denials[0].user_email.as_deref(), Some("watcher@x.example"));
    assert_eq!(denials[0].resource_id.as_deref(), Some("rank"));
}

#[tokio::test]
async fn test_stale_catalog_refreshes_after_upstream_removal() {
    let b = Upstream::new(&["rank"]);
    let url_b = spawn_upstream(b.clone()).await;

    let gw = build_gateway().await;
    gw.registry.add_server(&url_b, None).await.unwrap();
    let caller = add_user(&gw.store, "dev", "user").await;

    // Warm the catalog while rank still exists
    gw.router.list_tools().await.unwrap();
    // Upstream drops the tool after discovery
    b.set_tools(&[]).await;

    // First call reaches the upstream, which reports the missing tool; a
    // capability refresh runs as a side effect
    let call = gw
        .router
        .call_tool(
            &caller,
            &ToolsCallParams {
                name: "rank".to_string(),
                arguments: None,
            },
            Some(json!(1)),
        )
        .await
        .unwrap();
    let messages: Vec<_> = call.messages.collect().await;
    let error = messages[0].as_ref().unwrap().error.as_ref().unwrap();
    assert!(error.message.contains("not found"));

    // Second call fails at resolution, without contacting the upstream
    let calls_before = b.calls("tools/call").await;
    let err = gw
        .router
        .call_tool(
            &caller,
            &ToolsCallParams {
                name: "rank".to_string(),
                arguments: None,
            },
            Some(json!(2)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::NotFound { .. }));
    assert_eq!(b.calls("tools/call").await, calls_before);
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let a = Upstream::new(&["search"]);
    let url = spawn_upstream(a).await;

    let gw = build_gateway().await;
    gw.registry.add_server(&url, None).await.unwrap();
    let err = gw.registry.add_server(&url, None).await.unwrap_err();
    assert_eq!(err.kind(), "CONFLICT");
}

#[tokio::test]
async fn test_health_probe_reports_healthy() {
    let a = Upstream::new(&["search"]);
    let url = spawn_upstream(a).await;

    let gw = build_gateway().await;
    let record = gw.registry.add_server(&url, None).await.unwrap();
    let report = gw.registry.test_server(&record.server_id).await.unwrap();
    assert_eq!(report.status, gatehouse_mcp::HealthStatus::Healthy);
    assert!(report.latency_ms < 2000);
}
