//! HTTP edge tests: handshake, gating, rate limiting, management surface

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};

use gatehouse_audit::{spawn_retention, AuditRecorder};
use gatehouse_auth::{AuthService, SecretCipher, TokenSigner};
use gatehouse_config::GatehouseConfig;
use gatehouse_mcp::{Registry, SessionManager, ToolCatalog, ToolRouter, UpstreamClient};
use gatehouse_rbac::{system_roles, Enforcer, RoleService};
use gatehouse_server::{build_app, GatewayCore};
use gatehouse_storage::{AuditQuery, Store, UserRecord};

struct TestGateway {
    base: String,
    store: Store,
    signer: TokenSigner,
    http: reqwest::Client,
    _key_dir: tempfile::TempDir,
}

impl TestGateway {
    async fn spawn(mutate: impl FnOnce(&mut GatehouseConfig)) -> Self {
        let mut config = GatehouseConfig::default();
        config.cors.allowed_origins = vec!["http://ui.example".to_string()];
        mutate(&mut config);

        let store = Store::open_in_memory().await.unwrap();
        store.bootstrap(&system_roles(), &[]).await.unwrap();

        let key_dir = tempfile::tempdir().unwrap();
        let cipher = SecretCipher::load_or_create(key_dir.path().join("gw.key")).unwrap();
        let signer = TokenSigner::new(b"edge-test-secret", Duration::from_secs(3600));

        let (audit, _writer) = AuditRecorder::spawn(store.clone(), config.audit.channel_capacity);
        spawn_retention(store.clone(), config.audit.retention_days, config.audit.sweep_interval);
        let enforcer = Enforcer::new(store.clone(), audit.clone());
        let roles = RoleService::new(store.clone());
        let auth = AuthService::new(
            store.clone(),
            cipher,
            signer.clone(),
            audit.clone(),
            enforcer.clone(),
            &config.auth,
            "http://gateway.test/auth/callback".to_string(),
        )
        .unwrap();

        let client = UpstreamClient::new(config.upstream.call_timeout).unwrap();
        let registry = Registry::new(store.clone(), client.clone(), &config.upstream);
        let router = ToolRouter::new(
            registry.clone(),
            ToolCatalog::new(),
            enforcer.clone(),
            audit.clone(),
            client,
            &config.upstream,
        );
        let sessions = SessionManager::new(config.upstream.session_ttl);

        let core = GatewayCore {
            config: Arc::new(config.clone()),
            store: store.clone(),
            audit,
            enforcer,
            roles,
            auth,
            registry,
            router,
            sessions,
            rate_limiter: gatehouse_server::middleware::rate_limit::build(&config.rate_limit),
        };

        let app = build_app(core);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        Self {
            base: format!("http://{}", addr),
            store,
            signer,
            http: reqwest::Client::new(),
            _key_dir: key_dir,
        }
    }

    /// Create a user with a role and mint a token for it
    async fn user_token(&self, user_id: &str, role: &str) -> String {
        let user = UserRecord {
            user_id: user_id.to_string(),
            email: format!("{}@x.example", user_id),
            display_name: user_id.to_string(),
            provider_id: Some("test".to_string()),
            subject: Some(user_id.to_string()),
            enabled: true,
            created_at: Utc::now(),
            last_login_at: None,
        };
        self.store.users().insert(&user).await.unwrap();
        self.store
            .roles()
            .assign(user_id, &format!("role-{}", role))
            .await
            .unwrap();
        self.signer.issue(&user).unwrap().0
    }

    async fn mcp(
        &self,
        token: &str,
        session: Option<&str>,
        body: Value,
    ) -> reqwest::Response {
        let mut request = self
            .http
            .post(format!("{}/mcp", self.base))
            .bearer_auth(token)
            .header("accept", "application/json, text/event-stream")
            .json(&body);
        if let Some(session) = session {
            request = request.header("mcp-session-id", session);
        }
        request.send().await.unwrap()
    }

    async fn manage(&self, token: &str, method: &str, params: Value) -> reqwest::Response {
        self.http
            .post(format!("{}/manage", self.base))
            .bearer_auth(token)
            .json(&json!({"jsonrpc": "2.0", "method": method, "params": params, "id": 1}))
            .send()
            .await
            .unwrap()
    }
}

fn initialize_body() -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-06-18",
            "clientInfo": {"name": "c", "version": "1"}
        },
        "id": 1
    })
}

#[tokio::test]
async fn test_handshake_issues_session_and_gates_methods() {
    let gw = TestGateway::spawn(|_| {}).await;
    let token = gw.user_token("dev", "user").await;

    // initialize: 200, negotiated version, non-empty session id header
    let response = gw.mcp(&token, None, initialize_body()).await;
    assert_eq!(response.status(), 200);
    let session_id = response
        .headers()
        .get("mcp-session-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(!session_id.is_empty());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["protocolVersion"], "2025-06-18");

    // Second request without a session id is rejected
    let response = gw
        .mcp(
            &token,
            None,
            json!({"jsonrpc": "2.0", "method": "tools/list", "id": 2}),
        )
        .await;
    assert_eq!(response.status(), 409);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["data"]["kind"], "NOT_INITIALIZED");

    // tools/list before notifications/initialized is also rejected
    let response = gw
        .mcp(
            &token,
            Some(&session_id),
            json!({"jsonrpc": "2.0", "method": "tools/list", "id": 3}),
        )
        .await;
    assert_eq!(response.status(), 409);

    // notifications/initialized unlocks the session
    let response = gw
        .mcp(
            &token,
            Some(&session_id),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        )
        .await;
    assert_eq!(response.status(), 202);

    let response = gw
        .mcp(
            &token,
            Some(&session_id),
            json!({"jsonrpc": "2.0", "method": "tools/list", "id": 4}),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert!(body["result"]["tools"].as_array().unwrap().is_empty());

    // Unknown methods return METHOD_NOT_FOUND
    let response = gw
        .mcp(
            &token,
            Some(&session_id),
            json!({"jsonrpc": "2.0", "method": "resources/list", "id": 5}),
        )
        .await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32601);
}

#[tokio::test]
async fn test_unsupported_protocol_version_rejected() {
    let gw = TestGateway::spawn(|_| {}).await;
    let token = gw.user_token("dev", "user").await;

    let response = gw
        .mcp(
            &token,
            None,
            json!({
                "jsonrpc": "2.0",
                "method": "initialize",
                "params": {"protocolVersion": "1999-01-01"},
                "id": 1
            }),
        )
        .await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["data"]["kind"], "UNSUPPORTED_PROTOCOL");
}

#[tokio::test]
async fn test_missing_token_and_healthz() {
    let gw = TestGateway::spawn(|_| {}).await;

    let response = gw
        .http
        .get(format!("{}/healthz", gw.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = gw
        .http
        .get(format!("{}/auth/user", gw.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_rate_limit_denies_past_burst() {
    let gw = TestGateway::spawn(|config| {
        config.rate_limit.requests_per_minute = 5;
        config.rate_limit.audit_sample = 1;
    })
    .await;
    let token = gw.user_token("dev", "user").await;

    let mut last_status = 0;
    for _ in 0..6 {
        let response = gw
            .http
            .get(format!("{}/healthz", gw.base))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        last_status = response.status().as_u16();
        if last_status == 429 {
            let body: Value = response.json().await.unwrap();
            assert_eq!(body["error"]["kind"], "RATE_LIMITED");
            break;
        }
    }
    assert_eq!(last_status, 429);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let audited = gw
        .store
        .audit()
        .query(&AuditQuery {
            kind: Some("security.rate_limited".to_string()),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(!audited.is_empty());
}

#[tokio::test]
async fn test_origin_guard_rejects_unlisted_origin() {
    let gw = TestGateway::spawn(|_| {}).await;

    let response = gw
        .http
        .get(format!("{}/healthz", gw.base))
        .header("origin", "http://evil.example")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    let response = gw
        .http
        .get(format!("{}/healthz", gw.base))
        .header("origin", "http://ui.example")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_manage_permission_gates_and_audit() {
    let gw = TestGateway::spawn(|_| {}).await;
    let admin = gw.user_token("root", "admin").await;
    let viewer = gw.user_token("watcher", "viewer").await;

    // Viewer cannot add servers
    let response = gw
        .manage(&viewer, "server.add", json!({"url": "http://up.example/"}))
        .await;
    assert_eq!(response.status(), 403);

    // Admin round-trips config through the store
    let response = gw
        .manage(
            &admin,
            "config.set",
            json!({"key": "rate_limit_rpm", "value": 42}),
        )
        .await;
    assert_eq!(response.status(), 200);

    // The audit event is durable before the response: query immediately
    let changed = gw
        .store
        .audit()
        .query(&AuditQuery {
            kind: Some("config.changed".to_string()),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].resource_id.as_deref(), Some("rate_limit_rpm"));

    let response = gw
        .manage(&admin, "config.get", json!({"key": "rate_limit_rpm"}))
        .await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["value"], 42);
}

#[tokio::test]
async fn test_provider_secrets_never_leave_plaintext() {
    let gw = TestGateway::spawn(|_| {}).await;
    let admin = gw.user_token("root", "admin").await;

    let response = gw
        .manage(
            &admin,
            "oauth.provider.add",
            json!({
                "provider_id": "google",
                "provider_name": "Google",
                "client_id": "cid",
                "client_secret": "super-secret-value",
                "authorize_url": "https://accounts.google.example/o/oauth2/auth",
                "token_url": "https://oauth2.google.example/token",
                "userinfo_url": "https://openidconnect.google.example/v1/userinfo",
                "scopes": ["openid", "email"]
            }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(!body.contains("super-secret-value"));

    // Listing does not expose the secret either
    let response = gw.manage(&admin, "oauth.provider.list", json!({})).await;
    let body = response.text().await.unwrap();
    assert!(!body.contains("super-secret-value"));
    assert!(!body.contains("ciphertext"));

    // And the stored row holds ciphertext only
    let record = gw.store.providers().get("google").await.unwrap();
    assert!(!record.client_secret_ciphertext.contains("super-secret-value"));

    // /auth/providers is public and minimal
    let response = gw
        .http
        .get(format!("{}/auth/providers", gw.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains("google"));
    assert!(!body.contains("super-secret-value"));
}

#[tokio::test]
async fn test_role_lifecycle_over_manage() {
    let gw = TestGateway::spawn(|_| {}).await;
    let admin = gw.user_token("root", "admin").await;

    let response = gw
        .manage(
            &admin,
            "role.create",
            json!({"name": "ops", "description": "operations", "permissions": ["server:view", "server:test"]}),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    let role_id = body["result"]["role_id"].as_str().unwrap().to_string();

    // Deleting a system role conflicts
    let response = gw
        .manage(&admin, "role.delete", json!({"role_id": "role-admin"}))
        .await;
    assert_eq!(response.status(), 409);

    let response = gw
        .manage(&admin, "role.delete", json!({"role_id": role_id}))
        .await;
    assert_eq!(response.status(), 200);

    // Mutations were audited durably
    let created = gw
        .store
        .audit()
        .query(&AuditQuery {
            kind: Some("role.created".to_string()),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(created.len(), 1);
}
