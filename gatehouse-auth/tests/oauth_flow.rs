//! End-to-end OAuth login against a stub provider

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use tokio::sync::Mutex;

use gatehouse_audit::AuditRecorder;
use gatehouse_auth::pkce::challenge_s256;
use gatehouse_auth::{AuthService, NewProvider, SecretCipher, TokenSigner};
use gatehouse_rbac::{system_roles, Enforcer};
use gatehouse_storage::{AuditQuery, Store};

#[derive(Clone, Default)]
struct ProviderState {
    seen_verifier: Arc<Mutex<Option<String>>>,
}

async fn token_endpoint(
    State(state): State<ProviderState>,
    Form(params): Form<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    *state.seen_verifier.lock().await = params.get("code_verifier").cloned();
    Json(serde_json::json!({"access_token": "at-1", "token_type": "Bearer"}))
}

async fn userinfo_endpoint() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "sub": "subject-1",
        "email": "Dev@X.example",
        "name": "Dev One"
    }))
}

async fn spawn_stub_provider(state: ProviderState) -> String {
    let app = Router::new()
        .route("/token", post(token_endpoint))
        .route("/userinfo", get(userinfo_endpoint))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn build_service(provider_base: &str) -> (Store, AuthService) {
    let store = Store::open_in_memory().await.unwrap();
    store.bootstrap(&system_roles(), &[]).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let cipher = SecretCipher::load_or_create(dir.path().join("test.key")).unwrap();
    let signer = TokenSigner::new(b"test-secret", Duration::from_secs(3600));
    let (audit, _writer) = AuditRecorder::spawn(store.clone(), 64);
    let enforcer = Enforcer::new(store.clone(), audit.clone());

    let service = AuthService::new(
        store.clone(),
        cipher,
        signer,
        audit,
        enforcer,
        &gatehouse_config::AuthConfig::default(),
        "http://gateway.example/auth/callback".to_string(),
    )
    .unwrap();

    service
        .add_provider(NewProvider {
            provider_id: "stub".to_string(),
            provider_name: "Stub".to_string(),
            client_id: "client-1".to_string(),
            client_secret: "secret-1".to_string(),
            authorize_url: format!("{}/authorize", provider_base),
            token_url: format!("{}/token", provider_base),
            userinfo_url: format!("{}/userinfo", provider_base),
            scopes: vec!["openid".to_string(), "email".to_string()],
        })
        .await
        .unwrap();

    (store, service)
}

fn query_param(url: &str, name: &str) -> Option<String> {
    url::Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

#[tokio::test]
async fn test_login_happy_path() {
    let provider_state = ProviderState::default();
    let base = spawn_stub_provider(provider_state.clone()).await;
    let (store, service) = build_service(&base).await;

    let authorize_url = service.initiate("stub").await.unwrap();
    assert_eq!(
        query_param(&authorize_url, "code_challenge_method").as_deref(),
        Some("S256")
    );
    assert_eq!(query_param(&authorize_url, "response_type").as_deref(), Some("code"));
    let state = query_param(&authorize_url, "state").unwrap();
    let challenge = query_param(&authorize_url, "code_challenge").unwrap();

    let (token, claims) = service.callback(&state, "abc").await.unwrap();

    // PKCE integrity: the verifier sent to the token endpoint hashes to the
    // challenge from the authorize URL
    let verifier = provider_state.seen_verifier.lock().await.clone().unwrap();
    assert_eq!(challenge_s256(&verifier), challenge);

    // The minted token resolves to the created user
    let principal = service.verify(&token).await.unwrap();
    assert_eq!(principal.email, "dev@x.example");
    assert_eq!(principal.user_id, claims.sub);

    // Audit trail carries the login and token events
    tokio::time::sleep(Duration::from_millis(50)).await;
    let success = store
        .audit()
        .query(&AuditQuery {
            kind: Some("auth.login.success".to_string()),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(success.len(), 1);
    let issued = store
        .audit()
        .query(&AuditQuery {
            kind: Some("auth.token.issued".to_string()),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(issued.len(), 1);
}

#[tokio::test]
async fn test_repeat_login_same_email_is_same_user() {
    let base = spawn_stub_provider(ProviderState::default()).await;
    let (_store, service) = build_service(&base).await;

    let first_state = query_param(&service.initiate("stub").await.unwrap(), "state").unwrap();
    let (_, first_claims) = service.callback(&first_state, "abc").await.unwrap();

    let second_state = query_param(&service.initiate("stub").await.unwrap(), "state").unwrap();
    let (_, second_claims) = service.callback(&second_state, "def").await.unwrap();

    assert_eq!(first_claims.sub, second_claims.sub);
}

#[tokio::test]
async fn test_unknown_state_is_rejected_and_audited() {
    let base = spawn_stub_provider(ProviderState::default()).await;
    let (store, service) = build_service(&base).await;

    let err = service.callback("no-such-state", "abc").await.unwrap_err();
    assert!(matches!(err, gatehouse_auth::AuthError::FlowNotFound));

    tokio::time::sleep(Duration::from_millis(50)).await;
    let failures = store
        .audit()
        .query(&AuditQuery {
            kind: Some("auth.login.failure".to_string()),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(failures.len(), 1);
}

#[tokio::test]
async fn test_disabled_user_cannot_login() {
    let base = spawn_stub_provider(ProviderState::default()).await;
    let (store, service) = build_service(&base).await;

    let state = query_param(&service.initiate("stub").await.unwrap(), "state").unwrap();
    let (_, claims) = service.callback(&state, "abc").await.unwrap();

    store.users().set_enabled(&claims.sub, false).await.unwrap();

    let state = query_param(&service.initiate("stub").await.unwrap(), "state").unwrap();
    let err = service.callback(&state, "abc").await.unwrap_err();
    assert!(matches!(err, gatehouse_auth::AuthError::AccountDisabled { .. }));
}
