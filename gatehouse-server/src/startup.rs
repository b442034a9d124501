//! Process bootstrap: configuration, store, component wiring, serve loop

use std::net::SocketAddr;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gatehouse_audit::{spawn_retention, AuditRecorder};
use gatehouse_auth::{AuthService, SecretCipher, TokenSigner};
use gatehouse_config::{ConfigLoader, GatehouseConfig};
use gatehouse_mcp::{Registry, SessionManager, ToolCatalog, ToolRouter, UpstreamClient};
use gatehouse_rbac::{system_roles, Enforcer, RoleService};
use gatehouse_storage::Store;

use crate::app::build_app;
use crate::middleware::rate_limit;
use crate::state::GatewayCore;

/// Startup failures with their process exit codes
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] gatehouse_config::ConfigError),

    #[error("cannot open store: {0}")]
    Store(#[from] gatehouse_storage::StorageError),

    #[error("cannot load or create key file: {0}")]
    KeyFile(String),

    #[error("server error: {0}")]
    Server(String),
}

impl StartupError {
    /// Exit codes: 64 bad config, 69 store, 70 key file
    pub fn exit_code(&self) -> i32 {
        match self {
            StartupError::Config(_) => 64,
            StartupError::Store(_) => 69,
            StartupError::KeyFile(_) => 70,
            StartupError::Server(_) => 1,
        }
    }
}

/// Load config, wire the components, and serve until shutdown
pub async fn run() -> Result<(), StartupError> {
    let config = ConfigLoader::new().from_env()?;
    init_tracing(&config);

    let (core, audit_writer) = build_core(&config).await?;
    serve(core).await?;

    // Dropping the last recorder handle closed the channel; give the writer
    // a bounded window to drain buffered events.
    let _ = tokio::time::timeout(Duration::from_secs(5), audit_writer).await;
    Ok(())
}

fn init_tracing(config: &GatehouseConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Construct the component aggregate from configuration. Also returns the
/// audit writer handle so shutdown can wait for the channel to drain.
pub async fn build_core(
    config: &GatehouseConfig,
) -> Result<(GatewayCore, tokio::task::JoinHandle<()>), StartupError> {
    let store = Store::open(&config.database).await?;

    let cipher = SecretCipher::load_or_create(&config.auth.encryption_key_file)
        .map_err(|e| StartupError::KeyFile(e.to_string()))?;

    store
        .bootstrap(&system_roles(), &default_gateway_config(config))
        .await?;

    let (audit, audit_writer) = AuditRecorder::spawn(store.clone(), config.audit.channel_capacity);
    spawn_retention(
        store.clone(),
        config.audit.retention_days,
        config.audit.sweep_interval,
    );

    let enforcer = Enforcer::new(store.clone(), audit.clone());
    let roles = RoleService::new(store.clone());

    let jwt_secret = resolve_jwt_secret(config);
    let signer = TokenSigner::new(jwt_secret.as_bytes(), config.auth.token_ttl);
    let callback_url = format!("http://{}/auth/callback", config.server.socket_addr());
    let auth = AuthService::new(
        store.clone(),
        cipher,
        signer,
        audit.clone(),
        enforcer.clone(),
        &config.auth,
        callback_url,
    )
    .map_err(|e| StartupError::Server(e.to_string()))?;
    auth.spawn_flow_gc();

    let client = UpstreamClient::new(config.upstream.call_timeout)
        .map_err(|e| StartupError::Server(e.to_string()))?;
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
    sessions.spawn_reaper(Duration::from_secs(60));

    let rate_limiter = rate_limit::build(&config.rate_limit);

    let core = GatewayCore {
        config: std::sync::Arc::new(config.clone()),
        store,
        audit,
        enforcer,
        roles,
        auth,
        registry,
        router,
        sessions,
        rate_limiter,
    };
    Ok((core, audit_writer))
}

async fn serve(core: GatewayCore) -> Result<(), StartupError> {
    let addr = core.config.server.socket_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| StartupError::Server(format!("bind {}: {}", addr, e)))?;
    info!(%addr, "gatehouse listening");

    let app = build_app(core);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| StartupError::Server(e.to_string()))?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
    }
}

/// Seeded config rows; environment variables override these at read time
fn default_gateway_config(config: &GatehouseConfig) -> Vec<(&'static str, serde_json::Value)> {
    vec![
        (
            "allowed_origins",
            serde_json::json!(config.cors.allowed_origins),
        ),
        (
            "token_ttl_seconds",
            serde_json::json!(config.auth.token_ttl.as_secs()),
        ),
        (
            "rate_limit_rpm",
            serde_json::json!(config.rate_limit.requests_per_minute),
        ),
        (
            "retention_days",
            serde_json::json!(config.audit.retention_days),
        ),
    ]
}

fn resolve_jwt_secret(config: &GatehouseConfig) -> String {
    if !config.auth.jwt_secret.is_empty() {
        return config.auth.jwt_secret.clone();
    }
    warn!("JWT_SECRET not set; generating an ephemeral secret, tokens will not survive restarts");
    let mut raw = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut raw);
    URL_SAFE_NO_PAD.encode(raw)
}
