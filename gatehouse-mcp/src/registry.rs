//! Upstream MCP server registry
//!
//! Records are created through a full discovery handshake (initialize →
//! notifications/initialized → tools/list). The capability snapshot is the
//! last successful discovery; health probes re-run the handshake under a
//! short deadline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use gatehouse_config::UpstreamConfig;
use gatehouse_storage::{ServerRecord, Store};

use crate::client::UpstreamClient;
use crate::error::{McpError, McpResult};
use crate::proto::{methods, InitializeResult, Tool, ToolsListResult, MCP_PROTOCOL_VERSION};
use crate::wire::JsonRpcRequest;

/// Deadline under which a full handshake counts as healthy
const HEALTHY_WITHIN: Duration = Duration::from_secs(2);
/// Beyond this, a probe is unhealthy regardless of outcome
const DEGRADED_WITHIN: Duration = Duration::from_secs(10);

/// Stable identifier derived from the server URL
pub fn server_id_for_url(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(&digest[..8])
}

/// Short form used to qualify colliding tool names
pub fn short_server_id(server_id: &str) -> &str {
    &server_id[..server_id.len().min(8)]
}

/// Result of a discovery handshake
#[derive(Debug)]
pub struct Discovery {
    pub protocol_version: String,
    pub server_info: Option<serde_json::Value>,
    pub tools: Vec<Tool>,
    pub session_id: Option<String>,
}

/// Health probe outcome
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Registry of upstream MCP servers
#[derive(Clone)]
pub struct Registry {
    store: Store,
    client: UpstreamClient,
    refresh_interval: Duration,
    probe_deadline: Duration,
    last_refresh: Arc<Mutex<HashMap<String, Instant>>>,
}

impl Registry {
    pub fn new(store: Store, client: UpstreamClient, config: &UpstreamConfig) -> Self {
        Self {
            store,
            client,
            refresh_interval: config.refresh_interval,
            probe_deadline: config.probe_deadline,
            last_refresh: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a server after a successful discovery handshake
    pub async fn add_server(
        &self,
        url: &str,
        description: Option<&str>,
    ) -> McpResult<ServerRecord> {
        if let Some(existing) = self.store.servers().get_by_url(url).await? {
            if existing.enabled {
                return Err(McpError::Conflict {
                    message: format!("server already registered for {}", url),
                });
            }
        }

        let discovery = self.discover(url).await?;
        let now = Utc::now();
        let name = discovery
            .server_info
            .as_ref()
            .and_then(|info| info.get("name"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| url.to_string());

        let record = ServerRecord {
            server_id: server_id_for_url(url),
            name,
            url: url.to_string(),
            description: description.map(|s| s.to_string()),
            capabilities: Some(json!({ "tools": discovery.tools })),
            protocol_version: Some(discovery.protocol_version.clone()),
            server_info: discovery.server_info.clone(),
            tool_count: discovery.tools.len() as i64,
            enabled: true,
            created_at: now,
            updated_at: now,
        };
        self.store.servers().put(&record).await?;
        // The snapshot is fresh; start the opportunistic-refresh clock now
        self.last_refresh
            .lock()
            .await
            .insert(record.server_id.clone(), Instant::now());
        info!(server_id = %record.server_id, url, tools = record.tool_count, "server registered");
        Ok(record)
    }

    /// Full handshake against a server URL
    pub async fn discover(&self, url: &str) -> McpResult<Discovery> {
        let initialize = JsonRpcRequest::new(
            methods::INITIALIZE,
            Some(json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {"name": "gatehouse", "version": env!("CARGO_PKG_VERSION")}
            })),
            Some(json!("init")),
        );
        let outcome = self.client.call(url, None, &initialize).await?;
        if let Some(error) = outcome.response.error {
            return Err(McpError::upstream(format!("initialize failed: {}", error.message)));
        }
        let init: InitializeResult = serde_json::from_value(
            outcome
                .response
                .result
                .ok_or_else(|| McpError::upstream("initialize returned no result"))?,
        )
        .map_err(|e| McpError::upstream(format!("initialize result: {}", e)))?;

        let session_id = outcome.session_id;
        let initialized = JsonRpcRequest::notification(methods::INITIALIZED, None);
        self.client
            .notify(url, session_id.as_deref(), &initialized)
            .await?;

        let list = JsonRpcRequest::new(methods::TOOLS_LIST, None, Some(json!("tools")));
        let outcome = self.client.call(url, session_id.as_deref(), &list).await?;
        if let Some(error) = outcome.response.error {
            return Err(McpError::upstream(format!("tools/list failed: {}", error.message)));
        }
        let tools: ToolsListResult = serde_json::from_value(
            outcome
                .response
                .result
                .ok_or_else(|| McpError::upstream("tools/list returned no result"))?,
        )
        .map_err(|e| McpError::upstream(format!("tools/list result: {}", e)))?;

        Ok(Discovery {
            protocol_version: init.protocol_version,
            server_info: serde_json::to_value(&init.server_info).ok(),
            tools: tools.tools,
            session_id,
        })
    }

    /// Health probe: repeat the handshake under the probe deadline and
    /// classify the outcome.
    pub async fn test_server(&self, server_id: &str) -> McpResult<HealthReport> {
        let record = self.store.servers().get(server_id).await?;
        let started = Instant::now();

        let result = tokio::time::timeout(self.probe_deadline, self.discover(&record.url)).await;
        let elapsed = started.elapsed();
        let latency_ms = elapsed.as_millis() as u64;

        let report = match result {
            Ok(Ok(_)) if elapsed <= HEALTHY_WITHIN => HealthReport {
                status: HealthStatus::Healthy,
                latency_ms,
                error: None,
            },
            Ok(Ok(_)) if elapsed <= DEGRADED_WITHIN => HealthReport {
                status: HealthStatus::Degraded,
                latency_ms,
                error: Some("handshake slow".to_string()),
            },
            Ok(Ok(_)) => HealthReport {
                status: HealthStatus::Unhealthy,
                latency_ms,
                error: Some("handshake exceeded deadline".to_string()),
            },
            Ok(Err(e)) => {
                // Distinguish a failed tools/list (degraded) from a failed
                // handshake (unhealthy) by probing initialize alone.
                let handshake_ok = self.probe_initialize(&record.url).await;
                HealthReport {
                    status: if handshake_ok {
                        HealthStatus::Degraded
                    } else {
                        HealthStatus::Unhealthy
                    },
                    latency_ms,
                    error: Some(e.public_message()),
                }
            }
            Err(_) => HealthReport {
                status: HealthStatus::Unhealthy,
                latency_ms,
                error: Some("probe deadline exceeded".to_string()),
            },
        };

        debug!(server_id, status = ?report.status, latency_ms, "server probed");
        Ok(report)
    }

    async fn probe_initialize(&self, url: &str) -> bool {
        let initialize = JsonRpcRequest::new(
            methods::INITIALIZE,
            Some(json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {"name": "gatehouse", "version": env!("CARGO_PKG_VERSION")}
            })),
            Some(json!("probe")),
        );
        matches!(
            self.client.call(url, None, &initialize).await,
            Ok(outcome) if outcome.response.error.is_none()
        )
    }

    /// Re-run discovery and persist the fresh snapshot
    pub async fn refresh(&self, server_id: &str) -> McpResult<Vec<Tool>> {
        let record = self.store.servers().get(server_id).await?;
        let discovery = self.discover(&record.url).await?;
        self.store
            .servers()
            .update_discovery(
                server_id,
                &json!({ "tools": discovery.tools }),
                &discovery.protocol_version,
                discovery.server_info.as_ref(),
                discovery.tools.len() as i64,
            )
            .await?;
        self.last_refresh
            .lock()
            .await
            .insert(server_id.to_string(), Instant::now());
        info!(server_id, tools = discovery.tools.len(), "capabilities refreshed");
        Ok(discovery.tools)
    }

    /// Opportunistic refresh, rate-limited per server
    pub async fn maybe_refresh(&self, server_id: &str) -> McpResult<bool> {
        {
            let last = self.last_refresh.lock().await;
            if let Some(at) = last.get(server_id) {
                if at.elapsed() < self.refresh_interval {
                    return Ok(false);
                }
            }
        }
        match self.refresh(server_id).await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!(server_id, error = %e, "opportunistic refresh failed");
                Ok(false)
            }
        }
    }

    /// Remove a server; its ACL rows are purged with it
    pub async fn remove_server(&self, server_id: &str) -> McpResult<ServerRecord> {
        let record = self.store.servers().get(server_id).await?;
        self.store.servers().delete(server_id).await?;
        self.last_refresh.lock().await.remove(server_id);
        info!(server_id, "server removed");
        Ok(record)
    }

    pub async fn list_servers(&self) -> McpResult<Vec<ServerRecord>> {
        Ok(self.store.servers().list(false).await?)
    }

    pub async fn get_server(&self, server_id: &str) -> McpResult<ServerRecord> {
        Ok(self.store.servers().get(server_id).await?)
    }

    /// Enabled servers with their cached tool snapshots
    pub async fn enabled_servers(&self) -> McpResult<Vec<ServerRecord>> {
        Ok(self.store.servers().list(true).await?)
    }
}
