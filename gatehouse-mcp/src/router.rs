//! Tool call routing
//!
//! Resolves qualified tool names to their owning upstream, enforces the
//! permission/ACL path, pools upstream sessions, and streams responses back
//! with client/upstream id remapping.

use std::num::NonZeroUsize;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{Stream, StreamExt};
use lru::LruCache;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

use gatehouse_audit::{AuditEvent, AuditKind, AuditRecorder};
use gatehouse_config::UpstreamConfig;
use gatehouse_rbac::Enforcer;
use gatehouse_storage::ServerRecord;

use crate::catalog::ToolCatalog;
use crate::client::UpstreamClient;
use crate::error::{McpError, McpResult};
use crate::proto::{methods, ToolsCallParams, MCP_PROTOCOL_VERSION};
use crate::registry::Registry;
use crate::schema::validate_arguments;
use crate::wire::{JsonRpcRequest, JsonRpcResponse};

type MessageStream = Pin<Box<dyn Stream<Item = McpResult<JsonRpcResponse>> + Send>>;

/// Identity on whose behalf a call executes
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
    pub email: String,
}

/// A routed tool call ready to emit to the client
pub struct RoutedCall {
    /// True when the response should be framed as SSE
    pub streaming: bool,
    pub messages: MessageStream,
}

impl std::fmt::Debug for RoutedCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutedCall")
            .field("streaming", &self.streaming)
            .finish_non_exhaustive()
    }
}

/// Pooled upstream MCP session
#[derive(Debug, Clone)]
struct PooledSession {
    session_id: Option<String>,
}

/// Routes tools/* traffic to the owning upstream servers
#[derive(Clone)]
pub struct ToolRouter {
    registry: Registry,
    catalog: ToolCatalog,
    enforcer: Enforcer,
    audit: AuditRecorder,
    client: UpstreamClient,
    call_timeout: Duration,
    sessions: Arc<Mutex<LruCache<String, PooledSession>>>,
}

impl ToolRouter {
    pub fn new(
        registry: Registry,
        catalog: ToolCatalog,
        enforcer: Enforcer,
        audit: AuditRecorder,
        client: UpstreamClient,
        config: &UpstreamConfig,
    ) -> Self {
        let bound = NonZeroUsize::new(config.pool_size.max(1)).expect("pool_size >= 1");
        Self {
            registry,
            catalog,
            enforcer,
            audit,
            client,
            call_timeout: config.call_timeout,
            sessions: Arc::new(Mutex::new(LruCache::new(bound))),
        }
    }

    /// Build the catalog on first use
    async fn ensure_catalog(&self) -> McpResult<()> {
        if self.catalog.is_built().await {
            return Ok(());
        }
        let servers = self.registry.enabled_servers().await?;
        self.catalog.rebuild(&servers).await;
        Ok(())
    }

    /// Rebuild the catalog from the registry's current snapshots
    pub async fn rebuild_catalog(&self) -> McpResult<()> {
        let servers = self.registry.enabled_servers().await?;
        self.catalog.rebuild(&servers).await;
        Ok(())
    }

    /// Unified tools/list view, sorted deterministically
    pub async fn list_tools(&self) -> McpResult<Value> {
        self.ensure_catalog().await?;
        self.spawn_opportunistic_refresh();
        let tools: Vec<Value> = self
            .catalog
            .list()
            .await
            .into_iter()
            .map(|tool| {
                json!({
                    "name": tool.qualified_name,
                    "description": tool.description,
                    "inputSchema": tool.input_schema,
                })
            })
            .collect();
        Ok(json!({ "tools": tools }))
    }

    /// Execute tools/call on behalf of `caller`.
    ///
    /// `client_id` is the JSON-RPC id of the client request; upstream
    /// messages are remapped to it before they are emitted.
    pub async fn call_tool(
        &self,
        caller: &Caller,
        params: &ToolsCallParams,
        client_id: Option<Value>,
    ) -> McpResult<RoutedCall> {
        self.ensure_catalog().await?;

        let entry = match self.catalog.resolve(&params.name).await {
            Ok(entry) => entry,
            Err(err) => {
                self.audit_failure(caller, &params.name, None, "tool not in catalog")
                    .await;
                return Err(err);
            }
        };

        if !self
            .enforcer
            .can_use_tool(&caller.user_id, &entry.server_id, &entry.raw_name)
            .await?
        {
            // The enforcer has already recorded authz.denied; no upstream
            // request happens on this path.
            return Err(McpError::forbidden(format!(
                "not permitted to call '{}'",
                params.name
            )));
        }

        let arguments = params.arguments.clone().unwrap_or_else(|| json!({}));
        validate_arguments(&entry.input_schema, &arguments)?;

        let server = self.registry.get_server(&entry.server_id).await?;
        let upstream_id = Value::String(Uuid::new_v4().to_string());
        let request = JsonRpcRequest::new(
            methods::TOOLS_CALL,
            Some(json!({ "name": entry.raw_name, "arguments": arguments })),
            Some(upstream_id.clone()),
        );

        let started = Instant::now();
        let mut upstream = self.open_upstream(&server, &request).await?;
        let mut first = self.first_message(&mut upstream).await?;

        // A missing tool upstream triggers exactly one capability refresh,
        // and one retry only if the tool survived the refresh.
        if let Some(Ok(message)) = &first {
            if is_missing_tool(message) && self.registry.refresh(&entry.server_id).await.is_ok() {
                self.rebuild_catalog().await?;
                if self.catalog.resolve(&params.name).await.is_ok() {
                    upstream = self.open_upstream(&server, &request).await?;
                    first = self.first_message(&mut upstream).await?;
                }
            }
        }

        let audit = self.audit.clone();
        let caller = caller.clone();
        let entry_name = params.name.clone();
        let server_id = entry.server_id.clone();
        let streaming = upstream.streaming;
        let mut rest = upstream.messages;

        let messages = async_stream::stream! {
            let mut failure: Option<String> = None;

            if let Some(item) = first {
                match item {
                    Ok(mut message) => {
                        remap_id(&mut message, &upstream_id, &client_id);
                        if let Some(error) = &message.error {
                            failure = Some(error.message.clone());
                        }
                        yield Ok(message);
                    }
                    Err(err) => {
                        failure = Some(err.public_message());
                        yield Err(err);
                    }
                }
            }
            while let Some(item) = rest.next().await {
                match item {
                    Ok(mut message) => {
                        remap_id(&mut message, &upstream_id, &client_id);
                        if let Some(error) = &message.error {
                            failure = Some(error.message.clone());
                        }
                        yield Ok(message);
                    }
                    Err(err) => {
                        failure = Some(err.public_message());
                        yield Err(err);
                        break;
                    }
                }
            }

            let duration_ms = started.elapsed().as_millis() as u64;
            let event = match &failure {
                None => AuditEvent::new(AuditKind::ToolInvoked)
                    .user(&caller.user_id, &caller.email)
                    .resource("tool", &entry_name)
                    .details(json!({"server_id": server_id, "duration_ms": duration_ms})),
                Some(reason) => AuditEvent::failure(AuditKind::ToolInvocationFailed)
                    .user(&caller.user_id, &caller.email)
                    .resource("tool", &entry_name)
                    .details(json!({
                        "server_id": server_id,
                        "duration_ms": duration_ms,
                        "reason": reason,
                    })),
            };
            audit.record(event).await;
        };

        Ok(RoutedCall {
            streaming,
            messages: Box::pin(messages),
        })
    }

    /// Kick off a rate-limited background refresh of every enabled server's
    /// capability snapshot. The registry enforces the per-server interval.
    fn spawn_opportunistic_refresh(&self) {
        let registry = self.registry.clone();
        let catalog = self.catalog.clone();
        tokio::spawn(async move {
            let Ok(servers) = registry.enabled_servers().await else {
                return;
            };
            let mut refreshed = false;
            for server in &servers {
                if registry.maybe_refresh(&server.server_id).await.unwrap_or(false) {
                    refreshed = true;
                }
            }
            if refreshed {
                if let Ok(servers) = registry.enabled_servers().await {
                    catalog.rebuild(&servers).await;
                }
            }
        });
    }

    /// First message of an upstream stream, under the per-call deadline
    async fn first_message(
        &self,
        upstream: &mut crate::client::UpstreamStream,
    ) -> McpResult<Option<McpResult<JsonRpcResponse>>> {
        tokio::time::timeout(self.call_timeout, upstream.messages.next())
            .await
            .map_err(|_| McpError::UpstreamTimeout)
    }

    /// Checkout (or create) a pooled session toward a server.
    ///
    /// Creation races use double-checked initialization: the handshake runs
    /// outside the pool lock, and the first finisher wins.
    async fn open_upstream(
        &self,
        server: &ServerRecord,
        request: &JsonRpcRequest,
    ) -> McpResult<crate::client::UpstreamStream> {
        let pooled = {
            let mut pool = self.sessions.lock().await;
            pool.get(&server.server_id).cloned()
        };

        let session = match pooled {
            Some(session) => session,
            None => {
                let session = self.initialize_upstream(server).await?;
                let mut pool = self.sessions.lock().await;
                let raced = pool.get(&server.server_id).cloned();
                match raced {
                    // Another task finished its handshake first; use its
                    // session and drop ours
                    Some(winner) => winner,
                    None => {
                        pool.put(server.server_id.clone(), session.clone());
                        session
                    }
                }
            }
        };

        match self
            .client
            .call_streaming(&server.url, session.session_id.as_deref(), request)
            .await
        {
            Ok(stream) => Ok(stream),
            Err(err) => {
                // A dead pooled session is discarded; one reconnect attempt
                let mut pool = self.sessions.lock().await;
                pool.pop(&server.server_id);
                drop(pool);
                let fresh = self.initialize_upstream(server).await?;
                let stream = self
                    .client
                    .call_streaming(&server.url, fresh.session_id.as_deref(), request)
                    .await
                    .map_err(|_| err)?;
                let mut pool = self.sessions.lock().await;
                pool.put(server.server_id.clone(), fresh);
                Ok(stream)
            }
        }
    }

    /// Full initialize handshake toward an upstream
    async fn initialize_upstream(&self, server: &ServerRecord) -> McpResult<PooledSession> {
        let initialize = JsonRpcRequest::new(
            methods::INITIALIZE,
            Some(json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {"name": "gatehouse", "version": env!("CARGO_PKG_VERSION")}
            })),
            Some(json!("init")),
        );
        let outcome = self.client.call(&server.url, None, &initialize).await?;
        if let Some(error) = outcome.response.error {
            return Err(McpError::upstream(format!(
                "initialize failed: {}",
                error.message
            )));
        }

        let initialized = JsonRpcRequest::notification(methods::INITIALIZED, None);
        self.client
            .notify(&server.url, outcome.session_id.as_deref(), &initialized)
            .await?;

        Ok(PooledSession {
            session_id: outcome.session_id,
        })
    }

    async fn audit_failure(
        &self,
        caller: &Caller,
        tool_name: &str,
        server_id: Option<&str>,
        reason: &str,
    ) {
        let mut details = json!({"reason": reason});
        if let Some(server_id) = server_id {
            details["server_id"] = json!(server_id);
        }
        self.audit
            .record(
                AuditEvent::failure(AuditKind::ToolInvocationFailed)
                    .user(&caller.user_id, &caller.email)
                    .resource("tool", tool_name)
                    .details(details),
            )
            .await;
    }
}

/// Rewrite the gateway-assigned upstream id back to the client's id
fn remap_id(message: &mut JsonRpcResponse, upstream_id: &Value, client_id: &Option<Value>) {
    if message.id.as_ref() == Some(upstream_id) {
        message.id = client_id.clone();
    }
}

/// Upstream error codes and messages that mean "no such tool"
fn is_missing_tool(message: &JsonRpcResponse) -> bool {
    match &message.error {
        Some(error) => {
            error.code == -32601 || error.message.to_lowercase().contains("not found")
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::JsonRpcError;

    #[test]
    fn test_missing_tool_detection() {
        let method_missing = JsonRpcResponse::error(
            JsonRpcError::new(-32601, "Method not found", None),
            Some(json!(1)),
        );
        assert!(is_missing_tool(&method_missing));

        let message_match = JsonRpcResponse::error(
            JsonRpcError::new(-32000, "Tool not found: rank", None),
            Some(json!(1)),
        );
        assert!(is_missing_tool(&message_match));

        let success = JsonRpcResponse::success(json!({"content": []}), Some(json!(1)));
        assert!(!is_missing_tool(&success));
    }
}
