//! Unified tool catalog
//!
//! The index maps qualified tool names to their owning upstream. It is
//! rebuilt from the registry's capability snapshots and swapped atomically;
//! readers clone the current `Arc` and never block.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::warn;

use gatehouse_storage::ServerRecord;

use crate::error::{McpError, McpResult};
use crate::proto::{QualifiedTool, Tool};
use crate::registry::short_server_id;

/// A catalog entry pointing at the owning upstream
#[derive(Debug, Clone)]
pub struct ToolEntry {
    pub qualified_name: String,
    pub server_id: String,
    pub raw_name: String,
    pub description: String,
    pub input_schema: Value,
    pub discovered_at: DateTime<Utc>,
}

type Index = HashMap<String, ToolEntry>;

/// Copy-on-write tool index. `None` until the first build.
#[derive(Clone, Default)]
pub struct ToolCatalog {
    index: Arc<RwLock<Option<Arc<Index>>>>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_built(&self) -> bool {
        self.index.read().await.is_some()
    }

    /// Drop the index; the next read rebuilds it
    pub async fn invalidate(&self) {
        *self.index.write().await = None;
    }

    /// Rebuild the index from enabled servers' capability snapshots.
    ///
    /// A raw name owned by exactly one server keeps its name; names exposed
    /// by several servers are qualified as `name@server_id_short` for every
    /// owner.
    pub async fn rebuild(&self, servers: &[ServerRecord]) {
        let mut owners: HashMap<String, Vec<(&ServerRecord, Tool)>> = HashMap::new();
        for server in servers {
            for tool in snapshot_tools(server) {
                owners.entry(tool.name.clone()).or_default().push((server, tool));
            }
        }

        let mut index: Index = HashMap::new();
        for (raw_name, mut entries) in owners {
            let collision = entries.len() > 1;
            if collision {
                let involved: Vec<&str> =
                    entries.iter().map(|(s, _)| s.server_id.as_str()).collect();
                warn!(tool = %raw_name, servers = ?involved, "tool name collision, qualifying");
            }
            for (server, tool) in entries.drain(..) {
                let qualified_name = if collision {
                    format!("{}@{}", raw_name, short_server_id(&server.server_id))
                } else {
                    raw_name.clone()
                };
                index.insert(
                    qualified_name.clone(),
                    ToolEntry {
                        qualified_name,
                        server_id: server.server_id.clone(),
                        raw_name: raw_name.clone(),
                        description: tool.description,
                        input_schema: tool.input_schema,
                        discovered_at: server.updated_at,
                    },
                );
            }
        }

        *self.index.write().await = Some(Arc::new(index));
    }

    /// Resolve a qualified name to its entry
    pub async fn resolve(&self, qualified_name: &str) -> McpResult<ToolEntry> {
        let snapshot = self
            .index
            .read()
            .await
            .clone()
            .ok_or_else(|| McpError::internal("tool catalog not built"))?;
        snapshot
            .get(qualified_name)
            .cloned()
            .ok_or_else(|| McpError::tool_not_found(qualified_name))
    }

    /// Every catalog entry, deterministically ordered by
    /// (qualified_name, server_id)
    pub async fn list(&self) -> Vec<QualifiedTool> {
        let Some(snapshot) = self.index.read().await.clone() else {
            return Vec::new();
        };
        let mut tools: Vec<QualifiedTool> = snapshot
            .values()
            .map(|entry| QualifiedTool {
                qualified_name: entry.qualified_name.clone(),
                server_id: entry.server_id.clone(),
                raw_name: entry.raw_name.clone(),
                description: entry.description.clone(),
                input_schema: entry.input_schema.clone(),
                discovered_at: entry.discovered_at,
            })
            .collect();
        tools.sort_by(|a, b| {
            (a.qualified_name.as_str(), a.server_id.as_str())
                .cmp(&(b.qualified_name.as_str(), b.server_id.as_str()))
        });
        tools
    }
}

/// Tools recorded in a server's last discovery snapshot
fn snapshot_tools(server: &ServerRecord) -> Vec<Tool> {
    server
        .capabilities
        .as_ref()
        .and_then(|caps| caps.get("tools"))
        .and_then(|tools| serde_json::from_value::<Vec<Tool>>(tools.clone()).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn server(server_id: &str, url: &str, tools: Value) -> ServerRecord {
        ServerRecord {
            server_id: server_id.to_string(),
            name: server_id.to_string(),
            url: url.to_string(),
            description: None,
            capabilities: Some(json!({ "tools": tools })),
            protocol_version: Some("2025-06-18".to_string()),
            server_info: None,
            tool_count: 0,
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_collisions_are_qualified_and_sorted() {
        let a = server(
            "aaaaaaaa11111111",
            "http://a.example/mcp",
            json!([{"name": "search", "description": "a search", "inputSchema": {}}]),
        );
        let b = server(
            "bbbbbbbb22222222",
            "http://b.example/mcp",
            json!([
                {"name": "search", "description": "b search", "inputSchema": {}},
                {"name": "rank", "description": "b rank", "inputSchema": {}}
            ]),
        );

        let catalog = ToolCatalog::new();
        catalog.rebuild(&[a, b]).await;

        let tools = catalog.list().await;
        let names: Vec<&str> = tools.iter().map(|t| t.qualified_name.as_str()).collect();
        assert_eq!(names, vec!["rank", "search@aaaaaaaa", "search@bbbbbbbb"]);

        let entry = catalog.resolve("search@bbbbbbbb").await.unwrap();
        assert_eq!(entry.raw_name, "search");
        assert_eq!(entry.server_id, "bbbbbbbb22222222");

        let entry = catalog.resolve("rank").await.unwrap();
        assert_eq!(entry.server_id, "bbbbbbbb22222222");
    }

    #[tokio::test]
    async fn test_unknown_tool_not_found() {
        let catalog = ToolCatalog::new();
        catalog.rebuild(&[]).await;
        let err = catalog.resolve("ghost").await.unwrap_err();
        assert_eq!(err.kind(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_invalidate_forces_rebuild() {
        let catalog = ToolCatalog::new();
        catalog.rebuild(&[]).await;
        assert!(catalog.is_built().await);
        catalog.invalidate().await;
        assert!(!catalog.is_built().await);
    }
}
