//! MCP message types and protocol version negotiation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Baseline protocol version the gateway speaks
pub const MCP_PROTOCOL_VERSION: &str = "2025-06-18";

/// Closed accept set of protocol versions
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26"];

/// Check a client-proposed protocol version against the accept set
pub fn validate_protocol_version(version: &str) -> bool {
    SUPPORTED_PROTOCOL_VERSIONS.contains(&version)
}

/// MCP method names the gateway serves
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const PING: &str = "ping";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
}

/// Parameters for the initialize method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeParams {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,

    #[serde(default)]
    pub capabilities: Value,

    #[serde(rename = "clientInfo", skip_serializing_if = "Option::is_none")]
    pub client_info: Option<ClientInfo>,
}

/// Result of the initialize method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,

    pub capabilities: Value,

    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// Tool definition as exposed over the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

/// Result of tools/list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsListResult {
    pub tools: Vec<Tool>,
}

/// Parameters for tools/call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsCallParams {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// A tool qualified into the gateway's unified namespace (derived, not
/// persisted)
#[derive(Debug, Clone, Serialize)]
pub struct QualifiedTool {
    pub qualified_name: String,
    pub server_id: String,
    pub raw_name: String,
    pub description: String,
    pub input_schema: Value,
    pub discovered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_version_accept_set() {
        assert!(validate_protocol_version("2025-06-18"));
        assert!(validate_protocol_version("2025-03-26"));
        assert!(!validate_protocol_version("2024-11-05"));
        assert!(!validate_protocol_version("1.0"));
    }

    #[test]
    fn test_initialize_params_wire_shape() {
        let params: InitializeParams = serde_json::from_value(json!({
            "protocolVersion": "2025-06-18",
            "clientInfo": {"name": "c", "version": "1"}
        }))
        .unwrap();
        assert_eq!(params.protocol_version, "2025-06-18");
        assert_eq!(params.client_info.unwrap().name, "c");
    }

    #[test]
    fn test_tool_schema_field_renamed() {
        let tool = Tool {
            name: "search".to_string(),
            description: "find things".to_string(),
            input_schema: json!({"type": "object"}),
        };
        let wire = serde_json::to_value(&tool).unwrap();
        assert!(wire.get("inputSchema").is_some());
        assert!(wire.get("input_schema").is_none());
    }
}
