//! MCP core for the Gatehouse gateway
//!
//! Wire framing, client-facing sessions, the upstream server registry with
//! capability discovery and health probing, and the tool aggregator/router
//! that merges upstream catalogs into a single namespace.

pub mod catalog;
pub mod client;
pub mod error;
pub mod proto;
pub mod registry;
pub mod router;
pub mod schema;
pub mod session;
pub mod wire;

pub use catalog::ToolCatalog;
pub use client::{CallOutcome, UpstreamClient, UpstreamStream};
pub use error::{McpError, McpResult};
pub use proto::{
    validate_protocol_version, InitializeParams, InitializeResult, QualifiedTool, Tool,
    ToolsCallParams, ToolsListResult, MCP_PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS,
};
pub use registry::{server_id_for_url, HealthReport, HealthStatus, Registry};
pub use router::{Caller, RoutedCall, ToolRouter};
pub use session::{McpSession, SessionManager, SESSION_ID_HEADER};
pub use wire::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
