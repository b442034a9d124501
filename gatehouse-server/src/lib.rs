//! HTTP frontend for the Gatehouse MCP gateway
//!
//! Terminates MCP traffic at /mcp, exposes the management JSON-RPC surface
//! at /manage and the REST auth endpoints under /auth, and serves the
//! static UI.

pub mod app;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod startup;
pub mod state;

pub use app::build_app;
pub use state::GatewayCore;
