//! Persisted entity types
//!
//! JSON-valued columns (capabilities, permissions, scopes, details) are kept
//! typed here; repositories serialize them at the SQL boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A registered upstream MCP server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRecord {
    pub server_id: String,
    pub name: String,
    pub url: String,
    pub description: Option<String>,
    /// Last successful discovery snapshot (tools/list result)
    pub capabilities: Option<Value>,
    pub protocol_version: Option<String>,
    pub server_info: Option<Value>,
    pub tool_count: i64,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An OAuth provider; the client secret is stored only as ciphertext
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub provider_id: String,
    pub provider_name: String,
    pub client_id: String,
    pub client_secret_ciphertext: String,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub scopes: Vec<String>,
    pub enabled: bool,
}

/// A gateway user, created on first successful OAuth callback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub provider_id: Option<String>,
    pub subject: Option<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// A role with its permission set, stored as permission strings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRecord {
    pub role_id: String,
    pub name: String,
    pub description: String,
    pub permissions: Vec<String>,
    pub is_system: bool,
}

/// Per-user, per-server tool allowlist. `allowed_tools == None` means ALL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AclRecord {
    pub user_id: String,
    pub server_id: String,
    pub allowed_tools: Option<Vec<String>>,
}

/// AD/LDAP group DN mapped to gateway roles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdGroupMapping {
    pub dn: String,
    pub role_ids: Vec<String>,
}

/// A persisted audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub event_id: String,
    pub ts: DateTime<Utc>,
    pub kind: String,
    pub severity: String,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub ip: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub action: Option<String>,
    pub details: Value,
    pub success: bool,
}

/// Filter for audit queries; all fields conjunctive
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub kind: Option<String>,
    pub severity: Option<String>,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl AuditQuery {
    pub fn latest(limit: i64) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }
}

/// Aggregate audit counters for audit.statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditStatistics {
    pub total: i64,
    pub by_kind: Vec<(String, i64)>,
    pub by_severity: Vec<(String, i64)>,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}
