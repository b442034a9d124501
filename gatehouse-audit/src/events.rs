//! Typed audit event kinds and severities

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use gatehouse_storage::AuditRecord;

/// Closed set of audit event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditKind {
    #[serde(rename = "auth.login.success")]
    LoginSuccess,
    #[serde(rename = "auth.login.failure")]
    LoginFailure,
    #[serde(rename = "auth.token.issued")]
    TokenIssued,
    #[serde(rename = "auth.logout")]
    Logout,
    #[serde(rename = "authz.denied")]
    AuthzDenied,
    #[serde(rename = "server.added")]
    ServerAdded,
    #[serde(rename = "server.removed")]
    ServerRemoved,
    #[serde(rename = "server.test")]
    ServerTest,
    #[serde(rename = "tool.invoked")]
    ToolInvoked,
    #[serde(rename = "tool.invocation_failed")]
    ToolInvocationFailed,
    #[serde(rename = "role.created")]
    RoleCreated,
    #[serde(rename = "role.updated")]
    RoleUpdated,
    #[serde(rename = "role.deleted")]
    RoleDeleted,
    #[serde(rename = "role.assigned")]
    RoleAssigned,
    #[serde(rename = "role.revoked")]
    RoleRevoked,
    #[serde(rename = "oauth.provider.added")]
    ProviderAdded,
    #[serde(rename = "oauth.provider.removed")]
    ProviderRemoved,
    #[serde(rename = "acl.changed")]
    AclChanged,
    #[serde(rename = "config.changed")]
    ConfigChanged,
    #[serde(rename = "security.rate_limited")]
    RateLimited,
    #[serde(rename = "security.origin_rejected")]
    OriginRejected,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::LoginSuccess => "auth.login.success",
            AuditKind::LoginFailure => "auth.login.failure",
            AuditKind::TokenIssued => "auth.token.issued",
            AuditKind::Logout => "auth.logout",
            AuditKind::AuthzDenied => "authz.denied",
            AuditKind::ServerAdded => "server.added",
            AuditKind::ServerRemoved => "server.removed",
            AuditKind::ServerTest => "server.test",
            AuditKind::ToolInvoked => "tool.invoked",
            AuditKind::ToolInvocationFailed => "tool.invocation_failed",
            AuditKind::RoleCreated => "role.created",
            AuditKind::RoleUpdated => "role.updated",
            AuditKind::RoleDeleted => "role.deleted",
            AuditKind::RoleAssigned => "role.assigned",
            AuditKind::RoleRevoked => "role.revoked",
            AuditKind::ProviderAdded => "oauth.provider.added",
            AuditKind::ProviderRemoved => "oauth.provider.removed",
            AuditKind::AclChanged => "acl.changed",
            AuditKind::ConfigChanged => "config.changed",
            AuditKind::RateLimited => "security.rate_limited",
            AuditKind::OriginRejected => "security.origin_rejected",
        }
    }

    /// Security events must never be dropped by the buffering layer
    pub fn is_critical(&self) -> bool {
        self.as_str().starts_with("security.") || matches!(self, AuditKind::AuthzDenied)
    }

    pub fn default_severity(&self) -> Severity {
        match self {
            AuditKind::LoginFailure | AuditKind::AuthzDenied => Severity::Warn,
            AuditKind::ToolInvocationFailed => Severity::Error,
            AuditKind::RateLimited | AuditKind::OriginRejected => Severity::Warn,
            _ => Severity::Info,
        }
    }
}

/// Audit severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

/// An audit event under construction
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub kind: AuditKind,
    pub severity: Severity,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub ip: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub action: Option<String>,
    pub details: Value,
    pub success: bool,
}

impl AuditEvent {
    pub fn new(kind: AuditKind) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            user_id: None,
            user_email: None,
            ip: None,
            resource_type: None,
            resource_id: None,
            action: None,
            details: Value::Object(Default::default()),
            success: true,
        }
    }

    pub fn failure(kind: AuditKind) -> Self {
        let mut event = Self::new(kind);
        event.success = false;
        event
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn user(mut self, user_id: impl Into<String>, email: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self.user_email = Some(email.into());
        self
    }

    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn resource(mut self, kind: impl Into<String>, id: impl Into<String>) -> Self {
        self.resource_type = Some(kind.into());
        self.resource_id = Some(id.into());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Finalize into a persistable record, scrubbing denylisted detail keys
    pub fn into_record(mut self) -> AuditRecord {
        sanitize_details(&mut self.details);
        AuditRecord {
            event_id: Uuid::new_v4().to_string(),
            ts: Utc::now(),
            kind: self.kind.as_str().to_string(),
            severity: self.severity.as_str().to_string(),
            user_id: self.user_id,
            user_email: self.user_email,
            ip: self.ip,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            action: self.action,
            details: self.details,
            success: self.success,
        }
    }
}

/// Detail keys that must never reach the store
const DENYLIST: &[&str] = &[
    "token",
    "access_token",
    "refresh_token",
    "id_token",
    "secret",
    "client_secret",
    "password",
    "authorization",
    "code_verifier",
];

fn sanitize_details(value: &mut Value) {
    if let Value::Object(map) = value {
        for (key, entry) in map.iter_mut() {
            let lowered = key.to_lowercase();
            if DENYLIST.iter().any(|denied| lowered.contains(denied)) {
                *entry = Value::String("[redacted]".to_string());
            } else {
                sanitize_details(entry);
            }
        }
    } else if let Value::Array(items) = value {
        for item in items.iter_mut() {
            sanitize_details(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_denylisted_keys_are_redacted() {
        let record = AuditEvent::new(AuditKind::LoginFailure)
            .details(json!({
                "provider": "google",
                "Access_Token": "sk-abc",
                "nested": {"client_secret": "shh", "reason": "timeout"}
            }))
            .into_record();

        assert_eq!(record.details["provider"], "google");
        assert_eq!(record.details["Access_Token"], "[redacted]");
        assert_eq!(record.details["nested"]["client_secret"], "[redacted]");
        assert_eq!(record.details["nested"]["reason"], "timeout");
    }

    #[test]
    fn test_kind_strings_roundtrip() {
        for kind in [
            AuditKind::LoginSuccess,
            AuditKind::AuthzDenied,
            AuditKind::RateLimited,
            AuditKind::ToolInvocationFailed,
        ] {
            let s = serde_json::to_string(&kind).unwrap();
            assert_eq!(s, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_security_kinds_are_critical() {
        assert!(AuditKind::RateLimited.is_critical());
        assert!(AuditKind::AuthzDenied.is_critical());
        assert!(!AuditKind::ToolInvoked.is_critical());
    }
}
