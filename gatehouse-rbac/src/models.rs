//! Permission vocabulary

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Closed set of gateway permissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "server:view")]
    ServerView,
    #[serde(rename = "server:add")]
    ServerAdd,
    #[serde(rename = "server:edit")]
    ServerEdit,
    #[serde(rename = "server:delete")]
    ServerDelete,
    #[serde(rename = "server:test")]
    ServerTest,
    #[serde(rename = "tool:view")]
    ToolView,
    #[serde(rename = "tool:execute")]
    ToolExecute,
    #[serde(rename = "tool:manage")]
    ToolManage,
    #[serde(rename = "config:view")]
    ConfigView,
    #[serde(rename = "config:edit")]
    ConfigEdit,
    #[serde(rename = "user:view")]
    UserView,
    #[serde(rename = "user:manage")]
    UserManage,
    #[serde(rename = "role:view")]
    RoleView,
    #[serde(rename = "role:manage")]
    RoleManage,
    #[serde(rename = "audit:view")]
    AuditView,
    #[serde(rename = "oauth:manage")]
    OauthManage,
}

impl Permission {
    pub const ALL: &'static [Permission] = &[
        Permission::ServerView,
        Permission::ServerAdd,
        Permission::ServerEdit,
        Permission::ServerDelete,
        Permission::ServerTest,
        Permission::ToolView,
        Permission::ToolExecute,
        Permission::ToolManage,
        Permission::ConfigView,
        Permission::ConfigEdit,
        Permission::UserView,
        Permission::UserManage,
        Permission::RoleView,
        Permission::RoleManage,
        Permission::AuditView,
        Permission::OauthManage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ServerView => "server:view",
            Permission::ServerAdd => "server:add",
            Permission::ServerEdit => "server:edit",
            Permission::ServerDelete => "server:delete",
            Permission::ServerTest => "server:test",
            Permission::ToolView => "tool:view",
            Permission::ToolExecute => "tool:execute",
            Permission::ToolManage => "tool:manage",
            Permission::ConfigView => "config:view",
            Permission::ConfigEdit => "config:edit",
            Permission::UserView => "user:view",
            Permission::UserManage => "user:manage",
            Permission::RoleView => "role:view",
            Permission::RoleManage => "role:manage",
            Permission::AuditView => "audit:view",
            Permission::OauthManage => "oauth:manage",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown permission '{}'", s))
    }
}
