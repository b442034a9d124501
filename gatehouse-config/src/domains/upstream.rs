//! Upstream MCP server configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};

/// Upstream registry and session pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Per-call timeout for upstream MCP requests
    #[serde(with = "humantime_serde", default = "default_call_timeout")]
    pub call_timeout: Duration,

    /// Overall deadline for a health probe
    #[serde(with = "humantime_serde", default = "default_probe_deadline")]
    pub probe_deadline: Duration,

    /// Minimum interval between opportunistic capability refreshes per server
    #[serde(with = "humantime_serde", default = "default_refresh_interval")]
    pub refresh_interval: Duration,

    /// Maximum pooled sessions per upstream server
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Idle TTL for client-facing MCP sessions
    #[serde(with = "humantime_serde", default = "default_session_ttl")]
    pub session_ttl: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            call_timeout: default_call_timeout(),
            probe_deadline: default_probe_deadline(),
            refresh_interval: default_refresh_interval(),
            pool_size: default_pool_size(),
            session_ttl: default_session_ttl(),
        }
    }
}

impl Validatable for UpstreamConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.pool_size as u64, "upstream.pool_size")
    }
}

fn default_call_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_probe_deadline() -> Duration {
    Duration::from_secs(10)
}

fn default_refresh_interval() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_pool_size() -> usize {
    4
}

fn default_session_ttl() -> Duration {
    Duration::from_secs(30 * 60)
}
