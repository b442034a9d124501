//! Rate limiting configuration

use serde::{Deserialize, Serialize};

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Requests per minute per principal (or source IP when unauthenticated)
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Sample rate for security.rate_limited audit events (1 in N denials)
    #[serde(default = "default_audit_sample")]
    pub audit_sample: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            requests_per_minute: default_requests_per_minute(),
            audit_sample: default_audit_sample(),
        }
    }
}

impl Validatable for RateLimitConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(
            self.requests_per_minute as u64,
            "rate_limit.requests_per_minute",
        )?;
        validate_positive(self.audit_sample as u64, "rate_limit.audit_sample")
    }
}

fn default_enabled() -> bool {
    true
}

fn default_requests_per_minute() -> u32 {
    120
}

fn default_audit_sample() -> u32 {
    8
}
