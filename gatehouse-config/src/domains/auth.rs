//! Authentication configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_required_string, Validatable};

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// JWT signing secret. Empty means a random secret is generated at
    /// startup, which invalidates tokens across restarts.
    #[serde(default)]
    pub jwt_secret: String,

    /// Access token lifetime
    #[serde(with = "humantime_serde", default = "default_token_ttl")]
    pub token_ttl: Duration,

    /// Path to the symmetric encryption key file
    #[serde(default = "default_key_file")]
    pub encryption_key_file: String,

    /// Lifetime of a pending OAuth login flow
    #[serde(with = "humantime_serde", default = "default_flow_ttl")]
    pub flow_ttl: Duration,

    /// Per-call timeout for OAuth provider requests
    #[serde(with = "humantime_serde", default = "default_provider_timeout")]
    pub provider_timeout: Duration,

    /// URL the browser is redirected to after a completed login
    #[serde(default = "default_ui_redirect")]
    pub ui_redirect_url: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl: default_token_ttl(),
            encryption_key_file: default_key_file(),
            flow_ttl: default_flow_ttl(),
            provider_timeout: default_provider_timeout(),
            ui_redirect_url: default_ui_redirect(),
        }
    }
}

impl Validatable for AuthConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.encryption_key_file, "auth.encryption_key_file")?;
        validate_required_string(&self.ui_redirect_url, "auth.ui_redirect_url")
    }
}

fn default_token_ttl() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_key_file() -> String {
    "gatehouse.key".to_string()
}

fn default_flow_ttl() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_provider_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_ui_redirect() -> String {
    "/ui/".to_string()
}
