//! Embedded store configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_required_string, Validatable};

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the sqlite database file
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Maximum pool connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Busy timeout applied to every connection
    #[serde(with = "humantime_serde", default = "default_busy_timeout")]
    pub busy_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
            busy_timeout: default_busy_timeout(),
        }
    }
}

impl Validatable for DatabaseConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.path, "database.path")?;
        validate_positive(self.max_connections as u64, "database.max_connections")
    }
}

fn default_db_path() -> String {
    "gatehouse.db".to_string()
}

fn default_max_connections() -> u32 {
    8
}

fn default_busy_timeout() -> Duration {
    Duration::from_secs(5)
}
