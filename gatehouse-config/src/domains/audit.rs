//! Audit pipeline configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};

/// Audit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Capacity of the in-memory event channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// How long events are retained, in days
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Cadence of the retention sweeper
    #[serde(with = "humantime_serde", default = "default_sweep_interval")]
    pub sweep_interval: Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            retention_days: default_retention_days(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

impl Validatable for AuditConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.channel_capacity as u64, "audit.channel_capacity")?;
        validate_positive(self.retention_days as u64, "audit.retention_days")
    }
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_retention_days() -> u32 {
    90
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60 * 60)
}
