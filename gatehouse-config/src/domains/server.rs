//! HTTP server configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_port, Validatable};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Baseline timeout for non-streaming requests
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub request_timeout: Duration,

    /// Idle read timeout for SSE streams
    #[serde(with = "humantime_serde", default = "default_stream_idle_timeout")]
    pub stream_idle_timeout: Duration,

    /// Directory of static UI assets, served under /ui
    #[serde(default = "default_ui_dir")]
    pub ui_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            stream_idle_timeout: default_stream_idle_timeout(),
            ui_dir: default_ui_dir(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

impl Validatable for ServerConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_port(self.port, "server.port")
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8440
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_stream_idle_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_ui_dir() -> String {
    "ui/dist".to_string()
}
