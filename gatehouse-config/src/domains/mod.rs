//! Domain-specific configuration modules

pub mod audit;
pub mod auth;
pub mod cors;
pub mod database;
pub mod logging;
pub mod rate_limit;
pub mod server;
pub mod upstream;

use serde::{Deserialize, Serialize};

use crate::error::ConfigResult;
use crate::validation::Validatable;

/// Complete gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatehouseConfig {
    pub server: server::ServerConfig,
    pub database: database::DatabaseConfig,
    pub auth: auth::AuthConfig,
    pub cors: cors::CorsConfig,
    pub rate_limit: rate_limit::RateLimitConfig,
    pub audit: audit::AuditConfig,
    pub upstream: upstream::UpstreamConfig,
    pub logging: logging::LoggingConfig,
}

impl GatehouseConfig {
    /// Validate all configuration domains
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.server.validate()?;
        self.database.validate()?;
        self.auth.validate()?;
        self.cors.validate()?;
        self.rate_limit.validate()?;
        self.audit.validate()?;
        self.upstream.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}
