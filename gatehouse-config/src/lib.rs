//! Domain-driven configuration management for Gatehouse
//!
//! Configuration is split by functional domain with validation, defaults,
//! and environment variable support. Environment variables override values
//! persisted in the gateway config store.

pub mod domains;
pub mod error;
pub mod loader;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

pub use domains::{
    audit::AuditConfig, auth::AuthConfig, cors::CorsConfig, database::DatabaseConfig,
    logging::LoggingConfig, rate_limit::RateLimitConfig, server::ServerConfig,
    upstream::UpstreamConfig, GatehouseConfig,
};
