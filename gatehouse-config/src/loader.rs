//! Configuration loading and environment variable handling
//!
//! Two families of variables are recognized: `GATEHOUSE_*` prefixed names
//! and the short operational names documented for deployments (`PORT`,
//! `HOST`, `JWT_SECRET`, `DB_PATH`, ...). The short names win.

use std::time::Duration;

use crate::domains::GatehouseConfig;
use crate::error::{ConfigError, ConfigResult};

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            prefix: "GATEHOUSE".to_string(),
        }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from defaults plus environment overrides
    pub fn from_env(&self) -> ConfigResult<GatehouseConfig> {
        let mut config = GatehouseConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    fn apply_env_overrides(&self, config: &mut GatehouseConfig) -> ConfigResult<()> {
        self.apply_server_overrides(config)?;
        self.apply_database_overrides(config)?;
        self.apply_auth_overrides(config)?;
        self.apply_limits_overrides(config)?;
        self.apply_logging_overrides(config)?;
        Ok(())
    }

    fn apply_server_overrides(&self, config: &mut GatehouseConfig) -> ConfigResult<()> {
        if let Some(host) = self.lookup("HOST") {
            config.server.bind_address = host;
        }
        if let Some(port) = self.lookup("PORT") {
            config.server.port = port
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid PORT: {}", e)))?;
        }
        Ok(())
    }

    fn apply_database_overrides(&self, config: &mut GatehouseConfig) -> ConfigResult<()> {
        if let Some(path) = self.lookup("DB_PATH") {
            config.database.path = path;
        }
        Ok(())
    }

    fn apply_auth_overrides(&self, config: &mut GatehouseConfig) -> ConfigResult<()> {
        if let Some(secret) = self.lookup("JWT_SECRET") {
            config.auth.jwt_secret = secret;
        }
        if let Some(key_file) = self.lookup("ENCRYPTION_KEY_FILE") {
            config.auth.encryption_key_file = key_file;
        }
        if let Some(ttl) = self.lookup("TOKEN_TTL_MINUTES") {
            let minutes: u64 = ttl
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid TOKEN_TTL_MINUTES: {}", e)))?;
            config.auth.token_ttl = Duration::from_secs(minutes * 60);
        }
        Ok(())
    }

    fn apply_limits_overrides(&self, config: &mut GatehouseConfig) -> ConfigResult<()> {
        if let Some(rpm) = self.lookup("RATE_LIMIT_RPM") {
            config.rate_limit.requests_per_minute = rpm
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid RATE_LIMIT_RPM: {}", e)))?;
        }
        if let Some(origins) = self.lookup("ALLOWED_ORIGINS") {
            config.cors.allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(days) = self.lookup("AUDIT_RETENTION_DAYS") {
            config.audit.retention_days = days.parse().map_err(|e| {
                ConfigError::EnvError(format!("Invalid AUDIT_RETENTION_DAYS: {}", e))
            })?;
        }
        Ok(())
    }

    fn apply_logging_overrides(&self, config: &mut GatehouseConfig) -> ConfigResult<()> {
        if let Some(level) = self.lookup("LOG_LEVEL") {
            config.logging.level = level;
        }
        Ok(())
    }

    /// Look up a variable, preferring the short name over the prefixed one
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name)
            .or_else(|_| std::env::var(format!("{}_{}", self.prefix, name)))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment mutation is process-global; serialize these tests
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_defaults_validate() {
        let config = GatehouseConfig::default();
        assert!(config.validate_all().is_ok());
        assert_eq!(config.server.port, 8440);
        assert_eq!(config.audit.retention_days, 90);
    }

    #[test]
    fn test_env_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("GATEHOUSE_PORT", "9001");
        std::env::set_var("GATEHOUSE_ALLOWED_ORIGINS", "http://a.example, http://b.example");
        let config = ConfigLoader::new().from_env().unwrap();
        assert_eq!(config.server.port, 9001);
        assert_eq!(
            config.cors.allowed_origins,
            vec!["http://a.example", "http://b.example"]
        );
        std::env::remove_var("GATEHOUSE_PORT");
        std::env::remove_var("GATEHOUSE_ALLOWED_ORIGINS");
    }

    #[test]
    fn test_invalid_ttl_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("GATEHOUSE_TOKEN_TTL_MINUTES", "ninety");
        let result = ConfigLoader::new().from_env();
        assert!(matches!(result, Err(ConfigError::EnvError(_))));
        std::env::remove_var("GATEHOUSE_TOKEN_TTL_MINUTES");
    }
}
