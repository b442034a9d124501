//! Validation helpers shared by the configuration domains

use crate::error::{ConfigError, ConfigResult};

/// Trait implemented by every configuration domain
pub trait Validatable {
    fn validate(&self) -> ConfigResult<()>;
}

pub fn validate_required_string(value: &str, field: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::validation(field, "must not be empty"));
    }
    Ok(())
}

pub fn validate_positive(value: u64, field: &str) -> ConfigResult<()> {
    if value == 0 {
        return Err(ConfigError::validation(field, "must be greater than zero"));
    }
    Ok(())
}

pub fn validate_port(value: u16, field: &str) -> ConfigResult<()> {
    if value == 0 {
        return Err(ConfigError::validation(field, "must be a non-zero port"));
    }
    Ok(())
}

pub fn validate_origin(value: &str, field: &str) -> ConfigResult<()> {
    if value == "*" {
        return Ok(());
    }
    url::Url::parse(value)
        .map_err(|e| ConfigError::validation(field, format!("invalid origin '{}': {}", value, e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_string() {
        assert!(validate_required_string("x", "f").is_ok());
        assert!(validate_required_string("  ", "f").is_err());
    }

    #[test]
    fn test_origin() {
        assert!(validate_origin("*", "f").is_ok());
        assert!(validate_origin("http://localhost:3000", "f").is_ok());
        assert!(validate_origin("not a url", "f").is_err());
    }
}
