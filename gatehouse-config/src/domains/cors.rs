//! CORS and origin guard configuration

use serde::{Deserialize, Serialize};

use crate::error::ConfigResult;
use crate::validation::{validate_origin, Validatable};

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins. "*" disables the origin check.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl CorsConfig {
    pub fn allows_any(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}

impl Validatable for CorsConfig {
    fn validate(&self) -> ConfigResult<()> {
        for origin in &self.allowed_origins {
            validate_origin(origin, "cors.allowed_origins")?;
        }
        Ok(())
    }
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:8440".to_string()]
}
