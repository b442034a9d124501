//! Typed repositories over the shared pool

mod acls;
mod audit;
mod config;
mod mappings;
mod providers;
mod roles;
mod servers;
mod users;

pub use acls::AclRepository;
pub use audit::AuditRepository;
pub use config::ConfigRepository;
pub use mappings::MappingRepository;
pub use providers::ProviderRepository;
pub use roles::RoleRepository;
pub use servers::ServerRepository;
pub use users::UserRepository;

use crate::error::StorageResult;

/// Parse a JSON text column, treating NULL as None
pub(crate) fn parse_json_opt(
    raw: Option<String>,
) -> StorageResult<Option<serde_json::Value>> {
    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

/// Parse a JSON string-array column
pub(crate) fn parse_string_vec(raw: String) -> StorageResult<Vec<String>> {
    Ok(serde_json::from_str(&raw)?)
}
