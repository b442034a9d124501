//! Sqlite persistence for the Gatehouse MCP gateway
//!
//! One embedded database file holds upstream server records, OAuth
//! providers, users, roles, bindings, ACLs, AD group mappings, gateway
//! config, and the audit trail. All writes go through transactions; reads
//! hit the pool directly.

pub mod entities;
pub mod error;
pub mod pool;
pub mod repositories;

pub use entities::{
    AclRecord, AdGroupMapping, AuditQuery, AuditRecord, AuditStatistics, ProviderRecord,
    RoleRecord, ServerRecord, UserRecord,
};
pub use error::{StorageError, StorageResult};
pub use pool::Store;
