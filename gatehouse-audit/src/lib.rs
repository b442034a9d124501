//! Append-only audit pipeline for the Gatehouse MCP gateway
//!
//! Producers call [`AuditRecorder::record`]; a single writer task drains the
//! bounded channel into the store. Admin mutations use
//! [`AuditRecorder::record_durable`] so the event is persisted before the
//! response is flushed.

pub mod events;
pub mod recorder;

pub use events::{AuditEvent, AuditKind, Severity};
pub use recorder::{spawn_retention, AuditRecorder};
