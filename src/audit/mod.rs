//! SQLite audit trail of evaluation traces.

mod connection;
mod migrations;
mod queries;

pub use connection::AuditLog;
pub use queries::AuditEntry;
