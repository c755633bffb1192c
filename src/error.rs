//! Error types for the migration and synchronization library.

use thiserror::Error;

/// Main error type for migration and synchronization operations.
///
/// Conflicts are never represented here: a conflict between two writable
/// copies of a record is expected data, resolved during the sync run and
/// reported inside the [`crate::sync::SyncReport`].
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error (invalid plan file, unknown table, bad option).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connectivity failure (transient, eligible for bounded retry).
    #[error("Connection error on {engine}: {message}")]
    Connection { engine: String, message: String },

    /// Query failed against one of the engines.
    #[error("Query error on {engine}: {message}")]
    Query { engine: String, message: String },

    /// A transaction failed and was rolled back.
    #[error("Transaction error on {engine}: {message}")]
    Transaction { engine: String, message: String },

    /// Type or constraint mismatch for a single value/column.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A source column type the converter does not support.
    #[error("Unsupported source type: {0}")]
    UnsupportedType(String),

    /// Phase execution refused because dependencies are not completed.
    #[error("Phase {phase} has unmet prerequisites: {missing:?}")]
    UnmetPrerequisite { phase: String, missing: Vec<String> },

    /// A sync for the same table and direction group is already running.
    #[error("Sync already in progress for table {0}")]
    SyncInProgress(String),

    /// Deadline or internal timeout expired.
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Persisted state (events, schedules, environment) could not be written or read.
    #[error("State persistence error: {0}")]
    State(String),

    /// Unknown identifier (phase, checkpoint, schedule).
    #[error("Unknown {kind}: {id}")]
    UnknownId { kind: &'static str, id: String },

    /// The active environment changed while a batch run was in flight.
    #[error("Environment generation changed during sync (started at {started}, now {current})")]
    EnvironmentChanged { started: u64, current: u64 },

    /// IO error (plan files, state directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML plan file error.
    #[error("Plan file error: {0}")]
    Plan(#[from] toml::de::Error),
}

impl SyncError {
    /// Create a Connection error tagged with the engine it occurred on.
    pub fn connection(engine: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Connection {
            engine: engine.into(),
            message: message.into(),
        }
    }

    /// Create a Query error tagged with the engine it occurred on.
    pub fn query(engine: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Query {
            engine: engine.into(),
            message: message.into(),
        }
    }

    /// Create a Transaction error tagged with the engine it occurred on.
    pub fn transaction(engine: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Transaction {
            engine: engine.into(),
            message: message.into(),
        }
    }

    /// Whether the operation that produced this error may be retried with backoff.
    ///
    /// Only connectivity failures are transient; queries are retried solely
    /// when the caller knows the statement is idempotent.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Connection { .. })
    }

    /// Whether this error aborts the enclosing operation rather than a single record.
    pub fn is_fatal_to_operation(&self) -> bool {
        matches!(
            self,
            SyncError::Connection { .. }
                | SyncError::Transaction { .. }
                | SyncError::SyncInProgress(_)
                | SyncError::UnmetPrerequisite { .. }
                | SyncError::EnvironmentChanged { .. }
                | SyncError::Timeout(_)
                | SyncError::State(_)
        )
    }
}

/// Result type alias for migration and synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_are_retryable() {
        let err = SyncError::connection("postgres", "connection refused");
        assert!(err.is_retryable());
        assert!(err.is_fatal_to_operation());
    }

    #[test]
    fn validation_errors_are_row_local() {
        let err = SyncError::Validation("invalid UUID format".into());
        assert!(!err.is_retryable());
        assert!(!err.is_fatal_to_operation());
    }

    #[test]
    fn error_messages_name_the_engine() {
        let err = SyncError::query("oracle", "ORA-00942: table or view does not exist");
        assert!(err.to_string().contains("oracle"));
        assert!(err.to_string().contains("ORA-00942"));
    }
}
