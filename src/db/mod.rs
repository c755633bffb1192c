//! Database boundary for the migration core.
//!
//! The core never talks to a driver directly: both engines enter through the
//! [`DatabaseHandle`] trait, which exposes the row, schema, and health
//! operations the synchronizer and auditors need. Two implementations ship
//! with the crate:
//!
//! - [`PostgresHandle`] - the source engine, backed by `tokio-postgres`
//! - [`MemoryHandle`] - an in-memory engine used for rehearsal runs and tests
//!
//! An Oracle wire adapter implements the same trait in the deployment that
//! owns the Oracle credentials; the core only depends on the trait.

pub mod memory;
pub mod postgres;
pub mod value;

pub use memory::MemoryHandle;
pub use postgres::{PostgresHandle, PostgresOpts};
pub use value::{RecordKey, SqlValue, TableRow};

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Column the handles read row modification times from.
pub const MODIFIED_AT_COLUMN: &str = "updated_at";

/// Which engine a handle talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Postgres,
    Oracle,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Postgres => "postgres",
            EngineKind::Oracle => "oracle",
        }
    }

    /// The other engine in the pair.
    pub fn other(&self) -> EngineKind {
        match self {
            EngineKind::Postgres => EngineKind::Oracle,
            EngineKind::Oracle => EngineKind::Postgres,
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EngineKind {
    type Err = crate::error::SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(EngineKind::Postgres),
            "oracle" | "ora" => Ok(EngineKind::Oracle),
            other => Err(crate::error::SyncError::Config(format!(
                "Unknown engine: {other}"
            ))),
        }
    }
}

/// Declared column metadata as reported by an engine's catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type text, e.g. `uuid`, `character varying(255)`, `NUMBER(1)`.
    pub data_type: String,
    pub nullable: bool,
    pub is_primary_key: bool,
}

/// Kinds of schema objects the checkpoint validator can assert on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Table,
    Sequence,
    Trigger,
    Index,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Table => "table",
            ObjectKind::Sequence => "sequence",
            ObjectKind::Trigger => "trigger",
            ObjectKind::Index => "index",
        }
    }
}

/// Result of a health probe. Never an error: an unreachable engine reports
/// `is_healthy = false` with the failure in `details`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub is_healthy: bool,
    pub details: String,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn healthy(details: impl Into<String>) -> Self {
        HealthReport {
            is_healthy: true,
            details: details.into(),
            checked_at: Utc::now(),
        }
    }

    pub fn unhealthy(details: impl Into<String>) -> Self {
        HealthReport {
            is_healthy: false,
            details: details.into(),
            checked_at: Utc::now(),
        }
    }
}

/// Connection pool occupancy snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoolStatus {
    pub total: usize,
    pub active: usize,
    pub idle: usize,
}

/// Boundary contract for one engine's connection pool.
///
/// All row reads return [`TableRow`]s keyed by primary key; `upsert_rows`
/// applies the whole batch in a single transaction so a batch either lands
/// completely or not at all.
#[async_trait::async_trait]
pub trait DatabaseHandle: Send + Sync {
    /// Which engine this handle talks to.
    fn engine(&self) -> EngineKind;

    /// List user tables visible to the migration.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Declared column metadata for a table.
    async fn fetch_columns(&self, table: &str) -> Result<Vec<ColumnInfo>>;

    /// Row count for a table.
    async fn count_rows(&self, table: &str) -> Result<i64>;

    /// Read the full row set of a table.
    async fn fetch_rows(&self, table: &str) -> Result<Vec<TableRow>>;

    /// Read rows modified at or after `since` (by the audit column).
    async fn fetch_rows_since(
        &self,
        table: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<TableRow>>;

    /// Read the current rows for the given keys; absent keys are skipped.
    async fn fetch_rows_by_keys(
        &self,
        table: &str,
        keys: &[RecordKey],
    ) -> Result<Vec<TableRow>>;

    /// Insert-or-update a batch of rows in one transaction.
    ///
    /// Returns the number of rows written. The rows' `modified_at` values
    /// are stored as given, not bumped, so a re-read observes the same
    /// timestamps the winning side carried.
    async fn upsert_rows(&self, table: &str, rows: &[TableRow]) -> Result<u64>;

    /// Delete one row by primary key. Returns whether a row was removed.
    async fn delete_row(&self, table: &str, key: &RecordKey) -> Result<bool>;

    /// Whether a named schema object exists.
    async fn object_exists(&self, kind: ObjectKind, name: &str) -> Result<bool>;

    /// Probe the engine. Infallible by contract.
    async fn health_check(&self) -> HealthReport;

    /// Pool occupancy.
    async fn pool_status(&self) -> PoolStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_kind_parses_aliases() {
        assert_eq!("pg".parse::<EngineKind>().unwrap(), EngineKind::Postgres);
        assert_eq!(
            "PostgreSQL".parse::<EngineKind>().unwrap(),
            EngineKind::Postgres
        );
        assert_eq!("oracle".parse::<EngineKind>().unwrap(), EngineKind::Oracle);
        assert!("mysql".parse::<EngineKind>().is_err());
    }

    #[test]
    fn engine_kind_other_flips() {
        assert_eq!(EngineKind::Postgres.other(), EngineKind::Oracle);
        assert_eq!(EngineKind::Oracle.other(), EngineKind::Postgres);
    }
}
