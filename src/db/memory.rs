//! In-memory implementation of the database boundary.
//!
//! Used by rehearsal runs and by the test suites. Rows live in ordered maps
//! keyed by primary key, so reads come back in the same order a `SELECT ...
//! ORDER BY pk` would produce. The handle can impersonate either engine via
//! its [`EngineKind`] profile.

use super::value::{RecordKey, SqlValue, TableRow};
use super::{ColumnInfo, DatabaseHandle, EngineKind, HealthReport, ObjectKind, PoolStatus};
use crate::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct MemoryState {
    tables: BTreeMap<String, BTreeMap<RecordKey, TableRow>>,
    columns: BTreeMap<String, Vec<ColumnInfo>>,
    objects: HashSet<(ObjectKind, String)>,
}

/// An in-memory `DatabaseHandle`.
pub struct MemoryHandle {
    engine: EngineKind,
    state: RwLock<MemoryState>,
    healthy: AtomicBool,
    reject_writes: AtomicBool,
}

impl MemoryHandle {
    pub fn new(engine: EngineKind) -> Self {
        MemoryHandle {
            engine,
            state: RwLock::new(MemoryState::default()),
            healthy: AtomicBool::new(true),
            reject_writes: AtomicBool::new(false),
        }
    }

    /// Register a table with its column metadata.
    pub async fn create_table(&self, name: &str, columns: Vec<ColumnInfo>) {
        let mut state = self.state.write().await;
        state.tables.entry(name.to_string()).or_default();
        state.columns.insert(name.to_string(), columns);
        state
            .objects
            .insert((ObjectKind::Table, name.to_string()));
    }

    /// Register a schema object so `object_exists` can see it.
    pub async fn register_object(&self, kind: ObjectKind, name: &str) {
        self.state
            .write()
            .await
            .objects
            .insert((kind, name.to_string()));
    }

    /// Seed rows directly, creating the table if needed.
    pub async fn seed_rows(&self, table: &str, rows: Vec<TableRow>) {
        let mut state = self.state.write().await;
        let entries = state.tables.entry(table.to_string()).or_default();
        for row in rows {
            entries.insert(row.key.clone(), row);
        }
        state
            .objects
            .insert((ObjectKind::Table, table.to_string()));
    }

    /// Fetch a single row by key, if present.
    pub async fn row(&self, table: &str, key: &RecordKey) -> Option<TableRow> {
        self.state
            .read()
            .await
            .tables
            .get(table)
            .and_then(|t| t.get(key))
            .cloned()
    }

    /// Simulate an engine outage: health probes report unhealthy.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Make every write fail with a transaction error.
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl DatabaseHandle for MemoryHandle {
    fn engine(&self) -> EngineKind {
        self.engine
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.state.read().await.tables.keys().cloned().collect())
    }

    async fn fetch_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let state = self.state.read().await;
        if let Some(columns) = state.columns.get(table) {
            return Ok(columns.clone());
        }
        // No registered metadata: synthesize from a sample row so seeded
        // fixtures work without an explicit create_table call.
        let rows = state
            .tables
            .get(table)
            .ok_or_else(|| SyncError::query(self.engine.as_str(), format!("no such table '{table}'")))?;
        let Some(sample) = rows.values().next() else {
            return Ok(Vec::new());
        };
        Ok(sample
            .values
            .iter()
            .map(|(name, value)| {
                let data_type = match value.type_name() {
                    "null" => "text",
                    other => other,
                };
                ColumnInfo {
                    name: name.clone(),
                    data_type: data_type.to_string(),
                    nullable: true,
                    is_primary_key: RecordKey::from_value(value).as_ref() == Some(&sample.key),
                }
            })
            .collect())
    }

    async fn count_rows(&self, table: &str) -> Result<i64> {
        let state = self.state.read().await;
        let rows = state
            .tables
            .get(table)
            .ok_or_else(|| SyncError::query(self.engine.as_str(), format!("no such table '{table}'")))?;
        Ok(rows.len() as i64)
    }

    async fn fetch_rows(&self, table: &str) -> Result<Vec<TableRow>> {
        let state = self.state.read().await;
        let rows = state
            .tables
            .get(table)
            .ok_or_else(|| SyncError::query(self.engine.as_str(), format!("no such table '{table}'")))?;
        Ok(rows.values().cloned().collect())
    }

    async fn fetch_rows_since(
        &self,
        table: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<TableRow>> {
        let all = self.fetch_rows(table).await?;
        Ok(all
            .into_iter()
            .filter(|row| row.modified_at.is_some_and(|ts| ts >= since))
            .collect())
    }

    async fn fetch_rows_by_keys(
        &self,
        table: &str,
        keys: &[RecordKey],
    ) -> Result<Vec<TableRow>> {
        let state = self.state.read().await;
        let rows = state
            .tables
            .get(table)
            .ok_or_else(|| SyncError::query(self.engine.as_str(), format!("no such table '{table}'")))?;
        Ok(keys.iter().filter_map(|k| rows.get(k).cloned()).collect())
    }

    async fn upsert_rows(&self, table: &str, rows: &[TableRow]) -> Result<u64> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(SyncError::transaction(
                self.engine.as_str(),
                "writes rejected",
            ));
        }
        let mut state = self.state.write().await;
        let entries = state.tables.entry(table.to_string()).or_default();
        for row in rows {
            entries.insert(row.key.clone(), row.clone());
        }
        state
            .objects
            .insert((ObjectKind::Table, table.to_string()));
        Ok(rows.len() as u64)
    }

    async fn delete_row(&self, table: &str, key: &RecordKey) -> Result<bool> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(SyncError::transaction(
                self.engine.as_str(),
                "writes rejected",
            ));
        }
        let mut state = self.state.write().await;
        Ok(state
            .tables
            .get_mut(table)
            .and_then(|t| t.remove(key))
            .is_some())
    }

    async fn object_exists(&self, kind: ObjectKind, name: &str) -> Result<bool> {
        let state = self.state.read().await;
        if kind == ObjectKind::Table && state.tables.contains_key(name) {
            return Ok(true);
        }
        Ok(state.objects.contains(&(kind, name.to_string())))
    }

    async fn health_check(&self) -> HealthReport {
        if self.healthy.load(Ordering::SeqCst) {
            HealthReport::healthy(format!("{} (in-memory) reachable", self.engine))
        } else {
            HealthReport::unhealthy(format!("{} (in-memory) marked down", self.engine))
        }
    }

    async fn pool_status(&self) -> PoolStatus {
        PoolStatus {
            total: 1,
            active: 0,
            idle: 1,
        }
    }
}
