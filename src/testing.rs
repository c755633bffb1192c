//! Shared fixtures for the integration test suites.
//!
//! Everything here runs against the in-memory engine, so tests build as
//! many isolated contexts as they need without external databases.

use crate::context::MigrationContext;
use crate::convert::TypeConverter;
use crate::db::value::{RecordKey, SqlValue, TableRow};
use crate::db::{DatabaseHandle, EngineKind, MemoryHandle};
use crate::tracker::MemoryStore;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

/// A fresh context over two in-memory engines and a volatile event store.
pub async fn memory_context() -> (Arc<MemoryHandle>, Arc<MemoryHandle>, Arc<MigrationContext>) {
    let source = Arc::new(MemoryHandle::new(EngineKind::Postgres));
    let target = Arc::new(MemoryHandle::new(EngineKind::Oracle));
    let ctx = MigrationContext::new(
        source.clone() as Arc<dyn DatabaseHandle>,
        target.clone() as Arc<dyn DatabaseHandle>,
        Arc::new(MemoryStore::new()),
        TypeConverter::default(),
    )
    .await
    .expect("in-memory context never fails to wire up");
    (source, target, ctx)
}

/// Seconds-since-epoch timestamp, for compact test data.
pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

/// A project row shaped like the application's busiest table.
pub fn project_row(id: i64, name: &str, modified: i64) -> TableRow {
    TableRow::new(RecordKey::Int(id))
        .with_value("id", SqlValue::Int(id))
        .with_value("name", SqlValue::Text(name.to_string()))
        .with_value("updated_at", SqlValue::Timestamp(ts(modified)))
        .with_modified_at(ts(modified))
}

/// Seed both engines with the same `count` project rows.
pub async fn seed_identical(
    source: &MemoryHandle,
    target: &MemoryHandle,
    table: &str,
    count: i64,
) {
    let rows: Vec<TableRow> = (1..=count)
        .map(|i| project_row(i, &format!("project-{i}"), 100))
        .collect();
    source.seed_rows(table, rows.clone()).await;
    target.seed_rows(table, rows).await;
}
