//! Validation gates between migration phases.
//!
//! A checkpoint is a named, ordered suite of assertions about the two
//! engines: row counts line up, required objects exist, the target answers
//! health probes, table contents agree. Phases name the checkpoints that
//! must pass after their work; the cutover phase refuses to flip without
//! its gate.

use crate::audit::ConsistencyChecker;
use crate::context::MigrationContext;
use crate::db::ObjectKind;
use crate::error::{Result, SyncError};
use crate::tracker::{EventKind, MigrationEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// One assertion inside a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckpointCheck {
    /// Source and target row counts for a table are equal.
    RowCountParity { table: String },
    /// A schema object exists on the target.
    ObjectExists { kind: ObjectKind, name: String },
    /// The target engine answers a health probe.
    TargetHealthy,
    /// The source engine answers a health probe.
    SourceHealthy,
    /// Full keyed comparison of a table reports no discrepancies.
    TableConsistent { table: String },
}

impl CheckpointCheck {
    /// Short label used in reports and events.
    pub fn label(&self) -> String {
        match self {
            CheckpointCheck::RowCountParity { table } => format!("row_count_parity({table})"),
            CheckpointCheck::ObjectExists { kind, name } => {
                format!("object_exists({} {name})", kind.as_str())
            }
            CheckpointCheck::TargetHealthy => "target_healthy".to_string(),
            CheckpointCheck::SourceHealthy => "source_healthy".to_string(),
            CheckpointCheck::TableConsistent { table } => format!("table_consistent({table})"),
        }
    }
}

/// A named assertion suite, optionally bound to a phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub name: String,
    pub phase_id: Option<String>,
    pub checks: Vec<CheckpointCheck>,
}

/// Result of one assertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub test: String,
    pub passed: bool,
    pub message: String,
}

/// Result of a whole checkpoint run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointReport {
    pub checkpoint_id: String,
    pub is_valid: bool,
    pub executed_at: DateTime<Utc>,
    pub validation_results: Vec<ValidationOutcome>,
    pub errors: Vec<String>,
}

pub struct CheckpointValidator {
    ctx: Arc<MigrationContext>,
    checker: ConsistencyChecker,
    checkpoints: RwLock<BTreeMap<String, Checkpoint>>,
    check_timeout: Duration,
}

impl CheckpointValidator {
    pub fn new(ctx: Arc<MigrationContext>) -> Self {
        Self::with_timeout(ctx, Duration::from_secs(30))
    }

    /// Per-assertion timeout. An engine that stops answering turns into a
    /// failed validation, never a hung checkpoint.
    pub fn with_timeout(ctx: Arc<MigrationContext>, check_timeout: Duration) -> Self {
        CheckpointValidator {
            checker: ConsistencyChecker::new(Arc::clone(&ctx)),
            ctx,
            checkpoints: RwLock::new(BTreeMap::new()),
            check_timeout,
        }
    }

    pub async fn register(&self, checkpoint: Checkpoint) {
        self.checkpoints
            .write()
            .await
            .insert(checkpoint.id.clone(), checkpoint);
    }

    pub async fn register_all(&self, checkpoints: Vec<Checkpoint>) {
        let mut map = self.checkpoints.write().await;
        for checkpoint in checkpoints {
            map.insert(checkpoint.id.clone(), checkpoint);
        }
    }

    pub async fn checkpoint_ids(&self) -> Vec<String> {
        self.checkpoints.read().await.keys().cloned().collect()
    }

    /// The gates a table-by-table cutover migration needs.
    pub fn standard_checkpoints(tables: &[String]) -> Vec<Checkpoint> {
        let row_counts = Checkpoint {
            id: "row_counts".to_string(),
            name: "Row counts match".to_string(),
            phase_id: None,
            checks: tables
                .iter()
                .map(|t| CheckpointCheck::RowCountParity { table: t.clone() })
                .collect(),
        };
        let data_consistent = Checkpoint {
            id: "data_consistent".to_string(),
            name: "Table contents agree".to_string(),
            phase_id: None,
            checks: tables
                .iter()
                .map(|t| CheckpointCheck::TableConsistent { table: t.clone() })
                .collect(),
        };
        let mut target_checks = vec![CheckpointCheck::TargetHealthy];
        target_checks.extend(tables.iter().map(|t| CheckpointCheck::ObjectExists {
            kind: ObjectKind::Table,
            name: t.clone(),
        }));
        let target_ready = Checkpoint {
            id: "target_ready".to_string(),
            name: "Target schema and health".to_string(),
            phase_id: None,
            checks: target_checks,
        };
        vec![row_counts, data_consistent, target_ready]
    }

    /// Run every assertion of one checkpoint and record the verdict.
    pub async fn validate_checkpoint(&self, id: &str) -> Result<CheckpointReport> {
        let checkpoint = self
            .checkpoints
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::UnknownId {
                kind: "checkpoint",
                id: id.to_string(),
            })?;

        let mut validation_results = Vec::with_capacity(checkpoint.checks.len());
        let mut errors = Vec::new();

        for check in &checkpoint.checks {
            let label = check.label();
            match tokio::time::timeout(self.check_timeout, self.run_check(check)).await {
                Ok(Ok(outcome)) => validation_results.push(outcome),
                Ok(Err(e)) => {
                    errors.push(format!("{label}: {e}"));
                    validation_results.push(ValidationOutcome {
                        test: label,
                        passed: false,
                        message: e.to_string(),
                    });
                }
                Err(_) => {
                    let message = format!("timed out after {:?}", self.check_timeout);
                    errors.push(format!("{label}: {message}"));
                    validation_results.push(ValidationOutcome {
                        test: label,
                        passed: false,
                        message,
                    });
                }
            }
        }

        let is_valid = validation_results.iter().all(|r| r.passed);
        let report = CheckpointReport {
            checkpoint_id: checkpoint.id.clone(),
            is_valid,
            executed_at: Utc::now(),
            validation_results,
            errors,
        };

        if is_valid {
            info!("Checkpoint '{id}' passed");
        } else {
            warn!("Checkpoint '{id}' failed: {:?}", report.errors);
        }
        let kind = if is_valid {
            EventKind::CheckpointPassed
        } else {
            EventKind::CheckpointFailed
        };
        let mut event = MigrationEvent::new(
            kind,
            format!(
                "checkpoint '{id}': {}/{} checks passed",
                report.validation_results.iter().filter(|r| r.passed).count(),
                report.validation_results.len()
            ),
        );
        if let Some(phase_id) = &checkpoint.phase_id {
            event = event.with_phase(phase_id.clone());
        }
        self.ctx.tracker.record_event(event).await?;

        Ok(report)
    }

    async fn run_check(&self, check: &CheckpointCheck) -> Result<ValidationOutcome> {
        let (passed, message) = match check {
            CheckpointCheck::RowCountParity { table } => {
                let source = self.ctx.source.count_rows(table).await?;
                let target = self.ctx.target.count_rows(table).await?;
                (source == target, format!("source={source} target={target}"))
            }
            CheckpointCheck::ObjectExists { kind, name } => {
                let exists = self.ctx.target.object_exists(*kind, name).await?;
                (
                    exists,
                    if exists {
                        format!("{} '{name}' present", kind.as_str())
                    } else {
                        format!("{} '{name}' missing on target", kind.as_str())
                    },
                )
            }
            CheckpointCheck::TargetHealthy => {
                let report = self.ctx.target.health_check().await;
                (report.is_healthy, report.details)
            }
            CheckpointCheck::SourceHealthy => {
                let report = self.ctx.source.health_check().await;
                (report.is_healthy, report.details)
            }
            CheckpointCheck::TableConsistent { table } => {
                let result = self.checker.check_table_consistency(table).await?;
                (
                    result.is_consistent,
                    format!(
                        "{} discrepancies ({} vs {} rows)",
                        result.discrepancies.len(),
                        result.source_count,
                        result.target_count
                    ),
                )
            }
        };
        Ok(ValidationOutcome {
            test: check.label(),
            passed,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::TypeConverter;
    use crate::db::value::{RecordKey, SqlValue, TableRow};
    use crate::db::{
        ColumnInfo, DatabaseHandle, EngineKind, HealthReport, MemoryHandle, PoolStatus,
    };
    use crate::tracker::MemoryStore;

    async fn gate_context() -> (Arc<MemoryHandle>, Arc<MemoryHandle>, Arc<MigrationContext>) {
        let source = Arc::new(MemoryHandle::new(EngineKind::Postgres));
        let target = Arc::new(MemoryHandle::new(EngineKind::Oracle));
        let ctx = MigrationContext::new(
            source.clone() as Arc<dyn DatabaseHandle>,
            target.clone() as Arc<dyn DatabaseHandle>,
            Arc::new(MemoryStore::new()),
            TypeConverter::default(),
        )
        .await
        .unwrap();
        (source, target, ctx)
    }

    fn row(id: i64) -> TableRow {
        TableRow::new(RecordKey::Int(id)).with_value("id", SqlValue::Int(id))
    }

    #[tokio::test]
    async fn all_checks_passing_is_valid() {
        let (source, target, ctx) = gate_context().await;
        source.seed_rows("photos", vec![row(1), row(2)]).await;
        target.seed_rows("photos", vec![row(1), row(2)]).await;
        target.register_object(ObjectKind::Table, "photos").await;

        let validator = CheckpointValidator::new(ctx);
        validator
            .register_all(CheckpointValidator::standard_checkpoints(&[
                "photos".to_string()
            ]))
            .await;

        let report = validator.validate_checkpoint("target_ready").await.unwrap();
        assert!(report.is_valid, "errors: {:?}", report.errors);
        assert!(
            validator
                .validate_checkpoint("row_counts")
                .await
                .unwrap()
                .is_valid
        );
        assert!(
            validator
                .validate_checkpoint("data_consistent")
                .await
                .unwrap()
                .is_valid
        );
    }

    #[tokio::test]
    async fn count_drift_fails_the_gate() {
        let (source, target, ctx) = gate_context().await;
        source.seed_rows("photos", vec![row(1), row(2)]).await;
        target.seed_rows("photos", vec![row(1)]).await;

        let validator = CheckpointValidator::new(ctx);
        validator
            .register_all(CheckpointValidator::standard_checkpoints(&[
                "photos".to_string()
            ]))
            .await;

        let report = validator.validate_checkpoint("row_counts").await.unwrap();
        assert!(!report.is_valid);
        assert_eq!(report.validation_results.len(), 1);
        assert!(report.validation_results[0].message.contains("source=2"));
    }

    #[tokio::test]
    async fn unknown_checkpoint_is_a_structured_error() {
        let (_, _, ctx) = gate_context().await;
        let validator = CheckpointValidator::new(ctx);
        let err = validator.validate_checkpoint("ghost").await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::UnknownId {
                kind: "checkpoint",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn failed_checkpoint_records_an_event() {
        let (source, target, ctx) = gate_context().await;
        source.seed_rows("photos", vec![row(1)]).await;
        target.create_table("photos", Vec::new()).await;

        let validator = CheckpointValidator::new(Arc::clone(&ctx));
        validator
            .register(Checkpoint {
                id: "counts".to_string(),
                name: "counts".to_string(),
                phase_id: Some("verify".to_string()),
                checks: vec![CheckpointCheck::RowCountParity {
                    table: "photos".to_string(),
                }],
            })
            .await;

        validator.validate_checkpoint("counts").await.unwrap();
        let events = ctx.tracker.events().await;
        let last = events.last().unwrap();
        assert_eq!(last.kind, EventKind::CheckpointFailed);
        assert_eq!(last.phase_id.as_deref(), Some("verify"));
    }

    /// Wraps a memory engine but answers count queries only after a long
    /// sleep, to drive the timeout path.
    struct StalledHandle {
        inner: MemoryHandle,
    }

    #[async_trait::async_trait]
    impl DatabaseHandle for StalledHandle {
        fn engine(&self) -> EngineKind {
            self.inner.engine()
        }
        async fn list_tables(&self) -> Result<Vec<String>> {
            self.inner.list_tables().await
        }
        async fn fetch_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
            self.inner.fetch_columns(table).await
        }
        async fn count_rows(&self, table: &str) -> Result<i64> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            self.inner.count_rows(table).await
        }
        async fn fetch_rows(&self, table: &str) -> Result<Vec<TableRow>> {
            self.inner.fetch_rows(table).await
        }
        async fn fetch_rows_since(
            &self,
            table: &str,
            since: DateTime<Utc>,
        ) -> Result<Vec<TableRow>> {
            self.inner.fetch_rows_since(table, since).await
        }
        async fn fetch_rows_by_keys(
            &self,
            table: &str,
            keys: &[RecordKey],
        ) -> Result<Vec<TableRow>> {
            self.inner.fetch_rows_by_keys(table, keys).await
        }
        async fn upsert_rows(&self, table: &str, rows: &[TableRow]) -> Result<u64> {
            self.inner.upsert_rows(table, rows).await
        }
        async fn delete_row(&self, table: &str, key: &RecordKey) -> Result<bool> {
            self.inner.delete_row(table, key).await
        }
        async fn object_exists(&self, kind: ObjectKind, name: &str) -> Result<bool> {
            self.inner.object_exists(kind, name).await
        }
        async fn health_check(&self) -> HealthReport {
            self.inner.health_check().await
        }
        async fn pool_status(&self) -> PoolStatus {
            self.inner.pool_status().await
        }
    }

    #[tokio::test]
    async fn stalled_engine_reports_a_timeout_not_a_hang() {
        let source = Arc::new(MemoryHandle::new(EngineKind::Postgres));
        source.seed_rows("photos", vec![row(1)]).await;
        let stalled = MemoryHandle::new(EngineKind::Oracle);
        stalled.seed_rows("photos", vec![row(1)]).await;
        let target = Arc::new(StalledHandle { inner: stalled });

        let ctx = MigrationContext::new(
            source as Arc<dyn DatabaseHandle>,
            target as Arc<dyn DatabaseHandle>,
            Arc::new(MemoryStore::new()),
            TypeConverter::default(),
        )
        .await
        .unwrap();

        let validator = CheckpointValidator::with_timeout(ctx, Duration::from_millis(50));
        validator
            .register(Checkpoint {
                id: "counts".to_string(),
                name: "counts".to_string(),
                phase_id: None,
                checks: vec![CheckpointCheck::RowCountParity {
                    table: "photos".to_string(),
                }],
            })
            .await;

        let report = validator.validate_checkpoint("counts").await.unwrap();
        assert!(!report.is_valid);
        assert!(report.validation_results[0].message.contains("timed out"));
    }
}
