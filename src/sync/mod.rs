//! Data synchronization between the two engines.
//!
//! A sync run reads rows from the side(s) a [`SyncDirection`] implies,
//! converts payloads across the type systems, settles conflicts, and writes
//! winners in batches. Runs are serialized per table through exclusivity
//! markers so two syncs can never interleave writes to the same table in
//! the same direction.

pub mod lock;

use crate::conflict::{
    Conflict, ConflictResolver, ConflictStrategy, ConflictType, ResolvedConflict, Winner,
};
use crate::context::MigrationContext;
use crate::convert::{values_equivalent, PgType};
use crate::db::value::{RecordKey, TableRow};
use crate::db::DatabaseHandle;
use crate::error::{Result, SyncError};
use crate::tracker::{EventKind, MigrationEvent};
use chrono::{DateTime, Utc};
use lock::LockRegistry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which way data flows during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    SourceToTarget,
    TargetToSource,
    Bidirectional,
}

impl SyncDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncDirection::SourceToTarget => "source_to_target",
            SyncDirection::TargetToSource => "target_to_source",
            SyncDirection::Bidirectional => "bidirectional",
        }
    }

    /// The side conflict ties break toward.
    pub fn primary_side(&self) -> Winner {
        match self {
            SyncDirection::SourceToTarget | SyncDirection::Bidirectional => Winner::Source,
            SyncDirection::TargetToSource => Winner::Target,
        }
    }
}

impl std::fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncDirection {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "source_to_target" | "source-to-target" | "forward" => {
                Ok(SyncDirection::SourceToTarget)
            }
            "target_to_source" | "target-to-source" | "reverse" => {
                Ok(SyncDirection::TargetToSource)
            }
            "bidirectional" | "both" => Ok(SyncDirection::Bidirectional),
            other => Err(SyncError::Config(format!(
                "unknown sync direction '{other}' (expected source_to_target, target_to_source or bidirectional)"
            ))),
        }
    }
}

/// One direction of table traffic, for exclusivity marking. A
/// bidirectional run holds both groups; opposed unidirectional runs can
/// coexist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum DirectionGroup {
    Forward,
    Reverse,
}

fn lock_keys(table: &str, direction: SyncDirection) -> Vec<(String, DirectionGroup)> {
    let table = table.to_string();
    match direction {
        SyncDirection::SourceToTarget => vec![(table, DirectionGroup::Forward)],
        SyncDirection::TargetToSource => vec![(table, DirectionGroup::Reverse)],
        SyncDirection::Bidirectional => vec![
            (table.clone(), DirectionGroup::Forward),
            (table, DirectionGroup::Reverse),
        ],
    }
}

/// Tuning for sync runs.
#[derive(Debug, Clone)]
pub struct SyncOpts {
    /// Rows per write batch.
    pub batch_size: usize,
    /// Plan and count without writing anything.
    pub dry_run: bool,
    /// Abandon the run (releasing its markers) once this instant passes.
    pub deadline: Option<DateTime<Utc>>,
    pub conflict_strategy: ConflictStrategy,
}

impl Default for SyncOpts {
    fn default() -> Self {
        SyncOpts {
            batch_size: 1000,
            dry_run: false,
            deadline: None,
            conflict_strategy: ConflictStrategy::LatestWins,
        }
    }
}

/// A row the run could not convert. Recorded, never fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedRow {
    pub record_id: RecordKey,
    pub error: String,
}

/// Outcome of one sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub table: String,
    pub direction: SyncDirection,
    pub records_synchronized: u64,
    pub conflicts: Vec<ResolvedConflict>,
    pub failed_rows: Vec<FailedRow>,
    /// Start-of-run instant; pass it to `incremental_sync` to pick up
    /// whatever changed after this run began.
    pub watermark: DateTime<Utc>,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

struct PlannedWrites {
    to_source: Vec<TableRow>,
    to_target: Vec<TableRow>,
    conflicts: Vec<ResolvedConflict>,
    failed_rows: Vec<FailedRow>,
}

pub struct DataSynchronizer {
    ctx: Arc<MigrationContext>,
    locks: LockRegistry<(String, DirectionGroup)>,
    resolver: ConflictResolver,
    opts: SyncOpts,
}

impl DataSynchronizer {
    pub fn new(ctx: Arc<MigrationContext>) -> Self {
        Self::with_opts(ctx, SyncOpts::default())
    }

    pub fn with_opts(ctx: Arc<MigrationContext>, opts: SyncOpts) -> Self {
        DataSynchronizer {
            locks: ctx.sync_locks.clone(),
            ctx,
            resolver: ConflictResolver,
            opts,
        }
    }

    /// Synchronize the full row set of one table.
    pub async fn synchronize_table(
        &self,
        table: &str,
        direction: SyncDirection,
    ) -> Result<SyncReport> {
        self.run(table, direction, None).await
    }

    /// Reconcile both sides using only rows modified at or after `since`.
    pub async fn incremental_sync(
        &self,
        table: &str,
        since: DateTime<Utc>,
    ) -> Result<SyncReport> {
        self.run(table, SyncDirection::Bidirectional, Some(since)).await
    }

    async fn run(
        &self,
        table: &str,
        direction: SyncDirection,
        since: Option<DateTime<Utc>>,
    ) -> Result<SyncReport> {
        let _guard = self
            .locks
            .try_acquire(lock_keys(table, direction))
            .ok_or_else(|| SyncError::SyncInProgress(table.to_string()))?;

        let started_at = Utc::now();
        let generation = self.ctx.environment.generation().await;
        let mode = if since.is_some() { "incremental" } else { "full" };

        info!("Starting {mode} sync of '{table}' ({direction})");
        self.ctx
            .tracker
            .record_event(
                MigrationEvent::new(
                    EventKind::SyncStarted,
                    format!("{mode} sync of '{table}' ({direction}) started"),
                )
                .with_metadata(serde_json::json!({
                    "table": table,
                    "direction": direction.as_str(),
                    "mode": mode,
                })),
            )
            .await?;

        match self.execute(table, direction, since, generation, started_at).await {
            Ok(report) => {
                info!(
                    "Sync of '{table}' finished: {} records, {} conflicts, {} failed rows",
                    report.records_synchronized,
                    report.conflicts.len(),
                    report.failed_rows.len()
                );
                self.ctx
                    .tracker
                    .record_event(
                        MigrationEvent::new(
                            EventKind::SyncCompleted,
                            format!(
                                "{mode} sync of '{table}' synchronized {} records",
                                report.records_synchronized
                            ),
                        )
                        .with_metadata(serde_json::json!({
                            "table": table,
                            "records": report.records_synchronized,
                            "conflicts": report.conflicts.len(),
                            "failed_rows": report.failed_rows.len(),
                            "dry_run": report.dry_run,
                        })),
                    )
                    .await?;
                Ok(report)
            }
            Err(e) => {
                let event = MigrationEvent::new(
                    EventKind::SyncFailed,
                    format!("{mode} sync of '{table}' failed: {e}"),
                )
                .with_metadata(serde_json::json!({"table": table}));
                if let Err(log_err) = self.ctx.tracker.record_event(event).await {
                    warn!("Could not record sync failure: {log_err}");
                }
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        table: &str,
        direction: SyncDirection,
        since: Option<DateTime<Utc>>,
        generation: u64,
        started_at: DateTime<Utc>,
    ) -> Result<SyncReport> {
        let column_types = self.ctx.source_column_types(table).await?;

        let planned = match direction {
            SyncDirection::SourceToTarget => {
                self.plan_one_way(table, &column_types, since, Winner::Source)
                    .await?
            }
            SyncDirection::TargetToSource => {
                self.plan_one_way(table, &column_types, since, Winner::Target)
                    .await?
            }
            SyncDirection::Bidirectional => {
                self.plan_bidirectional(table, &column_types, since, direction)
                    .await?
            }
        };

        let mut synchronized = 0;
        synchronized += self
            .flush(table, &planned.to_target, &self.ctx.target, generation, started_at)
            .await?;
        synchronized += self
            .flush(table, &planned.to_source, &self.ctx.source, generation, started_at)
            .await?;

        Ok(SyncReport {
            table: table.to_string(),
            direction,
            records_synchronized: synchronized,
            conflicts: planned.conflicts,
            failed_rows: planned.failed_rows,
            watermark: started_at,
            dry_run: self.opts.dry_run,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Plan a unidirectional run: the read side wins by declaration, so
    /// there are no conflict objects, only writes for rows whose payloads
    /// differ after conversion.
    async fn plan_one_way(
        &self,
        table: &str,
        column_types: &BTreeMap<String, PgType>,
        since: Option<DateTime<Utc>>,
        read_side: Winner,
    ) -> Result<PlannedWrites> {
        let (reader, writer) = match read_side {
            Winner::Source => (&self.ctx.source, &self.ctx.target),
            Winner::Target => (&self.ctx.target, &self.ctx.source),
        };

        let rows = fetch_side(reader, table, since).await?;
        let keys: Vec<RecordKey> = rows.iter().map(|r| r.key.clone()).collect();
        let existing = index_rows(writer.fetch_rows_by_keys(table, &keys).await?);

        let mut writes = Vec::new();
        let mut failed_rows = Vec::new();
        for row in &rows {
            match self.convert_toward(table, column_types, row, read_side.other()) {
                Ok(candidate) => {
                    if existing
                        .get(&candidate.key)
                        .is_none_or(|current| !payloads_match(&candidate, current))
                    {
                        writes.push(candidate);
                    }
                }
                Err(e) if e.is_fatal_to_operation() => return Err(e),
                Err(e) => failed_rows.push(FailedRow {
                    record_id: row.key.clone(),
                    error: e.to_string(),
                }),
            }
        }

        let (to_source, to_target) = match read_side {
            Winner::Source => (Vec::new(), writes),
            Winner::Target => (writes, Vec::new()),
        };
        Ok(PlannedWrites {
            to_source,
            to_target,
            conflicts: Vec::new(),
            failed_rows,
        })
    }

    /// Plan a bidirectional run: key on both sides with diverging payload
    /// becomes a conflict; key on one side only is an upsert to the other.
    async fn plan_bidirectional(
        &self,
        table: &str,
        column_types: &BTreeMap<String, PgType>,
        since: Option<DateTime<Utc>>,
        direction: SyncDirection,
    ) -> Result<PlannedWrites> {
        let mut source_rows = index_rows(fetch_side(&self.ctx.source, table, since).await?);
        let mut target_rows = index_rows(fetch_side(&self.ctx.target, table, since).await?);

        // Windowed runs only see rows modified inside the window. Pull the
        // counterpart's current row for every one-sided key so comparison
        // and conflict detection work on full pairs.
        if since.is_some() {
            let missing_on_target: Vec<RecordKey> = source_rows
                .keys()
                .filter(|k| !target_rows.contains_key(*k))
                .cloned()
                .collect();
            for row in self
                .ctx
                .target
                .fetch_rows_by_keys(table, &missing_on_target)
                .await?
            {
                target_rows.insert(row.key.clone(), row);
            }
            let missing_on_source: Vec<RecordKey> = target_rows
                .keys()
                .filter(|k| !source_rows.contains_key(*k))
                .cloned()
                .collect();
            for row in self
                .ctx
                .source
                .fetch_rows_by_keys(table, &missing_on_source)
                .await?
            {
                source_rows.insert(row.key.clone(), row);
            }
        }

        let all_keys: BTreeSet<RecordKey> = source_rows
            .keys()
            .chain(target_rows.keys())
            .cloned()
            .collect();

        let mut planned = PlannedWrites {
            to_source: Vec::new(),
            to_target: Vec::new(),
            conflicts: Vec::new(),
            failed_rows: Vec::new(),
        };

        for key in all_keys {
            let outcome = match (source_rows.get(&key), target_rows.get(&key)) {
                (Some(s), Some(t)) => {
                    let converted = self.convert_toward(table, column_types, s, Winner::Target);
                    match converted {
                        Ok(candidate) if payloads_match(&candidate, t) => Ok(()),
                        Ok(_) | Err(_) => {
                            // Divergent (or unconvertible-in-place) pair:
                            // settle it through the resolver.
                            self.settle_conflict(
                                table,
                                column_types,
                                s,
                                t,
                                since,
                                direction,
                                &mut planned,
                            )
                        }
                    }
                }
                (Some(s), None) => self
                    .convert_toward(table, column_types, s, Winner::Target)
                    .map(|row| planned.to_target.push(row)),
                (None, Some(t)) => self
                    .convert_toward(table, column_types, t, Winner::Source)
                    .map(|row| planned.to_source.push(row)),
                (None, None) => Ok(()),
            };

            if let Err(e) = outcome {
                if e.is_fatal_to_operation() {
                    return Err(e);
                }
                planned.failed_rows.push(FailedRow {
                    record_id: key,
                    error: e.to_string(),
                });
            }
        }

        Ok(planned)
    }

    #[allow(clippy::too_many_arguments)]
    fn settle_conflict(
        &self,
        table: &str,
        column_types: &BTreeMap<String, PgType>,
        source_version: &TableRow,
        target_version: &TableRow,
        since: Option<DateTime<Utc>>,
        direction: SyncDirection,
        planned: &mut PlannedWrites,
    ) -> Result<()> {
        let conflict_type = classify_conflict(source_version, target_version, since);
        let conflict = Conflict::new(
            table,
            conflict_type,
            source_version.clone(),
            target_version.clone(),
        );
        let resolved = self.resolver.resolve(
            conflict,
            self.opts.conflict_strategy,
            direction.primary_side(),
        );

        debug!(
            "Conflict on {table}:{} ({}): {} wins",
            resolved.conflict.record_id, conflict_type, resolved.winner
        );

        match resolved.winner {
            Winner::Source => {
                let row = self.convert_toward(table, column_types, source_version, Winner::Target)?;
                planned.to_target.push(row);
            }
            Winner::Target => {
                let row = self.convert_toward(table, column_types, target_version, Winner::Source)?;
                planned.to_source.push(row);
            }
        }
        planned.conflicts.push(resolved);
        Ok(())
    }

    /// Convert a row into the representation the destination side stores.
    fn convert_toward(
        &self,
        table: &str,
        column_types: &BTreeMap<String, PgType>,
        row: &TableRow,
        destination: Winner,
    ) -> Result<TableRow> {
        match destination {
            Winner::Target => self.ctx.converter.convert_row(table, column_types, row),
            Winner::Source => self.ctx.converter.restore_row(table, column_types, row),
        }
    }

    /// Write planned rows in batches, checking the deadline and the
    /// environment generation before each batch.
    async fn flush(
        &self,
        table: &str,
        rows: &[TableRow],
        destination: &Arc<dyn DatabaseHandle>,
        generation: u64,
        started_at: DateTime<Utc>,
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut written = 0;
        for chunk in rows.chunks(self.opts.batch_size.max(1)) {
            if let Some(deadline) = self.opts.deadline {
                if Utc::now() >= deadline {
                    let elapsed = (Utc::now() - started_at)
                        .to_std()
                        .unwrap_or(std::time::Duration::ZERO);
                    return Err(SyncError::Timeout(elapsed));
                }
            }
            let current = self.ctx.environment.generation().await;
            if current != generation {
                return Err(SyncError::EnvironmentChanged {
                    started: generation,
                    current,
                });
            }

            if self.opts.dry_run {
                written += chunk.len() as u64;
            } else {
                written += destination.upsert_rows(table, chunk).await?;
            }
            debug!(
                "Wrote batch of {} rows to {} ({table})",
                chunk.len(),
                destination.engine()
            );
        }
        Ok(written)
    }
}

async fn fetch_side(
    handle: &Arc<dyn DatabaseHandle>,
    table: &str,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<TableRow>> {
    match since {
        Some(ts) => handle.fetch_rows_since(table, ts).await,
        None => handle.fetch_rows(table).await,
    }
}

fn index_rows(rows: Vec<TableRow>) -> BTreeMap<RecordKey, TableRow> {
    rows.into_iter().map(|r| (r.key.clone(), r)).collect()
}

/// Whether the candidate row's payload already matches the current row,
/// column by column under cross-engine equivalence. Only the candidate's
/// columns count; the source schema is authoritative.
fn payloads_match(candidate: &TableRow, current: &TableRow) -> bool {
    candidate.values.iter().all(|(column, value)| {
        current
            .values
            .get(column)
            .is_some_and(|other| values_equivalent(value, other))
    })
}

fn classify_conflict(
    source: &TableRow,
    target: &TableRow,
    since: Option<DateTime<Utc>>,
) -> ConflictType {
    if source.is_tombstone() != target.is_tombstone() {
        return ConflictType::DeleteUpdate;
    }
    if let Some(window) = since {
        let source_moved = source.modified_at.is_some_and(|ts| ts >= window);
        let target_moved = target.modified_at.is_some_and(|ts| ts >= window);
        if source_moved && target_moved {
            return ConflictType::ConcurrentUpdate;
        }
    }
    ConflictType::ValueMismatch
}
