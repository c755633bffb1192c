//! Phase orchestration for the migration plan.
//!
//! A plan is a static set of phases with dependency edges, loaded once and
//! validated (unknown edges, cycles) before anything runs. Executing a
//! phase runs its action, then its checkpoint gates; only PhaseManager
//! mutates phase status, and every transition lands in the event log.

pub mod graph;

pub use graph::PhaseGraph;

use crate::audit::ConsistencyChecker;
use crate::checkpoint::CheckpointValidator;
use crate::context::MigrationContext;
use crate::db::EngineKind;
use crate::error::{Result, SyncError};
use crate::sync::{DataSynchronizer, SyncDirection};
use crate::tracker::{EventKind, MigrationEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Lifecycle of one phase. Failed phases retry back through InProgress;
/// Completed is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseStatus::Pending => "pending",
            PhaseStatus::InProgress => "in_progress",
            PhaseStatus::Completed => "completed",
            PhaseStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What executing a phase does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PhaseAction {
    /// Run the synchronizer over one table.
    SyncTable {
        table: String,
        direction: SyncDirection,
    },
    /// Run one named checkpoint as the phase's whole job.
    Validate { checkpoint: String },
    /// Run a full consistency audit; inconsistency fails the phase.
    Audit { tables: Vec<String> },
    /// Flip the active environment.
    SwitchEnvironment { target: EngineKind },
    /// Operator work outside this tool; executing acknowledges it.
    Manual,
}

/// One unit of the migration plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Checkpoint ids that must pass after the action.
    #[serde(default)]
    pub checkpoints: Vec<String>,
    /// Estimated duration in seconds, used for remaining-time math.
    #[serde(default)]
    pub estimated_duration: Option<u64>,
    #[serde(default)]
    pub status: PhaseStatus,
    pub action: PhaseAction,
}

/// What one successful execution produced.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseExecution {
    pub phase_id: String,
    pub outputs: Vec<String>,
    pub warnings: Vec<String>,
    pub duration: Duration,
}

/// Plan-wide progress, replayed from the event log.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationProgress {
    pub total_phases: usize,
    pub completed_phases: usize,
    pub failed_phases: Vec<String>,
    pub current_phase: Option<String>,
    pub percent_complete: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub estimated_remaining: Option<Duration>,
}

#[derive(Debug, Deserialize)]
struct PlanFile {
    #[serde(default, rename = "phase")]
    phases: Vec<Phase>,
}

pub struct PhaseManager {
    ctx: Arc<MigrationContext>,
    synchronizer: DataSynchronizer,
    checker: ConsistencyChecker,
    validator: Arc<CheckpointValidator>,
    phases: RwLock<BTreeMap<String, Phase>>,
    graph: RwLock<PhaseGraph>,
}

impl PhaseManager {
    pub fn new(ctx: Arc<MigrationContext>, validator: Arc<CheckpointValidator>) -> Self {
        PhaseManager {
            synchronizer: DataSynchronizer::new(Arc::clone(&ctx)),
            checker: ConsistencyChecker::new(Arc::clone(&ctx)),
            ctx,
            validator,
            phases: RwLock::new(BTreeMap::new()),
            graph: RwLock::new(PhaseGraph::new()),
        }
    }

    /// Load and validate a plan. Replaces any previously loaded plan.
    pub async fn initialize_phases(&self, phases: Vec<Phase>) -> Result<()> {
        let mut graph = PhaseGraph::new();
        let mut by_id = BTreeMap::new();
        for phase in phases {
            if by_id.contains_key(&phase.id) {
                return Err(SyncError::Config(format!(
                    "duplicate phase id '{}'",
                    phase.id
                )));
            }
            graph.insert(phase.id.clone(), phase.dependencies.clone());
            by_id.insert(phase.id.clone(), phase);
        }
        graph.validate_edges()?;
        graph.detect_cycle()?;

        info!("Initialized migration plan with {} phases", by_id.len());
        *self.phases.write().await = by_id;
        *self.graph.write().await = graph;
        Ok(())
    }

    /// Parse a TOML plan file into phases. Validation happens on
    /// [`initialize_phases`].
    pub fn load_plan<P: AsRef<Path>>(path: P) -> Result<Vec<Phase>> {
        let text = std::fs::read_to_string(path)?;
        let plan: PlanFile = toml::from_str(&text)?;
        Ok(plan.phases)
    }

    /// The built-in table-by-table cutover plan: provision the target, sync
    /// every table, verify, flip. Pair it with
    /// [`CheckpointValidator::standard_checkpoints`].
    pub fn cutover_plan(tables: &[String]) -> Vec<Phase> {
        let mut phases = vec![Phase {
            id: "provision_target".to_string(),
            name: "Provision target schema".to_string(),
            description: "Run the generated DDL scripts against the target".to_string(),
            dependencies: vec![],
            checkpoints: vec!["target_ready".to_string()],
            estimated_duration: Some(600),
            status: PhaseStatus::Pending,
            action: PhaseAction::Manual,
        }];

        let mut sync_ids = Vec::new();
        for table in tables {
            let id = format!("sync_{table}");
            phases.push(Phase {
                id: id.clone(),
                name: format!("Synchronize {table}"),
                description: String::new(),
                dependencies: vec!["provision_target".to_string()],
                checkpoints: vec![],
                estimated_duration: Some(300),
                status: PhaseStatus::Pending,
                action: PhaseAction::SyncTable {
                    table: table.clone(),
                    direction: SyncDirection::SourceToTarget,
                },
            });
            sync_ids.push(id);
        }

        phases.push(Phase {
            id: "verify_data".to_string(),
            name: "Verify data parity".to_string(),
            description: String::new(),
            dependencies: sync_ids,
            checkpoints: vec!["row_counts".to_string()],
            estimated_duration: Some(120),
            status: PhaseStatus::Pending,
            action: PhaseAction::Audit {
                tables: tables.to_vec(),
            },
        });
        phases.push(Phase {
            id: "cutover".to_string(),
            name: "Cut over to the target".to_string(),
            description: "Make the target engine the active environment".to_string(),
            dependencies: vec!["verify_data".to_string()],
            checkpoints: vec![],
            estimated_duration: Some(60),
            status: PhaseStatus::Pending,
            action: PhaseAction::SwitchEnvironment {
                target: EngineKind::Oracle,
            },
        });
        phases
    }

    pub async fn phase(&self, id: &str) -> Result<Phase> {
        self.phases
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::UnknownId {
                kind: "phase",
                id: id.to_string(),
            })
    }

    /// All phases, dependencies first.
    pub async fn phases_in_order(&self) -> Result<Vec<Phase>> {
        let order = self.graph.read().await.topological_order()?;
        let phases = self.phases.read().await;
        Ok(order.iter().filter_map(|id| phases.get(id).cloned()).collect())
    }

    pub async fn phase_ids(&self) -> Vec<String> {
        self.phases.read().await.keys().cloned().collect()
    }

    /// True iff every direct dependency is Completed.
    pub async fn check_phase_prerequisites(&self, id: &str) -> Result<bool> {
        Ok(self.unmet_dependencies(id).await?.is_empty())
    }

    /// Everything `id` depends on, directly or through other phases.
    pub async fn transitive_dependencies(&self, id: &str) -> Result<BTreeSet<String>> {
        let graph = self.graph.read().await;
        if !graph.contains(id) {
            return Err(SyncError::UnknownId {
                kind: "phase",
                id: id.to_string(),
            });
        }
        Ok(graph.transitive_dependencies(id))
    }

    async fn unmet_dependencies(&self, id: &str) -> Result<Vec<String>> {
        // Direct dependencies suffice; each dependency enforces its own.
        let deps: Vec<String> = {
            let graph = self.graph.read().await;
            if !graph.contains(id) {
                return Err(SyncError::UnknownId {
                    kind: "phase",
                    id: id.to_string(),
                });
            }
            graph.dependencies(id).to_vec()
        };
        let phases = self.phases.read().await;
        Ok(deps
            .into_iter()
            .filter(|dep| {
                phases
                    .get(dep)
                    .map_or(true, |p| p.status != PhaseStatus::Completed)
            })
            .collect())
    }

    /// Check status and prerequisites, then flip to InProgress, all under
    /// one lock so two callers can never start the same phase.
    async fn begin_phase(&self, id: &str) -> Result<Phase> {
        let deps: Vec<String> = {
            let graph = self.graph.read().await;
            if !graph.contains(id) {
                return Err(SyncError::UnknownId {
                    kind: "phase",
                    id: id.to_string(),
                });
            }
            graph.dependencies(id).to_vec()
        };

        let mut phases = self.phases.write().await;
        let snapshot = {
            let phase = phases.get(id).ok_or_else(|| SyncError::UnknownId {
                kind: "phase",
                id: id.to_string(),
            })?;
            match phase.status {
                PhaseStatus::InProgress => {
                    return Err(SyncError::Config(format!(
                        "phase '{id}' is already running"
                    )))
                }
                PhaseStatus::Completed => {
                    return Err(SyncError::Config(format!("phase '{id}' already completed")))
                }
                PhaseStatus::Pending | PhaseStatus::Failed => {}
            }
            let missing: Vec<String> = deps
                .into_iter()
                .filter(|dep| {
                    phases
                        .get(dep)
                        .map_or(true, |p| p.status != PhaseStatus::Completed)
                })
                .collect();
            if !missing.is_empty() {
                return Err(SyncError::UnmetPrerequisite {
                    phase: id.to_string(),
                    missing,
                });
            }
            phase.clone()
        };
        if let Some(phase) = phases.get_mut(id) {
            phase.status = PhaseStatus::InProgress;
        }
        Ok(snapshot)
    }

    /// Execute one phase: action first, then its checkpoint gates.
    ///
    /// Refuses on unmet prerequisites without touching status. A failure
    /// inside the phase marks it Failed and returns the error; the phase
    /// can be retried.
    pub async fn execute_phase(&self, id: &str) -> Result<PhaseExecution> {
        let phase = self.begin_phase(id).await?;

        let start_event = MigrationEvent::new(
            EventKind::PhaseStarted,
            format!("phase '{}' started", phase.name),
        )
        .with_phase(id);
        if let Err(e) = self.ctx.tracker.record_event(start_event).await {
            // Never leave the phase stuck InProgress over a logging failure.
            self.set_status(id, phase.status).await;
            return Err(e);
        }
        info!("Executing phase '{id}' ({})", phase.name);

        let started = std::time::Instant::now();
        let outcome = self.run_phase_body(&phase).await;
        let duration = started.elapsed();

        match outcome {
            Ok((outputs, warnings)) => {
                self.set_status(id, PhaseStatus::Completed).await;
                self.ctx
                    .tracker
                    .record_event(
                        MigrationEvent::new(
                            EventKind::PhaseCompleted,
                            format!("phase '{}' completed", phase.name),
                        )
                        .with_phase(id)
                        .with_metadata(serde_json::json!({
                            "duration_ms": duration.as_millis() as u64,
                        })),
                    )
                    .await?;
                info!("Phase '{id}' completed in {duration:?}");
                Ok(PhaseExecution {
                    phase_id: id.to_string(),
                    outputs,
                    warnings,
                    duration,
                })
            }
            Err(e) => {
                self.set_status(id, PhaseStatus::Failed).await;
                let event = MigrationEvent::new(
                    EventKind::PhaseFailed,
                    format!("phase '{}' failed: {e}", phase.name),
                )
                .with_phase(id);
                if let Err(log_err) = self.ctx.tracker.record_event(event).await {
                    warn!("Could not record phase failure: {log_err}");
                }
                Err(e)
            }
        }
    }

    async fn run_phase_body(&self, phase: &Phase) -> Result<(Vec<String>, Vec<String>)> {
        let (mut outputs, warnings) = self.run_action(phase).await?;
        for checkpoint_id in &phase.checkpoints {
            let report = self.validator.validate_checkpoint(checkpoint_id).await?;
            if !report.is_valid {
                return Err(SyncError::Validation(format!(
                    "checkpoint '{checkpoint_id}' failed: {}",
                    report.errors.join("; ")
                )));
            }
            outputs.push(format!("checkpoint '{checkpoint_id}' passed"));
        }
        Ok((outputs, warnings))
    }

    async fn run_action(&self, phase: &Phase) -> Result<(Vec<String>, Vec<String>)> {
        let mut outputs = Vec::new();
        let mut warnings = Vec::new();
        match &phase.action {
            PhaseAction::SyncTable { table, direction } => {
                let report = self.synchronizer.synchronize_table(table, *direction).await?;
                outputs.push(format!(
                    "synchronized {} records of '{table}' ({} conflicts)",
                    report.records_synchronized,
                    report.conflicts.len()
                ));
                if !report.failed_rows.is_empty() {
                    warnings.push(format!(
                        "{} rows of '{table}' failed conversion",
                        report.failed_rows.len()
                    ));
                }
            }
            PhaseAction::Validate { checkpoint } => {
                let report = self.validator.validate_checkpoint(checkpoint).await?;
                if !report.is_valid {
                    return Err(SyncError::Validation(format!(
                        "checkpoint '{checkpoint}' failed: {}",
                        report.errors.join("; ")
                    )));
                }
                outputs.push(format!("checkpoint '{checkpoint}' passed"));
            }
            PhaseAction::Audit { tables } => {
                let report = self.checker.validate_all_tables(tables).await?;
                if !report.is_consistent {
                    return Err(SyncError::Validation(format!(
                        "consistency audit failed: {}",
                        report.summary
                    )));
                }
                outputs.push(report.summary);
            }
            PhaseAction::SwitchEnvironment { target } => {
                let outcome = self.ctx.environment.switch_to(*target).await?;
                outputs.push(if outcome.already_active {
                    format!("environment already on {target}")
                } else {
                    format!(
                        "environment switched from {} to {}",
                        outcome.previous, outcome.target
                    )
                });
            }
            PhaseAction::Manual => {
                outputs.push(format!("manual step '{}' acknowledged", phase.name));
            }
        }
        Ok((outputs, warnings))
    }

    /// Replay the event log against the loaded plan.
    pub async fn migration_progress(&self) -> MigrationProgress {
        let events = self.ctx.tracker.events().await;
        let phases = self.phases.read().await;
        progress_from_events(&events, &phases)
    }

    async fn set_status(&self, id: &str, status: PhaseStatus) {
        if let Some(phase) = self.phases.write().await.get_mut(id) {
            phase.status = status;
        }
    }
}

/// Pure projection of plan progress from the event log.
pub fn progress_from_events(
    events: &[MigrationEvent],
    phases: &BTreeMap<String, Phase>,
) -> MigrationProgress {
    let mut completed = BTreeSet::new();
    let mut failed = BTreeSet::new();
    let mut in_flight: Vec<String> = Vec::new();
    let mut started_at = None;

    for event in events {
        let Some(id) = event.phase_id.as_ref().filter(|id| phases.contains_key(*id)) else {
            continue;
        };
        match event.kind {
            EventKind::PhaseStarted => {
                started_at.get_or_insert(event.timestamp);
                in_flight.push(id.clone());
                failed.remove(id);
            }
            EventKind::PhaseCompleted => {
                completed.insert(id.clone());
                failed.remove(id);
                in_flight.retain(|p| p != id);
            }
            EventKind::PhaseFailed => {
                failed.insert(id.clone());
                in_flight.retain(|p| p != id);
            }
            _ => {}
        }
    }

    let total_phases = phases.len();
    let percent_complete = if total_phases == 0 {
        0.0
    } else {
        completed.len() as f64 * 100.0 / total_phases as f64
    };
    let mut has_estimate = false;
    let remaining_secs: u64 = phases
        .values()
        .filter(|p| !completed.contains(&p.id))
        .filter_map(|p| p.estimated_duration)
        .inspect(|_| has_estimate = true)
        .sum();

    MigrationProgress {
        total_phases,
        completed_phases: completed.len(),
        failed_phases: failed.into_iter().collect(),
        current_phase: in_flight.last().cloned(),
        percent_complete,
        started_at,
        estimated_remaining: has_estimate.then(|| Duration::from_secs(remaining_secs)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::TypeConverter;
    use crate::db::value::{RecordKey, SqlValue, TableRow};
    use crate::db::{DatabaseHandle, MemoryHandle};
    use crate::tracker::MemoryStore;

    async fn manager() -> (Arc<MemoryHandle>, Arc<MemoryHandle>, PhaseManager) {
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
        let validator = Arc::new(CheckpointValidator::new(Arc::clone(&ctx)));
        (source, target, PhaseManager::new(ctx, validator))
    }

    fn manual(id: &str, deps: &[&str]) -> Phase {
        Phase {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            checkpoints: vec![],
            estimated_duration: Some(60),
            status: PhaseStatus::Pending,
            action: PhaseAction::Manual,
        }
    }

    fn chain() -> Vec<Phase> {
        vec![
            manual("a", &[]),
            manual("b", &["a"]),
            manual("c", &["b"]),
        ]
    }

    #[tokio::test]
    async fn phase_with_unmet_prerequisites_is_refused() {
        let (_, _, manager) = manager().await;
        manager.initialize_phases(chain()).await.unwrap();

        assert!(!manager.check_phase_prerequisites("c").await.unwrap());
        let err = manager.execute_phase("c").await.unwrap_err();
        match err {
            SyncError::UnmetPrerequisite { phase, missing } => {
                assert_eq!(phase, "c");
                assert_eq!(missing, vec!["b".to_string()]);
            }
            other => panic!("expected unmet prerequisite, got {other}"),
        }
        // The refusal never started the phase.
        assert_eq!(manager.phase("c").await.unwrap().status, PhaseStatus::Pending);
    }

    #[tokio::test]
    async fn chain_executes_in_dependency_order() {
        let (_, _, manager) = manager().await;
        manager.initialize_phases(chain()).await.unwrap();

        for id in ["a", "b", "c"] {
            let execution = manager.execute_phase(id).await.unwrap();
            assert_eq!(execution.phase_id, id);
            assert!(!execution.outputs.is_empty());
            assert_eq!(manager.phase(id).await.unwrap().status, PhaseStatus::Completed);
        }

        let progress = manager.migration_progress().await;
        assert_eq!(progress.completed_phases, 3);
        assert_eq!(progress.percent_complete, 100.0);
        assert!(progress.started_at.is_some());
        assert!(progress.failed_phases.is_empty());
    }

    #[tokio::test]
    async fn completed_phase_refuses_rerun() {
        let (_, _, manager) = manager().await;
        manager.initialize_phases(vec![manual("a", &[])]).await.unwrap();
        manager.execute_phase("a").await.unwrap();
        let err = manager.execute_phase("a").await.unwrap_err();
        assert!(matches!(err, SyncError::Config(msg) if msg.contains("already completed")));
    }

    #[tokio::test]
    async fn failed_phase_is_retryable() {
        let (source, target, manager) = manager().await;
        source
            .seed_rows(
                "photos",
                vec![TableRow::new(RecordKey::Int(1)).with_value("id", SqlValue::Int(1))],
            )
            .await;
        target.create_table("photos", Vec::new()).await;

        let audit = Phase {
            action: PhaseAction::Audit {
                tables: vec!["photos".to_string()],
            },
            ..manual("verify", &[])
        };
        manager.initialize_phases(vec![audit]).await.unwrap();

        let err = manager.execute_phase("verify").await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        assert_eq!(
            manager.phase("verify").await.unwrap().status,
            PhaseStatus::Failed
        );

        // Fix the divergence, then retry the same phase.
        target
            .seed_rows(
                "photos",
                vec![TableRow::new(RecordKey::Int(1)).with_value("id", SqlValue::Int(1))],
            )
            .await;
        manager.execute_phase("verify").await.unwrap();
        assert_eq!(
            manager.phase("verify").await.unwrap().status,
            PhaseStatus::Completed
        );
    }

    #[tokio::test]
    async fn sync_phase_moves_rows() {
        let (source, target, manager) = manager().await;
        source
            .seed_rows(
                "photos",
                vec![TableRow::new(RecordKey::Int(7)).with_value("id", SqlValue::Int(7))],
            )
            .await;

        let sync = Phase {
            action: PhaseAction::SyncTable {
                table: "photos".to_string(),
                direction: SyncDirection::SourceToTarget,
            },
            ..manual("sync_photos", &[])
        };
        manager.initialize_phases(vec![sync]).await.unwrap();

        let execution = manager.execute_phase("sync_photos").await.unwrap();
        assert!(execution.outputs[0].contains("synchronized 1 records"));
        assert!(target.row("photos", &RecordKey::Int(7)).await.is_some());
    }

    #[tokio::test]
    async fn cyclic_plan_is_rejected_at_load() {
        let (_, _, manager) = manager().await;
        let phases = vec![manual("a", &["b"]), manual("b", &["a"])];
        let err = manager.initialize_phases(phases).await.unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[tokio::test]
    async fn duplicate_phase_ids_are_rejected() {
        let (_, _, manager) = manager().await;
        let err = manager
            .initialize_phases(vec![manual("a", &[]), manual("a", &[])])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[tokio::test]
    async fn cutover_plan_is_loadable_and_ordered() {
        let (_, _, manager) = manager().await;
        let tables = vec!["photos".to_string(), "albums".to_string()];
        manager
            .initialize_phases(PhaseManager::cutover_plan(&tables))
            .await
            .unwrap();

        let order = manager.phases_in_order().await.unwrap();
        let pos = |id: &str| order.iter().position(|p| p.id == id).unwrap();
        assert!(pos("provision_target") < pos("sync_photos"));
        assert!(pos("sync_albums") < pos("verify_data"));
        assert!(pos("verify_data") < pos("cutover"));
    }

    #[test]
    fn plan_file_parses_tagged_actions() {
        let text = r#"
            [[phase]]
            id = "sync_photos"
            name = "Synchronize photos"
            dependencies = []
            estimated_duration = 300

            [phase.action]
            type = "sync_table"
            table = "photos"
            direction = "source_to_target"

            [[phase]]
            id = "cutover"
            name = "Cut over"
            dependencies = ["sync_photos"]

            [phase.action]
            type = "switch_environment"
            target = "oracle"
        "#;
        let plan: PlanFile = toml::from_str(text).unwrap();
        assert_eq!(plan.phases.len(), 2);
        assert_eq!(
            plan.phases[0].action,
            PhaseAction::SyncTable {
                table: "photos".to_string(),
                direction: SyncDirection::SourceToTarget,
            }
        );
        assert_eq!(plan.phases[0].estimated_duration, Some(300));
        assert_eq!(plan.phases[0].status, PhaseStatus::Pending);
        assert_eq!(
            plan.phases[1].action,
            PhaseAction::SwitchEnvironment {
                target: EngineKind::Oracle,
            }
        );
    }
}
