//! Concurrent execution of independent phases.
//!
//! Eligibility is decided against the dependency graph before anything
//! spawns: phases that depend on each other, even transitively, never run
//! in the same batch, and neither does a phase whose prerequisites are not
//! yet complete. Execution itself runs under a semaphore so a wide batch
//! cannot monopolize the runtime or the engines.

use crate::error::{Result, SyncError};
use crate::phase::{PhaseExecution, PhaseManager};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::info;

const DEFAULT_WORKERS: usize = 4;

/// Result of one phase inside a parallel batch. Failures stay attached to
/// their phase; they never abort the rest of the batch.
#[derive(Debug)]
pub struct PhaseOutcome {
    pub phase_id: String,
    pub result: Result<PhaseExecution>,
}

impl PhaseOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct ParallelExecutionManager {
    manager: Arc<PhaseManager>,
    max_workers: usize,
}

impl ParallelExecutionManager {
    pub fn new(manager: Arc<PhaseManager>) -> Self {
        Self::with_workers(manager, DEFAULT_WORKERS)
    }

    pub fn with_workers(manager: Arc<PhaseManager>, max_workers: usize) -> Self {
        ParallelExecutionManager {
            manager,
            max_workers: max_workers.max(1),
        }
    }

    /// Why this set cannot run concurrently; empty means eligible.
    /// Unknown phase ids are an error, not a reason.
    pub async fn parallel_conflicts(&self, ids: &[String]) -> Result<Vec<String>> {
        let mut reasons = Vec::new();

        let mut seen = BTreeSet::new();
        for id in ids {
            self.manager.phase(id).await?;
            if !seen.insert(id.as_str()) {
                reasons.push(format!("'{id}' is requested twice"));
            }
        }

        for id in ids {
            let deps = self.manager.transitive_dependencies(id).await?;
            for other in ids {
                if other != id && deps.contains(other) {
                    reasons.push(format!("'{id}' depends on '{other}'"));
                }
            }
        }
        for id in ids {
            if !self.manager.check_phase_prerequisites(id).await? {
                reasons.push(format!("'{id}' has unmet dependencies"));
            }
        }
        Ok(reasons)
    }

    /// Whether the set is free of mutual dependencies and every member's
    /// prerequisites are complete.
    pub async fn can_execute_in_parallel(&self, ids: &[String]) -> bool {
        match self.parallel_conflicts(ids).await {
            Ok(reasons) => reasons.is_empty(),
            Err(_) => false,
        }
    }

    /// Run an eligible set of phases concurrently, at most `max_workers` at
    /// a time. Outcomes come back in request order.
    pub async fn execute_in_parallel(&self, ids: &[String]) -> Result<Vec<PhaseOutcome>> {
        let conflicts = self.parallel_conflicts(ids).await?;
        if !conflicts.is_empty() {
            return Err(SyncError::Config(format!(
                "phases cannot run in parallel: {}",
                conflicts.join("; ")
            )));
        }

        info!(
            "Executing {} phases with up to {} workers",
            ids.len(),
            self.max_workers
        );
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut handles = Vec::with_capacity(ids.len());
        for id in ids {
            let manager = Arc::clone(&self.manager);
            let semaphore = Arc::clone(&semaphore);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                // The semaphore is never closed; a failed acquire would
                // only mean running unthrottled.
                let _permit = semaphore.acquire_owned().await.ok();
                let result = manager.execute_phase(&id).await;
                PhaseOutcome {
                    phase_id: id,
                    result,
                }
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (id, handle) in ids.iter().zip(handles) {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => outcomes.push(PhaseOutcome {
                    phase_id: id.clone(),
                    result: Err(SyncError::State(format!("phase task aborted: {e}"))),
                }),
            }
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointValidator;
    use crate::context::MigrationContext;
    use crate::convert::TypeConverter;
    use crate::db::{DatabaseHandle, EngineKind, MemoryHandle};
    use crate::phase::{Phase, PhaseAction, PhaseStatus};
    use crate::tracker::MemoryStore;

    async fn managers() -> (Arc<MemoryHandle>, Arc<MemoryHandle>, Arc<PhaseManager>) {
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
        (source, target, Arc::new(PhaseManager::new(ctx, validator)))
    }

    fn manual(id: &str, deps: &[&str]) -> Phase {
        Phase {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            checkpoints: vec![],
            estimated_duration: None,
            status: PhaseStatus::Pending,
            action: PhaseAction::Manual,
        }
    }

    #[tokio::test]
    async fn dependent_phases_are_not_parallel_eligible() {
        let (_, _, manager) = managers().await;
        manager
            .initialize_phases(vec![
                manual("a", &[]),
                manual("b", &["a"]),
                manual("c", &["b"]),
            ])
            .await
            .unwrap();
        let parallel = ParallelExecutionManager::new(manager);

        // c depends on a transitively, through b.
        assert!(
            !parallel
                .can_execute_in_parallel(&["a".to_string(), "c".to_string()])
                .await
        );
        let err = parallel
            .execute_in_parallel(&["a".to_string(), "c".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot run in parallel"));
    }

    #[tokio::test]
    async fn unmet_dependencies_block_the_batch() {
        let (_, _, manager) = managers().await;
        manager
            .initialize_phases(vec![manual("a", &[]), manual("b", &["a"])])
            .await
            .unwrap();
        let parallel = ParallelExecutionManager::new(manager);

        assert!(!parallel.can_execute_in_parallel(&["b".to_string()]).await);
    }

    #[tokio::test]
    async fn independent_phases_run_and_report_in_order() {
        let (_, _, manager) = managers().await;
        manager
            .initialize_phases(vec![manual("x", &[]), manual("y", &[]), manual("z", &[])])
            .await
            .unwrap();
        let parallel = ParallelExecutionManager::with_workers(Arc::clone(&manager), 2);

        let ids = vec!["x".to_string(), "y".to_string(), "z".to_string()];
        assert!(parallel.can_execute_in_parallel(&ids).await);
        let outcomes = parallel.execute_in_parallel(&ids).await.unwrap();

        assert_eq!(outcomes.len(), 3);
        for (outcome, id) in outcomes.iter().zip(["x", "y", "z"]) {
            assert_eq!(outcome.phase_id, id);
            assert!(outcome.succeeded());
            assert_eq!(
                manager.phase(id).await.unwrap().status,
                PhaseStatus::Completed
            );
        }
    }

    #[tokio::test]
    async fn one_failure_does_not_sink_the_batch() {
        let (_, _, manager) = managers().await;
        let failing_audit = Phase {
            action: PhaseAction::Audit {
                tables: vec!["missing_table".to_string()],
            },
            ..manual("audit", &[])
        };
        manager
            .initialize_phases(vec![manual("ok", &[]), failing_audit])
            .await
            .unwrap();
        let parallel = ParallelExecutionManager::new(Arc::clone(&manager));

        let outcomes = parallel
            .execute_in_parallel(&["ok".to_string(), "audit".to_string()])
            .await
            .unwrap();
        assert!(outcomes[0].succeeded());
        assert!(!outcomes[1].succeeded());
        assert_eq!(
            manager.phase("audit").await.unwrap().status,
            PhaseStatus::Failed
        );
    }

    #[tokio::test]
    async fn duplicate_ids_are_refused() {
        let (_, _, manager) = managers().await;
        manager.initialize_phases(vec![manual("a", &[])]).await.unwrap();
        let parallel = ParallelExecutionManager::new(manager);

        let err = parallel
            .execute_in_parallel(&["a".to_string(), "a".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("requested twice"));
    }

    #[tokio::test]
    async fn unknown_phase_is_an_error_not_a_reason() {
        let (_, _, manager) = managers().await;
        manager.initialize_phases(vec![manual("a", &[])]).await.unwrap();
        let parallel = ParallelExecutionManager::new(manager);

        assert!(!parallel.can_execute_in_parallel(&["ghost".to_string()]).await);
        let err = parallel
            .parallel_conflicts(&["ghost".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::UnknownId { kind: "phase", .. }));
    }
}
