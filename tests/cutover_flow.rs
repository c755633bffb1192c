//! The built-in cutover plan, executed end to end over in-memory engines.

use oracle_sync::checkpoint::CheckpointValidator;
use oracle_sync::db::EngineKind;
use oracle_sync::parallel::ParallelExecutionManager;
use oracle_sync::phase::PhaseManager;
use oracle_sync::testing::{memory_context, project_row};
use oracle_sync::tracker::{EventKind, OverallStatus};
use std::sync::Arc;

async fn plan_manager(
    ctx: Arc<oracle_sync::MigrationContext>,
    tables: &[String],
) -> Arc<PhaseManager> {
    let validator = Arc::new(CheckpointValidator::new(Arc::clone(&ctx)));
    validator
        .register_all(CheckpointValidator::standard_checkpoints(tables))
        .await;
    let manager = Arc::new(PhaseManager::new(ctx, validator));
    manager
        .initialize_phases(PhaseManager::cutover_plan(tables))
        .await
        .unwrap();
    manager
}

#[tokio::test]
async fn cutover_plan_runs_through_to_the_flip() {
    let (source, target, ctx) = memory_context().await;
    let tables = vec!["projects".to_string(), "users".to_string()];
    for table in &tables {
        source
            .seed_rows(
                table,
                vec![project_row(1, "alpha", 100), project_row(2, "beta", 100)],
            )
            .await;
        // The target schema exists before the plan starts, as the
        // provisioning DDL would have left it.
        target.seed_rows(table, vec![]).await;
    }

    let manager = plan_manager(Arc::clone(&ctx), &tables).await;

    manager.execute_phase("provision_target").await.unwrap();
    // The two table syncs are independent; run them as one parallel batch.
    let parallel = ParallelExecutionManager::new(Arc::clone(&manager));
    let sync_ids = vec!["sync_projects".to_string(), "sync_users".to_string()];
    assert!(parallel.can_execute_in_parallel(&sync_ids).await);
    let outcomes = parallel.execute_in_parallel(&sync_ids).await.unwrap();
    assert!(outcomes.iter().all(|o| o.succeeded()));

    manager.execute_phase("verify_data").await.unwrap();
    manager.execute_phase("cutover").await.unwrap();

    let state = ctx.environment.current_environment().await;
    assert_eq!(state.active, EngineKind::Oracle);
    assert_eq!(state.previous, Some(EngineKind::Postgres));

    let progress = manager.migration_progress().await;
    assert_eq!(progress.completed_phases, progress.total_phases);
    assert!(progress.failed_phases.is_empty());
    assert!((progress.percent_complete - 100.0).abs() < f64::EPSILON);

    let status = ctx.tracker.current_status(&manager.phase_ids().await).await;
    assert_eq!(status.overall_status, OverallStatus::Completed);
    assert_eq!(status.environment, EngineKind::Oracle);
}

#[tokio::test]
async fn cutover_refuses_to_run_out_of_order() {
    let (_, _, ctx) = memory_context().await;
    let tables = vec!["projects".to_string()];
    let manager = plan_manager(Arc::clone(&ctx), &tables).await;

    let err = manager.execute_phase("cutover").await.unwrap_err();
    assert!(matches!(
        err,
        oracle_sync::SyncError::UnmetPrerequisite { .. }
    ));

    // The refusal never reached the environment.
    assert_eq!(
        ctx.environment.current_environment().await.active,
        EngineKind::Postgres
    );

    // Sync phases depend on provisioning, so they are not parallel-eligible
    // with it either.
    let parallel = ParallelExecutionManager::new(manager);
    assert!(
        !parallel
            .can_execute_in_parallel(&[
                "provision_target".to_string(),
                "sync_projects".to_string()
            ])
            .await
    );
}

#[tokio::test]
async fn failed_verification_leaves_the_environment_alone() {
    let (source, target, ctx) = memory_context().await;
    let tables = vec!["projects".to_string()];
    source
        .seed_rows("projects", vec![project_row(1, "alpha", 100)])
        .await;
    target.seed_rows("projects", vec![]).await;

    let manager = plan_manager(Arc::clone(&ctx), &tables).await;
    manager.execute_phase("provision_target").await.unwrap();
    manager.execute_phase("sync_projects").await.unwrap();

    // Divergence lands on the target after the sync.
    target
        .seed_rows("projects", vec![project_row(9, "stray", 200)])
        .await;

    let err = manager.execute_phase("verify_data").await.unwrap_err();
    assert!(matches!(err, oracle_sync::SyncError::Validation(_)));

    let cutover = manager.execute_phase("cutover").await.unwrap_err();
    assert!(matches!(
        cutover,
        oracle_sync::SyncError::UnmetPrerequisite { .. }
    ));
    assert_eq!(
        ctx.environment.current_environment().await.active,
        EngineKind::Postgres
    );

    let events = ctx.tracker.events().await;
    assert!(events.iter().any(|e| e.kind == EventKind::PhaseFailed));
}
