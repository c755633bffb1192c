//! Synchronization and audit working together over in-memory engines.

use chrono::Duration;
use oracle_sync::audit::ConsistencyChecker;
use oracle_sync::db::value::{RecordKey, SqlValue};
use oracle_sync::sync::{DataSynchronizer, SyncDirection};
use oracle_sync::testing::{memory_context, project_row, seed_identical, ts};
use std::sync::Arc;

#[tokio::test]
async fn incremental_sync_is_idempotent_for_a_fixed_watermark() {
    let (source, _, ctx) = memory_context().await;
    source
        .seed_rows(
            "projects",
            vec![project_row(1, "alpha", 100), project_row(2, "beta", 150)],
        )
        .await;

    let sync = DataSynchronizer::new(Arc::clone(&ctx));
    let since = ts(50);

    let first = sync.incremental_sync("projects", since).await.unwrap();
    assert_eq!(first.records_synchronized, 2);

    // Same watermark, no intervening writes: nothing left to move.
    let second = sync.incremental_sync("projects", since).await.unwrap();
    assert_eq!(second.records_synchronized, 0);
    assert!(second.conflicts.is_empty());
}

#[tokio::test]
async fn watermark_chains_full_sync_into_incremental() {
    let (source, target, ctx) = memory_context().await;
    source
        .seed_rows("projects", vec![project_row(1, "alpha", 100)])
        .await;

    let sync = DataSynchronizer::new(Arc::clone(&ctx));
    let full = sync
        .synchronize_table("projects", SyncDirection::SourceToTarget)
        .await
        .unwrap();

    // A row lands after the full sync began.
    let late = full.watermark + Duration::seconds(5);
    source
        .seed_rows(
            "projects",
            vec![project_row(2, "beta", late.timestamp())],
        )
        .await;

    let catch_up = sync
        .incremental_sync("projects", full.watermark)
        .await
        .unwrap();
    assert!(catch_up.records_synchronized >= 1);
    assert!(target.row("projects", &RecordKey::Int(2)).await.is_some());
}

#[tokio::test]
async fn bidirectional_conflicts_converge_to_a_consistent_audit() {
    let (source, target, ctx) = memory_context().await;
    // Both sides edited the same project since the last reconciliation.
    source
        .seed_rows("projects", vec![project_row(1, "renamed on source", 300)])
        .await;
    target
        .seed_rows("projects", vec![project_row(1, "renamed on target", 200)])
        .await;

    let sync = DataSynchronizer::new(Arc::clone(&ctx));
    let report = sync
        .synchronize_table("projects", SyncDirection::Bidirectional)
        .await
        .unwrap();
    assert_eq!(report.conflicts.len(), 1);

    // The audit sees both copies agree afterwards.
    let checker = ConsistencyChecker::new(ctx);
    let consistency = checker.check_table_consistency("projects").await.unwrap();
    assert!(consistency.is_consistent, "{:?}", consistency.discrepancies);

    let settled = target
        .row("projects", &RecordKey::Int(1))
        .await
        .unwrap();
    assert_eq!(
        settled.values["name"],
        SqlValue::Text("renamed on source".to_string())
    );
}

#[tokio::test]
async fn audit_pinpoints_the_single_divergent_row() {
    let (source, target, ctx) = memory_context().await;
    seed_identical(&source, &target, "projects", 5).await;
    target
        .seed_rows("projects", vec![project_row(3, "tampered", 100)])
        .await;

    let checker = ConsistencyChecker::new(ctx);
    let consistency = checker.check_table_consistency("projects").await.unwrap();
    assert!(!consistency.is_consistent);
    assert_eq!(consistency.source_count, 5);
    assert_eq!(consistency.target_count, 5);
    assert_eq!(consistency.discrepancies.len(), 1);
    assert_eq!(
        consistency.discrepancies[0].record_id(),
        &RecordKey::Int(3)
    );
}

#[tokio::test]
async fn audit_report_covers_every_requested_table() {
    let (source, target, ctx) = memory_context().await;
    seed_identical(&source, &target, "projects", 3).await;
    seed_identical(&source, &target, "users", 2).await;
    source
        .seed_rows("users", vec![project_row(7, "extra", 100)])
        .await;

    let checker = ConsistencyChecker::new(ctx);
    let report = checker
        .validate_all_tables(&["projects".to_string(), "users".to_string()])
        .await
        .unwrap();
    assert!(!report.is_consistent);
    assert_eq!(report.tables.len(), 2);
    let users = report
        .tables
        .iter()
        .find(|t| t.table == "users")
        .expect("users table audited");
    assert!(!users.is_consistent);
}
