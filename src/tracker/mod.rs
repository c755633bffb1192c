//! Migration status tracking.
//!
//! The tracker is event-sourced: components append [`MigrationEvent`]s and
//! every view (current status, timeline, progress) is a pure projection
//! over the log. [`project`] is a free function so the projection logic
//! tests without any store behind it.

pub mod store;

pub use store::{EventStore, FilesystemStore, MemoryStore};

use crate::db::EngineKind;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// What happened. Event kinds cover every state change the migration makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PhaseStarted,
    PhaseCompleted,
    PhaseFailed,
    SyncStarted,
    SyncCompleted,
    SyncFailed,
    CheckpointPassed,
    CheckpointFailed,
    EnvironmentSwitched,
    ScheduleCreated,
    ScheduleUpdated,
    ScheduleSkipped,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PhaseStarted => "phase_started",
            EventKind::PhaseCompleted => "phase_completed",
            EventKind::PhaseFailed => "phase_failed",
            EventKind::SyncStarted => "sync_started",
            EventKind::SyncCompleted => "sync_completed",
            EventKind::SyncFailed => "sync_failed",
            EventKind::CheckpointPassed => "checkpoint_passed",
            EventKind::CheckpointFailed => "checkpoint_failed",
            EventKind::EnvironmentSwitched => "environment_switched",
            EventKind::ScheduleCreated => "schedule_created",
            EventKind::ScheduleUpdated => "schedule_updated",
            EventKind::ScheduleSkipped => "schedule_skipped",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One append-only log entry. Events are never rewritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationEvent {
    pub id: uuid::Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub phase_id: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl MigrationEvent {
    pub fn new(kind: EventKind, message: impl Into<String>) -> Self {
        MigrationEvent {
            id: uuid::Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            phase_id: None,
            message: message.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_phase(mut self, phase_id: impl Into<String>) -> Self {
        self.phase_id = Some(phase_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Coarse state of the whole migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    NotStarted,
    InProgress,
    Failed,
    Completed,
}

/// The projected answer to "where does the migration stand".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationStatus {
    pub overall_status: OverallStatus,
    pub environment: EngineKind,
    pub last_updated: Option<DateTime<Utc>>,
    pub current_phase: Option<String>,
    pub completed_phases: usize,
    pub total_phases: usize,
    pub rollback_available: bool,
}

/// Project the event log against the known phase set.
///
/// Pure: same events and phases, same answer. A phase's state is its most
/// recent phase event, so a failed phase that later completes counts as
/// completed.
pub fn project(events: &[MigrationEvent], phase_ids: &[String]) -> MigrationStatus {
    let mut phase_state: BTreeMap<&str, EventKind> = BTreeMap::new();
    let mut in_flight: Vec<String> = Vec::new();
    let mut environment = EngineKind::Postgres;
    let mut rollback_available = false;
    let mut last_updated = None;

    for event in events {
        last_updated = Some(match last_updated {
            Some(prev) if prev >= event.timestamp => prev,
            _ => event.timestamp,
        });

        match event.kind {
            EventKind::PhaseStarted | EventKind::PhaseCompleted | EventKind::PhaseFailed => {
                if let Some(phase_id) = &event.phase_id {
                    phase_state.insert(phase_id.as_str(), event.kind);
                    match event.kind {
                        EventKind::PhaseStarted => in_flight.push(phase_id.clone()),
                        _ => in_flight.retain(|id| id != phase_id),
                    }
                }
            }
            EventKind::EnvironmentSwitched => {
                rollback_available = true;
                if let Some(to) = event.metadata.get("to").and_then(|v| v.as_str()) {
                    if let Ok(engine) = to.parse::<EngineKind>() {
                        environment = engine;
                    }
                }
            }
            _ => {}
        }
    }

    let completed_phases = phase_ids
        .iter()
        .filter(|id| phase_state.get(id.as_str()) == Some(&EventKind::PhaseCompleted))
        .count();
    let any_failed = phase_state
        .values()
        .any(|kind| *kind == EventKind::PhaseFailed);

    let overall_status = if events.is_empty() {
        OverallStatus::NotStarted
    } else if any_failed {
        OverallStatus::Failed
    } else if !phase_ids.is_empty() && completed_phases == phase_ids.len() {
        OverallStatus::Completed
    } else {
        OverallStatus::InProgress
    };

    MigrationStatus {
        overall_status,
        environment,
        last_updated,
        current_phase: in_flight.last().cloned(),
        completed_phases,
        total_phases: phase_ids.len(),
        rollback_available,
    }
}

/// Append-only event recorder with projection views.
pub struct MigrationStatusTracker {
    store: Arc<dyn EventStore>,
    events: RwLock<Vec<MigrationEvent>>,
}

impl MigrationStatusTracker {
    /// Open the tracker over a store, loading any existing log.
    pub async fn open(store: Arc<dyn EventStore>) -> Result<Self> {
        let events = store.load_events().await?;
        Ok(MigrationStatusTracker {
            store,
            events: RwLock::new(events),
        })
    }

    pub fn store(&self) -> Arc<dyn EventStore> {
        Arc::clone(&self.store)
    }

    /// Record one event. Persistence failures surface; the cache only
    /// sees events the store accepted.
    pub async fn record_event(&self, event: MigrationEvent) -> Result<()> {
        self.store.append(&event).await?;
        self.events.write().await.push(event);
        Ok(())
    }

    /// The full log, oldest first.
    pub async fn events(&self) -> Vec<MigrationEvent> {
        self.events.read().await.clone()
    }

    /// The log newest first, for display.
    pub async fn timeline(&self) -> Vec<MigrationEvent> {
        let mut events = self.events().await;
        events.reverse();
        events
    }

    /// Project current status against the known phase set.
    pub async fn current_status(&self, phase_ids: &[String]) -> MigrationStatus {
        project(&self.events().await, phase_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_log_projects_not_started() {
        let status = project(&[], &ids(&["schema", "data"]));
        assert_eq!(status.overall_status, OverallStatus::NotStarted);
        assert_eq!(status.environment, EngineKind::Postgres);
        assert!(status.current_phase.is_none());
        assert!(!status.rollback_available);
    }

    #[test]
    fn started_phase_shows_as_current_until_terminal() {
        let events = vec![
            MigrationEvent::new(EventKind::PhaseStarted, "schema").with_phase("schema"),
        ];
        let status = project(&events, &ids(&["schema", "data"]));
        assert_eq!(status.overall_status, OverallStatus::InProgress);
        assert_eq!(status.current_phase.as_deref(), Some("schema"));

        let events = vec![
            MigrationEvent::new(EventKind::PhaseStarted, "schema").with_phase("schema"),
            MigrationEvent::new(EventKind::PhaseCompleted, "schema done").with_phase("schema"),
        ];
        let status = project(&events, &ids(&["schema", "data"]));
        assert!(status.current_phase.is_none());
        assert_eq!(status.completed_phases, 1);
    }

    #[test]
    fn retried_failure_counts_as_completed() {
        let events = vec![
            MigrationEvent::new(EventKind::PhaseFailed, "boom").with_phase("data"),
            MigrationEvent::new(EventKind::PhaseStarted, "retry").with_phase("data"),
            MigrationEvent::new(EventKind::PhaseCompleted, "ok").with_phase("data"),
        ];
        let status = project(&events, &ids(&["data"]));
        assert_eq!(status.overall_status, OverallStatus::Completed);
    }

    #[test]
    fn environment_follows_the_last_switch() {
        let events = vec![MigrationEvent::new(EventKind::EnvironmentSwitched, "flip")
            .with_metadata(serde_json::json!({"from": "postgres", "to": "oracle"}))];
        let status = project(&events, &[]);
        assert_eq!(status.environment, EngineKind::Oracle);
        assert!(status.rollback_available);
    }

    #[tokio::test]
    async fn tracker_appends_through_to_the_store() {
        let store = Arc::new(MemoryStore::new());
        let tracker = MigrationStatusTracker::open(store.clone()).await.unwrap();
        tracker
            .record_event(MigrationEvent::new(EventKind::SyncStarted, "photos"))
            .await
            .unwrap();

        assert_eq!(store.load_events().await.unwrap().len(), 1);
        let reopened = MigrationStatusTracker::open(store).await.unwrap();
        assert_eq!(reopened.events().await.len(), 1);
    }

    #[tokio::test]
    async fn timeline_is_newest_first() {
        let tracker = MigrationStatusTracker::open(Arc::new(MemoryStore::new()))
            .await
            .unwrap();
        tracker
            .record_event(MigrationEvent::new(EventKind::SyncStarted, "first"))
            .await
            .unwrap();
        tracker
            .record_event(MigrationEvent::new(EventKind::SyncCompleted, "second"))
            .await
            .unwrap();

        let timeline = tracker.timeline().await;
        assert_eq!(timeline[0].message, "second");
        assert_eq!(timeline[1].message, "first");
    }
}
