//! Active-environment management for the cutover.
//!
//! Exactly one engine is "active" (serving the application) at any moment.
//! Switching is health-gated and every successful flip bumps a generation
//! token; long-running syncs read the token at batch start and abandon the
//! run when a flip happens under them.

use crate::db::{DatabaseHandle, EngineKind};
use crate::error::{Result, SyncError};
use crate::tracker::{EventKind, MigrationEvent, MigrationStatusTracker};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

const STATE_DOCUMENT: &str = "environment";

/// Which engine serves traffic, and how we got here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentState {
    pub active: EngineKind,
    pub previous: Option<EngineKind>,
    pub switched_at: Option<DateTime<Utc>>,
    /// Bumped on every successful switch.
    pub generation: u64,
}

impl Default for EnvironmentState {
    fn default() -> Self {
        EnvironmentState {
            active: EngineKind::Postgres,
            previous: None,
            switched_at: None,
            generation: 0,
        }
    }
}

/// Result of a switch request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchOutcome {
    pub previous: EngineKind,
    pub target: EngineKind,
    pub switched_at: DateTime<Utc>,
    /// True when the requested engine was already active; nothing changed.
    pub already_active: bool,
}

pub struct EnvironmentSwitcher {
    source: Arc<dyn DatabaseHandle>,
    target: Arc<dyn DatabaseHandle>,
    tracker: Arc<MigrationStatusTracker>,
    state: RwLock<EnvironmentState>,
}

impl EnvironmentSwitcher {
    /// Open the switcher, restoring persisted state if any.
    pub async fn open(
        source: Arc<dyn DatabaseHandle>,
        target: Arc<dyn DatabaseHandle>,
        tracker: Arc<MigrationStatusTracker>,
    ) -> Result<Self> {
        let state = match tracker.store().load_document(STATE_DOCUMENT).await? {
            Some(doc) => serde_json::from_value(doc)
                .map_err(|e| SyncError::State(format!("corrupt environment state: {e}")))?,
            None => EnvironmentState::default(),
        };
        Ok(EnvironmentSwitcher {
            source,
            target,
            tracker,
            state: RwLock::new(state),
        })
    }

    pub async fn current_environment(&self) -> EnvironmentState {
        self.state.read().await.clone()
    }

    /// The generation token as of now.
    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    /// The handle serving the given engine.
    pub fn handle_for(&self, engine: EngineKind) -> Arc<dyn DatabaseHandle> {
        if self.source.engine() == engine {
            Arc::clone(&self.source)
        } else {
            Arc::clone(&self.target)
        }
    }

    /// Probe the engine we would switch to.
    pub async fn validate_environment(&self, engine: EngineKind) -> bool {
        let report = self.handle_for(engine).health_check().await;
        if !report.is_healthy {
            warn!("Environment {engine} failed validation: {}", report.details);
        }
        report.is_healthy
    }

    /// Switch the active environment. Refused when the target engine fails
    /// its health probe; switching to the already-active engine is a no-op
    /// reported as success.
    pub async fn switch_to(&self, engine: EngineKind) -> Result<SwitchOutcome> {
        {
            let state = self.state.read().await;
            if state.active == engine {
                info!("Environment {engine} already active; nothing to do");
                return Ok(SwitchOutcome {
                    previous: engine,
                    target: engine,
                    switched_at: state.switched_at.unwrap_or_else(Utc::now),
                    already_active: true,
                });
            }
        }

        let report = self.handle_for(engine).health_check().await;
        if !report.is_healthy {
            return Err(SyncError::Validation(format!(
                "refusing to switch to {engine}: {}",
                report.details
            )));
        }

        let mut state = self.state.write().await;
        // Re-check under the write lock; a concurrent call may have flipped.
        if state.active == engine {
            return Ok(SwitchOutcome {
                previous: engine,
                target: engine,
                switched_at: state.switched_at.unwrap_or_else(Utc::now),
                already_active: true,
            });
        }

        let previous = state.active;
        let switched_at = Utc::now();
        state.previous = Some(previous);
        state.active = engine;
        state.switched_at = Some(switched_at);
        state.generation += 1;

        self.tracker
            .store()
            .save_document(STATE_DOCUMENT, &serde_json::to_value(&*state)?)
            .await?;

        let generation = state.generation;
        drop(state);

        self.tracker
            .record_event(
                MigrationEvent::new(
                    EventKind::EnvironmentSwitched,
                    format!("active environment switched from {previous} to {engine}"),
                )
                .with_metadata(serde_json::json!({
                    "from": previous.as_str(),
                    "to": engine.as_str(),
                    "generation": generation,
                })),
            )
            .await?;

        info!("Active environment is now {engine} (generation {generation})");

        Ok(SwitchOutcome {
            previous,
            target: engine,
            switched_at,
            already_active: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryHandle;
    use crate::tracker::MemoryStore;

    async fn switcher() -> (Arc<MemoryHandle>, Arc<MemoryHandle>, EnvironmentSwitcher) {
        let source = Arc::new(MemoryHandle::new(EngineKind::Postgres));
        let target = Arc::new(MemoryHandle::new(EngineKind::Oracle));
        let tracker = Arc::new(
            MigrationStatusTracker::open(Arc::new(MemoryStore::new()))
                .await
                .unwrap(),
        );
        let switcher = EnvironmentSwitcher::open(
            source.clone() as Arc<dyn DatabaseHandle>,
            target.clone() as Arc<dyn DatabaseHandle>,
            tracker,
        )
        .await
        .unwrap();
        (source, target, switcher)
    }

    #[tokio::test]
    async fn switch_flips_state_and_bumps_generation() {
        let (_, _, switcher) = switcher().await;
        assert_eq!(switcher.generation().await, 0);

        let outcome = switcher.switch_to(EngineKind::Oracle).await.unwrap();
        assert!(!outcome.already_active);
        assert_eq!(outcome.previous, EngineKind::Postgres);

        let state = switcher.current_environment().await;
        assert_eq!(state.active, EngineKind::Oracle);
        assert_eq!(state.previous, Some(EngineKind::Postgres));
        assert_eq!(state.generation, 1);
    }

    #[tokio::test]
    async fn switching_to_active_engine_is_a_reported_noop() {
        let (_, _, switcher) = switcher().await;
        let outcome = switcher.switch_to(EngineKind::Postgres).await.unwrap();
        assert!(outcome.already_active);
        assert_eq!(switcher.generation().await, 0);
    }

    #[tokio::test]
    async fn unhealthy_target_refuses_the_switch() {
        let (_, target, switcher) = switcher().await;
        target.set_healthy(false);

        let err = switcher.switch_to(EngineKind::Oracle).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        assert_eq!(
            switcher.current_environment().await.active,
            EngineKind::Postgres
        );
    }

    #[tokio::test]
    async fn state_survives_reopen_through_the_store() {
        let source = Arc::new(MemoryHandle::new(EngineKind::Postgres));
        let target = Arc::new(MemoryHandle::new(EngineKind::Oracle));
        let store = Arc::new(MemoryStore::new());
        let tracker = Arc::new(MigrationStatusTracker::open(store.clone()).await.unwrap());

        let switcher = EnvironmentSwitcher::open(
            source.clone() as Arc<dyn DatabaseHandle>,
            target.clone() as Arc<dyn DatabaseHandle>,
            tracker,
        )
        .await
        .unwrap();
        switcher.switch_to(EngineKind::Oracle).await.unwrap();

        let tracker = Arc::new(MigrationStatusTracker::open(store).await.unwrap());
        let reopened = EnvironmentSwitcher::open(source, target, tracker)
            .await
            .unwrap();
        let state = reopened.current_environment().await;
        assert_eq!(state.active, EngineKind::Oracle);
        assert_eq!(state.generation, 1);
    }
}
