//! Recurring and one-shot synchronization schedules.
//!
//! A schedule names a set of tables, a direction, a conflict strategy and
//! an interval. Manual schedules never auto-fire; timed schedules compute
//! their next run from the moment they last ran. Executions of the same
//! schedule are serialized through an exclusivity marker: a trigger that
//! lands while a prior run is still in flight reports `Skipped` instead of
//! starting a second concurrent run.

use crate::conflict::ConflictStrategy;
use crate::context::MigrationContext;
use crate::error::{Result, SyncError};
use crate::sync::lock::LockRegistry;
use crate::sync::{DataSynchronizer, SyncDirection, SyncOpts, SyncReport};
use crate::tracker::{EventKind, MigrationEvent};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

const STATE_DOCUMENT: &str = "schedules";

/// How often a schedule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncInterval {
    /// Fired only by an explicit operator trigger.
    Manual,
    RealTime,
    Hourly,
    Daily,
    Weekly,
}

impl SyncInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncInterval::Manual => "manual",
            SyncInterval::RealTime => "real_time",
            SyncInterval::Hourly => "hourly",
            SyncInterval::Daily => "daily",
            SyncInterval::Weekly => "weekly",
        }
    }

    /// The period between runs. `None` for manual schedules.
    pub fn period(&self) -> Option<Duration> {
        match self {
            SyncInterval::Manual => None,
            SyncInterval::RealTime => Some(Duration::minutes(1)),
            SyncInterval::Hourly => Some(Duration::hours(1)),
            SyncInterval::Daily => Some(Duration::days(1)),
            SyncInterval::Weekly => Some(Duration::weeks(1)),
        }
    }

    fn next_run_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.period().map(|p| now + p)
    }
}

impl std::fmt::Display for SyncInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncInterval {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "manual" => Ok(SyncInterval::Manual),
            "real_time" | "real-time" | "realtime" => Ok(SyncInterval::RealTime),
            "hourly" => Ok(SyncInterval::Hourly),
            "daily" => Ok(SyncInterval::Daily),
            "weekly" => Ok(SyncInterval::Weekly),
            other => Err(SyncError::Config(format!(
                "unknown sync interval '{other}' (expected manual, real_time, hourly, daily or weekly)"
            ))),
        }
    }
}

/// What a schedule does when it fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub tables: Vec<String>,
    pub interval: SyncInterval,
    pub direction: SyncDirection,
    pub conflict_strategy: ConflictStrategy,
    pub enabled: bool,
}

impl ScheduleConfig {
    fn validate(&self) -> Result<()> {
        if self.tables.is_empty() {
            return Err(SyncError::Config(
                "schedule must name at least one table".into(),
            ));
        }
        Ok(())
    }
}

/// One persisted schedule. Mutated only through the scheduler's explicit
/// operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub config: ScheduleConfig,
    pub created_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    /// `None` for manual and disabled schedules.
    pub next_run: Option<DateTime<Utc>>,
}

/// Returned by [`SyncScheduler::schedule_sync`].
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleReceipt {
    pub schedule_id: String,
    pub next_run: Option<DateTime<Utc>>,
}

/// What one trigger of a schedule did.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every table ran; per-table reports attached.
    Completed { sync_reports: Vec<SyncReport> },
    /// A prior run of this schedule was still in flight. Nothing ran.
    Skipped,
}

/// Returned by [`SyncScheduler::execute_scheduled_sync`].
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledRun {
    pub schedule_id: String,
    pub executed_at: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: RunOutcome,
}

impl ScheduledRun {
    pub fn was_skipped(&self) -> bool {
        matches!(self.outcome, RunOutcome::Skipped)
    }
}

pub struct SyncScheduler {
    ctx: Arc<MigrationContext>,
    schedules: RwLock<BTreeMap<String, Schedule>>,
    /// Per-schedule in-flight markers.
    running: LockRegistry<String>,
}

impl SyncScheduler {
    /// Open the scheduler, restoring persisted schedules if any.
    pub async fn open(ctx: Arc<MigrationContext>) -> Result<Self> {
        let schedules = match ctx.tracker.store().load_document(STATE_DOCUMENT).await? {
            Some(doc) => {
                let list: Vec<Schedule> = serde_json::from_value(doc)
                    .map_err(|e| SyncError::State(format!("corrupt schedule state: {e}")))?;
                list.into_iter().map(|s| (s.id.clone(), s)).collect()
            }
            None => BTreeMap::new(),
        };
        Ok(SyncScheduler {
            ctx,
            schedules: RwLock::new(schedules),
            running: LockRegistry::new(),
        })
    }

    async fn persist(&self, schedules: &BTreeMap<String, Schedule>) -> Result<()> {
        let list: Vec<&Schedule> = schedules.values().collect();
        self.ctx
            .tracker
            .store()
            .save_document(STATE_DOCUMENT, &serde_json::to_value(list)?)
            .await
    }

    /// Register a new schedule. Timed intervals get a next-run stamp of
    /// now plus the interval; manual schedules never auto-fire.
    pub async fn schedule_sync(&self, config: ScheduleConfig) -> Result<ScheduleReceipt> {
        config.validate()?;
        let now = Utc::now();
        let next_run = if config.enabled {
            config.interval.next_run_after(now)
        } else {
            None
        };
        let schedule = Schedule {
            id: uuid::Uuid::new_v4().to_string(),
            config,
            created_at: now,
            last_run: None,
            next_run,
        };

        let mut schedules = self.schedules.write().await;
        schedules.insert(schedule.id.clone(), schedule.clone());
        self.persist(&schedules).await?;
        drop(schedules);

        self.ctx
            .tracker
            .record_event(
                MigrationEvent::new(
                    EventKind::ScheduleCreated,
                    format!(
                        "{} schedule for [{}], {}",
                        schedule.config.interval,
                        schedule.config.tables.join(", "),
                        schedule.config.direction,
                    ),
                )
                .with_metadata(serde_json::json!({
                    "schedule_id": schedule.id,
                    "next_run": schedule.next_run,
                })),
            )
            .await?;

        info!(
            "Scheduled {} sync of [{}] (id {})",
            schedule.config.interval,
            schedule.config.tables.join(", "),
            schedule.id
        );
        Ok(ScheduleReceipt {
            schedule_id: schedule.id,
            next_run: schedule.next_run,
        })
    }

    /// Replace a schedule's config, recomputing its next run.
    pub async fn update_schedule(&self, id: &str, config: ScheduleConfig) -> Result<Schedule> {
        config.validate()?;
        let mut schedules = self.schedules.write().await;
        let schedule = schedules.get_mut(id).ok_or_else(|| SyncError::UnknownId {
            kind: "schedule",
            id: id.to_string(),
        })?;
        schedule.next_run = if config.enabled {
            config.interval.next_run_after(Utc::now())
        } else {
            None
        };
        schedule.config = config;
        let updated = schedule.clone();
        self.persist(&schedules).await?;
        drop(schedules);

        self.ctx
            .tracker
            .record_event(
                MigrationEvent::new(EventKind::ScheduleUpdated, format!("schedule {id} updated"))
                    .with_metadata(serde_json::json!({"schedule_id": id})),
            )
            .await?;
        Ok(updated)
    }

    /// Enable or disable a schedule without touching the rest of its config.
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<Schedule> {
        let mut config = self.schedule(id).await?.config;
        config.enabled = enabled;
        self.update_schedule(id, config).await
    }

    pub async fn schedule(&self, id: &str) -> Result<Schedule> {
        self.schedules
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::UnknownId {
                kind: "schedule",
                id: id.to_string(),
            })
    }

    pub async fn schedules(&self) -> Vec<Schedule> {
        self.schedules.read().await.values().cloned().collect()
    }

    /// Enabled, timed schedules whose next run has arrived.
    pub async fn due_schedules(&self, now: DateTime<Utc>) -> Vec<Schedule> {
        self.schedules
            .read()
            .await
            .values()
            .filter(|s| s.config.enabled && s.next_run.is_some_and(|t| t <= now))
            .cloned()
            .collect()
    }

    /// Trigger one schedule now. Runs the synchronizer over every table the
    /// schedule names; a trigger that overlaps a still-running execution of
    /// the same schedule returns `Skipped` without touching either engine.
    pub async fn execute_scheduled_sync(&self, id: &str) -> Result<ScheduledRun> {
        let schedule = self.schedule(id).await?;
        let executed_at = Utc::now();

        let Some(_guard) = self.running.try_acquire(vec![schedule.id.clone()]) else {
            warn!("Schedule {id} is already running; skipping this trigger");
            self.ctx
                .tracker
                .record_event(
                    MigrationEvent::new(
                        EventKind::ScheduleSkipped,
                        format!("schedule {id} skipped: prior run still in flight"),
                    )
                    .with_metadata(serde_json::json!({"schedule_id": id})),
                )
                .await?;
            return Ok(ScheduledRun {
                schedule_id: schedule.id,
                executed_at,
                outcome: RunOutcome::Skipped,
            });
        };

        let opts = SyncOpts {
            conflict_strategy: schedule.config.conflict_strategy,
            ..SyncOpts::default()
        };
        let synchronizer = DataSynchronizer::with_opts(Arc::clone(&self.ctx), opts);

        let mut sync_reports = Vec::with_capacity(schedule.config.tables.len());
        for table in &schedule.config.tables {
            let report = match schedule.last_run {
                // Timed re-runs only reconcile what moved since the last one.
                Some(since) if schedule.config.direction == SyncDirection::Bidirectional => {
                    synchronizer.incremental_sync(table, since).await?
                }
                _ => {
                    synchronizer
                        .synchronize_table(table, schedule.config.direction)
                        .await?
                }
            };
            sync_reports.push(report);
        }

        let mut schedules = self.schedules.write().await;
        if let Some(schedule) = schedules.get_mut(id) {
            schedule.last_run = Some(executed_at);
            schedule.next_run = if schedule.config.enabled {
                schedule.config.interval.next_run_after(Utc::now())
            } else {
                None
            };
        }
        self.persist(&schedules).await?;
        drop(schedules);

        info!(
            "Schedule {id} ran {} table(s), {} record(s) synchronized",
            sync_reports.len(),
            sync_reports
                .iter()
                .map(|r| r.records_synchronized)
                .sum::<u64>()
        );
        Ok(ScheduledRun {
            schedule_id: schedule.id,
            executed_at,
            outcome: RunOutcome::Completed { sync_reports },
        })
    }
}
