//! oracle-sync Library
//!
//! A library for migrating and synchronizing PostgreSQL data to Oracle
//! during a staged cutover, keeping both engines consistent while the
//! cutover is in progress.
//!
//! # Features
//!
//! - Type reconciliation: pure PostgreSQL-to-Oracle column and value
//!   conversion, including generated sequence/trigger DDL
//! - Full and incremental synchronization: one-way or bidirectional, with
//!   deterministic conflict resolution
//! - Consistency auditing: read-only row-count, content and schema
//!   comparison between the two engines
//! - Phase orchestration: a dependency-ordered migration plan with
//!   checkpoints, bounded parallel execution and progress tracking
//! - Cutover: a health-gated flip of the active environment
//! - Scheduling: persisted recurring sync jobs with overlap deduplication
//!
//! # CLI Usage
//!
//! ```bash
//! # Full sync of one table into Oracle
//! oracle-sync sync --table projects --direction source_to_target
//!
//! # Reconcile both sides using rows changed since a watermark
//! oracle-sync sync --table projects --incremental-from "2024-01-01T00:00:00Z"
//!
//! # Audit consistency of a set of tables
//! oracle-sync audit --tables projects,users
//!
//! # Run the migration plan
//! oracle-sync phase run --id projects-full
//!
//! # Flip the active environment once the plan completes
//! oracle-sync environment switch --target oracle
//! ```

pub mod audit;
pub mod checkpoint;
pub mod conflict;
pub mod context;
pub mod convert;
pub mod db;
pub mod environment;
pub mod error;
pub mod parallel;
pub mod phase;
pub mod scheduler;
pub mod sync;
pub mod testing;
pub mod tracker;

pub use audit::ConsistencyChecker;
pub use checkpoint::CheckpointValidator;
pub use conflict::{ConflictResolver, ConflictStrategy};
pub use context::MigrationContext;
pub use convert::{ConverterConfig, TypeConverter};
pub use environment::EnvironmentSwitcher;
pub use error::{Result, SyncError};
pub use parallel::ParallelExecutionManager;
pub use phase::PhaseManager;
pub use scheduler::SyncScheduler;
pub use sync::{DataSynchronizer, SyncDirection};
pub use tracker::MigrationStatusTracker;
