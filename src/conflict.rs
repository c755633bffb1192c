//! Conflict detection artifacts and the resolution policy.
//!
//! A conflict exists when both engines hold a row for the same key with
//! diverging payloads. Resolution is pure and total: every conflict gets a
//! winner, every decision carries its reason, and resolving the mirrored
//! conflict picks the same winning row.

use crate::db::value::{RecordKey, TableRow};
use crate::error::SyncError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How competing versions of a row are settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// The version with the larger modification timestamp wins; ties break
    /// toward the sync's primary side.
    LatestWins,
    SourceWins,
    TargetWins,
}

impl ConflictStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::LatestWins => "latest_wins",
            ConflictStrategy::SourceWins => "source_wins",
            ConflictStrategy::TargetWins => "target_wins",
        }
    }
}

impl std::fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "latest_wins" | "latest-wins" | "latest" => Ok(ConflictStrategy::LatestWins),
            "source_wins" | "source-wins" | "source" => Ok(ConflictStrategy::SourceWins),
            "target_wins" | "target-wins" | "target" => Ok(ConflictStrategy::TargetWins),
            other => Err(SyncError::Config(format!(
                "unknown conflict strategy '{other}' (expected latest_wins, source_wins or target_wins)"
            ))),
        }
    }
}

/// What kind of divergence was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Payloads differ and only one side moved inside the window.
    ValueMismatch,
    /// Both sides were modified inside the incremental window.
    ConcurrentUpdate,
    /// One side soft-deleted the row while the other updated it.
    DeleteUpdate,
}

impl ConflictType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictType::ValueMismatch => "value_mismatch",
            ConflictType::ConcurrentUpdate => "concurrent_update",
            ConflictType::DeleteUpdate => "delete_update",
        }
    }
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which engine's version of the row prevailed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Source,
    Target,
}

impl Winner {
    pub fn as_str(&self) -> &'static str {
        match self {
            Winner::Source => "source",
            Winner::Target => "target",
        }
    }

    pub fn other(&self) -> Winner {
        match self {
            Winner::Source => Winner::Target,
            Winner::Target => Winner::Source,
        }
    }
}

impl std::fmt::Display for Winner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A detected divergence between the two copies of one row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub table: String,
    pub record_id: RecordKey,
    pub conflict_type: ConflictType,
    /// The row as the source engine held it.
    pub source_version: TableRow,
    /// The row as the target engine held it.
    pub target_version: TableRow,
}

impl Conflict {
    pub fn new(
        table: impl Into<String>,
        conflict_type: ConflictType,
        source_version: TableRow,
        target_version: TableRow,
    ) -> Self {
        Conflict {
            table: table.into(),
            record_id: source_version.key.clone(),
            conflict_type,
            source_version,
            target_version,
        }
    }
}

/// A conflict together with its settled outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedConflict {
    pub conflict: Conflict,
    pub winner: Winner,
    pub strategy: ConflictStrategy,
    pub reason: String,
    pub resolved_at: DateTime<Utc>,
}

impl ResolvedConflict {
    /// The row that should end up on both engines.
    pub fn winning_row(&self) -> &TableRow {
        match self.winner {
            Winner::Source => &self.conflict.source_version,
            Winner::Target => &self.conflict.target_version,
        }
    }
}

/// Stateless resolution policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    /// Settle one conflict. `primary` is the side ties break toward, taken
    /// from the sync's declared direction.
    pub fn resolve(
        &self,
        conflict: Conflict,
        strategy: ConflictStrategy,
        primary: Winner,
    ) -> ResolvedConflict {
        let (winner, reason) = match strategy {
            ConflictStrategy::SourceWins => {
                (Winner::Source, "strategy always prefers the source".to_string())
            }
            ConflictStrategy::TargetWins => {
                (Winner::Target, "strategy always prefers the target".to_string())
            }
            ConflictStrategy::LatestWins => Self::latest(&conflict, primary),
        };

        ResolvedConflict {
            conflict,
            winner,
            strategy,
            reason,
            resolved_at: Utc::now(),
        }
    }

    fn latest(conflict: &Conflict, primary: Winner) -> (Winner, String) {
        let source_ts = conflict.source_version.modified_at;
        let target_ts = conflict.target_version.modified_at;

        match (source_ts, target_ts) {
            (Some(s), Some(t)) if s > t => {
                (Winner::Source, format!("source modified later ({s} > {t})"))
            }
            (Some(s), Some(t)) if t > s => {
                (Winner::Target, format!("target modified later ({t} > {s})"))
            }
            (Some(_), None) => (
                Winner::Source,
                "only the source carries a modification timestamp".to_string(),
            ),
            (None, Some(_)) => (
                Winner::Target,
                "only the target carries a modification timestamp".to_string(),
            ),
            _ => (
                primary,
                format!("timestamps tie; primary side ({primary}) wins"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::value::SqlValue;
    use chrono::TimeZone;

    fn row(name: &str, modified: Option<i64>) -> TableRow {
        let mut r = TableRow::new(RecordKey::Int(1))
            .with_value("id", SqlValue::Int(1))
            .with_value("name", SqlValue::Text(name.to_string()));
        if let Some(secs) = modified {
            r = r.with_modified_at(Utc.timestamp_opt(secs, 0).unwrap());
        }
        r
    }

    fn conflict(source: TableRow, target: TableRow) -> Conflict {
        Conflict::new("photos", ConflictType::ValueMismatch, source, target)
    }

    #[test]
    fn latest_wins_picks_the_newer_version_regardless_of_side() {
        let resolver = ConflictResolver;
        let newer = row("newer", Some(200));
        let older = row("older", Some(100));

        let forward = resolver.resolve(
            conflict(newer.clone(), older.clone()),
            ConflictStrategy::LatestWins,
            Winner::Source,
        );
        let mirrored = resolver.resolve(
            conflict(older, newer.clone()),
            ConflictStrategy::LatestWins,
            Winner::Source,
        );

        assert_eq!(forward.winner, Winner::Source);
        assert_eq!(mirrored.winner, Winner::Target);
        assert_eq!(forward.winning_row().values, newer.values);
        assert_eq!(mirrored.winning_row().values, newer.values);
    }

    #[test]
    fn ties_break_toward_the_primary_side() {
        let resolver = ConflictResolver;
        let same_instant = Some(500);

        let toward_source = resolver.resolve(
            conflict(row("a", same_instant), row("b", same_instant)),
            ConflictStrategy::LatestWins,
            Winner::Source,
        );
        let toward_target = resolver.resolve(
            conflict(row("a", same_instant), row("b", same_instant)),
            ConflictStrategy::LatestWins,
            Winner::Target,
        );

        assert_eq!(toward_source.winner, Winner::Source);
        assert_eq!(toward_target.winner, Winner::Target);
    }

    #[test]
    fn fixed_strategies_ignore_timestamps() {
        let resolver = ConflictResolver;
        let stale = row("stale", Some(1));
        let fresh = row("fresh", Some(999));

        let kept = resolver.resolve(
            conflict(stale.clone(), fresh),
            ConflictStrategy::SourceWins,
            Winner::Source,
        );
        assert_eq!(kept.winner, Winner::Source);
        assert_eq!(kept.winning_row().values, stale.values);
    }

    #[test]
    fn strategy_names_parse_and_render() {
        assert_eq!(
            "latest_wins".parse::<ConflictStrategy>().unwrap(),
            ConflictStrategy::LatestWins
        );
        assert_eq!(ConflictStrategy::TargetWins.to_string(), "target_wins");
        assert!("newest".parse::<ConflictStrategy>().is_err());
    }
}
