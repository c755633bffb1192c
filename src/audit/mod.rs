//! Read-only consistency auditing between the two engines.
//!
//! Auditing never writes and never resolves anything: it walks both sides
//! of a table by primary key, compares payloads under cross-engine
//! equivalence, and reports what diverged. Fixing divergence is the
//! synchronizer's job.

pub mod schema_diff;

pub use schema_diff::{SchemaComparison, SchemaDifference};

use crate::context::MigrationContext;
use crate::convert::values_equivalent;
use crate::db::value::{RecordKey, SqlValue, TableRow};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// One record-level divergence found by an audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discrepancy {
    MissingInTarget {
        record_id: RecordKey,
    },
    MissingInSource {
        record_id: RecordKey,
    },
    /// Payloads differ; `column` is the first differing column.
    ValueMismatch {
        record_id: RecordKey,
        column: String,
        source_value: String,
        target_value: String,
    },
}

impl Discrepancy {
    pub fn record_id(&self) -> &RecordKey {
        match self {
            Discrepancy::MissingInTarget { record_id }
            | Discrepancy::MissingInSource { record_id }
            | Discrepancy::ValueMismatch { record_id, .. } => record_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Discrepancy::MissingInTarget { .. } => "missing_in_target",
            Discrepancy::MissingInSource { .. } => "missing_in_source",
            Discrepancy::ValueMismatch { .. } => "value_mismatch",
        }
    }
}

/// Verdict for one table's data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConsistency {
    pub table: String,
    pub is_consistent: bool,
    pub source_count: i64,
    pub target_count: i64,
    pub discrepancies: Vec<Discrepancy>,
    pub checked_at: DateTime<Utc>,
}

/// Data audit across a set of tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub tables: Vec<TableConsistency>,
    pub is_consistent: bool,
    pub summary: String,
    pub recommendations: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Combined data and schema audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub data: ConsistencyReport,
    pub schemas: Vec<SchemaComparison>,
    pub summary: String,
    pub generated_at: DateTime<Utc>,
}

pub struct ConsistencyChecker {
    ctx: Arc<MigrationContext>,
}

impl ConsistencyChecker {
    pub fn new(ctx: Arc<MigrationContext>) -> Self {
        ConsistencyChecker { ctx }
    }

    /// Count and compare one table's rows on both sides.
    ///
    /// Safe to call during an active sync; the result is a best-effort
    /// snapshot, not a barrier.
    pub async fn check_table_consistency(&self, table: &str) -> Result<TableConsistency> {
        let source_count = self.ctx.source.count_rows(table).await?;
        let target_count = self.ctx.target.count_rows(table).await?;

        let source_rows = index_rows(self.ctx.source.fetch_rows(table).await?);
        let target_rows = index_rows(self.ctx.target.fetch_rows(table).await?);

        let mut discrepancies = Vec::new();
        for (key, source_row) in &source_rows {
            match target_rows.get(key) {
                None => discrepancies.push(Discrepancy::MissingInTarget {
                    record_id: key.clone(),
                }),
                Some(target_row) => {
                    if let Some((column, source_value, target_value)) =
                        first_divergent_column(source_row, target_row)
                    {
                        discrepancies.push(Discrepancy::ValueMismatch {
                            record_id: key.clone(),
                            column,
                            source_value,
                            target_value,
                        });
                    }
                }
            }
        }
        for key in target_rows.keys() {
            if !source_rows.contains_key(key) {
                discrepancies.push(Discrepancy::MissingInSource {
                    record_id: key.clone(),
                });
            }
        }

        let is_consistent = source_count == target_count && discrepancies.is_empty();
        debug!(
            "Consistency of '{table}': {source_count} source rows, {target_count} target rows, {} discrepancies",
            discrepancies.len()
        );

        Ok(TableConsistency {
            table: table.to_string(),
            is_consistent,
            source_count,
            target_count,
            discrepancies,
            checked_at: Utc::now(),
        })
    }

    /// Audit every listed table and aggregate the verdicts.
    pub async fn validate_all_tables(&self, tables: &[String]) -> Result<ConsistencyReport> {
        let mut results = Vec::with_capacity(tables.len());
        for table in tables {
            results.push(self.check_table_consistency(table).await?);
        }

        let consistent_tables = results.iter().filter(|t| t.is_consistent).count();
        let total_discrepancies: usize = results.iter().map(|t| t.discrepancies.len()).sum();
        let is_consistent = consistent_tables == results.len();

        let summary = format!(
            "{consistent_tables}/{} tables consistent, {total_discrepancies} discrepancies",
            results.len()
        );
        info!("Consistency audit: {summary}");

        Ok(ConsistencyReport {
            recommendations: recommend(&results),
            tables: results,
            is_consistent,
            summary,
            generated_at: Utc::now(),
        })
    }

    /// Judge whether the target table's declared columns can hold the
    /// source table's data after conversion.
    pub async fn compare_table_schemas(&self, table: &str) -> Result<SchemaComparison> {
        let source_columns = self.ctx.source.fetch_columns(table).await?;
        let target_columns = self.ctx.target.fetch_columns(table).await?;
        schema_diff::compare_columns(table, &self.ctx.converter, &source_columns, &target_columns)
    }

    /// Full audit: data consistency plus schema compatibility per table.
    pub async fn generate_comparison_report(
        &self,
        tables: &[String],
    ) -> Result<ComparisonReport> {
        let data = self.validate_all_tables(tables).await?;
        let mut schemas = Vec::with_capacity(tables.len());
        for table in tables {
            schemas.push(self.compare_table_schemas(table).await?);
        }

        let compatible = schemas.iter().filter(|s| s.is_compatible).count();
        let summary = format!(
            "data: {}; schema: {compatible}/{} tables compatible",
            data.summary,
            schemas.len()
        );

        Ok(ComparisonReport {
            data,
            schemas,
            summary,
            generated_at: Utc::now(),
        })
    }
}

fn index_rows(rows: Vec<TableRow>) -> BTreeMap<RecordKey, TableRow> {
    rows.into_iter().map(|r| (r.key.clone(), r)).collect()
}

/// First column whose values are not equivalent across engines, with both
/// values rendered for the report. Compares the union of both column sets;
/// a column missing on one side mismatches unless the other side holds NULL.
fn first_divergent_column(source: &TableRow, target: &TableRow) -> Option<(String, String, String)> {
    let columns: std::collections::BTreeSet<&String> =
        source.values.keys().chain(target.values.keys()).collect();
    for column in columns {
        let source_value = source.values.get(column);
        let target_value = target.values.get(column);
        let equivalent = match (source_value, target_value) {
            (Some(a), Some(b)) => values_equivalent(a, b),
            (Some(v), None) | (None, Some(v)) => v.is_null(),
            (None, None) => true,
        };
        if !equivalent {
            return Some((
                column.clone(),
                render(source_value),
                render(target_value),
            ));
        }
    }
    None
}

fn render(value: Option<&SqlValue>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "<absent>".to_string(),
    }
}

fn recommend(results: &[TableConsistency]) -> Vec<String> {
    let mut recommendations = Vec::new();
    for table in results {
        if table.is_consistent {
            continue;
        }
        let missing_in_target = table
            .discrepancies
            .iter()
            .filter(|d| matches!(d, Discrepancy::MissingInTarget { .. }))
            .count();
        let missing_in_source = table
            .discrepancies
            .iter()
            .filter(|d| matches!(d, Discrepancy::MissingInSource { .. }))
            .count();
        let mismatches = table
            .discrepancies
            .iter()
            .filter(|d| matches!(d, Discrepancy::ValueMismatch { .. }))
            .count();

        if missing_in_target > 0 {
            recommendations.push(format!(
                "Run a source_to_target sync of '{}' to backfill {missing_in_target} missing records",
                table.table
            ));
        }
        if missing_in_source > 0 {
            recommendations.push(format!(
                "Run a target_to_source sync of '{}' to recover {missing_in_source} records only the target holds",
                table.table
            ));
        }
        if mismatches > 0 {
            recommendations.push(format!(
                "Run a bidirectional sync of '{}' to reconcile {mismatches} divergent records",
                table.table
            ));
        }
        if table.source_count != table.target_count && table.discrepancies.is_empty() {
            recommendations.push(format!(
                "Row counts of '{}' differ ({} vs {}) with no keyed discrepancies; check for rows without primary keys",
                table.table, table.source_count, table.target_count
            ));
        }
    }
    recommendations
}
