//! Column-level schema compatibility between the engines.
//!
//! Compatibility is judged through the converter's mapping table: a target
//! column is acceptable when its declared type can hold what the mapped
//! source type produces. Plain string equality of type names would reject
//! harmless widenings and accept hollow ones.

use crate::convert::{OracleType, PgType, TypeConverter};
use crate::db::ColumnInfo;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One structural difference between a source table and its target copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaDifference {
    /// The target table lacks a column the source has.
    MissingColumn { column: String, expected: String },
    /// The target table carries a column the source does not have.
    UnexpectedColumn { column: String, found: String },
    /// The target column's declared type cannot hold the mapped source type.
    IncompatibleType {
        column: String,
        expected: String,
        found: String,
    },
    /// The source column's type has no mapping at all.
    UnsupportedSource { column: String, source_type: String },
}

impl SchemaDifference {
    pub fn column(&self) -> &str {
        match self {
            SchemaDifference::MissingColumn { column, .. }
            | SchemaDifference::UnexpectedColumn { column, .. }
            | SchemaDifference::IncompatibleType { column, .. }
            | SchemaDifference::UnsupportedSource { column, .. } => column,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            SchemaDifference::MissingColumn { column, expected } => {
                format!("column '{column}' is missing on the target (expected {expected})")
            }
            SchemaDifference::UnexpectedColumn { column, found } => {
                format!("target column '{column}' ({found}) has no source counterpart")
            }
            SchemaDifference::IncompatibleType {
                column,
                expected,
                found,
            } => {
                format!("column '{column}' is declared {found} on the target but needs {expected}")
            }
            SchemaDifference::UnsupportedSource {
                column,
                source_type,
            } => {
                format!("source column '{column}' has unmappable type {source_type}")
            }
        }
    }
}

/// Verdict for one table's schema pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaComparison {
    pub table: String,
    pub is_compatible: bool,
    pub differences: Vec<SchemaDifference>,
}

/// Compare a source column set against the target's declared columns.
///
/// Column names match case-insensitively; Oracle catalogs report them
/// uppercased.
pub fn compare_columns(
    table: &str,
    converter: &TypeConverter,
    source_columns: &[ColumnInfo],
    target_columns: &[ColumnInfo],
) -> Result<SchemaComparison> {
    let mut differences = Vec::new();

    let target_by_name: BTreeMap<String, &ColumnInfo> = target_columns
        .iter()
        .map(|c| (c.name.to_lowercase(), c))
        .collect();
    let source_names: BTreeMap<String, ()> = source_columns
        .iter()
        .map(|c| (c.name.to_lowercase(), ()))
        .collect();

    for column in source_columns {
        let source_type = match PgType::parse(&column.data_type) {
            Ok(ty) => ty,
            Err(_) => {
                differences.push(SchemaDifference::UnsupportedSource {
                    column: column.name.clone(),
                    source_type: column.data_type.clone(),
                });
                continue;
            }
        };
        let mapping = converter.convert_type(table, &column.name, &source_type)?;

        match target_by_name.get(&column.name.to_lowercase()) {
            None => differences.push(SchemaDifference::MissingColumn {
                column: column.name.clone(),
                expected: mapping.target_type.as_str(),
            }),
            Some(target) => match OracleType::parse(&target.data_type) {
                Ok(declared) if mapping.target_type.accepts(&declared) => {}
                Ok(_) | Err(_) => differences.push(SchemaDifference::IncompatibleType {
                    column: column.name.clone(),
                    expected: mapping.target_type.as_str(),
                    found: target.data_type.clone(),
                }),
            },
        }
    }

    for column in target_columns {
        if !source_names.contains_key(&column.name.to_lowercase()) {
            differences.push(SchemaDifference::UnexpectedColumn {
                column: column.name.clone(),
                found: column.data_type.clone(),
            });
        }
    }

    Ok(SchemaComparison {
        table: table.to_string(),
        is_compatible: differences.is_empty(),
        differences,
    })
}
