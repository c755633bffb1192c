//! Engine-neutral value and row types.
//!
//! Rows read from either engine are represented as maps of [`SqlValue`] so
//! that the synchronizer, the converter, and the auditors can operate on one
//! representation regardless of which driver produced the row.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single column value as read from or written to an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Arbitrary-precision numeric carried as its canonical decimal string.
    Numeric(String),
    Text(String),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Uuid(uuid::Uuid),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
}

impl SqlValue {
    /// Short type label used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Int(_) => "int",
            SqlValue::Float(_) => "float",
            SqlValue::Numeric(_) => "numeric",
            SqlValue::Text(_) => "text",
            SqlValue::Timestamp(_) => "timestamp",
            SqlValue::Date(_) => "date",
            SqlValue::Uuid(_) => "uuid",
            SqlValue::Json(_) => "json",
            SqlValue::Bytes(_) => "bytes",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl std::fmt::Display for SqlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Bool(b) => write!(f, "{b}"),
            SqlValue::Int(i) => write!(f, "{i}"),
            SqlValue::Float(x) => write!(f, "{x}"),
            SqlValue::Numeric(s) => f.write_str(s),
            SqlValue::Text(s) => f.write_str(s),
            SqlValue::Timestamp(ts) => f.write_str(&ts.to_rfc3339()),
            SqlValue::Date(d) => write!(f, "{d}"),
            SqlValue::Uuid(u) => write!(f, "{u}"),
            SqlValue::Json(v) => write!(f, "{v}"),
            SqlValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// Primary key of a row, canonicalized across engines.
///
/// Mirrors the key shapes both engines actually use in this system:
/// integer surrogate keys, UUID keys, and string natural keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordKey {
    Int(i64),
    Uuid(uuid::Uuid),
    Text(String),
}

impl RecordKey {
    /// Build a key from an already-extracted column value.
    ///
    /// UUID keys are case-normalized so that the same record read from the
    /// source (lowercase uuid) and the target (uppercase CHAR(36)) keys
    /// identically.
    pub fn from_value(value: &SqlValue) -> Option<RecordKey> {
        match value {
            SqlValue::Int(i) => Some(RecordKey::Int(*i)),
            SqlValue::Uuid(u) => Some(RecordKey::Uuid(*u)),
            SqlValue::Text(s) => {
                if let Ok(u) = uuid::Uuid::parse_str(s) {
                    Some(RecordKey::Uuid(u))
                } else {
                    Some(RecordKey::Text(s.clone()))
                }
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKey::Int(i) => write!(f, "{i}"),
            RecordKey::Uuid(u) => write!(f, "{u}"),
            RecordKey::Text(s) => f.write_str(s),
        }
    }
}

/// One row of a table, keyed by primary key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub key: RecordKey,
    pub values: BTreeMap<String, SqlValue>,
    /// Last-modified timestamp extracted from the row's audit column, when present.
    pub modified_at: Option<DateTime<Utc>>,
}

impl TableRow {
    pub fn new(key: RecordKey) -> Self {
        TableRow {
            key,
            values: BTreeMap::new(),
            modified_at: None,
        }
    }

    pub fn with_value(mut self, column: impl Into<String>, value: SqlValue) -> Self {
        self.values.insert(column.into(), value);
        self
    }

    pub fn with_modified_at(mut self, ts: DateTime<Utc>) -> Self {
        self.modified_at = Some(ts);
        self
    }

    /// Whether the row carries a non-null soft-delete marker.
    pub fn is_tombstone(&self) -> bool {
        matches!(
            self.values.get("deleted_at"),
            Some(v) if !v.is_null()
        )
    }
}
