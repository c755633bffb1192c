//! Value-level conversion between the two type systems.

use super::{OracleType, PgType, TypeConverter};
use crate::db::value::{SqlValue, TableRow};
use crate::error::{Result, SyncError};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;

/// Outcome of converting one value toward the target engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedValue {
    pub value: SqlValue,
    /// The type the value now conforms to. May be upgraded from the
    /// requested target (long text moves to CLOB).
    pub target_type: OracleType,
    pub notes: Vec<String>,
}

impl ConvertedValue {
    fn plain(value: SqlValue, target_type: OracleType) -> Self {
        ConvertedValue {
            value,
            target_type,
            notes: Vec::new(),
        }
    }
}

/// Outcome of converting a target-engine value back to source form.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoredValue {
    pub value: SqlValue,
    pub source_type: PgType,
}

impl TypeConverter {
    /// Convert one value from `source` form into `target` form.
    ///
    /// NULL passes through untouched; column nullability is the schema's
    /// concern, not the converter's.
    pub fn convert_value(
        &self,
        value: &SqlValue,
        source: &PgType,
        target: &OracleType,
    ) -> Result<ConvertedValue> {
        if value.is_null() {
            return Ok(ConvertedValue::plain(SqlValue::Null, target.clone()));
        }

        match source {
            PgType::Uuid => {
                let parsed = match value {
                    SqlValue::Uuid(u) => *u,
                    SqlValue::Text(s) => uuid::Uuid::parse_str(s).map_err(|_| {
                        SyncError::Validation(format!("'{s}' is not a valid UUID"))
                    })?,
                    other => return Err(bad_value(other, source)),
                };
                let formatted = parsed.to_string().to_uppercase();
                Ok(ConvertedValue::plain(
                    SqlValue::Text(formatted),
                    OracleType::Char(36),
                ))
            }
            PgType::Json | PgType::Jsonb => {
                let json = match value {
                    SqlValue::Json(v) => v.clone(),
                    SqlValue::Text(s) => serde_json::from_str(s).map_err(|e| {
                        SyncError::Validation(format!("invalid JSON value: {e}"))
                    })?,
                    other => return Err(bad_value(other, source)),
                };
                if *target == OracleType::Json {
                    Ok(ConvertedValue::plain(SqlValue::Json(json), OracleType::Json))
                } else {
                    // Canonical serialization so both sides compare equal.
                    let text = serde_json::to_string(&json)?;
                    Ok(ConvertedValue::plain(SqlValue::Text(text), OracleType::Clob))
                }
            }
            PgType::Serial
            | PgType::BigSerial
            | PgType::SmallInt
            | PgType::Integer
            | PgType::BigInt => match value {
                SqlValue::Int(i) => Ok(ConvertedValue::plain(SqlValue::Int(*i), target.clone())),
                other => Err(bad_value(other, source)),
            },
            PgType::Boolean => {
                let bit = match value {
                    SqlValue::Bool(b) => i64::from(*b),
                    SqlValue::Int(0) => 0,
                    SqlValue::Int(1) => 1,
                    SqlValue::Text(s) if s.eq_ignore_ascii_case("true") => 1,
                    SqlValue::Text(s) if s.eq_ignore_ascii_case("false") => 0,
                    other => return Err(bad_value(other, source)),
                };
                Ok(ConvertedValue::plain(
                    SqlValue::Int(bit),
                    OracleType::Number(Some((1, 0))),
                ))
            }
            PgType::TimestampTz | PgType::Timestamp => {
                let ts = match value {
                    SqlValue::Timestamp(ts) => *ts,
                    SqlValue::Text(s) => DateTime::parse_from_rfc3339(s)
                        .map(|dt| dt.with_timezone(&Utc))
                        .map_err(|e| {
                            SyncError::Validation(format!("invalid timestamp '{s}': {e}"))
                        })?,
                    other => return Err(bad_value(other, source)),
                };
                let mut out =
                    ConvertedValue::plain(SqlValue::Timestamp(ts), OracleType::Timestamp);
                if *source == PgType::TimestampTz {
                    out.notes
                        .push("timestamp normalized to UTC; original offset dropped".to_string());
                }
                Ok(out)
            }
            PgType::Date => match value {
                SqlValue::Date(d) => Ok(ConvertedValue::plain(SqlValue::Date(*d), OracleType::Date)),
                SqlValue::Text(s) => {
                    let d = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| {
                        SyncError::Validation(format!("invalid date '{s}': {e}"))
                    })?;
                    Ok(ConvertedValue::plain(SqlValue::Date(d), OracleType::Date))
                }
                other => Err(bad_value(other, source)),
            },
            PgType::Text | PgType::Varchar(_) | PgType::Char(_) => {
                let SqlValue::Text(s) = value else {
                    return Err(bad_value(value, source));
                };
                let len = s.chars().count();
                let declared_cap = match target {
                    OracleType::Varchar2(n) => Some(*n as usize),
                    OracleType::Char(n) => Some(*n as usize),
                    _ => None,
                };
                let over_threshold = len > self.config().text_clob_threshold;
                let over_declared = declared_cap.is_some_and(|cap| len > cap);
                if over_threshold || over_declared || *target == OracleType::Clob {
                    let mut out =
                        ConvertedValue::plain(SqlValue::Text(s.clone()), OracleType::Clob);
                    if over_threshold || over_declared {
                        out.notes.push(format!(
                            "{len}-character text value stored as CLOB"
                        ));
                    }
                    Ok(out)
                } else {
                    Ok(ConvertedValue::plain(
                        SqlValue::Text(s.clone()),
                        target.clone(),
                    ))
                }
            }
            PgType::Numeric(_) => match value {
                SqlValue::Numeric(s) => Ok(ConvertedValue::plain(
                    SqlValue::Numeric(s.clone()),
                    target.clone(),
                )),
                SqlValue::Int(i) => Ok(ConvertedValue::plain(SqlValue::Int(*i), target.clone())),
                SqlValue::Float(f) => {
                    Ok(ConvertedValue::plain(SqlValue::Float(*f), target.clone()))
                }
                other => Err(bad_value(other, source)),
            },
            PgType::Real | PgType::DoublePrecision => match value {
                SqlValue::Float(f) => Ok(ConvertedValue::plain(SqlValue::Float(*f), target.clone())),
                SqlValue::Int(i) => {
                    Ok(ConvertedValue::plain(SqlValue::Float(*i as f64), target.clone()))
                }
                other => Err(bad_value(other, source)),
            },
            PgType::Bytea => match value {
                SqlValue::Bytes(b) => Ok(ConvertedValue::plain(
                    SqlValue::Bytes(b.clone()),
                    OracleType::Blob,
                )),
                other => Err(bad_value(other, source)),
            },
        }
    }

    /// Convert a target-engine value back into source form.
    pub fn reverse_convert(
        &self,
        value: &SqlValue,
        target: &OracleType,
        source: &PgType,
    ) -> Result<RestoredValue> {
        if !self.is_reversible(source, target) {
            return Err(SyncError::Validation(format!(
                "conversion {source} -> {target} is not reversible"
            )));
        }
        if value.is_null() {
            return Ok(RestoredValue {
                value: SqlValue::Null,
                source_type: source.clone(),
            });
        }

        let restored = match source {
            PgType::Uuid => match value {
                SqlValue::Uuid(u) => SqlValue::Uuid(*u),
                SqlValue::Text(s) => SqlValue::Uuid(uuid::Uuid::parse_str(s.trim()).map_err(
                    |_| SyncError::Validation(format!("'{s}' is not a valid UUID")),
                )?),
                other => return Err(bad_value(other, source)),
            },
            PgType::Boolean => match value {
                SqlValue::Bool(b) => SqlValue::Bool(*b),
                SqlValue::Int(0) => SqlValue::Bool(false),
                SqlValue::Int(1) => SqlValue::Bool(true),
                SqlValue::Numeric(s) if s == "0" => SqlValue::Bool(false),
                SqlValue::Numeric(s) if s == "1" => SqlValue::Bool(true),
                other => return Err(bad_value(other, source)),
            },
            PgType::Json | PgType::Jsonb => match value {
                SqlValue::Json(v) => SqlValue::Json(v.clone()),
                SqlValue::Text(s) => SqlValue::Json(serde_json::from_str(s).map_err(|e| {
                    SyncError::Validation(format!("invalid JSON value: {e}"))
                })?),
                other => return Err(bad_value(other, source)),
            },
            PgType::TimestampTz | PgType::Timestamp => match value {
                SqlValue::Timestamp(ts) => SqlValue::Timestamp(*ts),
                SqlValue::Text(s) => DateTime::parse_from_rfc3339(s)
                    .map(|dt| SqlValue::Timestamp(dt.with_timezone(&Utc)))
                    .map_err(|e| SyncError::Validation(format!("invalid timestamp '{s}': {e}")))?,
                other => return Err(bad_value(other, source)),
            },
            PgType::Serial
            | PgType::BigSerial
            | PgType::SmallInt
            | PgType::Integer
            | PgType::BigInt => match value {
                SqlValue::Int(i) => SqlValue::Int(*i),
                SqlValue::Numeric(s) => SqlValue::Int(s.parse::<i64>().map_err(|_| {
                    SyncError::Validation(format!("'{s}' is not an integer"))
                })?),
                other => return Err(bad_value(other, source)),
            },
            PgType::Numeric(_) => match value {
                SqlValue::Numeric(s) => SqlValue::Numeric(s.clone()),
                SqlValue::Int(i) => SqlValue::Int(*i),
                SqlValue::Float(f) => SqlValue::Float(*f),
                other => return Err(bad_value(other, source)),
            },
            PgType::Real | PgType::DoublePrecision => match value {
                SqlValue::Float(f) => SqlValue::Float(*f),
                SqlValue::Int(i) => SqlValue::Float(*i as f64),
                other => return Err(bad_value(other, source)),
            },
            PgType::Text | PgType::Varchar(_) | PgType::Char(_) => match value {
                SqlValue::Text(s) => SqlValue::Text(s.clone()),
                other => return Err(bad_value(other, source)),
            },
            PgType::Date => match value {
                SqlValue::Date(d) => SqlValue::Date(*d),
                other => return Err(bad_value(other, source)),
            },
            PgType::Bytea => match value {
                SqlValue::Bytes(b) => SqlValue::Bytes(b.clone()),
                other => return Err(bad_value(other, source)),
            },
        };

        Ok(RestoredValue {
            value: restored,
            source_type: source.clone(),
        })
    }

    /// Convert a whole row toward the target engine. Columns without a
    /// known type pass through unchanged; the primary key and modified
    /// timestamp survive conversion untouched.
    pub fn convert_row(
        &self,
        table: &str,
        column_types: &BTreeMap<String, PgType>,
        row: &TableRow,
    ) -> Result<TableRow> {
        let mut values = BTreeMap::new();
        for (column, value) in &row.values {
            let converted = match column_types.get(column) {
                Some(source) => {
                    let target = self.convert_type(table, column, source)?.target_type;
                    self.convert_value(value, source, &target)?.value
                }
                None => value.clone(),
            };
            values.insert(column.clone(), converted);
        }
        Ok(TableRow {
            key: row.key.clone(),
            values,
            modified_at: row.modified_at,
        })
    }

    /// Convert a whole row back into source form.
    pub fn restore_row(
        &self,
        table: &str,
        column_types: &BTreeMap<String, PgType>,
        row: &TableRow,
    ) -> Result<TableRow> {
        let mut values = BTreeMap::new();
        for (column, value) in &row.values {
            let restored = match column_types.get(column) {
                Some(source) => {
                    let target = self.convert_type(table, column, source)?.target_type;
                    self.reverse_convert(value, &target, source)?.value
                }
                None => value.clone(),
            };
            values.insert(column.clone(), restored);
        }
        Ok(TableRow {
            key: row.key.clone(),
            values,
            modified_at: row.modified_at,
        })
    }
}

fn bad_value(value: &SqlValue, source: &PgType) -> SyncError {
    SyncError::Validation(format!(
        "cannot convert {} value for a {source} column",
        value.type_name()
    ))
}

/// Translate a default-value token to its target-engine spelling.
pub fn convert_default_token(token: &str) -> String {
    let trimmed = token.trim();
    match trimmed.to_uppercase().as_str() {
        "NOW()" | "CURRENT_TIMESTAMP" | "CURRENT_TIMESTAMP()" => "SYSTIMESTAMP".to_string(),
        "CURRENT_DATE" => "SYSDATE".to_string(),
        _ => trimmed.to_string(),
    }
}

/// Post-conversion equivalence between values that may live on different
/// engines. A PostgreSQL `true` equals an Oracle `1`, a lowercase UUID
/// equals its uppercase CHAR(36) form, and a JSON document equals its
/// canonical text serialization.
pub fn values_equivalent(a: &SqlValue, b: &SqlValue) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (SqlValue::Bool(x), SqlValue::Int(i)) | (SqlValue::Int(i), SqlValue::Bool(x)) => {
            (*i == 0 || *i == 1) && (*i == 1) == *x
        }
        (SqlValue::Bool(x), SqlValue::Numeric(s)) | (SqlValue::Numeric(s), SqlValue::Bool(x)) => {
            (s == "1") == *x && (s == "0" || s == "1")
        }
        (SqlValue::Uuid(u), SqlValue::Text(s)) | (SqlValue::Text(s), SqlValue::Uuid(u)) => {
            uuid::Uuid::parse_str(s.trim()).is_ok_and(|parsed| parsed == *u)
        }
        (SqlValue::Json(v), SqlValue::Text(s)) | (SqlValue::Text(s), SqlValue::Json(v)) => {
            serde_json::from_str::<serde_json::Value>(s).is_ok_and(|parsed| parsed == *v)
        }
        (SqlValue::Int(i), SqlValue::Numeric(s)) | (SqlValue::Numeric(s), SqlValue::Int(i)) => {
            normalize_decimal(s) == i.to_string()
        }
        (SqlValue::Numeric(x), SqlValue::Numeric(y)) => {
            normalize_decimal(x) == normalize_decimal(y)
        }
        (SqlValue::Float(f), SqlValue::Numeric(s)) | (SqlValue::Numeric(s), SqlValue::Float(f)) => {
            s.parse::<f64>().is_ok_and(|parsed| parsed == *f)
        }
        _ => false,
    }
}

/// Canonical form for decimal strings: no sign noise, no leading zeros,
/// no trailing fractional zeros.
fn normalize_decimal(input: &str) -> String {
    let trimmed = input.trim().trim_start_matches('+');
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f.trim_end_matches('0')),
        None => (digits, ""),
    };
    let int_part = int_part.trim_start_matches('0');
    let int_part = if int_part.is_empty() { "0" } else { int_part };

    let mut out = String::new();
    if negative && !(int_part == "0" && frac_part.is_empty()) {
        out.push('-');
    }
    out.push_str(int_part);
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(frac_part);
    }
    out
}
