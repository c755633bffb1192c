//! Type-system reconciliation between PostgreSQL and Oracle.
//!
//! The converter is pure: it maps column types, converts individual values,
//! and renders the DDL text for objects Oracle needs that PostgreSQL gets
//! for free (sequences and before-insert triggers behind `serial` columns).
//! It never touches a connection; executing generated DDL is the caller's
//! business.

mod ddl;
mod value;

pub use ddl::{render_create_table, sequence_name, trigger_name, ColumnDef};
pub use value::{convert_default_token, values_equivalent, ConvertedValue, RestoredValue};

use crate::db::ObjectKind;
use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};

/// PostgreSQL column types the migration understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PgType {
    Uuid,
    Json,
    Jsonb,
    Serial,
    BigSerial,
    TimestampTz,
    Timestamp,
    Date,
    Text,
    Varchar(Option<u32>),
    Char(Option<u32>),
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Numeric(Option<(u16, u16)>),
    Real,
    DoublePrecision,
    Bytea,
}

impl PgType {
    /// Parse a PostgreSQL type name as reported by `information_schema`
    /// (e.g. `character varying(255)`, `timestamp with time zone`).
    pub fn parse(input: &str) -> Result<PgType> {
        let normalized = input.trim().to_lowercase();
        let (base, args) = split_type_args(&normalized);

        let ty = match base {
            "uuid" => PgType::Uuid,
            "json" => PgType::Json,
            "jsonb" => PgType::Jsonb,
            "serial" | "serial4" => PgType::Serial,
            "bigserial" | "serial8" => PgType::BigSerial,
            "timestamp with time zone" | "timestamptz" => PgType::TimestampTz,
            "timestamp without time zone" | "timestamp" => PgType::Timestamp,
            "date" => PgType::Date,
            "text" => PgType::Text,
            "character varying" | "varchar" => PgType::Varchar(args.first().map(|&n| n as u32)),
            "character" | "char" | "bpchar" => PgType::Char(args.first().map(|&n| n as u32)),
            "boolean" | "bool" => PgType::Boolean,
            "smallint" | "int2" => PgType::SmallInt,
            "integer" | "int" | "int4" => PgType::Integer,
            "bigint" | "int8" => PgType::BigInt,
            "numeric" | "decimal" => match args.as_slice() {
                [p] => PgType::Numeric(Some((*p, 0))),
                [p, s] => PgType::Numeric(Some((*p, *s))),
                _ => PgType::Numeric(None),
            },
            "real" | "float4" => PgType::Real,
            "double precision" | "float8" | "float" => PgType::DoublePrecision,
            "bytea" | "bytes" => PgType::Bytea,
            other => return Err(SyncError::UnsupportedType(other.to_string())),
        };
        Ok(ty)
    }

    pub fn as_str(&self) -> String {
        match self {
            PgType::Uuid => "uuid".into(),
            PgType::Json => "json".into(),
            PgType::Jsonb => "jsonb".into(),
            PgType::Serial => "serial".into(),
            PgType::BigSerial => "bigserial".into(),
            PgType::TimestampTz => "timestamp with time zone".into(),
            PgType::Timestamp => "timestamp without time zone".into(),
            PgType::Date => "date".into(),
            PgType::Text => "text".into(),
            PgType::Varchar(Some(n)) => format!("character varying({n})"),
            PgType::Varchar(None) => "character varying".into(),
            PgType::Char(Some(n)) => format!("character({n})"),
            PgType::Char(None) => "character".into(),
            PgType::Boolean => "boolean".into(),
            PgType::SmallInt => "smallint".into(),
            PgType::Integer => "integer".into(),
            PgType::BigInt => "bigint".into(),
            PgType::Numeric(Some((p, s))) => format!("numeric({p},{s})"),
            PgType::Numeric(None) => "numeric".into(),
            PgType::Real => "real".into(),
            PgType::DoublePrecision => "double precision".into(),
            PgType::Bytea => "bytea".into(),
        }
    }
}

impl std::fmt::Display for PgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Oracle column types the migration emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OracleType {
    Char(u32),
    Varchar2(u32),
    Clob,
    Blob,
    Json,
    /// `NUMBER(p)` or `NUMBER(p,s)`; `None` is an unconstrained `NUMBER`.
    Number(Option<(u16, u16)>),
    BinaryFloat,
    BinaryDouble,
    Date,
    Timestamp,
}

impl OracleType {
    /// Parse an Oracle type name as a data dictionary reports it.
    pub fn parse(input: &str) -> Result<OracleType> {
        let normalized = input.trim().to_uppercase();
        let (base, args) = split_type_args(&normalized);

        let ty = match base {
            "CHAR" | "NCHAR" => OracleType::Char(args.first().map(|&n| n as u32).unwrap_or(1)),
            "VARCHAR2" | "NVARCHAR2" | "VARCHAR" => {
                OracleType::Varchar2(args.first().map(|&n| n as u32).unwrap_or(4000))
            }
            "CLOB" | "NCLOB" => OracleType::Clob,
            "BLOB" | "RAW" | "LONG RAW" => OracleType::Blob,
            "JSON" => OracleType::Json,
            "NUMBER" | "INTEGER" | "DECIMAL" => match args.as_slice() {
                [p] => OracleType::Number(Some((*p, 0))),
                [p, s] => OracleType::Number(Some((*p, *s))),
                _ => OracleType::Number(None),
            },
            "BINARY_FLOAT" => OracleType::BinaryFloat,
            "BINARY_DOUBLE" | "FLOAT" => OracleType::BinaryDouble,
            "DATE" => OracleType::Date,
            "TIMESTAMP" => OracleType::Timestamp,
            other => return Err(SyncError::UnsupportedType(other.to_string())),
        };
        Ok(ty)
    }

    pub fn as_str(&self) -> String {
        match self {
            OracleType::Char(n) => format!("CHAR({n})"),
            OracleType::Varchar2(n) => format!("VARCHAR2({n})"),
            OracleType::Clob => "CLOB".into(),
            OracleType::Blob => "BLOB".into(),
            OracleType::Json => "JSON".into(),
            OracleType::Number(Some((p, 0))) => format!("NUMBER({p})"),
            OracleType::Number(Some((p, s))) => format!("NUMBER({p},{s})"),
            OracleType::Number(None) => "NUMBER".into(),
            OracleType::BinaryFloat => "BINARY_FLOAT".into(),
            OracleType::BinaryDouble => "BINARY_DOUBLE".into(),
            OracleType::Date => "DATE".into(),
            OracleType::Timestamp => "TIMESTAMP".into(),
        }
    }

    /// Whether a column declared as `actual` can hold what `self` describes.
    /// Precision growth and timestamp fractional-second settings are fine;
    /// anything structural is not.
    pub fn accepts(&self, actual: &OracleType) -> bool {
        match (self, actual) {
            (OracleType::Number(None), OracleType::Number(_)) => true,
            (OracleType::Number(Some((p, s))), OracleType::Number(Some((ap, as_)))) => {
                ap >= p && as_ == s
            }
            (OracleType::Number(Some(_)), OracleType::Number(None)) => true,
            (OracleType::Varchar2(n), OracleType::Varchar2(an)) => an >= n,
            (OracleType::Varchar2(_), OracleType::Clob) => true,
            (a, b) => a == b,
        }
    }
}

impl std::fmt::Display for OracleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Split `base(arg1,arg2)` into the base name and numeric arguments.
fn split_type_args(input: &str) -> (&str, Vec<u16>) {
    match input.find('(') {
        Some(open) => {
            let base = input[..open].trim();
            let args = input[open + 1..]
                .trim_end_matches(')')
                .split(',')
                .filter_map(|a| a.trim().parse::<u16>().ok())
                .collect();
            (base, args)
        }
        None => (input, Vec::new()),
    }
}

/// A DDL statement the target needs alongside a converted column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DdlObject {
    pub kind: ObjectKind,
    pub name: String,
    pub sql: String,
}

/// The full conversion decision for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnTypeMapping {
    pub source_type: PgType,
    pub target_type: OracleType,
    /// Check constraint bodies, ready to wrap in `CHECK (...)`.
    pub constraints: Vec<String>,
    /// Sequences and triggers the target needs for this column.
    pub additional_objects: Vec<DdlObject>,
    /// Human-readable notes about semantic changes the mapping implies.
    pub migration_notes: Vec<String>,
}

/// Converter configuration. Oracle understood native `JSON` columns from
/// major version 21; older targets store JSON payloads in `CLOB`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    pub oracle_major_version: u32,
    /// Route unbounded text to CLOB even below the length threshold.
    pub prefer_clob_for_text: bool,
    /// Text values longer than this move to CLOB regardless of preference.
    pub text_clob_threshold: usize,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        ConverterConfig {
            oracle_major_version: 19,
            prefer_clob_for_text: false,
            text_clob_threshold: 8000,
        }
    }
}

/// Pure PostgreSQL-to-Oracle type and value converter.
#[derive(Debug, Clone, Default)]
pub struct TypeConverter {
    config: ConverterConfig,
}

impl TypeConverter {
    pub fn new(config: ConverterConfig) -> Self {
        TypeConverter { config }
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    fn json_target(&self) -> OracleType {
        if self.config.oracle_major_version >= 21 {
            OracleType::Json
        } else {
            OracleType::Clob
        }
    }

    /// Map one source column type onto the target type system.
    ///
    /// `table` and `column` name the column under conversion; generated
    /// constraint text and sequence/trigger DDL reference them.
    pub fn convert_type(
        &self,
        table: &str,
        column: &str,
        source: &PgType,
    ) -> Result<ColumnTypeMapping> {
        let mut constraints = Vec::new();
        let mut additional_objects = Vec::new();
        let mut migration_notes = Vec::new();

        let target_type = match source {
            PgType::Uuid => {
                constraints.push(format!("LENGTH({column}) = 36"));
                constraints.push(format!(
                    "REGEXP_LIKE({column}, '^[0-9A-F]{{8}}-[0-9A-F]{{4}}-[0-9A-F]{{4}}-[0-9A-F]{{4}}-[0-9A-F]{{12}}$')"
                ));
                migration_notes
                    .push("UUID values are stored as uppercase 36-character strings".to_string());
                OracleType::Char(36)
            }
            PgType::Json | PgType::Jsonb => {
                constraints.push(format!("{column} IS JSON"));
                let target = self.json_target();
                if target == OracleType::Clob {
                    migration_notes.push(format!(
                        "JSON stored as CLOB with an IS JSON check (Oracle {} predates native JSON columns)",
                        self.config.oracle_major_version
                    ));
                }
                target
            }
            PgType::Serial | PgType::BigSerial => {
                let (width, target) = match source {
                    PgType::Serial => (10, OracleType::Number(Some((10, 0)))),
                    _ => (19, OracleType::Number(Some((19, 0)))),
                };
                additional_objects.push(DdlObject {
                    kind: ObjectKind::Sequence,
                    name: sequence_name(table, column),
                    sql: ddl::sequence_ddl(table, column),
                });
                additional_objects.push(DdlObject {
                    kind: ObjectKind::Trigger,
                    name: trigger_name(table, column),
                    sql: ddl::trigger_ddl(table, column),
                });
                migration_notes.push(format!(
                    "Auto-increment emulated with sequence {} and before-insert trigger {} (NUMBER({width}))",
                    sequence_name(table, column),
                    trigger_name(table, column),
                ));
                target
            }
            PgType::TimestampTz => {
                migration_notes.push(
                    "Timezone information is lost; values are normalized to UTC before storage"
                        .to_string(),
                );
                OracleType::Timestamp
            }
            PgType::Timestamp => OracleType::Timestamp,
            PgType::Date => OracleType::Date,
            PgType::Text => {
                if self.config.prefer_clob_for_text {
                    migration_notes.push("Unbounded text stored as CLOB".to_string());
                    OracleType::Clob
                } else {
                    migration_notes.push(format!(
                        "Text values longer than {} characters move to CLOB at conversion time",
                        self.config.text_clob_threshold
                    ));
                    OracleType::Varchar2(4000)
                }
            }
            PgType::Varchar(len) => match len {
                Some(n) if *n > 4000 => {
                    migration_notes.push(format!(
                        "varchar({n}) exceeds VARCHAR2's 4000-character limit; stored as CLOB"
                    ));
                    OracleType::Clob
                }
                Some(n) => OracleType::Varchar2(*n),
                None => OracleType::Varchar2(4000),
            },
            PgType::Char(len) => match len {
                Some(n) if *n > 2000 => {
                    migration_notes.push(format!(
                        "char({n}) exceeds CHAR's 2000-character limit; stored as CLOB"
                    ));
                    OracleType::Clob
                }
                Some(n) => OracleType::Char(*n),
                None => OracleType::Char(1),
            },
            PgType::Boolean => {
                constraints.push(format!("{column} IN (0, 1)"));
                migration_notes.push("Booleans stored as NUMBER(1), 1 = true".to_string());
                OracleType::Number(Some((1, 0)))
            }
            PgType::SmallInt => OracleType::Number(Some((5, 0))),
            PgType::Integer => OracleType::Number(Some((10, 0))),
            PgType::BigInt => OracleType::Number(Some((19, 0))),
            PgType::Numeric(spec) => match spec {
                Some((p, s)) if *p > 38 => {
                    migration_notes.push(format!(
                        "numeric({p},{s}) narrowed to NUMBER(38,{s}); Oracle caps precision at 38"
                    ));
                    OracleType::Number(Some((38, *s)))
                }
                Some((p, s)) => OracleType::Number(Some((*p, *s))),
                None => OracleType::Number(None),
            },
            PgType::Real => OracleType::BinaryFloat,
            PgType::DoublePrecision => OracleType::BinaryDouble,
            PgType::Bytea => OracleType::Blob,
        };

        Ok(ColumnTypeMapping {
            source_type: source.clone(),
            target_type,
            constraints,
            additional_objects,
            migration_notes,
        })
    }

    /// Whether values converted from `source` to `target` can be converted
    /// back without loss in the value model. Timezone-bearing timestamps
    /// qualify because values are UTC-normalized before conversion.
    pub fn is_reversible(&self, source: &PgType, target: &OracleType) -> bool {
        let Ok(mapping) = self.convert_type("t", "c", source) else {
            return false;
        };
        if !mapping.target_type.accepts(target) && mapping.target_type != *target {
            return false;
        }
        match source {
            // Value-level length upgrades retain the full text either way.
            PgType::Text | PgType::Varchar(_) | PgType::Char(_) => true,
            PgType::Real | PgType::DoublePrecision => true,
            PgType::Uuid
            | PgType::Json
            | PgType::Jsonb
            | PgType::Serial
            | PgType::BigSerial
            | PgType::TimestampTz
            | PgType::Timestamp
            | PgType::Date
            | PgType::Boolean
            | PgType::SmallInt
            | PgType::Integer
            | PgType::BigInt
            | PgType::Bytea => true,
            // Precision narrowing past NUMBER(38) is lossy.
            PgType::Numeric(spec) => !matches!(spec, Some((p, _)) if *p > 38),
        }
    }
}
