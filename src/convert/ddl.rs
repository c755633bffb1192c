//! DDL text generation for the target engine.
//!
//! Everything here renders SQL as text. Nothing executes it; generated
//! scripts go to the operator (or a deployment pipeline) for review.

use super::value::convert_default_token;
use super::{PgType, TypeConverter};
use crate::error::Result;

pub fn sequence_name(table: &str, column: &str) -> String {
    format!("{table}_{column}_seq")
}

pub fn trigger_name(table: &str, column: &str) -> String {
    format!("{table}_{column}_trg")
}

/// `CREATE SEQUENCE` statement backing an auto-increment column.
pub(super) fn sequence_ddl(table: &str, column: &str) -> String {
    format!(
        "CREATE SEQUENCE {} START WITH 1 INCREMENT BY 1 NOCACHE",
        sequence_name(table, column)
    )
}

/// Before-insert trigger that fills the column from its sequence.
pub(super) fn trigger_ddl(table: &str, column: &str) -> String {
    format!(
        "CREATE OR REPLACE TRIGGER {trigger}\n\
         BEFORE INSERT ON {table}\n\
         FOR EACH ROW\n\
         WHEN (NEW.{column} IS NULL)\n\
         BEGIN\n\
         \x20 SELECT {sequence}.NEXTVAL INTO :NEW.{column} FROM DUAL;\n\
         END;",
        trigger = trigger_name(table, column),
        sequence = sequence_name(table, column),
    )
}

/// One column of a table under conversion.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub source_type: PgType,
    pub nullable: bool,
    pub default: Option<String>,
    pub primary_key: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, source_type: PgType) -> Self {
        ColumnDef {
            name: name.into(),
            source_type,
            nullable: true,
            default: None,
            primary_key: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Render the full target-side script for one table: the `CREATE TABLE`
/// statement with converted types, check constraints, the primary key,
/// and any sequences and triggers the columns require.
pub fn render_create_table(
    converter: &TypeConverter,
    table: &str,
    columns: &[ColumnDef],
) -> Result<String> {
    let mut lines = Vec::new();
    let mut constraints = Vec::new();
    let mut trailing = Vec::new();
    let mut pk_columns = Vec::new();

    for column in columns {
        let mapping = converter.convert_type(table, &column.name, &column.source_type)?;

        let mut line = format!("  {} {}", column.name, mapping.target_type);
        if let Some(default) = &column.default {
            line.push_str(&format!(" DEFAULT {}", convert_default_token(default)));
        }
        if !column.nullable {
            line.push_str(" NOT NULL");
        }
        lines.push(line);

        for (i, body) in mapping.constraints.iter().enumerate() {
            let suffix = if mapping.constraints.len() > 1 {
                format!("{}", i + 1)
            } else {
                String::new()
            };
            constraints.push(format!(
                "  CONSTRAINT {table}_{}_ck{suffix} CHECK ({body})",
                column.name
            ));
        }

        for object in &mapping.additional_objects {
            trailing.push(object.sql.clone());
        }

        if column.primary_key {
            pk_columns.push(column.name.clone());
        }
    }

    if !pk_columns.is_empty() {
        constraints.insert(
            0,
            format!(
                "  CONSTRAINT {table}_pk PRIMARY KEY ({})",
                pk_columns.join(", ")
            ),
        );
    }

    let mut body = lines;
    body.extend(constraints);

    let mut script = format!("CREATE TABLE {table} (\n{}\n);", body.join(",\n"));
    for statement in trailing {
        script.push_str("\n\n");
        script.push_str(&statement);
        // PL/SQL blocks need the sqlplus block terminator.
        if statement.contains("BEGIN") {
            script.push_str("\n/");
        } else {
            script.push(';');
        }
    }
    Ok(script)
}
