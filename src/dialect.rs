//! Per-backend SQL syntax: positional markers, literal escaping and the
//! mapping from declared column types to scan targets.

use crate::error::{Error, Result};
use crate::scan::{ColumnMeta, DeclaredType, ScanTarget};
use crate::value::Value;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Sqlite,
    MySql,
    Postgres,
    SqlServer,
    Oracle,
}

/// Dialect identifiers accepted in settings, matched case-insensitively.
const DIALECTS: &[(&str, Dialect)] = &[
    ("sqlite", Dialect::Sqlite),
    ("sqlite3", Dialect::Sqlite),
    ("mysql", Dialect::MySql),
    ("mariadb", Dialect::MySql),
    ("postgres", Dialect::Postgres),
    ("postgresql", Dialect::Postgres),
    ("pgx", Dialect::Postgres),
    ("sqlserver", Dialect::SqlServer),
    ("mssql", Dialect::SqlServer),
    ("oracle", Dialect::Oracle),
    ("godror", Dialect::Oracle),
];

/// A value the dialect has no safe literal form for.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LiteralError {
    #[error("{dialect} text literals cannot contain NUL characters")]
    NulInText { dialect: Dialect },
    #[error("{0} has no SQL literal form")]
    NonFinite(f64),
}

impl Dialect {
    pub fn resolve(id: &str) -> Result<Self> {
        let id = id.trim();
        DIALECTS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(id))
            .map(|(_, dialect)| *dialect)
            .ok_or_else(|| Error::UnsupportedDialect(id.to_string()))
    }

    pub fn name(self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgres",
            Dialect::SqlServer => "sqlserver",
            Dialect::Oracle => "oracle",
        }
    }

    /// Marker for the `position`-th bind value, counting from 1.
    pub fn placeholder(self, position: usize) -> String {
        match self {
            Dialect::Sqlite | Dialect::MySql => "?".to_string(),
            Dialect::Postgres => format!("${position}"),
            Dialect::SqlServer => format!("@p{position}"),
            Dialect::Oracle => format!(":{position}"),
        }
    }

    /// Pick the receiving slot for a column. Never narrower than the
    /// declared type allows; anything unknown stays [`ScanTarget::Dynamic`].
    pub fn scan_target_for(self, column: &ColumnMeta) -> ScanTarget {
        let Some(declared) = column.declared() else {
            return ScanTarget::Dynamic;
        };
        if declared.base.is_empty() {
            return ScanTarget::Dynamic;
        }
        match self {
            Dialect::Sqlite => sqlite_target(&declared),
            Dialect::MySql => mysql_target(&declared),
            Dialect::Postgres => postgres_target(&declared),
            Dialect::SqlServer => sqlserver_target(&declared),
            Dialect::Oracle => oracle_target(&declared),
        }
    }

    /// Render `value` as a literal that can be spliced into query text.
    pub fn render_literal(self, value: &Value) -> std::result::Result<String, LiteralError> {
        match value {
            Value::Null => Ok("NULL".to_string()),
            Value::Integer(i) => Ok(i.to_string()),
            Value::Real(f) => render_real(*f),
            Value::Text(s) => self.quote_text(s),
            Value::Boolean(b) => Ok(match (self, b) {
                (Dialect::MySql | Dialect::Postgres, true) => "TRUE".to_string(),
                (Dialect::MySql | Dialect::Postgres, false) => "FALSE".to_string(),
                (_, true) => "1".to_string(),
                (_, false) => "0".to_string(),
            }),
            Value::Blob(bytes) => {
                let hex = hex::encode_upper(bytes);
                Ok(match self {
                    Dialect::Sqlite | Dialect::MySql => format!("X'{hex}'"),
                    Dialect::Postgres => format!("'\\x{hex}'::bytea"),
                    Dialect::SqlServer => format!("0x{hex}"),
                    Dialect::Oracle => format!("HEXTORAW('{hex}')"),
                })
            }
            Value::Date(date) => Ok(self.temporal("DATE", &date.format("%Y-%m-%d").to_string())),
            Value::Timestamp(ts) => Ok(self.temporal(
                "TIMESTAMP",
                &ts.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            )),
            Value::TimestampTz(ts) => {
                // Oracle wants whitespace between the time and its offset
                let format = match self {
                    Dialect::Oracle => "%Y-%m-%d %H:%M:%S%.f %:z",
                    _ => "%Y-%m-%d %H:%M:%S%.f%:z",
                };
                Ok(self.temporal("TIMESTAMP", &ts.format(format).to_string()))
            }
            Value::Json(json) => self.quote_text(&json.to_string()),
        }
    }

    fn quote_text(self, text: &str) -> std::result::Result<String, LiteralError> {
        if self == Dialect::MySql {
            let mut out = String::with_capacity(text.len() + 2);
            out.push('\'');
            for c in text.chars() {
                match c {
                    '\'' => out.push_str("''"),
                    '\\' => out.push_str("\\\\"),
                    '\0' => out.push_str("\\0"),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\u{1a}' => out.push_str("\\Z"),
                    c => out.push(c),
                }
            }
            out.push('\'');
            return Ok(out);
        }
        if text.contains('\0') {
            return Err(LiteralError::NulInText { dialect: self });
        }
        let escaped = text.replace('\'', "''");
        Ok(match self {
            Dialect::SqlServer => format!("N'{escaped}'"),
            _ => format!("'{escaped}'"),
        })
    }

    fn temporal(self, keyword: &str, text: &str) -> String {
        match self {
            Dialect::Oracle => format!("{keyword} '{text}'"),
            _ => format!("'{text}'"),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn render_real(f: f64) -> std::result::Result<String, LiteralError> {
    if !f.is_finite() {
        return Err(LiteralError::NonFinite(f));
    }
    let text = f.to_string();
    // keep the literal a float rather than an integer
    if text.contains(['.', 'e', 'E']) {
        Ok(text)
    } else {
        Ok(format!("{text}.0"))
    }
}

// SQLite column affinity rules, in the order sqlite3 applies them.
fn sqlite_target(declared: &DeclaredType) -> ScanTarget {
    if declared.contains("BOOL") {
        ScanTarget::Bool
    } else if declared.contains("INT") {
        ScanTarget::Int64
    } else if declared.contains("CHAR") || declared.contains("CLOB") || declared.contains("TEXT")
    {
        ScanTarget::Text
    } else if declared.contains("BLOB") {
        ScanTarget::Blob
    } else if declared.contains("REAL") || declared.contains("FLOA") || declared.contains("DOUB")
    {
        ScanTarget::Float64
    } else if declared.contains("DATE") || declared.contains("TIME") {
        ScanTarget::Timestamp
    } else {
        // NUMERIC affinity holds integers and reals alike
        ScanTarget::Dynamic
    }
}

fn mysql_target(declared: &DeclaredType) -> ScanTarget {
    match declared.head() {
        "TINYINT" | "BIT" if declared.width() == Some(1) => ScanTarget::Bool,
        "BOOL" | "BOOLEAN" => ScanTarget::Bool,
        "BIGINT" if declared.is_unsigned() => ScanTarget::Text,
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" | "YEAR" => {
            ScanTarget::Int64
        }
        "FLOAT" | "DOUBLE" | "REAL" => ScanTarget::Float64,
        "DECIMAL" | "NUMERIC" | "DEC" => ScanTarget::Text,
        "CHAR" | "VARCHAR" | "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET"
        | "JSON" => ScanTarget::Text,
        "DATE" | "DATETIME" | "TIMESTAMP" => ScanTarget::Timestamp,
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT" => {
            ScanTarget::Blob
        }
        _ => ScanTarget::Dynamic,
    }
}

fn postgres_target(declared: &DeclaredType) -> ScanTarget {
    match declared.base.as_str() {
        "BOOL" | "BOOLEAN" => ScanTarget::Bool,
        "INT2" | "INT4" | "INT8" | "SMALLINT" | "INTEGER" | "INT" | "BIGINT" | "SMALLSERIAL"
        | "SERIAL" | "BIGSERIAL" | "OID" => ScanTarget::Int64,
        "FLOAT4" | "FLOAT8" | "REAL" | "DOUBLE PRECISION" | "FLOAT" => ScanTarget::Float64,
        "NUMERIC" | "DECIMAL" | "MONEY" => ScanTarget::Text,
        "TEXT" | "VARCHAR" | "CHARACTER VARYING" | "CHAR" | "CHARACTER" | "BPCHAR" | "NAME"
        | "UUID" | "JSON" | "JSONB" | "CITEXT" => ScanTarget::Text,
        "DATE" | "TIMESTAMP" | "TIMESTAMPTZ" | "TIMESTAMP WITH TIME ZONE"
        | "TIMESTAMP WITHOUT TIME ZONE" => ScanTarget::Timestamp,
        "BYTEA" => ScanTarget::Blob,
        _ => ScanTarget::Dynamic,
    }
}

fn sqlserver_target(declared: &DeclaredType) -> ScanTarget {
    match declared.base.as_str() {
        "BIT" => ScanTarget::Bool,
        "TINYINT" | "SMALLINT" | "INT" | "BIGINT" => ScanTarget::Int64,
        "FLOAT" | "REAL" => ScanTarget::Float64,
        "DECIMAL" | "NUMERIC" | "MONEY" | "SMALLMONEY" => ScanTarget::Text,
        "CHAR" | "VARCHAR" | "NCHAR" | "NVARCHAR" | "TEXT" | "NTEXT" | "UNIQUEIDENTIFIER"
        | "XML" => ScanTarget::Text,
        "DATE" | "DATETIME" | "DATETIME2" | "SMALLDATETIME" | "DATETIMEOFFSET" => {
            ScanTarget::Timestamp
        }
        "BINARY" | "VARBINARY" | "IMAGE" => ScanTarget::Blob,
        _ => ScanTarget::Dynamic,
    }
}

fn oracle_target(declared: &DeclaredType) -> ScanTarget {
    match declared.head() {
        // NUMBER(p) with p <= 18 always fits in an i64
        "NUMBER" => match (declared.width(), declared.scale().unwrap_or(0)) {
            (Some(precision), 0) if precision <= 18 => ScanTarget::Int64,
            _ => ScanTarget::Text,
        },
        "INTEGER" | "INT" | "SMALLINT" => ScanTarget::Text,
        "BINARY_FLOAT" | "BINARY_DOUBLE" => ScanTarget::Float64,
        "FLOAT" => ScanTarget::Text,
        "CHAR" | "NCHAR" | "VARCHAR" | "VARCHAR2" | "NVARCHAR2" | "CLOB" | "NCLOB" | "LONG"
        | "ROWID" => ScanTarget::Text,
        "DATE" | "TIMESTAMP" => ScanTarget::Timestamp,
        "RAW" | "BLOB" => ScanTarget::Blob,
        _ => ScanTarget::Dynamic,
    }
}
