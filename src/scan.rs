//! Typed receiving slots for result columns.
//!
//! A [`ScanTarget`] is chosen per column from its declared type (see
//! [`crate::dialect::Dialect::scan_target_for`]) and then captures the
//! driver's [`NativeValue`] for that column into a [`Value`] without widening
//! everything to text.

use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rusqlite::types::ValueRef;
use thiserror::Error;
use tracing::trace;

/// Column metadata read once from a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    /// Type as declared in the schema; `None` for expressions.
    pub declared_type: Option<String>,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, declared_type: Option<&str>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.map(str::to_string),
        }
    }

    pub fn declared(&self) -> Option<DeclaredType> {
        self.declared_type.as_deref().map(DeclaredType::parse)
    }
}

/// A declared column type split into its base name and numeric modifiers,
/// e.g. `NUMBER(10,2)` becomes `NUMBER` with `[10, 2]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredType {
    /// Upper-cased base name with internal whitespace collapsed
    /// (`BIGINT UNSIGNED`, `DOUBLE PRECISION`).
    pub base: String,
    pub modifiers: Vec<u32>,
}

impl DeclaredType {
    pub fn parse(declared: &str) -> Self {
        let (head, tail) = match declared.find('(') {
            Some(open) => (&declared[..open], &declared[open + 1..]),
            None => (declared, ""),
        };
        let (args, rest) = match tail.find(')') {
            Some(close) => (&tail[..close], &tail[close + 1..]),
            None => ("", tail),
        };
        let base = head
            .split_whitespace()
            .chain(rest.split_whitespace())
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();
        let modifiers = args
            .split(',')
            .filter_map(|m| m.trim().parse().ok())
            .collect();
        Self { base, modifiers }
    }

    /// First modifier, the display width or length for most types.
    pub fn width(&self) -> Option<u32> {
        self.modifiers.first().copied()
    }

    pub fn scale(&self) -> Option<u32> {
        self.modifiers.get(1).copied()
    }

    pub fn contains(&self, fragment: &str) -> bool {
        self.base.contains(fragment)
    }

    /// First word of the base name (`BIGINT` for `BIGINT UNSIGNED`).
    pub fn head(&self) -> &str {
        self.base.split(' ').next().unwrap_or_default()
    }

    pub fn is_unsigned(&self) -> bool {
        self.base.split(' ').any(|w| w == "UNSIGNED")
    }
}

/// Receiving slot for one column of one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanTarget {
    Int64,
    Float64,
    Text,
    Bool,
    Timestamp,
    Blob,
    /// Keeps whatever storage class the driver hands over.
    Dynamic,
}

/// A driver's raw column value, borrowed from the current row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeValue<'a> {
    Null,
    Integer(i64),
    Real(f64),
    Text(&'a [u8]),
    Blob(&'a [u8]),
}

impl<'a> From<ValueRef<'a>> for NativeValue<'a> {
    fn from(value: ValueRef<'a>) -> Self {
        match value {
            ValueRef::Null => NativeValue::Null,
            ValueRef::Integer(i) => NativeValue::Integer(i),
            ValueRef::Real(f) => NativeValue::Real(f),
            ValueRef::Text(t) => NativeValue::Text(t),
            ValueRef::Blob(b) => NativeValue::Blob(b),
        }
    }
}

impl NativeValue<'_> {
    /// The value as stored, with non-UTF-8 text kept as bytes.
    pub fn to_value(&self) -> Value {
        match *self {
            NativeValue::Null => Value::Null,
            NativeValue::Integer(i) => Value::Integer(i),
            NativeValue::Real(f) => Value::Real(f),
            NativeValue::Text(t) => match std::str::from_utf8(t) {
                Ok(s) => Value::Text(s.to_string()),
                Err(_) => Value::Blob(t.to_vec()),
            },
            NativeValue::Blob(b) => Value::Blob(b.to_vec()),
        }
    }

    fn storage_class(&self) -> &'static str {
        match self {
            NativeValue::Null => "null",
            NativeValue::Integer(_) => "integer",
            NativeValue::Real(_) => "real",
            NativeValue::Text(_) => "text",
            NativeValue::Blob(_) => "blob",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    #[error("cannot store {found} value in {target:?} target")]
    Incompatible {
        target: ScanTarget,
        found: &'static str,
    },
    #[error("{text:?} is not a valid {target:?} value")]
    Unparsable { target: ScanTarget, text: String },
    #[error("real value {0} does not fit an integer without loss")]
    Lossy(f64),
    #[error("text value is not valid UTF-8")]
    InvalidUtf8,
}

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

impl ScanTarget {
    /// Capture `native` into this slot.
    pub fn capture(self, native: NativeValue<'_>) -> Result<Value, ScanError> {
        if let NativeValue::Null = native {
            return Ok(Value::Null);
        }
        match self {
            ScanTarget::Dynamic => Ok(native.to_value()),
            ScanTarget::Int64 => match native {
                NativeValue::Integer(i) => Ok(Value::Integer(i)),
                NativeValue::Real(f) => real_to_integer(f).map(Value::Integer),
                NativeValue::Text(t) => {
                    let text = utf8(t)?;
                    text.trim()
                        .parse()
                        .map(Value::Integer)
                        .map_err(|_| self.unparsable(text))
                }
                other => Err(self.incompatible(&other)),
            },
            ScanTarget::Float64 => match native {
                NativeValue::Real(f) => Ok(Value::Real(f)),
                NativeValue::Integer(i) => Ok(Value::Real(i as f64)),
                NativeValue::Text(t) => {
                    let text = utf8(t)?;
                    text.trim()
                        .parse()
                        .map(Value::Real)
                        .map_err(|_| self.unparsable(text))
                }
                other => Err(self.incompatible(&other)),
            },
            ScanTarget::Text => match native {
                NativeValue::Text(t) => Ok(Value::Text(utf8(t)?.to_string())),
                NativeValue::Integer(i) => Ok(Value::Text(i.to_string())),
                NativeValue::Real(f) => Ok(Value::Text(f.to_string())),
                NativeValue::Blob(b) => std::str::from_utf8(b)
                    .map(|s| Value::Text(s.to_string()))
                    .map_err(|_| ScanError::InvalidUtf8),
                NativeValue::Null => Ok(Value::Null),
            },
            ScanTarget::Bool => match native {
                NativeValue::Integer(0) => Ok(Value::Boolean(false)),
                NativeValue::Integer(1) => Ok(Value::Boolean(true)),
                NativeValue::Text(t) => {
                    let text = utf8(t)?;
                    parse_bool(text)
                        .map(Value::Boolean)
                        .ok_or_else(|| self.unparsable(text))
                }
                other => Err(self.incompatible(&other)),
            },
            ScanTarget::Timestamp => match native {
                NativeValue::Text(t) => {
                    let text = utf8(t)?;
                    // free-form text in a temporal column is kept as-is
                    Ok(parse_temporal(text).unwrap_or_else(|| Value::Text(text.to_string())))
                }
                // numbers are ambiguous here (unix seconds, julian day, yyyymmdd)
                other => Err(self.incompatible(&other)),
            },
            ScanTarget::Blob => match native {
                NativeValue::Blob(b) | NativeValue::Text(b) => Ok(Value::Blob(b.to_vec())),
                other => Err(self.incompatible(&other)),
            },
        }
    }

    /// Capture `native` into this slot, keeping the driver's own storage
    /// class when the slot cannot hold it.
    ///
    /// Used where declared column types are affinity hints and any storage
    /// class can turn up in any column.
    pub fn capture_or_native(self, native: NativeValue<'_>) -> Value {
        match self.capture(native) {
            Ok(value) => value,
            Err(err) => {
                trace!(error = %err, "keeping native storage class");
                native.to_value()
            }
        }
    }

    fn incompatible(self, found: &NativeValue<'_>) -> ScanError {
        ScanError::Incompatible {
            target: self,
            found: found.storage_class(),
        }
    }

    fn unparsable(self, text: &str) -> ScanError {
        ScanError::Unparsable {
            target: self,
            text: text.to_string(),
        }
    }
}

fn utf8(bytes: &[u8]) -> Result<&str, ScanError> {
    std::str::from_utf8(bytes).map_err(|_| ScanError::InvalidUtf8)
}

fn real_to_integer(f: f64) -> Result<i64, ScanError> {
    // i64::MAX as f64 rounds up to 2^63, hence the strict upper bound
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Ok(f as i64)
    } else {
        Err(ScanError::Lossy(f))
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "y" | "yes" => Some(true),
        "0" | "f" | "false" | "n" | "no" => Some(false),
        _ => None,
    }
}

fn parse_temporal(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(Value::TimestampTz(ts));
    }
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Value::Timestamp(ts));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .map(Value::Date)
}
