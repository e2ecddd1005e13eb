use chrono::{NaiveDate, TimeZone, Utc};
use rust_sqlquery::results::{materialize, Cursor};
use rust_sqlquery::scan::{ColumnMeta, DeclaredType, NativeValue, ScanError, ScanTarget};
use rust_sqlquery::{Dialect, Error, ResultSet, ResultShape, Value};
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum Cell {
    Null,
    Int(i64),
    Real(f64),
    Text(&'static str),
}

/// Cursor over rows held in memory.
struct VecCursor {
    columns: Vec<ColumnMeta>,
    rows: Vec<Vec<Cell>>,
    next: usize,
    targets_seen: Vec<Vec<ScanTarget>>,
}

impl VecCursor {
    fn new(columns: &[(&str, Option<&str>)], rows: Vec<Vec<Cell>>) -> Self {
        Self {
            columns: columns
                .iter()
                .map(|(name, declared)| ColumnMeta::new(*name, *declared))
                .collect(),
            rows,
            next: 0,
            targets_seen: Vec::new(),
        }
    }
}

impl Cursor for VecCursor {
    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    fn scan_next(&mut self, targets: &[ScanTarget]) -> rust_sqlquery::Result<Option<Vec<Value>>> {
        let Some(row) = self.rows.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        self.targets_seen.push(targets.to_vec());
        let mut values = Vec::new();
        for ((cell, target), column) in row.iter().zip(targets).zip(&self.columns) {
            let native = match cell {
                Cell::Null => NativeValue::Null,
                Cell::Int(i) => NativeValue::Integer(*i),
                Cell::Real(f) => NativeValue::Real(*f),
                Cell::Text(t) => NativeValue::Text(t.as_bytes()),
            };
            let value = target.capture(native).map_err(|source| Error::Scan {
                column: column.name.clone(),
                source,
            })?;
            values.push(value);
        }
        Ok(Some(values))
    }
}

fn duplicate_columns() -> VecCursor {
    VecCursor::new(
        &[("a", None), ("b", None), ("a", None)],
        vec![vec![Cell::Int(1), Cell::Int(2), Cell::Int(3)]],
    )
}

#[test]
fn test_positional_rows_keep_cursor_order() {
    let mut cursor = duplicate_columns();
    let results = materialize(&mut cursor, Dialect::Sqlite, ResultShape::Positional).unwrap();
    assert_eq!(
        results,
        ResultSet::Positional(vec![vec![
            Value::Integer(1),
            Value::Integer(2),
            Value::Integer(3)
        ]])
    );
}

#[test]
fn test_labeled_rows_let_later_columns_win() {
    let mut cursor = duplicate_columns();
    let results = materialize(&mut cursor, Dialect::Sqlite, ResultShape::Labeled).unwrap();
    let expected = HashMap::from([
        ("a".to_string(), Value::Integer(3)),
        ("b".to_string(), Value::Integer(2)),
    ]);
    assert_eq!(results, ResultSet::Labeled(vec![expected]));
}

#[test]
fn test_cursor_is_exhausted_after_one_pass() {
    let mut cursor = duplicate_columns();
    let first = materialize(&mut cursor, Dialect::Sqlite, ResultShape::Positional).unwrap();
    assert_eq!(first.len(), 1);
    let second = materialize(&mut cursor, Dialect::Sqlite, ResultShape::Positional).unwrap();
    assert!(second.is_empty());
}

#[test]
fn test_scan_targets_follow_declared_types() {
    let mut cursor = VecCursor::new(
        &[("id", Some("INTEGER")), ("score", Some("DOUBLE")), ("label", Some("VARCHAR(10)"))],
        vec![
            vec![Cell::Int(1), Cell::Int(10), Cell::Int(42)],
            vec![Cell::Real(2.0), Cell::Null, Cell::Text("x")],
        ],
    );
    let results = materialize(&mut cursor, Dialect::Sqlite, ResultShape::Positional).unwrap();
    assert_eq!(
        results,
        ResultSet::Positional(vec![
            vec![Value::Integer(1), Value::Real(10.0), Value::from("42")],
            vec![Value::Integer(2), Value::Null, Value::from("x")],
        ])
    );
    // one fresh set of targets per row
    assert_eq!(cursor.targets_seen.len(), 2);
    assert_eq!(
        cursor.targets_seen[0],
        [ScanTarget::Int64, ScanTarget::Float64, ScanTarget::Text]
    );
}

#[test]
fn test_scan_error_discards_partial_results() {
    let mut cursor = VecCursor::new(
        &[("id", Some("INTEGER"))],
        vec![vec![Cell::Int(1)], vec![Cell::Real(1.5)], vec![Cell::Int(3)]],
    );
    let err = materialize(&mut cursor, Dialect::Sqlite, ResultShape::Labeled).unwrap_err();
    match err {
        Error::Scan { column, source } => {
            assert_eq!(column, "id");
            assert_eq!(source, ScanError::Lossy(1.5));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_declared_type_parsing() {
    let numeric = DeclaredType::parse("numeric(10, 2)");
    assert_eq!(numeric.base, "NUMERIC");
    assert_eq!(numeric.modifiers, [10, 2]);

    let unsigned = DeclaredType::parse("bigint(20) unsigned");
    assert_eq!(unsigned.base, "BIGINT UNSIGNED");
    assert_eq!(unsigned.width(), Some(20));
    assert!(unsigned.is_unsigned());

    let tz = DeclaredType::parse("timestamp(3)  with time zone");
    assert_eq!(tz.base, "TIMESTAMP WITH TIME ZONE");
}

fn target(dialect: Dialect, declared: Option<&str>) -> ScanTarget {
    dialect.scan_target_for(&ColumnMeta::new("c", declared))
}

#[test]
fn test_scan_target_resolution_per_dialect() {
    use ScanTarget::*;

    assert_eq!(target(Dialect::Sqlite, Some("INTEGER")), Int64);
    assert_eq!(target(Dialect::Sqlite, Some("BIGINT")), Int64);
    assert_eq!(target(Dialect::Sqlite, Some("VARCHAR(20)")), Text);
    assert_eq!(target(Dialect::Sqlite, Some("BOOLEAN")), Bool);
    assert_eq!(target(Dialect::Sqlite, Some("DATETIME")), Timestamp);
    assert_eq!(target(Dialect::Sqlite, Some("DOUBLE PRECISION")), Float64);
    assert_eq!(target(Dialect::Sqlite, Some("BLOB")), Blob);
    assert_eq!(target(Dialect::Sqlite, Some("NUMERIC")), Dynamic);
    assert_eq!(target(Dialect::Sqlite, Some("")), Dynamic);
    assert_eq!(target(Dialect::Sqlite, None), Dynamic);

    assert_eq!(target(Dialect::MySql, Some("TINYINT(1)")), Bool);
    assert_eq!(target(Dialect::MySql, Some("TINYINT(4)")), Int64);
    assert_eq!(target(Dialect::MySql, Some("BIGINT UNSIGNED")), Text);
    assert_eq!(target(Dialect::MySql, Some("INT UNSIGNED")), Int64);
    assert_eq!(target(Dialect::MySql, Some("DECIMAL(10,2)")), Text);
    assert_eq!(target(Dialect::MySql, Some("BIT(8)")), Blob);

    assert_eq!(target(Dialect::Postgres, Some("int8")), Int64);
    assert_eq!(target(Dialect::Postgres, Some("numeric")), Text);
    assert_eq!(target(Dialect::Postgres, Some("timestamp with time zone")), Timestamp);
    assert_eq!(target(Dialect::Postgres, Some("bytea")), Blob);
    assert_eq!(target(Dialect::Postgres, Some("tsvector")), Dynamic);

    assert_eq!(target(Dialect::SqlServer, Some("bit")), Bool);
    assert_eq!(target(Dialect::SqlServer, Some("nvarchar(max)")), Text);
    assert_eq!(target(Dialect::SqlServer, Some("money")), Text);

    assert_eq!(target(Dialect::Oracle, Some("NUMBER(10)")), Int64);
    assert_eq!(target(Dialect::Oracle, Some("NUMBER(19)")), Text);
    assert_eq!(target(Dialect::Oracle, Some("NUMBER(10,2)")), Text);
    assert_eq!(target(Dialect::Oracle, Some("NUMBER")), Text);
    assert_eq!(target(Dialect::Oracle, Some("VARCHAR2(30)")), Text);
}

#[test]
fn test_capture_rules() {
    use ScanTarget::*;

    for slot in [Int64, Float64, Text, Bool, Timestamp, Blob, Dynamic] {
        assert_eq!(slot.capture(NativeValue::Null), Ok(Value::Null));
    }

    assert_eq!(Int64.capture(NativeValue::Real(2.0)), Ok(Value::Integer(2)));
    assert_eq!(Int64.capture(NativeValue::Text(b" 42 ")), Ok(Value::Integer(42)));
    assert!(matches!(
        Int64.capture(NativeValue::Text(b"forty")),
        Err(ScanError::Unparsable { target: Int64, .. })
    ));
    assert!(matches!(
        Int64.capture(NativeValue::Blob(b"\x01")),
        Err(ScanError::Incompatible { target: Int64, found: "blob" })
    ));

    assert_eq!(Float64.capture(NativeValue::Text(b"0.5")), Ok(Value::Real(0.5)));
    assert_eq!(Text.capture(NativeValue::Integer(7)), Ok(Value::from("7")));

    assert_eq!(Bool.capture(NativeValue::Integer(0)), Ok(Value::Boolean(false)));
    assert_eq!(Bool.capture(NativeValue::Text(b"TRUE")), Ok(Value::Boolean(true)));
    assert!(matches!(
        Bool.capture(NativeValue::Integer(2)),
        Err(ScanError::Incompatible { target: Bool, .. })
    ));

    let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    assert_eq!(
        Timestamp.capture(NativeValue::Text(b"2024-01-02 03:04:05")),
        Ok(Value::Timestamp(day.and_hms_opt(3, 4, 5).unwrap()))
    );
    assert_eq!(
        Timestamp.capture(NativeValue::Text(b"2024-01-02T03:04:05.250")),
        Ok(Value::Timestamp(day.and_hms_milli_opt(3, 4, 5, 250).unwrap()))
    );
    assert_eq!(Timestamp.capture(NativeValue::Text(b"2024-01-02")), Ok(Value::Date(day)));
    assert_eq!(
        Timestamp.capture(NativeValue::Text(b"2024-01-02T03:04:05Z")),
        Ok(Value::TimestampTz(
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap().fixed_offset()
        ))
    );
    assert_eq!(Timestamp.capture(NativeValue::Text(b"soon")), Ok(Value::from("soon")));
    assert!(matches!(
        Timestamp.capture(NativeValue::Integer(20240101)),
        Err(ScanError::Incompatible { target: Timestamp, found: "integer" })
    ));

    assert_eq!(Blob.capture(NativeValue::Text(b"ab")), Ok(Value::Blob(b"ab".to_vec())));
    assert_eq!(Dynamic.capture(NativeValue::Real(0.5)), Ok(Value::Real(0.5)));
    assert_eq!(
        Dynamic.capture(NativeValue::Text(b"\xff")),
        Ok(Value::Blob(vec![0xff]))
    );
}

#[test]
fn test_capture_or_native_keeps_storage_class() {
    use ScanTarget::*;

    // accepted values capture exactly as with capture()
    assert_eq!(Int64.capture_or_native(NativeValue::Text(b"42")), Value::Integer(42));
    assert_eq!(Bool.capture_or_native(NativeValue::Integer(1)), Value::Boolean(true));

    assert_eq!(Int64.capture_or_native(NativeValue::Real(1.5)), Value::Real(1.5));
    assert_eq!(Int64.capture_or_native(NativeValue::Text(b"abc")), Value::from("abc"));
    assert_eq!(Bool.capture_or_native(NativeValue::Integer(2)), Value::Integer(2));
    assert_eq!(
        Timestamp.capture_or_native(NativeValue::Real(2460000.5)),
        Value::Real(2460000.5)
    );
    assert_eq!(
        Timestamp.capture_or_native(NativeValue::Integer(20240101)),
        Value::Integer(20240101)
    );
    assert_eq!(Text.capture_or_native(NativeValue::Blob(b"\xff")), Value::Blob(vec![0xff]));
    assert_eq!(Float64.capture_or_native(NativeValue::Blob(b"\x01")), Value::Blob(vec![1]));
    assert_eq!(Blob.capture_or_native(NativeValue::Integer(3)), Value::Integer(3));
}
