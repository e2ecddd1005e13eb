use crate::dialect::Dialect;
use crate::error::Result;
use crate::scan::{ColumnMeta, ScanTarget};
use crate::value::Value;
use rusqlite::{Rows, Statement};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Row cursor over one executed query.
pub trait Cursor {
    /// Column metadata, in select-list order.
    fn columns(&self) -> &[ColumnMeta];

    /// Advance one row and capture each column into the matching target.
    /// Returns `None` once the cursor is exhausted.
    fn scan_next(&mut self, targets: &[ScanTarget]) -> Result<Option<Vec<Value>>>;
}

/// Cursor over a running SQLite statement. The statement is reset when the
/// cursor is dropped.
///
/// Never reports [`crate::Error::Scan`].
pub struct SqliteCursor<'stmt> {
    columns: Vec<ColumnMeta>,
    rows: Rows<'stmt>,
}

impl<'stmt> SqliteCursor<'stmt> {
    pub fn query<P: rusqlite::Params>(stmt: &'stmt mut Statement<'_>, params: P) -> Result<Self> {
        let columns = stmt
            .columns()
            .iter()
            .map(|column| ColumnMeta::new(column.name(), column.decl_type()))
            .collect();
        let rows = stmt.query(params)?;
        Ok(Self { columns, rows })
    }
}

impl Cursor for SqliteCursor<'_> {
    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    fn scan_next(&mut self, targets: &[ScanTarget]) -> Result<Option<Vec<Value>>> {
        let Some(row) = self.rows.next()? else {
            return Ok(None);
        };
        // declared types are affinities in SQLite, so a cell the target
        // cannot hold keeps its storage class instead of failing the row
        targets
            .iter()
            .take(self.columns.len())
            .enumerate()
            .map(|(index, target)| {
                let native = row.get_ref(index)?;
                Ok(target.capture_or_native(native.into()))
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }
}

/// Shape of the rows handed back to the caller
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultShape {
    /// Each row is a list of values in column order.
    #[default]
    Positional,
    /// Each row maps column name to value; a repeated name keeps the last value.
    Labeled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResultSet {
    Positional(Vec<Vec<Value>>),
    Labeled(Vec<HashMap<String, Value>>),
}

impl ResultSet {
    pub fn shape(&self) -> ResultShape {
        match self {
            ResultSet::Positional(_) => ResultShape::Positional,
            ResultSet::Labeled(_) => ResultShape::Labeled,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ResultSet::Positional(rows) => rows.len(),
            ResultSet::Labeled(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drain `cursor` into a result set of the requested shape.
///
/// Scan targets are resolved through `dialect` afresh for every row. Any
/// cursor or scan error abandons the rows collected so far.
pub fn materialize<C: Cursor + ?Sized>(
    cursor: &mut C,
    dialect: Dialect,
    shape: ResultShape,
) -> Result<ResultSet> {
    let columns = cursor.columns().to_vec();
    let targets_for_row = || -> Vec<ScanTarget> {
        columns
            .iter()
            .map(|column| dialect.scan_target_for(column))
            .collect()
    };

    match shape {
        ResultShape::Positional => {
            let mut rows = Vec::new();
            while let Some(values) = cursor.scan_next(&targets_for_row())? {
                rows.push(values);
            }
            Ok(ResultSet::Positional(rows))
        }
        ResultShape::Labeled => {
            let mut rows = Vec::new();
            while let Some(values) = cursor.scan_next(&targets_for_row())? {
                let row: HashMap<String, Value> = columns
                    .iter()
                    .map(|column| column.name.clone())
                    .zip(values)
                    .collect();
                rows.push(row);
            }
            Ok(ResultSet::Labeled(rows))
        }
    }
}
