use std::sync::Arc;

use rusqlite::Statement;
use rusqlite::types::Value;

use crate::results::{Columns, RowSet};
use crate::types::SqlValue;

/// Extract a `SqlValue` from a `SQLite` row.
///
/// # Errors
///
/// Returns the driver error if the column cannot be read.
pub fn extract_value(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<SqlValue> {
    let value: Value = row.get(idx)?;
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Int(i),
        Value::Real(f) => SqlValue::Float(f),
        Value::Text(s) => SqlValue::Text(s),
        Value::Blob(b) => SqlValue::Blob(b),
    })
}

/// Column metadata for a prepared statement.
#[must_use]
pub fn statement_columns(stmt: &Statement<'_>) -> Arc<Columns> {
    let names = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    Arc::new(Columns::new(names))
}

/// Run a statement and materialize at most `limit` rows (all rows when `None`).
///
/// Statements that produce no rows (DML without `RETURNING`) still execute.
///
/// # Errors
/// Returns the driver error if execution or value extraction fails.
pub fn build_row_set(
    stmt: &mut Statement<'_>,
    params: &[Value],
    limit: Option<usize>,
) -> rusqlite::Result<RowSet> {
    let columns = statement_columns(stmt);
    let col_count = columns.len();
    let mut row_set = RowSet::new(columns);

    let mut rows_iter = stmt.query(rusqlite::params_from_iter(params.iter()))?;
    while let Some(row) = rows_iter.next()? {
        let mut values = Vec::with_capacity(col_count);
        for i in 0..col_count {
            values.push(extract_value(row, i)?);
        }
        row_set.push_values(values);
        if limit.is_some_and(|limit| row_set.len() >= limit) {
            break;
        }
    }

    Ok(row_set)
}
