use std::sync::Arc;

use super::row::{Columns, Row};
use crate::types::SqlValue;

/// Rows returned by a statement, in engine order.
///
/// Chunked executions append each batch's rows with [`RowSet::extend`], so the
/// set stays ordered batch by batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    columns: Option<Arc<Columns>>,
    rows: Vec<Row>,
}

impl RowSet {
    #[must_use]
    pub fn new(columns: Arc<Columns>) -> Self {
        Self {
            columns: Some(columns),
            rows: Vec::new(),
        }
    }

    /// Append a row built from raw values under this set's columns.
    pub fn push_values(&mut self, values: Vec<SqlValue>) {
        let columns = self
            .columns
            .get_or_insert_with(|| Arc::new(Columns::default()))
            .clone();
        self.rows.push(Row::new(columns, values));
    }

    /// Append every row of `other`, after the rows already held.
    pub fn extend(&mut self, other: RowSet) {
        if self.columns.is_none() {
            self.columns = other.columns;
        }
        self.rows.extend(other.rows);
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        match &self.columns {
            Some(columns) => columns.names(),
            None => &[],
        }
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    #[must_use]
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }
}

impl IntoIterator for RowSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a RowSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_of(ids: &[i64]) -> RowSet {
        let mut set = RowSet::new(Arc::new(Columns::new(vec!["id".into()])));
        for id in ids {
            set.push_values(vec![SqlValue::Int(*id)]);
        }
        set
    }

    #[test]
    fn extend_keeps_batch_order() {
        let mut all = RowSet::default();
        all.extend(set_of(&[1, 2]));
        all.extend(set_of(&[3]));
        let ids: Vec<i64> = all
            .iter()
            .filter_map(|row| row.get("id").and_then(SqlValue::as_int))
            .collect();
        assert_eq!(ids, [1, 2, 3]);
        assert_eq!(all.column_names(), ["id".to_string()]);
    }
}
