use std::collections::HashMap;
use std::panic::Location;

use crate::error::{DbError, Operation};
use crate::results::{Row, RowSet};
use crate::types::SqlValue;

use super::Database;

impl Database {
    /// Fetch the first row of a query, if any. Never opens a transaction.
    ///
    /// # Errors
    /// Returns `DbError` if the connection is unavailable or the engine fails.
    #[track_caller]
    pub fn get_row(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> impl Future<Output = Result<Option<Row>, DbError>> {
        let caller = Location::caller();
        let sql = sql.to_owned();
        let params = params.to_vec();
        async move { self.fetch_row(caller, sql, params).await }
    }

    /// Fetch every row of a query in engine order. Never opens a transaction.
    ///
    /// # Errors
    /// Returns `DbError` if the connection is unavailable or the engine fails.
    #[track_caller]
    pub fn get_rows(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> impl Future<Output = Result<RowSet, DbError>> {
        let caller = Location::caller();
        let sql = sql.to_owned();
        let params = params.to_vec();
        async move { self.fetch_all(caller, sql, params).await }
    }

    /// First column of the first row, or `None` when the query yields no rows.
    ///
    /// # Errors
    /// Returns `DbError` if the connection is unavailable or the engine fails.
    #[track_caller]
    pub fn get_value(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> impl Future<Output = Result<Option<SqlValue>, DbError>> {
        let caller = Location::caller();
        let sql = sql.to_owned();
        let params = params.to_vec();
        async move {
            let row = self.fetch_row(caller, sql, params).await?;
            Ok(row.and_then(|row| row.into_values().into_iter().next()))
        }
    }

    /// First column of every row.
    ///
    /// # Errors
    /// Returns `DbError` if the connection is unavailable or the engine fails.
    #[track_caller]
    pub fn get_column(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> impl Future<Output = Result<Vec<SqlValue>, DbError>> {
        let caller = Location::caller();
        let sql = sql.to_owned();
        let params = params.to_vec();
        async move {
            let rows = self.fetch_all(caller, sql, params).await?;
            Ok(rows
                .into_iter()
                .filter_map(|row| row.into_values().into_iter().next())
                .collect())
        }
    }

    /// Map of first column to second column. A later duplicate key overwrites an earlier one.
    ///
    /// # Errors
    /// Returns `DbError::ParameterError` if a key is not text or an integer, or
    /// if the query yields fewer than two columns.
    #[track_caller]
    pub fn get_map(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> impl Future<Output = Result<HashMap<String, SqlValue>, DbError>> {
        let caller = Location::caller();
        let sql = sql.to_owned();
        let params = params.to_vec();
        async move {
            let rows = self.fetch_all(caller, sql, params).await?;
            if !rows.is_empty() && rows.column_names().len() < 2 {
                return Err(DbError::ParameterError(
                    "get_map needs a key column and a value column".into(),
                ));
            }
            let mut map = HashMap::with_capacity(rows.len());
            for row in rows {
                let mut values = row.into_values().into_iter();
                let key = match values.next() {
                    Some(SqlValue::Text(text)) => text,
                    Some(SqlValue::Int(i)) => i.to_string(),
                    other => {
                        return Err(DbError::ParameterError(format!(
                            "get_map key must be text or integer, got {other:?}"
                        )));
                    }
                };
                map.insert(key, values.next().unwrap_or(SqlValue::Null));
            }
            Ok(map)
        }
    }

    pub(crate) async fn fetch_row(
        &self,
        caller: &'static Location<'static>,
        sql: String,
        params: Vec<SqlValue>,
    ) -> Result<Option<Row>, DbError> {
        self.with_statement(caller, Operation::Get, sql, params, |engine, stmt, params| {
            engine.get(stmt, params)
        })
        .await
    }

    pub(crate) async fn fetch_all(
        &self,
        caller: &'static Location<'static>,
        sql: String,
        params: Vec<SqlValue>,
    ) -> Result<RowSet, DbError> {
        self.with_statement(caller, Operation::All, sql, params, |engine, stmt, params| {
            engine.all(stmt, params)
        })
        .await
    }
}
