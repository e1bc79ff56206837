use std::panic::Location;

use tracing::warn;

use crate::error::{DbError, Operation};
use crate::sqlite::RunResult;
use crate::types::{Record, SqlValue};

use super::Database;

/// `INSERT [OR REPLACE] INTO table (cols) VALUES (?, …)` in record order.
pub(crate) fn insert_sql(table: &str, record: &Record, replace: bool) -> String {
    let verb = if replace { "INSERT OR REPLACE" } else { "INSERT" };
    let columns = record.columns().collect::<Vec<_>>().join(", ");
    let placeholders = vec!["?"; record.len()].join(", ");
    format!("{verb} INTO {table} ({columns}) VALUES ({placeholders})")
}

/// `INSERT … ON CONFLICT(pk) DO UPDATE SET …` with `:column` placeholders.
///
/// Each column name appears once as a placeholder, so the statement binds
/// positionally in record order.
pub(crate) fn upsert_sql(table: &str, primary_key: &str, record: &Record) -> String {
    let columns: Vec<&str> = record.columns().collect();
    let placeholders = columns
        .iter()
        .map(|column| format!(":{column}"))
        .collect::<Vec<_>>()
        .join(", ");
    let updates = columns
        .iter()
        .filter(|column| **column != primary_key)
        .map(|column| format!("{column} = :{column}"))
        .collect::<Vec<_>>();
    let action = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };
    format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders}) ON CONFLICT({primary_key}) {action}",
        columns.join(", ")
    )
}

impl Database {
    /// Execute a single write statement. Inside a transaction scope the first
    /// write issues BEGIN; outside one it waits for any open transaction to end.
    ///
    /// # Errors
    /// Returns `DbError` if the connection is unavailable, BEGIN fails, or the engine fails.
    #[track_caller]
    pub fn execute(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> impl Future<Output = Result<RunResult, DbError>> {
        let caller = Location::caller();
        let sql = sql.to_owned();
        let params = params.to_vec();
        async move { self.execute_at(caller, sql, params).await }
    }

    /// Execute a multi-statement script without binding parameters.
    ///
    /// # Errors
    /// Returns `DbError` if the connection is unavailable, BEGIN fails, or any statement fails.
    #[track_caller]
    pub fn execute_script(&self, sql: &str) -> impl Future<Output = Result<(), DbError>> {
        let caller = Location::caller();
        let sql = sql.to_owned();
        async move {
            let _lease = self.claim_writer(caller).await?;
            self.exec_unprepared(caller, Operation::Exec, sql).await
        }
    }

    /// Insert `record` and return the new row id.
    ///
    /// An empty record is logged and skipped: the engine is not called and the
    /// result is `Ok(None)`.
    ///
    /// # Errors
    /// Returns `DbError` if the connection is unavailable or the engine fails.
    #[track_caller]
    pub fn insert(
        &self,
        table: &str,
        record: &Record,
    ) -> impl Future<Output = Result<Option<i64>, DbError>> {
        self.insert_at(Location::caller(), table, record, false)
    }

    /// [`Database::insert`] with `INSERT OR REPLACE`.
    ///
    /// # Errors
    /// Returns `DbError` if the connection is unavailable or the engine fails.
    #[track_caller]
    pub fn replace(
        &self,
        table: &str,
        record: &Record,
    ) -> impl Future<Output = Result<Option<i64>, DbError>> {
        self.insert_at(Location::caller(), table, record, true)
    }

    /// Insert `record`, updating the existing row when `primary_key` conflicts.
    ///
    /// Booleans are bound as 0/1 from a normalized copy; `record` is not modified.
    /// An empty record is logged and skipped with `Ok(None)`.
    ///
    /// # Errors
    /// Returns `DbError` if the connection is unavailable or the engine fails.
    #[track_caller]
    pub fn upsert(
        &self,
        table: &str,
        primary_key: &str,
        record: &Record,
    ) -> impl Future<Output = Result<Option<RunResult>, DbError>> {
        let caller = Location::caller();
        let table = table.to_owned();
        let statement =
            (!record.is_empty()).then(|| upsert_sql(&table, primary_key, record));
        let params: Vec<SqlValue> = record.values().map(SqlValue::normalized).collect();
        async move {
            let Some(sql) = statement else {
                warn!(table = %table, "upsert skipped: record has no fields");
                return Ok(None);
            };
            self.execute_at(caller, sql, params).await.map(Some)
        }
    }

    fn insert_at(
        &self,
        caller: &'static Location<'static>,
        table: &str,
        record: &Record,
        replace: bool,
    ) -> impl Future<Output = Result<Option<i64>, DbError>> {
        let table = table.to_owned();
        let statement = (!record.is_empty()).then(|| insert_sql(&table, record, replace));
        let params: Vec<SqlValue> = record.values().cloned().collect();
        async move {
            let Some(sql) = statement else {
                warn!(table = %table, "insert skipped: record has no fields");
                return Ok(None);
            };
            let result = self.execute_at(caller, sql, params).await?;
            Ok(Some(result.last_insert_rowid))
        }
    }

    pub(crate) async fn execute_at(
        &self,
        caller: &'static Location<'static>,
        sql: String,
        params: Vec<SqlValue>,
    ) -> Result<RunResult, DbError> {
        let _lease = self.claim_writer(caller).await?;
        self.with_statement(caller, Operation::Run, sql, params, |engine, stmt, params| {
            engine.run(stmt, params)
        })
        .await
    }
}
