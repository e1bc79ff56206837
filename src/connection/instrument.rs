use std::panic::Location;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::{error, warn};

use crate::error::{DbError, EngineError, Operation};
use crate::sqlite::{StatementHandle, StorageEngine};
use crate::types::SqlValue;

use super::Database;
use super::handle::run_blocking;

static RECURSIVE_QUERY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bWITH\s+RECURSIVE\b").expect("static regex"));

/// Recursive CTEs are summarized in slow-query logs instead of dumped.
pub(crate) fn is_recursive(sql: &str) -> bool {
    RECURSIVE_QUERY.is_match(sql)
}

/// One statement execution, timed for the slow-query log and then dropped.
pub(crate) struct QueryRecord<'a> {
    sql: &'a str,
    params: &'a [SqlValue],
    started: Instant,
}

impl<'a> QueryRecord<'a> {
    pub(crate) fn start(sql: &'a str, params: &'a [SqlValue]) -> Self {
        Self {
            sql,
            params,
            started: Instant::now(),
        }
    }

    pub(crate) fn finish(self, threshold: Duration) -> Duration {
        let elapsed = self.started.elapsed();
        if elapsed > threshold {
            let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
            if is_recursive(self.sql) {
                warn!(elapsed_ms, "slow recursive query");
            } else {
                warn!(elapsed_ms, sql = self.sql, params = ?self.params, "slow query");
            }
        }
        elapsed
    }
}

/// Log an engine failure with its full driver diagnostic and wrap it with the caller's location.
pub(crate) fn engine_failure(
    operation: Operation,
    sql: &str,
    caller: &'static Location<'static>,
    source: rusqlite::Error,
) -> DbError {
    error!(
        %operation,
        sql,
        caller = %caller,
        error = ?source,
        "sqlite statement failed"
    );
    EngineError::new(operation, sql, caller, source).into()
}

impl Database {
    /// Prepare `sql` through the statement cache and hand the compiled handle to `func`, timed.
    pub(crate) async fn with_statement<R, F>(
        &self,
        caller: &'static Location<'static>,
        operation: Operation,
        sql: String,
        params: Vec<SqlValue>,
        func: F,
    ) -> Result<R, DbError>
    where
        F: FnOnce(&mut dyn StorageEngine, &StatementHandle, &[SqlValue]) -> rusqlite::Result<R>
            + Send
            + 'static,
        R: Send + 'static,
    {
        let threshold = self.options().slow_query_threshold();
        run_blocking(self.slot(), move |conn| {
            let record = QueryRecord::start(&sql, &params);
            let handle = conn
                .prepare(&sql)
                .map_err(|e| engine_failure(Operation::Prepare, &sql, caller, e))?;
            let result = func(conn.engine.as_mut(), &handle, &params);
            record.finish(threshold);
            result.map_err(|e| engine_failure(operation, &sql, caller, e))
        })
        .await
    }

    /// Run unprepared SQL (transaction verbs, multi-statement scripts), timed.
    pub(crate) async fn exec_unprepared(
        &self,
        caller: &'static Location<'static>,
        operation: Operation,
        sql: String,
    ) -> Result<(), DbError> {
        let threshold = self.options().slow_query_threshold();
        run_blocking(self.slot(), move |conn| {
            let record = QueryRecord::start(&sql, &[]);
            let result = conn.engine.exec(&sql);
            record.finish(threshold);
            result.map_err(|e| engine_failure(operation, &sql, caller, e))
        })
        .await
    }
}
