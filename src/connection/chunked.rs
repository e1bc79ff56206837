use std::panic::Location;

use crate::error::DbError;
use crate::results::RowSet;
use crate::types::SqlValue;

use super::Database;

/// Stand-in for "one placeholder per list element" in chunked templates.
pub const CHUNK_MARKER: &str = "???";

/// `:chunk_0, :chunk_1, …` for a batch of `len` values.
pub(crate) fn chunk_placeholders(len: usize) -> String {
    (0..len)
        .map(|i| format!(":chunk_{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Split `params` into batches of at most `chunk_size` and rewrite the marker for each.
///
/// Every occurrence of the marker receives the same placeholder names, so a
/// template that repeats the marker binds each batch once.
pub(crate) fn plan_batches(
    template: &str,
    params: &[SqlValue],
    chunk_size: usize,
) -> Result<Vec<(String, Vec<SqlValue>)>, DbError> {
    if params.is_empty() {
        return Ok(Vec::new());
    }
    if !template.contains(CHUNK_MARKER) {
        return Err(DbError::ParameterError(format!(
            "chunked query template has no {CHUNK_MARKER} marker"
        )));
    }
    if chunk_size == 0 {
        return Err(DbError::ConfigError("chunk_size must be positive".into()));
    }
    Ok(params
        .chunks(chunk_size)
        .map(|batch| {
            let sql = template.replace(CHUNK_MARKER, &chunk_placeholders(batch.len()));
            (sql, batch.to_vec())
        })
        .collect())
}

impl Database {
    /// Run a chunked template as a write, one statement per batch, concatenating
    /// returned rows in batch order.
    ///
    /// `template` contains [`CHUNK_MARKER`] where the comma-joined parameter list
    /// belongs, e.g. `DELETE FROM items WHERE id IN (???) RETURNING id`. Batches
    /// hold at most [`crate::sqlite::DatabaseOptions::chunk_size`] values. Inside a
    /// transaction scope the first batch issues BEGIN. Outside one, the batches
    /// autocommit one by one while no other writer runs. An empty `params`
    /// returns an empty set without touching the engine.
    ///
    /// # Errors
    /// Returns `DbError::ParameterError` if the template lacks the marker, or
    /// the first engine failure; earlier batches are not undone outside a scope.
    #[track_caller]
    pub fn execute_many(
        &self,
        template: &str,
        params: &[SqlValue],
    ) -> impl Future<Output = Result<RowSet, DbError>> {
        let caller = Location::caller();
        let batches = plan_batches(template, params, self.options().chunk_size);
        async move {
            let batches = batches?;
            if batches.is_empty() {
                return Ok(RowSet::default());
            }
            let _lease = self.claim_writer(caller).await?;
            self.run_batches(caller, batches).await
        }
    }

    /// Read-only counterpart of [`Database::execute_many`]; never opens a transaction.
    ///
    /// # Errors
    /// Returns `DbError::ParameterError` if the template lacks the marker, or the
    /// first engine failure.
    #[track_caller]
    pub fn get_rows_many(
        &self,
        template: &str,
        params: &[SqlValue],
    ) -> impl Future<Output = Result<RowSet, DbError>> {
        let caller = Location::caller();
        let batches = plan_batches(template, params, self.options().chunk_size);
        async move { self.run_batches(caller, batches?).await }
    }

    async fn run_batches(
        &self,
        caller: &'static Location<'static>,
        batches: Vec<(String, Vec<SqlValue>)>,
    ) -> Result<RowSet, DbError> {
        let mut rows = RowSet::default();
        for (sql, params) in batches {
            rows.extend(self.fetch_all(caller, sql, params).await?);
        }
        Ok(rows)
    }
}
