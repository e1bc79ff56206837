use std::collections::HashMap;
use std::panic::Location;

use tracing::debug;

use crate::error::{DbError, Operation};
use crate::sqlite::{StatementHandle, StorageEngine};

use super::handle::{ConnectionSlot, run_blocking};
use super::instrument::engine_failure;
use super::Database;

/// Compiled statements keyed by their exact SQL text.
///
/// Entries live as long as the connection; there is no eviction. Lookups are
/// whitespace-sensitive, so `"SELECT 1"` and `"SELECT  1"` compile separately.
#[derive(Debug, Default)]
pub struct StatementCache {
    entries: HashMap<String, StatementHandle>,
}

impl StatementCache {
    /// Return the cached handle for `sql`, compiling it on first use.
    ///
    /// # Errors
    /// Returns the engine's error if compilation fails; nothing is cached in that case.
    pub fn get_or_prepare(
        &mut self,
        engine: &mut dyn StorageEngine,
        sql: &str,
    ) -> rusqlite::Result<StatementHandle> {
        if let Some(handle) = self.entries.get(sql) {
            return Ok(handle.clone());
        }
        let handle = engine.prepare(sql)?;
        debug!(statement_id = handle.id(), "compiled statement");
        self.entries.insert(sql.to_owned(), handle.clone());
        Ok(handle)
    }

    #[must_use]
    pub fn get(&self, sql: &str) -> Option<&StatementHandle> {
        self.entries.get(sql)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ConnectionSlot {
    pub(crate) fn prepare(&mut self, sql: &str) -> rusqlite::Result<StatementHandle> {
        self.statements.get_or_prepare(self.engine.as_mut(), sql)
    }
}

impl Database {
    /// Compile `sql` (or fetch it from the statement cache) and return its handle.
    ///
    /// # Errors
    /// Returns `ConnectionNotInitialized` before a connection is injected, or an
    /// engine error if the SQL does not compile.
    #[track_caller]
    pub fn prepare(
        &self,
        sql: &str,
    ) -> impl Future<Output = Result<StatementHandle, DbError>> {
        let caller = Location::caller();
        let sql = sql.to_owned();
        let slot = self.slot();
        async move {
            run_blocking(slot, move |conn| {
                conn.prepare(&sql)
                    .map_err(|e| engine_failure(Operation::Prepare, &sql, caller, e))
            })
            .await
        }
    }

    /// Number of distinct statements compiled on the current connection.
    pub async fn cached_statement_count(&self) -> usize {
        run_blocking(self.slot(), |conn| Ok(conn.statements.len()))
            .await
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteEngine;

    #[test]
    fn same_text_reuses_handle() {
        let mut engine = SqliteEngine::open_in_memory().expect("engine");
        let mut cache = StatementCache::default();
        let first = cache.get_or_prepare(&mut engine, "SELECT 1").expect("prepare");
        let second = cache.get_or_prepare(&mut engine, "SELECT 1").expect("prepare");
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);

        let spaced = cache.get_or_prepare(&mut engine, "SELECT  1").expect("prepare");
        assert_ne!(first.id(), spaced.id());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failed_compile_is_not_cached() {
        let mut engine = SqliteEngine::open_in_memory().expect("engine");
        let mut cache = StatementCache::default();
        assert!(cache.get_or_prepare(&mut engine, "SELEKT nope").is_err());
        assert!(cache.is_empty());
    }
}
