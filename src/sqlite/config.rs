use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::connection::Database;
use crate::error::DbError;
use crate::notify::{CommitNotifier, NoopNotifier};

use super::engine::SqliteEngine;

/// SQLite refuses statements with more bound parameters than this.
pub const ENGINE_PARAM_CAP: usize = 999;
/// Default batch size for chunked statements; leaves headroom under [`ENGINE_PARAM_CAP`].
pub const DEFAULT_CHUNK_SIZE: usize = 900;
pub const DEFAULT_SLOW_QUERY_THRESHOLD_MS: u64 = 300;

/// Options for opening the process-wide `SQLite` connection.
///
/// Deserializable so hosts can embed it in their own config files; missing
/// fields take the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DatabaseOptions {
    pub db_path: String,
    pub chunk_size: usize,
    pub slow_query_threshold_ms: u64,
    pub wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self::new(":memory:".to_string())
    }
}

impl DatabaseOptions {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self {
            db_path,
            chunk_size: DEFAULT_CHUNK_SIZE,
            slow_query_threshold_ms: DEFAULT_SLOW_QUERY_THRESHOLD_MS,
            wal: true,
        }
    }

    #[must_use]
    pub fn builder(db_path: impl Into<String>) -> DatabaseOptionsBuilder {
        DatabaseOptionsBuilder::new(db_path.into())
    }

    #[must_use]
    pub fn slow_query_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_query_threshold_ms)
    }

    /// Check the options against engine limits.
    ///
    /// # Errors
    /// Returns `DbError::ConfigError` if the chunk size is zero or not below the engine cap,
    /// or if the path is empty.
    pub fn validate(&self) -> Result<(), DbError> {
        if self.db_path.is_empty() {
            return Err(DbError::ConfigError("db_path must not be empty".into()));
        }
        if self.chunk_size == 0 || self.chunk_size >= ENGINE_PARAM_CAP {
            return Err(DbError::ConfigError(format!(
                "chunk_size must be between 1 and {}, got {}",
                ENGINE_PARAM_CAP - 1,
                self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Fluent builder for [`DatabaseOptions`].
#[derive(Debug, Clone)]
pub struct DatabaseOptionsBuilder {
    opts: DatabaseOptions,
    notifier: Option<Arc<dyn CommitNotifier>>,
}

impl DatabaseOptionsBuilder {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self {
            opts: DatabaseOptions::new(db_path),
            notifier: None,
        }
    }

    #[must_use]
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.opts.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub fn slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.opts.slow_query_threshold_ms = u64::try_from(threshold.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn wal(mut self, wal: bool) -> Self {
        self.opts.wal = wal;
        self
    }

    /// Sink pinged after each committed write transaction.
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn CommitNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    #[must_use]
    pub fn finish(self) -> DatabaseOptions {
        self.opts
    }

    /// Open the database file and inject the connection.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the options are invalid or the file cannot be opened.
    pub async fn open(self) -> Result<Database, DbError> {
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(NoopNotifier));
        let opts = self.opts;
        opts.validate()?;
        let open_opts = opts.clone();
        let engine = tokio::task::spawn_blocking(move || SqliteEngine::open(&open_opts))
            .await
            .map_err(|e| {
                DbError::ExecutionError(format!("sqlite spawn_blocking join error: {e}"))
            })??;
        let db = Database::with_notifier(opts, notifier)?;
        db.set_connection(Box::new(engine)).await?;
        Ok(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_chunk_size_at_engine_cap() {
        let opts = DatabaseOptions::builder("x.db").chunk_size(999).finish();
        assert!(matches!(opts.validate(), Err(DbError::ConfigError(_))));
        let opts = DatabaseOptions::builder("x.db").chunk_size(0).finish();
        assert!(matches!(opts.validate(), Err(DbError::ConfigError(_))));
        let opts = DatabaseOptions::builder("x.db").chunk_size(998).finish();
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn deserializes_with_defaults() {
        let opts: DatabaseOptions =
            serde_json::from_str(r#"{ "db_path": "app.db", "wal": false }"#).expect("options");
        assert_eq!(opts.db_path, "app.db");
        assert!(!opts.wal);
        assert_eq!(opts.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(opts.slow_query_threshold(), Duration::from_millis(300));
    }
}
