//! Single-connection data access over embedded `SQLite`.
//!
//! A [`Database`] owns one injected [`StorageEngine`] and layers on top of it
//! a statement cache, row helpers, chunked execution for long parameter
//! lists, and implicit transaction scopes carried in task-local state.
//!
//! ```rust,no_run
//! use sqlite_scope::prelude::*;
//!
//! # async fn demo() -> Result<(), DbError> {
//! let db = DatabaseOptions::builder("app.db").open().await?;
//! db.execute_script("CREATE TABLE IF NOT EXISTS notes (id INTEGER PRIMARY KEY, body TEXT)")
//!     .await?;
//! db.transactional(|| async {
//!     db.insert("notes", &Record::new().with("body", "hello")).await?;
//!     Ok::<_, DbError>(())
//! })
//! .await?;
//! let count = db.get_value("SELECT COUNT(*) FROM notes", &[]).await?;
//! assert_eq!(count.and_then(|v| v.as_int()), Some(1));
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod notify;
pub mod prelude;
pub mod results;
pub mod shutdown;
pub mod sqlite;
pub mod types;

pub use connection::{CHUNK_MARKER, Database, ScopeFlags, StatementCache, scope_flags};
pub use error::{DbError, EngineError, Operation};
pub use notify::{BroadcastNotifier, CommitEvent, CommitNotifier, NoopNotifier};
pub use results::{Columns, Row, RowSet};
pub use shutdown::{ShutdownPolicy, ShutdownSignal, spawn_shutdown_listener};
pub use sqlite::{
    DatabaseOptions, DatabaseOptionsBuilder, RunResult, SqliteEngine, StatementHandle,
    StorageEngine,
};
pub use types::{Record, SqlValue};
