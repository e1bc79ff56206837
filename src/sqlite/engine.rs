use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use rusqlite::Connection;
use tracing::debug;

use crate::results::{Row, RowSet};
use crate::types::SqlValue;

use super::config::DatabaseOptions;
use super::params::Params;
use super::query::build_row_set;

/// A compiled statement, identified by the engine that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatementHandle {
    id: u64,
    sql: Arc<str>,
}

impl StatementHandle {
    #[must_use]
    pub fn new(id: u64, sql: &str) -> Self {
        Self {
            id,
            sql: Arc::from(sql),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// Outcome of running a statement that returns no rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunResult {
    pub changes: usize,
    pub last_insert_rowid: i64,
}

/// The primitives the access layer needs from the embedded store.
///
/// All calls arrive serialized on one blocking thread at a time; implementors
/// never see concurrent access.
pub trait StorageEngine: Send + 'static {
    /// Compile `sql` into a reusable statement.
    ///
    /// # Errors
    /// Returns the driver error if the statement does not compile.
    fn prepare(&mut self, sql: &str) -> rusqlite::Result<StatementHandle>;

    /// Execute a compiled statement that returns no rows.
    ///
    /// # Errors
    /// Returns the driver error if execution fails.
    fn run(&mut self, stmt: &StatementHandle, params: &[SqlValue]) -> rusqlite::Result<RunResult>;

    /// Execute a compiled statement and return its first row, if any.
    ///
    /// # Errors
    /// Returns the driver error if execution fails.
    fn get(&mut self, stmt: &StatementHandle, params: &[SqlValue])
    -> rusqlite::Result<Option<Row>>;

    /// Execute a compiled statement and return every row in order.
    ///
    /// # Errors
    /// Returns the driver error if execution fails.
    fn all(&mut self, stmt: &StatementHandle, params: &[SqlValue]) -> rusqlite::Result<RowSet>;

    /// Run one or more statements without preparing or binding (transaction verbs, scripts).
    ///
    /// # Errors
    /// Returns the driver error if any statement fails.
    fn exec(&mut self, sql: &str) -> rusqlite::Result<()>;

    /// Close the underlying connection, flushing pending writes.
    ///
    /// # Errors
    /// Returns the driver error if the connection refuses to close.
    fn close(self: Box<Self>) -> rusqlite::Result<()>;
}

/// Starting size of rusqlite's statement cache; it doubles as distinct SQL arrives.
pub const INITIAL_STATEMENT_CAPACITY: usize = 64;

/// [`StorageEngine`] over a single `rusqlite` connection.
///
/// Compiled statements live in rusqlite's statement cache and a handle only
/// carries the SQL key back into it. That cache is an LRU, so its capacity is
/// grown before each new distinct statement is compiled: nothing compiled
/// here is ever evicted while the connection is open.
pub struct SqliteEngine {
    conn: Connection,
    next_id: u64,
    compiled: HashSet<String>,
    capacity: usize,
}

impl SqliteEngine {
    /// Open (or create) the database file described by `opts`.
    ///
    /// # Errors
    /// Returns the driver error if the file cannot be opened or the WAL pragma fails.
    pub fn open(opts: &DatabaseOptions) -> rusqlite::Result<Self> {
        let conn = Connection::open(&opts.db_path)?;
        if opts.wal {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            tracing::debug!(journal_mode = %mode, "sqlite journal mode set");
        }
        Ok(Self::from_connection(conn))
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Returns the driver error if `SQLite` cannot allocate the database.
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::from_connection(conn))
    }

    #[must_use]
    pub fn from_connection(conn: Connection) -> Self {
        conn.set_prepared_statement_cache_capacity(INITIAL_STATEMENT_CAPACITY);
        Self {
            conn,
            next_id: 0,
            compiled: HashSet::new(),
            capacity: INITIAL_STATEMENT_CAPACITY,
        }
    }

    /// Distinct statements compiled on this connection.
    #[must_use]
    pub fn compiled_count(&self) -> usize {
        self.compiled.len()
    }

    /// Current capacity of rusqlite's statement cache.
    #[must_use]
    pub fn statement_capacity(&self) -> usize {
        self.capacity
    }

    // Make room for `sql` in the driver cache before it is compiled.
    fn reserve(&mut self, sql: &str) -> bool {
        if self.compiled.contains(sql) {
            return false;
        }
        if self.compiled.len() >= self.capacity {
            self.capacity *= 2;
            self.conn.set_prepared_statement_cache_capacity(self.capacity);
            debug!(capacity = self.capacity, "grew sqlite statement cache");
        }
        self.compiled.insert(sql.to_owned());
        true
    }
}

impl fmt::Debug for SqliteEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteEngine")
            .field("path", &self.conn.path())
            .field("prepared", &self.next_id)
            .field("compiled", &self.compiled.len())
            .finish()
    }
}

impl StorageEngine for SqliteEngine {
    fn prepare(&mut self, sql: &str) -> rusqlite::Result<StatementHandle> {
        // Compile now so syntax errors surface at prepare time; the statement
        // returns to rusqlite's cache when dropped.
        let fresh = self.reserve(sql);
        if let Err(err) = self.conn.prepare_cached(sql) {
            if fresh {
                self.compiled.remove(sql);
            }
            return Err(err);
        }
        self.next_id += 1;
        Ok(StatementHandle::new(self.next_id, sql))
    }

    fn run(&mut self, stmt: &StatementHandle, params: &[SqlValue]) -> rusqlite::Result<RunResult> {
        let params = Params::convert(params);
        self.reserve(stmt.sql());
        let mut compiled = self.conn.prepare_cached(stmt.sql())?;
        let changes = compiled.execute(rusqlite::params_from_iter(params.as_values().iter()))?;
        Ok(RunResult {
            changes,
            last_insert_rowid: self.conn.last_insert_rowid(),
        })
    }

    fn get(
        &mut self,
        stmt: &StatementHandle,
        params: &[SqlValue],
    ) -> rusqlite::Result<Option<Row>> {
        let params = Params::convert(params);
        self.reserve(stmt.sql());
        let mut compiled = self.conn.prepare_cached(stmt.sql())?;
        let rows = build_row_set(&mut compiled, params.as_values(), Some(1))?;
        Ok(rows.into_rows().into_iter().next())
    }

    fn all(&mut self, stmt: &StatementHandle, params: &[SqlValue]) -> rusqlite::Result<RowSet> {
        let params = Params::convert(params);
        self.reserve(stmt.sql());
        let mut compiled = self.conn.prepare_cached(stmt.sql())?;
        build_row_set(&mut compiled, params.as_values(), None)
    }

    fn exec(&mut self, sql: &str) -> rusqlite::Result<()> {
        self.conn.execute_batch(sql)
    }

    fn close(self: Box<Self>) -> rusqlite::Result<()> {
        self.conn.close().map_err(|(_, err)| err)
    }
}
