use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::DbError;
use crate::notify::{CommitNotifier, NoopNotifier};
use crate::sqlite::{DatabaseOptions, StorageEngine};

use super::prepared::StatementCache;

pub(crate) type SharedSlot = Arc<Mutex<SlotState>>;

pub(crate) enum SlotState {
    Uninitialized,
    Open(ConnectionSlot),
    Closed,
}

/// The injected engine together with the statements compiled on it.
pub(crate) struct ConnectionSlot {
    pub(crate) engine: Box<dyn StorageEngine>,
    pub(crate) statements: StatementCache,
}

impl ConnectionSlot {
    fn new(engine: Box<dyn StorageEngine>) -> Self {
        Self {
            engine,
            statements: StatementCache::default(),
        }
    }
}

/// Handle to the process-wide connection.
///
/// Cheap to clone; every clone talks to the same engine. The connection is
/// injected once with [`Database::set_connection`] (or opened by
/// [`crate::sqlite::DatabaseOptionsBuilder::open`]) and closed once with
/// [`Database::close`].
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

struct DatabaseInner {
    slot: SharedSlot,
    // Held by the open transaction or by one autocommit write.
    writer: Arc<Mutex<()>>,
    options: DatabaseOptions,
    notifier: Arc<dyn CommitNotifier>,
}

impl Database {
    /// Create a handle with no connection yet; queries fail with
    /// `ConnectionNotInitialized` until one is injected.
    ///
    /// # Errors
    /// Returns `DbError::ConfigError` if the options are invalid.
    pub fn new(options: DatabaseOptions) -> Result<Self, DbError> {
        Self::with_notifier(options, Arc::new(NoopNotifier))
    }

    /// Like [`Database::new`], with a sink that is pinged after each committed write transaction.
    ///
    /// # Errors
    /// Returns `DbError::ConfigError` if the options are invalid.
    pub fn with_notifier(
        options: DatabaseOptions,
        notifier: Arc<dyn CommitNotifier>,
    ) -> Result<Self, DbError> {
        options.validate()?;
        Ok(Self {
            inner: Arc::new(DatabaseInner {
                slot: Arc::new(Mutex::new(SlotState::Uninitialized)),
                writer: Arc::new(Mutex::new(())),
                options,
                notifier,
            }),
        })
    }

    /// Inject the engine. Allowed exactly once per handle.
    ///
    /// # Errors
    /// Returns `AlreadyInitialized` if a connection was already set, or
    /// `ConnectionClosed` if the handle has been closed.
    pub async fn set_connection(&self, engine: Box<dyn StorageEngine>) -> Result<(), DbError> {
        let mut guard = self.inner.slot.lock().await;
        match &*guard {
            SlotState::Uninitialized => {
                *guard = SlotState::Open(ConnectionSlot::new(engine));
                info!(db_path = %self.inner.options.db_path, "sqlite connection initialized");
                Ok(())
            }
            SlotState::Open(_) => Err(DbError::AlreadyInitialized),
            SlotState::Closed => Err(DbError::ConnectionClosed),
        }
    }

    /// Close the connection. Later calls are no-ops.
    ///
    /// # Errors
    /// Returns `DbError::SqliteError` if the engine fails to close.
    pub async fn close(&self) -> Result<(), DbError> {
        let slot = Arc::clone(&self.inner.slot);
        tokio::task::spawn_blocking(move || {
            let mut guard = slot.blocking_lock();
            match std::mem::replace(&mut *guard, SlotState::Closed) {
                SlotState::Open(conn) => {
                    info!(
                        statements = conn.statements.len(),
                        "closing sqlite connection"
                    );
                    conn.engine.close().map_err(DbError::SqliteError)
                }
                SlotState::Uninitialized => Ok(()),
                SlotState::Closed => {
                    debug!("sqlite connection already closed");
                    Ok(())
                }
            }
        })
        .await
        .map_err(|e| DbError::ExecutionError(format!("sqlite spawn_blocking join error: {e}")))?
    }

    /// Whether a connection is injected and not yet closed.
    pub async fn is_open(&self) -> bool {
        matches!(&*self.inner.slot.lock().await, SlotState::Open(_))
    }

    #[must_use]
    pub fn options(&self) -> &DatabaseOptions {
        &self.inner.options
    }

    pub(crate) fn slot(&self) -> SharedSlot {
        Arc::clone(&self.inner.slot)
    }

    pub(crate) fn writer_gate(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.inner.writer)
    }

    pub(crate) fn notifier(&self) -> &dyn CommitNotifier {
        self.inner.notifier.as_ref()
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

/// Run `func` against the open connection on the blocking pool.
pub(crate) async fn run_blocking<F, R>(slot: SharedSlot, func: F) -> Result<R, DbError>
where
    F: FnOnce(&mut ConnectionSlot) -> Result<R, DbError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = slot.blocking_lock();
        match &mut *guard {
            SlotState::Open(conn) => func(conn),
            SlotState::Uninitialized => Err(DbError::ConnectionNotInitialized),
            SlotState::Closed => Err(DbError::ConnectionClosed),
        }
    })
    .await
    .map_err(|e| DbError::ExecutionError(format!("sqlite spawn_blocking join error: {e}")))?
}
