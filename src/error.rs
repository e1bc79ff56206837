use std::fmt;
use std::panic::Location;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database connection has not been initialized")]
    ConnectionNotInitialized,

    #[error("database connection is already initialized")]
    AlreadyInitialized,

    #[error("database connection has been closed")]
    ConnectionClosed,

    #[error(transparent)]
    Engine(Box<EngineError>),

    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    /// For host [`CommitNotifier`](crate::notify::CommitNotifier)s that fail to
    /// reach their clients; the coordinator logs it and keeps the commit.
    #[error("Client notification error: {0}")]
    NotifyError(String),
}

impl DbError {
    /// The engine failure behind this error, if it came from a statement.
    #[must_use]
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            DbError::Engine(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EngineError> for DbError {
    fn from(err: EngineError) -> Self {
        DbError::Engine(Box::new(err))
    }
}

/// Which helper was running when the engine failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Prepare,
    Run,
    Get,
    All,
    Exec,
    Begin,
    Commit,
    Rollback,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Prepare => "prepare",
            Operation::Run => "run",
            Operation::Get => "get",
            Operation::All => "all",
            Operation::Exec => "exec",
            Operation::Begin => "begin",
            Operation::Commit => "commit",
            Operation::Rollback => "rollback",
        };
        f.write_str(name)
    }
}

/// A storage engine failure, tagged with the application call site that issued the SQL.
///
/// The driver error is kept intact as the `source`, so walking
/// [`std::error::Error::source`] reaches the original `rusqlite` diagnostic.
#[derive(Debug, Error)]
#[error("sqlite {operation} failed (called from {caller}): {source}")]
pub struct EngineError {
    pub operation: Operation,
    pub sql: String,
    pub caller: &'static Location<'static>,
    #[source]
    pub source: rusqlite::Error,
}

impl EngineError {
    #[must_use]
    pub fn new(
        operation: Operation,
        sql: impl Into<String>,
        caller: &'static Location<'static>,
        source: rusqlite::Error,
    ) -> Self {
        Self {
            operation,
            sql: sql.into(),
            caller,
            source,
        }
    }
}
