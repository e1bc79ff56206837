//! Close the connection when the process is told to stop.
//!
//! Normal exit needs nothing extra: dropping the last engine closes the
//! `SQLite` connection. Signals bypass destructors, so the listener closes the
//! database explicitly and waits for the close to finish before the process
//! may exit.

use std::fmt;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::connection::Database;
use crate::error::DbError;

/// Signal that triggered shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    UserDefined,
    Terminate,
}

impl ShutdownSignal {
    /// Conventional exit status for a process stopped by this signal.
    #[must_use]
    pub fn exit_code(self) -> i32 {
        let signo = match self {
            ShutdownSignal::Interrupt => 2,
            ShutdownSignal::UserDefined => 10,
            ShutdownSignal::Terminate => 15,
        };
        128 + signo
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShutdownSignal::Interrupt => "SIGINT",
            ShutdownSignal::UserDefined => "SIGUSR1",
            ShutdownSignal::Terminate => "SIGTERM",
        };
        f.write_str(name)
    }
}

/// What the listener does after the database is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownPolicy {
    /// Exit the process with [`ShutdownSignal::exit_code`].
    #[default]
    Exit,
    /// Return the signal from the listener task and let the host decide.
    Return,
}

/// Spawn a task that waits for SIGINT, SIGUSR1 or SIGTERM, then closes `db`.
///
/// On non-unix targets only ctrl-c is observed.
#[must_use]
pub fn spawn_shutdown_listener(
    db: Database,
    policy: ShutdownPolicy,
) -> JoinHandle<Result<ShutdownSignal, DbError>> {
    tokio::spawn(async move {
        let signal = wait_for_signal().await.map_err(|e| {
            DbError::ConfigError(format!("failed to install signal handlers: {e}"))
        })?;
        info!(%signal, "shutdown signal received; closing database");
        if let Err(err) = db.close().await {
            error!(error = %err, "failed to close database during shutdown");
        }
        if policy == ShutdownPolicy::Exit {
            std::process::exit(signal.exit_code());
        }
        Ok(signal)
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<ShutdownSignal> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut user_defined = signal(SignalKind::user_defined1())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = interrupt.recv() => Ok(ShutdownSignal::Interrupt),
        _ = user_defined.recv() => Ok(ShutdownSignal::UserDefined),
        _ = terminate.recv() => Ok(ShutdownSignal::Terminate),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<ShutdownSignal> {
    tokio::signal::ctrl_c().await?;
    Ok(ShutdownSignal::Interrupt)
}
