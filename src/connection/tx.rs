use std::panic::Location;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::{OnceCell, OwnedMutexGuard};
use tracing::{debug, error, warn};

use crate::error::{DbError, Operation};

use super::Database;
use super::handle::{SharedSlot, run_blocking};

tokio::task_local! {
    // Present only inside the outermost `transactional` call of a task.
    static SCOPE: Arc<ScopeState>;
}

/// Exclusive right to write on the connection; held from BEGIN to COMMIT/ROLLBACK.
pub(crate) type WriterLease = OwnedMutexGuard<()>;

/// Per-scope transaction state.
///
/// `begun` is set once the physical BEGIN succeeded; concurrent writes joined
/// inside one scope wait on the same initialization instead of racing to BEGIN.
/// `lease` holds the writer gate for as long as the transaction is open.
#[derive(Debug, Default)]
pub(crate) struct ScopeState {
    begun: OnceCell<()>,
    lease: StdMutex<Option<WriterLease>>,
}

impl ScopeState {
    fn in_transaction(&self) -> bool {
        self.begun.initialized()
    }

    fn hold(&self, lease: WriterLease) {
        *self.lease.lock().unwrap_or_else(PoisonError::into_inner) = Some(lease);
    }

    fn release(&self) -> Option<WriterLease> {
        self.lease
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Transaction flags as seen from the current task.
///
/// `is_in_transaction` implies `is_transactional`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScopeFlags {
    /// A `transactional` call is in progress higher up this call chain.
    pub is_transactional: bool,
    /// A physical BEGIN has been issued for that scope.
    pub is_in_transaction: bool,
}

/// Report the transaction flags for the calling task.
#[must_use]
pub fn scope_flags() -> ScopeFlags {
    SCOPE
        .try_with(|state| ScopeFlags {
            is_transactional: true,
            is_in_transaction: state.in_transaction(),
        })
        .unwrap_or_default()
}

fn current_scope() -> Option<Arc<ScopeState>> {
    SCOPE.try_with(Arc::clone).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Begin,
    Commit,
    Rollback,
}

impl Verb {
    fn sql(self) -> &'static str {
        match self {
            Verb::Begin => "BEGIN",
            Verb::Commit => "COMMIT",
            Verb::Rollback => "ROLLBACK",
        }
    }

    fn operation(self) -> Operation {
        match self {
            Verb::Begin => Operation::Begin,
            Verb::Commit => Operation::Commit,
            Verb::Rollback => Operation::Rollback,
        }
    }
}

/// Rolls back on the runtime if a scope with an open transaction is dropped
/// before it could commit or roll back itself (panic or cancellation).
///
/// The writer lease moves into the rollback task, so the next writer only
/// proceeds once the abandoned transaction is gone.
struct RollbackGuard {
    slot: SharedSlot,
    state: Arc<ScopeState>,
    armed: bool,
}

impl RollbackGuard {
    fn new(slot: SharedSlot, state: Arc<ScopeState>) -> Self {
        Self {
            slot,
            state,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for RollbackGuard {
    fn drop(&mut self) {
        if !self.armed || !self.state.in_transaction() {
            return;
        }
        let lease = self.state.release();
        let Ok(handle) = Handle::try_current() else {
            warn!("transaction scope dropped outside a tokio runtime; rollback skipped");
            return;
        };
        let slot = Arc::clone(&self.slot);
        handle.spawn(async move {
            let result = run_blocking(slot, |conn| {
                conn.engine
                    .exec(Verb::Rollback.sql())
                    .map_err(DbError::SqliteError)
            })
            .await;
            match result {
                Ok(()) => debug!("rolled back abandoned transaction scope"),
                Err(err) => error!(error = %err, "rollback of abandoned transaction scope failed"),
            }
            drop(lease);
        });
    }
}

impl Database {
    /// Run `body` inside a transaction scope.
    ///
    /// The outermost call on a task owns the scope: the first write inside it
    /// issues BEGIN, a successful return commits and notifies clients, and an
    /// error rolls back and is returned unchanged. Nested calls run `body`
    /// inline and leave commit/rollback to the owner. Scopes with no writes
    /// never touch the engine.
    ///
    /// One transaction is open at a time. A scope's first write waits until
    /// no other scope holds the connection and no autocommit write is running;
    /// writes outside any scope likewise wait for an open transaction to end.
    /// Awaiting, from inside a scope that has written, a spawned task that
    /// writes outside the scope therefore never completes.
    ///
    /// ```rust,no_run
    /// # use sqlite_scope::prelude::*;
    /// # async fn demo(db: &Database) -> Result<(), DbError> {
    /// db.transactional(|| async {
    ///     db.insert("accounts", &Record::new().with("name", "alice")).await?;
    ///     db.transactional(|| async {
    ///         db.execute("UPDATE totals SET n = n + 1", &[]).await
    ///     })
    ///     .await?;
    ///     Ok::<_, DbError>(())
    /// })
    /// .await
    /// # }
    /// ```
    ///
    /// # Errors
    /// Returns whatever `body` returns on failure. If COMMIT itself fails the
    /// transaction is rolled back and the commit error is returned.
    #[track_caller]
    pub fn transactional<F, Fut, T, E>(&self, body: F) -> impl Future<Output = Result<T, E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<DbError>,
    {
        let caller = Location::caller();
        async move {
            if current_scope().is_some() {
                return body().await;
            }
            let state = Arc::new(ScopeState::default());
            SCOPE
                .scope(Arc::clone(&state), self.run_scope(caller, state, body))
                .await
        }
    }

    async fn run_scope<F, Fut, T, E>(
        &self,
        caller: &'static Location<'static>,
        state: Arc<ScopeState>,
        body: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<DbError>,
    {
        let mut guard = RollbackGuard::new(self.slot(), Arc::clone(&state));
        let result = body().await;

        if !state.in_transaction() {
            guard.disarm();
            return result;
        }

        match result {
            Ok(value) => {
                let committed = self.transaction_verb(caller, Verb::Commit).await;
                let outcome = match committed {
                    Ok(()) => Ok(value),
                    Err(err) => {
                        if let Err(rollback_err) =
                            self.transaction_verb(caller, Verb::Rollback).await
                        {
                            warn!(error = %rollback_err, "rollback after failed commit failed");
                        }
                        Err(E::from(err))
                    }
                };
                guard.disarm();
                drop(state.release());
                if outcome.is_ok() {
                    self.notify_clients();
                }
                outcome
            }
            Err(err) => {
                if let Err(rollback_err) = self.transaction_verb(caller, Verb::Rollback).await {
                    error!(error = %rollback_err, "rollback failed; returning original error");
                }
                guard.disarm();
                drop(state.release());
                Err(err)
            }
        }
    }

    /// Claim the right to write for the caller.
    ///
    /// Inside a scope the first write takes the writer gate and issues BEGIN;
    /// the scope keeps the gate until COMMIT or ROLLBACK, and later writes in
    /// the scope return `None`. Outside any scope the gate is returned to the
    /// caller, who holds it for the duration of one autocommit write.
    pub(crate) async fn claim_writer(
        &self,
        caller: &'static Location<'static>,
    ) -> Result<Option<WriterLease>, DbError> {
        let Some(state) = current_scope() else {
            return Ok(Some(self.writer_gate().lock_owned().await));
        };
        state
            .begun
            .get_or_try_init(|| async {
                let lease = self.writer_gate().lock_owned().await;
                self.transaction_verb(caller, Verb::Begin).await?;
                state.hold(lease);
                Ok::<_, DbError>(())
            })
            .await?;
        Ok(None)
    }

    async fn transaction_verb(
        &self,
        caller: &'static Location<'static>,
        verb: Verb,
    ) -> Result<(), DbError> {
        debug!(verb = verb.sql(), "transaction");
        self.exec_unprepared(caller, verb.operation(), verb.sql().to_owned())
            .await
    }

    fn notify_clients(&self) {
        if let Err(err) = self.notifier().notify_all_clients() {
            warn!(error = %err, "post-commit client notification failed");
        }
    }
}
