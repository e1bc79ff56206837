#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sqlite_scope::prelude::*;
use sqlite_scope::{Row, StatementHandle};

/// One call that reached the storage engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Prepare(String),
    Run(String),
    Get(String),
    All(String),
    Exec(String),
    Notify,
}

#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn prepares(&self) -> usize {
        self.count(|c| matches!(c, Call::Prepare(_)))
    }

    pub fn all_calls(&self) -> usize {
        self.count(|c| matches!(c, Call::All(_)))
    }

    /// BEGIN / COMMIT / ROLLBACK in the order they were issued.
    pub fn verbs(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Exec(sql) if matches!(sql.as_str(), "BEGIN" | "COMMIT" | "ROLLBACK") => {
                    Some(sql)
                }
                _ => None,
            })
            .collect()
    }
}

/// In-memory `SqliteEngine` that records every call it receives.
#[derive(Debug)]
pub struct RecordingEngine {
    inner: SqliteEngine,
    log: CallLog,
    refuse_commit: bool,
}

impl RecordingEngine {
    pub fn new(log: CallLog) -> Self {
        Self {
            inner: SqliteEngine::open_in_memory().expect("in-memory sqlite"),
            log,
            refuse_commit: false,
        }
    }

    /// Every COMMIT fails with `SQLITE_BUSY`, leaving the transaction open.
    pub fn refusing_commit(mut self) -> Self {
        self.refuse_commit = true;
        self
    }
}

impl StorageEngine for RecordingEngine {
    fn prepare(&mut self, sql: &str) -> rusqlite::Result<StatementHandle> {
        self.log.push(Call::Prepare(sql.to_owned()));
        self.inner.prepare(sql)
    }

    fn run(&mut self, stmt: &StatementHandle, params: &[SqlValue]) -> rusqlite::Result<RunResult> {
        self.log.push(Call::Run(stmt.sql().to_owned()));
        self.inner.run(stmt, params)
    }

    fn get(
        &mut self,
        stmt: &StatementHandle,
        params: &[SqlValue],
    ) -> rusqlite::Result<Option<Row>> {
        self.log.push(Call::Get(stmt.sql().to_owned()));
        self.inner.get(stmt, params)
    }

    fn all(&mut self, stmt: &StatementHandle, params: &[SqlValue]) -> rusqlite::Result<RowSet> {
        self.log.push(Call::All(stmt.sql().to_owned()));
        self.inner.all(stmt, params)
    }

    fn exec(&mut self, sql: &str) -> rusqlite::Result<()> {
        self.log.push(Call::Exec(sql.to_owned()));
        if self.refuse_commit && sql == "COMMIT" {
            return Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
                Some("database is locked".into()),
            ));
        }
        self.inner.exec(sql)
    }

    fn close(self: Box<Self>) -> rusqlite::Result<()> {
        Box::new(self.inner).close()
    }
}

/// Notifier that counts pings and records them in the call log.
#[derive(Debug, Default)]
pub struct CountingNotifier {
    pub count: AtomicUsize,
    log: CallLog,
}

impl CountingNotifier {
    pub fn new(log: CallLog) -> Self {
        Self {
            count: AtomicUsize::new(0),
            log,
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl CommitNotifier for CountingNotifier {
    fn notify_all_clients(&self) -> Result<(), DbError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.log.push(Call::Notify);
        Ok(())
    }
}

/// Notifier whose clients are never reachable.
#[derive(Debug, Default)]
pub struct FailingNotifier {
    pub attempts: AtomicUsize,
}

impl CommitNotifier for FailingNotifier {
    fn notify_all_clients(&self) -> Result<(), DbError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(DbError::NotifyError("no client reachable".into()))
    }
}

/// Inject `engine` into a fresh handle, apply `schema` and clear `log`.
pub async fn inject(
    engine: RecordingEngine,
    notifier: Arc<dyn CommitNotifier>,
    log: &CallLog,
    schema: &str,
) -> Database {
    let db = Database::with_notifier(DatabaseOptions::default(), notifier).expect("valid options");
    db.set_connection(Box::new(engine))
        .await
        .expect("inject engine");
    if !schema.is_empty() {
        db.execute_script(schema).await.expect("schema");
    }
    log.clear();
    db
}

/// A database on a recording in-memory engine, with `schema` applied and the log cleared.
pub async fn recording_db(schema: &str) -> (Database, CallLog, Arc<CountingNotifier>) {
    let log = CallLog::default();
    let notifier = Arc::new(CountingNotifier::new(log.clone()));
    let engine = RecordingEngine::new(log.clone());
    let db = inject(engine, notifier.clone(), &log, schema).await;
    (db, log, notifier)
}

pub async fn count_rows(db: &Database, table: &str) -> i64 {
    db.get_value(&format!("SELECT COUNT(*) FROM {table}"), &[])
        .await
        .expect("count query")
        .and_then(|v| v.as_int())
        .expect("integer count")
}
