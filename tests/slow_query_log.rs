use std::io;
use std::sync::{Arc, Mutex};

use sqlite_scope::prelude::*;

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// Statements run on the blocking pool, so the subscriber has to be global.
// Keep this the only test in this binary.
#[tokio::test]
async fn slow_queries_and_skipped_writes_are_logged() -> Result<(), DbError> {
    let buffer = SharedBuffer::default();
    let writer = buffer.clone();
    tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let opts = DatabaseOptions::builder(":memory:")
        .slow_query_threshold(std::time::Duration::ZERO)
        .finish();
    let db = Database::new(opts)?;
    db.set_connection(Box::new(SqliteEngine::open_in_memory()?))
        .await?;
    db.execute_script("CREATE TABLE t (id INTEGER PRIMARY KEY, secret TEXT);")
        .await?;

    db.get_rows(
        "SELECT id FROM t WHERE secret = ?",
        &[SqlValue::Text("plain-param".into())],
    )
    .await?;
    db.get_rows(
        "WITH RECURSIVE walk(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM walk WHERE n < 50) \
         SELECT n FROM walk WHERE n > ?",
        &[SqlValue::Text("hidden-param".into())],
    )
    .await?;
    assert_eq!(db.insert("t", &Record::new()).await?, None);

    let logs = buffer.contents();
    assert!(logs.contains("slow query"), "{logs}");
    assert!(logs.contains("plain-param"), "{logs}");
    assert!(logs.contains("slow recursive query"), "{logs}");
    assert!(!logs.contains("hidden-param"), "{logs}");
    assert!(!logs.contains("walk(n)"), "{logs}");
    assert!(logs.contains("insert skipped"), "{logs}");
    Ok(())
}
