mod common;

use common::{CallLog, RecordingEngine, recording_db};
use sqlite_scope::prelude::*;

#[tokio::test]
async fn close_is_idempotent_and_final() -> Result<(), DbError> {
    let (db, _, _) = recording_db("CREATE TABLE t (id INTEGER);").await;
    assert!(db.is_open().await);

    db.close().await?;
    db.close().await?;
    assert!(!db.is_open().await);

    let err = db.get_rows("SELECT * FROM t", &[]).await.unwrap_err();
    assert!(matches!(err, DbError::ConnectionClosed), "{err:?}");

    let err = db
        .set_connection(Box::new(RecordingEngine::new(CallLog::default())))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::ConnectionClosed), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn connection_is_injected_once() -> Result<(), DbError> {
    let db = Database::new(DatabaseOptions::default())?;
    assert!(!db.is_open().await);
    db.set_connection(Box::new(SqliteEngine::open_in_memory()?))
        .await?;
    let err = db
        .set_connection(Box::new(SqliteEngine::open_in_memory()?))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::AlreadyInitialized), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn clones_share_the_connection() -> Result<(), DbError> {
    let (db, _, _) = recording_db("CREATE TABLE t (id INTEGER);").await;
    let other = db.clone();
    other.execute("INSERT INTO t (id) VALUES (?)", &[SqlValue::Int(4)])
        .await?;
    let value = db.get_value("SELECT id FROM t", &[]).await?;
    assert_eq!(value, Some(SqlValue::Int(4)));
    Ok(())
}

#[tokio::test]
async fn builder_opens_a_file_in_wal_mode() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("app.db");
    let db = DatabaseOptions::builder(path.to_string_lossy())
        .chunk_size(500)
        .open()
        .await?;

    db.execute_script("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT);")
        .await?;
    db.insert("notes", &Record::new().with("body", "persisted"))
        .await?;
    let mode = db.get_value("PRAGMA journal_mode", &[]).await?;
    assert_eq!(mode, Some(SqlValue::Text("wal".into())));
    db.close().await?;

    let reopened = DatabaseOptions::builder(path.to_string_lossy()).open().await?;
    let body = reopened.get_value("SELECT body FROM notes", &[]).await?;
    assert_eq!(body, Some(SqlValue::Text("persisted".into())));
    reopened.close().await?;
    Ok(())
}

#[tokio::test]
async fn invalid_options_are_rejected() {
    let opts = DatabaseOptions::builder(":memory:").chunk_size(999).finish();
    let err = Database::new(opts).unwrap_err();
    assert!(matches!(err, DbError::ConfigError(_)), "{err:?}");
}
