mod common;

use common::{count_rows, recording_db};
use sqlite_scope::prelude::*;

const SCHEMA: &str = "
    CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT);
    WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < 1500)
    INSERT INTO items (id, label) SELECT n, 'item ' || n FROM seq;
";

fn ids(range: std::ops::RangeInclusive<i64>) -> Vec<SqlValue> {
    range.map(SqlValue::Int).collect()
}

#[tokio::test]
async fn long_lists_are_split_and_concatenated_in_order() -> Result<(), DbError> {
    let (db, log, _) = recording_db(SCHEMA).await;

    let rows = db
        .get_rows_many(
            "SELECT id FROM items WHERE id IN (???) ORDER BY id",
            &ids(1..=1500),
        )
        .await?;

    assert_eq!(log.all_calls(), 2);
    assert_eq!(rows.len(), 1500);
    let got: Vec<i64> = rows
        .iter()
        .filter_map(|row| row.get("id").and_then(SqlValue::as_int))
        .collect();
    assert_eq!(got, (1..=1500).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn empty_list_touches_nothing() -> Result<(), DbError> {
    let (db, log, notifier) = recording_db(SCHEMA).await;

    let rows = db
        .transactional(|| async {
            db.execute_many("DELETE FROM items WHERE id IN (???)", &[])
                .await
        })
        .await?;

    assert!(rows.is_empty());
    assert!(log.calls().is_empty());
    assert_eq!(notifier.count(), 0);
    Ok(())
}

#[tokio::test]
async fn missing_marker_is_a_parameter_error() {
    let (db, log, _) = recording_db(SCHEMA).await;
    let err = db
        .execute_many("DELETE FROM items WHERE id = ?", &ids(1..=3))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::ParameterError(_)), "{err:?}");
    assert!(log.calls().is_empty());
}

#[tokio::test]
async fn chunked_writes_join_the_scope() -> Result<(), DbError> {
    let (db, log, notifier) = recording_db(SCHEMA).await;

    let deleted = db
        .transactional(|| async {
            db.execute_many(
                "DELETE FROM items WHERE id IN (???) RETURNING id",
                &ids(1..=1000),
            )
            .await
        })
        .await?;

    assert_eq!(deleted.len(), 1000);
    assert_eq!(log.verbs(), vec!["BEGIN", "COMMIT"]);
    assert_eq!(log.all_calls(), 2);
    assert_eq!(notifier.count(), 1);
    assert_eq!(count_rows(&db, "items").await, 500);
    Ok(())
}

#[tokio::test]
async fn chunk_size_comes_from_options() -> Result<(), DbError> {
    let log = common::CallLog::default();
    let opts = DatabaseOptions::builder(":memory:").chunk_size(100).finish();
    let db = Database::new(opts)?;
    db.set_connection(Box::new(common::RecordingEngine::new(log.clone())))
        .await?;
    db.execute_script(SCHEMA).await?;
    log.clear();

    let rows = db
        .get_rows_many("SELECT id FROM items WHERE id IN (???)", &ids(1..=250))
        .await?;
    assert_eq!(rows.len(), 250);
    assert_eq!(log.all_calls(), 3);
    Ok(())
}
