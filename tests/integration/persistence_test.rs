//! Integration tests for the persistence layer.

use lab_intake::classify::Category;
use lab_intake::persistence::{self, HistoryFilter, QueryStatus, RecordQueryParams, StateDb};
use lab_intake::store::ArtifactStore;
use std::time::{Duration, Instant};
use tempfile::tempdir;

async fn create_test_db() -> (StateDb, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test_state.db");
    let db = StateDb::open(&path).await.unwrap();
    (db, dir)
}

#[tokio::test]
async fn test_state_db_creation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.db");

    let db = StateDb::open(&path).await.unwrap();
    assert!(path.exists());
    db.close().await;
}

#[tokio::test]
async fn test_artifacts_survive_reopen() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("state.db");
    let root = dir.path().join("artifacts");

    let id = {
        let db = StateDb::open(&db_path).await.unwrap();
        let store = ArtifactStore::open(&root, db.pool().clone()).await.unwrap();
        let artifact = store
            .put("notes.txt", b"remember", Category::TextDocument, "alice")
            .await
            .unwrap();
        db.close().await;
        artifact.id
    };

    let db = StateDb::open(&db_path).await.unwrap();
    let store = ArtifactStore::open(&root, db.pool().clone()).await.unwrap();
    let artifact = store.get(id).await.unwrap().unwrap();
    assert_eq!(artifact.original_name, "notes.txt");
    assert_eq!(std::fs::read(&artifact.stored_path).unwrap(), b"remember");
    db.close().await;
}

#[tokio::test]
async fn test_history_recording_is_fast() {
    let (db, _dir) = create_test_db().await;

    let start = Instant::now();
    for i in 0..50 {
        persistence::history::record_query(
            db.pool(),
            &RecordQueryParams {
                principal: "alice".to_string(),
                sql: format!("SELECT {i}"),
                status: QueryStatus::Success,
                execution_time_ms: Some(1),
                row_count: Some(1),
                error_message: None,
            },
        )
        .await
        .unwrap();
    }
    let elapsed = start.elapsed();

    assert!(
        elapsed < Duration::from_secs(5),
        "recording 50 queries took {elapsed:?}"
    );

    let entries = persistence::history::list_history(
        db.pool(),
        &HistoryFilter {
            limit: Some(5),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(entries.len(), 5);
    assert_eq!(entries[0].sql, "SELECT 49");
    db.close().await;
}
