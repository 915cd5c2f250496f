//! Settings persistence against real SQLite databases.

use kiosk_storage::{Database, SettingsRepository, SqliteSettingsRepository};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Barrier;

#[tokio::test]
async fn test_in_memory_database() {
    let db = Database::in_memory().await.unwrap();
    sqlx::query("SELECT 1").execute(db.pool()).await.unwrap();
    db.pool().close().await;
}

#[tokio::test]
async fn test_migration_idempotency() {
    let db = Database::in_memory().await.unwrap();

    db.migrate().await.unwrap();
    db.migrate().await.unwrap();

    let result: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='settings'")
            .fetch_one(db.pool())
            .await
            .unwrap();

    assert_eq!(result.0, 1);
    db.pool().close().await;
}

#[tokio::test]
async fn test_upsert_keeps_single_row() {
    let db = Database::in_memory().await.unwrap();
    let repo = SqliteSettingsRepository::new(db.pool().clone());

    repo.save_last_network_address("192.168.0.20").await.unwrap();
    repo.save_last_network_address("192.168.4.1").await.unwrap();

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM settings")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(count.0, 1);
    assert_eq!(
        repo.last_network_address().await.unwrap().as_deref(),
        Some("192.168.4.1")
    );
}

#[tokio::test]
async fn test_clear_reports_whether_anything_was_stored() {
    let db = Database::in_memory().await.unwrap();
    let repo = SqliteSettingsRepository::new(db.pool().clone());

    assert!(!repo.clear_last_network_address().await.unwrap());

    repo.save_last_network_address("192.168.4.1").await.unwrap();
    assert!(repo.clear_last_network_address().await.unwrap());
    assert_eq!(repo.last_network_address().await.unwrap(), None);
}

#[tokio::test]
async fn test_address_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state").join("kiosk.db");

    {
        let db = Database::new(&path).await.unwrap();
        let repo = SqliteSettingsRepository::new(db.pool().clone());
        repo.save_last_network_address("192.168.1.50").await.unwrap();
        db.pool().close().await;
    }

    let db = Database::new(&path).await.unwrap();
    let repo = SqliteSettingsRepository::new(db.pool().clone());
    assert_eq!(
        repo.last_network_address().await.unwrap().as_deref(),
        Some("192.168.1.50")
    );
    db.pool().close().await;
}

#[tokio::test]
async fn test_concurrent_writers_leave_one_value() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("kiosk.db");
    let db = Database::new(&path).await.unwrap();

    const WRITERS: usize = 8;
    let barrier = Arc::new(Barrier::new(WRITERS));
    let mut handles = Vec::new();

    for i in 0..WRITERS {
        let repo = SqliteSettingsRepository::new(db.pool().clone());
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            repo.save_last_network_address(&format!("192.168.4.{}", i + 1))
                .await
        }));
    }

    for result in futures::future::join_all(handles).await {
        result.unwrap().unwrap();
    }

    let repo = SqliteSettingsRepository::new(db.pool().clone());
    let stored = repo.last_network_address().await.unwrap().unwrap();
    assert!(stored.starts_with("192.168.4."));
    db.pool().close().await;
}
