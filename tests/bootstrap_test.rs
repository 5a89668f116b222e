//! Bootstrap state-machine tests: single initialization, ready accessor.

use cortexdb::config::{DbConfig, EngineKind, RunMode};
use cortexdb::db::Bootstrap;
use cortexdb::db::schema::SEED_COMPANY_ID;
use cortexdb::error::DbError;
use cortexdb::SqlValue;
use std::sync::Arc;

fn test_config() -> DbConfig {
    DbConfig {
        use_local: true,
        run_mode: RunMode::Test,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_get_before_init_fails() {
    let bootstrap = Bootstrap::new();
    let err = bootstrap.get().unwrap_err();
    assert!(matches!(err, DbError::NotInitialized));
}

#[tokio::test]
async fn test_init_then_get_returns_same_instance() {
    let bootstrap = Bootstrap::new();
    let from_init = bootstrap.init(&test_config()).await.unwrap();
    let from_get = bootstrap.get().unwrap();
    assert!(Arc::ptr_eq(&from_init, &from_get));
}

#[tokio::test]
async fn test_repeated_init_is_a_cache_hit() {
    let bootstrap = Bootstrap::new();
    let first = bootstrap.init(&test_config()).await.unwrap();
    let second = bootstrap.init(&test_config()).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_fifty_concurrent_callers_share_one_adapter() {
    let bootstrap = Arc::new(Bootstrap::new());
    let config = test_config();

    let mut handles = Vec::with_capacity(50);
    for _ in 0..50 {
        let bootstrap = Arc::clone(&bootstrap);
        let config = config.clone();
        handles.push(tokio::spawn(async move {
            bootstrap.init(&config).await.unwrap()
        }));
    }

    let mut adapters = Vec::with_capacity(50);
    for handle in handles {
        adapters.push(handle.await.unwrap());
    }

    let first = &adapters[0];
    for adapter in &adapters[1..] {
        assert!(Arc::ptr_eq(first, adapter));
    }

    // One schema-initialization sequence: the guarded seed ran once
    let seeded = first
        .fetch_one(
            "SELECT COUNT(*) AS n FROM companies WHERE id = ?",
            &[SqlValue::from(SEED_COMPANY_ID)],
        )
        .await
        .unwrap()
        .and_then(|row| row.get_i64("n"));
    assert_eq!(seeded, Some(1));
}

#[tokio::test]
async fn test_on_disk_database_persists_across_bootstraps() {
    let dir = tempfile::tempdir().unwrap();
    let config = DbConfig {
        use_local: true,
        run_mode: RunMode::Test,
        sqlite_path: Some(dir.path().join("cortex.db")),
        ..Default::default()
    };

    let db = Bootstrap::new().init(&config).await.unwrap();
    db.execute(
        "INSERT INTO companies (id, name) VALUES (?, ?)",
        &[SqlValue::from("company-disk"), SqlValue::from("Persisted Co")],
    )
    .await
    .unwrap();
    db.close().await;

    let db = Bootstrap::new().init(&config).await.unwrap();
    let row = db
        .fetch_one(
            "SELECT name FROM companies WHERE id = ?",
            &[SqlValue::from("company-disk")],
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get_str("name"), Some("Persisted Co"));
    db.close().await;
}

#[tokio::test]
async fn test_embedded_fallback_without_any_configuration() {
    // No local flag, no engine selector, no connection string
    let config = DbConfig {
        run_mode: RunMode::Test,
        ..Default::default()
    };
    let bootstrap = Bootstrap::new();
    let db = bootstrap.init(&config).await.unwrap();

    assert_eq!(db.engine_kind(), EngineKind::Sqlite);
    let row = db.fetch_one("SELECT 1 AS x", &[]).await.unwrap().unwrap();
    assert_eq!(row.get_i64("x"), Some(1));
}
