//! Adapter contract tests on the embedded engine.

use cortexdb::SqlValue;
use cortexdb::config::{DbConfig, EngineKind, RunMode};
use cortexdb::db::{Bootstrap, Database};
use cortexdb::error::DbError;
use std::sync::Arc;

fn test_config() -> DbConfig {
    DbConfig {
        use_local: true,
        run_mode: RunMode::Test,
        ..Default::default()
    }
}

async fn ready_db() -> Arc<Database> {
    Bootstrap::new().init(&test_config()).await.unwrap()
}

#[tokio::test]
async fn test_embedded_bootstrap_scenario() {
    let db = ready_db().await;
    assert_eq!(db.engine_kind(), EngineKind::Sqlite);

    let row = db.fetch_one("SELECT 1 AS x", &[]).await.unwrap().unwrap();
    assert_eq!(row.get_i64("x"), Some(1));
}

#[tokio::test]
async fn test_expression_and_aggregate_columns_decode() {
    let db = ready_db().await;

    // Aggregates carry no declared column type
    let row = db
        .fetch_one("SELECT COUNT(*) AS n FROM roles", &[])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get_i64("n"), Some(3));

    // Neither do plain expressions; each decodes by its storage class
    let row = db
        .fetch_one("SELECT 2 + 3 AS total, 'ok' AS label, 1.5 AS ratio", &[])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get_i64("total"), Some(5));
    assert_eq!(row.get_str("label"), Some("ok"));
    assert_eq!(row.get_f64("ratio"), Some(1.5));
}

#[tokio::test]
async fn test_fetch_one_absent_returns_none() {
    let db = ready_db().await;
    let row = db
        .fetch_one(
            "SELECT id FROM projects WHERE id = ?",
            &[SqlValue::from("no-such-project")],
        )
        .await
        .unwrap();
    assert!(row.is_none());
}

#[tokio::test]
async fn test_fetch_all_empty_is_not_an_error() {
    let db = ready_db().await;
    let rows = db
        .fetch_all("SELECT * FROM tasks WHERE status = ?", &[SqlValue::from("no-such-status")])
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_execute_reports_rows_affected_and_inserted_id() {
    let db = ready_db().await;
    db.execute(
        "INSERT INTO companies (id, name) VALUES (?, ?)",
        &[SqlValue::from("company-a"), SqlValue::from("Acme Construction")],
    )
    .await
    .unwrap();

    let result = db
        .execute(
            "INSERT INTO projects (id, companyId, name, budget, progress) VALUES (?, ?, ?, ?, ?)",
            &[
                SqlValue::from("proj-1"),
                SqlValue::from("company-a"),
                SqlValue::from("Harbor Tower"),
                SqlValue::from(250_000.0),
                SqlValue::from(10i64),
            ],
        )
        .await
        .unwrap();
    assert_eq!(result.rows_affected, 1);
    assert!(result.inserted_id.is_some());

    let row = db
        .fetch_one(
            "SELECT name, budget, progress FROM projects WHERE id = ?",
            &[SqlValue::from("proj-1")],
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get_str("name"), Some("Harbor Tower"));
    assert_eq!(row.get_f64("budget"), Some(250_000.0));
    assert_eq!(row.get_i64("progress"), Some(10));
}

#[tokio::test]
async fn test_update_rows_affected() {
    let db = ready_db().await;
    db.execute(
        "INSERT INTO companies (id, name, status) VALUES (?, ?, 'active')",
        &[SqlValue::from("company-b"), SqlValue::from("Beta Builders")],
    )
    .await
    .unwrap();

    let result = db
        .execute(
            "UPDATE companies SET status = ? WHERE id = ?",
            &[SqlValue::from("suspended"), SqlValue::from("company-b")],
        )
        .await
        .unwrap();
    assert_eq!(result.rows_affected, 1);

    let result = db
        .execute(
            "UPDATE companies SET status = ? WHERE id = ?",
            &[SqlValue::from("suspended"), SqlValue::from("company-missing")],
        )
        .await
        .unwrap();
    assert_eq!(result.rows_affected, 0);
}

#[tokio::test]
async fn test_null_params_round_trip() {
    let db = ready_db().await;
    db.execute(
        "INSERT INTO companies (id, name, email) VALUES (?, ?, ?)",
        &[
            SqlValue::from("company-c"),
            SqlValue::from("No Mail Inc"),
            SqlValue::Null,
        ],
    )
    .await
    .unwrap();

    let row = db
        .fetch_one(
            "SELECT email FROM companies WHERE id = ?",
            &[SqlValue::from("company-c")],
        )
        .await
        .unwrap()
        .unwrap();
    assert!(row.get("email").unwrap().is_null());
}

#[tokio::test]
async fn test_query_error_surfaces_driver_message() {
    let db = ready_db().await;
    let err = db
        .fetch_all("SELECT * FROM no_such_table", &[])
        .await
        .unwrap_err();
    match err {
        DbError::Query { message, .. } => assert!(message.contains("no_such_table")),
        other => panic!("expected query error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_closed_adapter_rejects_operations() {
    let db = ready_db().await;
    db.close().await;
    // close is idempotent
    db.close().await;
    assert!(db.is_closed());

    let err = db.fetch_one("SELECT 1 AS x", &[]).await.unwrap_err();
    assert!(matches!(err, DbError::Closed));

    let err = db.execute_raw("SELECT 1").await.unwrap_err();
    assert!(matches!(err, DbError::Closed));
}
