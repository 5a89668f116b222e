//! Schema convergence tests: idempotence, rename safety, guarded seeding.

use cortexdb::SqlValue;
use cortexdb::config::{DbConfig, RunMode};
use cortexdb::db::{Bootstrap, Database, SchemaEngine};
use cortexdb::db::schema::{SEED_ADMIN_ID, SEED_COMPANY_ID};
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

async fn count(db: &Database, sql: &str, params: &[SqlValue]) -> i64 {
    db.fetch_one(sql, params)
        .await
        .unwrap()
        .and_then(|row| row.get_i64("n"))
        .unwrap_or(0)
}

#[tokio::test]
async fn test_converge_is_idempotent() {
    let db = ready_db().await;
    let engine = SchemaEngine::new(&db);

    // Bootstrap already converged once; two more runs must not error
    engine.converge().await.unwrap();
    engine.converge().await.unwrap();

    for (table, column) in [
        ("projects", "progress"),
        ("projects", "spent"),
        ("tasks", "latitude"),
        ("companies", "plan"),
        ("users", "avatar"),
    ] {
        assert!(
            engine.column_exists(table, column).await.unwrap(),
            "{}.{} should exist",
            table,
            column
        );
    }
}

#[tokio::test]
async fn test_seed_runs_exactly_once() {
    let db = ready_db().await;
    SchemaEngine::new(&db).converge().await.unwrap();
    SchemaEngine::new(&db).converge().await.unwrap();

    let companies = count(
        &db,
        "SELECT COUNT(*) AS n FROM companies WHERE id = ?",
        &[SqlValue::from(SEED_COMPANY_ID)],
    )
    .await;
    assert_eq!(companies, 1);

    let admins = count(
        &db,
        "SELECT COUNT(*) AS n FROM users WHERE id = ?",
        &[SqlValue::from(SEED_ADMIN_ID)],
    )
    .await;
    assert_eq!(admins, 1);

    let roles = count(&db, "SELECT COUNT(*) AS n FROM roles", &[]).await;
    assert_eq!(roles, 3);
}

#[tokio::test]
async fn test_losing_seed_race_is_convergence_not_failure() {
    let db = ready_db().await;

    // A second instance that observed an empty table before this one
    // seeded would replay the same insert; the duplicate-key error it
    // gets back must classify as convergence, not surface as failure
    let err = db
        .execute(
            "INSERT INTO companies (id, name, status) VALUES (?, ?, 'active')",
            &[
                SqlValue::from(SEED_COMPANY_ID),
                SqlValue::from("Default Company"),
            ],
        )
        .await
        .unwrap_err();
    assert!(err.is_unique_violation(), "got {:?}", err);

    let err = db
        .execute(
            "INSERT INTO roles (id, name, description) VALUES (?, ?, ?)",
            &[
                SqlValue::from("role-admin"),
                SqlValue::from("admin"),
                SqlValue::from("Full administrative access"),
            ],
        )
        .await
        .unwrap_err();
    assert!(err.is_unique_violation(), "got {:?}", err);
}

#[tokio::test]
async fn test_concurrent_converge_runs_both_succeed() {
    let db = ready_db().await;
    let engine_a = SchemaEngine::new(&db);
    let engine_b = SchemaEngine::new(&db);
    let (first, second) = tokio::join!(engine_a.converge(), engine_b.converge());
    first.unwrap();
    second.unwrap();

    let sentinel = count(
        &db,
        "SELECT COUNT(*) AS n FROM companies WHERE id = ?",
        &[SqlValue::from(SEED_COMPANY_ID)],
    )
    .await;
    assert_eq!(sentinel, 1);
}

#[tokio::test]
async fn test_rename_applies_exactly_once() {
    let db = ready_db().await;
    let engine = SchemaEngine::new(&db);
    db.execute_raw("CREATE TABLE rename_demo (id VARCHAR(64) PRIMARY KEY, a TEXT)")
        .await
        .unwrap();

    // a present, b absent: the rename occurs
    engine.rename_column("rename_demo", "a", "b").await.unwrap();
    assert!(!engine.column_exists("rename_demo", "a").await.unwrap());
    assert!(engine.column_exists("rename_demo", "b").await.unwrap());

    // a absent, b present: no-op
    engine.rename_column("rename_demo", "a", "b").await.unwrap();
    assert!(engine.column_exists("rename_demo", "b").await.unwrap());

    // both absent: no-op
    engine.rename_column("rename_demo", "x", "y").await.unwrap();
    assert!(!engine.column_exists("rename_demo", "x").await.unwrap());
    assert!(!engine.column_exists("rename_demo", "y").await.unwrap());
}

#[tokio::test]
async fn test_ensure_column_on_legacy_table() {
    // A fleet member created before the column shipped
    let db = Database::connect(&test_config()).await.unwrap();
    db.execute_raw(
        "CREATE TABLE IF NOT EXISTS tasks (
            id VARCHAR(64) PRIMARY KEY,
            projectId VARCHAR(64) NOT NULL,
            title VARCHAR(255) NOT NULL
        )",
    )
    .await
    .unwrap();

    let engine = SchemaEngine::new(&db);
    assert!(!engine.column_exists("tasks", "latitude").await.unwrap());

    engine.ensure_column("tasks", "latitude", "REAL").await.unwrap();
    assert!(engine.column_exists("tasks", "latitude").await.unwrap());

    // Re-running is a no-op, not an error
    engine.ensure_column("tasks", "latitude", "REAL").await.unwrap();
}

#[tokio::test]
async fn test_ensure_index_is_idempotent() {
    let db = ready_db().await;
    let engine = SchemaEngine::new(&db);
    engine
        .ensure_index("idx_tasks_projectId", "tasks", "projectId")
        .await
        .unwrap();
    engine
        .ensure_index("idx_tasks_projectId", "tasks", "projectId")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_reserved_column_is_usable() {
    let db = ready_db().await;
    db.execute(
        "INSERT INTO audit_logs (id, userId, action, \"timestamp\") VALUES (?, ?, ?, ?)",
        &[
            SqlValue::from("log-1"),
            SqlValue::from(SEED_ADMIN_ID),
            SqlValue::from("login"),
            SqlValue::from("2026-08-29T12:00:00Z"),
        ],
    )
    .await
    .unwrap();

    let row = db
        .fetch_one(
            "SELECT \"timestamp\" FROM audit_logs WHERE id = ?",
            &[SqlValue::from("log-1")],
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get_str("timestamp"), Some("2026-08-29T12:00:00Z"));
}

#[tokio::test]
async fn test_cascade_delete_through_foreign_keys() {
    let db = ready_db().await;
    db.execute(
        "INSERT INTO companies (id, name) VALUES (?, ?)",
        &[SqlValue::from("company-fk"), SqlValue::from("FK Test Co")],
    )
    .await
    .unwrap();
    db.execute(
        "INSERT INTO projects (id, companyId, name) VALUES (?, ?, ?)",
        &[
            SqlValue::from("proj-fk"),
            SqlValue::from("company-fk"),
            SqlValue::from("Doomed Project"),
        ],
    )
    .await
    .unwrap();

    db.execute(
        "DELETE FROM companies WHERE id = ?",
        &[SqlValue::from("company-fk")],
    )
    .await
    .unwrap();

    let orphan = db
        .fetch_one(
            "SELECT id FROM projects WHERE id = ?",
            &[SqlValue::from("proj-fk")],
        )
        .await
        .unwrap();
    assert!(orphan.is_none());
}
