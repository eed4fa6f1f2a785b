//! Integration tests for database initialization
//!
//! Tests cover:
//! - Automatic database creation on first run, including missing parent folders
//! - Re-opening an existing database without losing data
//! - Schema contents: tables, version row, status constraint

use crm_common::db::init::{init_database, SCHEMA_VERSION};
use sqlx::Row;
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("crm.db");
    assert!(!db_path.exists());

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("crm.db");

    let pool = init_database(&db_path).await.unwrap();
    sqlx::query(
        "INSERT INTO pipeline_stages (stage, position, count, value, last_updated)
         VALUES ('new', 0, 3, 42.0, CURRENT_TIMESTAMP)",
    )
    .execute(&pool)
    .await
    .unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await;
    assert!(pool.is_ok(), "Failed to open existing database: {:?}", pool.as_ref().err());

    let count: i64 = sqlx::query_scalar("SELECT count FROM pipeline_stages WHERE stage = 'new'")
        .fetch_one(&pool.unwrap())
        .await
        .unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
async fn test_tables_created() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("crm.db")).await.unwrap();

    let tables: Vec<String> = sqlx::query(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(&pool)
    .await
    .unwrap()
    .iter()
    .map(|row| row.get("name"))
    .collect();

    assert_eq!(tables, vec!["leads", "pipeline_stages", "schema_version"]);
}

#[tokio::test]
async fn test_schema_version_recorded_once() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("crm.db");

    init_database(&db_path).await.unwrap();
    let pool = init_database(&db_path).await.unwrap();

    let versions: Vec<i64> = sqlx::query_scalar("SELECT version FROM schema_version")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(versions, vec![SCHEMA_VERSION]);
}

#[tokio::test]
async fn test_wal_mode_enabled() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("crm.db")).await.unwrap();

    let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");
}

#[tokio::test]
async fn test_lead_status_constraint() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("crm.db")).await.unwrap();

    let result = sqlx::query(
        "INSERT INTO leads (id, company_name, contact_name, email, status, created_at, updated_at)
         VALUES ('x', 'Acme', 'Jane', 'jane@acme.test', 'archived', CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)",
    )
    .execute(&pool)
    .await;

    assert!(result.is_err(), "Unknown status should violate the CHECK constraint");
}

#[tokio::test]
async fn test_stage_position_unique() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("crm.db")).await.unwrap();

    sqlx::query(
        "INSERT INTO pipeline_stages (stage, position, last_updated) VALUES ('new', 0, CURRENT_TIMESTAMP)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let result = sqlx::query(
        "INSERT INTO pipeline_stages (stage, position, last_updated) VALUES ('contacted', 0, CURRENT_TIMESTAMP)",
    )
    .execute(&pool)
    .await;

    assert!(result.is_err());
}
