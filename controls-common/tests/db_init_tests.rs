//! Database initialization tests against real files

use controls_common::db::init::{init_database, SAMPLES_TABLE};
use controls_common::db::schema_sync::SchemaIntrospector;
use tempfile::TempDir;

fn modes(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_database_created_when_missing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("controls.db");

    let pool = init_database(&db_path, &modes(&["contains"])).await;
    assert!(pool.is_ok(), "Database initialization failed: {:?}", pool.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_reopen_keeps_rows_and_adds_new_mode() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("controls.db");

    {
        let pool = init_database(&db_path, &modes(&["contains"])).await.unwrap();
        sqlx::query("INSERT INTO control_samples (name, contains) VALUES ('S1', '{}')")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;
    }

    let pool = init_database(&db_path, &modes(&["contains", "kraken"]))
        .await
        .unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM control_samples")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);

    let cols = SchemaIntrospector::introspect_table(&pool, SAMPLES_TABLE)
        .await
        .unwrap();
    assert!(cols.iter().any(|c| c.name == "kraken"));

    let kraken: Option<String> =
        sqlx::query_scalar("SELECT kraken FROM control_samples WHERE name = 'S1'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(kraken, None);
}
