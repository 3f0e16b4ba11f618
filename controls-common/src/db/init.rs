//! Database initialization
//!
//! Opens (creating if needed) the SQLite store, creates the two tables and
//! makes sure every configured mode has its column on the samples table.

use crate::config::is_valid_mode_name;
use crate::db::schema_sync::{sync_columns, ColumnDefinition};
use crate::{Error, Result};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

pub const CONTROL_TYPES_TABLE: &str = "control_types";
pub const SAMPLES_TABLE: &str = "control_samples";

/// Open the database file and bring its schema up to date for `modes`
pub async fn init_database(db_path: &Path, modes: &[String]) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // One connection: the pipeline is a single writer.
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    init_schema(&pool, modes).await?;
    Ok(pool)
}

/// Create tables and per-mode columns (idempotent)
pub async fn init_schema(pool: &SqlitePool, modes: &[String]) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    create_control_types_table(pool).await?;
    create_samples_table(pool).await?;

    let mut columns = Vec::with_capacity(modes.len());
    for mode in modes {
        if !is_valid_mode_name(mode) {
            return Err(Error::InvalidInput(format!("Invalid mode name '{}'", mode)));
        }
        columns.push(ColumnDefinition::new(mode.as_str(), "TEXT"));
    }
    sync_columns(pool, SAMPLES_TABLE, &columns).await?;

    Ok(())
}

async fn create_control_types_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS control_types (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            targets TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_samples_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS control_samples (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            parent_id INTEGER REFERENCES control_types(id),
            name TEXT NOT NULL UNIQUE,
            submitted_date TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_control_samples_parent ON control_samples(parent_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Single-connection in-memory pool with the full schema, for tests
pub async fn memory_pool(modes: &[String]) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_schema(&pool, modes).await?;
    Ok(pool)
}
