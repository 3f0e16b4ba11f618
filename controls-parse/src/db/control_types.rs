//! Control type persistence

use controls_common::db::ControlType;
use controls_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

fn from_row(row: &SqliteRow) -> Result<ControlType> {
    let targets: String = row.get("targets");
    Ok(ControlType {
        id: row.get("id"),
        name: row.get("name"),
        targets: serde_json::from_str(&targets)?,
    })
}

/// Insert a control type, or refresh the targets of an existing one
pub async fn ensure_control_type(pool: &SqlitePool, name: &str, targets: &[String]) -> Result<i64> {
    let targets_json = serde_json::to_string(targets)?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO control_types (name, targets)
        VALUES (?, ?)
        ON CONFLICT(name) DO UPDATE SET targets = excluded.targets
        RETURNING id
        "#,
    )
    .bind(name)
    .bind(&targets_json)
    .fetch_one(pool)
    .await?;

    debug!(control_type = %name, id, "Ensured control type");
    Ok(id)
}

pub async fn find_control_type(pool: &SqlitePool, name: &str) -> Result<Option<ControlType>> {
    let row = sqlx::query("SELECT id, name, targets FROM control_types WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(from_row).transpose()
}

/// All control types, ordered by name
pub async fn list_control_types(pool: &SqlitePool) -> Result<Vec<ControlType>> {
    let rows = sqlx::query("SELECT id, name, targets FROM control_types ORDER BY name")
        .fetch_all(pool)
        .await?;

    rows.iter().map(from_row).collect()
}
