//! Control sample persistence
//!
//! Each mode owns one column of `control_samples`. Writes name exactly one
//! mode column, so processing a mode never touches another mode's results.
//! Mode names are interpolated into SQL and are checked against
//! [`is_valid_mode_name`] first.

use super::control_types::find_control_type;
use chrono::NaiveDate;
use controls_common::config::is_valid_mode_name;
use controls_common::db::{Sample, StoredSample};
use controls_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Whether an upsert created or updated the sample row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

fn checked_mode(mode: &str) -> Result<&str> {
    if is_valid_mode_name(mode) {
        Ok(mode)
    } else {
        Err(Error::InvalidInput(format!("Invalid mode name '{}'", mode)))
    }
}

fn select_columns(modes: &[String]) -> Result<String> {
    let mut columns = String::from("id, name, submitted_date, parent_id");
    for mode in modes {
        columns.push_str(", ");
        columns.push_str(checked_mode(mode)?);
    }
    Ok(columns)
}

fn from_row(row: &SqliteRow, modes: &[String]) -> Result<StoredSample> {
    let mut results = BTreeMap::new();
    for mode in modes {
        let value: Option<String> = row.try_get(mode.as_str())?;
        results.insert(mode.clone(), value);
    }
    Ok(StoredSample {
        id: row.get("id"),
        name: row.get("name"),
        submitted_date: row.get::<Option<NaiveDate>, _>("submitted_date"),
        parent_id: row.get("parent_id"),
        results,
    })
}

pub async fn find_sample(pool: &SqlitePool, name: &str, modes: &[String]) -> Result<Option<StoredSample>> {
    let query = format!(
        "SELECT {} FROM control_samples WHERE name = ?",
        select_columns(modes)?
    );
    let row = sqlx::query(&query).bind(name).fetch_optional(pool).await?;

    row.as_ref().map(|r| from_row(r, modes)).transpose()
}

/// Write `sample`'s result for `mode`, inserting the row if needed
///
/// An existing row keeps its other mode columns. Its date and control type
/// are replaced only when the sample carries new values for them.
pub async fn upsert_sample(pool: &SqlitePool, sample: &Sample, mode: &str) -> Result<UpsertOutcome> {
    let mode = checked_mode(mode)?;
    let result = sample.result(mode).ok_or_else(|| {
        Error::InvalidInput(format!("Sample '{}' has no '{}' result", sample.name, mode))
    })?;

    let parent_id = match &sample.control_type {
        Some(name) => {
            let found = find_control_type(pool, name).await?;
            if found.is_none() {
                warn!(sample = %sample.name, control_type = %name, "Control type not in database");
            }
            found.map(|ct| ct.id)
        }
        None => None,
    };

    let mut tx = pool.begin().await?;

    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM control_samples WHERE name = ?")
        .bind(&sample.name)
        .fetch_optional(&mut *tx)
        .await?;

    let outcome = match existing {
        Some(id) => {
            let query = format!(
                r#"
                UPDATE control_samples
                SET {mode} = ?,
                    submitted_date = COALESCE(?, submitted_date),
                    parent_id = COALESCE(?, parent_id)
                WHERE id = ?
                "#
            );
            sqlx::query(&query)
                .bind(result)
                .bind(sample.submitted_date)
                .bind(parent_id)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            UpsertOutcome::Updated
        }
        None => {
            let query = format!(
                "INSERT INTO control_samples (name, submitted_date, parent_id, {mode}) VALUES (?, ?, ?, ?)"
            );
            sqlx::query(&query)
                .bind(&sample.name)
                .bind(sample.submitted_date)
                .bind(parent_id)
                .bind(result)
                .execute(&mut *tx)
                .await?;
            UpsertOutcome::Inserted
        }
    };

    tx.commit().await?;
    debug!(sample = %sample.name, mode = %mode, ?outcome, "Upserted sample");
    Ok(outcome)
}

/// Names of samples that already have a stored result for `mode`
pub async fn sample_names_with_result(pool: &SqlitePool, mode: &str) -> Result<HashSet<String>> {
    let query = format!(
        "SELECT name FROM control_samples WHERE {} IS NOT NULL",
        checked_mode(mode)?
    );
    let names: Vec<String> = sqlx::query_scalar(&query).fetch_all(pool).await?;
    Ok(names.into_iter().collect())
}

/// Samples of one control type, oldest submission first, undated last
pub async fn samples_by_control_type(
    pool: &SqlitePool,
    parent_id: i64,
    modes: &[String],
) -> Result<Vec<StoredSample>> {
    let query = format!(
        r#"
        SELECT {}
        FROM control_samples
        WHERE parent_id = ?
        ORDER BY submitted_date IS NULL, submitted_date, name
        "#,
        select_columns(modes)?
    );
    let rows = sqlx::query(&query).bind(parent_id).fetch_all(pool).await?;

    rows.iter().map(|r| from_row(r, modes)).collect()
}
