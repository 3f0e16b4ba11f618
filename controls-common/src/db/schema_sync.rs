//! Automatic column synchronization
//!
//! Each configured analysis mode owns one TEXT column on the samples table.
//! Modes can be added to the configuration at any time, so the columns they
//! need are compared against the live schema on startup and missing ones are
//! added with `ALTER TABLE ADD COLUMN`.
//!
//! Only additions are automatic. Type changes and column removal need a
//! manual migration and are reported as warnings.

use crate::Result;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

/// Column definition with SQL type
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    pub sql_type: String,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
        }
    }
}

/// Actual column from `PRAGMA table_info`
#[derive(Debug, Clone)]
pub struct ActualColumn {
    pub cid: i32,
    pub name: String,
    pub type_name: String,
}

/// Difference between expected and actual schema
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaDrift {
    /// Column missing from database
    MissingColumn {
        table: String,
        column: ColumnDefinition,
    },
    /// Column present with an incompatible type
    TypeMismatch {
        table: String,
        column: String,
        expected: String,
        actual: String,
    },
}

/// Schema introspection via SQLite pragmas
pub struct SchemaIntrospector;

impl SchemaIntrospector {
    /// Columns of `table_name` in database order
    pub async fn introspect_table(pool: &SqlitePool, table_name: &str) -> Result<Vec<ActualColumn>> {
        let query = format!("PRAGMA table_info({})", table_name);
        let rows = sqlx::query(&query).fetch_all(pool).await?;

        let mut columns: Vec<ActualColumn> = rows
            .iter()
            .map(|row| ActualColumn {
                cid: row.get("cid"),
                name: row.get("name"),
                type_name: row.get("type"),
            })
            .collect();
        columns.sort_by_key(|c| c.cid);

        Ok(columns)
    }

    pub async fn table_exists(pool: &SqlitePool, table_name: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM sqlite_master
                WHERE type='table' AND name = ?
            )
            "#,
        )
        .bind(table_name)
        .fetch_one(pool)
        .await?;

        Ok(exists)
    }
}

/// Compare expected columns to the actual table
pub fn compare_columns(
    table_name: &str,
    expected: &[ColumnDefinition],
    actual: &[ActualColumn],
) -> Vec<SchemaDrift> {
    expected
        .iter()
        .filter_map(|col| match actual.iter().find(|a| a.name == col.name) {
            None => Some(SchemaDrift::MissingColumn {
                table: table_name.to_string(),
                column: col.clone(),
            }),
            Some(a) if !types_compatible(&col.sql_type, &a.type_name) => {
                Some(SchemaDrift::TypeMismatch {
                    table: table_name.to_string(),
                    column: col.name.clone(),
                    expected: col.sql_type.clone(),
                    actual: a.type_name.clone(),
                })
            }
            Some(_) => None,
        })
        .collect()
}

/// SQLite type affinity comparison
fn types_compatible(expected: &str, actual: &str) -> bool {
    let exp = expected.to_uppercase();
    let act = actual.to_uppercase();
    if exp == act {
        return true;
    }
    let text_like = |t: &str| t.contains("TEXT") || t.contains("CHAR") || t.contains("CLOB") || t == "JSON";
    let int_like = |t: &str| t.contains("INT");
    (text_like(&exp) && text_like(&act)) || (int_like(&exp) && int_like(&act))
}

/// Add any `expected` columns missing from `table_name`
///
/// Returns the names of the columns that were added.
pub async fn sync_columns(
    pool: &SqlitePool,
    table_name: &str,
    expected: &[ColumnDefinition],
) -> Result<Vec<String>> {
    if !SchemaIntrospector::table_exists(pool, table_name).await? {
        warn!(table = table_name, "Table missing, skipping column sync");
        return Ok(Vec::new());
    }

    let actual = SchemaIntrospector::introspect_table(pool, table_name).await?;
    let mut added = Vec::new();

    for change in compare_columns(table_name, expected, &actual) {
        match change {
            SchemaDrift::MissingColumn { table, column } => {
                let sql = format!(
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    table, column.name, column.sql_type
                );
                sqlx::query(&sql).execute(pool).await?;
                info!(table = %table, column = %column.name, "Added column");
                added.push(column.name);
            }
            SchemaDrift::TypeMismatch {
                table,
                column,
                expected,
                actual,
            } => {
                warn!(
                    "Type mismatch in {}.{}: expected '{}', found '{}'. Manual migration required.",
                    table, column, expected, actual
                );
            }
        }
    }

    if added.is_empty() {
        debug!(table = table_name, "Schema up to date");
    }
    Ok(added)
}
