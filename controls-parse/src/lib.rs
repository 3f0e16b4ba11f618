//! controls-parse library interface
//!
//! Classifier result parsing for control samples: mode processors,
//! date and type resolution, the sample store and the batch pipeline.

pub mod db;
pub mod modes;
pub mod report;
pub mod services;
pub mod workflow;

pub use db::Repository;
pub use modes::{ModeProcessor, ModeRegistry};
pub use workflow::{ParsePipeline, RunSummary};

use controls_common::db::init_database;
use controls_common::{Result, Settings};

/// Open the configured database and wrap it for the configured project
pub async fn open_repository(settings: &Settings) -> Result<Repository> {
    let modes = settings.mode_names();
    let pool = init_database(&settings.database.path, &modes).await?;
    Ok(Repository::new(pool, settings.archive.project_dir(), modes))
}
