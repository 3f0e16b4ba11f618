//! Sample and control type store
//!
//! Free functions in the submodules take a `&SqlitePool`; [`Repository`]
//! bundles the pool with the project directory and configured modes for the
//! pipeline.

pub mod control_types;
pub mod samples;

pub use control_types::{ensure_control_type, find_control_type, list_control_types};
pub use samples::{
    find_sample, sample_names_with_result, samples_by_control_type, upsert_sample, UpsertOutcome,
};

use controls_common::config::ControlTypeConfig;
use controls_common::db::{ControlType, Sample, StoredSample};
use controls_common::Result;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub struct Repository {
    pool: SqlitePool,
    project_dir: PathBuf,
    modes: Vec<String>,
}

impl Repository {
    pub fn new(pool: SqlitePool, project_dir: impl Into<PathBuf>, modes: Vec<String>) -> Self {
        Self {
            pool,
            project_dir: project_dir.into(),
            modes,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn modes(&self) -> &[String] {
        &self.modes
    }

    /// Insert or refresh every configured control type
    pub async fn ensure_control_types(&self, types: &[ControlTypeConfig]) -> Result<usize> {
        for ct in types {
            ensure_control_type(&self.pool, &ct.name, &ct.targets).await?;
        }
        info!(count = types.len(), "Control types ensured");
        Ok(types.len())
    }

    pub async fn control_types(&self) -> Result<Vec<ControlType>> {
        list_control_types(&self.pool).await
    }

    pub async fn upsert(&self, sample: &Sample, mode: &str) -> Result<UpsertOutcome> {
        upsert_sample(&self.pool, sample, mode).await
    }

    pub async fn get_sample(&self, name: &str) -> Result<Option<StoredSample>> {
        find_sample(&self.pool, name, &self.modes).await
    }

    pub async fn samples_of_type(&self, control_type: &ControlType) -> Result<Vec<StoredSample>> {
        samples_by_control_type(&self.pool, control_type.id, &self.modes).await
    }

    /// Sample folders under the project directory still lacking a `mode` result
    ///
    /// Sorted by path. A missing project directory yields an empty queue.
    pub async fn list_unseen_sample_folders(&self, mode: &str) -> Result<Vec<PathBuf>> {
        let seen = sample_names_with_result(&self.pool, mode).await?;

        if !self.project_dir.is_dir() {
            warn!(path = %self.project_dir.display(), "Project directory does not exist");
            return Ok(Vec::new());
        }

        let mut folders: Vec<PathBuf> = WalkDir::new(&self.project_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .filter(|e| !seen.contains(&*e.file_name().to_string_lossy()))
            .map(|e| e.into_path())
            .collect();
        folders.sort();

        debug!(
            mode = %mode,
            seen = seen.len(),
            unseen = folders.len(),
            "Listed unseen sample folders"
        );
        Ok(folders)
    }
}
