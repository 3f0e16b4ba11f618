//! Parse pipeline orchestrator
//!
//! Runs every requested mode over the sample folders that have no result
//! for it yet, one folder at a time:
//! 1. List unseen folders for the mode
//! 2. Build the sample record (type, classifier output, date)
//! 3. Upsert the mode's result
//!
//! # Error Handling
//! - An unregistered mode fails the run before anything is processed
//! - Per-sample failures are logged and the run moves on
//! - The work queue is recomputed from the store on each run, so an
//!   interrupted run resumes where it stopped

use crate::db::{Repository, UpsertOutcome};
use crate::modes::{ModeRegistry, RegistryError};
use crate::services::{ArchivePuller, BuildOutcome, DateResolver, SampleRecordBuilder, TypeClassifier};
use controls_common::config::{ArchiveConfig, ControlTypeConfig, Settings};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info, warn};

/// Failures that stop a run before any sample is processed
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Store(#[from] controls_common::Error),
}

/// Per-mode counts for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeSummary {
    pub mode: String,
    /// Folders that had no result for the mode at the start of the run
    pub candidates: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Samples whose write failed
    pub failed: usize,
}

impl ModeSummary {
    fn new(mode: &str) -> Self {
        Self {
            mode: mode.to_string(),
            ..Default::default()
        }
    }

    pub fn persisted(&self) -> usize {
        self.inserted + self.updated
    }
}

impl fmt::Display for ModeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} candidates, {} inserted, {} updated, {} skipped, {} failed",
            self.mode, self.candidates, self.inserted, self.updated, self.skipped, self.failed
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub modes: Vec<ModeSummary>,
}

impl RunSummary {
    pub fn persisted(&self) -> usize {
        self.modes.iter().map(ModeSummary::persisted).sum()
    }

    pub fn mode(&self, mode: &str) -> Option<&ModeSummary> {
        self.modes.iter().find(|m| m.mode == mode)
    }
}

pub struct ParsePipeline {
    registry: ModeRegistry,
    dates: DateResolver,
    types: TypeClassifier,
    repo: Repository,
    archive: ArchiveConfig,
    control_types: Vec<ControlTypeConfig>,
}

impl ParsePipeline {
    /// Assemble a pipeline around an already-built registry and repository
    pub fn new(settings: &Settings, registry: ModeRegistry, repo: Repository) -> Result<Self, PipelineError> {
        Ok(Self {
            registry,
            dates: DateResolver::from_settings(settings)?,
            types: TypeClassifier::new(&settings.control_types)?,
            repo,
            archive: settings.archive.clone(),
            control_types: settings.control_types.clone(),
        })
    }

    /// Build the registry from `settings` as well
    pub fn from_settings(settings: &Settings, repo: Repository) -> Result<Self, PipelineError> {
        let registry = ModeRegistry::from_settings(settings)?;
        Self::new(settings, registry, repo)
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Populate storage from the sequencing archive; failure is not fatal
    pub fn pull_archive(&self) -> Option<PathBuf> {
        match ArchivePuller::new(&self.archive).pull() {
            Ok(dir) => {
                info!(path = %dir.display(), "Archive pull complete");
                Some(dir)
            }
            Err(e) => {
                error!(error = %e, "Archive pull failed, continuing with local data");
                None
            }
        }
    }

    /// Process `modes` in order over their unseen sample folders
    pub async fn run(&self, modes: &[String]) -> Result<RunSummary, PipelineError> {
        for mode in modes {
            self.registry.get(mode)?;
        }
        self.repo.ensure_control_types(&self.control_types).await?;

        let mut summary = RunSummary::default();
        for mode in modes {
            let mode_summary = self.run_mode(mode).await?;
            info!("{}", mode_summary);
            summary.modes.push(mode_summary);
        }

        info!(
            modes = summary.modes.len(),
            persisted = summary.persisted(),
            "Parse run complete"
        );
        Ok(summary)
    }

    async fn run_mode(&self, mode: &str) -> Result<ModeSummary, PipelineError> {
        let processor = self.registry.get(mode)?;
        let builder = SampleRecordBuilder::new(&self.dates, &self.types);
        let mut summary = ModeSummary::new(mode);

        let folders = match self.repo.list_unseen_sample_folders(mode).await {
            Ok(folders) => folders,
            Err(e) => {
                error!(mode = %mode, error = %e, "Could not list unseen samples");
                return Ok(summary);
            }
        };
        summary.candidates = folders.len();
        info!(mode = %mode, count = folders.len(), "Processing unseen samples");

        for folder in &folders {
            match builder.build(folder, processor) {
                BuildOutcome::Ready(sample) => match self.repo.upsert(&sample, mode).await {
                    Ok(UpsertOutcome::Inserted) => summary.inserted += 1,
                    Ok(UpsertOutcome::Updated) => summary.updated += 1,
                    Err(e) => {
                        error!(sample = %sample.name, mode = %mode, error = %e, "Failed to store sample");
                        summary.failed += 1;
                    }
                },
                BuildOutcome::Skipped { name, reason } => {
                    warn!(sample = %name, mode = %mode, %reason, "Sample skipped");
                    summary.skipped += 1;
                }
            }
        }

        Ok(summary)
    }
}
