//! Sequencing archive pull
//!
//! Runs the configured archive linker to populate the local storage tree
//! with one folder per sample. The linker is a trusted external executable;
//! a failed pull never stops a run, which then works on what is on disk.

use controls_common::config::ArchiveConfig;
use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};

/// Archive linker errors
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to start archive linker {linker}: {source}")]
    Spawn {
        linker: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive linker exited with {status}: {stderr}")]
    ExitStatus { status: String, stderr: String },

    #[error("Archive project number is not configured")]
    NoProject,
}

pub struct ArchivePuller {
    config: ArchiveConfig,
}

impl ArchivePuller {
    pub fn new(config: &ArchiveConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Arguments passed to the linker; the password is included
    pub fn args(&self) -> Vec<String> {
        vec![
            "-p".to_string(),
            self.config.project_number.to_string(),
            "-t".to_string(),
            self.config.file_types.clone(),
            "--username".to_string(),
            self.config.username.clone(),
            "--password".to_string(),
            self.config.password.clone(),
            "-o".to_string(),
            self.config.storage.to_string_lossy().into_owned(),
            "--ignore".to_string(),
        ]
    }

    /// Pull the project into storage, returning the project directory
    pub fn pull(&self) -> Result<PathBuf, ArchiveError> {
        if self.config.project_number == 0 {
            return Err(ArchiveError::NoProject);
        }

        info!(
            project = self.config.project_number,
            storage = %self.config.storage.display(),
            "Pulling project from sequencing archive"
        );
        debug!(linker = %self.config.linker, user = %self.config.username, "Running archive linker");

        let output = Command::new(&self.config.linker)
            .args(self.args())
            .output()
            .map_err(|source| ArchiveError::Spawn {
                linker: self.config.linker.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ArchiveError::ExitStatus {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(self.config.project_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ArchiveConfig {
        ArchiveConfig {
            linker: "/nonexistent/ngsArchiveLinker.pl".to_string(),
            project_number: 2193,
            project_name: "Controls".to_string(),
            username: "lab".to_string(),
            password: "secret".to_string(),
            storage: PathBuf::from("/srv/storage"),
            file_types: "fastq,assembly".to_string(),
        }
    }

    #[test]
    fn test_linker_arguments() {
        let puller = ArchivePuller::new(&config());
        assert_eq!(
            puller.args(),
            vec![
                "-p", "2193", "-t", "fastq,assembly", "--username", "lab", "--password", "secret",
                "-o", "/srv/storage", "--ignore"
            ]
        );
    }

    #[test]
    fn test_missing_linker_is_spawn_error() {
        let puller = ArchivePuller::new(&config());
        assert!(matches!(puller.pull(), Err(ArchiveError::Spawn { .. })));
    }

    #[test]
    fn test_unconfigured_project() {
        let mut config = config();
        config.project_number = 0;
        assert!(matches!(
            ArchivePuller::new(&config).pull(),
            Err(ArchiveError::NoProject)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_successful_pull_returns_project_dir() {
        let mut config = config();
        config.linker = "true".to_string();
        let dir = ArchivePuller::new(&config).pull().unwrap();
        assert_eq!(dir, PathBuf::from("/srv/storage/Controls"));
    }
}
