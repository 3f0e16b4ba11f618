//! Mash-screen family modes (`contains`, `matches`)
//!
//! The screening tool is invoked as `<binary> [--verbose] <mode> <folder>` and
//! prints a headed TSV on stdout. Each row names a genus and a shared-hash
//! fraction `k/n`; the column holding the fraction depends on the mode.

use super::tsv::{is_blank_genus, read_rows};
use super::{ClassifierError, GenusRecord, ModeProcessor};
use controls_common::config::{ClassifierConfig, ModeConfig};
use std::fs;
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

pub struct MashScreenProcessor {
    mode: String,
    genus_column: String,
    hashes_column: String,
    binary: String,
    verbose: bool,
}

impl MashScreenProcessor {
    pub fn new(mode: &ModeConfig, classifiers: &ClassifierConfig) -> Self {
        Self {
            mode: mode.name.clone(),
            genus_column: mode
                .genus_column
                .clone()
                .unwrap_or_else(|| "taxonomic_genus".to_string()),
            hashes_column: mode
                .hashes_column
                .clone()
                .unwrap_or_else(|| "shared_hashes".to_string()),
            binary: classifiers.mash_binary.clone(),
            verbose: classifiers.verbose,
        }
    }
}

/// Parse a `k/n` fraction; `None` when malformed or `n` is zero
pub fn parse_hash_fraction(hashes: &str) -> Option<f64> {
    let (shared, total) = hashes.trim().split_once('/')?;
    let shared: u64 = shared.trim().parse().ok()?;
    let total: u64 = total.trim().parse().ok()?;
    if total == 0 {
        return None;
    }
    Some(shared as f64 / total as f64)
}

impl ModeProcessor for MashScreenProcessor {
    fn mode(&self) -> &str {
        &self.mode
    }

    fn run_classifier(&self, folder: &Path, output_path: &Path) -> Result<String, ClassifierError> {
        let mut cmd = Command::new(&self.binary);
        if self.verbose {
            cmd.arg("--verbose");
        }
        cmd.arg(&self.mode).arg(folder);

        let output = cmd.output().map_err(|source| ClassifierError::Spawn {
            binary: self.binary.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(ClassifierError::ExitStatus {
                binary: self.binary.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        if text.trim().is_empty() {
            return Err(ClassifierError::EmptyOutput);
        }

        if let Err(e) = fs::write(output_path, &text) {
            warn!(
                path = %output_path.display(),
                error = %e,
                "Could not cache classifier output"
            );
        } else {
            debug!(path = %output_path.display(), "Wrote classifier output");
        }
        Ok(text)
    }

    fn dummy_output(&self) -> String {
        format!("sample\t{}\t{}\n", self.genus_column, self.hashes_column)
    }

    fn normalize(&self, raw: &str) -> GenusRecord {
        let mut record = GenusRecord::new(&self.mode);
        let (headers, rows) = read_rows(raw);

        if rows.is_empty() {
            return record;
        }
        if !headers.contains(&self.genus_column) || !headers.contains(&self.hashes_column) {
            warn!(
                mode = %self.mode,
                genus_column = %self.genus_column,
                hashes_column = %self.hashes_column,
                "Output lacks expected columns, using empty record"
            );
            return record;
        }

        for row in rows {
            let (Some(genus), Some(hashes)) =
                (row.get(&self.genus_column), row.get(&self.hashes_column))
            else {
                continue;
            };
            if is_blank_genus(genus) {
                continue;
            }
            match parse_hash_fraction(hashes) {
                Some(ratio) => record.insert_ratio(genus, hashes, ratio),
                None => warn!(mode = %self.mode, genus = %genus, hashes = %hashes, "Bad hash fraction"),
            }
        }
        record
    }
}
