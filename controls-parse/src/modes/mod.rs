//! Analysis mode processors
//!
//! Each mode pairs an external classifier with a normalizer that turns the
//! classifier's tabular output into a [`GenusRecord`]. Processors are held in
//! a [`ModeRegistry`] built once from the settings; lookup is by exact mode
//! name and an unknown name is an error, never a silent no-op.
//!
//! # Modes
//! - **mash** - `contains` / `matches` style `k/n` shared-hash screens
//! - **kraken** - Kraken2 report read counts at genus rank

pub mod kraken;
pub mod mash;
pub mod tsv;

pub use kraken::KrakenProcessor;
pub use mash::MashScreenProcessor;

use controls_common::config::{ModeKind, Settings};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Suffix appended to genus names whose sample date came from a file time
pub const LOW_CONFIDENCE_MARKER: char = '*';

/// External classifier failures
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// Binary could not be started
    #[error("Failed to start {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// Binary ran but reported failure
    #[error("{binary} exited with {status}: {stderr}")]
    ExitStatus {
        binary: String,
        status: String,
        stderr: String,
    },

    /// Classifier produced nothing
    #[error("Classifier produced no output")]
    EmptyOutput,

    /// Folder does not hold the inputs the classifier needs
    #[error("Missing classifier inputs: {0}")]
    MissingInputs(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Registry lookup and construction failures
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("No processor registered for mode '{0}'")]
    Unregistered(String),

    #[error("Mode '{0}' is a count mode but classifiers.kraken_db is not set")]
    MissingDatabase(String),
}

/// Statistics for one genus under one mode
#[derive(Debug, Clone, PartialEq)]
pub enum GenusStats {
    /// Shared-hash fraction as reported (`k/n`) and its value
    Ratio { hashes: String, ratio: f64 },
    /// Reads assigned and their share of the sample
    Count { count: u64, percent: f64 },
}

/// Canonical per-genus record for one sample and one mode
#[derive(Debug, Clone, PartialEq)]
pub struct GenusRecord {
    mode: String,
    genera: BTreeMap<String, GenusStats>,
}

impl GenusRecord {
    pub fn new(mode: &str) -> Self {
        Self {
            mode: mode.to_string(),
            genera: BTreeMap::new(),
        }
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn is_empty(&self) -> bool {
        self.genera.is_empty()
    }

    pub fn len(&self) -> usize {
        self.genera.len()
    }

    pub fn get(&self, genus: &str) -> Option<&GenusStats> {
        self.genera.get(genus)
    }

    pub fn genera(&self) -> impl Iterator<Item = &str> {
        self.genera.keys().map(String::as_str)
    }

    /// Insert a ratio entry, keeping the existing one unless this ratio is higher
    pub fn insert_ratio(&mut self, genus: &str, hashes: &str, ratio: f64) {
        match self.genera.get(genus) {
            Some(GenusStats::Ratio { ratio: current, .. }) if *current >= ratio => {}
            _ => {
                self.genera.insert(
                    genus.to_string(),
                    GenusStats::Ratio {
                        hashes: hashes.to_string(),
                        ratio,
                    },
                );
            }
        }
    }

    /// Insert a count entry, keeping the larger count on repeats
    pub fn insert_count(&mut self, genus: &str, count: u64, percent: f64) {
        match self.genera.get(genus) {
            Some(GenusStats::Count { count: current, .. }) if *current >= count => {}
            _ => {
                self.genera
                    .insert(genus.to_string(), GenusStats::Count { count, percent });
            }
        }
    }

    /// Append the low-confidence marker to every genus name
    pub fn mark_low_confidence(&mut self) {
        let genera = std::mem::take(&mut self.genera);
        self.genera = genera
            .into_iter()
            .map(|(genus, stats)| (format!("{}{}", genus, LOW_CONFIDENCE_MARKER), stats))
            .collect();
    }

    /// JSON shape stored per mode: `{genus: {"<mode>_<field>": value}}`
    pub fn to_value(&self) -> Value {
        let mut root = Map::new();
        for (genus, stats) in &self.genera {
            let fields = match stats {
                GenusStats::Ratio { hashes, ratio } => json!({
                    format!("{}_hashes", self.mode): hashes,
                    format!("{}_ratio", self.mode): ratio,
                }),
                GenusStats::Count { count, percent } => json!({
                    format!("{}_count", self.mode): count,
                    format!("{}_percent", self.mode): percent,
                }),
            };
            root.insert(genus.clone(), fields);
        }
        Value::Object(root)
    }

    pub fn to_json_string(&self) -> String {
        self.to_value().to_string()
    }
}

/// One analysis mode: classifier invocation plus output normalization
pub trait ModeProcessor {
    /// Exact mode name used for dispatch and as the storage column
    fn mode(&self) -> &str;

    /// Run the external classifier on `folder`
    ///
    /// Implementations leave their raw output at `output_path` so later runs
    /// can reuse it.
    fn run_classifier(&self, folder: &Path, output_path: &Path) -> Result<String, ClassifierError>;

    /// Header-only stand-in for output that could not be produced
    fn dummy_output(&self) -> String;

    /// Normalize raw classifier text into canonical per-genus entries
    fn normalize(&self, raw: &str) -> GenusRecord;

    /// Where this mode's raw output is cached inside a sample folder
    fn output_path(&self, folder: &Path) -> PathBuf {
        folder.join(format!("{}.tsv", self.mode()))
    }

    /// Raw output for `folder`, reusing a cached file before recomputing
    ///
    /// Returns `None` when the classifier could not produce usable output.
    fn process(&self, folder: &Path) -> Option<String> {
        let output_path = self.output_path(folder);
        if output_path.is_file() {
            match fs::read_to_string(&output_path) {
                Ok(text) => {
                    debug!(
                        mode = self.mode(),
                        path = %output_path.display(),
                        "Reusing existing classifier output"
                    );
                    return Some(text);
                }
                Err(e) => {
                    warn!(
                        mode = self.mode(),
                        path = %output_path.display(),
                        error = %e,
                        "Existing output unreadable, rerunning classifier"
                    );
                }
            }
        }

        debug!(mode = self.mode(), folder = %folder.display(), "Running classifier");
        match self.run_classifier(folder, &output_path) {
            Ok(text) => Some(text),
            Err(e) => {
                error!(
                    mode = self.mode(),
                    folder = %folder.display(),
                    error = %e,
                    "Classifier failed"
                );
                None
            }
        }
    }
}

/// Mode name to processor lookup, fixed at startup
#[derive(Default)]
pub struct ModeRegistry {
    processors: Vec<Box<dyn ModeProcessor>>,
}

impl ModeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one processor per configured mode
    pub fn from_settings(settings: &Settings) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for mode in &settings.modes {
            let processor: Box<dyn ModeProcessor> = match mode.kind {
                ModeKind::Ratio => Box::new(MashScreenProcessor::new(mode, &settings.classifiers)),
                ModeKind::Count => {
                    let db = settings
                        .classifiers
                        .kraken_db
                        .as_ref()
                        .ok_or_else(|| RegistryError::MissingDatabase(mode.name.clone()))?;
                    Box::new(KrakenProcessor::new(
                        &mode.name,
                        &settings.classifiers.kraken_binary,
                        db,
                        &settings.dates.fastq_extensions,
                    ))
                }
            };
            registry.register(processor);
        }
        Ok(registry)
    }

    /// Add or replace the processor for its mode
    pub fn register(&mut self, processor: Box<dyn ModeProcessor>) {
        self.processors.retain(|p| p.mode() != processor.mode());
        self.processors.push(processor);
    }

    pub fn get(&self, mode: &str) -> Result<&dyn ModeProcessor, RegistryError> {
        self.processors
            .iter()
            .find(|p| p.mode() == mode)
            .map(|p| p.as_ref())
            .ok_or_else(|| RegistryError::Unregistered(mode.to_string()))
    }

    pub fn modes(&self) -> Vec<String> {
        self.processors.iter().map(|p| p.mode().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use controls_common::config::ModeConfig;
    use std::path::PathBuf;

    #[test]
    fn test_ratio_record_json_shape() {
        let mut record = GenusRecord::new("contains");
        record.insert_ratio("Salmonella", "400/1000", 0.4);

        assert_eq!(
            record.to_value(),
            json!({"Salmonella": {"contains_hashes": "400/1000", "contains_ratio": 0.4}})
        );
    }

    #[test]
    fn test_count_record_json_shape() {
        let mut record = GenusRecord::new("kraken");
        record.insert_count("Escherichia", 1520, 12.5);

        assert_eq!(
            record.to_value(),
            json!({"Escherichia": {"kraken_count": 1520, "kraken_percent": 12.5}})
        );
    }

    #[test]
    fn test_higher_ratio_wins_regardless_of_order() {
        let mut record = GenusRecord::new("matches");
        record.insert_ratio("Bacillus", "10/1000", 0.01);
        record.insert_ratio("Bacillus", "900/1000", 0.9);
        record.insert_ratio("Bacillus", "500/1000", 0.5);

        assert_eq!(
            record.get("Bacillus"),
            Some(&GenusStats::Ratio {
                hashes: "900/1000".to_string(),
                ratio: 0.9
            })
        );
    }

    #[test]
    fn test_mark_low_confidence_renames_all() {
        let mut record = GenusRecord::new("contains");
        record.insert_ratio("Salmonella", "1/2", 0.5);
        record.insert_ratio("Listeria", "1/4", 0.25);
        record.mark_low_confidence();

        let genera: Vec<_> = record.genera().collect();
        assert_eq!(genera, vec!["Listeria*", "Salmonella*"]);
    }

    #[test]
    fn test_empty_record_serializes_to_empty_object() {
        assert_eq!(GenusRecord::new("kraken").to_json_string(), "{}");
    }

    #[test]
    fn test_registry_rejects_unknown_mode() {
        let mut settings = Settings::default();
        settings.classifiers.kraken_db = Some(PathBuf::from("/db/kraken"));
        let registry = ModeRegistry::from_settings(&settings).unwrap();

        assert!(registry.get("contains").is_ok());
        assert!(registry.get("kraken").is_ok());
        assert!(matches!(
            registry.get("sourmash"),
            Err(RegistryError::Unregistered(name)) if name == "sourmash"
        ));
    }

    #[test]
    fn test_registry_count_mode_needs_database() {
        let settings = Settings::default();
        assert!(matches!(
            ModeRegistry::from_settings(&settings),
            Err(RegistryError::MissingDatabase(name)) if name == "kraken"
        ));
    }

    #[test]
    fn test_register_replaces_same_mode() {
        let mut settings = Settings::default();
        settings.modes = vec![ModeConfig::ratio("contains", "g", "h")];
        let mut registry = ModeRegistry::from_settings(&settings).unwrap();

        registry.register(Box::new(MashScreenProcessor::new(
            &ModeConfig::ratio("contains", "genus", "hashes"),
            &settings.classifiers,
        )));
        assert_eq!(registry.modes(), vec!["contains"]);
    }
}
