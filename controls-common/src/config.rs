//! Configuration loading and validation
//!
//! Settings are read once from a TOML file into an immutable [`Settings`]
//! value and passed by reference into every component. Types are strict:
//! a boolean written as `"true"` is a load error, not a coercion.
//!
//! Config file resolution order:
//! 1. Command-line argument (file, or directory containing `config.toml`)
//! 2. `CONTROLS_CONFIG` environment variable
//! 3. `~/.config/controls/config.toml`
//! 4. `~/.controls/config.toml`

use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "CONTROLS_CONFIG";

/// File name searched for inside config directories
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Default pattern for a date embedded in a sample folder path
pub const DEFAULT_DATE_PATTERN: &str = r"20\d{2}-?\d{2}-?\d{2}";

/// Columns of the samples table that a mode name must not shadow
const RESERVED_COLUMNS: &[&str] = &["id", "parent_id", "name", "submitted_date"];

/// Complete, validated application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub folders: FolderConfig,
    #[serde(default)]
    pub dates: DateConfig,
    #[serde(default)]
    pub classifiers: ClassifierConfig,
    #[serde(default = "default_modes")]
    pub modes: Vec<ModeConfig>,
    #[serde(default)]
    pub control_types: Vec<ControlTypeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Remote sequencing archive linker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveConfig {
    #[serde(default = "default_linker")]
    pub linker: String,
    #[serde(default)]
    pub project_number: u32,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Local root that the linker populates
    #[serde(default = "default_storage")]
    pub storage: PathBuf,
    #[serde(default = "default_file_types")]
    pub file_types: String,
}

impl ArchiveConfig {
    /// Directory holding one sub-folder per sample
    pub fn project_dir(&self) -> PathBuf {
        self.storage.join(&self.project_name)
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            linker: default_linker(),
            project_number: 0,
            project_name: String::new(),
            username: String::new(),
            password: String::new(),
            storage: default_storage(),
            file_types: default_file_types(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FolderConfig {
    /// Where report feed files are written
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Legacy "Control Name" / "Submission Date" sheet used as a date fallback
    #[serde(default)]
    pub legacy_submissions: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DateConfig {
    #[serde(default = "default_date_pattern")]
    pub pattern: String,
    /// Extensions of files whose creation time may stand in for a date
    #[serde(default = "default_fastq_extensions")]
    pub fastq_extensions: Vec<String>,
}

impl Default for DateConfig {
    fn default() -> Self {
        Self {
            pattern: default_date_pattern(),
            fastq_extensions: default_fastq_extensions(),
        }
    }
}

/// External classifier executables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassifierConfig {
    #[serde(default = "default_mash_binary")]
    pub mash_binary: String,
    #[serde(default = "default_kraken_binary")]
    pub kraken_binary: String,
    #[serde(default)]
    pub kraken_db: Option<PathBuf>,
    #[serde(default)]
    pub verbose: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            mash_binary: default_mash_binary(),
            kraken_binary: default_kraken_binary(),
            kraken_db: None,
            verbose: false,
        }
    }
}

/// How a mode's classifier output is normalized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeKind {
    /// Mash-screen family: `k/n` shared-hash fractions
    Ratio,
    /// Kraken family: read counts and percentages
    Count,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModeConfig {
    pub name: String,
    pub kind: ModeKind,
    #[serde(default)]
    pub genus_column: Option<String>,
    #[serde(default)]
    pub hashes_column: Option<String>,
}

impl ModeConfig {
    pub fn ratio(name: &str, genus_column: &str, hashes_column: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ModeKind::Ratio,
            genus_column: Some(genus_column.to_string()),
            hashes_column: Some(hashes_column.to_string()),
        }
    }

    pub fn count(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ModeKind::Count,
            genus_column: None,
            hashes_column: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlTypeConfig {
    pub name: String,
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub targets: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            archive: ArchiveConfig::default(),
            folders: FolderConfig::default(),
            dates: DateConfig::default(),
            classifiers: ClassifierConfig::default(),
            modes: default_modes(),
            control_types: Vec::new(),
        }
    }
}

impl Settings {
    /// Parse and validate settings from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read, parse and validate a settings file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        info!("Using config file {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Replace the archive storage root, keeping the project folder name
    pub fn with_storage(mut self, storage: Option<PathBuf>) -> Self {
        if let Some(root) = storage {
            self.archive.storage = root;
        }
        self
    }

    /// Look up a configured mode by exact name
    pub fn mode(&self, name: &str) -> Option<&ModeConfig> {
        self.modes.iter().find(|m| m.name == name)
    }

    /// Names of all configured modes, in configuration order
    pub fn mode_names(&self) -> Vec<String> {
        self.modes.iter().map(|m| m.name.clone()).collect()
    }

    /// Reject settings that would only fail later, mid-run
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for mode in &self.modes {
            if !is_valid_mode_name(&mode.name) {
                return Err(Error::Config(format!(
                    "Mode name '{}' must be a lowercase identifier and not a reserved column",
                    mode.name
                )));
            }
            if !seen.insert(mode.name.as_str()) {
                return Err(Error::Config(format!("Duplicate mode '{}'", mode.name)));
            }
            if mode.kind == ModeKind::Ratio
                && (mode.genus_column.is_none() || mode.hashes_column.is_none())
            {
                return Err(Error::Config(format!(
                    "Ratio mode '{}' needs genus_column and hashes_column",
                    mode.name
                )));
            }
        }

        let mut names = HashSet::new();
        for ct in &self.control_types {
            if ct.name.trim().is_empty() {
                return Err(Error::Config("Control type with empty name".to_string()));
            }
            if !names.insert(ct.name.as_str()) {
                return Err(Error::Config(format!("Duplicate control type '{}'", ct.name)));
            }
            if let Some(pattern) = &ct.regex {
                Regex::new(pattern).map_err(|e| {
                    Error::Config(format!("Bad regex for control type '{}': {}", ct.name, e))
                })?;
            }
        }

        Regex::new(&self.dates.pattern)
            .map_err(|e| Error::Config(format!("Bad date pattern: {}", e)))?;

        debug!(
            modes = self.modes.len(),
            control_types = self.control_types.len(),
            "Settings validated"
        );
        Ok(())
    }
}

/// Whether `name` can safely be used as a per-mode column name
pub fn is_valid_mode_name(name: &str) -> bool {
    let mut chars = name.chars();
    let first_ok = matches!(chars.next(), Some(c) if c.is_ascii_lowercase());
    first_ok
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !RESERVED_COLUMNS.contains(&name)
}

/// Find the config file to load
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = cli_arg {
        let path = if path.is_dir() {
            path.join(CONFIG_FILE_NAME)
        } else {
            path.to_path_buf()
        };
        return if path.is_file() {
            Ok(path)
        } else {
            Err(Error::Config(format!("Config file not found: {}", path.display())))
        };
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Ok(path);
        }
        return Err(Error::Config(format!(
            "{} points at missing file {}",
            CONFIG_ENV_VAR,
            path.display()
        )));
    }

    let candidates = [
        dirs::config_dir().map(|d| d.join("controls").join(CONFIG_FILE_NAME)),
        dirs::home_dir().map(|d| d.join(".controls").join(CONFIG_FILE_NAME)),
    ];
    candidates
        .into_iter()
        .flatten()
        .find(|p| p.is_file())
        .ok_or_else(|| Error::Config("No config.toml found".to_string()))
}

fn default_modes() -> Vec<ModeConfig> {
    vec![
        ModeConfig::ratio("contains", "taxonomic_genus", "shared_hashes"),
        ModeConfig::ratio("matches", "taxonomic_genus", "matching"),
        ModeConfig::count("kraken"),
    ]
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("controls").join("controls.db"))
        .unwrap_or_else(|| PathBuf::from("controls.db"))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_linker() -> String {
    "ngsArchiveLinker.pl".to_string()
}

fn default_storage() -> PathBuf {
    PathBuf::from(".")
}

fn default_file_types() -> String {
    "fastq,assembly".to_string()
}

fn default_date_pattern() -> String {
    DEFAULT_DATE_PATTERN.to_string()
}

fn default_fastq_extensions() -> Vec<String> {
    vec!["fastq".to_string(), "fastq.gz".to_string()]
}

fn default_mash_binary() -> String {
    "refseq_masher".to_string()
}

fn default_kraken_binary() -> String {
    "kraken2".to_string()
}
