//! Submission date resolution
//!
//! A sample's submission date is resolved by trying, in order:
//! 1. A date embedded in the absolute folder path (configurable pattern)
//! 2. The legacy submission sheet, keyed by sample name
//! 3. The creation time of the newest read file in the folder
//!
//! Only the last strategy is flagged as file-time derived. A miss on all
//! three is a normal outcome, not an error.

use chrono::NaiveDate;
use controls_common::config::Settings;
use controls_common::time::{local_date, parse_compact_date, parse_sheet_date};
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, error, warn};
use walkdir::WalkDir;

/// Column holding the sample name in the legacy sheet
pub const SHEET_NAME_COLUMN: &str = "Control Name";

/// Column holding the submission date in the legacy sheet
pub const SHEET_DATE_COLUMN: &str = "Submission Date";

/// Legacy submission sheet errors
#[derive(Debug, Error)]
pub enum LegacySheetError {
    #[error("Failed to read sheet {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Sheet {path} has no '{column}' column")]
    MissingColumn { path: PathBuf, column: String },
}

/// Outcome of date resolution for one folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolvedDate {
    pub date: Option<NaiveDate>,
    /// Set when the date came from a file creation time
    pub from_file_time: bool,
}

impl ResolvedDate {
    fn exact(date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            from_file_time: false,
        }
    }
}

/// Control name to submission date, as read from the legacy sheet
#[derive(Debug, Default)]
pub struct LegacySheet {
    dates: HashMap<String, NaiveDate>,
}

impl LegacySheet {
    /// Read the sheet; `.tsv` and `.txt` files are tab separated, anything else is CSV
    pub fn load(path: &Path) -> Result<Self, LegacySheetError> {
        let delimiter = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("tsv") || ext.eq_ignore_ascii_case("txt") => b'\t',
            _ => b',',
        };
        let read_err = |source| LegacySheetError::Read {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(read_err)?;

        let headers = reader.headers().map_err(read_err)?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| LegacySheetError::MissingColumn {
                    path: path.to_path_buf(),
                    column: name.to_string(),
                })
        };
        let name_idx = column(SHEET_NAME_COLUMN)?;
        let date_idx = column(SHEET_DATE_COLUMN)?;

        let mut dates = HashMap::new();
        for record in reader.records() {
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable sheet row");
                    continue;
                }
            };
            let (Some(name), Some(cell)) = (record.get(name_idx), record.get(date_idx)) else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            match parse_sheet_date(cell) {
                Some(date) => {
                    dates.entry(name.to_string()).or_insert(date);
                }
                None if !cell.is_empty() => {
                    warn!(sample = %name, cell = %cell, "Unparsable submission date in sheet")
                }
                None => {}
            }
        }

        debug!(path = %path.display(), entries = dates.len(), "Loaded legacy submission sheet");
        Ok(Self { dates })
    }

    pub fn lookup(&self, name: &str) -> Option<NaiveDate> {
        self.dates.get(name).copied()
    }
}

pub struct DateResolver {
    pattern: Regex,
    sheet_path: Option<PathBuf>,
    /// Loaded on first use; `None` inside means the load failed
    sheet: OnceLock<Option<LegacySheet>>,
    file_extensions: Vec<String>,
}

impl DateResolver {
    pub fn new(pattern: Regex, sheet_path: Option<PathBuf>, file_extensions: Vec<String>) -> Self {
        Self {
            pattern,
            sheet_path,
            sheet: OnceLock::new(),
            file_extensions,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, regex::Error> {
        Ok(Self::new(
            Regex::new(&settings.dates.pattern)?,
            settings.folders.legacy_submissions.clone(),
            settings.dates.fastq_extensions.clone(),
        ))
    }

    /// Resolve the submission date for a sample folder
    pub fn resolve(&self, folder: &Path) -> ResolvedDate {
        if let Some(date) = self.date_from_path(folder) {
            debug!(folder = %folder.display(), %date, "Date from folder path");
            return ResolvedDate::exact(date);
        }

        let name = sample_name(folder);
        if let Some(date) = self.date_from_sheet(&name) {
            debug!(sample = %name, %date, "Date from legacy sheet");
            return ResolvedDate::exact(date);
        }

        match self.date_from_file_time(folder) {
            Some(date) => {
                debug!(sample = %name, %date, "Date from read file creation time");
                ResolvedDate {
                    date: Some(date),
                    from_file_time: true,
                }
            }
            None => ResolvedDate::default(),
        }
    }

    /// Last pattern match in the absolute path that is a real calendar date
    pub fn date_from_path(&self, folder: &Path) -> Option<NaiveDate> {
        let absolute = std::path::absolute(folder).unwrap_or_else(|_| folder.to_path_buf());
        let text = absolute.to_string_lossy();
        let matches: Vec<_> = self.pattern.find_iter(&text).collect();
        matches
            .iter()
            .rev()
            .find_map(|m| parse_compact_date(m.as_str()))
    }

    fn date_from_sheet(&self, name: &str) -> Option<NaiveDate> {
        let path = self.sheet_path.as_ref()?;
        let sheet = self.sheet.get_or_init(|| match LegacySheet::load(path) {
            Ok(sheet) => Some(sheet),
            Err(e) => {
                error!(error = %e, "Legacy submission sheet unavailable");
                None
            }
        });
        let date = sheet.as_ref()?.lookup(name);
        if date.is_none() {
            debug!(sample = %name, "Sample not found in legacy sheet");
        }
        date
    }

    fn date_from_file_time(&self, folder: &Path) -> Option<NaiveDate> {
        newest_file_time(folder, &self.file_extensions).map(local_date)
    }
}

/// Sample name is the folder's base name
pub fn sample_name(folder: &Path) -> String {
    folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| folder.to_string_lossy().into_owned())
}

/// Creation time (modification time where unsupported) of the newest matching file
fn newest_file_time(folder: &Path, extensions: &[String]) -> Option<SystemTime> {
    WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            let name = e.file_name().to_string_lossy();
            extensions.iter().any(|ext| name.ends_with(&format!(".{}", ext)))
        })
        .filter_map(|e| {
            let meta = fs::metadata(e.path()).ok()?;
            meta.created().or_else(|_| meta.modified()).ok()
        })
        .max()
}
