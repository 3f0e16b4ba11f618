//! Test Helper Utilities
//!
//! Temporary project trees and settings for pipeline tests

#![allow(dead_code)]

use controls_common::config::{ControlTypeConfig, Settings};
use controls_parse::{open_repository, Repository};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const PROJECT: &str = "Controls";

/// Mash `contains` output with one genus
pub const CONTAINS_TSV: &str =
    "sample\ttaxonomic_genus\tshared_hashes\nS\tSalmonella\t400/1000\nS\tSalmonella\t100/1000\n";

/// Kraken2 report with one genus row
pub const KRAKEN_REPORT: &str = "\
80.00\t800\t0\tR\t1\troot
55.00\t550\t550\tG\t590\t  Salmonella
40.00\t400\t400\tS\t28901\t    Salmonella enterica
";

/// Temporary storage, database and settings; dropped with the test
pub struct TestProject {
    pub dir: TempDir,
    pub settings: Settings,
}

impl TestProject {
    /// Settings pointing every external tool at a path that does not exist
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.database.path = dir.path().join("db").join("controls.db");
        settings.archive.storage = dir.path().join("storage");
        settings.archive.project_name = PROJECT.to_string();
        settings.classifiers.mash_binary = "/nonexistent/refseq_masher".to_string();
        settings.classifiers.kraken_binary = "/nonexistent/kraken2".to_string();
        settings.classifiers.kraken_db = Some(PathBuf::from("/nonexistent/kraken_db"));
        settings.control_types = vec![
            ControlTypeConfig {
                name: "EN-NOS".to_string(),
                regex: Some("EN-?NOS".to_string()),
                targets: vec!["Salmonella".to_string()],
            },
            ControlTypeConfig {
                name: "MCS-NOS".to_string(),
                regex: Some("MCS-?NOS".to_string()),
                targets: vec!["Escherichia".to_string()],
            },
        ];

        fs::create_dir_all(settings.archive.project_dir()).unwrap();
        Self { dir, settings }
    }

    pub fn project_dir(&self) -> PathBuf {
        self.settings.archive.project_dir()
    }

    /// Create a sample folder with pre-computed classifier outputs
    pub fn add_sample(&self, name: &str, cached: &[(&str, &str)]) -> PathBuf {
        let folder = self.project_dir().join(name);
        fs::create_dir_all(&folder).unwrap();
        for (mode, text) in cached {
            fs::write(folder.join(format!("{}.tsv", mode)), text).unwrap();
        }
        folder
    }

    pub fn add_file(&self, sample: &str, file: &str) -> PathBuf {
        let path = self.project_dir().join(sample).join(file);
        fs::write(&path, "").unwrap();
        path
    }

    pub async fn repository(&self) -> Repository {
        open_repository(&self.settings).await.unwrap()
    }
}

pub fn write_sheet(dir: &Path, rows: &[(&str, &str)]) -> PathBuf {
    let path = dir.join("submissions.csv");
    let mut text = String::from("Control Name,Submission Date\n");
    for (name, date) in rows {
        text.push_str(&format!("{},{}\n", name, date));
    }
    fs::write(&path, text).unwrap();
    path
}

pub fn modes(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}
