//! Database models

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A category of control sample with its expected organisms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlType {
    pub id: i64,
    pub name: String,
    pub targets: Vec<String>,
}

/// A control sample being assembled by the parse pipeline
///
/// `results` maps a mode name to that mode's serialized per-genus record.
/// Only the mode currently being processed is ever written back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sample {
    pub name: String,
    pub submitted_date: Option<NaiveDate>,
    pub control_type: Option<String>,
    pub results: BTreeMap<String, String>,
}

impl Sample {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn set_result(&mut self, mode: &str, record_json: String) {
        self.results.insert(mode.to_string(), record_json);
    }

    pub fn result(&self, mode: &str) -> Option<&str> {
        self.results.get(mode).map(String::as_str)
    }
}

/// A sample row as read back from the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSample {
    pub id: i64,
    pub name: String,
    pub submitted_date: Option<NaiveDate>,
    pub parent_id: Option<i64>,
    /// Raw per-mode column values; `None` means the mode never succeeded
    pub results: BTreeMap<String, Option<String>>,
}

impl StoredSample {
    pub fn result(&self, mode: &str) -> Option<&str> {
        self.results.get(mode).and_then(|v| v.as_deref())
    }
}
