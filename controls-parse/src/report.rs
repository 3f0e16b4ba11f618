//! Report feed export
//!
//! Writes one JSON file per control type holding the canonical per-sample
//! dictionaries that spreadsheet and chart generation consume:
//!
//! ```json
//! {
//!   "control_type": {"name": "EN-NOS", "targets": ["Salmonella"]},
//!   "samples": [
//!     {"name": "EN-NOS_20230715", "submitted_date": "2023-07-15",
//!      "control_type": "EN-NOS",
//!      "results": {"contains": {...}, "kraken": {}}}
//!   ]
//! }
//! ```

use crate::db::Repository;
use controls_common::db::{ControlType, StoredSample};
use controls_common::time::format_date;
use controls_common::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlTypeInfo {
    pub name: String,
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleReport {
    pub name: String,
    pub submitted_date: Option<String>,
    pub control_type: String,
    /// Decoded record per mode; `{}` when absent or undecodable
    pub results: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlTypeReport {
    pub control_type: ControlTypeInfo,
    pub samples: Vec<SampleReport>,
}

fn decode_result(sample: &str, mode: &str, raw: Option<&str>) -> Value {
    let Some(raw) = raw else {
        return Value::Object(Map::new());
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) | Err(_) => {
            warn!(sample = %sample, mode = %mode, "Stored result is not a JSON object");
            Value::Object(Map::new())
        }
    }
}

impl SampleReport {
    pub fn from_stored(sample: &StoredSample, control_type: &ControlType, modes: &[String]) -> Self {
        let results = modes
            .iter()
            .map(|mode| {
                (
                    mode.clone(),
                    decode_result(&sample.name, mode, sample.result(mode)),
                )
            })
            .collect();
        Self {
            name: sample.name.clone(),
            submitted_date: format_date(sample.submitted_date),
            control_type: control_type.name.clone(),
            results,
        }
    }
}

/// Report for every control type in the store
pub async fn build_reports(repo: &Repository) -> Result<Vec<ControlTypeReport>> {
    let mut reports = Vec::new();
    for control_type in repo.control_types().await? {
        let samples = repo
            .samples_of_type(&control_type)
            .await?
            .iter()
            .map(|s| SampleReport::from_stored(s, &control_type, repo.modes()))
            .collect();
        reports.push(ControlTypeReport {
            control_type: ControlTypeInfo {
                name: control_type.name.clone(),
                targets: control_type.targets.clone(),
            },
            samples,
        });
    }
    Ok(reports)
}

/// File name for a control type's report, path separators replaced
pub fn report_file_name(control_type: &str) -> String {
    let safe: String = control_type
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    format!("{}.json", safe)
}

/// Write `<output>/<control type>.json` for every control type
pub async fn export_reports(repo: &Repository, output: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(output)?;

    let mut written = Vec::new();
    for report in build_reports(repo).await? {
        let path = output.join(report_file_name(&report.control_type.name));
        fs::write(&path, serde_json::to_string_pretty(&report)?)?;
        info!(
            control_type = %report.control_type.name,
            samples = report.samples.len(),
            path = %path.display(),
            "Wrote report feed"
        );
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn stored(results: &[(&str, Option<&str>)]) -> StoredSample {
        StoredSample {
            id: 1,
            name: "EN-NOS_20230715".to_string(),
            submitted_date: NaiveDate::from_ymd_opt(2023, 7, 15),
            parent_id: Some(1),
            results: results
                .iter()
                .map(|(m, v)| (m.to_string(), v.map(str::to_string)))
                .collect(),
        }
    }

    #[test]
    fn test_sample_report_decodes_each_mode() {
        let ct = ControlType {
            id: 1,
            name: "EN-NOS".to_string(),
            targets: vec!["Salmonella".to_string()],
        };
        let sample = stored(&[
            ("contains", Some(r#"{"Salmonella":{"contains_hashes":"1/2","contains_ratio":0.5}}"#)),
            ("kraken", None),
            ("matches", Some("not json")),
        ]);
        let modes = vec!["contains".to_string(), "kraken".to_string(), "matches".to_string()];

        let report = SampleReport::from_stored(&sample, &ct, &modes);
        assert_eq!(report.submitted_date.as_deref(), Some("2023-07-15"));
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({
                "name": "EN-NOS_20230715",
                "submitted_date": "2023-07-15",
                "control_type": "EN-NOS",
                "results": {
                    "contains": {"Salmonella": {"contains_hashes": "1/2", "contains_ratio": 0.5}},
                    "kraken": {},
                    "matches": {}
                }
            })
        );
    }

    #[test]
    fn test_report_file_name() {
        assert_eq!(report_file_name("EN-NOS"), "EN-NOS.json");
        assert_eq!(report_file_name("a/b"), "a_b.json");
    }
}
