//! Per-sample, per-mode record assembly
//!
//! Combines type resolution, classifier output, normalization and date
//! resolution into a [`Sample`] ready for the repository, or a reason the
//! sample is skipped this run. Skipped samples are not persisted and stay
//! in the queue for the next run.

use super::date_resolver::{sample_name, DateResolver};
use super::type_classifier::TypeClassifier;
use crate::modes::ModeProcessor;
use controls_common::db::Sample;
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

/// Why a sample produced nothing to persist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No control type matched the sample name
    UnresolvedType,
    /// No date and an empty record
    NothingToStore,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnresolvedType => write!(f, "unresolved control type"),
            SkipReason::NothingToStore => write!(f, "no date and no results"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    Ready(Sample),
    Skipped { name: String, reason: SkipReason },
}

pub struct SampleRecordBuilder<'a> {
    dates: &'a DateResolver,
    types: &'a TypeClassifier,
}

impl<'a> SampleRecordBuilder<'a> {
    pub fn new(dates: &'a DateResolver, types: &'a TypeClassifier) -> Self {
        Self { dates, types }
    }

    /// Build the record for `folder` under `processor`'s mode
    pub fn build(&self, folder: &Path, processor: &dyn ModeProcessor) -> BuildOutcome {
        let name = sample_name(folder);
        let mode = processor.mode();

        let Some(control_type) = self.types.classify(&name) else {
            return BuildOutcome::Skipped {
                name,
                reason: SkipReason::UnresolvedType,
            };
        };

        let raw = processor.process(folder).unwrap_or_else(|| {
            warn!(sample = %name, mode = %mode, "No classifier output, using empty dataset");
            processor.dummy_output()
        });
        let mut record = processor.normalize(&raw);

        let resolved = self.dates.resolve(folder);
        if resolved.date.is_none() && record.is_empty() {
            warn!(
                sample = %name,
                mode = %mode,
                "No date and no results, will retry next run"
            );
            return BuildOutcome::Skipped {
                name,
                reason: SkipReason::NothingToStore,
            };
        }
        if resolved.date.is_none() {
            warn!(sample = %name, "No submission date available");
        }

        if resolved.from_file_time && !record.is_empty() {
            debug!(sample = %name, mode = %mode, "Marking genera from file-time date");
            record.mark_low_confidence();
        }

        let mut sample = Sample::new(name);
        sample.control_type = Some(control_type.to_string());
        sample.submitted_date = resolved.date;
        sample.set_result(mode, record.to_json_string());
        debug!(
            sample = %sample.name,
            mode = %mode,
            control_type = %control_type,
            genera = record.len(),
            "Built sample record"
        );
        BuildOutcome::Ready(sample)
    }
}
