//! Services used by the parse pipeline
//!
//! - **date_resolver** - submission date from path, legacy sheet or file time
//! - **type_classifier** - control type from sample name
//! - **record_builder** - assembles one sample record for one mode
//! - **archive_puller** - populates local storage from the sequencing archive

pub mod archive_puller;
pub mod date_resolver;
pub mod record_builder;
pub mod type_classifier;

pub use archive_puller::{ArchiveError, ArchivePuller};
pub use date_resolver::{DateResolver, LegacySheet, LegacySheetError, ResolvedDate};
pub use record_builder::{BuildOutcome, SampleRecordBuilder, SkipReason};
pub use type_classifier::TypeClassifier;
