//! Batch parse workflow
//!
//! Modes run one after another and samples within a mode run one after
//! another; classifier invocations block the run until they finish.

pub mod pipeline;

pub use pipeline::{ModeSummary, ParsePipeline, PipelineError, RunSummary};
