//! # Controls Common Library
//!
//! Shared code for the control-sample tracking tools:
//! - Configuration schema and loading
//! - Database initialization and persisted models
//! - Submission date helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use config::Settings;
pub use error::{Error, Result};
