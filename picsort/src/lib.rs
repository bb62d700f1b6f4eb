//! picsort library interface
//!
//! Content-addressed photo/track organizer: ingests source files into
//! `hashed/raw/<sha512>` and builds symlink trees by capture date, by tag and
//! by location. Exposed as a library for the binary and integration tests.

pub mod db;
pub mod models;
pub mod services;
pub mod workflow;

pub use workflow::{run_pipeline, PipelineOptions, PipelineServices, PipelineSummary};
