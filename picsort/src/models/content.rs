//! Content record produced by store ingestion

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// How source files reach the canonical store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestMode {
    Copy,
    /// Copy, then delete the source (unless it already lives in the store)
    Move,
}

impl fmt::Display for IngestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestMode::Copy => write!(f, "copy"),
            IngestMode::Move => write!(f, "move"),
        }
    }
}

/// One distinct piece of content in the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    /// SHA-512 of the full file bytes, lower-case hex
    pub hash: String,
    /// `<store>/hashed/raw/<hash>`
    pub canonical_path: PathBuf,
    /// Lower-cased with leading dot (`.jpg`), empty if the source had none
    pub extension: String,
    pub source_path: PathBuf,
    pub ingest_mode: IngestMode,
    /// Source modification time captured at ingestion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_modified: Option<DateTime<Utc>>,
}
