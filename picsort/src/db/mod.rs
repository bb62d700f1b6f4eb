//! Catalog access for picsort
//!
//! The catalog maps content hash to [`CatalogRecord`]. Records are stored as
//! JSON with an explicit `schema_version`; rows that fail to decode or carry
//! another version read as absent and are recomputed by the pipeline.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryCatalog;
pub use sqlite::SqliteCatalog;

use crate::models::{CatalogRecord, CATALOG_SCHEMA_VERSION};
use async_trait::async_trait;
use picsort_common::Result;

/// Persistent hash → record store shared by all pipeline stages
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get(&self, hash: &str) -> Result<Option<CatalogRecord>>;

    async fn set(&self, hash: &str, record: &CatalogRecord) -> Result<()>;

    /// Every readable record, ordered by hash
    async fn iter_all(&self) -> Result<Vec<(String, CatalogRecord)>>;

    /// Drop every record
    async fn reset(&self) -> Result<()>;

    async fn exists(&self, hash: &str) -> Result<bool> {
        Ok(self.get(hash).await?.is_some())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.iter_all().await?.into_iter().map(|(hash, _)| hash).collect())
    }
}

/// Decode one stored row; unreadable rows are logged and read as absent
pub(crate) fn decode_record(hash: &str, schema_version: i64, json: &str) -> Option<CatalogRecord> {
    if schema_version != i64::from(CATALOG_SCHEMA_VERSION) {
        tracing::warn!(hash = %hash, schema_version, "Catalog row has unsupported schema, ignoring");
        return None;
    }
    match serde_json::from_str::<CatalogRecord>(json) {
        Ok(record) if record.schema_version == CATALOG_SCHEMA_VERSION => Some(record),
        Ok(record) => {
            tracing::warn!(
                hash = %hash,
                schema_version = record.schema_version,
                "Catalog record has unsupported schema, ignoring"
            );
            None
        }
        Err(e) => {
            tracing::warn!(hash = %hash, error = %e, "Corrupt catalog record, ignoring");
            None
        }
    }
}
