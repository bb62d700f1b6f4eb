//! In-process catalog
//!
//! Keeps rows in the same JSON form as [`super::SqliteCatalog`], so decoding
//! rules are identical. Used for dry runs and tests.

use super::{decode_record, Catalog};
use crate::models::{CatalogRecord, CATALOG_SCHEMA_VERSION};
use async_trait::async_trait;
use picsort_common::Result;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryCatalog {
    rows: RwLock<BTreeMap<String, (i64, String)>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a row exactly as given, bypassing serialization
    pub async fn insert_raw(&self, hash: &str, schema_version: i64, json: &str) {
        self.rows
            .write()
            .await
            .insert(hash.to_string(), (schema_version, json.to_string()));
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn get(&self, hash: &str) -> Result<Option<CatalogRecord>> {
        let rows = self.rows.read().await;
        Ok(rows
            .get(hash)
            .and_then(|(version, json)| decode_record(hash, *version, json)))
    }

    async fn set(&self, hash: &str, record: &CatalogRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        self.rows.write().await.insert(
            hash.to_string(),
            (i64::from(CATALOG_SCHEMA_VERSION), json),
        );
        Ok(())
    }

    async fn iter_all(&self) -> Result<Vec<(String, CatalogRecord)>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter_map(|(hash, (version, json))| {
                decode_record(hash, *version, json).map(|record| (hash.clone(), record))
            })
            .collect())
    }

    async fn reset(&self) -> Result<()> {
        self.rows.write().await.clear();
        Ok(())
    }
}
