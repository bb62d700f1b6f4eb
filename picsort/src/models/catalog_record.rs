//! Versioned catalog record

use super::{ContentRecord, MetadataRecord};
use serde::{Deserialize, Serialize};

/// Current on-disk record schema; rows with any other version read as absent
pub const CATALOG_SCHEMA_VERSION: u32 = 1;

/// Derived-link bookkeeping owned by the linker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkBookkeeping {
    /// File name under `by_date/`, reused by every other taxonomy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_link_name: Option<String>,
    /// Cached reverse-geocoder answer, coarse to fine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_hierarchy: Option<Vec<String>>,
}

/// Everything known about one content hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub schema_version: u32,
    pub content: ContentRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataRecord>,
    #[serde(default)]
    pub links: LinkBookkeeping,
}

impl CatalogRecord {
    pub fn new(content: ContentRecord) -> Self {
        Self {
            schema_version: CATALOG_SCHEMA_VERSION,
            content,
            metadata: None,
            links: LinkBookkeeping::default(),
        }
    }

    pub fn hash(&self) -> &str {
        &self.content.hash
    }

    /// Replace the ingestion section, keeping metadata and links
    ///
    /// The first recorded extension is kept; derived link names are built
    /// from it.
    pub fn refresh_content(&mut self, content: ContentRecord) {
        let extension = std::mem::take(&mut self.content.extension);
        self.schema_version = CATALOG_SCHEMA_VERSION;
        self.content = ContentRecord { extension, ..content };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IngestMode;
    use std::path::PathBuf;

    fn content(source: &str, extension: &str) -> ContentRecord {
        ContentRecord {
            hash: "abc".to_string(),
            canonical_path: PathBuf::from("/store/hashed/raw/abc"),
            extension: extension.to_string(),
            source_path: PathBuf::from(source),
            ingest_mode: IngestMode::Copy,
            source_modified: None,
        }
    }

    #[test]
    fn test_refresh_keeps_first_extension_and_links() {
        let mut record = CatalogRecord::new(content("/src/x/a.jpg", ".jpg"));
        record.links.date_link_name = Some("20230101120000_000.jpg".to_string());

        record.refresh_content(content("/src/y/a.jpeg", ".jpeg"));

        assert_eq!(record.content.extension, ".jpg");
        assert_eq!(record.content.source_path, PathBuf::from("/src/y/a.jpeg"));
        assert_eq!(record.links.date_link_name.as_deref(), Some("20230101120000_000.jpg"));
    }
}
