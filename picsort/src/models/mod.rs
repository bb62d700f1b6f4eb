//! Data models for picsort
//!
//! - Content records written at ingestion
//! - Metadata records written by the resolver
//! - Catalog records combining both with link bookkeeping

pub mod catalog_record;
pub mod content;
pub mod metadata;

pub use catalog_record::{CatalogRecord, LinkBookkeeping, CATALOG_SCHEMA_VERSION};
pub use content::{ContentRecord, IngestMode};
pub use metadata::{render_values, CaptureSource, LocationSource, MetadataRecord, TagMap, TagValue};
