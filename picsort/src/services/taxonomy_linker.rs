//! Derived symlink trees
//!
//! - `by_date/<capture>_<NNN><ext>`: one entry per content, suffix allocated
//!   under a per-date lock
//! - `by_<taxonomy>/<token>/<date link name>`: first present tag of a priority list
//! - `by_location/<c1>/…/<cN>/<date link name>` plus `_all_` at every ancestor
//!
//! Every operation is idempotent; re-running rebuilds identical targets.

use crate::models::{render_values, CatalogRecord, MetadataRecord};
use crate::services::content_store::ContentStore;
use crate::services::reverse_geocoder::ReverseGeocoder;
use picsort_common::{Error, Result};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub const UNKNOWN_BUCKET: &str = "_unknown_";
pub const ALL_BUCKET: &str = "_all_";

/// Replace every character outside `[0-9A-Za-z]` with `_`
pub fn sanitize_token(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Place segment safe for one directory level
fn sanitize_place_segment(value: &str) -> String {
    let segment: String = value
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() || c == '/' || c == '\\' { '_' } else { c })
        .collect();
    match segment.as_str() {
        "." | ".." => "_".to_string(),
        _ => segment,
    }
}

/// Builds every derived link tree for catalog records
pub struct TaxonomyLinker {
    store: Arc<ContentStore>,
    geocoder: Arc<dyn ReverseGeocoder>,
    bucket_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TaxonomyLinker {
    pub fn new(store: Arc<ContentStore>, geocoder: Arc<dyn ReverseGeocoder>) -> Self {
        Self {
            store,
            geocoder,
            bucket_locks: Mutex::new(HashMap::new()),
        }
    }

    fn bucket_lock(&self, bucket: &str) -> Arc<Mutex<()>> {
        let mut locks = self.bucket_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(bucket.to_string()).or_default().clone()
    }

    fn metadata(record: &CatalogRecord) -> Result<&MetadataRecord> {
        record.metadata.as_ref().ok_or_else(|| {
            Error::InvalidInput(format!("Record {} has no resolved metadata", record.hash()))
        })
    }

    fn date_link_name(record: &CatalogRecord) -> Result<&str> {
        record.links.date_link_name.as_deref().ok_or_else(|| {
            Error::InvalidInput(format!("Record {} has no date link", record.hash()))
        })
    }

    /// Link the record under `by_date/` and store the chosen name
    ///
    /// A recorded name in this bucket that still resolves to the content is
    /// kept. Otherwise existing entries are scanned from suffix `000`; an
    /// entry already resolving to this content is reused, else the first
    /// unused (or dangling) suffix is taken.
    pub fn date_link(&self, record: &mut CatalogRecord) -> Result<String> {
        let capture = Self::metadata(record)?.capture_timestamp.clone();
        let hash = record.hash().to_string();
        let extension = record.content.extension.clone();
        let bucket_dir = self.store.root().join("by_date");

        let lock = self.bucket_lock(&capture);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(recorded) = record.links.date_link_name.clone() {
            let in_bucket = recorded
                .strip_prefix(capture.as_str())
                .is_some_and(|rest| rest.starts_with('_'));
            if in_bucket && self.store.points_to(&hash, &bucket_dir.join(&recorded))? {
                return Ok(recorded);
            }
        }

        let mut first_free = None;
        let mut index = 0usize;
        let chosen = loop {
            let name = format!("{}_{:03}{}", capture, index, extension);
            let path = bucket_dir.join(&name);

            if fs::symlink_metadata(&path).is_err() {
                break first_free.unwrap_or(name);
            }
            if self.store.points_to(&hash, &path)? {
                break name;
            }
            if first_free.is_none() && fs::metadata(&path).is_err() {
                // dangling
                first_free = Some(name);
            }
            index += 1;
        };

        self.store.link(&hash, &bucket_dir.join(&chosen))?;
        tracing::debug!(hash = %hash, link = %chosen, "Date link");

        record.links.date_link_name = Some(chosen.clone());
        Ok(chosen)
    }

    /// Link under `by_<taxonomy>/<token>/` using the first present tag
    pub fn tag_link(&self, record: &CatalogRecord, taxonomy: &str, tags: &[String]) -> Result<PathBuf> {
        let name = Self::date_link_name(record)?;
        let metadata = Self::metadata(record)?;

        let token = metadata
            .first_tag(tags)
            .map(|(_, values)| sanitize_token(&render_values(values)))
            .filter(|token| !token.is_empty())
            .unwrap_or_else(|| UNKNOWN_BUCKET.to_string());

        let path = self
            .store
            .root()
            .join(format!("by_{}", taxonomy))
            .join(token)
            .join(name);
        self.store.link(record.hash(), &path)?;
        Ok(path)
    }

    /// Ensure `links.place_hierarchy` is populated for located records
    ///
    /// Returns true when the geocoder was queried. Geocoder failures are fatal
    /// for the record.
    pub async fn resolve_place(&self, record: &mut CatalogRecord) -> Result<bool> {
        let Some((latitude, longitude)) = Self::metadata(record)?.coordinates() else {
            return Ok(false);
        };
        if record.links.place_hierarchy.is_some() {
            return Ok(false);
        }

        let hierarchy = self
            .geocoder
            .reverse(latitude, longitude)
            .await
            .map_err(|e| Error::Internal(format!("Reverse geocoding failed for {}: {}", record.hash(), e)))?;
        record.links.place_hierarchy = Some(hierarchy);
        Ok(true)
    }

    /// Link under `by_location/` from the cached place hierarchy
    ///
    /// Records without coordinates or with an empty hierarchy go to `_unknown_`.
    pub fn location_links(&self, record: &CatalogRecord) -> Result<Vec<PathBuf>> {
        let name = Self::date_link_name(record)?;
        let located = Self::metadata(record)?.coordinates().is_some();
        let base = self.store.root().join("by_location");

        let segments: Vec<String> = if located {
            record
                .links
                .place_hierarchy
                .iter()
                .flatten()
                .map(|segment| sanitize_place_segment(segment))
                .filter(|segment| !segment.is_empty())
                .collect()
        } else {
            Vec::new()
        };

        let Some((leaf, ancestors)) = segments.split_last() else {
            let path = base.join(UNKNOWN_BUCKET).join(name);
            self.store.link(record.hash(), &path)?;
            return Ok(vec![path]);
        };

        let mut links = Vec::with_capacity(segments.len());
        let mut dir = base;
        for ancestor in ancestors {
            dir.push(ancestor);
            let path = dir.join(ALL_BUCKET).join(name);
            self.store.link(record.hash(), &path)?;
            links.push(path);
        }

        let path = dir.join(leaf).join(name);
        self.store.link(record.hash(), &path)?;
        links.push(path);
        Ok(links)
    }

    /// Geocode if needed, then build the location links
    pub async fn geo_link(self: &Arc<Self>, record: &mut CatalogRecord) -> Result<Vec<PathBuf>> {
        self.resolve_place(record).await?;

        let linker = Arc::clone(self);
        let snapshot = record.clone();
        tokio::task::spawn_blocking(move || linker.location_links(&snapshot))
            .await
            .map_err(|e| Error::Internal(format!("Location link task failed: {}", e)))?
    }
}
