//! Metadata resolution
//!
//! Merges decoded EXIF tags, direct GPS or track-interpolated GPS, and a
//! capture-date fallback chain into one [`MetadataRecord`] per content hash.
//!
//! Capture date: first non-blank tag from the priority list, then the source
//! mtime recorded at ingestion, then the canonical file's mtime.
//! Location: EXIF GPS when well-formed, otherwise the track buffer.

use crate::models::{
    CaptureSource, CatalogRecord, ContentRecord, LocationSource, MetadataRecord, TagMap,
};
use crate::services::exif_decoder::{signed_coordinate, ExifDecoder};
use crate::services::track_interpolator::TrackInterpolator;
use chrono::{DateTime, NaiveDateTime, Utc};
use picsort_common::config::{DEFAULT_CAPTURE_DATE_TAGS, DEFAULT_RETAINED_NAMESPACES};
use picsort_common::{Error, Result};
use std::fs;
use std::sync::Arc;

/// Sortable capture timestamp layout
pub const CAPTURE_FORMAT: &str = "%Y%m%d%H%M%S";

const GPS_LATITUDE: &str = "GPS GPSLatitude";
const GPS_LATITUDE_REF: &str = "GPS GPSLatitudeRef";
const GPS_LONGITUDE: &str = "GPS GPSLongitude";
const GPS_LONGITUDE_REF: &str = "GPS GPSLongitudeRef";

/// Normalize a date tag value: drop colons and spaces, neutralize path separators
///
/// Blank and all-zero values (`0000:00:00 00:00:00`) are treated as absent.
pub fn normalize_capture_date(raw: &str) -> Option<String> {
    let normalized: String = raw
        .trim()
        .trim_end_matches(char::from(0))
        .chars()
        .filter(|c| *c != ':' && !c.is_whitespace())
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();

    if normalized.is_empty() || normalized.chars().all(|c| c == '0') {
        None
    } else {
        Some(normalized)
    }
}

/// Unix seconds for a normalized capture timestamp (read as UTC)
pub fn capture_unix_seconds(capture: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(capture, CAPTURE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc().timestamp())
}

/// Metadata resolver
pub struct MetadataResolver {
    exif: Arc<dyn ExifDecoder>,
    track: Arc<TrackInterpolator>,
    capture_date_tags: Vec<String>,
    retained_namespaces: Vec<String>,
}

impl MetadataResolver {
    pub fn new(exif: Arc<dyn ExifDecoder>, track: Arc<TrackInterpolator>) -> Self {
        Self {
            exif,
            track,
            capture_date_tags: DEFAULT_CAPTURE_DATE_TAGS.iter().map(|s| s.to_string()).collect(),
            retained_namespaces: DEFAULT_RETAINED_NAMESPACES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub fn with_capture_date_tags(mut self, tags: Vec<String>) -> Self {
        self.capture_date_tags = tags;
        self
    }

    pub fn with_retained_namespaces(mut self, namespaces: Vec<String>) -> Self {
        self.retained_namespaces = namespaces;
        self
    }

    /// Fill `record.metadata` unless already resolved; returns whether it changed
    pub fn resolve_record(&self, record: &mut CatalogRecord, max_diff: u64) -> Result<bool> {
        if let Some(existing) = &record.metadata {
            if existing.content_hash == record.content.hash {
                return Ok(false);
            }
        }
        record.metadata = Some(self.resolve(&record.content, max_diff)?);
        Ok(true)
    }

    /// Build the metadata record for stored content
    ///
    /// Fails only when the canonical file cannot be read.
    pub fn resolve(&self, content: &ContentRecord, max_diff: u64) -> Result<MetadataRecord> {
        let path = &content.canonical_path;
        let bytes = fs::read(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read {}: {}", path.display(), e),
            ))
        })?;

        let tags = match self.exif.decode(&bytes) {
            Ok(tags) => tags,
            Err(e) => {
                tracing::debug!(hash = %content.hash, error = %e, "No EXIF tags");
                TagMap::new()
            }
        };

        let (capture_timestamp, capture_source) = self.capture_date(content, &tags)?;

        let mut location = exif_coordinates(&tags).map(|c| (c, LocationSource::Exif));
        if location.is_none() {
            location = capture_unix_seconds(&capture_timestamp)
                .and_then(|ts| self.track.locate(ts, max_diff))
                .map(|c| (c, LocationSource::Track));
        }

        tracing::debug!(
            hash = %content.hash,
            capture = %capture_timestamp,
            located = location.is_some(),
            "Resolved metadata"
        );

        Ok(MetadataRecord {
            content_hash: content.hash.clone(),
            capture_timestamp,
            capture_source,
            latitude: location.map(|((lat, _), _)| lat),
            longitude: location.map(|((_, lon), _)| lon),
            location_source: location.map(|(_, source)| source),
            tags: self.retained(tags),
        })
    }

    fn capture_date(&self, content: &ContentRecord, tags: &TagMap) -> Result<(String, CaptureSource)> {
        for name in &self.capture_date_tags {
            let value = tags
                .get(name)
                .and_then(|values| values.first())
                .map(|v| v.to_string());
            if let Some(normalized) = value.as_deref().and_then(normalize_capture_date) {
                return Ok((normalized, CaptureSource::Tag(name.clone())));
            }
        }

        if let Some(modified) = content.source_modified {
            return Ok((modified.format(CAPTURE_FORMAT).to_string(), CaptureSource::SourceModified));
        }

        let modified = fs::metadata(&content.canonical_path)?.modified()?;
        Ok((
            DateTime::<Utc>::from(modified).format(CAPTURE_FORMAT).to_string(),
            CaptureSource::FileModified,
        ))
    }

    /// Drop raw GPS coordinate tags and namespaces not retained
    fn retained(&self, mut tags: TagMap) -> TagMap {
        for raw in [GPS_LATITUDE, GPS_LATITUDE_REF, GPS_LONGITUDE, GPS_LONGITUDE_REF] {
            tags.remove(raw);
        }
        tags.retain(|name, _| {
            let namespace = name.split_once(' ').map(|(ns, _)| ns).unwrap_or(name);
            self.retained_namespaces.iter().any(|kept| kept == namespace)
        });
        tags
    }
}

/// Signed decimal coordinates from direct GPS tags, if well-formed
fn exif_coordinates(tags: &TagMap) -> Option<(f64, f64)> {
    let latitude = signed_coordinate(tags.get(GPS_LATITUDE)?, tags.get(GPS_LATITUDE_REF)?)?;
    let longitude = signed_coordinate(tags.get(GPS_LONGITUDE)?, tags.get(GPS_LONGITUDE_REF)?)?;
    if latitude.abs() > 90.0 || longitude.abs() > 180.0 {
        return None;
    }
    Some((latitude, longitude))
}
