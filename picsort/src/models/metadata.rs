//! Resolved metadata and the tag model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One decoded tag value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TagValue {
    Text(String),
    Integer(i64),
    Rational { num: i64, den: i64 },
    Float(f64),
}

impl TagValue {
    /// Numeric value; `None` for text and zero-denominator rationals
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TagValue::Text(_) => None,
            TagValue::Integer(v) => Some(*v as f64),
            TagValue::Rational { den: 0, .. } => None,
            TagValue::Rational { num, den } => Some(*num as f64 / *den as f64),
            TagValue::Float(v) => Some(*v),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            TagValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Text(s) => write!(f, "{}", s),
            TagValue::Integer(v) => write!(f, "{}", v),
            TagValue::Rational { num, den } => write!(f, "{}/{}", num, den),
            TagValue::Float(v) => write!(f, "{}", v),
        }
    }
}

/// Tag name (`"<namespace> <TagName>"`) to values
pub type TagMap = BTreeMap<String, Vec<TagValue>>;

/// Render a tag's values space-joined
pub fn render_values(values: &[TagValue]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Where the capture timestamp came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSource {
    /// A date tag, by name
    Tag(String),
    /// Source file mtime recorded at ingestion
    SourceModified,
    /// Canonical file mtime
    FileModified,
}

/// Where coordinates came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    Exif,
    Track,
}

/// Canonical per-content metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub content_hash: String,
    /// Sortable form, e.g. `20230101120000`
    pub capture_timestamp: String,
    pub capture_source: CaptureSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_source: Option<LocationSource>,
    #[serde(default)]
    pub tags: TagMap,
}

impl MetadataRecord {
    /// `(latitude, longitude)` when both are known
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    /// First tag from `priority` present in the tag map
    pub fn first_tag<'a>(&'a self, priority: &'a [String]) -> Option<(&'a str, &'a [TagValue])> {
        priority.iter().find_map(|name| {
            self.tags
                .get(name)
                .filter(|values| !values.is_empty())
                .map(|values| (name.as_str(), values.as_slice()))
        })
    }
}
