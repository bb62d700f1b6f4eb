//! Test Helper Utilities
//!
//! Shared fakes for picsort integration tests:
//! - `JsonTagDecoder`: fixture "images" are JSON-encoded tag maps
//! - `ScriptedGeocoder`: fixed answer, counts calls, optionally fails
//! - fixture writers for images, tracks and mtimes

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use picsort::db::Catalog;
use picsort::models::{TagMap, TagValue};
use picsort::services::{ExifDecoder, GeocodeError, GpxTrackParser, ReverseGeocoder};
use picsort::{PipelineOptions, PipelineServices};
use picsort_common::{Error, Result, SortConfig};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Decodes file bytes as a JSON tag map; anything else has no EXIF
pub struct JsonTagDecoder;

impl ExifDecoder for JsonTagDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<TagMap> {
        serde_json::from_slice(bytes).map_err(|e| Error::InvalidInput(format!("no tags: {}", e)))
    }
}

/// Answers every query with the same hierarchy
pub struct ScriptedGeocoder {
    answer: Vec<String>,
    fail: bool,
    pub calls: AtomicUsize,
}

impl ScriptedGeocoder {
    pub fn new(answer: &[&str]) -> Self {
        Self {
            answer: answer.iter().map(|s| s.to_string()).collect(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: Vec::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReverseGeocoder for ScriptedGeocoder {
    async fn reverse(&self, _latitude: f64, _longitude: f64) -> std::result::Result<Vec<String>, GeocodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(GeocodeError::ApiError(500, "scripted failure".to_string()));
        }
        Ok(self.answer.clone())
    }
}

/// Builder for fixture tag maps
#[derive(Default)]
pub struct Tags(TagMap);

impl Tags {
    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.0.insert(name.to_string(), vec![TagValue::Text(value.to_string())]);
        self
    }

    /// GPS position as whole degrees/minutes/seconds
    pub fn gps(mut self, lat: (i64, i64, i64, &str), lon: (i64, i64, i64, &str)) -> Self {
        let dms = |d: i64, m: i64, s: i64| {
            vec![
                TagValue::Rational { num: d, den: 1 },
                TagValue::Rational { num: m, den: 1 },
                TagValue::Rational { num: s, den: 1 },
            ]
        };
        self.0.insert("GPS GPSLatitude".into(), dms(lat.0, lat.1, lat.2));
        self.0.insert("GPS GPSLatitudeRef".into(), vec![TagValue::Text(lat.3.into())]);
        self.0.insert("GPS GPSLongitude".into(), dms(lon.0, lon.1, lon.2));
        self.0.insert("GPS GPSLongitudeRef".into(), vec![TagValue::Text(lon.3.into())]);
        self
    }

    pub fn build(self) -> TagMap {
        self.0
    }
}

/// Write a fixture image whose bytes are its JSON tag map
pub fn write_image(dir: &Path, name: &str, tags: TagMap) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, serde_json::to_vec(&tags).unwrap()).unwrap();
    path
}

/// Write a GPX track from `(rfc3339 time, lat, lon)` fixes
pub fn write_track(dir: &Path, name: &str, fixes: &[(&str, f64, f64)]) -> PathBuf {
    let points: String = fixes
        .iter()
        .map(|(time, lat, lon)| {
            format!(r#"<trkpt lat="{}" lon="{}"><time>{}</time></trkpt>"#, lat, lon, time)
        })
        .collect();
    let gpx = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="picsort-tests" xmlns="http://www.topografix.com/GPX/1/1">
<trk><trkseg>{}</trkseg></trk>
</gpx>"#,
        points
    );
    let path = dir.join(name);
    fs::write(&path, gpx).unwrap();
    path
}

/// Set a file's modification time from an RFC 3339 string
pub fn set_mtime(path: &Path, rfc3339: &str) {
    let time: DateTime<Utc> = DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc);
    fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time.into())
        .unwrap();
}

/// Options with config defaults for one source dir and store
pub fn options(source: &Path, store: &Path) -> PipelineOptions {
    let config = SortConfig {
        store_root: Some(store.to_path_buf()),
        source_paths: vec![source.to_path_buf()],
        ..Default::default()
    };
    PipelineOptions::from_config(&config).unwrap()
}

pub fn services(catalog: Arc<dyn Catalog>, geocoder: Arc<ScriptedGeocoder>) -> PipelineServices {
    PipelineServices {
        exif: Arc::new(JsonTagDecoder),
        track_parser: Arc::new(GpxTrackParser),
        geocoder,
        catalog,
        cancel: CancellationToken::new(),
    }
}

/// Every symlink under `root` mapped to its raw target
pub fn collect_links(root: &Path) -> BTreeMap<PathBuf, PathBuf> {
    walkdir::WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_symlink())
        .map(|entry| {
            let target = fs::read_link(entry.path()).unwrap();
            (entry.path().strip_prefix(root).unwrap().to_path_buf(), target)
        })
        .collect()
}

/// Names in a directory, sorted
pub fn list_dir(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
