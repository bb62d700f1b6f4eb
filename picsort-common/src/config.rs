//! Configuration loading and layering
//!
//! Resolution order, lowest to highest priority:
//! 1. Compiled defaults ([`SortConfig::default`])
//! 2. TOML config file (explicit `--config`, else `~/.config/picsort/config.toml`)
//! 3. Environment variables (`PICSORT_*`)
//! 4. Command-line arguments
//!
//! Every source is expressed as a [`ConfigLayer`] with all-optional fields and
//! applied with [`SortConfig::apply`]. Per-field merge rules:
//! - scalar: the last layer that sets it wins
//! - list: concatenate, dropping duplicates, keeping first-seen order
//! - nested map (`taxonomies`): recurse per key, lists merged as above

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default capture-date tag priority: original timestamp, digitized, generic
pub const DEFAULT_CAPTURE_DATE_TAGS: &[&str] = &[
    "EXIF DateTimeOriginal",
    "Image DateTimeOriginal",
    "EXIF DateTimeDigitized",
    "Image DateTime",
];

/// Tag namespaces kept in catalog metadata records
pub const DEFAULT_RETAINED_NAMESPACES: &[&str] = &["EXIF", "GPS", "Image", "Thumbnail", "MakerNote"];

/// Default source file extensions (`gpx` files feed the track buffer)
pub const DEFAULT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "cr2", "gpx"];

const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
const DEFAULT_USER_AGENT: &str = "picsort/0.1.0";

/// Reverse geocoder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub user_agent: String,
    /// Minimum spacing between requests (Nominatim policy: 1 req/s)
    pub min_interval_ms: u64,
    pub timeout_secs: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_NOMINATIM_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            min_interval_ms: 1000,
            timeout_secs: 30,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Fully resolved configuration for one sorting run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortConfig {
    /// Destination root holding `hashed/`, `by_date/`, etc.
    pub store_root: Option<PathBuf>,
    pub source_paths: Vec<PathBuf>,
    pub extensions: Vec<String>,
    pub worker_count: usize,
    pub queue_depth: usize,
    pub move_files: bool,
    /// Maximum distance (seconds) to a GPX fix for interpolation
    pub max_time_diff_secs: u64,
    /// Rebuild derived links from the catalog without re-hashing
    pub update_mode: bool,
    /// Catalog database; defaults to `<store_root>/catalog.db`
    pub catalog_path: Option<PathBuf>,
    pub capture_date_tags: Vec<String>,
    pub retained_namespaces: Vec<String>,
    /// Tag taxonomy name → tag priority list (`by_<name>/` trees)
    pub taxonomies: BTreeMap<String, Vec<String>>,
    pub geocoder: GeocoderConfig,
    pub logging: LoggingConfig,
}

impl Default for SortConfig {
    fn default() -> Self {
        let mut taxonomies = BTreeMap::new();
        taxonomies.insert(
            "camera_model".to_string(),
            strings(&["Image Model", "Image Make", "MakerNote ImageType"]),
        );
        taxonomies.insert(
            "author".to_string(),
            strings(&[
                "Image Artist",
                "MakerNote OwnerName",
                "EXIF CameraOwnerName",
                "Thumbnail Artist",
            ]),
        );

        Self {
            store_root: None,
            source_paths: Vec::new(),
            extensions: strings(DEFAULT_EXTENSIONS),
            worker_count: 4,
            queue_depth: 10,
            move_files: false,
            max_time_diff_secs: 600,
            update_mode: false,
            catalog_path: None,
            capture_date_tags: strings(DEFAULT_CAPTURE_DATE_TAGS),
            retained_namespaces: strings(DEFAULT_RETAINED_NAMESPACES),
            taxonomies,
            geocoder: GeocoderConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Geocoder overrides
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GeocoderLayer {
    pub base_url: Option<String>,
    pub user_agent: Option<String>,
    pub min_interval_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
}

/// Logging overrides
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingLayer {
    pub level: Option<String>,
}

/// One configuration source; unset fields leave the target untouched
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConfigLayer {
    pub store_root: Option<PathBuf>,
    pub source_paths: Option<Vec<PathBuf>>,
    pub extensions: Option<Vec<String>>,
    /// `extensions` replaces the list instead of extending it
    pub replace_extensions: bool,
    pub worker_count: Option<usize>,
    pub queue_depth: Option<usize>,
    pub move_files: Option<bool>,
    pub max_time_diff_secs: Option<u64>,
    pub update_mode: Option<bool>,
    pub catalog_path: Option<PathBuf>,
    pub capture_date_tags: Option<Vec<String>>,
    pub retained_namespaces: Option<Vec<String>>,
    pub taxonomies: Option<BTreeMap<String, Vec<String>>>,
    pub geocoder: GeocoderLayer,
    pub logging: LoggingLayer,
}

impl ConfigLayer {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Read and parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Read TOML failed ({}): {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Collect `PICSORT_*` environment overrides
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut layer = Self::default();

        if let Some(raw) = env_value("PICSORT_STORE_ROOT") {
            layer.store_root = Some(PathBuf::from(raw));
        }
        layer.worker_count = env_parsed("PICSORT_WORKERS");
        layer.queue_depth = env_parsed("PICSORT_QUEUE_DEPTH");
        layer.max_time_diff_secs = env_parsed("PICSORT_MAX_TIME_DIFF");
        if let Some(raw) = env_value("PICSORT_LOG_LEVEL") {
            layer.logging.level = Some(raw);
        }

        layer
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn env_parsed<T>(name: &str) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env_value(name)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("invalid {name}, ignoring: {err}");
            None
        }
    }
}

/// Append `src` to `dst`, skipping values already present
pub fn merge_list<T: PartialEq>(dst: &mut Vec<T>, src: Vec<T>) {
    for value in src {
        if !dst.contains(&value) {
            dst.push(value);
        }
    }
}

/// Get the per-user config file path (`~/.config/picsort/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("picsort").join("config.toml"))
}

impl SortConfig {
    /// Apply one layer on top of this configuration
    pub fn apply(&mut self, layer: ConfigLayer) {
        if let Some(root) = layer.store_root {
            self.store_root = Some(root);
        }
        if let Some(paths) = layer.source_paths {
            merge_list(&mut self.source_paths, paths);
        }
        if let Some(extensions) = layer.extensions {
            if layer.replace_extensions {
                self.extensions.clear();
            }
            merge_list(&mut self.extensions, extensions);
        }
        if let Some(workers) = layer.worker_count {
            self.worker_count = workers;
        }
        if let Some(depth) = layer.queue_depth {
            self.queue_depth = depth;
        }
        if let Some(move_files) = layer.move_files {
            self.move_files = move_files;
        }
        if let Some(max_diff) = layer.max_time_diff_secs {
            self.max_time_diff_secs = max_diff;
        }
        if let Some(update_mode) = layer.update_mode {
            self.update_mode = update_mode;
        }
        if let Some(catalog) = layer.catalog_path {
            self.catalog_path = Some(catalog);
        }
        if let Some(tags) = layer.capture_date_tags {
            merge_list(&mut self.capture_date_tags, tags);
        }
        if let Some(namespaces) = layer.retained_namespaces {
            merge_list(&mut self.retained_namespaces, namespaces);
        }
        if let Some(taxonomies) = layer.taxonomies {
            for (name, tags) in taxonomies {
                merge_list(self.taxonomies.entry(name).or_default(), tags);
            }
        }

        let geocoder = layer.geocoder;
        if let Some(url) = geocoder.base_url {
            self.geocoder.base_url = url;
        }
        if let Some(agent) = geocoder.user_agent {
            self.geocoder.user_agent = agent;
        }
        if let Some(interval) = geocoder.min_interval_ms {
            self.geocoder.min_interval_ms = interval;
        }
        if let Some(timeout) = geocoder.timeout_secs {
            self.geocoder.timeout_secs = timeout;
        }

        if let Some(level) = layer.logging.level {
            self.logging.level = level;
        }
    }

    /// Resolve the full configuration: defaults → file → environment → CLI
    ///
    /// An explicitly named config file must exist; the per-user default file
    /// is optional.
    pub fn load(config_file: Option<&Path>, cli: ConfigLayer) -> Result<Self> {
        let mut config = Self::default();

        match config_file {
            Some(path) => {
                config.apply(ConfigLayer::from_file(path)?);
                info!("Loaded config file: {}", path.display());
            }
            None => match default_config_path() {
                Some(path) if path.exists() => {
                    config.apply(ConfigLayer::from_file(&path)?);
                    info!("Loaded config file: {}", path.display());
                }
                _ => debug!("No config file found, using defaults"),
            },
        }

        config.apply(ConfigLayer::from_env());
        config.apply(cli);
        config.validate()?;
        Ok(config)
    }

    /// Check the settings a run cannot start without
    pub fn validate(&self) -> Result<()> {
        if self.store_root.is_none() {
            return Err(Error::Config("Destination (store root) not configured".to_string()));
        }
        if self.worker_count == 0 {
            return Err(Error::Config("worker_count must be at least 1".to_string()));
        }
        if self.queue_depth == 0 {
            return Err(Error::Config("queue_depth must be at least 1".to_string()));
        }
        if self.extensions.is_empty() {
            return Err(Error::Config("No source extensions configured".to_string()));
        }
        Ok(())
    }

    /// Catalog database location
    pub fn resolved_catalog_path(&self) -> Option<PathBuf> {
        self.catalog_path
            .clone()
            .or_else(|| self.store_root.as_ref().map(|root| root.join("catalog.db")))
    }
}
