//! Sorting pipeline
//!
//! Stage order is fixed and each stage is a barrier:
//! 1. ingest: hash and store sources, load GPX tracks
//! 2. metadata: resolve capture date, location and tags
//! 3. date links: `by_date/`
//! 4. taxonomy links: `by_<taxonomy>/` then `by_location/`
//!
//! Stages 2-4 run over the work set: hashes ingested this run, or every
//! catalog key in update mode.

pub mod stage_runner;

pub use stage_runner::{StageError, StageReport, StageRunner};

use crate::db::Catalog;
use crate::models::{CatalogRecord, IngestMode};
use crate::services::content_store::ContentStore;
use crate::services::exif_decoder::ExifDecoder;
use crate::services::file_scanner::FileScanner;
use crate::services::gpx_parser::TrackParser;
use crate::services::metadata_resolver::MetadataResolver;
use crate::services::reverse_geocoder::ReverseGeocoder;
use crate::services::taxonomy_linker::TaxonomyLinker;
use crate::services::track_interpolator::TrackInterpolator;
use anyhow::{anyhow, Context, Result};
use picsort_common::SortConfig;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

const TRACK_EXTENSION: &str = "gpx";

/// Run parameters
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub source_paths: Vec<PathBuf>,
    pub extensions: Vec<String>,
    pub store_root: PathBuf,
    pub worker_count: usize,
    pub queue_depth: usize,
    pub move_files: bool,
    /// Seconds
    pub max_time_diff: u64,
    pub update_mode: bool,
    /// Drop every catalog record before the run
    pub reset_catalog: bool,
    pub taxonomies: BTreeMap<String, Vec<String>>,
    pub capture_date_tags: Vec<String>,
    pub retained_namespaces: Vec<String>,
}

impl PipelineOptions {
    pub fn from_config(config: &SortConfig) -> Result<Self> {
        let store_root = config
            .store_root
            .clone()
            .ok_or_else(|| anyhow!("Destination (store root) not configured"))?;

        Ok(Self {
            source_paths: config.source_paths.clone(),
            extensions: config.extensions.clone(),
            store_root,
            worker_count: config.worker_count,
            queue_depth: config.queue_depth,
            move_files: config.move_files,
            max_time_diff: config.max_time_diff_secs,
            update_mode: config.update_mode,
            reset_catalog: false,
            taxonomies: config.taxonomies.clone(),
            capture_date_tags: config.capture_date_tags.clone(),
            retained_namespaces: config.retained_namespaces.clone(),
        })
    }

    fn ingest_mode(&self) -> IngestMode {
        if self.move_files {
            IngestMode::Move
        } else {
            IngestMode::Copy
        }
    }
}

/// Injected collaborators
#[derive(Clone)]
pub struct PipelineServices {
    pub exif: Arc<dyn ExifDecoder>,
    pub track_parser: Arc<dyn TrackParser>,
    pub geocoder: Arc<dyn ReverseGeocoder>,
    pub catalog: Arc<dyn Catalog>,
    /// Run-wide cancellation; also cancelled by the first failing item
    pub cancel: CancellationToken,
}

/// What a completed run did
#[derive(Debug, Clone, Default)]
pub struct PipelineSummary {
    pub files_scanned: usize,
    pub files_ingested: usize,
    pub track_files: usize,
    pub track_points: usize,
    /// Size of the work set
    pub distinct_contents: usize,
    pub stages: Vec<StageReport>,
}

/// Source file work item
struct SourceFile(PathBuf);

impl fmt::Display for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

async fn load_record(catalog: &dyn Catalog, hash: &str) -> Result<CatalogRecord> {
    catalog
        .get(hash)
        .await?
        .ok_or_else(|| anyhow!("No catalog record for {}", hash))
}

/// Run every stage over the configured sources
pub async fn run_pipeline(options: PipelineOptions, services: PipelineServices) -> Result<PipelineSummary> {
    let options = Arc::new(options);
    let catalog = Arc::clone(&services.catalog);

    let store = Arc::new(
        ContentStore::open(&options.store_root)
            .with_context(|| format!("Failed to open store {}", options.store_root.display()))?,
    );
    tracing::info!(store = %store.root().display(), update = options.update_mode, "Starting sort");

    if options.reset_catalog {
        catalog.reset().await.context("Failed to reset catalog")?;
    }

    let scan = {
        let paths = options.source_paths.clone();
        let extensions = options.extensions.clone();
        let exclude = store.root().to_path_buf();
        tokio::task::spawn_blocking(move || FileScanner::new().scan(&paths, &extensions, Some(&exclude)))
            .await
            .context("Scanner task failed")??
    };
    tracing::info!(files = scan.files.len(), by_extension = ?scan.by_extension, "Scanned sources");

    let mut summary = PipelineSummary {
        files_scanned: scan.files.len(),
        ..Default::default()
    };

    let runner = StageRunner::new(options.worker_count, options.queue_depth, services.cancel.clone());
    let track = Arc::new(TrackInterpolator::new());

    // Ingest
    let ingested = Arc::new(AtomicUsize::new(0));
    let track_files = Arc::new(AtomicUsize::new(0));
    let track_points = Arc::new(AtomicUsize::new(0));
    let seen_hashes: Arc<Mutex<BTreeSet<String>>> = Arc::new(Mutex::new(BTreeSet::new()));
    {
        let items: Vec<SourceFile> = scan.files.into_iter().map(SourceFile).collect();
        let store = Arc::clone(&store);
        let catalog = Arc::clone(&catalog);
        let track = Arc::clone(&track);
        let parser = Arc::clone(&services.track_parser);
        let options = Arc::clone(&options);
        let ingested = Arc::clone(&ingested);
        let track_files = Arc::clone(&track_files);
        let track_points = Arc::clone(&track_points);
        let seen_hashes = Arc::clone(&seen_hashes);

        let report = runner
            .run("ingest", items, move |SourceFile(path)| {
                let store = Arc::clone(&store);
                let catalog = Arc::clone(&catalog);
                let track = Arc::clone(&track);
                let parser = Arc::clone(&parser);
                let options = Arc::clone(&options);
                let ingested = Arc::clone(&ingested);
                let track_files = Arc::clone(&track_files);
                let track_points = Arc::clone(&track_points);
                let seen_hashes = Arc::clone(&seen_hashes);
                async move {
                    let is_track = path
                        .extension()
                        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(TRACK_EXTENSION))
                        .unwrap_or(false);

                    if is_track {
                        let loaded = tokio::task::spawn_blocking(move || -> Result<usize> {
                            let bytes = std::fs::read(&path)
                                .with_context(|| format!("Failed to read {}", path.display()))?;
                            track
                                .load(&bytes, parser.as_ref())
                                .with_context(|| format!("Failed to parse track {}", path.display()))
                        })
                        .await??;
                        track_files.fetch_add(1, Ordering::SeqCst);
                        track_points.fetch_add(loaded, Ordering::SeqCst);
                        return Ok(());
                    }

                    if options.update_mode {
                        return Ok(());
                    }

                    let mode = options.ingest_mode();
                    let content = tokio::task::spawn_blocking(move || store.ingest(&path, mode)).await??;
                    let hash = content.hash.clone();

                    let record = match catalog.get(&hash).await? {
                        Some(mut existing) => {
                            existing.refresh_content(content);
                            existing
                        }
                        None => CatalogRecord::new(content),
                    };
                    catalog.set(&hash, &record).await?;

                    ingested.fetch_add(1, Ordering::SeqCst);
                    seen_hashes
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .insert(hash);
                    Ok(())
                }
            })
            .await?;
        summary.stages.push(report);
    }
    summary.files_ingested = ingested.load(Ordering::SeqCst);
    summary.track_files = track_files.load(Ordering::SeqCst);
    summary.track_points = track_points.load(Ordering::SeqCst);

    let work_set: Vec<String> = if options.update_mode {
        catalog.keys().await.context("Failed to list catalog")?
    } else {
        let hashes = seen_hashes.lock().unwrap_or_else(|e| e.into_inner());
        hashes.iter().cloned().collect()
    };
    summary.distinct_contents = work_set.len();
    tracing::info!(
        contents = work_set.len(),
        track_points = summary.track_points,
        "Work set ready"
    );

    // Metadata
    let resolver = Arc::new(
        MetadataResolver::new(Arc::clone(&services.exif), Arc::clone(&track))
            .with_capture_date_tags(options.capture_date_tags.clone())
            .with_retained_namespaces(options.retained_namespaces.clone()),
    );
    {
        let catalog = Arc::clone(&catalog);
        let max_diff = options.max_time_diff;
        let report = runner
            .run("metadata", work_set.clone(), move |hash: String| {
                let catalog = Arc::clone(&catalog);
                let resolver = Arc::clone(&resolver);
                async move {
                    let mut record = load_record(catalog.as_ref(), &hash).await?;
                    let (record, changed) = tokio::task::spawn_blocking(move || {
                        let changed = resolver.resolve_record(&mut record, max_diff)?;
                        Ok::<_, picsort_common::Error>((record, changed))
                    })
                    .await??;
                    if changed {
                        catalog.set(&hash, &record).await?;
                    }
                    Ok(())
                }
            })
            .await?;
        summary.stages.push(report);
    }

    let linker = Arc::new(TaxonomyLinker::new(Arc::clone(&store), Arc::clone(&services.geocoder)));

    // Date links
    {
        let catalog = Arc::clone(&catalog);
        let linker = Arc::clone(&linker);
        let report = runner
            .run("date_links", work_set.clone(), move |hash: String| {
                let catalog = Arc::clone(&catalog);
                let linker = Arc::clone(&linker);
                async move {
                    let mut record = load_record(catalog.as_ref(), &hash).await?;
                    let previous = record.links.date_link_name.clone();
                    let record = tokio::task::spawn_blocking(move || {
                        linker.date_link(&mut record)?;
                        Ok::<_, picsort_common::Error>(record)
                    })
                    .await??;
                    if record.links.date_link_name != previous {
                        catalog.set(&hash, &record).await?;
                    }
                    Ok(())
                }
            })
            .await?;
        summary.stages.push(report);
    }

    // Tag and location links
    {
        let catalog = Arc::clone(&catalog);
        let taxonomies = Arc::new(options.taxonomies.clone());
        let report = runner
            .run("taxonomy_links", work_set, move |hash: String| {
                let catalog = Arc::clone(&catalog);
                let linker = Arc::clone(&linker);
                let taxonomies = Arc::clone(&taxonomies);
                async move {
                    let record = load_record(catalog.as_ref(), &hash).await?;
                    let tag_linker = Arc::clone(&linker);
                    let mut record = tokio::task::spawn_blocking(move || {
                        for (taxonomy, tags) in taxonomies.iter() {
                            tag_linker.tag_link(&record, taxonomy, tags)?;
                        }
                        Ok::<_, picsort_common::Error>(record)
                    })
                    .await??;

                    let cached = record.links.place_hierarchy.clone();
                    linker.geo_link(&mut record).await?;
                    if record.links.place_hierarchy != cached {
                        catalog.set(&hash, &record).await?;
                    }
                    Ok(())
                }
            })
            .await?;
        summary.stages.push(report);
    }

    tracing::info!(
        scanned = summary.files_scanned,
        ingested = summary.files_ingested,
        contents = summary.distinct_contents,
        "Sort complete"
    );
    Ok(summary)
}
