//! picsort - photo and GPS track organizer
//!
//! Copies (or moves) source files into a content-addressed store and builds
//! `by_date/`, `by_<tag>/` and `by_location/` symlink trees. Re-running over a
//! growing source set only processes new content; `--update` rebuilds every
//! link from the catalog without touching sources.

use anyhow::{bail, Context, Result};
use clap::Parser;
use picsort::db::SqliteCatalog;
use picsort::services::{GpxTrackParser, KamadakExifDecoder, NominatimGeocoder};
use picsort::{run_pipeline, PipelineOptions, PipelineServices};
use picsort_common::{logging, ConfigLayer, SortConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "picsort", version, about = "Sort photos and GPS tracks into a content-addressed store")]
struct Args {
    /// Source files or directories
    #[arg(short = 'p', long = "paths", num_args = 1..)]
    paths: Vec<PathBuf>,

    /// File extensions to pick up, replacing the defaults (jpg jpeg cr2 gpx)
    #[arg(short = 'e', long = "extensions", num_args = 1..)]
    extensions: Vec<String>,

    /// Delete sources after they are stored
    #[arg(short = 'm', long = "move")]
    move_files: bool,

    /// Worker tasks per stage
    #[arg(short = 't', long = "threads")]
    threads: Option<usize>,

    /// Bounded queue depth per stage
    #[arg(short = 'q', long = "queue-size")]
    queue_size: Option<usize>,

    /// Max seconds between a photo and a GPX fix for interpolation
    #[arg(long = "max-diff")]
    max_diff: Option<u64>,

    /// Rebuild all links from the catalog without ingesting images
    #[arg(short = 'u', long = "update")]
    update: bool,

    /// Drop every catalog record before running
    #[arg(long = "reset-catalog")]
    reset_catalog: bool,

    /// Config file (default: ~/.config/picsort/config.toml if present)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    #[arg(long = "log-level")]
    log_level: Option<String>,

    /// Destination (store root)
    destination: Option<PathBuf>,
}

impl Args {
    fn to_layer(&self) -> ConfigLayer {
        let mut layer = ConfigLayer {
            store_root: self.destination.clone(),
            worker_count: self.threads,
            queue_depth: self.queue_size,
            max_time_diff_secs: self.max_diff,
            move_files: self.move_files.then_some(true),
            update_mode: self.update.then_some(true),
            ..Default::default()
        };
        if !self.paths.is_empty() {
            layer.source_paths = Some(self.paths.clone());
        }
        if !self.extensions.is_empty() {
            layer.extensions = Some(self.extensions.clone());
            layer.replace_extensions = true;
        }
        layer.logging.level = self.log_level.clone();
        layer
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = SortConfig::load(args.config.as_deref(), args.to_layer())
        .context("Invalid configuration")?;
    logging::init(&config.logging.level)?;

    info!("Starting picsort {}", env!("CARGO_PKG_VERSION"));
    if config.source_paths.is_empty() {
        bail!("No source paths given (use --paths)");
    }

    let catalog_path = config
        .resolved_catalog_path()
        .context("Catalog location not configured")?;
    info!("Catalog: {}", catalog_path.display());
    let catalog = SqliteCatalog::open(&catalog_path)
        .await
        .with_context(|| format!("Failed to open catalog {}", catalog_path.display()))?;

    let geocoder = NominatimGeocoder::new(&config.geocoder)?;

    let mut options = PipelineOptions::from_config(&config)?;
    options.reset_catalog = args.reset_catalog;

    let cancel = CancellationToken::new();
    let services = PipelineServices {
        exif: Arc::new(KamadakExifDecoder),
        track_parser: Arc::new(GpxTrackParser),
        geocoder: Arc::new(geocoder),
        catalog: Arc::new(catalog),
        cancel: cancel.clone(),
    };

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after in-flight items");
            cancel.cancel();
        }
    });

    let summary = run_pipeline(options, services).await?;
    info!(
        scanned = summary.files_scanned,
        ingested = summary.files_ingested,
        track_files = summary.track_files,
        contents = summary.distinct_contents,
        "Done"
    );
    for stage in &summary.stages {
        info!(stage = stage.stage, completed = stage.completed, elapsed_ms = stage.elapsed.as_millis() as u64, "Stage summary");
    }

    Ok(())
}
