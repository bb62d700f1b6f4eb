//! End-to-end pipeline tests
//!
//! Fixture images are JSON tag maps decoded by `JsonTagDecoder`, so each test
//! controls capture dates, camera tags and GPS exactly.

mod helpers;

use helpers::*;
use picsort::db::{Catalog, MemoryCatalog, SqliteCatalog};
use picsort::models::LocationSource;
use picsort::run_pipeline;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const CANON: &str = "Canon EOS 5D Mark II";

/// Sources covering every branch of the pipeline:
/// - `a.jpg` EXIF GPS (Los Angeles), `dup.JPG` same bytes as `a.jpg`
/// - `b.jpg` same capture date as `a.jpg`, no location
/// - `c.jpg` located through `track.gpx`
/// - `nodate.jpg` no tags, dated by mtime
/// - `notes.txt` filtered out by extension
fn write_sources(dir: &Path) {
    let a = Tags::default()
        .text("EXIF DateTimeOriginal", "2023:01:01 12:00:00")
        .text("Image Model", CANON)
        .gps((34, 3, 9, "N"), (118, 15, 0, "W"))
        .build();
    write_image(dir, "a.jpg", a.clone());
    write_image(dir, "nested/dup.JPG", a);

    write_image(
        dir,
        "b.jpg",
        Tags::default()
            .text("Image DateTime", "2023:01:01 12:00:00")
            .text("Image Model", CANON)
            .text("Image Make", "Canon")
            .build(),
    );

    write_image(
        dir,
        "c.jpg",
        Tags::default()
            .text("EXIF DateTimeOriginal", "2023:01:02 10:05:00")
            .text("Image Model", "NIKON D750")
            .text("Image Artist", "Jane Doe")
            .build(),
    );
    write_track(
        dir,
        "track.gpx",
        &[
            ("2023-01-02T10:00:00Z", 34.0, -118.0),
            ("2023-01-02T10:10:00Z", 35.0, -119.0),
        ],
    );

    let nodate = dir.join("nodate.jpg");
    fs::write(&nodate, b"not an image").unwrap();
    set_mtime(&nodate, "2020-02-02T02:02:02Z");

    fs::write(dir.join("notes.txt"), b"ignored").unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_full_run_builds_every_taxonomy() {
    let src = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    write_sources(src.path());

    let store = dest.path().join("sorted");
    let catalog = Arc::new(SqliteCatalog::open(&store.join("catalog.db")).await.unwrap());
    let geocoder = Arc::new(ScriptedGeocoder::new(&["US", "CA", "Los Angeles"]));

    let summary = run_pipeline(
        options(src.path(), &store),
        services(catalog.clone(), geocoder.clone()),
    )
    .await
    .unwrap();

    assert_eq!(summary.files_scanned, 6);
    assert_eq!(summary.files_ingested, 5);
    assert_eq!(summary.track_files, 1);
    assert_eq!(summary.track_points, 2);
    assert_eq!(summary.distinct_contents, 4);
    assert_eq!(summary.stages.len(), 4);
    assert_eq!(geocoder.call_count(), 2);

    let store = fs::canonicalize(&store).unwrap();
    assert_eq!(list_dir(&store.join("hashed/raw")).len(), 4);
    assert_eq!(list_dir(&store.join("hashed/with_extension")).len(), 4);
    assert!(src.path().join("a.jpg").exists(), "copy mode keeps sources");

    assert_eq!(
        list_dir(&store.join("by_date")),
        vec![
            "20200202020202_000.jpg",
            "20230101120000_000.jpg",
            "20230101120000_001.jpg",
            "20230102100500_000.jpg",
        ]
    );

    assert_eq!(list_dir(&store.join("by_camera_model/Canon_EOS_5D_Mark_II")).len(), 2);
    assert_eq!(
        list_dir(&store.join("by_camera_model/NIKON_D750")),
        vec!["20230102100500_000.jpg"]
    );
    assert_eq!(
        list_dir(&store.join("by_camera_model/_unknown_")),
        vec!["20200202020202_000.jpg"]
    );
    assert_eq!(
        list_dir(&store.join("by_author/Jane_Doe")),
        vec!["20230102100500_000.jpg"]
    );

    let located = list_dir(&store.join("by_location/US/CA/Los_Angeles"));
    assert_eq!(located.len(), 2);
    assert!(located.contains(&"20230102100500_000.jpg".to_string()));
    assert_eq!(list_dir(&store.join("by_location/US/_all_")), located);
    assert_eq!(list_dir(&store.join("by_location/US/CA/_all_")), located);
    let unknown = list_dir(&store.join("by_location/_unknown_"));
    assert_eq!(unknown.len(), 2);
    assert!(unknown.contains(&"20200202020202_000.jpg".to_string()));

    // Track-interpolated position is recorded in the catalog
    let records = catalog.iter_all().await.unwrap();
    let c = records
        .iter()
        .map(|(_, record)| record)
        .find(|record| record.links.date_link_name.as_deref() == Some("20230102100500_000.jpg"))
        .unwrap();
    let metadata = c.metadata.as_ref().unwrap();
    assert_eq!(metadata.location_source, Some(LocationSource::Track));
    assert!((metadata.latitude.unwrap() - 34.5).abs() < 1e-9);
    assert!((metadata.longitude.unwrap() + 118.5).abs() < 1e-9);
    assert_eq!(
        c.links.place_hierarchy,
        Some(vec!["US".to_string(), "CA".to_string(), "Los Angeles".to_string()])
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_update_run_reproduces_links() {
    let src = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    write_sources(src.path());

    let store = dest.path().join("sorted");
    let catalog = Arc::new(MemoryCatalog::new());
    let geocoder = Arc::new(ScriptedGeocoder::new(&["US", "CA", "Los Angeles"]));

    run_pipeline(options(src.path(), &store), services(catalog.clone(), geocoder.clone()))
        .await
        .unwrap();
    let before = collect_links(&store);
    let raw_before = list_dir(&store.join("hashed/raw"));

    let mut update = options(src.path(), &store);
    update.update_mode = true;
    let summary = run_pipeline(update, services(catalog.clone(), geocoder.clone()))
        .await
        .unwrap();

    assert_eq!(summary.files_ingested, 0);
    assert_eq!(summary.distinct_contents, 4);
    assert_eq!(collect_links(&store), before);
    assert_eq!(list_dir(&store.join("hashed/raw")), raw_before);
    assert_eq!(geocoder.call_count(), 2, "place hierarchy is cached");

    // A plain re-run is just as stable
    run_pipeline(options(src.path(), &store), services(catalog, geocoder))
        .await
        .unwrap();
    assert_eq!(collect_links(&store), before);
}

#[tokio::test]
async fn test_rerun_with_new_source_only_adds_links() {
    let src = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    write_sources(src.path());

    let store = dest.path().join("sorted");
    let catalog = Arc::new(MemoryCatalog::new());
    let geocoder = Arc::new(ScriptedGeocoder::new(&["US", "CA", "Los Angeles"]));

    run_pipeline(options(src.path(), &store), services(catalog.clone(), geocoder.clone()))
        .await
        .unwrap();
    let before = collect_links(&store);

    write_image(
        src.path(),
        "later.jpg",
        Tags::default()
            .text("EXIF DateTimeOriginal", "2023:01:01 12:00:00")
            .text("Image Model", CANON)
            .build(),
    );
    let summary = run_pipeline(options(src.path(), &store), services(catalog.clone(), geocoder))
        .await
        .unwrap();
    assert_eq!(summary.distinct_contents, 5);

    let after = collect_links(&store);
    for (link, target) in &before {
        assert_eq!(after.get(link), Some(target), "{} changed", link.display());
    }
    assert!(store.join("by_date/20230101120000_002.jpg").exists());
    assert_eq!(catalog.keys().await.unwrap().len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_bytes_under_new_extension_keep_existing_links() {
    let src = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let tags = Tags::default()
        .text("EXIF DateTimeOriginal", "2023:01:01 12:00:00")
        .text("Image Model", CANON)
        .build();
    write_image(src.path(), "x/a.jpg", tags.clone());

    let store = dest.path().join("sorted");
    let catalog = Arc::new(MemoryCatalog::new());
    let geocoder = Arc::new(ScriptedGeocoder::new(&["US"]));

    run_pipeline(options(src.path(), &store), services(catalog.clone(), geocoder.clone()))
        .await
        .unwrap();
    let derived = |store: &Path| {
        let mut links = collect_links(store);
        links.retain(|link, _| !link.starts_with("hashed"));
        links
    };
    let before = derived(&store);

    write_image(src.path(), "y/a.jpeg", tags);
    for _ in 0..2 {
        let summary = run_pipeline(options(src.path(), &store), services(catalog.clone(), geocoder.clone()))
            .await
            .unwrap();
        assert_eq!(summary.distinct_contents, 1);
        assert_eq!(list_dir(&store.join("by_date")), vec!["20230101120000_000.jpg"]);
        assert_eq!(derived(&store), before);
    }

    let records = catalog.iter_all().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].1.content.extension, ".jpg");
    assert_eq!(list_dir(&store.join("hashed/with_extension")).len(), 2);
}

#[tokio::test]
async fn test_move_mode_removes_sources() {
    let src = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    write_sources(src.path());

    let store = dest.path().join("sorted");
    let mut opts = options(src.path(), &store);
    opts.move_files = true;
    run_pipeline(
        opts,
        services(Arc::new(MemoryCatalog::new()), Arc::new(ScriptedGeocoder::new(&["US"]))),
    )
    .await
    .unwrap();

    assert!(!src.path().join("a.jpg").exists());
    assert!(!src.path().join("nested").exists(), "emptied source directory is removed");
    assert!(src.path().join("track.gpx").exists(), "tracks are read, not stored");
    assert!(src.path().join("notes.txt").exists());

    // Single-level hierarchy: leaf only, no `_all_`
    let located = list_dir(&store.join("by_location/US"));
    assert_eq!(located.len(), 2);
    assert!(located.contains(&"20230102100500_000.jpg".to_string()));
}

#[tokio::test]
async fn test_corrupt_track_aborts_before_linking() {
    let src = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    write_sources(src.path());
    fs::write(src.path().join("broken.gpx"), b"<gpx><trk>").unwrap();

    let store = dest.path().join("sorted");
    let result = run_pipeline(
        options(src.path(), &store),
        services(Arc::new(MemoryCatalog::new()), Arc::new(ScriptedGeocoder::new(&[]))),
    )
    .await;

    let error = format!("{:#}", result.unwrap_err());
    assert!(error.contains("ingest"), "{}", error);
    assert!(error.contains("broken.gpx"), "{}", error);
    assert!(list_dir(&store.join("by_date")).is_empty(), "no later stage ran");
}

#[tokio::test]
async fn test_geocoder_failure_is_fatal() {
    let src = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    write_sources(src.path());

    let result = run_pipeline(
        options(src.path(), &dest.path().join("sorted")),
        services(Arc::new(MemoryCatalog::new()), Arc::new(ScriptedGeocoder::failing())),
    )
    .await;

    let error = format!("{:#}", result.unwrap_err());
    assert!(error.contains("taxonomy_links"), "{}", error);
    assert!(error.contains("scripted failure"), "{}", error);
}

#[tokio::test]
async fn test_missing_source_path_is_an_error() {
    let dest = TempDir::new().unwrap();
    let result = run_pipeline(
        options(&dest.path().join("missing"), &dest.path().join("sorted")),
        services(Arc::new(MemoryCatalog::new()), Arc::new(ScriptedGeocoder::new(&[]))),
    )
    .await;
    assert!(format!("{:#}", result.unwrap_err()).contains("Path not found"));
}
