//! Service modules for the sorting pipeline
//!
//! External collaborators sit behind traits (`ExifDecoder`, `TrackParser`,
//! `ReverseGeocoder`) with one concrete adapter each.

pub mod content_store;
pub mod exif_decoder;
pub mod file_scanner;
pub mod gpx_parser;
pub mod metadata_resolver;
pub mod reverse_geocoder;
pub mod taxonomy_linker;
pub mod track_interpolator;

pub use content_store::{ContentStore, LinkOutcome};
pub use exif_decoder::{ExifDecoder, KamadakExifDecoder};
pub use file_scanner::{FileScanner, ScanError, ScanResult};
pub use gpx_parser::{GpxTrackParser, TrackParser};
pub use metadata_resolver::MetadataResolver;
pub use reverse_geocoder::{GeocodeError, NominatimGeocoder, ReverseGeocoder};
pub use taxonomy_linker::{sanitize_token, TaxonomyLinker};
pub use track_interpolator::{TrackInterpolator, TrackPoint};
