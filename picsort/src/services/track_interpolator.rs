//! GPS track buffer with time-bounded linear interpolation
//!
//! Built once per run, filled by the ingest stage from GPX files and read by
//! the metadata resolver for images without EXIF GPS.

use crate::services::gpx_parser::TrackParser;
use picsort_common::Result;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

/// One GPS fix; `timestamp` is Unix seconds (UTC)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
}

/// Sorted, timestamp-deduplicated track buffer
#[derive(Debug, Default)]
pub struct TrackInterpolator {
    points: RwLock<BTreeMap<i64, (f64, f64)>>,
}

impl TrackInterpolator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a GPX document and merge its points; returns the count of new points
    pub fn load(&self, bytes: &[u8], parser: &dyn TrackParser) -> Result<usize> {
        let points = parser.parse(bytes)?;
        Ok(self.insert(points))
    }

    /// Merge points; the first point seen for a timestamp is kept
    pub fn insert(&self, points: impl IntoIterator<Item = TrackPoint>) -> usize {
        let mut buffer = self.points.write().unwrap_or_else(|e| e.into_inner());
        let mut added = 0;
        for point in points {
            if let std::collections::btree_map::Entry::Vacant(slot) = buffer.entry(point.timestamp) {
                slot.insert((point.latitude, point.longitude));
                added += 1;
            }
        }
        added
    }

    pub fn len(&self) -> usize {
        self.points.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Interpolated `(latitude, longitude)` at `timestamp`
    ///
    /// `None` with fewer than two points, outside the track's time range, or
    /// when either bracketing fix is more than `max_diff` seconds away.
    pub fn locate(&self, timestamp: i64, max_diff: u64) -> Option<(f64, f64)> {
        let buffer = self.points.read().unwrap_or_else(|e| e.into_inner());
        if buffer.len() < 2 {
            return None;
        }

        if let Some(&exact) = buffer.get(&timestamp) {
            return Some(exact);
        }

        let (&t1, &(lat1, lon1)) = buffer.range(..timestamp).next_back()?;
        let (&t2, &(lat2, lon2)) = buffer
            .range((Bound::Excluded(timestamp), Bound::Unbounded))
            .next()?;

        let max_diff = i64::try_from(max_diff).unwrap_or(i64::MAX);
        if timestamp - t1 > max_diff || t2 - timestamp > max_diff {
            return None;
        }

        let fraction = (timestamp - t1) as f64 / (t2 - t1) as f64;
        Some((
            lat1 + (lat2 - lat1) * fraction,
            lon1 + (lon2 - lon1) * fraction,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(timestamp: i64, lat: f64, lon: f64) -> TrackPoint {
        TrackPoint {
            timestamp,
            latitude: lat,
            longitude: lon,
        }
    }

    #[test]
    fn test_midpoint_interpolation() {
        let track = TrackInterpolator::new();
        track.insert([point(0, 0.0, 0.0), point(100, 10.0, 10.0)]);

        assert_eq!(track.locate(50, 50), Some((5.0, 5.0)));
        assert_eq!(track.locate(200, 50), None);
        assert_eq!(track.locate(-1, 50), None);
    }

    #[test]
    fn test_gap_larger_than_max_diff() {
        let track = TrackInterpolator::new();
        track.insert([point(0, 0.0, 0.0), point(10, 1.0, 1.0)]);

        assert_eq!(track.locate(6, 3), None);
        assert_eq!(track.locate(2, 10), Some((0.2, 0.2)));
    }

    #[test]
    fn test_exact_hit_and_single_point() {
        let track = TrackInterpolator::new();
        track.insert([point(5, 1.0, 2.0)]);
        assert_eq!(track.locate(5, 0), None);

        track.insert([point(9, 3.0, 4.0)]);
        assert_eq!(track.locate(5, 0), Some((1.0, 2.0)));
        assert_eq!(track.locate(9, 0), Some((3.0, 4.0)));
    }

    #[test]
    fn test_first_point_wins_on_duplicate_timestamp() {
        let track = TrackInterpolator::new();
        assert_eq!(track.insert([point(0, 1.0, 1.0), point(10, 2.0, 2.0)]), 2);
        assert_eq!(track.insert([point(0, 9.0, 9.0), point(20, 3.0, 3.0)]), 1);

        assert_eq!(track.len(), 3);
        assert_eq!(track.locate(0, 0), Some((1.0, 1.0)));
    }
}
