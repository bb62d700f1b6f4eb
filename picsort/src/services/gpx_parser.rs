//! GPX track parsing

use crate::services::track_interpolator::TrackPoint;
use picsort_common::{Error, Result};
use std::io::Cursor;

/// GPX bytes to an ordered list of fixes
pub trait TrackParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Result<Vec<TrackPoint>>;
}

/// [`TrackParser`] backed by the `gpx` crate
///
/// Reads every track segment point; points without a timestamp are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct GpxTrackParser;

impl TrackParser for GpxTrackParser {
    fn parse(&self, bytes: &[u8]) -> Result<Vec<TrackPoint>> {
        let document = gpx::read(Cursor::new(bytes))
            .map_err(|e| Error::InvalidInput(format!("GPX parse failed: {}", e)))?;

        let mut points = Vec::new();
        let mut untimed = 0usize;
        for track in &document.tracks {
            for segment in &track.segments {
                for waypoint in &segment.points {
                    let Some(time) = waypoint.time.clone() else {
                        untimed += 1;
                        continue;
                    };
                    let timestamp = time::OffsetDateTime::from(time).unix_timestamp();
                    let position = waypoint.point();
                    points.push(TrackPoint {
                        timestamp,
                        latitude: position.y(),
                        longitude: position.x(),
                    });
                }
            }
        }

        if untimed > 0 {
            tracing::debug!(untimed, "Skipped GPX points without time");
        }
        points.sort_by_key(|p| p.timestamp);
        Ok(points)
    }
}
