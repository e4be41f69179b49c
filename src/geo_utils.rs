//! Geographic utilities: great-circle distance and track statistics.

use serde::{Deserialize, Serialize};

use crate::{RoutePoint, TrackPoint};

/// Spherical Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle distance in meters between two coordinates (haversine).
///
/// # Example
/// ```
/// use route_pacer::geo_utils::haversine_distance_coords;
///
/// let d = haversine_distance_coords(51.5074, -0.1278, 48.8566, 2.3522);
/// assert!((d / 1000.0 - 343.5).abs() < 1.0); // London to Paris
/// ```
pub fn haversine_distance_coords(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Great-circle distance in meters between two track points.
pub fn haversine_distance(p1: &TrackPoint, p2: &TrackPoint) -> f64 {
    haversine_distance_coords(p1.latitude, p1.longitude, p2.latitude, p2.longitude)
}

/// Total length of a track in meters.
pub fn polyline_length(track: &[TrackPoint]) -> f64 {
    track
        .windows(2)
        .map(|pair| haversine_distance(&pair[0], &pair[1]))
        .sum()
}

/// Sum of positive elevation differences between consecutive route points.
pub fn positive_elevation_gain(points: &[RoutePoint]) -> f64 {
    points
        .windows(2)
        .map(|pair| pair[1].elevation - pair[0].elevation)
        .filter(|diff| *diff > 0.0)
        .sum()
}

/// Cumulative statistics of a raw track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackStats {
    /// Total haversine distance in meters
    pub total_distance: f64,
    /// Sum of positive elevation steps in meters
    pub total_elevation_gain: f64,
}

/// Compute total distance and elevation gain of a raw track.
pub fn compute_track_stats(track: &[TrackPoint]) -> TrackStats {
    let mut stats = TrackStats::default();

    for pair in track.windows(2) {
        stats.total_distance += haversine_distance(&pair[0], &pair[1]);
        let climb = pair[1].elevation - pair[0].elevation;
        if climb > 0.0 {
            stats.total_elevation_gain += climb;
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_zero_and_symmetric() {
        assert_eq!(haversine_distance_coords(45.0, 6.0, 45.0, 6.0), 0.0);
        let ab = haversine_distance_coords(45.0, 6.0, 46.0, 7.0);
        let ba = haversine_distance_coords(46.0, 7.0, 45.0, 6.0);
        assert!((ab - ba).abs() < 1e-6);
    }

    #[test]
    fn test_one_degree_latitude() {
        // 2πR / 360
        let d = haversine_distance_coords(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_194.93).abs() < 1.0, "got {}", d);
    }

    #[test]
    fn test_track_stats() {
        let track = vec![
            TrackPoint::new(45.0, 6.0, 100.0),
            TrackPoint::new(45.001, 6.0, 110.0),
            TrackPoint::new(45.002, 6.0, 105.0),
            TrackPoint::new(45.003, 6.0, 120.0),
        ];
        let stats = compute_track_stats(&track);
        assert!((stats.total_elevation_gain - 25.0).abs() < 1e-9);
        assert!((stats.total_distance - polyline_length(&track)).abs() < 1e-9);
        assert!((stats.total_distance - 333.6).abs() < 1.0);
    }

    #[test]
    fn test_empty_track_stats() {
        let stats = compute_track_stats(&[]);
        assert_eq!(stats, TrackStats::default());
    }
}
