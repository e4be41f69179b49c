//! Slope-homogeneous route segmentation.
//!
//! ## Algorithm
//! 1. Walk the route once, keeping a running mean of the smoothed slope since
//!    the current segment started
//! 2. Close the segment at point `i` when it is at least `min_length` long and
//!    the slope at `i` departs from the running mean by more than
//!    `slope_threshold`, or when `i` is the last point
//! 3. The closing point is shared: it starts the next segment
//!
//! The average grade kept on each segment is that running mean, not a
//! recompute from the endpoints. The physics model consumes it as-is.

use log::info;
use serde::{Deserialize, Serialize};

use crate::{Route, RoutePoint};

/// Configuration for slope segmentation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Slope change (percentage points) from the running mean that cuts a segment
    pub slope_threshold: f64,
    /// Minimum segment length before a cut is allowed (meters)
    pub min_length: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            slope_threshold: 3.0,
            min_length: 500.0,
        }
    }
}

/// A contiguous stretch of the route with homogeneous slope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Index of the first route point (shared with the previous segment)
    pub start_index: usize,
    /// Index of the last route point (shared with the next segment)
    pub end_index: usize,
    /// Cumulative distance at the first point
    pub start_distance: f64,
    /// Cumulative distance at the last point
    pub end_distance: f64,
    /// Length in meters
    pub distance: f64,
    /// Sum of positive elevation steps inside the segment
    pub elevation_gain: f64,
    /// Running mean of smoothed slope, as a fraction (0.05 = 5 %)
    pub average_grade: f64,
}

impl Segment {
    /// The route points this segment covers, boundaries included.
    pub fn points<'a>(&self, route: &'a Route) -> &'a [RoutePoint] {
        &route.points()[self.start_index..=self.end_index]
    }

    /// Average grade in percent.
    pub fn average_grade_percent(&self) -> f64 {
        self.average_grade * 100.0
    }
}

/// Running state of the segment being built.
struct OpenSegment {
    start_index: usize,
    slope_sum: f64,
    point_count: usize,
}

impl OpenSegment {
    fn starting_at(index: usize, slope: f64) -> Self {
        Self {
            start_index: index,
            slope_sum: slope,
            point_count: 1,
        }
    }

    fn mean_slope(&self) -> f64 {
        self.slope_sum / self.point_count as f64
    }

    fn absorb(&mut self, slope: f64) {
        self.slope_sum += slope;
        self.point_count += 1;
    }

    fn close(&self, points: &[RoutePoint], end_index: usize) -> Segment {
        let slice = &points[self.start_index..=end_index];
        let start = &points[self.start_index];
        let end = &points[end_index];

        Segment {
            start_index: self.start_index,
            end_index,
            start_distance: start.distance,
            end_distance: end.distance,
            distance: end.distance - start.distance,
            elevation_gain: crate::geo_utils::positive_elevation_gain(slice),
            average_grade: self.mean_slope() / 100.0,
        }
    }
}

/// Split a route into contiguous, slope-homogeneous segments.
///
/// Expects `smoothed_slope` to be filled (see [`crate::smooth_slopes`]).
/// Routes with fewer than 2 points produce no segments. The trailing
/// segment is always emitted, whatever its length.
///
/// # Example
/// ```
/// use route_pacer::{segment_by_slope, smooth_slopes, Route, RoutePoint, SegmentationConfig};
///
/// let points = (0..=100).map(|i| RoutePoint::new(i as f64 * 20.0, 0.0)).collect();
/// let mut route = Route::new(points).unwrap();
/// smooth_slopes(&mut route, 3);
///
/// let segments = segment_by_slope(&route, &SegmentationConfig::default());
/// assert_eq!(segments.len(), 1); // flat: nothing to cut
/// assert_eq!(segments[0].end_index, 100);
/// ```
pub fn segment_by_slope(route: &Route, config: &SegmentationConfig) -> Vec<Segment> {
    let points = route.points();
    if points.len() < 2 {
        return Vec::new();
    }

    let last = points.len() - 1;
    let mut segments = Vec::new();
    let mut open = OpenSegment::starting_at(0, points[0].smoothed_slope);

    for (i, point) in points.iter().enumerate().skip(1) {
        let slope = point.smoothed_slope;
        let distance_since_start = point.distance - points[open.start_index].distance;
        let slope_diff = (slope - open.mean_slope()).abs();
        let long_enough = distance_since_start >= config.min_length;

        if (long_enough && slope_diff > config.slope_threshold) || i == last {
            segments.push(open.close(points, i));
            open = OpenSegment::starting_at(i, slope);
        } else {
            open.absorb(slope);
        }
    }

    info!(
        "[Segmentation] {} points -> {} segments (threshold {}%, min {}m)",
        points.len(),
        segments.len(),
        config.slope_threshold,
        config.min_length
    );

    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smooth_slopes;

    fn profile_route(step: f64, grades: &[(f64, f64)]) -> Route {
        // grades: (length_m, grade_percent) stretches
        let mut points = vec![RoutePoint::new(0.0, 0.0)];
        let mut distance = 0.0;
        let mut elevation = 0.0;
        for &(length, grade) in grades {
            let steps = (length / step).round() as usize;
            for _ in 0..steps {
                distance += step;
                elevation += step * grade / 100.0;
                points.push(RoutePoint::new(distance, elevation));
            }
        }
        Route::new(points).unwrap()
    }

    #[test]
    fn test_short_route_has_no_segments() {
        let route = Route::new(vec![RoutePoint::new(0.0, 0.0)]).unwrap();
        assert!(segment_by_slope(&route, &SegmentationConfig::default()).is_empty());
        assert!(segment_by_slope(&Route::default(), &SegmentationConfig::default()).is_empty());
    }

    #[test]
    fn test_two_points_make_one_segment() {
        let mut route = Route::new(vec![RoutePoint::new(0.0, 0.0), RoutePoint::new(50.0, 2.0)])
            .unwrap();
        smooth_slopes(&mut route, 1);
        let segments = segment_by_slope(&route, &SegmentationConfig::default());
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start_index, 0);
        assert_eq!(segments[0].end_index, 1);
        assert!((segments[0].distance - 50.0).abs() < 1e-9);
        assert!((segments[0].elevation_gain - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_segments_partition_route() {
        let mut route = profile_route(
            25.0,
            &[(1000.0, 0.0), (1500.0, 7.0), (800.0, -4.0), (1200.0, 2.0)],
        );
        smooth_slopes(&mut route, 3);
        let segments = segment_by_slope(&route, &SegmentationConfig::default());

        assert!(segments.len() > 1);
        assert_eq!(segments[0].start_index, 0);
        assert_eq!(segments.last().unwrap().end_index, route.len() - 1);
        for pair in segments.windows(2) {
            assert_eq!(pair[0].end_index, pair[1].start_index);
        }

        let total: f64 = segments.iter().map(|s| s.distance).sum();
        assert!((total - route.total_distance()).abs() < 1e-6);

        let covered: usize = segments.iter().map(|s| s.points(&route).len()).sum();
        assert_eq!(covered, route.len() + segments.len() - 1);
    }

    #[test]
    fn test_average_grade_is_running_mean() {
        let mut route = profile_route(50.0, &[(2000.0, 6.0)]);
        smooth_slopes(&mut route, 2);
        let segments = segment_by_slope(&route, &SegmentationConfig::default());
        assert_eq!(segments.len(), 1);

        // Every point but the last contributes to the mean
        let points = route.points();
        let expected: f64 = points[..points.len() - 1]
            .iter()
            .map(|p| p.smoothed_slope)
            .sum::<f64>()
            / (points.len() - 1) as f64;
        assert!((segments[0].average_grade_percent() - expected).abs() < 1e-9);
        assert!((segments[0].average_grade - 0.06).abs() < 1e-9);
    }

    #[test]
    fn test_cut_at_grade_change() {
        let mut route = profile_route(20.0, &[(1000.0, 0.0), (1000.0, 8.0)]);
        smooth_slopes(&mut route, 1);
        let segments = segment_by_slope(&route, &SegmentationConfig::default());
        assert_eq!(segments.len(), 2);
        // Cut lands right where the smoothed slope first exceeds 3 %
        assert!((segments[0].end_distance - 1000.0).abs() < 1e-9);
        assert!(segments[0].average_grade < 0.001);
        assert!(segments[1].average_grade > 0.07);
    }

    #[test]
    fn test_trailing_segment_always_emitted() {
        let mut route = profile_route(20.0, &[(1000.0, 0.0), (60.0, 10.0)]);
        smooth_slopes(&mut route, 1);
        let segments = segment_by_slope(&route, &SegmentationConfig::default());
        let last = segments.last().unwrap();
        assert_eq!(last.end_index, route.len() - 1);
        assert!(last.distance < 500.0);
    }
}
