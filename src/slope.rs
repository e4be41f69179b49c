//! Slope series along a route.
//!
//! Every point carries a raw slope towards the next point and a centered
//! moving average of it. The smoothed signal drives both segmentation and
//! climb detection.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::Route;

/// Steps shorter than this carry no meaningful slope.
pub const MIN_SLOPE_STEP_METERS: f64 = 0.1;

/// Number of 1 %-wide bins in a [`GradeHistogram`].
pub const GRADE_BINS: usize = 20;

/// Slope in percent over a step, 0 for steps too short to measure.
pub fn step_slope_percent(distance_delta: f64, elevation_delta: f64) -> f64 {
    if distance_delta > MIN_SLOPE_STEP_METERS {
        elevation_delta / distance_delta * 100.0
    } else {
        0.0
    }
}

/// Fill `raw_slope` and `smoothed_slope` for every point of the route.
///
/// The raw slope of point `i` is the slope from `i` to `i + 1`; the last
/// point repeats its predecessor. The smoothed slope averages raw slopes over
/// indices `[i - w, i + w]` clamped to the route. A half-window of 0 is
/// treated as 1. Re-running with the same window yields the same values.
pub fn smooth_slopes(route: &mut Route, half_window: usize) {
    let points = route.points_mut();
    let n = points.len();
    if n < 2 {
        if let Some(only) = points.first_mut() {
            only.raw_slope = 0.0;
            only.smoothed_slope = 0.0;
        }
        return;
    }

    for i in 0..n - 1 {
        let slope = step_slope_percent(
            points[i + 1].distance - points[i].distance,
            points[i + 1].elevation - points[i].elevation,
        );
        points[i].raw_slope = slope;
    }
    points[n - 1].raw_slope = points[n - 2].raw_slope;

    let w = half_window.max(1);

    // Prefix sums keep the pass linear in the route length.
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    for p in points.iter() {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + p.raw_slope);
    }

    for i in 0..n {
        let start = i.saturating_sub(w);
        let end = (i + w).min(n - 1);
        let count = (end - start + 1) as f64;
        points[i].smoothed_slope = (prefix[end + 1] - prefix[start]) / count;
    }

    debug!("[Slope] Smoothed {} points with half-window {}", n, w);
}

/// Distance spent climbing at each whole-percent grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeHistogram {
    /// Meters climbed at grade in `[i, i + 1)` percent; the last bin also
    /// collects everything steeper
    pub distance_by_grade: [f64; GRADE_BINS],
    /// Elevation estimate per bin: `round(distance × (i + 1) / 100)`
    pub elevation_by_grade: [f64; GRADE_BINS],
    /// Total meters on positive grade
    pub climbing_distance: f64,
}

impl GradeHistogram {
    /// Climbing distance at 2 % or steeper.
    pub fn steep_climbing_distance(&self) -> f64 {
        self.climbing_distance - self.distance_by_grade[0] - self.distance_by_grade[1]
    }
}

/// Bucket every uphill step of the route by its point-to-point grade.
pub fn compute_grade_histogram(route: &Route) -> GradeHistogram {
    let mut distance_by_grade = [0.0; GRADE_BINS];
    let mut climbing_distance = 0.0;

    for pair in route.points().windows(2) {
        let d = pair[1].distance - pair[0].distance;
        if d < MIN_SLOPE_STEP_METERS {
            continue;
        }
        let grade = (pair[1].elevation - pair[0].elevation) / d * 100.0;
        if grade > 0.0 {
            climbing_distance += d;
            let bin = (grade.floor() as usize).min(GRADE_BINS - 1);
            distance_by_grade[bin] += d;
        }
    }

    let mut elevation_by_grade = [0.0; GRADE_BINS];
    for (i, distance) in distance_by_grade.iter_mut().enumerate() {
        *distance = distance.round();
        elevation_by_grade[i] = (*distance * (i + 1) as f64 / 100.0).round();
    }

    GradeHistogram {
        distance_by_grade,
        elevation_by_grade,
        climbing_distance,
    }
}
