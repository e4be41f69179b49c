//! Climb detection over the smoothed slope signal.
//!
//! A two-state scan ("not climbing" / "climbing") with hysteresis:
//! - a climb starts where the smoothed slope reaches `slope_start`
//! - it stays open while the slope is at least `slope_continue`
//! - flats and dips are tolerated until they add up to `max_flat_gap`
//!
//! Closed candidates shorter than `min_climb_length` are dropped, never merged.
//! Detection is independent of segmentation: climbs may straddle segment
//! boundaries.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{Route, RoutePoint};

/// Configuration for climb detection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimbConfig {
    /// Smoothed slope (%) at or above which a climb begins
    pub slope_start: f64,
    /// Smoothed slope (%) that keeps an open climb going
    pub slope_continue: f64,
    /// Accumulated flat/descent distance that ends a climb (meters)
    pub max_flat_gap: f64,
    /// Minimum climb length to keep (meters)
    pub min_climb_length: f64,
}

impl Default for ClimbConfig {
    fn default() -> Self {
        Self {
            slope_start: 3.0,
            slope_continue: 1.5,
            max_flat_gap: 500.0,
            min_climb_length: 1000.0,
        }
    }
}

/// A sustained ascent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Climb {
    /// 1-based discovery order
    pub ordinal: usize,
    pub name: String,
    pub start_index: usize,
    pub end_index: usize,
    pub start_distance: f64,
    pub end_distance: f64,
    /// Length in meters
    pub distance: f64,
    /// End elevation minus start elevation
    pub elevation_gain: f64,
    /// `elevation_gain / distance × 100`
    pub average_grade: f64,
}

impl Climb {
    /// The route points this climb covers.
    pub fn points<'a>(&self, route: &'a Route) -> &'a [RoutePoint] {
        &route.points()[self.start_index..=self.end_index]
    }

    /// Whether the climb overlaps the distance range `[start, end]`.
    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        start < self.end_distance && end > self.start_distance
    }
}

#[derive(Debug, Clone, Copy)]
enum ScanState {
    Flat,
    Climbing {
        start: usize,
        last_climbing: usize,
        flat_gap: f64,
    },
}

/// Find sustained ascents in a route.
///
/// Expects `smoothed_slope` to be filled (see [`crate::smooth_slopes`]).
/// Climbs are numbered in discovery order.
pub fn detect_climbs(route: &Route, config: &ClimbConfig) -> Vec<Climb> {
    let points = route.points();
    let mut climbs = Vec::new();
    let mut state = ScanState::Flat;

    for (i, point) in points.iter().enumerate() {
        let slope = point.smoothed_slope;

        state = match state {
            ScanState::Flat if slope >= config.slope_start => ScanState::Climbing {
                start: i,
                last_climbing: i,
                flat_gap: 0.0,
            },
            ScanState::Flat => ScanState::Flat,
            ScanState::Climbing { start, .. } if slope >= config.slope_continue => {
                ScanState::Climbing {
                    start,
                    last_climbing: i,
                    flat_gap: 0.0,
                }
            }
            ScanState::Climbing {
                start,
                last_climbing,
                flat_gap,
            } => {
                let step = if i > 0 {
                    point.distance - points[i - 1].distance
                } else {
                    0.0
                };
                let flat_gap = flat_gap + step;
                if flat_gap >= config.max_flat_gap {
                    commit_climb(&mut climbs, points, start, last_climbing, config);
                    ScanState::Flat
                } else {
                    ScanState::Climbing {
                        start,
                        last_climbing,
                        flat_gap,
                    }
                }
            }
        };
    }

    if let ScanState::Climbing {
        start,
        last_climbing,
        ..
    } = state
    {
        commit_climb(&mut climbs, points, start, last_climbing, config);
    }

    info!("[Climbs] Detected {} climbs", climbs.len());
    climbs
}

fn commit_climb(
    climbs: &mut Vec<Climb>,
    points: &[RoutePoint],
    start_index: usize,
    end_index: usize,
    config: &ClimbConfig,
) {
    let start = &points[start_index];
    let end = &points[end_index];
    let distance = end.distance - start.distance;
    let elevation_gain = end.elevation - start.elevation;

    if distance < config.min_climb_length || elevation_gain <= 0.0 {
        debug!(
            "[Climbs] Dropped candidate {:.0}m-{:.0}m ({:.0}m, {:+.0}m)",
            start.distance, end.distance, distance, elevation_gain
        );
        return;
    }

    let ordinal = climbs.len() + 1;
    climbs.push(Climb {
        ordinal,
        name: format!("Climb {}", ordinal),
        start_index,
        end_index,
        start_distance: start.distance,
        end_distance: end.distance,
        distance,
        elevation_gain,
        average_grade: if distance > 0.0 {
            elevation_gain / distance * 100.0
        } else {
            0.0
        },
    });
}

/// One fixed-length slice of a climb.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimbProfileInterval {
    /// Distance from the climb start to the interval end (meters)
    pub distance_into_climb: f64,
    /// Interval length (meters); the last one may be shorter
    pub length: f64,
    /// Elevation at the interval end
    pub elevation: f64,
    /// Average grade over the interval in percent
    pub average_grade: f64,
}

/// Break a climb into consecutive intervals of roughly `interval` meters.
///
/// Interval boundaries snap to the first route point at or past each
/// multiple of `interval`; the final interval ends at the climb's last point.
pub fn climb_profile(route: &Route, climb: &Climb, interval: f64) -> Vec<ClimbProfileInterval> {
    let points = climb.points(route);
    if points.len() < 2 || interval <= 0.0 {
        return Vec::new();
    }

    let origin = points[0].distance;
    let mut next_marker = interval;
    let mut interval_start = &points[0];
    let mut profile = Vec::new();

    for (i, point) in points.iter().enumerate().skip(1) {
        let into_climb = point.distance - origin;
        if into_climb >= next_marker || i == points.len() - 1 {
            let length = point.distance - interval_start.distance;
            let rise = point.elevation - interval_start.elevation;
            profile.push(ClimbProfileInterval {
                distance_into_climb: into_climb,
                length,
                elevation: point.elevation,
                average_grade: if length > 0.0 { rise / length * 100.0 } else { 0.0 },
            });
            next_marker += interval;
            interval_start = point;
        }
    }

    profile
}
