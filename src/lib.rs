//! # Route Pacer
//!
//! Physics-based ride simulation over elevation-tagged GPS routes.
//!
//! This library provides:
//! - Slope smoothing and slope-homogeneous route segmentation
//! - Climb detection with start/continue hysteresis
//! - A power ↔ speed cycling model with a bisection inverse
//! - Power- or speed-targeted pacing with W′ balance and metabolic cost
//! - Derived metrics for recorded rides (normalized power, best efforts, zones)
//!
//! ## Quick Start
//!
//! ```rust
//! use route_pacer::{simulate_route, Route, RoutePoint, SimulationConfig};
//!
//! // 5 km at 2 % then 5 km flat, one point every 50 m
//! let points: Vec<RoutePoint> = (0..=200)
//!     .map(|i| {
//!         let d = i as f64 * 50.0;
//!         let ele = if d <= 5000.0 { d * 0.02 } else { 100.0 };
//!         RoutePoint::new(d, ele)
//!     })
//!     .collect();
//! let mut route = Route::new(points).unwrap();
//!
//! let report = simulate_route(&mut route, &SimulationConfig::default()).unwrap();
//! println!(
//!     "{} segments, {:.0} s, {:.1} km/h",
//!     report.segments.len(),
//!     report.summary.total_time,
//!     report.summary.average_speed * 3.6
//! );
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, RoutePacerError};

// Caller-supplied parameters
pub mod config;
pub use config::SimulationConfig;

// Geographic utilities (distance, track statistics)
pub mod geo_utils;
pub use geo_utils::{compute_track_stats, haversine_distance, TrackStats};

// Slope series and grade distribution
pub mod slope;
pub use slope::{compute_grade_histogram, smooth_slopes, GradeHistogram};

// Slope-homogeneous segmentation
pub mod segmentation;
pub use segmentation::{segment_by_slope, Segment, SegmentationConfig};

// Climb detection
pub mod climbs;
pub use climbs::{climb_profile, detect_climbs, Climb, ClimbConfig, ClimbProfileInterval};

// Power/speed model
pub mod physics;
pub use physics::{power_from_speed, solve_speed_from_power, RiderParams, SolverConfig};

// Pacing engine
pub mod pacing;
pub use pacing::{
    segment_at_distance, simulate, simulate_route, PacingConfig, PacingTarget, SimulatedSegment,
    SimulationReport, SimulationSummary, SpeedSample,
};

// Power curves and normalized power
pub mod curves;
pub use curves::{best_effort, best_efforts, normalized_power, power_histogram, BestEffort};

// Power zone distribution
pub mod zones;
pub use zones::{calculate_power_zones, PowerZoneConfig, PowerZoneDistribution};

// Recorded activity summary
pub mod activity;
pub use activity::{summarize_activity, ActivitySettings, ActivitySummary};

// Simulation vs recorded ride
pub mod comparison;
pub use comparison::{
    climb_chunk_comparison, compare_with_activity, ClimbChunkComparison, ComparisonReport,
};

// ============================================================================
// Core Types
// ============================================================================

/// A raw GPS sample as produced by an external track parser.
///
/// # Example
/// ```
/// use route_pacer::TrackPoint;
/// let point = TrackPoint::new(45.9237, 6.8694, 1035.0); // Chamonix
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Elevation in meters
    pub elevation: f64,
    pub timestamp: Option<DateTime<Utc>>,
    /// Recorded power in watts
    pub power: Option<f64>,
    /// Recorded heart rate in bpm
    pub heart_rate: Option<f64>,
    /// Recorded cadence in rpm
    pub cadence: Option<f64>,
}

impl TrackPoint {
    /// Create a new track point without sensor data.
    pub fn new(latitude: f64, longitude: f64, elevation: f64) -> Self {
        Self {
            latitude,
            longitude,
            elevation,
            timestamp: None,
            power: None,
            heart_rate: None,
            cadence: None,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.elevation.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// A point along a route, addressed by cumulative distance.
///
/// `raw_slope` and `smoothed_slope` are percentages filled in by
/// [`smooth_slopes`]; they are 0 until then.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    /// Cumulative distance from the route start in meters
    pub distance: f64,
    /// Elevation in meters
    pub elevation: f64,
    /// Point-to-next-point slope in percent
    pub raw_slope: f64,
    /// Centered moving average of `raw_slope` in percent
    pub smoothed_slope: f64,
    pub timestamp: Option<DateTime<Utc>>,
    pub power: Option<f64>,
    pub heart_rate: Option<f64>,
    pub cadence: Option<f64>,
}

impl RoutePoint {
    /// Create a point from cumulative distance and elevation.
    pub fn new(distance: f64, elevation: f64) -> Self {
        Self {
            distance,
            elevation,
            raw_slope: 0.0,
            smoothed_slope: 0.0,
            timestamp: None,
            power: None,
            heart_rate: None,
            cadence: None,
        }
    }

    /// Attach a timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Attach a recorded power sample.
    pub fn with_power(mut self, watts: f64) -> Self {
        self.power = Some(watts);
        self
    }

    /// Seconds elapsed from `earlier` to this point, if both carry timestamps.
    pub fn seconds_since(&self, earlier: &RoutePoint) -> Option<f64> {
        match (self.timestamp, earlier.timestamp) {
            (Some(t2), Some(t1)) => Some((t2 - t1).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }
}

/// An ordered route: index order is travel order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    points: Vec<RoutePoint>,
}

impl Route {
    /// Create a route from points with non-decreasing cumulative distance.
    ///
    /// Consecutive points may share a distance (duplicate GPS fixes); the
    /// slope across such a step is treated as 0.
    pub fn new(points: Vec<RoutePoint>) -> Result<Self> {
        for (index, point) in points.iter().enumerate() {
            if !point.distance.is_finite() || !point.elevation.is_finite() {
                return Err(RoutePacerError::InvalidRoute {
                    index,
                    message: "distance and elevation must be finite".to_string(),
                });
            }
            if index > 0 && point.distance < points[index - 1].distance {
                return Err(RoutePacerError::InvalidRoute {
                    index,
                    message: format!(
                        "cumulative distance decreases from {:.2}m to {:.2}m",
                        points[index - 1].distance,
                        point.distance
                    ),
                });
            }
        }
        Ok(Self { points })
    }

    /// Build a route from raw GPS samples, accumulating haversine distance.
    ///
    /// # Example
    /// ```
    /// use route_pacer::{Route, TrackPoint};
    ///
    /// let track = vec![
    ///     TrackPoint::new(45.0, 6.0, 500.0),
    ///     TrackPoint::new(45.001, 6.0, 505.0),
    /// ];
    /// let route = Route::from_track(&track).unwrap();
    /// assert!((route.total_distance() - 111.2).abs() < 0.5);
    /// ```
    pub fn from_track(track: &[TrackPoint]) -> Result<Self> {
        let mut points = Vec::with_capacity(track.len());
        let mut cumulative = 0.0;

        for (index, tp) in track.iter().enumerate() {
            if !tp.is_valid() {
                return Err(RoutePacerError::InvalidRoute {
                    index,
                    message: format!(
                        "invalid coordinates ({}, {}, {})",
                        tp.latitude, tp.longitude, tp.elevation
                    ),
                });
            }
            if index > 0 {
                cumulative += haversine_distance(&track[index - 1], tp);
            }
            points.push(RoutePoint {
                distance: cumulative,
                elevation: tp.elevation,
                raw_slope: 0.0,
                smoothed_slope: 0.0,
                timestamp: tp.timestamp,
                power: tp.power,
                heart_rate: tp.heart_rate,
                cadence: tp.cadence,
            });
        }

        Self::new(points)
    }

    pub fn points(&self) -> &[RoutePoint] {
        &self.points
    }

    pub(crate) fn points_mut(&mut self) -> &mut [RoutePoint] {
        &mut self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Distance between the first and last point in meters.
    pub fn total_distance(&self) -> f64 {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => last.distance - first.distance,
            _ => 0.0,
        }
    }

    /// Sum of positive elevation steps in meters.
    pub fn elevation_gain(&self) -> f64 {
        geo_utils::positive_elevation_gain(&self.points)
    }

    /// Index of the last point at or before `distance` (0 if before the start).
    pub fn index_at_distance(&self, distance: f64) -> usize {
        self.points
            .partition_point(|p| p.distance <= distance)
            .saturating_sub(1)
    }
}
