//! Caller-supplied simulation parameters.
//!
//! [`SimulationConfig`] gathers every knob of a run: rider physics, the
//! pacing target, engine and solver tolerances, segmentation and climb
//! thresholds, and the slope-smoothing window. All parts have defaults and
//! can be loaded from JSON with missing fields falling back to them.

use serde::{Deserialize, Serialize};

use crate::climbs::ClimbConfig;
use crate::error::{ensure_non_negative, Result, RoutePacerError};
use crate::pacing::{PacingConfig, PacingTarget};
use crate::physics::{RiderParams, SolverConfig};
use crate::segmentation::SegmentationConfig;

/// Everything one simulation run needs besides the route.
///
/// # Example
/// ```
/// use route_pacer::{PacingTarget, SimulationConfig};
///
/// let config = SimulationConfig::from_json(
///     r#"{ "target": { "mode": "speed", "meters_per_second": 8.0 },
///          "rider": { "rider_mass": 72.0 } }"#,
/// )
/// .unwrap();
/// assert_eq!(config.rider.rider_mass, 72.0);
/// assert_eq!(config.rider.bike_mass, 8.0); // default kept
/// assert!(matches!(config.target, PacingTarget::Speed { .. }));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub rider: RiderParams,
    pub target: PacingTarget,
    pub pacing: PacingConfig,
    pub solver: SolverConfig,
    pub segmentation: SegmentationConfig,
    pub climbs: ClimbConfig,
    /// Slope-smoothing half-window in points
    pub smoothing_window: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rider: RiderParams::default(),
            target: PacingTarget::default(),
            pacing: PacingConfig::default(),
            solver: SolverConfig::default(),
            segmentation: SegmentationConfig::default(),
            climbs: ClimbConfig::default(),
            smoothing_window: 3, // points each side
        }
    }
}

impl SimulationConfig {
    /// Parse a configuration from JSON. Absent fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SimulationConfig = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Serialize the configuration as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every parameter before any computation starts.
    pub fn validate(&self) -> Result<()> {
        self.target.validate()?;
        self.rider.validate()?;
        self.pacing.validate()?;
        self.solver.validate()?;

        ensure_non_negative("segmentation.slope_threshold", self.segmentation.slope_threshold)?;
        ensure_non_negative("segmentation.min_length", self.segmentation.min_length)?;
        ensure_non_negative("climbs.max_flat_gap", self.climbs.max_flat_gap)?;
        ensure_non_negative("climbs.min_climb_length", self.climbs.min_climb_length)?;

        if !self.climbs.slope_start.is_finite() || !self.climbs.slope_continue.is_finite() {
            return Err(RoutePacerError::InvalidParameter {
                name: "climbs.slope_start",
                value: self.climbs.slope_start,
                message: "climb slope thresholds must be finite".to_string(),
            });
        }
        if self.climbs.slope_continue > self.climbs.slope_start {
            return Err(RoutePacerError::InvalidParameter {
                name: "climbs.slope_continue",
                value: self.climbs.slope_continue,
                message: format!(
                    "must not exceed slope_start ({})",
                    self.climbs.slope_start
                ),
            });
        }
        Ok(())
    }
}
