//! Time-in-zone distribution for recorded power.
//!
//! Zones are percentages of critical power, Coggan style, with the two top
//! zones folded together:
//!
//! | Zone | % of CP |
//! |---|---|
//! | 1 | < 55 |
//! | 2 | 55–75 |
//! | 3 | 75–90 |
//! | 4 | 90–105 |
//! | 5 | 105–120 |
//! | 6 | ≥ 120 |
//!
//! Time is integrated from timestamps, not sample counts: each step between
//! consecutive points is credited to the zone of its starting power. Steps of
//! 10 s or more are treated as recording gaps and skipped.
//!
//! ## Example
//! ```rust
//! use chrono::{DateTime, Duration};
//! use route_pacer::zones::{calculate_power_zones, PowerZoneConfig};
//! use route_pacer::RoutePoint;
//!
//! let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
//! let points: Vec<RoutePoint> = (0..=120)
//!     .map(|i| RoutePoint::new(i as f64 * 9.0, 0.0)
//!         .with_timestamp(t0 + Duration::seconds(i))
//!         .with_power(240.0))
//!     .collect();
//!
//! let zones = calculate_power_zones(&points, &PowerZoneConfig::from_cp(250.0)).unwrap();
//! assert_eq!(zones.get_zone_percent(4), 100.0);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{ensure_positive, Result};
use crate::RoutePoint;

/// Number of zones reported.
pub const ZONE_COUNT: usize = 6;

/// Configuration for power zone calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerZoneConfig {
    /// Critical power in watts
    pub critical_power: f64,
    /// Upper bounds of zones 1–5 as fractions of CP; zone 6 is everything above
    pub zone_thresholds: [f64; ZONE_COUNT - 1],
    /// Steps at least this long are skipped as recording gaps (seconds)
    pub max_gap_seconds: f64,
}

impl PowerZoneConfig {
    /// Create config from CP using the standard thresholds
    pub fn from_cp(critical_power: f64) -> Self {
        Self {
            critical_power,
            zone_thresholds: [0.55, 0.75, 0.90, 1.05, 1.20],
            max_gap_seconds: 10.0,
        }
    }

    /// Determine which zone a power value falls into (1-6)
    pub fn get_zone(&self, power: f64) -> u8 {
        let fraction = power / self.critical_power;
        self.zone_thresholds
            .iter()
            .position(|&threshold| fraction < threshold)
            .map_or(ZONE_COUNT as u8, |i| (i + 1) as u8)
    }
}

impl Default for PowerZoneConfig {
    fn default() -> Self {
        Self::from_cp(260.0)
    }
}

/// Result of power zone distribution calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerZoneDistribution {
    /// Seconds credited to any zone
    pub total_seconds: f64,
    /// Seconds in each zone (indexed 0-5 for zones 1-6)
    pub zone_seconds: [f64; ZONE_COUNT],
    /// Whole minutes in each zone, rounded
    pub zone_minutes: [f64; ZONE_COUNT],
    /// Percentage of credited time in each zone
    pub zone_percentages: [f64; ZONE_COUNT],
}

impl PowerZoneDistribution {
    /// Get percentage for a specific zone (1-6)
    pub fn get_zone_percent(&self, zone: u8) -> f64 {
        if (1..=ZONE_COUNT as u8).contains(&zone) {
            self.zone_percentages[(zone - 1) as usize]
        } else {
            0.0
        }
    }
}

/// Distribute the recorded ride's time over the power zones.
///
/// Fails when the configured critical power is not positive.
pub fn calculate_power_zones(
    points: &[RoutePoint],
    config: &PowerZoneConfig,
) -> Result<PowerZoneDistribution> {
    ensure_positive("critical_power", config.critical_power)?;

    let mut zone_seconds = [0.0; ZONE_COUNT];
    let mut total_seconds = 0.0;

    for pair in points.windows(2) {
        let (Some(power), Some(dt)) = (pair[0].power, pair[1].seconds_since(&pair[0])) else {
            continue;
        };
        if dt <= 0.0 || dt >= config.max_gap_seconds {
            continue;
        }
        let zone = config.get_zone(power);
        zone_seconds[(zone - 1) as usize] += dt;
        total_seconds += dt;
    }

    let mut zone_minutes = [0.0; ZONE_COUNT];
    let mut zone_percentages = [0.0; ZONE_COUNT];
    for i in 0..ZONE_COUNT {
        zone_minutes[i] = (zone_seconds[i] / 60.0).round();
        if total_seconds > 0.0 {
            zone_percentages[i] = zone_seconds[i] / total_seconds * 100.0;
        }
    }

    Ok(PowerZoneDistribution {
        total_seconds,
        zone_seconds,
        zone_minutes,
        zone_percentages,
    })
}
