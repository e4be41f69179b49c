//! Summary statistics for a recorded ride.
//!
//! Works on a [`Route`] built from a recorded track (timestamps and sensor
//! channels populated). Moving time only counts steps that look like riding:
//! shorter than `max_step_seconds` and faster than `moving_speed_kmh`.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::curves::normalized_power;
use crate::error::{ensure_positive, Result, RoutePacerError};
use crate::physics::ensure_efficiency;
use crate::Route;

/// Rider settings and plausibility thresholds for ride summaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivitySettings {
    /// Critical power used for IF and TSS (W)
    pub critical_power: f64,
    /// Rider mass for W/kg (kg)
    pub rider_mass: f64,
    /// Mechanical work / metabolic energy
    pub muscular_efficiency: f64,
    /// Steps slower than this are stopped time (km/h)
    pub moving_speed_kmh: f64,
    /// Steps longer than this are pauses (s)
    pub max_step_seconds: f64,
    /// Faster steps are GPS glitches and never count as max speed (km/h)
    pub max_plausible_speed_kmh: f64,
    /// Cadence below this is coasting (rpm)
    pub coasting_cadence: f64,
    /// Without cadence, power below this is coasting (W)
    pub coasting_power: f64,
}

impl Default for ActivitySettings {
    fn default() -> Self {
        Self {
            critical_power: 260.0,
            rider_mass: 68.0,
            muscular_efficiency: 0.24,
            moving_speed_kmh: 1.0,
            max_step_seconds: 120.0,
            max_plausible_speed_kmh: 130.0,
            coasting_cadence: 5.0,
            coasting_power: 5.0,
        }
    }
}

/// Aggregates of a recorded ride. Speeds are in m/s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub distance: f64,
    pub elevation_gain: f64,
    pub min_elevation: f64,
    pub max_elevation: f64,
    /// First to last timestamp (s)
    pub elapsed_time: f64,
    pub moving_time: f64,
    pub pause_time: f64,
    pub average_moving_speed: f64,
    pub average_speed: f64,
    pub max_speed: f64,
    /// Mean over all power samples, zeros included
    pub average_power: f64,
    pub average_nonzero_power: f64,
    pub max_power: f64,
    pub normalized_power: f64,
    pub average_watts_per_kg: f64,
    pub normalized_watts_per_kg: f64,
    pub intensity_factor: f64,
    pub training_stress_score: f64,
    pub work_kj: f64,
    pub kcal: f64,
    pub kcal_per_hour: f64,
    pub coasting_time: f64,
    /// Share of moving time spent coasting, in percent
    pub coasting_percent: f64,
    pub average_heart_rate: Option<f64>,
    pub max_heart_rate: Option<f64>,
    pub average_cadence: Option<f64>,
    pub average_nonzero_cadence: Option<f64>,
    pub max_cadence: Option<f64>,
}

/// Mean, non-zero mean and maximum of an optional channel.
#[derive(Default)]
struct ChannelStats {
    sum: f64,
    count: usize,
    nonzero_sum: f64,
    nonzero_count: usize,
    max: Option<f64>,
}

impl ChannelStats {
    fn add(&mut self, value: Option<f64>) {
        let Some(v) = value else { return };
        self.sum += v;
        self.count += 1;
        if v > 0.0 {
            self.nonzero_sum += v;
            self.nonzero_count += 1;
        }
        self.max = Some(self.max.map_or(v, |m| m.max(v)));
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    fn nonzero_mean(&self) -> Option<f64> {
        (self.nonzero_count > 0).then(|| self.nonzero_sum / self.nonzero_count as f64)
    }
}

/// Summarize a recorded ride.
///
/// Needs at least 2 points. Time-based figures are 0 when the ride has no
/// timestamps.
pub fn summarize_activity(route: &Route, settings: &ActivitySettings) -> Result<ActivitySummary> {
    ensure_positive("critical_power", settings.critical_power)?;
    ensure_positive("rider_mass", settings.rider_mass)?;
    ensure_efficiency("muscular_efficiency", settings.muscular_efficiency)?;

    let points = route.points();
    if points.len() < 2 {
        return Err(RoutePacerError::InsufficientPoints {
            point_count: points.len(),
            minimum_required: 2,
        });
    }

    let mut power = ChannelStats::default();
    let mut heart_rate = ChannelStats::default();
    let mut cadence = ChannelStats::default();
    let mut moving_time = 0.0;
    let mut coasting_time = 0.0;
    let mut max_speed_kmh: f64 = 0.0;
    let mut work_kj = 0.0;
    let mut min_elevation = f64::INFINITY;
    let mut max_elevation = f64::NEG_INFINITY;

    for (i, p) in points.iter().enumerate() {
        min_elevation = min_elevation.min(p.elevation);
        max_elevation = max_elevation.max(p.elevation);
        power.add(p.power);
        heart_rate.add(p.heart_rate);
        cadence.add(p.cadence);

        let Some(prev) = i.checked_sub(1).map(|j| &points[j]) else {
            continue;
        };
        let Some(dt) = p.seconds_since(prev) else {
            continue;
        };
        if dt <= 0.0 || dt >= settings.max_step_seconds {
            continue;
        }

        let speed_kmh = (p.distance - prev.distance) / dt * 3.6;
        if speed_kmh > settings.moving_speed_kmh {
            moving_time += dt;
            if speed_kmh < settings.max_plausible_speed_kmh {
                max_speed_kmh = max_speed_kmh.max(speed_kmh);
            }
            let coasting = match (p.cadence, p.power) {
                (Some(rpm), _) => rpm < settings.coasting_cadence,
                (None, Some(watts)) => watts < settings.coasting_power,
                (None, None) => false,
            };
            if coasting {
                coasting_time += dt;
            }
        }
        if let Some(watts) = p.power {
            work_kj += watts * dt / 1000.0;
        }
    }

    let elapsed_time = points[points.len() - 1]
        .seconds_since(&points[0])
        .unwrap_or(0.0)
        .max(0.0);
    let distance = route.total_distance();
    let np = normalized_power(points);
    let average_power = power.mean().unwrap_or(0.0);
    let cp = settings.critical_power;
    let intensity_factor = np / cp;
    let kcal = work_kj / settings.muscular_efficiency / 4.184;

    debug!(
        "[Activity] {} points, {:.0}m, moving {:.0}s of {:.0}s",
        points.len(),
        distance,
        moving_time,
        elapsed_time
    );

    Ok(ActivitySummary {
        distance,
        elevation_gain: route.elevation_gain(),
        min_elevation,
        max_elevation,
        elapsed_time,
        moving_time,
        pause_time: (elapsed_time - moving_time).max(0.0),
        average_moving_speed: if moving_time > 0.0 { distance / moving_time } else { 0.0 },
        average_speed: if elapsed_time > 0.0 { distance / elapsed_time } else { 0.0 },
        max_speed: max_speed_kmh / 3.6,
        average_power,
        average_nonzero_power: power.nonzero_mean().unwrap_or(0.0),
        max_power: power.max.unwrap_or(0.0),
        normalized_power: np,
        average_watts_per_kg: average_power / settings.rider_mass,
        normalized_watts_per_kg: np / settings.rider_mass,
        intensity_factor,
        training_stress_score: if moving_time > 0.0 {
            moving_time * np * intensity_factor / (cp * 3600.0) * 100.0
        } else {
            0.0
        },
        work_kj,
        kcal,
        kcal_per_hour: if moving_time > 0.0 { kcal / (moving_time / 3600.0) } else { 0.0 },
        coasting_time,
        coasting_percent: if moving_time > 0.0 { coasting_time / moving_time * 100.0 } else { 0.0 },
        average_heart_rate: heart_rate.mean(),
        max_heart_rate: heart_rate.max,
        average_cadence: cadence.mean(),
        average_nonzero_cadence: cadence.nonzero_mean(),
        max_cadence: cadence.max,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RoutePoint;
    use chrono::{DateTime, Duration};

    /// 1 Hz ride: (meters moved since previous point, power, cadence) per second
    fn ride(steps: &[(f64, Option<f64>, Option<f64>)]) -> Route {
        let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let mut distance = 0.0;
        let points = steps
            .iter()
            .enumerate()
            .map(|(i, &(moved, power, cadence))| {
                distance += moved;
                let mut p = RoutePoint::new(distance, 100.0 + (i % 10) as f64)
                    .with_timestamp(t0 + Duration::seconds(i as i64));
                p.power = power;
                p.cadence = cadence;
                p.heart_rate = Some(140.0);
                p
            })
            .collect();
        Route::new(points).unwrap()
    }

    #[test]
    fn test_steady_ride() {
        let route = ride(&vec![(10.0, Some(260.0), Some(90.0)); 3601]);
        let summary = summarize_activity(&route, &ActivitySettings::default()).unwrap();

        assert!((summary.moving_time - 3600.0).abs() < 1e-9);
        assert!((summary.elapsed_time - 3600.0).abs() < 1e-9);
        assert_eq!(summary.pause_time, 0.0);
        assert!((summary.average_moving_speed - 10.0).abs() < 1e-6);
        assert!((summary.max_speed - 10.0).abs() < 1e-6);
        assert!((summary.normalized_power - 260.0).abs() < 1e-6);
        // One hour at CP is 100 TSS
        assert!((summary.intensity_factor - 1.0).abs() < 1e-9);
        assert!((summary.training_stress_score - 100.0).abs() < 1e-6);
        assert!((summary.work_kj - 936.0).abs() < 1e-6);
        assert!((summary.kcal - 936.0 / 0.24 / 4.184).abs() < 1e-6);
        assert_eq!(summary.coasting_time, 0.0);
        assert_eq!(summary.average_heart_rate, Some(140.0));
        assert_eq!(summary.min_elevation, 100.0);
        assert_eq!(summary.max_elevation, 109.0);
    }

    #[test]
    fn test_stops_and_glitches() {
        let mut steps = vec![(8.0, Some(200.0), Some(85.0)); 100];
        // Standing still for 50 s
        steps.extend(vec![(0.0, Some(0.0), Some(0.0)); 50]);
        // One implausible 60 m/s jump
        steps.push((60.0, Some(200.0), Some(85.0)));
        let route = ride(&steps);
        let summary = summarize_activity(&route, &ActivitySettings::default()).unwrap();

        assert!((summary.moving_time - 100.0).abs() < 1e-9);
        assert!((summary.pause_time - 50.0).abs() < 1e-9);
        assert!((summary.max_speed - 8.0).abs() < 1e-6);
        assert!(summary.average_nonzero_power > summary.average_power);
        assert_eq!(summary.max_power, 200.0);
        assert_eq!(summary.average_nonzero_cadence, Some(85.0));
    }

    #[test]
    fn test_coasting_detection() {
        let mut steps = vec![(10.0, Some(220.0), Some(90.0)); 60];
        steps.extend(vec![(12.0, Some(0.0), Some(0.0)); 30]);
        steps.extend(vec![(12.0, Some(2.0), None); 30]);
        let summary = summarize_activity(&ride(&steps), &ActivitySettings::default()).unwrap();
        // Step 0 has no predecessor, so 119 moving seconds of which 60 coast
        assert!((summary.moving_time - 119.0).abs() < 1e-9);
        assert!((summary.coasting_time - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_untimed_route() {
        let points = (0..10).map(|i| RoutePoint::new(i as f64 * 100.0, 0.0)).collect();
        let summary =
            summarize_activity(&Route::new(points).unwrap(), &ActivitySettings::default()).unwrap();
        assert_eq!(summary.moving_time, 0.0);
        assert_eq!(summary.training_stress_score, 0.0);
        assert!((summary.distance - 900.0).abs() < 1e-9);
        assert_eq!(summary.average_heart_rate, None);
    }

    #[test]
    fn test_requires_two_points() {
        let route = Route::new(vec![RoutePoint::new(0.0, 0.0)]).unwrap();
        assert!(matches!(
            summarize_activity(&route, &ActivitySettings::default()),
            Err(RoutePacerError::InsufficientPoints { .. })
        ));
    }
}
