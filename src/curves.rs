//! Power curve metrics for recorded rides.
//!
//! This module computes single-number and per-duration summaries of a power
//! stream: normalized power, best average power over time windows, and the
//! distribution of samples across power bins.
//!
//! ## Features
//! - Normalized power over a 30-sample rolling mean
//! - Best efforts on timestamped points with a two-pointer sliding window
//! - Power histogram with fixed-width bins
//!
//! ## Example
//! ```rust
//! use route_pacer::curves::normalized_power_from_samples;
//!
//! let steady = vec![200.0; 120];
//! assert!((normalized_power_from_samples(&steady) - 200.0).abs() < 1e-9);
//! ```

use serde::{Deserialize, Serialize};

use crate::RoutePoint;

/// Rolling window length for normalized power, in samples (≈ seconds at 1 Hz)
pub const NP_WINDOW: usize = 30;

/// Standard best-effort durations in seconds
pub const STANDARD_EFFORT_DURATIONS: &[u32] = &[5, 60, 300, 1200, 1800, 2700, 3600, 7200, 10800];

/// Default power histogram bin width in watts
pub const DEFAULT_HISTOGRAM_BIN: f64 = 25.0;

/// Accepted window span relative to the requested duration
const EFFORT_SPAN_MIN: f64 = 0.9;
const EFFORT_SPAN_MAX: f64 = 1.1;

/// Normalized power of a raw 1 Hz power series.
///
/// Returns 0 when the series is shorter than [`NP_WINDOW`].
pub fn normalized_power_from_samples(samples: &[f64]) -> f64 {
    if samples.len() < NP_WINDOW {
        return 0.0;
    }

    let mut window_sum: f64 = samples[..NP_WINDOW].iter().sum();
    let mut fourth_power_sum = (window_sum / NP_WINDOW as f64).powi(4);
    let mut windows = 1usize;

    for i in NP_WINDOW..samples.len() {
        window_sum += samples[i] - samples[i - NP_WINDOW];
        fourth_power_sum += (window_sum / NP_WINDOW as f64).powi(4);
        windows += 1;
    }

    (fourth_power_sum / windows as f64).powf(0.25)
}

/// Normalized power of the points' recorded power; missing samples count as 0.
pub fn normalized_power(points: &[RoutePoint]) -> f64 {
    let samples: Vec<f64> = points.iter().map(|p| p.power.unwrap_or(0.0)).collect();
    normalized_power_from_samples(&samples)
}

/// Best average power found for one duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestEffort {
    /// Requested duration in seconds
    pub duration: f64,
    /// Average power over the window in watts
    pub watts: f64,
    /// Actual span of the winning window in seconds
    pub span: f64,
    pub start_index: usize,
    pub end_index: usize,
    /// Route distance where the window starts
    pub start_distance: f64,
}

/// Best average power over a window lasting roughly `duration` seconds.
///
/// Windows are bounded by time, not sample count: any window whose span is
/// within 90–110 % of `duration` qualifies. Points without timestamps are
/// skipped, and windows with no power samples are ignored.
pub fn best_effort(points: &[RoutePoint], duration: f64) -> Option<BestEffort> {
    if duration <= 0.0 {
        return None;
    }

    let timed: Vec<usize> = (0..points.len())
        .filter(|&i| points[i].timestamp.is_some())
        .collect();
    if timed.len() < 2 {
        return None;
    }

    let span_of = |a: usize, b: usize| -> f64 {
        points[timed[b]]
            .seconds_since(&points[timed[a]])
            .unwrap_or(0.0)
    };
    let sample = |k: usize| -> Option<f64> { points[timed[k]].power.filter(|p| p.is_finite()) };

    let mut best: Option<BestEffort> = None;
    let mut left = 0;
    let mut sum = 0.0;
    let mut count = 0usize;

    for right in 0..timed.len() {
        if let Some(p) = sample(right) {
            sum += p;
            count += 1;
        }

        while left < right && span_of(left, right) > duration * EFFORT_SPAN_MAX {
            if let Some(p) = sample(left) {
                sum -= p;
                count -= 1;
            }
            left += 1;
        }

        let span = span_of(left, right);
        if span >= duration * EFFORT_SPAN_MIN && count > 0 {
            let watts = sum / count as f64;
            if best.as_ref().map_or(true, |b| watts > b.watts) {
                best = Some(BestEffort {
                    duration,
                    watts,
                    span,
                    start_index: timed[left],
                    end_index: timed[right],
                    start_distance: points[timed[left]].distance,
                });
            }
        }
    }

    best
}

/// Best efforts for each duration; durations with no qualifying window are omitted.
pub fn best_efforts(points: &[RoutePoint], durations: &[u32]) -> Vec<BestEffort> {
    durations
        .iter()
        .filter_map(|&d| best_effort(points, d as f64))
        .collect()
}

/// One bin of a power histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerHistogramBin {
    /// Inclusive lower edge in watts
    pub min_watts: f64,
    /// Exclusive upper edge in watts
    pub max_watts: f64,
    pub samples: usize,
    /// Samples / 60, assuming 1 Hz recording
    pub minutes: f64,
}

/// Count power samples per fixed-width bin, from 0 W up to the highest bin used.
pub fn power_histogram(points: &[RoutePoint], bin_size: f64) -> Vec<PowerHistogramBin> {
    if bin_size <= 0.0 {
        return Vec::new();
    }

    let mut counts: Vec<usize> = Vec::new();
    for watts in points.iter().filter_map(|p| p.power) {
        if !watts.is_finite() || watts < 0.0 {
            continue;
        }
        let bin = (watts / bin_size).floor() as usize;
        if bin >= counts.len() {
            counts.resize(bin + 1, 0);
        }
        counts[bin] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, samples)| PowerHistogramBin {
            min_watts: i as f64 * bin_size,
            max_watts: (i + 1) as f64 * bin_size,
            samples,
            minutes: samples as f64 / 60.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration};

    fn ride(powers: &[Option<f64>]) -> Vec<RoutePoint> {
        let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        powers
            .iter()
            .enumerate()
            .map(|(i, &power)| {
                let mut p = RoutePoint::new(i as f64 * 8.0, 0.0)
                    .with_timestamp(t0 + Duration::seconds(i as i64));
                p.power = power;
                p
            })
            .collect()
    }

    #[test]
    fn test_np_of_steady_power() {
        let points = ride(&vec![Some(240.0); 100]);
        assert!((normalized_power(&points) - 240.0).abs() < 1e-9);
    }

    #[test]
    fn test_np_needs_full_window() {
        assert_eq!(normalized_power_from_samples(&[300.0; 29]), 0.0);
        assert!(normalized_power_from_samples(&[300.0; 30]) > 0.0);
    }

    #[test]
    fn test_np_exceeds_average_for_variable_power() {
        let samples: Vec<f64> = (0..600)
            .map(|i| if (i / 60) % 2 == 0 { 350.0 } else { 100.0 })
            .collect();
        let np = normalized_power_from_samples(&samples);
        assert!(np > 225.0);
        assert!(np < 350.0);
    }

    #[test]
    fn test_np_missing_power_counts_as_zero() {
        let mut powers = vec![Some(200.0); 60];
        for p in powers.iter_mut().skip(30) {
            *p = None;
        }
        let np = normalized_power(&ride(&powers));
        assert!(np < 200.0 && np > 0.0);
    }

    #[test]
    fn test_best_effort_finds_hardest_window() {
        let mut powers = vec![Some(150.0); 600];
        for p in powers.iter_mut().skip(200).take(60) {
            *p = Some(400.0);
        }
        let points = ride(&powers);

        let effort = best_effort(&points, 60.0).unwrap();
        assert!(effort.watts > 360.0);
        assert!(effort.span >= 54.0 && effort.span <= 66.0);
        assert!(effort.start_index >= 190 && effort.start_index <= 210);
    }

    #[test]
    fn test_best_effort_ignores_windows_without_power() {
        let mut powers = vec![None; 100];
        powers[50] = Some(300.0);
        let effort = best_effort(&ride(&powers), 5.0).unwrap();
        assert_eq!(effort.watts, 300.0);

        assert!(best_effort(&ride(&vec![None; 100]), 5.0).is_none());
    }

    #[test]
    fn test_best_effort_too_short_ride() {
        let points = ride(&vec![Some(200.0); 30]);
        assert!(best_effort(&points, 60.0).is_none());
    }

    #[test]
    fn test_best_efforts_standard_durations() {
        let points = ride(&vec![Some(210.0); 400]);
        let efforts = best_efforts(&points, STANDARD_EFFORT_DURATIONS);
        let found: Vec<f64> = efforts.iter().map(|e| e.duration).collect();
        assert_eq!(found, vec![5.0, 60.0, 300.0]);
        assert!(efforts.iter().all(|e| (e.watts - 210.0).abs() < 1e-9));
    }

    #[test]
    fn test_power_histogram() {
        let points = ride(&[Some(0.0), Some(24.9), Some(25.0), Some(110.0), None, Some(-5.0)]);
        let hist = power_histogram(&points, DEFAULT_HISTOGRAM_BIN);
        assert_eq!(hist.len(), 5);
        assert_eq!(hist[0].samples, 2);
        assert_eq!(hist[1].samples, 1);
        assert_eq!(hist[2].samples, 0);
        assert_eq!(hist[4].samples, 1);
        assert_eq!(hist[4].min_watts, 100.0);
        assert!((hist[0].minutes - 2.0 / 60.0).abs() < 1e-12);
    }
}
