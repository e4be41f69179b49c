//! Scoring a recorded ride against its simulation.
//!
//! Each simulated segment is matched with the recorded points whose route
//! distance falls inside it. Recorded power and speed are averaged and
//! compared with the simulated values through a ratio score:
//!
//! - 100 while recorded / simulated stays within [0.9, 1.1]
//! - falling linearly to 0 at a ratio of 2.0 above the band
//! - falling linearly to 0 at a ratio of 0.5 below it
//!
//! On steep descents only speed is scored, since power there says little
//! about pacing. Elsewhere power weighs three times as much as speed.
//!
//! Climbs can also be cut into fixed-length chunks (500 m by default) to
//! chart recorded against simulated power along the ascent.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::climbs::Climb;
use crate::error::{ensure_positive, OptionExt, Result};
use crate::pacing::{segment_at_distance, SimulatedSegment, SimulationReport};
use crate::{Route, RoutePoint};

/// Ratio band scored 100
const BAND_LOW: f64 = 0.9;
const BAND_HIGH: f64 = 1.1;
/// Ratios at which the score reaches 0
const ZERO_LOW: f64 = 0.5;
const ZERO_HIGH: f64 = 2.0;
/// Segments at or below this grade (%) are scored on speed only
const DESCENT_GRADE_PERCENT: f64 = -5.5;
/// Segments this short (m) or shorter are left out of the overall score
const MIN_SCORED_SEGMENT: f64 = 100.0;
/// Default chunk length for [`climb_chunk_comparison`] (m).
pub const DEFAULT_CLIMB_CHUNK: f64 = 500.0;

/// Score how well `recorded` matches `simulated`, 0 to 100.
///
/// Returns 0 when either value is missing or not positive.
pub fn metric_score(simulated: f64, recorded: f64) -> f64 {
    if !(simulated > 0.0 && recorded > 0.0) {
        return 0.0;
    }
    let ratio = recorded / simulated;

    if (BAND_LOW..=BAND_HIGH).contains(&ratio) {
        100.0
    } else if ratio > BAND_HIGH {
        if ratio >= ZERO_HIGH {
            0.0
        } else {
            100.0 - (ratio - BAND_HIGH) / (ZERO_HIGH - BAND_HIGH) * 100.0
        }
    } else if ratio <= ZERO_LOW {
        0.0
    } else {
        (ratio - ZERO_LOW) / (BAND_LOW - ZERO_LOW) * 100.0
    }
}

/// Weighted segment score: speed only on steep descents, else 3:1 power to speed.
pub fn combined_score(power_score: f64, speed_score: f64, grade_percent: f64) -> f64 {
    if grade_percent <= DESCENT_GRADE_PERCENT {
        speed_score
    } else {
        (3.0 * power_score + speed_score) / 4.0
    }
}

/// Comparison for one simulated segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentComparison {
    pub start_distance: f64,
    pub end_distance: f64,
    pub distance: f64,
    /// Segment grade in percent
    pub average_grade: f64,
    pub simulated_power: f64,
    /// m/s
    pub simulated_speed: f64,
    /// Mean of non-zero recorded power samples (W)
    pub recorded_power: f64,
    /// Mean recorded point speed (m/s)
    pub recorded_speed: f64,
    pub power_score: f64,
    pub speed_score: f64,
    pub score: f64,
    /// Whether any recorded point fell inside the segment
    pub has_recording: bool,
    /// Whether the score counts towards the overall score
    pub counted: bool,
}

/// Comparison for one climb.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimbComparison {
    pub ordinal: usize,
    pub name: String,
    /// Distance-weighted over the overlapping segments
    pub simulated_power: f64,
    pub simulated_speed: f64,
    pub recorded_power: f64,
    pub recorded_speed: f64,
    pub power_score: f64,
    pub speed_score: f64,
    pub score: f64,
}

/// Full simulation-vs-ride comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub segments: Vec<SegmentComparison>,
    pub climbs: Vec<ClimbComparison>,
    /// Mean score of counted segments, 0 when none count
    pub overall_score: f64,
    pub segments_counted: usize,
}

impl ComparisonReport {
    /// Running mean of segment scores in route order, for ride evolution charts.
    pub fn running_scores(&self) -> Vec<f64> {
        let mut sum = 0.0;
        self.segments
            .iter()
            .enumerate()
            .map(|(i, s)| {
                sum += s.score;
                sum / (i + 1) as f64
            })
            .collect()
    }
}

/// Recorded and simulated power over one fixed-length piece of a climb.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimbChunkComparison {
    /// Meters from the climb start to the chunk start
    pub offset: f64,
    pub start_distance: f64,
    pub end_distance: f64,
    /// Recorded elevation at the chunk start
    pub elevation: f64,
    /// Grade in percent between the first and last recorded point of the
    /// chunk, or the simulated segment's grade when fewer than two fall inside
    pub average_grade: f64,
    /// Mean of non-zero recorded power samples, 0 without any
    pub recorded_power: f64,
    /// Distance-weighted power of the overlapping simulated segments
    pub simulated_power: f64,
}

/// A recorded point reduced to what scoring needs.
struct RecordedSample {
    distance: f64,
    power: Option<f64>,
    speed: f64,
}

fn recorded_samples(points: &[RoutePoint]) -> Vec<RecordedSample> {
    points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let speed = match i.checked_sub(1).map(|j| &points[j]) {
                Some(prev) => match p.seconds_since(prev) {
                    Some(dt) if dt > 0.0 => (p.distance - prev.distance) / dt,
                    _ => 0.0,
                },
                None => 0.0,
            };
            RecordedSample {
                distance: p.distance,
                power: p.power,
                speed,
            }
        })
        .collect()
}

/// Mean recorded power (zeros and gaps ignored) and speed within `[start, end]`.
fn recorded_averages(samples: &[RecordedSample], start: f64, end: f64) -> Option<(f64, f64)> {
    let inside: Vec<&RecordedSample> = samples
        .iter()
        .filter(|s| s.distance >= start && s.distance <= end)
        .collect();
    if inside.is_empty() {
        return None;
    }

    let power = mean_power(inside.iter().map(|s| s.power));
    let speed = inside.iter().map(|s| s.speed).sum::<f64>() / inside.len() as f64;
    Some((power, speed))
}

/// Mean of the finite, non-zero power samples, 0 when there are none.
fn mean_power(samples: impl Iterator<Item = Option<f64>>) -> f64 {
    let (sum, count) = samples
        .flatten()
        .filter(|p| p.is_finite() && *p != 0.0)
        .fold((0.0, 0usize), |(sum, count), p| (sum + p, count + 1));
    if count > 0 {
        sum / count as f64
    } else {
        0.0
    }
}

fn weighted_average<'a>(
    segments: impl Iterator<Item = &'a SimulatedSegment>,
    value: impl Fn(&SimulatedSegment) -> f64,
) -> f64 {
    let (total, distance) = segments
        .filter(|s| s.segment.distance > 0.0)
        .fold((0.0, 0.0), |(t, d), s| {
            (t + value(s) * s.segment.distance, d + s.segment.distance)
        });
    if distance > 0.0 {
        total / distance
    } else {
        0.0
    }
}

/// Compare a simulation with a recorded ride over the same route.
///
/// `recorded` distances must be measured from the same start as the
/// simulated route (e.g. both built with [`Route::from_track`]).
pub fn compare_with_activity(report: &SimulationReport, recorded: &Route) -> Result<ComparisonReport> {
    recorded.points().first().ok_or_insufficient_points(0, 1)?;
    let samples = recorded_samples(recorded.points());

    let mut segments = Vec::with_capacity(report.segments.len());
    let mut score_sum = 0.0;
    let mut segments_counted = 0;

    for sim in &report.segments {
        let seg = &sim.segment;
        let grade = seg.average_grade_percent();
        let long_enough = seg.distance > MIN_SCORED_SEGMENT;

        let comparison = match recorded_averages(&samples, seg.start_distance, seg.end_distance) {
            Some((power, speed)) => {
                let power_score = metric_score(sim.power, power);
                let speed_score = metric_score(sim.speed, speed);
                let score = combined_score(power_score, speed_score, grade);
                if long_enough {
                    score_sum += score;
                    segments_counted += 1;
                }
                SegmentComparison {
                    start_distance: seg.start_distance,
                    end_distance: seg.end_distance,
                    distance: seg.distance,
                    average_grade: grade,
                    simulated_power: sim.power,
                    simulated_speed: sim.speed,
                    recorded_power: power,
                    recorded_speed: speed,
                    power_score,
                    speed_score,
                    score,
                    has_recording: true,
                    counted: long_enough,
                }
            }
            None => SegmentComparison {
                start_distance: seg.start_distance,
                end_distance: seg.end_distance,
                distance: seg.distance,
                average_grade: grade,
                simulated_power: sim.power,
                simulated_speed: sim.speed,
                recorded_power: 0.0,
                recorded_speed: 0.0,
                power_score: 0.0,
                speed_score: 0.0,
                score: 0.0,
                has_recording: false,
                counted: false,
            },
        };
        segments.push(comparison);
    }

    let mut climbs = Vec::new();
    for climb in &report.climbs {
        let Some((power, speed)) =
            recorded_averages(&samples, climb.start_distance, climb.end_distance)
        else {
            continue;
        };
        if report.segments_in(climb).next().is_none() {
            continue;
        }
        let simulated_power = weighted_average(report.segments_in(climb), |s| s.power);
        let simulated_speed = weighted_average(report.segments_in(climb), |s| s.speed);
        let power_score = metric_score(simulated_power, power);
        let speed_score = metric_score(simulated_speed, speed);

        climbs.push(ClimbComparison {
            ordinal: climb.ordinal,
            name: climb.name.clone(),
            simulated_power,
            simulated_speed,
            recorded_power: power,
            recorded_speed: speed,
            power_score,
            speed_score,
            score: (3.0 * power_score + speed_score) / 4.0,
        });
    }

    let overall_score = if segments_counted > 0 {
        score_sum / segments_counted as f64
    } else {
        0.0
    };
    info!(
        "[Comparison] Overall score {:.0}/100 over {} segments, {} climbs",
        overall_score,
        segments_counted,
        climbs.len()
    );

    Ok(ComparisonReport {
        segments,
        climbs,
        overall_score,
        segments_counted,
    })
}

/// Cut `climb` into `chunk_length` pieces and compare recorded with
/// simulated power on each.
///
/// A chunk covers `[start, end)` of route distance; the last one ends at the
/// climb's end. Fails when `chunk_length` is not positive or nothing was
/// recorded.
pub fn climb_chunk_comparison(
    report: &SimulationReport,
    recorded: &Route,
    climb: &Climb,
    chunk_length: f64,
) -> Result<Vec<ClimbChunkComparison>> {
    ensure_positive("chunk_length", chunk_length)?;
    recorded.points().first().ok_or_insufficient_points(0, 1)?;
    let points = recorded.points();

    let chunk_count = if climb.distance > 0.0 {
        (climb.distance / chunk_length).ceil() as usize
    } else {
        0
    };

    let mut chunks = Vec::with_capacity(chunk_count);
    for k in 0..chunk_count {
        let offset = k as f64 * chunk_length;
        let start = climb.start_distance + offset;
        let end = (start + chunk_length).min(climb.end_distance);

        let inside: Vec<&RoutePoint> = points
            .iter()
            .filter(|p| p.distance >= start && p.distance < end)
            .collect();

        let recorded_grade = match (inside.first(), inside.last()) {
            (Some(first), Some(last)) if last.distance > first.distance => {
                Some((last.elevation - first.elevation) / (last.distance - first.distance) * 100.0)
            }
            _ => None,
        };
        let average_grade = recorded_grade.unwrap_or_else(|| {
            segment_at_distance(report, (start + end) / 2.0)
                .map_or(0.0, |s| s.segment.average_grade_percent())
        });

        let simulated_power = weighted_average(
            report
                .segments
                .iter()
                .filter(|s| s.segment.start_distance < end && s.segment.end_distance > start),
            |s| s.power,
        );

        chunks.push(ClimbChunkComparison {
            offset,
            start_distance: start,
            end_distance: end,
            elevation: points[recorded.index_at_distance(start)].elevation,
            average_grade,
            recorded_power: mean_power(inside.iter().map(|p| p.power)),
            simulated_power,
        });
    }

    debug!(
        "[Comparison] Climb '{}' cut into {} chunks of {:.0} m",
        climb.name,
        chunks.len(),
        chunk_length
    );
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pacing::simulate;
    use crate::segmentation::Segment;
    use crate::{PacingTarget, RoutePacerError, SimulationConfig};
    use chrono::{DateTime, Duration};

    fn course(parts: &[(f64, f64)]) -> Vec<Segment> {
        let mut start = 0.0;
        parts
            .iter()
            .map(|&(length, grade)| {
                let s = Segment {
                    start_index: 0,
                    end_index: 1,
                    start_distance: start,
                    end_distance: start + length,
                    distance: length,
                    elevation_gain: (length * grade).max(0.0),
                    average_grade: grade,
                };
                start += length;
                s
            })
            .collect()
    }

    /// Record a ride that follows the simulation, every 10 m, scaling power by `power_factor`.
    fn replay(report: &SimulationReport, power_factor: f64) -> Route {
        let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let mut points = vec![RoutePoint::new(0.0, 0.0).with_timestamp(t0)];
        let (mut elapsed, mut elevation) = (0.0, 0.0);
        for sim in &report.segments {
            let steps = (sim.segment.distance / 10.0).round() as usize;
            for k in 1..=steps {
                elapsed += 10.0 / sim.speed;
                elevation += 10.0 * sim.segment.average_grade;
                let ms = (elapsed * 1000.0_f64).round() as i64;
                points.push(
                    RoutePoint::new(sim.segment.start_distance + k as f64 * 10.0, elevation)
                        .with_timestamp(t0 + Duration::milliseconds(ms))
                        .with_power(sim.power * power_factor),
                );
            }
        }
        Route::new(points).unwrap()
    }

    fn simulated(parts: &[(f64, f64)]) -> SimulationReport {
        let config = SimulationConfig {
            target: PacingTarget::Power { watts: 220.0 },
            ..SimulationConfig::default()
        };
        simulate(&course(parts), &config).unwrap()
    }

    #[test]
    fn test_metric_score_shape() {
        assert_eq!(metric_score(200.0, 200.0), 100.0);
        assert_eq!(metric_score(200.0, 180.0), 100.0);
        assert_eq!(metric_score(200.0, 220.0), 100.0);
        assert!((metric_score(100.0, 155.0) - 50.0).abs() < 1e-9);
        assert_eq!(metric_score(100.0, 200.0), 0.0);
        assert!((metric_score(100.0, 70.0) - 50.0).abs() < 1e-9);
        assert_eq!(metric_score(100.0, 50.0), 0.0);
        assert_eq!(metric_score(0.0, 100.0), 0.0);
        assert_eq!(metric_score(100.0, 0.0), 0.0);
    }

    #[test]
    fn test_combined_score_on_descent() {
        assert_eq!(combined_score(0.0, 80.0, -6.0), 80.0);
        assert_eq!(combined_score(0.0, 80.0, -5.5), 80.0);
        assert_eq!(combined_score(100.0, 60.0, -5.0), 90.0);
    }

    #[test]
    fn test_faithful_ride_scores_full_marks() {
        let report = simulated(&[(1000.0, 0.0), (1000.0, 0.03), (1000.0, 0.01)]);
        let comparison = compare_with_activity(&report, &replay(&report, 1.0)).unwrap();

        assert_eq!(comparison.segments_counted, 3);
        for seg in &comparison.segments {
            assert!(seg.has_recording);
            assert_eq!(seg.power_score, 100.0);
            assert_eq!(seg.speed_score, 100.0);
        }
        assert_eq!(comparison.overall_score, 100.0);
    }

    #[test]
    fn test_overcooked_power_loses_power_score() {
        let report = simulated(&[(1000.0, 0.0), (1000.0, 0.02)]);
        let comparison = compare_with_activity(&report, &replay(&report, 2.5)).unwrap();
        for seg in &comparison.segments {
            assert_eq!(seg.power_score, 0.0);
            assert_eq!(seg.speed_score, 100.0);
            assert_eq!(seg.score, 25.0);
        }
    }

    #[test]
    fn test_short_segments_not_counted() {
        let report = simulated(&[(1000.0, 0.0), (80.0, 0.02)]);
        let comparison = compare_with_activity(&report, &replay(&report, 1.0)).unwrap();
        assert_eq!(comparison.segments.len(), 2);
        assert!(comparison.segments[0].counted);
        assert!(!comparison.segments[1].counted);
        assert_eq!(comparison.segments_counted, 1);
    }

    #[test]
    fn test_segments_beyond_recording() {
        let report = simulated(&[(1000.0, 0.0), (1000.0, 0.0)]);
        let partial = Route::new(vec![
            RoutePoint::new(0.0, 0.0),
            RoutePoint::new(500.0, 0.0).with_power(200.0),
        ])
        .unwrap();
        let comparison = compare_with_activity(&report, &partial).unwrap();
        assert!(comparison.segments[0].has_recording);
        assert!(!comparison.segments[1].has_recording);
        assert!(!comparison.segments[1].counted);
    }

    #[test]
    fn test_empty_recording_fails() {
        let report = simulated(&[(1000.0, 0.0)]);
        assert!(matches!(
            compare_with_activity(&report, &Route::default()),
            Err(RoutePacerError::InsufficientPoints { .. })
        ));
    }

    fn climb(start: f64, end: f64, gain: f64) -> Climb {
        Climb {
            ordinal: 1,
            name: "Climb 1".to_string(),
            start_index: 0,
            end_index: 1,
            start_distance: start,
            end_distance: end,
            distance: end - start,
            elevation_gain: gain,
            average_grade: gain / (end - start) * 100.0,
        }
    }

    #[test]
    fn test_climb_chunks_follow_recording() {
        let report = simulated(&[(1000.0, 0.0), (1200.0, 0.05), (800.0, 0.02)]);
        let recorded = replay(&report, 1.0);
        let climb_power = report.segments[1].power;

        let chunks =
            climb_chunk_comparison(&report, &recorded, &climb(1100.0, 2200.0, 55.0), DEFAULT_CLIMB_CHUNK)
                .unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].offset, 0.0);
        assert_eq!(chunks[1].offset, 500.0);
        assert!((chunks[2].start_distance - 2100.0).abs() < 1e-9);
        assert!((chunks[2].end_distance - 2200.0).abs() < 1e-9);
        assert!((chunks[0].elevation - 5.0).abs() < 1e-6);
        for chunk in &chunks {
            assert!((chunk.average_grade - 5.0).abs() < 1e-6);
            assert!((chunk.recorded_power - climb_power).abs() < 1e-6);
            assert!((chunk.simulated_power - climb_power).abs() < 1e-6);
        }
    }

    #[test]
    fn test_climb_chunks_without_recording_use_simulation() {
        let report = simulated(&[(1000.0, 0.0), (1200.0, 0.05), (800.0, 0.02)]);
        let partial = Route::new(vec![
            RoutePoint::new(0.0, 100.0),
            RoutePoint::new(500.0, 100.0).with_power(200.0),
        ])
        .unwrap();

        let chunks =
            climb_chunk_comparison(&report, &partial, &climb(1100.0, 2200.0, 55.0), 500.0).unwrap();

        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert_eq!(chunk.recorded_power, 0.0);
            assert!((chunk.average_grade - 5.0).abs() < 1e-9);
            assert!((chunk.simulated_power - report.segments[1].power).abs() < 1e-6);
            assert_eq!(chunk.elevation, 100.0);
        }
    }

    #[test]
    fn test_climb_chunks_reject_bad_length() {
        let report = simulated(&[(1000.0, 0.05)]);
        let recorded = replay(&report, 1.0);
        assert!(climb_chunk_comparison(&report, &recorded, &climb(0.0, 1000.0, 50.0), 0.0).is_err());
    }

    #[test]
    fn test_running_scores() {
        let report = ComparisonReport {
            segments: [100.0, 50.0, 0.0]
                .iter()
                .map(|&score| SegmentComparison {
                    start_distance: 0.0,
                    end_distance: 0.0,
                    distance: 0.0,
                    average_grade: 0.0,
                    simulated_power: 0.0,
                    simulated_speed: 0.0,
                    recorded_power: 0.0,
                    recorded_speed: 0.0,
                    power_score: 0.0,
                    speed_score: 0.0,
                    score,
                    has_recording: true,
                    counted: true,
                })
                .collect(),
            climbs: Vec::new(),
            overall_score: 50.0,
            segments_counted: 3,
        };
        assert_eq!(report.running_scores(), vec![100.0, 75.0, 50.0]);
    }
}
