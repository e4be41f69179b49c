//! # Pacing Engine
//!
//! Distributes a global power or speed target over the segments of a route.
//!
//! ## Algorithm
//! 1. Seed every segment from the target with a grade-dependent multiplier
//! 2. Damped fixed-point iteration (at most `max_iterations` rounds):
//!    - power mode: solve speed from power, measure the time-weighted
//!      average power, scale every segment's power towards the target
//!    - speed mode: measure the distance-weighted average speed, scale
//!      every segment's speed towards the target
//! 3. Speed mode back-computes power from the final speeds
//! 4. One forward pass in travel order threads W′ balance and metabolic
//!    cost through the segments and samples the running average speed
//!
//! Non-convergence is not an error: the last iterate is kept and flagged
//! in [`SimulationSummary::converged`].

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::climbs::{detect_climbs, Climb};
use crate::config::SimulationConfig;
use crate::error::{ensure_positive, OptionExt, Result, RoutePacerError};
use crate::physics::{
    ensure_efficiency, has_unique_solution, metabolic_kcal, power_from_speed,
    solve_speed_from_power, update_w_prime, PhysicsParams, RiderParams, SolverConfig,
};
use crate::segmentation::{segment_by_slope, Segment};
use crate::slope::smooth_slopes;
use crate::Route;

/// Floor for any assigned segment power (W).
const MIN_SEGMENT_POWER: f64 = 1.0;
/// Samples used when checking a segment's power curve for multiple roots.
const UNIQUENESS_SAMPLES: usize = 64;

/// What the rider aims to hold on average.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PacingTarget {
    /// Time-weighted average power in watts
    Power { watts: f64 },
    /// Distance-weighted average speed in m/s
    Speed { meters_per_second: f64 },
}

impl Default for PacingTarget {
    fn default() -> Self {
        PacingTarget::Power { watts: 250.0 }
    }
}

impl PacingTarget {
    pub fn validate(&self) -> Result<()> {
        let (name, value) = match *self {
            PacingTarget::Power { watts } => ("power", watts),
            PacingTarget::Speed { meters_per_second } => ("speed", meters_per_second),
        };
        if value.is_finite() && value > 0.0 {
            Ok(())
        } else {
            Err(RoutePacerError::InvalidTarget { name, value })
        }
    }
}

/// Tuning of the pacing iteration and its seeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Maximum fixed-point rounds
    pub max_iterations: u32,
    /// Fraction of the correction applied per round
    pub damping: f64,
    /// Relative error at which the iteration stops
    pub convergence_tolerance: f64,
    /// Wheel power / pedal power
    pub transmission_efficiency: f64,
    /// Hard speed cap (m/s)
    pub max_speed: f64,
    /// Grade span (%) over which the seed biases below apply in full
    pub grade_reference: f64,
    /// Extra power per `grade_reference` of climbing
    pub uphill_power_bias: f64,
    /// Power reduction per `grade_reference` of descent
    pub downhill_power_cut: f64,
    /// Lowest power multiplier outside coasting
    pub min_power_factor: f64,
    /// Grades (%) below this are coasted
    pub coasting_grade: f64,
    /// Power while coasting (W)
    pub coasting_power: f64,
    /// Grade (%) magnitude cap for power seeding
    pub max_seed_grade: f64,
    /// Speed reduction per `grade_reference` of climbing
    pub uphill_speed_cut: f64,
    /// Speed gain per `grade_reference` of descent
    pub downhill_speed_boost: f64,
    pub min_speed_factor: f64,
    pub max_speed_factor: f64,
    /// Lowest seeded or corrected speed in speed mode (m/s)
    pub min_target_speed: f64,
    /// Interval between speed history samples (s)
    pub speed_history_step: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            max_iterations: 12,
            damping: 0.8,
            convergence_tolerance: 0.001, // 0.1 %
            transmission_efficiency: 0.97,
            max_speed: 100.0 / 3.6,
            grade_reference: 5.0,
            uphill_power_bias: 0.18,
            downhill_power_cut: 0.25,
            min_power_factor: 0.4,
            coasting_grade: -8.0,
            coasting_power: 30.0,
            max_seed_grade: 20.0,
            uphill_speed_cut: 0.12,
            downhill_speed_boost: 0.2,
            min_speed_factor: 0.45,
            max_speed_factor: 1.8,
            min_target_speed: 0.5,
            speed_history_step: 60.0,
        }
    }
}

impl PacingConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("pacing.max_speed", self.max_speed)?;
        ensure_positive("pacing.convergence_tolerance", self.convergence_tolerance)?;
        ensure_positive("pacing.grade_reference", self.grade_reference)?;
        ensure_positive("pacing.min_target_speed", self.min_target_speed)?;
        ensure_positive("pacing.speed_history_step", self.speed_history_step)?;
        ensure_efficiency("pacing.damping", self.damping)?;
        ensure_efficiency("pacing.transmission_efficiency", self.transmission_efficiency)?;
        if self.max_iterations == 0 {
            return Err(RoutePacerError::InvalidParameter {
                name: "pacing.max_iterations",
                value: 0.0,
                message: "at least one iteration is required".to_string(),
            });
        }
        Ok(())
    }

    /// Seed power for a segment at `grade_percent`.
    pub fn seed_power(&self, target: f64, grade_percent: f64) -> f64 {
        let grade = grade_percent.clamp(-self.max_seed_grade, self.max_seed_grade);
        let factor = if grade < self.coasting_grade {
            self.coasting_power / target
        } else if grade > 0.0 {
            (1.0 + self.uphill_power_bias * grade / self.grade_reference).max(self.min_power_factor)
        } else {
            (1.0 + self.downhill_power_cut * grade / self.grade_reference).max(self.min_power_factor)
        };
        (target * factor).max(MIN_SEGMENT_POWER)
    }

    /// Seed speed for a segment at `grade_percent`.
    pub fn seed_speed(&self, target: f64, grade_percent: f64) -> f64 {
        let factor = if grade_percent > 0.0 {
            1.0 - self.uphill_speed_cut * grade_percent / self.grade_reference
        } else {
            1.0 + self.downhill_speed_boost * grade_percent.abs() / self.grade_reference
        };
        let factor = factor.clamp(self.min_speed_factor, self.max_speed_factor);
        (target * factor).max(self.min_target_speed)
    }

    fn is_converged(&self, achieved: f64, target: f64) -> bool {
        ((achieved - target) / target).abs() < self.convergence_tolerance
    }

    fn damped(&self, value: f64, scale: f64) -> f64 {
        value * (1.0 + (scale - 1.0) * self.damping)
    }
}

/// A segment with its simulated ride.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedSegment {
    #[serde(flatten)]
    pub segment: Segment,
    /// Assigned pedal power (W)
    pub power: f64,
    /// Resulting speed (m/s)
    pub speed: f64,
    /// Time to ride the segment (s)
    pub duration: f64,
    /// Metabolic energy (kcal)
    pub kcal: f64,
    /// W′ balance entering the segment (J)
    pub w_prime_start: f64,
    /// W′ balance leaving the segment (J)
    pub w_prime_end: f64,
}

/// Running average speed at a point in simulated time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedSample {
    /// Elapsed time (s)
    pub time: f64,
    /// Distance covered (m)
    pub distance: f64,
    /// Speed of the segment being ridden (m/s)
    pub speed: f64,
    /// Distance / time so far (m/s)
    pub average_speed: f64,
}

/// Route-level aggregates of a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    /// Total time (s)
    pub total_time: f64,
    /// Total distance (m)
    pub total_distance: f64,
    /// Total distance / total time (m/s)
    pub average_speed: f64,
    /// Time-weighted average power over segments with power (W)
    pub average_power: f64,
    pub total_kcal: f64,
    /// Whether the target was met within tolerance
    pub converged: bool,
    /// Fixed-point rounds actually run
    pub iterations: u32,
    /// Lowest W′ balance reached (J)
    pub min_w_prime: f64,
    /// W′ balance at the finish (J)
    pub final_w_prime: f64,
}

/// Full result of a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub segments: Vec<SimulatedSegment>,
    pub climbs: Vec<Climb>,
    pub summary: SimulationSummary,
    pub speed_history: Vec<SpeedSample>,
}

impl SimulationReport {
    /// Serialize the report as JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Simulated segments overlapping a climb.
    pub fn segments_in<'a>(&'a self, climb: &'a Climb) -> impl Iterator<Item = &'a SimulatedSegment> {
        self.segments
            .iter()
            .filter(move |s| climb.overlaps(s.segment.start_distance, s.segment.end_distance))
    }
}

/// Power and speed settled by the iteration, before the fatigue pass.
struct Assignment {
    power: f64,
    speed: f64,
}

/// Outcome of the fixed-point iteration.
struct Convergence {
    assignments: Vec<Assignment>,
    converged: bool,
    iterations: u32,
}

/// Simulate riding the given segments in order.
///
/// Fails with [`RoutePacerError::EmptyRoute`] when there are no segments,
/// and with a validation error when the configuration is out of range.
pub fn simulate(segments: &[Segment], config: &SimulationConfig) -> Result<SimulationReport> {
    config.validate()?;
    if segments.is_empty() {
        return Err(RoutePacerError::EmptyRoute);
    }

    let physics = config.rider.physics();
    let run = match config.target {
        PacingTarget::Power { watts } => {
            pace_to_power(segments, watts, &physics, &config.pacing, &config.solver)
        }
        PacingTarget::Speed { meters_per_second } => {
            pace_to_speed(segments, meters_per_second, &physics, &config.pacing)
        }
    };

    if !run.converged {
        warn!(
            "[Pacing] Target not reached within {} iterations, keeping last iterate",
            run.iterations
        );
    }

    let (simulated, speed_history) =
        fatigue_pass(segments, &run.assignments, &config.rider, &config.pacing);
    let summary = summarize(&simulated, &run, config.rider.w_prime_max);

    info!(
        "[Pacing] {} segments: {:.0}s, {:.2} m/s, {:.0}W avg, {:.0} kcal, min W' {:.0}J",
        simulated.len(),
        summary.total_time,
        summary.average_speed,
        summary.average_power,
        summary.total_kcal,
        summary.min_w_prime
    );

    Ok(SimulationReport {
        segments: simulated,
        climbs: Vec::new(),
        summary,
        speed_history,
    })
}

/// Run the whole pipeline on a route: smooth, segment, detect climbs, pace.
///
/// The route's slope fields are rewritten in place; everything else is
/// recomputed from scratch on each call.
///
/// # Example
/// ```
/// use route_pacer::{simulate_route, PacingTarget, Route, RoutePoint, SimulationConfig};
///
/// let points = (0..=100).map(|i| RoutePoint::new(i as f64 * 100.0, 0.0)).collect();
/// let mut route = Route::new(points).unwrap();
/// let config = SimulationConfig {
///     target: PacingTarget::Speed { meters_per_second: 8.0 },
///     ..SimulationConfig::default()
/// };
///
/// let report = simulate_route(&mut route, &config).unwrap();
/// assert!((report.summary.average_speed - 8.0).abs() < 0.01);
/// assert!(report.summary.converged);
/// ```
pub fn simulate_route(route: &mut Route, config: &SimulationConfig) -> Result<SimulationReport> {
    config.validate()?;
    if route.len() < 2 {
        return Err(RoutePacerError::InsufficientPoints {
            point_count: route.len(),
            minimum_required: 2,
        });
    }

    smooth_slopes(route, config.smoothing_window);
    let segments = segment_by_slope(route, &config.segmentation);
    let climbs = detect_climbs(route, &config.climbs);

    let mut report = simulate(&segments, config)?;
    report.climbs = climbs;
    Ok(report)
}

fn pace_to_power(
    segments: &[Segment],
    target: f64,
    physics: &PhysicsParams,
    pacing: &PacingConfig,
    solver: &SolverConfig,
) -> Convergence {
    let mut powers: Vec<f64> = segments
        .iter()
        .map(|s| pacing.seed_power(target, s.average_grade_percent()))
        .collect();
    let mut speeds = vec![0.0; segments.len()];
    let mut converged = false;
    let mut iterations = 0;

    for round in 0..pacing.max_iterations {
        iterations = round + 1;
        let mut work = 0.0;
        let mut time = 0.0;

        for ((segment, &power), speed) in segments.iter().zip(&powers).zip(speeds.iter_mut()) {
            let wheel = power * pacing.transmission_efficiency;
            *speed = solve_speed_from_power(wheel, segment.average_grade, physics, solver)
                .min(pacing.max_speed);
            let duration = segment.distance / *speed;
            work += power * duration;
            time += duration;
        }

        // All segments zero-length: nothing to average
        if time <= 0.0 {
            break;
        }
        let achieved = work / time;
        debug!(
            "[Pacing] Power round {}: achieved {:.2}W (target {:.1}W)",
            iterations, achieved, target
        );

        if pacing.is_converged(achieved, target) {
            converged = true;
            break;
        }
        if iterations == pacing.max_iterations {
            break;
        }

        let scale = target / achieved;
        for power in powers.iter_mut() {
            *power = pacing.damped(*power, scale).max(MIN_SEGMENT_POWER);
        }
    }

    for (segment, &power) in segments.iter().zip(&powers) {
        let wheel = power * pacing.transmission_efficiency;
        if !has_unique_solution(wheel, segment.average_grade, physics, solver, UNIQUENESS_SAMPLES) {
            warn!(
                "[Pacing] Segment {:.0}m-{:.0}m: power curve has several speeds for {:.0}W",
                segment.start_distance, segment.end_distance, wheel
            );
        }
    }

    info!(
        "[Pacing] Power mode: {} iterations, converged={}",
        iterations, converged
    );

    Convergence {
        assignments: powers
            .into_iter()
            .zip(speeds)
            .map(|(power, speed)| Assignment { power, speed })
            .collect(),
        converged,
        iterations,
    }
}

fn pace_to_speed(
    segments: &[Segment],
    target: f64,
    physics: &PhysicsParams,
    pacing: &PacingConfig,
) -> Convergence {
    let mut speeds: Vec<f64> = segments
        .iter()
        .map(|s| pacing.seed_speed(target, s.average_grade_percent()))
        .collect();
    let total_distance: f64 = segments.iter().map(|s| s.distance).sum();
    let mut converged = false;
    let mut iterations = 0;

    for round in 0..pacing.max_iterations {
        iterations = round + 1;
        for speed in speeds.iter_mut() {
            *speed = speed.min(pacing.max_speed);
        }

        if total_distance <= 0.0 {
            break;
        }
        let achieved = segments
            .iter()
            .zip(&speeds)
            .map(|(s, v)| v * s.distance)
            .sum::<f64>()
            / total_distance;
        debug!(
            "[Pacing] Speed round {}: achieved {:.3} m/s (target {:.3} m/s)",
            iterations, achieved, target
        );

        if pacing.is_converged(achieved, target) {
            converged = true;
            break;
        }
        if iterations == pacing.max_iterations {
            break;
        }

        let scale = target / achieved;
        for speed in speeds.iter_mut() {
            *speed = pacing.damped(*speed, scale).max(pacing.min_target_speed);
        }
    }

    info!(
        "[Pacing] Speed mode: {} iterations, converged={}",
        iterations, converged
    );

    let assignments = segments
        .iter()
        .zip(speeds)
        .map(|(segment, speed)| {
            let wheel = power_from_speed(speed, segment.average_grade, physics);
            Assignment {
                power: (wheel / pacing.transmission_efficiency).max(0.0),
                speed,
            }
        })
        .collect();

    Convergence {
        assignments,
        converged,
        iterations,
    }
}

/// Thread W′ and metabolic cost through the segments in travel order, once.
fn fatigue_pass(
    segments: &[Segment],
    assignments: &[Assignment],
    rider: &RiderParams,
    pacing: &PacingConfig,
) -> (Vec<SimulatedSegment>, Vec<SpeedSample>) {
    let mut w_prime = rider.w_prime_max;
    let mut elapsed = 0.0;
    let mut covered = 0.0;
    let mut next_sample = pacing.speed_history_step;
    let mut history = Vec::new();
    let mut simulated = Vec::with_capacity(segments.len());

    for (segment, assignment) in segments.iter().zip(assignments) {
        let duration = segment.distance / assignment.speed;
        let w_prime_start = w_prime;
        w_prime = update_w_prime(
            assignment.power,
            duration,
            w_prime,
            rider.critical_power,
            rider.w_prime_max,
            rider.recovery_tau,
        );

        // Speed is constant within a segment, so step samples interpolate linearly.
        let segment_end = elapsed + duration;
        while next_sample <= segment_end {
            let distance = covered + assignment.speed * (next_sample - elapsed);
            history.push(SpeedSample {
                time: next_sample,
                distance,
                speed: assignment.speed,
                average_speed: distance / next_sample,
            });
            next_sample += pacing.speed_history_step;
        }
        elapsed = segment_end;
        covered += segment.distance;
        let already_sampled = history.last().is_some_and(|s| s.time == elapsed);
        if elapsed > 0.0 && !already_sampled {
            history.push(SpeedSample {
                time: elapsed,
                distance: covered,
                speed: assignment.speed,
                average_speed: covered / elapsed,
            });
        }

        simulated.push(SimulatedSegment {
            segment: segment.clone(),
            power: assignment.power,
            speed: assignment.speed,
            duration,
            kcal: metabolic_kcal(assignment.power, duration, rider.muscular_efficiency),
            w_prime_start,
            w_prime_end: w_prime,
        });
    }

    (simulated, history)
}

fn summarize(segments: &[SimulatedSegment], run: &Convergence, w_prime_max: f64) -> SimulationSummary {
    let total_time: f64 = segments.iter().map(|s| s.duration).sum();
    let total_distance: f64 = segments.iter().map(|s| s.segment.distance).sum();
    let total_kcal: f64 = segments.iter().map(|s| s.kcal).sum();

    let (work, powered_time) = segments
        .iter()
        .filter(|s| s.power > 0.0 && s.duration > 0.0)
        .fold((0.0, 0.0), |(w, t), s| (w + s.power * s.duration, t + s.duration));

    let min_w_prime = segments
        .iter()
        .map(|s| s.w_prime_end)
        .fold(w_prime_max, f64::min);
    let final_w_prime = segments.last().map_or(w_prime_max, |s| s.w_prime_end);

    SimulationSummary {
        total_time,
        total_distance,
        average_speed: if total_time > 0.0 { total_distance / total_time } else { 0.0 },
        average_power: if powered_time > 0.0 { work / powered_time } else { 0.0 },
        total_kcal,
        converged: run.converged,
        iterations: run.iterations,
        min_w_prime,
        final_w_prime,
    }
}

/// Simulated segment containing the given route distance.
pub fn segment_at_distance(report: &SimulationReport, distance: f64) -> Result<&SimulatedSegment> {
    report
        .segments
        .iter()
        .find(|s| distance >= s.segment.start_distance && distance <= s.segment.end_distance)
        .ok_or_internal("distance lies outside the simulated route")
}
