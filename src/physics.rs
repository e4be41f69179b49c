//! Cycling power model and its numerical inverse.
//!
//! The forward model is closed-form: rolling resistance, the gravity
//! component and aerodynamic drag against the relative air speed, times
//! road speed, plus a fixed drivetrain loss. The inverse solves
//! `power_from_speed(v) = P` by bisection on a fixed speed bracket.
//!
//! Also hosts the per-segment energy primitives used by the pacing engine:
//! metabolic cost and the W′ balance recurrence.

use serde::{Deserialize, Serialize};

use crate::error::{ensure_non_negative, ensure_positive, Result, RoutePacerError};

/// Gravitational acceleration used by the model (m/s²).
pub const GRAVITY: f64 = 9.81;
/// Sea-level air density (kg/m³).
pub const DEFAULT_AIR_DENSITY: f64 = 1.225;
/// Constant drivetrain/bearing loss added to every power estimate (W).
pub const MECHANICAL_LOSS_WATTS: f64 = 3.0;
/// Joules per kilocalorie.
pub const JOULES_PER_KCAL: f64 = 4184.0;
/// Largest wind magnitude accepted by validation (m/s).
pub const MAX_WIND_SPEED: f64 = 15.0;
/// Rolling resistance is reduced by this fraction per unit of slope.
const ROLLING_SLOPE_FACTOR: f64 = 0.15;
/// Floor applied to power before the W′ recurrence (W).
const MIN_W_PRIME_POWER: f64 = 0.1;

/// Rider, bike and environment parameters. Immutable for a simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiderParams {
    /// Rider mass in kilograms
    pub rider_mass: f64,
    /// Bike mass in kilograms
    pub bike_mass: f64,
    /// Rolling resistance coefficient
    pub crr: f64,
    /// Drag coefficient times frontal area (m²)
    pub cda: f64,
    /// Air density (kg/m³)
    pub air_density: f64,
    /// Wind along the direction of travel (m/s), positive = headwind
    pub wind_speed: f64,
    /// Mechanical output / metabolic input
    pub muscular_efficiency: f64,
    /// Critical power (W)
    pub critical_power: f64,
    /// Anaerobic work capacity above CP (J)
    pub w_prime_max: f64,
    /// W′ recovery time constant (s)
    pub recovery_tau: f64,
}

impl Default for RiderParams {
    fn default() -> Self {
        Self {
            rider_mass: 68.0,
            bike_mass: 8.0,
            crr: 0.0045,
            cda: 0.39,
            air_density: DEFAULT_AIR_DENSITY,
            wind_speed: 0.0,
            muscular_efficiency: 0.24,
            critical_power: 260.0,
            w_prime_max: 20_000.0,
            recovery_tau: 500.0,
        }
    }
}

impl RiderParams {
    /// Rider plus bike mass in kilograms.
    pub fn total_mass(&self) -> f64 {
        self.rider_mass + self.bike_mass
    }

    /// The subset of parameters the power model needs.
    pub fn physics(&self) -> PhysicsParams {
        PhysicsParams {
            mass: self.total_mass(),
            crr: self.crr,
            cda: self.cda,
            air_density: self.air_density,
            wind_speed: self.wind_speed,
        }
    }

    /// Check every parameter against its physical range.
    pub fn validate(&self) -> Result<()> {
        ensure_positive("rider_mass", self.rider_mass)?;
        ensure_non_negative("bike_mass", self.bike_mass)?;
        ensure_non_negative("crr", self.crr)?;
        ensure_positive("cda", self.cda)?;
        ensure_positive("air_density", self.air_density)?;
        ensure_positive("critical_power", self.critical_power)?;
        ensure_positive("w_prime_max", self.w_prime_max)?;
        ensure_positive("recovery_tau", self.recovery_tau)?;
        ensure_efficiency("muscular_efficiency", self.muscular_efficiency)?;

        if !self.wind_speed.is_finite() || self.wind_speed.abs() > MAX_WIND_SPEED {
            return Err(RoutePacerError::InvalidParameter {
                name: "wind_speed",
                value: self.wind_speed,
                message: format!("magnitude must not exceed {} m/s", MAX_WIND_SPEED),
            });
        }
        Ok(())
    }
}

/// Fail unless `value` lies in (0, 1].
pub(crate) fn ensure_efficiency(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(RoutePacerError::InvalidParameter {
            name,
            value,
            message: "must lie in (0, 1]".to_string(),
        })
    }
}

/// Inputs to the power model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsParams {
    /// Total system mass (kg)
    pub mass: f64,
    pub crr: f64,
    pub cda: f64,
    pub air_density: f64,
    /// Positive = headwind (m/s)
    pub wind_speed: f64,
}

impl PhysicsParams {
    /// Model parameters with sea-level air and no wind.
    pub fn still_air(mass: f64, crr: f64, cda: f64) -> Self {
        Self {
            mass,
            crr,
            cda,
            air_density: DEFAULT_AIR_DENSITY,
            wind_speed: 0.0,
        }
    }
}

/// Bracket and tolerances of the bisection speed solver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Lower speed bound (m/s)
    pub min_speed: f64,
    /// Upper speed bound (m/s), ≈120 km/h
    pub max_speed: f64,
    /// Fixed number of halvings
    pub iterations: u32,
    /// Early exit once |P(v) − P| is below this (W)
    pub power_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            min_speed: 0.1,
            max_speed: 33.3,
            iterations: 20,
            power_tolerance: 0.1,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("solver.min_speed", self.min_speed)?;
        ensure_positive("solver.max_speed", self.max_speed)?;
        ensure_positive("solver.power_tolerance", self.power_tolerance)?;
        if self.max_speed <= self.min_speed {
            return Err(RoutePacerError::InvalidParameter {
                name: "solver.max_speed",
                value: self.max_speed,
                message: format!("must exceed min_speed ({})", self.min_speed),
            });
        }
        Ok(())
    }
}

/// Power (W) needed to hold `speed` (m/s) on `slope` (fraction, 0.08 = 8 %).
///
/// Never negative: a descent steep enough to push the rider returns 0.
///
/// # Example
/// ```
/// use route_pacer::physics::{power_from_speed, PhysicsParams};
///
/// let params = PhysicsParams::still_air(76.0, 0.0045, 0.39);
/// let flat = power_from_speed(9.0, 0.0, &params);
/// let climb = power_from_speed(9.0, 0.05, &params);
/// assert!(climb > flat);
/// ```
pub fn power_from_speed(speed: f64, slope: f64, params: &PhysicsParams) -> f64 {
    let theta = slope.atan();
    let (sin_t, cos_t) = theta.sin_cos();

    let crr_effective = params.crr * (1.0 - ROLLING_SLOPE_FACTOR * slope);
    let rolling = params.mass * GRAVITY * crr_effective * cos_t;
    let gravity = params.mass * GRAVITY * sin_t;

    let relative_air = speed + params.wind_speed;
    let drag = 0.5 * params.air_density * params.cda * relative_air * relative_air * relative_air.signum();

    let total = (rolling + gravity + drag) * speed + MECHANICAL_LOSS_WATTS;
    total.max(0.0)
}

/// Speed (m/s) at which `power_from_speed` matches `wheel_power` (W).
///
/// Saturates at the bracket: returns `max_speed` when even that speed needs
/// less than `wheel_power`, and `min_speed` when the slowest speed already
/// needs more. Saturation is an approximation, not an error.
pub fn solve_speed_from_power(
    wheel_power: f64,
    slope: f64,
    params: &PhysicsParams,
    solver: &SolverConfig,
) -> f64 {
    let residual = |v: f64| power_from_speed(v, slope, params) - wheel_power;

    let mut lo = solver.min_speed;
    let mut hi = solver.max_speed;
    let f_lo = residual(lo);
    let f_hi = residual(hi);

    if f_hi < 0.0 {
        return hi;
    }
    if f_lo > 0.0 {
        return lo;
    }

    for _ in 0..solver.iterations {
        let mid = (lo + hi) / 2.0;
        let f_mid = residual(mid);

        if f_mid.abs() < solver.power_tolerance {
            return mid;
        }
        if f_mid * f_lo > 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    (lo + hi) / 2.0
}

/// Whether `power_from_speed` crosses `wheel_power` at most once over the
/// solver bracket, sampled at `samples` evenly spaced speeds.
///
/// Strong tailwinds combined with descents can fold the power curve so the
/// bisection bracket holds several roots; callers use this to flag segments
/// whose solved speed may be the wrong root.
pub fn has_unique_solution(
    wheel_power: f64,
    slope: f64,
    params: &PhysicsParams,
    solver: &SolverConfig,
    samples: usize,
) -> bool {
    let samples = samples.max(2);
    let step = (solver.max_speed - solver.min_speed) / (samples - 1) as f64;
    let mut crossings = 0;
    let mut previous_sign = 0.0;

    for k in 0..samples {
        let v = solver.min_speed + step * k as f64;
        let residual = power_from_speed(v, slope, params) - wheel_power;
        // The bracket's lower end is classified like the solver does, with no tolerance
        let sign = if k == 0 {
            if residual > 0.0 {
                1.0
            } else {
                -1.0
            }
        } else if residual.abs() < solver.power_tolerance {
            0.0
        } else {
            residual.signum()
        };
        if sign != 0.0 {
            if previous_sign != 0.0 && sign != previous_sign {
                crossings += 1;
            }
            previous_sign = sign;
        }
    }

    crossings <= 1
}

/// Metabolic energy (kcal) for holding `power` W over `duration` s.
pub fn metabolic_kcal(power: f64, duration: f64, muscular_efficiency: f64) -> f64 {
    if muscular_efficiency == 0.0 {
        return 0.0;
    }
    let metabolic_watts = power / muscular_efficiency;
    metabolic_watts * duration / JOULES_PER_KCAL
}

/// W′ balance after riding `power` W for `duration` s from `w_prime` J.
///
/// Above CP the reserve drains linearly and floors at 0; at or below CP it
/// recovers exponentially towards `w_prime_max` with time constant `tau`.
/// The result always lies in `[0, w_prime_max]`.
pub fn update_w_prime(
    power: f64,
    duration: f64,
    w_prime: f64,
    critical_power: f64,
    w_prime_max: f64,
    tau: f64,
) -> f64 {
    let power = power.max(MIN_W_PRIME_POWER);

    if power > critical_power {
        (w_prime - (power - critical_power) * duration).max(0.0)
    } else {
        let deficit = (w_prime_max - w_prime) * (-duration / tau).exp();
        (w_prime_max - deficit).clamp(0.0, w_prime_max)
    }
}
