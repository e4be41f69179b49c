//! Unified error handling for the route-pacer library.
//!
//! Only input problems are errors. Numerical saturation in the speed solver
//! and pacing runs that stop short of the tolerance are reported as data.

use thiserror::Error;

/// Unified error type for route-pacer operations.
#[derive(Debug, Error)]
pub enum RoutePacerError {
    /// Route has insufficient points for processing
    #[error("Route has {point_count} points, minimum {minimum_required} required")]
    InsufficientPoints {
        point_count: usize,
        minimum_required: usize,
    },
    /// Segmentation produced nothing to simulate
    #[error("Route is empty: no segments to simulate")]
    EmptyRoute,
    /// Route point data is inconsistent
    #[error("Invalid route point {index}: {message}")]
    InvalidRoute { index: usize, message: String },
    /// Pacing target is not usable
    #[error("Target {name} must be positive, got {value}")]
    InvalidTarget { name: &'static str, value: f64 },
    /// Rider, physics or detection parameter out of range
    #[error("Invalid parameter {name} = {value}: {message}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        message: String,
    },
    /// Configuration could not be read or written
    #[error("Configuration error: {message}")]
    Config { message: String },
    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<serde_json::Error> for RoutePacerError {
    fn from(err: serde_json::Error) -> Self {
        RoutePacerError::Config {
            message: err.to_string(),
        }
    }
}

/// Result type alias for route-pacer operations.
pub type Result<T> = std::result::Result<T, RoutePacerError>;

/// Extension trait for converting Option to RoutePacerError.
pub trait OptionExt<T> {
    /// Convert Option to Result with insufficient points error.
    fn ok_or_insufficient_points(self, point_count: usize, minimum: usize) -> Result<T>;

    /// Convert Option to Result with generic internal error.
    fn ok_or_internal(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_insufficient_points(self, point_count: usize, minimum: usize) -> Result<T> {
        self.ok_or(RoutePacerError::InsufficientPoints {
            point_count,
            minimum_required: minimum,
        })
    }

    fn ok_or_internal(self, message: &str) -> Result<T> {
        self.ok_or_else(|| RoutePacerError::Internal {
            message: message.to_string(),
        })
    }
}

/// Fail with `InvalidParameter` unless `value` is finite and strictly positive.
pub(crate) fn ensure_positive(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(RoutePacerError::InvalidParameter {
            name,
            value,
            message: "must be a positive number".to_string(),
        })
    }
}

/// Fail with `InvalidParameter` unless `value` is finite and not negative.
pub(crate) fn ensure_non_negative(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(RoutePacerError::InvalidParameter {
            name,
            value,
            message: "must not be negative".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RoutePacerError::InsufficientPoints {
            point_count: 1,
            minimum_required: 2,
        };
        assert!(err.to_string().contains("1 points"));
        assert!(err.to_string().contains("minimum 2"));
    }

    #[test]
    fn test_option_ext() {
        let none: Option<i32> = None;
        let result = none.ok_or_insufficient_points(0, 2);
        assert!(matches!(
            result,
            Err(RoutePacerError::InsufficientPoints { .. })
        ));
        assert_eq!(Some(3).ok_or_internal("unused").unwrap(), 3);
    }

    #[test]
    fn test_ensure_positive() {
        assert!(ensure_positive("cp", 250.0).is_ok());
        assert!(ensure_positive("cp", 0.0).is_err());
        assert!(ensure_positive("cp", f64::NAN).is_err());
        assert!(ensure_non_negative("gap", 0.0).is_ok());
        assert!(ensure_non_negative("gap", -1.0).is_err());
    }

    #[test]
    fn test_json_error_maps_to_config() {
        let err: RoutePacerError = serde_json::from_str::<f64>("nope").unwrap_err().into();
        assert!(matches!(err, RoutePacerError::Config { .. }));
    }
}
