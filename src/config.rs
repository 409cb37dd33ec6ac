//! Filter and loop configuration.

use serde::{Deserialize, Serialize};

use crate::error::FilterError;

/// Tuning and reference data for [`OrientationEKF`](crate::OrientationEKF).
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use orientation_ekf::EkfConfig;
///
/// let cfg = EkfConfig::from_json(r#"{ "measurement_noise": 0.01 }"#).unwrap();
/// assert_eq!(cfg.measurement_noise, 0.01);
/// assert_eq!(cfg.process_noise, 0.001);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EkfConfig {
    /// Diagonal of the process noise Q (4×4)
    pub process_noise: f64,
    /// Diagonal of the measurement noise R (6×6)
    pub measurement_noise: f64,
    /// Diagonal of the initial error covariance P
    pub initial_covariance: f64,
    /// Gravity direction in the world frame
    pub gravity_reference: [f64; 3],
    /// Magnetic field direction in the world frame
    pub magnetic_reference: [f64; 3],
    /// Nominal time between ticks, in seconds
    pub tick_interval_secs: f64,
}

impl Default for EkfConfig {
    fn default() -> Self {
        Self {
            process_noise: 0.001,
            measurement_noise: 0.001,
            initial_covariance: 1.0,
            gravity_reference: [0.0, 0.0, -1.0],
            magnetic_reference: [1.0, 0.0, 0.0],
            tick_interval_secs: 0.1,
        }
    }
}

const UNIT_TOLERANCE: f64 = 1e-6;

impl EkfConfig {
    /// Parses a JSON configuration; missing fields take their defaults.
    pub fn from_json(s: &str) -> Result<Self, FilterError> {
        serde_json::from_str(s).map_err(|e| FilterError::InvalidConfig(e.to_string()))
    }

    /// Rejects configurations the filter cannot run on.
    pub fn validate(&self) -> Result<(), FilterError> {
        let positive = [
            ("process_noise", self.process_noise),
            ("measurement_noise", self.measurement_noise),
            ("initial_covariance", self.initial_covariance),
            ("tick_interval_secs", self.tick_interval_secs),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(FilterError::InvalidConfig(format!(
                    "{name} must be positive and finite, got {value}"
                )));
            }
        }

        for (name, v) in [
            ("gravity_reference", self.gravity_reference),
            ("magnetic_reference", self.magnetic_reference),
        ] {
            let norm = v.iter().map(|c| c * c).sum::<f64>().sqrt();
            if (norm - 1.0).abs() > UNIT_TOLERANCE {
                return Err(FilterError::InvalidConfig(format!(
                    "{name} must be a unit vector, norm is {norm}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(EkfConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_noise() {
        let cfg = EkfConfig {
            measurement_noise: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(FilterError::InvalidConfig(msg)) if msg.contains("measurement_noise")
        ));
    }

    #[test]
    fn rejects_non_unit_reference() {
        let cfg = EkfConfig {
            magnetic_reference: [0.3, 0.0, 0.0],
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_nan_interval() {
        let cfg = EkfConfig {
            tick_interval_secs: f64::NAN,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn malformed_json_is_config_error() {
        assert!(matches!(
            EkfConfig::from_json("{ not json"),
            Err(FilterError::InvalidConfig(_))
        ));
    }
}
