//! The orientation record handed to transport and presentation.

use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::kinematics::{euler_angles, rotation_matrix};
use crate::matrix::Matrix;

/// Attitude of one filter cycle: Euler angles in degrees plus the body→world
/// rotation matrix.
///
/// Serialized as flat, field-named JSON:
/// `{"yaw":..,"pitch":..,"roll":..,"rotationMatrix":[[..],[..],[..]]}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrientationRecord {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
    pub rotation_matrix: [[f64; 3]; 3],
}

impl Default for OrientationRecord {
    fn default() -> Self {
        Self::identity()
    }
}

impl OrientationRecord {
    /// Zero angles and the identity rotation.
    pub fn identity() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            roll: 0.0,
            rotation_matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    /// Builds the record for a unit quaternion `[w, x, y, z]` (4×1).
    pub fn from_quaternion(q: &Matrix) -> Self {
        let angles = euler_angles(q);
        Self {
            yaw: angles.yaw,
            pitch: angles.pitch,
            roll: angles.roll,
            rotation_matrix: rotation_matrix(q).to_array::<3, 3>(),
        }
    }

    pub fn to_json(&self) -> Result<String, TransportError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, TransportError> {
        Ok(serde_json::from_str(s)?)
    }
}
