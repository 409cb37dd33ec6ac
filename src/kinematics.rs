//! Quaternion → rotation matrix and quaternion → Euler angle conversions.
//!
//! Neither function normalizes its input. A non-unit quaternion yields a
//! matrix scaled by `‖q‖²`.

use serde::{Deserialize, Serialize};

use crate::matrix::Matrix;
use crate::quaternion_utils::components;

/// Yaw/pitch/roll in **degrees**.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EulerAngles {
    /// Rotation about Z
    pub yaw: f64,
    /// Rotation about Y, in [-90, 90]
    pub pitch: f64,
    /// Rotation about X
    pub roll: f64,
}

/// Body→world direction-cosine matrix of a quaternion `[w, x, y, z]`.
///
/// # Arguments
/// * `q` - Unit quaternion, 4×1
///
/// # Returns
/// 3×3 rotation matrix `R(q)`; `R(q)ᵀ` maps world vectors into the body frame
///
pub fn rotation_matrix(q: &Matrix) -> Matrix {
    let (w, x, y, z) = components(q);
    let (ww, xx, yy, zz) = (w * w, x * x, y * y, z * z);
    Matrix::from_array([
        [
            ww + xx - yy - zz,
            2.0 * (x * y - w * z),
            2.0 * (x * z + w * y),
        ],
        [
            2.0 * (x * y + w * z),
            ww - xx + yy - zz,
            2.0 * (y * z - w * x),
        ],
        [
            2.0 * (x * z - w * y),
            2.0 * (y * z + w * x),
            ww - xx - yy + zz,
        ],
    ])
}

/// Z-Y-X Euler decomposition of a quaternion, in degrees.
///
/// The `asin` argument for pitch is clamped to `[-1, 1]`, so quaternions at or
/// numerically past gimbal lock give exactly ±90° instead of NaN.
pub fn euler_angles(q: &Matrix) -> EulerAngles {
    let (w, x, y, z) = components(q);

    let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));
    let pitch = (2.0 * (w * y - z * x)).clamp(-1.0, 1.0).asin();
    let yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));

    EulerAngles {
        yaw: yaw.to_degrees(),
        pitch: pitch.to_degrees(),
        roll: roll.to_degrees(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quaternion_utils::{identity_quaternion, quaternion_from_euler};
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_1_SQRT_2;

    #[test]
    fn identity_quaternion_gives_identity_matrix() {
        assert_eq!(rotation_matrix(&identity_quaternion()), Matrix::identity(3));
        let angles = euler_angles(&identity_quaternion());
        assert_eq!(angles, EulerAngles::default());
    }

    #[test]
    fn quarter_turn_about_z() {
        let q = Matrix::column(&[FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2]);
        let r = rotation_matrix(&q);
        // Body x-axis lands on world y-axis
        let bx = &r * &Matrix::column(&[1.0, 0.0, 0.0]);
        assert_abs_diff_eq!(bx, Matrix::column(&[0.0, 1.0, 0.0]), epsilon = 1e-12);

        let angles = euler_angles(&q);
        assert_abs_diff_eq!(angles.yaw, 90.0, epsilon = 1e-9);
        assert_abs_diff_eq!(angles.pitch, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(angles.roll, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn rotation_matrix_is_orthonormal() {
        let q = quaternion_from_euler(0.3, -1.1, 2.4);
        let r = rotation_matrix(&q);
        assert_abs_diff_eq!(&r * &r.transposed(), Matrix::identity(3), epsilon = 1e-12);
    }

    #[test]
    fn non_unit_input_is_scaled() {
        let r = rotation_matrix(&Matrix::column(&[2.0, 0.0, 0.0, 0.0]));
        assert_eq!(r, 4.0 * Matrix::identity(3));
    }

    #[test]
    fn euler_round_trip_through_rotation_matrix() {
        let cases = [
            (0.0, 0.0, 0.0),
            (0.5, 0.2, -0.3),
            (-2.5, 1.2, 3.0),
            (3.0, -1.4, -2.9),
            (1.0, 0.0, 1.0),
        ];
        for (yaw, pitch, roll) in cases {
            let q = quaternion_from_euler(yaw, pitch, roll);
            let angles = euler_angles(&q);
            let rebuilt = quaternion_from_euler(
                angles.yaw.to_radians(),
                angles.pitch.to_radians(),
                angles.roll.to_radians(),
            );
            assert_abs_diff_eq!(rotation_matrix(&rebuilt), rotation_matrix(&q), epsilon = 1e-9);
        }
    }

    #[test]
    fn pitch_is_clamped_past_gimbal_lock() {
        // 2(wy - zx) = 1.0000001 and -1.0000001
        let s = (1.0000001_f64 / 2.0).sqrt();
        let up = euler_angles(&Matrix::column(&[s, 0.0, s, 0.0]));
        assert!(!up.pitch.is_nan());
        assert_eq!(up.pitch, 90.0);

        let down = euler_angles(&Matrix::column(&[s, 0.0, -s, 0.0]));
        assert!(!down.pitch.is_nan());
        assert_eq!(down.pitch, -90.0);
    }
}
