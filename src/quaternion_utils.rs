use crate::error::FilterError;
use crate::matrix::Matrix;

/// Identity quaternion `[1, 0, 0, 0]ᵀ` in **scalar-first** order
pub fn identity_quaternion() -> Matrix {
    Matrix::column(&[1.0, 0.0, 0.0, 0.0])
}

/// Splits a 4×1 quaternion column into `(w, x, y, z)`.
///
/// # Panics
/// If `q` is not 4×1.
pub(crate) fn components(q: &Matrix) -> (f64, f64, f64, f64) {
    assert_eq!(q.shape(), (4, 1), "ShapeMismatch: quaternion must be 4x1");
    (q[(0, 0)], q[(1, 0)], q[(2, 0)], q[(3, 0)])
}

/// Quaternion normalization
///
/// # Arguments
/// * `q` - Input quaternion, 4×1
///
/// # Returns
/// Unit quaternion, or [`FilterError::DegenerateNormalization`] when `‖q‖` is zero
///
pub fn q_norm(q: &Matrix) -> Result<Matrix, FilterError> {
    Ok(q.normalized()?)
}

/// Quaternion–rate coupling matrix $S(\mathbf{q})$ such that
/// $\dot{\mathbf{q}} = \tfrac{1}{2} S(\mathbf{q})\\boldsymbol{\omega}$
///
/// With $\mathbf{q} = [w, x, y, z]$:
///
/// $$
/// S(\mathbf{q}) =
/// \begin{bmatrix}
///   -x & -y & -z \\\\
///    w & -z &  y \\\\
///    z &  w & -x \\\\
///   -y &  x &  w
/// \end{bmatrix}
/// $$
///
/// # Arguments
/// * `q` — Input quaternion, 4×1
///
/// # Returns
/// * 4×3 coupling matrix
///
/// # Example
/// ```
/// use orientation_ekf::Matrix;
/// use orientation_ekf::quaternion_utils::{identity_quaternion, rate_coupling};
///
/// // At identity the body rate maps straight onto the vector part.
/// let s = rate_coupling(&identity_quaternion());
/// let dq = &s * &Matrix::column(&[0.1, 0.2, 0.3]);
/// assert_eq!(dq, Matrix::column(&[0.0, 0.1, 0.2, 0.3]));
/// ```
pub fn rate_coupling(q: &Matrix) -> Matrix {
    let (w, x, y, z) = components(q);
    Matrix::from_array([[-x, -y, -z], [w, -z, y], [z, w, -x], [-y, x, w]])
}

/// Jacobian of the world→body rotated reference vector with respect to the quaternion.
///
/// The measurement model is $h(\mathbf{q}) = R(\mathbf{q})^\top \mathbf{r}$, where $R$ is the
/// body→world direction-cosine matrix (see [`rotation_matrix`](crate::kinematics::rotation_matrix)).
/// Differentiating each row with respect to $[w, x, y, z]$ gives
///
/// $$
/// \frac{\partial h}{\partial \mathbf{q}} = 2
/// \begin{bmatrix}
///    w r_x + z r_y - y r_z &  x r_x + y r_y + z r_z & -y r_x + x r_y - w r_z & -z r_x + w r_y + x r_z \\\\
///   -z r_x + w r_y + x r_z &  y r_x - x r_y + w r_z &  x r_x + y r_y + z r_z & -w r_x - z r_y + y r_z \\\\
///    y r_x - x r_y + w r_z &  z r_x - w r_y - x r_z &  w r_x + z r_y - y r_z &  x r_x + y r_y + z r_z
/// \end{bmatrix}
/// $$
///
/// # Arguments
/// * `q` - Quaternion the model is linearized around, 4×1
/// * `reference` - World-frame reference direction, 3×1
///
/// # Returns
/// * 3×4 Jacobian block
///
/// # Example
/// ```
/// use orientation_ekf::Matrix;
/// use orientation_ekf::quaternion_utils::{dh_dq, identity_quaternion};
///
/// let j = dh_dq(&identity_quaternion(), &Matrix::column(&[0.0, 0.0, -1.0]));
/// assert_eq!(j.shape(), (3, 4));
/// ```
pub fn dh_dq(q: &Matrix, reference: &Matrix) -> Matrix {
    assert_eq!(
        reference.shape(),
        (3, 1),
        "ShapeMismatch: reference must be 3x1"
    );
    let (w, x, y, z) = components(q);
    let (rx, ry, rz) = (reference[(0, 0)], reference[(1, 0)], reference[(2, 0)]);

    // Terms shared between rows
    let a = w * rx + z * ry - y * rz;
    let b = x * rx + y * ry + z * rz;
    let c = -y * rx + x * ry - w * rz;
    let d = -z * rx + w * ry + x * rz;

    2.0 * Matrix::from_array([[a, b, c, d], [d, -c, b, -a], [-c, -d, a, b]])
}

/// Unit quaternion from yaw/pitch/roll (radians), intrinsic Z-Y-X order.
///
/// Inverse of [`euler_angles`](crate::kinematics::euler_angles) away from gimbal lock.
///
/// # Example
/// ```
/// use std::f64::consts::FRAC_PI_2;
/// use orientation_ekf::quaternion_utils::quaternion_from_euler;
///
/// // 90° about +Z: q = [cos(π/4), 0, 0, sin(π/4)]
/// let q = quaternion_from_euler(FRAC_PI_2, 0.0, 0.0);
/// assert!((q[(0, 0)] - q[(3, 0)]).abs() < 1e-12);
/// ```
pub fn quaternion_from_euler(yaw: f64, pitch: f64, roll: f64) -> Matrix {
    let (sy, cy) = (0.5 * yaw).sin_cos();
    let (sp, cp) = (0.5 * pitch).sin_cos();
    let (sr, cr) = (0.5 * roll).sin_cos();
    Matrix::column(&[
        cr * cp * cy + sr * sp * sy,
        sr * cp * cy - cr * sp * sy,
        cr * sp * cy + sr * cp * sy,
        cr * cp * sy - sr * sp * cy,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematics::rotation_matrix;
    use approx::assert_abs_diff_eq;

    fn h(q: &Matrix, r: &Matrix) -> Matrix {
        rotation_matrix(q).transposed() * r
    }

    #[test]
    fn q_norm_unit_and_degenerate() {
        let q = q_norm(&Matrix::column(&[2.0, 0.0, 0.0, 0.0])).unwrap();
        assert_eq!(q, identity_quaternion());
        assert_eq!(
            q_norm(&Matrix::zeros(4, 1)),
            Err(FilterError::DegenerateNormalization)
        );
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let q = quaternion_from_euler(0.4, -0.3, 1.1);
        let r = Matrix::column(&[0.6, -0.8, 0.0]);
        let j = dh_dq(&q, &r);
        let eps = 1e-7;
        for k in 0..4 {
            let mut dq = [0.0; 4];
            dq[k] = eps;
            let bumped = &q + &Matrix::column(&dq);
            let numeric = (h(&bumped, &r) - h(&q, &r)) * (1.0 / eps);
            for row in 0..3 {
                assert_abs_diff_eq!(j[(row, k)], numeric[(row, 0)], epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn jacobian_of_zero_reference_is_zero() {
        let j = dh_dq(&identity_quaternion(), &Matrix::zeros(3, 1));
        assert_eq!(j, Matrix::zeros(3, 4));
    }

    #[test]
    fn euler_quaternion_is_unit() {
        let q = quaternion_from_euler(2.0, 0.7, -1.3);
        assert_abs_diff_eq!(q.norm(), 1.0, epsilon = 1e-12);
    }
}
