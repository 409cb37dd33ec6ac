use tracing::trace;

use crate::config::EkfConfig;
use crate::error::{FilterError, MatrixError};
use crate::kinematics::rotation_matrix;
use crate::matrix::Matrix;
use crate::quaternion_utils::{dh_dq, identity_quaternion, q_norm, rate_coupling};

/// Quaternion EKF data struct
///
/// State is the attitude quaternion `[w, x, y, z]` only; the measurement is the
/// 6-vector `[accel; normalized mag]`.
#[derive(Debug, Clone)]
pub struct OrientationEKF {
    /// Time-updated quaternion, 4×1
    priori_state: Matrix,
    /// Measurement-corrected quaternion, 4×1; base of the next predict
    posteriori_state: Matrix,
    /// Error covariance used by the next update, 4×4
    priori_covariance: Matrix,
    /// Error covariance after the last correction, 4×4
    posteriori_covariance: Matrix,
    /// Process noise Q, 4×4
    process_noise: Matrix,
    /// Measurement noise R, 6×6
    measurement_noise: Matrix,
    /// Measurement Jacobian H, 6×4
    jacobian: Matrix,
    /// Kalman gain K from the last update, 4×6
    gain: Matrix,
    gravity_reference: Matrix,
    magnetic_reference: Matrix,
}

impl Default for OrientationEKF {
    fn default() -> Self {
        Self::new()
    }
}

impl OrientationEKF {
    /// Create a new EKF at the identity attitude with default noise and references.
    pub fn new() -> Self {
        Self::with_config(&EkfConfig::default())
    }

    /// Create a new EKF instance from explicit tuning
    ///
    /// # Arguments
    /// * `config` - Noise levels and world-frame reference directions. Not validated
    ///   here; see [`EkfConfig::validate`]
    ///
    /// # Returns
    /// An instance of EKF at the identity quaternion with `P = p₀·I`, `Q = q·I₄`, `R = r·I₆`
    ///
    pub fn with_config(config: &EkfConfig) -> Self {
        let p0 = config.initial_covariance * Matrix::identity(4);
        OrientationEKF {
            priori_state: identity_quaternion(),
            posteriori_state: identity_quaternion(),
            priori_covariance: p0.clone(),
            posteriori_covariance: p0,
            process_noise: config.process_noise * Matrix::identity(4),
            measurement_noise: config.measurement_noise * Matrix::identity(6),
            jacobian: Matrix::zeros(6, 4),
            gain: Matrix::zeros(4, 6),
            gravity_reference: Matrix::column(&config.gravity_reference),
            magnetic_reference: Matrix::column(&config.magnetic_reference),
        }
    }

    /// Replaces the diagonal noise matrices with full ones.
    ///
    /// # Arguments
    /// * `process_noise` - Q, must be 4×4
    /// * `measurement_noise` - R, must be 6×6
    ///
    pub fn with_noise(
        mut self,
        process_noise: Matrix,
        measurement_noise: Matrix,
    ) -> Result<Self, FilterError> {
        expect_shape("process_noise", &process_noise, (4, 4))?;
        expect_shape("measurement_noise", &measurement_noise, (6, 6))?;
        self.process_noise = process_noise;
        self.measurement_noise = measurement_noise;
        Ok(self)
    }

    /// Runs the EKF **prediction step**: first-order quaternion integration of the body rate.
    ///
    /// $$ \mathbf{q}^- = \frac{\mathbf{q} + \tfrac{\Delta t}{2} S(\mathbf{q})\\boldsymbol{\omega}}
    ///                        {\lVert \mathbf{q} + \tfrac{\Delta t}{2} S(\mathbf{q})\\boldsymbol{\omega} \rVert} $$
    ///
    /// The measurement Jacobian `H` is rebuilt around the new priori. Covariance is
    /// not touched here; process noise is folded in by [`update`](Self::update).
    ///
    /// Until `update` corrects it, the prediction also stands as the current
    /// estimate, so consecutive predicts keep integrating.
    ///
    /// # Arguments
    /// * `angular_rate` - Body angular rate, 3×1 `[rad/s]`
    /// * `dt`   - Integration time step in **seconds**
    ///
    /// # Returns
    /// Updates the state **in place**. A non-finite rate or `dt` gives
    /// [`FilterError::DegenerateMeasurement`] and leaves the state untouched
    ///
    pub fn predict(&mut self, angular_rate: &Matrix, dt: f64) -> Result<(), FilterError> {
        expect_shape("angular_rate", angular_rate, (3, 1))?;
        if !angular_rate.is_finite() || !dt.is_finite() {
            return Err(FilterError::DegenerateMeasurement);
        }

        let b = (0.5 * dt) * rate_coupling(&self.posteriori_state);
        let q_pred = q_norm(&(&self.posteriori_state + &b * angular_rate))?;

        // H = [ ∂h/∂q (gravity) ; ∂h/∂q (magnetic) ]
        let h_a = dh_dq(&q_pred, &self.gravity_reference);
        let h_m = dh_dq(&q_pred, &self.magnetic_reference);
        self.jacobian = h_a.vstack(&h_m)?;

        self.priori_state = q_pred.clone();
        self.posteriori_state = q_pred;
        Ok(())
    }

    /// Runs the EKF **correction step** against accelerometer and magnetometer readings.
    ///
    /// 1. `K = P⁻ Hᵀ (H P⁻ Hᵀ + R)⁻¹`
    /// 2. `P⁺ = (I − K H) P⁻`, and the next `P⁻ = P⁺ + Q`
    /// 3. `q⁺ = normalize(q⁻ + K (z − ŷ))` with `z = [accel; mag/‖mag‖]`
    ///
    /// # Arguments
    /// * `accel` - Gravity direction measured in the body frame, 3×1, unit-scaled to 1 g
    /// * `mag`   - Magnetic field in the body frame, 3×1, any scale
    ///
    /// # Returns
    /// [`FilterError::Singular`] if the innovation covariance cannot be inverted,
    /// [`FilterError::DegenerateMeasurement`] for a non-finite reading or a zero
    /// magnetometer. On
    /// error no state has been modified.
    ///
    pub fn update(&mut self, accel: &Matrix, mag: &Matrix) -> Result<(), FilterError> {
        expect_shape("accel", accel, (3, 1))?;
        expect_shape("mag", mag, (3, 1))?;
        if !accel.is_finite() || !mag.is_finite() {
            return Err(FilterError::DegenerateMeasurement);
        }

        let h = &self.jacobian;
        let ht = h.transposed();

        // Kalman gain
        let s = h * &self.priori_covariance * &ht + &self.measurement_noise; // 6x6
        let s_inv = s.inversed()?;
        let k = &self.priori_covariance * &ht * &s_inv; // 4x6

        let m = mag.normalized().map_err(|e| match e {
            MatrixError::DegenerateNormalization => FilterError::DegenerateMeasurement,
            other => other.into(),
        })?;
        let z = stack(accel, &m);
        let innovation = &z - &self.predicted_measurement();
        trace!(innovation = innovation.norm(), "ekf innovation");

        let q_post = q_norm(&(&self.priori_state + &k * &innovation))?;

        let p_post = (Matrix::identity(4) - &k * h) * &self.priori_covariance;
        // (I − KH)P is symmetric in exact arithmetic; drop the rounding asymmetry.
        let p_post = 0.5 * (&p_post + &p_post.transposed());

        self.priori_covariance = &p_post + &self.process_noise;
        self.posteriori_covariance = p_post;
        self.gain = k;
        self.posteriori_state = q_post;
        Ok(())
    }

    /// Expected measurement `ŷ = [R(q⁻)ᵀ g; R(q⁻)ᵀ m]` for the current priori, 6×1.
    pub fn predicted_measurement(&self) -> Matrix {
        let rt = rotation_matrix(&self.priori_state).transposed();
        let a_hat = &rt * &self.gravity_reference;
        let m_hat = &rt * &self.magnetic_reference;
        stack(&a_hat, &m_hat)
    }

    /// Current best attitude estimate (posteriori), 4×1.
    pub fn quaternion(&self) -> &Matrix {
        &self.posteriori_state
    }

    pub fn priori_quaternion(&self) -> &Matrix {
        &self.priori_state
    }

    pub fn priori_covariance(&self) -> &Matrix {
        &self.priori_covariance
    }

    pub fn posteriori_covariance(&self) -> &Matrix {
        &self.posteriori_covariance
    }

    pub fn measurement_jacobian(&self) -> &Matrix {
        &self.jacobian
    }

    pub fn kalman_gain(&self) -> &Matrix {
        &self.gain
    }
}

fn expect_shape(
    name: &'static str,
    m: &Matrix,
    shape: (usize, usize),
) -> Result<(), FilterError> {
    if m.shape() != shape {
        return Err(MatrixError::ShapeMismatch {
            op: name,
            lhs: m.shape(),
            rhs: shape,
        }
        .into());
    }
    Ok(())
}

/// Concatenates two 3×1 columns into one 6×1.
fn stack(top: &Matrix, bottom: &Matrix) -> Matrix {
    Matrix::column(&[
        top[(0, 0)],
        top[(1, 0)],
        top[(2, 0)],
        bottom[(0, 0)],
        bottom[(1, 0)],
        bottom[(2, 0)],
    ])
}
