//! Orientation estimation with a quaternion Extended Kalman Filter.
//!
//! The filter state is a unit quaternion `[w, x, y, z]` driven by gyroscope
//! rates and corrected by the gravity and magnetic-field directions seen in
//! the body frame.
//!
//! ```
//! use orientation_ekf::{OrientationEKF, Matrix};
//!
//! let mut ekf = OrientationEKF::new();
//! ekf.predict(&Matrix::column(&[0.0, 0.0, 0.0]), 0.1).unwrap();
//! ekf.update(&Matrix::column(&[0.0, 0.0, -1.0]), &Matrix::column(&[1.0, 0.0, 0.0]))
//!     .unwrap();
//! assert!((ekf.quaternion()[(0, 0)] - 1.0).abs() < 1e-9);
//! ```

pub mod config;
pub mod error;
pub mod estimator;
pub mod kinematics;
pub mod matrix;
pub mod orientation_ekf;
pub mod quaternion_utils;
pub mod record;

pub use config::EkfConfig;
pub use error::{FilterError, MatrixError, TransportError};
pub use estimator::{
    NullTransport, OrientationEstimator, RecordingTransport, SensorSample, TickOutcome, Transport,
};
pub use kinematics::{euler_angles, rotation_matrix, EulerAngles};
pub use matrix::Matrix;
pub use orientation_ekf::OrientationEKF;
pub use record::OrientationRecord;
