//! Linear algebra type system for the pose filter
//!
//! Fixed-size aliases so every Jacobian and gain in the filter gets its
//! dimensions checked at compile time.

use nalgebra::{SMatrix, SVector};

// ===== State Dimensions =====
pub const STATE_DIM: usize = 3; // (x, y, theta)

// ===== Measurement / Control Dimensions =====
pub const MEASURE_DIM_BEACON: usize = 2; // (range, bearing)
pub const CONTROL_DIM: usize = 2; // (v, w)

// ===== Pose Filter Types =====
pub type StateVec = SVector<f64, STATE_DIM>;
pub type StateMat = SMatrix<f64, STATE_DIM, STATE_DIM>;

// Beacon measurement types
pub type BeaconMeasVec = SVector<f64, MEASURE_DIM_BEACON>;
pub type BeaconNoise = SMatrix<f64, MEASURE_DIM_BEACON, MEASURE_DIM_BEACON>;

// Kalman gain / Jacobian types
pub type KalmanGainBeacon = SMatrix<f64, STATE_DIM, MEASURE_DIM_BEACON>; // 3×2
pub type JacobianBeacon = SMatrix<f64, MEASURE_DIM_BEACON, STATE_DIM>; // 2×3

// Control noise mapping
pub type ControlNoise = SMatrix<f64, CONTROL_DIM, CONTROL_DIM>;
pub type ControlJacobian = SMatrix<f64, STATE_DIM, CONTROL_DIM>; // 3×2
