//! Linear algebra type system for the navigation filter
//!
//! Provides compile-time dimension checking and clean type aliases
//! for the error-state Kalman filter.

use nalgebra::{SMatrix, SVector};

// ===== State Dimensions =====
pub const STATE_DIM_15: usize = 15;
pub const NOISE_DIM_12: usize = 12;

// ===== Error-State Block Offsets =====
pub const POS_IDX: usize = 0;
pub const VEL_IDX: usize = 3;
pub const ATT_IDX: usize = 6;
pub const ACCEL_BIAS_IDX: usize = 9;
pub const GYRO_BIAS_IDX: usize = 12;

// ===== Process Noise Channel Offsets =====
pub const ACCEL_NOISE_IDX: usize = 0;
pub const GYRO_NOISE_IDX: usize = 3;
pub const ACCEL_BIAS_NOISE_IDX: usize = 6;
pub const GYRO_BIAS_NOISE_IDX: usize = 9;

// ===== Measurement Dimensions =====
pub const MEASURE_DIM_GPS_POS: usize = 3; // (north, east, down)

// ===== Packed Covariance =====
pub const PACKED_COV_LEN_15: usize = STATE_DIM_15 * (STATE_DIM_15 + 1) / 2; // 120

// ===== 15-State Filter Types =====
pub type StateVec15 = SVector<f64, STATE_DIM_15>;
pub type StateMat15 = SMatrix<f64, STATE_DIM_15, STATE_DIM_15>;

// Process noise input mapping (error state <- accel, gyro, accel-bias, gyro-bias noise)
pub type NoiseVec12 = SVector<f64, NOISE_DIM_12>;
pub type NoiseMat12 = SMatrix<f64, NOISE_DIM_12, NOISE_DIM_12>;
pub type NoiseInput15x12 = SMatrix<f64, STATE_DIM_15, NOISE_DIM_12>;

// Measurement types for 15-state filter
pub type GpsPosVec = SVector<f64, MEASURE_DIM_GPS_POS>;
pub type GpsPosNoise = SMatrix<f64, MEASURE_DIM_GPS_POS, MEASURE_DIM_GPS_POS>;

// Kalman gain types
pub type KalmanGainGpsPos = SMatrix<f64, STATE_DIM_15, MEASURE_DIM_GPS_POS>; // 15×3

// Jacobian types
pub type JacobianGpsPos = SMatrix<f64, MEASURE_DIM_GPS_POS, STATE_DIM_15>; // 3×15
