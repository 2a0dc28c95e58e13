//! GPS-aided strapdown inertial navigation
//!
//! A 15-state error-state EKF (position, velocity, attitude, accelerometer
//! bias, gyroscope bias) plus the record loader, covariance packing and
//! result writers used by the `run_ekf` driver.

pub mod covariance_pack;
pub mod error;
pub mod filters;
pub mod nav_data;
pub mod output;
pub mod types;

pub use error::{ConfigError, EkfError, LoadError, PackError};
pub use filters::{Ekf15, EkfConfig, FixStatus, NoiseModel, UpdateOutcome};
pub use types::Sample;
