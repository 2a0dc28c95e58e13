//! Error-state navigation filter
//!
//! Strapdown INS propagation with Gauss-Markov sensor biases, corrected by
//! absolute position fixes.

pub mod bias_model;
pub mod config;
pub mod ekf_15d;
pub mod nav_state;

pub use bias_model::GaussMarkov;
pub use config::{EkfConfig, NoiseModel, G};
pub use ekf_15d::{Ekf15, Ekf15State, FilterState, FixStatus, UpdateOutcome};
pub use nav_state::NavState;
