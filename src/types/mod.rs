pub mod linalg;

pub use linalg::*;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// One time-ordered row of inertial data plus the most recent position fix.
///
/// `sequence_number` only advances when `position` carries a fix that has
/// not been seen before; a repeated value means the field is stale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp_us: u64,
    pub sequence_number: u64,
    /// Body-frame angular rate [rad/s]
    pub angular_rate: Vector3<f64>,
    /// Body-frame specific force [m/s²]
    pub specific_force: Vector3<f64>,
    /// Navigation-frame (NED) position [m]
    pub position: Vector3<f64>,
}

impl Sample {
    pub fn new(
        timestamp_us: u64,
        sequence_number: u64,
        angular_rate: Vector3<f64>,
        specific_force: Vector3<f64>,
        position: Vector3<f64>,
    ) -> Self {
        Self {
            timestamp_us,
            sequence_number,
            angular_rate,
            specific_force,
            position,
        }
    }

    /// True when this sample carries a fix newer than `previous`'s.
    pub fn has_new_fix(&self, previous_sequence: u64) -> bool {
        self.sequence_number > previous_sequence
    }
}
