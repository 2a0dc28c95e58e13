use nalgebra::{Matrix3, UnitQuaternion, Vector3};

use super::config::NoiseModel;
use crate::types::{StateVec15, ACCEL_BIAS_IDX, ATT_IDX, GYRO_BIAS_IDX, POS_IDX, VEL_IDX};

/// Nominal navigation state (NED navigation frame, FRD body frame)
#[derive(Clone, Debug, PartialEq)]
pub struct NavState {
    /// Position [m]
    pub position: Vector3<f64>,

    /// Velocity [m/s]
    pub velocity: Vector3<f64>,

    /// Body-to-navigation rotation
    pub attitude: UnitQuaternion<f64>,

    /// Accelerometer bias [m/s²]
    pub accel_bias: Vector3<f64>,

    /// Gyroscope bias [rad/s]
    pub gyro_bias: Vector3<f64>,
}

impl NavState {
    /// Stationary state at `position`, leveled from the measured specific force.
    ///
    /// Heading is not observable here and is left at zero.
    pub fn leveled(position: Vector3<f64>, specific_force: &Vector3<f64>) -> Self {
        let (roll, pitch) = level_from_specific_force(specific_force);
        Self {
            position,
            velocity: Vector3::zeros(),
            attitude: UnitQuaternion::from_euler_angles(roll, pitch, 0.0),
            accel_bias: Vector3::zeros(),
            gyro_bias: Vector3::zeros(),
        }
    }

    /// Roll, pitch, yaw [rad]
    pub fn euler(&self) -> Vector3<f64> {
        let (roll, pitch, yaw) = self.attitude.euler_angles();
        Vector3::new(roll, pitch, yaw)
    }

    /// Body-to-navigation direction cosine matrix
    pub fn dcm(&self) -> Matrix3<f64> {
        self.attitude.to_rotation_matrix().into_inner()
    }

    /// Flat state: position, velocity, roll/pitch/yaw, accel bias, gyro bias
    pub fn to_vector(&self) -> StateVec15 {
        let mut x = StateVec15::zeros();
        x.fixed_rows_mut::<3>(POS_IDX).copy_from(&self.position);
        x.fixed_rows_mut::<3>(VEL_IDX).copy_from(&self.velocity);
        x.fixed_rows_mut::<3>(ATT_IDX).copy_from(&self.euler());
        x.fixed_rows_mut::<3>(ACCEL_BIAS_IDX).copy_from(&self.accel_bias);
        x.fixed_rows_mut::<3>(GYRO_BIAS_IDX).copy_from(&self.gyro_bias);
        x
    }

    /// Strapdown mechanization over `dt` seconds.
    ///
    /// Attitude is integrated first with the bias-corrected rate, then the
    /// bias-corrected specific force is rotated with the new attitude.
    pub fn mechanize(
        &self,
        angular_rate: &Vector3<f64>,
        specific_force: &Vector3<f64>,
        noise: &NoiseModel,
        dt: f64,
    ) -> Self {
        let omega = angular_rate - self.gyro_bias;
        let force = specific_force - self.accel_bias;

        let mut attitude = self.attitude * UnitQuaternion::from_scaled_axis(omega * dt);
        attitude.renormalize();

        let gravity = Vector3::new(0.0, 0.0, noise.gravity);
        let accel_nav = attitude * force + gravity;
        let velocity = self.velocity + accel_nav * dt;
        let position = self.position + (self.velocity + velocity) * (0.5 * dt);

        Self {
            position,
            velocity,
            attitude,
            accel_bias: noise.accel_bias.propagate(&self.accel_bias, dt),
            gyro_bias: noise.gyro_bias.propagate(&self.gyro_bias, dt),
        }
    }

    /// Fold an error-state correction into the nominal state.
    ///
    /// Attitude error is a body-frame rotation vector.
    pub fn inject(&self, dx: &StateVec15) -> Self {
        let d_theta: Vector3<f64> = dx.fixed_rows::<3>(ATT_IDX).into_owned();
        let mut attitude = self.attitude * UnitQuaternion::from_scaled_axis(d_theta);
        attitude.renormalize();

        Self {
            position: self.position + dx.fixed_rows::<3>(POS_IDX),
            velocity: self.velocity + dx.fixed_rows::<3>(VEL_IDX),
            attitude,
            accel_bias: self.accel_bias + dx.fixed_rows::<3>(ACCEL_BIAS_IDX),
            gyro_bias: self.gyro_bias + dx.fixed_rows::<3>(GYRO_BIAS_IDX),
        }
    }
}

/// Roll and pitch from a resting specific-force reading (FRD body, NED nav).
///
/// A level accelerometer at rest reads `[0, 0, -g]`.
fn level_from_specific_force(f: &Vector3<f64>) -> (f64, f64) {
    if f.norm() < 1e-6 {
        return (0.0, 0.0); // free fall: no gravity reference
    }
    let roll = (-f.y).atan2(-f.z);
    let pitch = f.x.atan2((f.y * f.y + f.z * f.z).sqrt());
    (roll, pitch)
}
