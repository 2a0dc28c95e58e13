use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::bias_model::GaussMarkov;
use crate::error::ConfigError;
use crate::types::{
    GpsPosNoise, NoiseMat12, NoiseVec12, ACCEL_BIAS_NOISE_IDX, ACCEL_NOISE_IDX,
    GYRO_BIAS_NOISE_IDX, GYRO_NOISE_IDX,
};

/// Standard gravity used for leveling and mechanization [m/s²]
pub const G: f64 = 9.807;

/// Noise and initial-uncertainty tuning for the 15-state filter
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EkfConfig {
    /// Accelerometer white noise [m/s²]
    pub accel_sigma: Vector3<f64>,

    /// Gyroscope white noise [rad/s]
    pub rot_rate_sigma: Vector3<f64>,

    /// Accelerometer bias Markov sigma [m/s²]
    pub accel_markov_sigma: Vector3<f64>,

    /// Gyroscope bias Markov sigma [rad/s]
    pub rot_rate_markov_sigma: Vector3<f64>,

    /// Accelerometer bias time constant [s]
    pub accel_tau: Vector3<f64>,

    /// Gyroscope bias time constant [s]
    pub rot_rate_tau: Vector3<f64>,

    /// Horizontal (north/east) position fix sigma [m]
    pub pos_sigma_ne: f64,

    /// Vertical (down) position fix sigma [m]
    pub pos_sigma_d: f64,

    /// Initial velocity sigma [m/s]
    pub init_vel_sigma: f64,

    /// Initial attitude sigma [rad]
    pub init_orient_sigma: f64,

    /// Initial accelerometer bias sigma [m/s²]
    pub init_accel_bias_sigma: f64,

    /// Initial gyroscope bias sigma [rad/s]
    pub init_rot_rate_bias_sigma: f64,

    /// Local gravity magnitude [m/s²]
    pub gravity: f64,
}

impl Default for EkfConfig {
    fn default() -> Self {
        Self {
            accel_sigma: Vector3::new(0.04, 0.03, 0.05),
            rot_rate_sigma: Vector3::new(0.0016, 0.0015, 0.0014),
            accel_markov_sigma: Vector3::repeat(0.018),
            rot_rate_markov_sigma: Vector3::repeat(0.0004),
            accel_tau: Vector3::repeat(400.0),
            rot_rate_tau: Vector3::repeat(300.0),
            pos_sigma_ne: 0.05,
            pos_sigma_d: 0.05,
            init_vel_sigma: 0.01,
            init_orient_sigma: std::f64::consts::PI / 12.0,
            init_accel_bias_sigma: 0.5,
            init_rot_rate_bias_sigma: 0.001,
            gravity: G,
        }
    }
}

impl EkfConfig {
    /// Validate the tuning and derive the process and measurement noise.
    ///
    /// Pure: calling it again on the same config yields the same model.
    pub fn configure(&self) -> Result<NoiseModel, ConfigError> {
        let vectors = [
            ("accel_sigma", &self.accel_sigma),
            ("rot_rate_sigma", &self.rot_rate_sigma),
            ("accel_markov_sigma", &self.accel_markov_sigma),
            ("rot_rate_markov_sigma", &self.rot_rate_markov_sigma),
            ("accel_tau", &self.accel_tau),
            ("rot_rate_tau", &self.rot_rate_tau),
        ];
        for (name, v) in vectors {
            for &value in v.iter() {
                check_positive(name, value)?;
            }
        }
        let scalars = [
            ("pos_sigma_ne", self.pos_sigma_ne),
            ("pos_sigma_d", self.pos_sigma_d),
            ("init_vel_sigma", self.init_vel_sigma),
            ("init_orient_sigma", self.init_orient_sigma),
            ("init_accel_bias_sigma", self.init_accel_bias_sigma),
            ("init_rot_rate_bias_sigma", self.init_rot_rate_bias_sigma),
            ("gravity", self.gravity),
        ];
        for (name, value) in scalars {
            check_positive(name, value)?;
        }

        let accel_bias = GaussMarkov::new(self.accel_markov_sigma, self.accel_tau);
        let gyro_bias = GaussMarkov::new(self.rot_rate_markov_sigma, self.rot_rate_tau);

        // Continuous noise intensities: [accel white, gyro white, accel bias, gyro bias]
        let mut q_diag = NoiseVec12::zeros();
        q_diag
            .fixed_rows_mut::<3>(ACCEL_NOISE_IDX)
            .copy_from(&self.accel_sigma.component_mul(&self.accel_sigma));
        q_diag
            .fixed_rows_mut::<3>(GYRO_NOISE_IDX)
            .copy_from(&self.rot_rate_sigma.component_mul(&self.rot_rate_sigma));
        q_diag
            .fixed_rows_mut::<3>(ACCEL_BIAS_NOISE_IDX)
            .copy_from(&accel_bias.noise_intensity());
        q_diag
            .fixed_rows_mut::<3>(GYRO_BIAS_NOISE_IDX)
            .copy_from(&gyro_bias.noise_intensity());

        let ne_var = self.pos_sigma_ne * self.pos_sigma_ne;
        let d_var = self.pos_sigma_d * self.pos_sigma_d;
        let r = GpsPosNoise::from_diagonal(&Vector3::new(ne_var, ne_var, d_var));

        Ok(NoiseModel {
            q: NoiseMat12::from_diagonal(&q_diag),
            r,
            accel_bias,
            gyro_bias,
            init_pos_sigma: Vector3::new(self.pos_sigma_ne, self.pos_sigma_ne, self.pos_sigma_d),
            init_vel_sigma: self.init_vel_sigma,
            init_orient_sigma: self.init_orient_sigma,
            init_accel_bias_sigma: self.init_accel_bias_sigma,
            init_rot_rate_bias_sigma: self.init_rot_rate_bias_sigma,
            gravity: self.gravity,
        })
    }
}

fn check_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter { name, value })
    }
}

/// Matrices derived by [`EkfConfig::configure`]; immutable afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct NoiseModel {
    /// Continuous process-noise intensity (12×12 diagonal)
    pub q: NoiseMat12,

    /// Position measurement noise (3×3 diagonal: NE, NE, D)
    pub r: GpsPosNoise,

    pub accel_bias: GaussMarkov,
    pub gyro_bias: GaussMarkov,

    pub init_pos_sigma: Vector3<f64>,
    pub init_vel_sigma: f64,
    pub init_orient_sigma: f64,
    pub init_accel_bias_sigma: f64,
    pub init_rot_rate_bias_sigma: f64,
    pub gravity: f64,
}
