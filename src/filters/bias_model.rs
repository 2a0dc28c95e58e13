//! First-order Gauss-Markov bias model
//!
//! Each axis follows `b_dot = -b / tau + w`, where `w` is white noise with
//! intensity `2 * sigma² / tau`, giving a stationary variance of `sigma²`.

use nalgebra::{Matrix3, Vector3};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GaussMarkov {
    /// Stationary standard deviation per axis
    pub sigma: Vector3<f64>,

    /// Correlation time per axis [s]
    pub tau: Vector3<f64>,
}

impl GaussMarkov {
    pub fn new(sigma: Vector3<f64>, tau: Vector3<f64>) -> Self {
        Self { sigma, tau }
    }

    /// Continuous-time decay coefficients `-1/tau` (diagonal of the F block)
    pub fn decay_rate(&self) -> Matrix3<f64> {
        Matrix3::from_diagonal(&self.tau.map(|t| -1.0 / t))
    }

    /// White-noise intensity driving each axis: `2 * sigma² / tau`
    pub fn noise_intensity(&self) -> Vector3<f64> {
        self.sigma.zip_map(&self.tau, |s, t| 2.0 * s * s / t)
    }

    /// Exact per-axis decay factor `exp(-dt / tau)` over one step
    pub fn decay_factor(&self, dt: f64) -> Vector3<f64> {
        self.tau.map(|t| (-dt / t).exp())
    }

    /// Propagate a bias estimate one step toward zero
    pub fn propagate(&self, bias: &Vector3<f64>, dt: f64) -> Vector3<f64> {
        bias.component_mul(&self.decay_factor(dt))
    }

    /// Discrete process-noise variance added over `dt` by white noise of the
    /// given continuous `intensity`.
    ///
    /// `intensity * tau / 2 * (1 - exp(-2 dt / tau))`. With
    /// [`GaussMarkov::noise_intensity`] this is `sigma² * (1 - exp(-2 dt / tau))`,
    /// and `v <- a² v + q_d` with `a = exp(-dt / tau)` settles at `sigma²`
    /// whatever the step length.
    pub fn discrete_variance(&self, intensity: &Vector3<f64>, dt: f64) -> Vector3<f64> {
        intensity.zip_map(&self.tau, |q, t| 0.5 * q * t * (1.0 - (-2.0 * dt / t).exp()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn model() -> GaussMarkov {
        GaussMarkov::new(Vector3::new(0.01, 0.02, 0.03), Vector3::new(100.0, 200.0, 400.0))
    }

    #[test]
    fn test_noise_intensity() {
        let q = model().noise_intensity();
        assert_relative_eq!(q.x, 2.0 * 0.01 * 0.01 / 100.0);
        assert_relative_eq!(q.z, 2.0 * 0.03 * 0.03 / 400.0);
    }

    #[test]
    fn test_decay_is_exponential() {
        let m = model();
        let bias = Vector3::new(1.0, -1.0, 0.5);
        let next = m.propagate(&bias, 100.0);
        assert_relative_eq!(next.x, (-1.0_f64).exp(), epsilon = 1e-12);
        assert_relative_eq!(next.y, -(-0.5_f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn test_small_dt_decay_negligible() {
        let next = model().propagate(&Vector3::new(0.1, 0.1, 0.1), 0.01);
        assert!((next.x - 0.1).abs() < 1e-5);
    }

    #[test]
    fn test_discrete_variance_bounded() {
        let m = model();
        let q = m.noise_intensity();
        let v = m.discrete_variance(&q, 1.0e6);
        assert_relative_eq!(v.x, 0.01 * 0.01, epsilon = 1e-12);

        // Short steps match the continuous intensity * dt
        let short = m.discrete_variance(&q, 0.01);
        assert_relative_eq!(short.x, q.x * 0.01, max_relative = 1e-3);
    }

    #[test]
    fn test_step_recursion_settles_at_sigma_squared() {
        // dt / tau = 0.1: large enough that a² differs visibly from 1
        let m = GaussMarkov::new(Vector3::new(0.018, 0.02, 0.03), Vector3::repeat(1.0));
        let dt = 0.1;
        let a = m.decay_factor(dt);
        let q_d = m.discrete_variance(&m.noise_intensity(), dt);

        let mut var = Vector3::repeat(0.25);
        for _ in 0..2000 {
            var = a.component_mul(&a).component_mul(&var) + q_d;
        }
        assert_relative_eq!(var, m.sigma.component_mul(&m.sigma), max_relative = 1e-9);
    }
}
