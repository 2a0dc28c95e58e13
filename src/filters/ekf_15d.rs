use log::{debug, info, warn};
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use super::config::NoiseModel;
use super::nav_state::NavState;
use crate::error::EkfError;
use crate::types::{
    GpsPosVec, JacobianGpsPos, KalmanGainGpsPos, NoiseInput15x12, Sample, StateMat15, StateVec15,
    ACCEL_BIAS_IDX, ACCEL_BIAS_NOISE_IDX, ACCEL_NOISE_IDX, ATT_IDX, GYRO_BIAS_IDX,
    GYRO_BIAS_NOISE_IDX, GYRO_NOISE_IDX, POS_IDX, VEL_IDX,
};

/// Serializable snapshot of the running filter
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ekf15State {
    /// Position in navigation frame (North, East, Down) [meters]
    pub position: (f64, f64, f64),

    /// Velocity in navigation frame [m/s]
    pub velocity: (f64, f64, f64),

    /// Roll, pitch, yaw [rad]
    pub euler: (f64, f64, f64),

    /// Quaternion (w, x, y, z) representing attitude
    pub quaternion: (f64, f64, f64, f64),

    /// Accel bias estimate [m/s²]
    pub accel_bias: (f64, f64, f64),

    /// Gyro bias estimate [rad/s]
    pub gyro_bias: (f64, f64, f64),

    /// Covariance trace for uncertainty
    pub covariance_trace: f64,

    /// Update counters
    pub fix_updates: u64,
    pub stale_samples: u64,
    pub singular_rejections: u64,
}

/// Estimate and covariance carried from one sample to the next
#[derive(Clone, Debug, PartialEq)]
pub struct FilterState {
    pub nav: NavState,
    pub covariance: StateMat15,
    pub last_time_us: u64,
    pub last_sequence: u64,
}

/// What happened to the position field of a sample
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FixStatus {
    /// New fix fused; carries the innovation (measured - predicted position)
    Applied { innovation: Vector3<f64> },
    /// Sequence number unchanged: nothing fused
    Stale,
    /// Innovation covariance not invertible: correction skipped
    Singular,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UpdateOutcome {
    /// Propagation interval [s]
    pub dt: f64,
    pub fix: FixStatus,
}

impl UpdateOutcome {
    /// True only when a position correction was applied
    pub fn measurement_available(&self) -> bool {
        matches!(self.fix, FixStatus::Applied { .. })
    }
}

enum Lifecycle {
    Configured,
    Running(Box<FilterState>),
}

/// 15-state error-state EKF: strapdown INS aided by position fixes
pub struct Ekf15 {
    noise: NoiseModel,
    lifecycle: Lifecycle,

    fix_updates: u64,
    stale_samples: u64,
    singular_rejections: u64,
}

impl Ekf15 {
    /// Create a filter from a configured noise model; call [`Ekf15::initialize`] next.
    pub fn new(noise: NoiseModel) -> Self {
        Self {
            noise,
            lifecycle: Lifecycle::Configured,
            fix_updates: 0,
            stale_samples: 0,
            singular_rejections: 0,
        }
    }

    pub fn noise(&self) -> &NoiseModel {
        &self.noise
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Running(_))
    }

    /// Seed the state from the first sample.
    ///
    /// Position comes from the fix, attitude is leveled from the specific
    /// force, velocity and biases start at zero.
    pub fn initialize(&mut self, first: &Sample) -> Result<(), EkfError> {
        if self.is_initialized() {
            return Err(EkfError::AlreadyInitialized);
        }

        let nav = NavState::leveled(first.position, &first.specific_force);
        let covariance = initial_covariance(&self.noise);
        info!(
            "EKF initialized at t={} us, roll={:.4} pitch={:.4} rad",
            first.timestamp_us,
            nav.euler().x,
            nav.euler().y
        );

        self.lifecycle = Lifecycle::Running(Box::new(FilterState {
            nav,
            covariance,
            last_time_us: first.timestamp_us,
            last_sequence: first.sequence_number,
        }));
        Ok(())
    }

    /// Time update only: the sample's position field is never fused.
    pub fn propagate(&mut self, sample: &Sample) -> Result<f64, EkfError> {
        let current = self.running()?;
        let (next, dt) = time_update(current, &self.noise, sample)?;
        self.commit(next);
        Ok(dt)
    }

    /// Propagate to the sample time, then fuse its fix if it is new.
    ///
    /// Either every correction is applied or none is: the stored state is
    /// replaced only after the full cycle succeeds.
    pub fn update(&mut self, sample: &Sample) -> Result<UpdateOutcome, EkfError> {
        let current = self.running()?;
        let is_new_fix = sample.has_new_fix(current.last_sequence);
        let (predicted, dt) = time_update(current, &self.noise, sample)?;

        if !is_new_fix {
            self.stale_samples += 1;
            self.commit(predicted);
            return Ok(UpdateOutcome {
                dt,
                fix: FixStatus::Stale,
            });
        }

        let fix = match measurement_update(&predicted, &self.noise, &sample.position) {
            Some((corrected, innovation)) => {
                debug!(
                    "Fix #{} fused at t={} us, innovation=({:.3}, {:.3}, {:.3}) m",
                    sample.sequence_number,
                    sample.timestamp_us,
                    innovation.x,
                    innovation.y,
                    innovation.z
                );
                self.fix_updates += 1;
                self.commit(corrected);
                FixStatus::Applied { innovation }
            }
            None => {
                warn!(
                    "Singular innovation covariance at t={} us; keeping propagated state",
                    sample.timestamp_us
                );
                self.singular_rejections += 1;
                self.commit(predicted);
                FixStatus::Singular
            }
        };
        Ok(UpdateOutcome { dt, fix })
    }

    /// Position(3), velocity(3), roll/pitch/yaw(3), accel bias(3), gyro bias(3)
    pub fn get_state(&self) -> Result<StateVec15, EkfError> {
        Ok(self.running()?.nav.to_vector())
    }

    /// Full 15×15 error covariance
    pub fn get_cov_full(&self) -> Result<StateMat15, EkfError> {
        Ok(self.running()?.covariance)
    }

    pub fn nav_state(&self) -> Result<&NavState, EkfError> {
        Ok(&self.running()?.nav)
    }

    pub fn filter_state(&self) -> Result<&FilterState, EkfError> {
        self.running()
    }

    pub fn snapshot(&self) -> Result<Ekf15State, EkfError> {
        let state = self.running()?;
        let nav = &state.nav;
        let q = nav.attitude.quaternion();
        let euler = nav.euler();
        Ok(Ekf15State {
            position: (nav.position.x, nav.position.y, nav.position.z),
            velocity: (nav.velocity.x, nav.velocity.y, nav.velocity.z),
            euler: (euler.x, euler.y, euler.z),
            quaternion: (q.w, q.i, q.j, q.k),
            accel_bias: (nav.accel_bias.x, nav.accel_bias.y, nav.accel_bias.z),
            gyro_bias: (nav.gyro_bias.x, nav.gyro_bias.y, nav.gyro_bias.z),
            covariance_trace: state.covariance.trace(),
            fix_updates: self.fix_updates,
            stale_samples: self.stale_samples,
            singular_rejections: self.singular_rejections,
        })
    }

    fn running(&self) -> Result<&FilterState, EkfError> {
        match &self.lifecycle {
            Lifecycle::Running(state) => Ok(state.as_ref()),
            Lifecycle::Configured => Err(EkfError::NotInitialized),
        }
    }

    fn commit(&mut self, next: FilterState) {
        self.lifecycle = Lifecycle::Running(Box::new(next));
    }
}

/// Block-diagonal initial covariance
fn initial_covariance(noise: &NoiseModel) -> StateMat15 {
    let mut p = StateMat15::zeros();
    let pos_var = noise.init_pos_sigma.component_mul(&noise.init_pos_sigma);
    p.fixed_view_mut::<3, 3>(POS_IDX, POS_IDX)
        .set_diagonal(&pos_var);
    p.fixed_view_mut::<3, 3>(VEL_IDX, VEL_IDX)
        .fill_diagonal(noise.init_vel_sigma.powi(2));
    p.fixed_view_mut::<3, 3>(ATT_IDX, ATT_IDX)
        .fill_diagonal(noise.init_orient_sigma.powi(2));
    p.fixed_view_mut::<3, 3>(ACCEL_BIAS_IDX, ACCEL_BIAS_IDX)
        .fill_diagonal(noise.init_accel_bias_sigma.powi(2));
    p.fixed_view_mut::<3, 3>(GYRO_BIAS_IDX, GYRO_BIAS_IDX)
        .fill_diagonal(noise.init_rot_rate_bias_sigma.powi(2));
    p
}

/// Strapdown propagation of the nominal state plus `P = Phi P Phi^T + Qd`.
pub fn time_update(
    current: &FilterState,
    noise: &NoiseModel,
    sample: &Sample,
) -> Result<(FilterState, f64), EkfError> {
    if sample.timestamp_us < current.last_time_us {
        return Err(EkfError::TimeWentBackwards {
            previous_us: current.last_time_us,
            current_us: sample.timestamp_us,
        });
    }
    let dt = (sample.timestamp_us - current.last_time_us) as f64 / 1e6;

    let nav = current
        .nav
        .mechanize(&sample.angular_rate, &sample.specific_force, noise, dt);

    // Linearize around the propagated attitude and bias-corrected inputs
    let omega = sample.angular_rate - current.nav.gyro_bias;
    let force = sample.specific_force - current.nav.accel_bias;
    let dcm = nav.dcm();
    let f = error_dynamics(&dcm, &omega, &force, noise);

    // ===== DISCRETIZATION =====
    let f_dt = f * dt;
    let mut phi = StateMat15::identity() + f_dt + f_dt * f_dt * 0.5;
    phi.fixed_view_mut::<3, 3>(ACCEL_BIAS_IDX, ACCEL_BIAS_IDX)
        .set_diagonal(&noise.accel_bias.decay_factor(dt));
    phi.fixed_view_mut::<3, 3>(GYRO_BIAS_IDX, GYRO_BIAS_IDX)
        .set_diagonal(&noise.gyro_bias.decay_factor(dt));

    // Trapezoidal rule on the white-noise channels; the Markov bias blocks
    // take their exact discrete variance so they settle at sigma²
    let q_white = white_noise(&dcm, noise, dt);
    let mut qd = (phi * q_white * phi.transpose() + q_white) * 0.5;
    set_bias_noise(&mut qd, noise, dt);

    // Propagate covariance: P = Phi * P * Phi^T + Qd
    let covariance = symmetrize(&(phi * current.covariance * phi.transpose() + qd));

    Ok((
        FilterState {
            nav,
            covariance,
            last_time_us: sample.timestamp_us,
            last_sequence: sample.sequence_number,
        },
        dt,
    ))
}

/// Position fix correction. `None` when the innovation covariance is singular.
pub fn measurement_update(
    predicted: &FilterState,
    noise: &NoiseModel,
    measured_position: &Vector3<f64>,
) -> Option<(FilterState, GpsPosVec)> {
    let p = &predicted.covariance;

    // Measurement matrix H (identity for position)
    let mut h = JacobianGpsPos::zeros();
    h.fixed_view_mut::<3, 3>(0, POS_IDX).fill_diagonal(1.0);

    let innovation: GpsPosVec = measured_position - predicted.nav.position;

    // Innovation covariance: S = H*P*H^T + R
    let s = h * p * h.transpose() + noise.r;
    let s_inv = s.try_inverse()?;
    if !s_inv.iter().all(|v| v.is_finite()) {
        return None;
    }

    // Kalman gain: K = P*H^T*S^-1
    let k: KalmanGainGpsPos = p * h.transpose() * s_inv;
    let dx: StateVec15 = k * innovation;
    let nav = predicted.nav.inject(&dx);

    // Joseph form keeps P PSD; equal to (I - KH) P for the optimal gain
    let i_minus_kh = StateMat15::identity() - k * h;
    let joseph = i_minus_kh * p * i_minus_kh.transpose() + k * noise.r * k.transpose();

    Some((
        FilterState {
            nav,
            covariance: symmetrize(&joseph),
            last_time_us: predicted.last_time_us,
            last_sequence: predicted.last_sequence,
        },
        innovation,
    ))
}

/// Continuous error-state dynamics `F`.
///
/// Error state: position, velocity, body-frame attitude angle, accel bias,
/// gyro bias.
fn error_dynamics(
    dcm: &Matrix3<f64>,
    omega: &Vector3<f64>,
    force: &Vector3<f64>,
    noise: &NoiseModel,
) -> StateMat15 {
    let mut f = StateMat15::zeros();

    // 1. Position depends on Velocity
    f.fixed_view_mut::<3, 3>(POS_IDX, VEL_IDX)
        .fill_diagonal(1.0);

    // 2. Velocity depends on Attitude Error: dV/dTheta = -C * [f]x
    f.fixed_view_mut::<3, 3>(VEL_IDX, ATT_IDX)
        .copy_from(&(-dcm * force.cross_matrix()));

    // 3. Velocity depends on Accel Bias: dV/db_a = -C
    f.fixed_view_mut::<3, 3>(VEL_IDX, ACCEL_BIAS_IDX)
        .copy_from(&(-dcm));

    // 4. Attitude error rotates with the body and depends on Gyro Bias
    f.fixed_view_mut::<3, 3>(ATT_IDX, ATT_IDX)
        .copy_from(&(-omega.cross_matrix()));
    f.fixed_view_mut::<3, 3>(ATT_IDX, GYRO_BIAS_IDX)
        .fill_diagonal(-1.0);

    // 5. Biases decay as first-order Markov processes
    f.fixed_view_mut::<3, 3>(ACCEL_BIAS_IDX, ACCEL_BIAS_IDX)
        .copy_from(&noise.accel_bias.decay_rate());
    f.fixed_view_mut::<3, 3>(GYRO_BIAS_IDX, GYRO_BIAS_IDX)
        .copy_from(&noise.gyro_bias.decay_rate());

    f
}

/// White-noise channels over one step: `G Q G^T dt` for velocity and attitude.
fn white_noise(dcm: &Matrix3<f64>, noise: &NoiseModel, dt: f64) -> StateMat15 {
    let mut g = NoiseInput15x12::zeros();
    g.fixed_view_mut::<3, 3>(VEL_IDX, ACCEL_NOISE_IDX)
        .copy_from(&(-dcm));
    g.fixed_view_mut::<3, 3>(ATT_IDX, GYRO_NOISE_IDX)
        .fill_diagonal(-1.0);

    g * noise.q * g.transpose() * dt
}

/// Discrete Gauss-Markov variance for the bias blocks, driven by the bias
/// intensities in `Q`.
fn set_bias_noise(qd: &mut StateMat15, noise: &NoiseModel, dt: f64) {
    let accel_q = noise
        .q
        .fixed_view::<3, 3>(ACCEL_BIAS_NOISE_IDX, ACCEL_BIAS_NOISE_IDX)
        .diagonal();
    let gyro_q = noise
        .q
        .fixed_view::<3, 3>(GYRO_BIAS_NOISE_IDX, GYRO_BIAS_NOISE_IDX)
        .diagonal();

    qd.fixed_view_mut::<3, 3>(ACCEL_BIAS_IDX, ACCEL_BIAS_IDX)
        .set_diagonal(&noise.accel_bias.discrete_variance(&accel_q, dt));
    qd.fixed_view_mut::<3, 3>(GYRO_BIAS_IDX, GYRO_BIAS_IDX)
        .set_diagonal(&noise.gyro_bias.discrete_variance(&gyro_q, dt));
}

fn symmetrize(p: &StateMat15) -> StateMat15 {
    (p + p.transpose()) * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::config::EkfConfig;
    use approx::assert_relative_eq;

    fn sample(t_us: u64, seq: u64, gravity: f64) -> Sample {
        Sample::new(
            t_us,
            seq,
            Vector3::zeros(),
            Vector3::new(0.0, 0.0, -gravity),
            Vector3::zeros(),
        )
    }

    fn filter(config: &EkfConfig) -> Ekf15 {
        Ekf15::new(config.configure().unwrap())
    }

    fn position_trace(p: &StateMat15) -> f64 {
        p.fixed_view::<3, 3>(POS_IDX, POS_IDX).trace()
    }

    fn assert_healthy(ekf: &Ekf15) {
        let state = ekf.filter_state().unwrap();
        assert_relative_eq!(state.nav.attitude.quaternion().norm(), 1.0, epsilon = 1e-6);

        let p = &state.covariance;
        assert_eq!(*p, p.transpose());
        for i in 0..15 {
            assert!(p[(i, i)] >= 0.0, "negative variance at {}: {}", i, p[(i, i)]);
        }
        let eig = p.symmetric_eigen().eigenvalues;
        let tolerance = 1e-9 * eig.max().max(1.0);
        assert!(eig.min() > -tolerance, "covariance not PSD: min eigenvalue {}", eig.min());
    }

    #[test]
    fn test_update_before_initialize() {
        let config = EkfConfig::default();
        let mut ekf = filter(&config);
        assert_eq!(
            ekf.update(&sample(0, 0, config.gravity)),
            Err(EkfError::NotInitialized)
        );
        assert_eq!(ekf.get_state(), Err(EkfError::NotInitialized));
        assert!(ekf.get_cov_full().is_err());
    }

    #[test]
    fn test_initialize_twice() {
        let config = EkfConfig::default();
        let mut ekf = filter(&config);
        ekf.initialize(&sample(0, 0, config.gravity)).unwrap();
        assert_eq!(
            ekf.initialize(&sample(0, 0, config.gravity)),
            Err(EkfError::AlreadyInitialized)
        );
    }

    #[test]
    fn test_deterministic_initialization() {
        let config = EkfConfig::default();
        let mut ekf = filter(&config);
        ekf.initialize(&sample(0, 0, config.gravity)).unwrap();

        let x = ekf.get_state().unwrap();
        for i in 0..15 {
            assert!(x[i].abs() < 1e-12, "state[{}] = {}", i, x[i]);
        }

        let p = ekf.get_cov_full().unwrap();
        assert_relative_eq!(p[(0, 0)], 0.05 * 0.05);
        assert_relative_eq!(p[(2, 2)], 0.05 * 0.05);
        assert_relative_eq!(p[(3, 3)], 0.01 * 0.01);
        assert_relative_eq!(p[(6, 6)], (std::f64::consts::PI / 12.0).powi(2));
        assert_relative_eq!(p[(9, 9)], 0.25);
        assert_relative_eq!(p[(14, 14)], 1e-6);
        assert_eq!(p[(0, 3)], 0.0);
        assert_eq!(p[(6, 12)], 0.0);
    }

    #[test]
    fn test_initialize_uses_fix_position() {
        let config = EkfConfig::default();
        let mut ekf = filter(&config);
        let mut first = sample(0, 3, config.gravity);
        first.position = Vector3::new(10.0, -5.0, 2.0);
        ekf.initialize(&first).unwrap();

        let nav = ekf.nav_state().unwrap();
        assert_eq!(nav.position, Vector3::new(10.0, -5.0, 2.0));
        assert_eq!(ekf.filter_state().unwrap().last_sequence, 3);
    }

    #[test]
    fn test_end_to_end_stationary() {
        // Tight attitude and accel-bias priors: with the default pi/12 tilt
        // uncertainty, g x dtheta pumps velocity variance faster than three
        // position fixes remove it, so the full trace may legitimately grow
        let config = EkfConfig {
            init_orient_sigma: 0.01,
            init_accel_bias_sigma: 0.05,
            ..EkfConfig::default()
        };
        let mut ekf = filter(&config);
        ekf.initialize(&sample(0, 0, config.gravity)).unwrap();

        let mut prev_trace = ekf.get_cov_full().unwrap().trace();
        for step in 1..=3u64 {
            let outcome = ekf.update(&sample(step * 10_000, step, config.gravity)).unwrap();
            assert!(outcome.measurement_available());
            assert_relative_eq!(outcome.dt, 0.01);

            let x = ekf.get_state().unwrap();
            assert!(x.fixed_rows::<9>(0).norm() < 1e-6);
            assert_healthy(&ekf);

            let trace = ekf.get_cov_full().unwrap().trace();
            assert!(
                trace <= prev_trace,
                "trace grew at step {}: {} -> {}",
                step,
                prev_trace,
                trace
            );
            prev_trace = trace;
        }
        assert_eq!(ekf.snapshot().unwrap().fix_updates, 3);
    }

    #[test]
    fn test_default_tuning_shrinks_position_uncertainty() {
        let config = EkfConfig::default();
        let mut ekf = filter(&config);
        ekf.initialize(&sample(0, 0, config.gravity)).unwrap();

        let mut prev = position_trace(&ekf.get_cov_full().unwrap());
        for step in 1..=3u64 {
            let outcome = ekf.update(&sample(step * 10_000, step, config.gravity)).unwrap();
            assert!(outcome.measurement_available());
            assert_healthy(&ekf);

            let trace = position_trace(&ekf.get_cov_full().unwrap());
            assert!(trace < prev, "position trace grew at step {}: {} -> {}", step, prev, trace);
            prev = trace;
        }
    }

    #[test]
    fn test_stale_measurement_is_pure_propagation() {
        let config = EkfConfig::default();
        let first = sample(0, 0, config.gravity);
        let mut fresh = sample(10_000, 1, config.gravity);
        fresh.position = Vector3::new(0.3, -0.2, 0.1);
        let mut stale = sample(20_000, 1, config.gravity);
        stale.position = Vector3::new(5.0, 5.0, 5.0);

        let mut a = filter(&config);
        a.initialize(&first).unwrap();
        a.update(&fresh).unwrap();
        let outcome = a.update(&stale).unwrap();
        assert_eq!(outcome.fix, FixStatus::Stale);
        assert!(!outcome.measurement_available());

        let mut b = filter(&config);
        b.initialize(&first).unwrap();
        b.update(&fresh).unwrap();
        b.propagate(&stale).unwrap();

        assert_eq!(a.filter_state().unwrap(), b.filter_state().unwrap());
        assert_eq!(a.snapshot().unwrap().stale_samples, 1);
    }

    #[test]
    fn test_gain_reduces_position_uncertainty() {
        let config = EkfConfig::default();
        let first = sample(0, 0, config.gravity);
        let mut fix = sample(100_000, 1, config.gravity);
        fix.position = Vector3::new(0.1, 0.1, -0.1);

        let mut propagated = filter(&config);
        propagated.initialize(&first).unwrap();
        propagated.propagate(&fix).unwrap();

        let mut corrected = filter(&config);
        corrected.initialize(&first).unwrap();
        let outcome = corrected.update(&fix).unwrap();

        match outcome.fix {
            FixStatus::Applied { innovation } => {
                assert_relative_eq!(innovation, Vector3::new(0.1, 0.1, -0.1), epsilon = 1e-9)
            }
            other => panic!("expected applied fix, got {:?}", other),
        }

        let before = position_trace(&propagated.get_cov_full().unwrap());
        let after = position_trace(&corrected.get_cov_full().unwrap());
        assert!(after <= before);

        // Correction pulls the estimate toward the fix
        let x = corrected.get_state().unwrap();
        assert!(x[0] > 0.0 && x[0] < 0.1);
        assert!(x[2] < 0.0 && x[2] > -0.1);
    }

    #[test]
    fn test_time_went_backwards_leaves_state() {
        let config = EkfConfig::default();
        let mut ekf = filter(&config);
        ekf.initialize(&sample(50_000, 0, config.gravity)).unwrap();
        let before = ekf.filter_state().unwrap().clone();

        assert_eq!(
            ekf.update(&sample(40_000, 1, config.gravity)),
            Err(EkfError::TimeWentBackwards {
                previous_us: 50_000,
                current_us: 40_000
            })
        );
        assert_eq!(ekf.filter_state().unwrap(), &before);
    }

    #[test]
    fn test_singular_innovation_skips_correction() {
        let config = EkfConfig::default();
        let mut noise = config.configure().unwrap();
        noise.r = noise.r * f64::NAN;
        let mut ekf = Ekf15::new(noise);
        ekf.initialize(&sample(0, 0, config.gravity)).unwrap();

        let mut fix = sample(10_000, 1, config.gravity);
        fix.position = Vector3::new(1.0, 1.0, 1.0);
        let outcome = ekf.update(&fix).unwrap();
        assert_eq!(outcome.fix, FixStatus::Singular);
        assert!(!outcome.measurement_available());

        // Propagated state survives untouched by the fix
        let x = ekf.get_state().unwrap();
        assert!(x.fixed_rows::<3>(0).norm() < 1e-12);
        assert_eq!(ekf.snapshot().unwrap().singular_rejections, 1);
    }

    #[test]
    fn test_maneuvering_keeps_invariants() {
        let config = EkfConfig::default();
        let mut ekf = filter(&config);
        ekf.initialize(&sample(0, 0, config.gravity)).unwrap();

        let mut seq = 0;
        for i in 1..=500u64 {
            let t = i as f64 * 0.01;
            if i % 10 == 0 {
                seq += 1;
            }
            let s = Sample::new(
                i * 10_000,
                seq,
                Vector3::new(0.2 * t.sin(), -0.1 * t.cos(), 0.3),
                Vector3::new(0.5 * t.cos(), 0.3 * t.sin(), -config.gravity + 0.1 * t.sin()),
                Vector3::new(t, 0.5 * t, -0.1 * t),
            );
            let outcome = ekf.update(&s).unwrap();
            assert_eq!(outcome.measurement_available(), i % 10 == 0);
            assert_healthy(&ekf);
        }
    }

    #[test]
    fn test_long_dead_reckoning_stays_bounded() {
        let config = EkfConfig::default();
        let mut ekf = filter(&config);
        ekf.initialize(&sample(0, 0, config.gravity)).unwrap();

        for i in 1..=6000u64 {
            ekf.update(&sample(i * 10_000, 0, config.gravity)).unwrap();
        }
        assert_healthy(&ekf);

        let p = ekf.get_cov_full().unwrap();
        assert!(p.iter().all(|v| v.is_finite()));
        // Bias variance never exceeds its initial/stationary level
        assert!(p[(9, 9)] <= 0.25 + 1e-12);
        // Uncertainty grows without fixes
        assert!(position_trace(&p) > 3.0 * 0.05 * 0.05);
    }

    #[test]
    fn test_bias_estimate_decays_between_fixes() {
        let config = EkfConfig {
            accel_tau: Vector3::repeat(1.0),
            ..EkfConfig::default()
        };
        let mut ekf = filter(&config);
        ekf.initialize(&sample(0, 0, config.gravity)).unwrap();
        if let Lifecycle::Running(state) = &mut ekf.lifecycle {
            state.nav.accel_bias = Vector3::new(0.2, 0.0, 0.0);
        }

        ekf.propagate(&sample(1_000_000, 0, config.gravity)).unwrap();
        let bias = ekf.nav_state().unwrap().accel_bias;
        assert_relative_eq!(bias.x, 0.2 * (-1.0_f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn test_bias_variance_settles_at_markov_sigma() {
        // dt / tau = 0.1 so the per-step decay is far from 1
        let config = EkfConfig {
            accel_tau: Vector3::repeat(1.0),
            rot_rate_tau: Vector3::repeat(1.0),
            ..EkfConfig::default()
        };
        let mut ekf = filter(&config);
        ekf.initialize(&sample(0, 0, config.gravity)).unwrap();

        for i in 1..=2000u64 {
            ekf.propagate(&sample(i * 100_000, 0, config.gravity)).unwrap();
        }

        let p = ekf.get_cov_full().unwrap();
        for axis in 0..3 {
            let accel_var = config.accel_markov_sigma[axis].powi(2);
            let gyro_var = config.rot_rate_markov_sigma[axis].powi(2);
            let i = ACCEL_BIAS_IDX + axis;
            let j = GYRO_BIAS_IDX + axis;
            assert_relative_eq!(p[(i, i)], accel_var, max_relative = 1e-9);
            assert_relative_eq!(p[(j, j)], gyro_var, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_zero_dt_is_identity_on_state() {
        let config = EkfConfig::default();
        let mut ekf = filter(&config);
        ekf.initialize(&sample(0, 0, config.gravity)).unwrap();
        let before = ekf.filter_state().unwrap().clone();

        ekf.propagate(&sample(0, 0, config.gravity)).unwrap();
        let after = ekf.filter_state().unwrap();
        assert_eq!(after.nav.position, before.nav.position);
        assert_eq!(after.nav.velocity, before.nav.velocity);
        assert!(after.nav.attitude.angle_to(&before.nav.attitude) < 1e-12);
        assert_relative_eq!(after.covariance, before.covariance, epsilon = 1e-15);
    }
}
