//! Planar pose EKF driven by odometry and corrected by beacon range/bearing.
//!
//! State Vector (3D):
//! [0]: x in the table frame [mm]
//! [1]: y in the table frame [mm]
//! [2]: theta, heading wrapped to (-π, π] [rad]
//!
//! Beacon observations are fused one at a time, each with its own 2x2
//! measurement covariance, so a partially visible map still corrects.

use serde::{Deserialize, Serialize};

use super::motion::MotionInput;
use crate::angle::wrap_angle;
use crate::beacons::matcher::predict_measurement;
use crate::beacons::BeaconMap;
use crate::config::FilterConfig;
use crate::error::Result;
use crate::types::{
    BeaconMeasVec, BeaconNoise, ControlJacobian, ControlNoise, JacobianBeacon, KalmanGainBeacon,
    Observation, Pose, StateMat, StateVec,
};

/// Yaw rates below this use the straight-line motion model [rad/s]
const STRAIGHT_LINE_W: f64 = 1e-5;

/// Squared range below which a beacon is treated as coincident with the robot [mm²]
const MIN_RANGE_SQ: f64 = 1e-9;

/// Delta-mode process noise: sigma = DELTA_NOISE_GAIN * |step| + floor
const DELTA_NOISE_GAIN: f64 = 0.2;
const DELTA_NOISE_FLOOR_XY: f64 = 5.0; // mm
const DELTA_NOISE_FLOOR_THETA: f64 = 0.01; // rad

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoseEkfState {
    pub pose: Pose,
    pub covariance_trace: f64,
    pub predicts: u64,
    pub updates: u64,
}

#[derive(Clone, Debug)]
pub struct PoseEkf {
    /// State vector [3D]
    state: StateVec,

    /// Covariance matrix [3x3]
    covariance: StateMat,

    /// Restored on `reset`
    initial_covariance: StateMat,

    /// diag(sigma_v², sigma_w²)
    control_noise: ControlNoise,

    predicts: u64,
    updates: u64,
}

impl PoseEkf {
    pub fn new(config: &FilterConfig) -> Result<Self> {
        config.validate()?;
        let pose = Pose::new(
            config.init_x_mm,
            config.init_y_mm,
            wrap_angle(config.init_theta_deg.to_radians()),
        );
        let sigma_xy = config.init_sigma_xy_mm;
        let sigma_theta = config.init_sigma_theta_deg.to_radians();
        let initial_covariance = StateMat::from_diagonal(&StateVec::new(
            sigma_xy * sigma_xy,
            sigma_xy * sigma_xy,
            sigma_theta * sigma_theta,
        ));

        Ok(Self {
            state: pose.to_state(),
            covariance: initial_covariance,
            initial_covariance,
            control_noise: ControlNoise::new(
                config.sigma_v * config.sigma_v,
                0.0,
                0.0,
                config.sigma_w * config.sigma_w,
            ),
            predicts: 0,
            updates: 0,
        })
    }

    pub fn pose(&self) -> Pose {
        Pose::from_state(&self.state)
    }

    pub fn covariance(&self) -> &StateMat {
        &self.covariance
    }

    pub fn trace(&self) -> f64 {
        self.covariance.trace()
    }

    pub fn get_state(&self) -> PoseEkfState {
        PoseEkfState {
            pose: self.pose(),
            covariance_trace: self.trace(),
            predicts: self.predicts,
            updates: self.updates,
        }
    }

    /// Move to `pose` and restore the initial covariance.
    pub fn reset(&mut self, pose: Pose) {
        self.state = Pose::new(pose.x, pose.y, wrap_angle(pose.theta)).to_state();
        self.covariance = self.initial_covariance;
    }

    /// Propagate the pose with one odometry increment.
    ///
    /// Invalid input is rejected before anything is touched.
    pub fn predict(&mut self, motion: &MotionInput) -> Result<()> {
        motion.validate()?;

        match *motion {
            MotionInput::Velocity { v, w, dt } => {
                let theta = self.state[2];
                let (dxr, dyr) = body_displacement(v, w, dt);
                let (s, c) = theta.sin_cos();

                self.state[0] += c * dxr - s * dyr;
                self.state[1] += s * dxr + c * dyr;
                self.state[2] = wrap_angle(theta + w * dt);

                let mut f = StateMat::identity();
                f[(0, 2)] = -s * dxr - c * dyr;
                f[(1, 2)] = c * dxr - s * dyr;

                // Noise enters through (v, w)
                let g = ControlJacobian::new(c * dt, 0.0, s * dt, 0.0, 0.0, dt);
                let q = g * self.control_noise * g.transpose();

                self.covariance = f * self.covariance * f.transpose() + q;
            }
            MotionInput::Delta { dx, dy, dtheta } => {
                self.state[0] += dx;
                self.state[1] += dy;
                self.state[2] = wrap_angle(self.state[2] + dtheta);

                let sx = DELTA_NOISE_GAIN * dx.abs() + DELTA_NOISE_FLOOR_XY;
                let sy = DELTA_NOISE_GAIN * dy.abs() + DELTA_NOISE_FLOOR_XY;
                let st = DELTA_NOISE_GAIN * dtheta.abs() + DELTA_NOISE_FLOOR_THETA;
                self.covariance +=
                    StateMat::from_diagonal(&StateVec::new(sx * sx, sy * sy, st * st));
            }
        }

        self.symmetrize();
        self.predicts += 1;
        Ok(())
    }

    /// Fuse matched observations sequentially. Returns how many were applied.
    pub fn correct(&mut self, observations: &[Observation], beacons: &BeaconMap) -> usize {
        let mut applied = 0;
        for obs in observations {
            let Some(beacon) = beacons.get(&obs.beacon_id) else {
                log::warn!("Skipping observation of unknown beacon {:?}", obs.beacon_id);
                continue;
            };
            if self.update_beacon(obs, beacon.x, beacon.y) {
                applied += 1;
            } else {
                log::warn!("Skipping degenerate update for beacon {}", obs.beacon_id);
            }
        }
        applied
    }

    /// Single range/bearing update against a landmark at (bx, by).
    fn update_beacon(&mut self, obs: &Observation, bx: f64, by: f64) -> bool {
        let pose = self.pose();
        let dx = bx - pose.x;
        let dy = by - pose.y;
        let q = dx * dx + dy * dy;
        if q < MIN_RANGE_SQ {
            return false;
        }
        let r = q.sqrt();

        let (r_hat, b_hat) = predict_measurement(&pose, bx, by);
        let innovation = BeaconMeasVec::new(obs.range() - r_hat, wrap_angle(obs.bearing() - b_hat));

        let h = JacobianBeacon::new(-dx / r, -dy / r, 0.0, dy / q, -dx / q, -1.0);
        let s_mat: BeaconNoise = h * self.covariance * h.transpose() + obs.r;
        let Some(s_inv) = s_mat.try_inverse() else {
            return false;
        };
        let k: KalmanGainBeacon = self.covariance * h.transpose() * s_inv;

        let new_state = self.state + k * innovation;
        let new_cov = (StateMat::identity() - k * h) * self.covariance;
        if !(new_state.iter().all(|v| v.is_finite()) && new_cov.iter().all(|v| v.is_finite())) {
            return false;
        }

        self.state = new_state;
        self.state[2] = wrap_angle(self.state[2]);
        self.covariance = new_cov;
        self.symmetrize();
        self.updates += 1;
        true
    }

    fn symmetrize(&mut self) {
        self.covariance = (self.covariance + self.covariance.transpose()) * 0.5;
    }
}

/// Displacement in the robot frame for a constant (v, w) over dt.
fn body_displacement(v: f64, w: f64, dt: f64) -> (f64, f64) {
    if w.abs() < STRAIGHT_LINE_W {
        (v * dt, 0.0)
    } else {
        let wt = w * dt;
        (v / w * wt.sin(), v / w * (1.0 - wt.cos()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beacons::{Beacon, BeaconMatcher};
    use crate::config::MatcherConfig;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};
    use std::f64::consts::FRAC_PI_2;

    fn table() -> BeaconMap {
        BeaconMap::new(vec![
            Beacon::new("A", 50.0, -1594.0),
            Beacon::new("B", 1950.0, -1594.0),
            Beacon::new("C", 1000.0, 1594.0),
        ])
        .unwrap()
    }

    fn noise() -> BeaconNoise {
        BeaconMatcher::new(&MatcherConfig::default()).unwrap().measurement_noise(0)
    }

    #[test]
    fn test_initial_state() {
        let ekf = PoseEkf::new(&FilterConfig::default()).unwrap();
        assert_eq!(ekf.pose(), Pose::new(500.0, 0.0, 0.0));
        assert_relative_eq!(ekf.covariance()[(0, 0)], 160_000.0);
        assert_relative_eq!(ekf.covariance()[(2, 2)], 5.0_f64.to_radians().powi(2));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = FilterConfig {
            sigma_v: 0.0,
            ..FilterConfig::default()
        };
        assert!(PoseEkf::new(&config).is_err());
        let config = FilterConfig {
            init_x_mm: f64::NAN,
            ..FilterConfig::default()
        };
        assert!(PoseEkf::new(&config).is_err());
    }

    #[test]
    fn test_straight_line_velocity() {
        let mut ekf = PoseEkf::new(&FilterConfig::default()).unwrap();
        ekf.reset(Pose::new(0.0, 0.0, FRAC_PI_2));
        ekf.predict(&MotionInput::velocity(100.0, 0.0, 1.0)).unwrap();
        let pose = ekf.pose();
        assert_relative_eq!(pose.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(pose.y, 100.0, epsilon = 1e-9);
        assert_relative_eq!(pose.theta, FRAC_PI_2);

        // Below the threshold the arc model is not used
        ekf.reset(Pose::new(0.0, 0.0, 0.0));
        ekf.predict(&MotionInput::velocity(100.0, 5e-6, 1.0)).unwrap();
        assert_relative_eq!(ekf.pose().y, 0.0);
    }

    #[test]
    fn test_quarter_turn_arc() {
        let mut ekf = PoseEkf::new(&FilterConfig::default()).unwrap();
        ekf.reset(Pose::new(0.0, 0.0, 0.0));
        ekf.predict(&MotionInput::velocity(100.0, FRAC_PI_2, 1.0)).unwrap();
        let radius = 100.0 / FRAC_PI_2;
        let pose = ekf.pose();
        assert_relative_eq!(pose.x, radius, epsilon = 1e-9);
        assert_relative_eq!(pose.y, radius, epsilon = 1e-9);
        assert_relative_eq!(pose.theta, FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn test_heading_wraps_through_pi() {
        let mut ekf = PoseEkf::new(&FilterConfig::default()).unwrap();
        ekf.reset(Pose::new(0.0, 0.0, 3.1));
        ekf.predict(&MotionInput::delta(0.0, 0.0, 0.1)).unwrap();
        let theta = ekf.pose().theta;
        assert!(theta < 0.0 && theta > -std::f64::consts::PI);
        assert_relative_eq!(theta, 3.2 - std::f64::consts::TAU, epsilon = 1e-12);
    }

    #[test]
    fn test_velocity_covariance_matches_jacobians() {
        let mut ekf = PoseEkf::new(&FilterConfig::default()).unwrap();
        let theta = 0.7;
        ekf.reset(Pose::new(100.0, -50.0, theta));
        let p0 = *ekf.covariance();
        let (v, w, dt) = (250.0, 0.4, 0.2);
        ekf.predict(&MotionInput::velocity(v, w, dt)).unwrap();

        let (dxr, dyr) = body_displacement(v, w, dt);
        let (s, c) = theta.sin_cos();
        let mut f = StateMat::identity();
        f[(0, 2)] = -s * dxr - c * dyr;
        f[(1, 2)] = c * dxr - s * dyr;
        let g = ControlJacobian::new(c * dt, 0.0, s * dt, 0.0, 0.0, dt);
        let m = ControlNoise::new(30.0 * 30.0, 0.0, 0.0, 0.05 * 0.05);
        let expected = f * p0 * f.transpose() + g * m * g.transpose();

        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(ekf.covariance()[(i, j)], expected[(i, j)], epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_heading_jacobian_matches_finite_difference() {
        let (v, w, dt) = (180.0, -0.9, 0.3);
        let propagate = |theta: f64| {
            let (dxr, dyr) = body_displacement(v, w, dt);
            let (s, c) = theta.sin_cos();
            (c * dxr - s * dyr, s * dxr + c * dyr)
        };
        let theta = -1.1;
        let h = 1e-7;
        let (x1, y1) = propagate(theta + h);
        let (x0, y0) = propagate(theta - h);

        let (dxr, dyr) = body_displacement(v, w, dt);
        let (s, c) = theta.sin_cos();
        assert_relative_eq!((x1 - x0) / (2.0 * h), -s * dxr - c * dyr, epsilon = 1e-5);
        assert_relative_eq!((y1 - y0) / (2.0 * h), c * dxr - s * dyr, epsilon = 1e-5);
    }

    #[test]
    fn test_delta_process_noise() {
        let mut ekf = PoseEkf::new(&FilterConfig::default()).unwrap();
        let p0 = *ekf.covariance();
        ekf.predict(&MotionInput::delta(100.0, -50.0, 0.2)).unwrap();
        let p = ekf.covariance();
        assert_relative_eq!(p[(0, 0)] - p0[(0, 0)], 25.0_f64.powi(2), epsilon = 1e-9);
        assert_relative_eq!(p[(1, 1)] - p0[(1, 1)], 15.0_f64.powi(2), epsilon = 1e-9);
        assert_relative_eq!(p[(2, 2)] - p0[(2, 2)], 0.05_f64.powi(2), epsilon = 1e-12);
        assert_eq!(p[(0, 1)], 0.0);
        assert_eq!(ekf.pose(), Pose::new(600.0, -50.0, 0.2));
    }

    #[test]
    fn test_invalid_motion_leaves_state_untouched() {
        let mut ekf = PoseEkf::new(&FilterConfig::default()).unwrap();
        let before = ekf.clone();
        assert!(ekf.predict(&MotionInput::velocity(100.0, 0.0, 0.0)).is_err());
        assert!(ekf.predict(&MotionInput::velocity(f64::NAN, 0.0, 0.1)).is_err());
        assert!(ekf.predict(&MotionInput::delta(0.0, f64::INFINITY, 0.0)).is_err());
        assert_eq!(ekf.pose(), before.pose());
        assert_eq!(ekf.covariance(), before.covariance());
        assert_eq!(ekf.get_state().predicts, 0);
    }

    #[test]
    fn test_empty_correction_is_noop() {
        let mut ekf = PoseEkf::new(&FilterConfig::default()).unwrap();
        let before = ekf.clone();
        assert_eq!(ekf.correct(&[], &table()), 0);
        assert_eq!(ekf.pose(), before.pose());
        assert_eq!(ekf.covariance(), before.covariance());
    }

    #[test]
    fn test_zero_innovation_keeps_state() {
        let map = table();
        let mut ekf = PoseEkf::new(&FilterConfig::default()).unwrap();
        ekf.reset(Pose::new(730.0, 210.0, 0.3));
        let before_pose = ekf.pose();
        let before_trace = ekf.trace();

        let observations: Vec<Observation> = map
            .iter()
            .map(|b| {
                let (r, bearing) = predict_measurement(&before_pose, b.x, b.y);
                Observation::new(b.id.clone(), r, bearing, noise())
            })
            .collect();
        assert_eq!(ekf.correct(&observations, &map), 3);

        let after = ekf.pose();
        assert_eq!(after.x, before_pose.x);
        assert_eq!(after.y, before_pose.y);
        assert_eq!(after.theta, before_pose.theta);
        // Information still shrinks the covariance, never grows it
        assert!(ekf.trace() <= before_trace);
        let p = ekf.covariance();
        assert_eq!(p, &p.transpose());
    }

    #[test]
    fn test_skips_unknown_and_coincident_beacons() {
        let map = BeaconMap::new(vec![Beacon::new("A", 500.0, 0.0)]).unwrap();
        let mut ekf = PoseEkf::new(&FilterConfig::default()).unwrap();
        let before = ekf.clone();
        let obs = vec![
            Observation::new("Z", 1000.0, 0.0, noise()),
            Observation::new("A", 0.0, 0.0, noise()),
        ];
        assert_eq!(ekf.correct(&obs, &map), 0);
        assert_eq!(ekf.pose(), before.pose());
        assert_eq!(ekf.covariance(), before.covariance());
    }

    #[test]
    fn test_single_beacon_pulls_range() {
        // Robot believes it is 100 mm further from B than the sensor says.
        let map = table();
        let mut ekf = PoseEkf::new(&FilterConfig::default()).unwrap();
        let truth = Pose::new(500.0, 0.0, 0.0);
        let (r, b) = predict_measurement(&truth, 1950.0, -1594.0);
        ekf.reset(Pose::new(500.0 - 60.0, 80.0, 0.0));
        let r_before = ekf.pose().distance_to(1950.0, -1594.0);
        assert_eq!(ekf.correct(&[Observation::new("B", r, b, noise())], &map), 1);
        let r_after = ekf.pose().distance_to(1950.0, -1594.0);
        assert!((r_after - r).abs() < (r_before - r).abs());
    }

    #[test]
    fn test_converges_with_noisy_beacons() {
        let map = table();
        let truth = Pose::new(500.0, 0.0, 0.0);
        let mut ekf = PoseEkf::new(&FilterConfig::default()).unwrap();
        ekf.reset(Pose::new(650.0, -180.0, 3.0_f64.to_radians()));

        let mut rng = StdRng::seed_from_u64(7);
        let range_noise = Normal::new(0.0, 30.0).unwrap();
        let bearing_noise = Normal::new(0.0, 1.0_f64.to_radians()).unwrap();

        let mut last_trace = f64::INFINITY;
        for cycle in 0..50 {
            ekf.predict(&MotionInput::still(0.1)).unwrap();
            let observations: Vec<Observation> = map
                .iter()
                .map(|b| {
                    let (r, bearing) = predict_measurement(&truth, b.x, b.y);
                    Observation::new(
                        b.id.clone(),
                        r + range_noise.sample(&mut rng),
                        wrap_angle(bearing + bearing_noise.sample(&mut rng)),
                        noise(),
                    )
                })
                .collect();
            assert_eq!(ekf.correct(&observations, &map), 3);

            let trace = ekf.trace();
            assert!(
                trace <= last_trace * (1.0 + 1e-12),
                "cycle {}: trace grew {} -> {}",
                cycle,
                last_trace,
                trace
            );
            last_trace = trace;
        }

        let pose = ekf.pose();
        let err = pose.distance_to(truth.x, truth.y);
        assert!(err < 50.0, "position error {} mm", err);
        assert!(pose.theta.abs() < 3.0_f64.to_radians());
    }
}
