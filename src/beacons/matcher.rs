//! Beacon association: predict each beacon's (range, bearing) from the
//! current pose, gate the scan around it, keep the best candidate.

use std::collections::BTreeMap;

use super::score::{build_score, MatchScore};
use super::{BeaconMap, MissCounters};
use crate::angle::{angle_diff, wrap_angle};
use crate::config::MatcherConfig;
use crate::error::Result;
use crate::types::{BeaconNoise, Observation, Pose, Scan};

/// Matcher output for one scan.
#[derive(Clone, Debug, Default)]
pub struct MatchOutcome {
    pub observations: Vec<Observation>,
    /// `true` while the beacon's miss counter is zero
    pub visibility: BTreeMap<String, bool>,
}

pub struct BeaconMatcher {
    bearing_window: f64,
    range_window: f64,
    sigma_r: f64,
    sigma_b: f64,
    miss_inflation: f64,
    score: Box<dyn MatchScore>,
}

/// Expected measurement of a landmark seen from `pose`: (range, bearing).
pub fn predict_measurement(pose: &Pose, bx: f64, by: f64) -> (f64, f64) {
    let dx = bx - pose.x;
    let dy = by - pose.y;
    (dx.hypot(dy), wrap_angle(dy.atan2(dx) - pose.theta))
}

impl BeaconMatcher {
    pub fn new(config: &MatcherConfig) -> Result<Self> {
        config.validate()?;
        let sigma_r = config.sigma_r_mm;
        let sigma_b = config.sigma_b_deg.to_radians();
        Ok(Self {
            bearing_window: config.bearing_window_deg.to_radians(),
            range_window: config.range_window_mm,
            sigma_r,
            sigma_b,
            miss_inflation: config.miss_inflation,
            score: build_score(config.score, sigma_r, sigma_b),
        })
    }

    /// Swap the candidate ranking.
    pub fn with_score(mut self, score: Box<dyn MatchScore>) -> Self {
        self.score = score;
        self
    }

    /// Measurement covariance for a beacon with `miss` recent misses.
    pub fn measurement_noise(&self, miss: u32) -> BeaconNoise {
        let factor = 1.0 + self.miss_inflation * miss as f64;
        BeaconNoise::new(
            (self.sigma_r * factor).powi(2),
            0.0,
            0.0,
            (self.sigma_b * factor).powi(2),
        )
    }

    pub fn match_beacons(
        &self,
        pose: &Pose,
        scan: &Scan,
        beacons: &BeaconMap,
        misses: &mut MissCounters,
    ) -> MatchOutcome {
        let mut observations = Vec::with_capacity(beacons.len());

        for beacon in beacons.iter() {
            let (r_hat, b_hat) = predict_measurement(pose, beacon.x, beacon.y);

            let mut best: Option<(f64, f64, f64)> = None; // (score, range, bearing)
            for sample in scan.iter() {
                let bearing = sample.bearing_rad();
                let db = angle_diff(bearing, b_hat);
                let dr = sample.distance_mm - r_hat;
                if db.abs() > self.bearing_window || dr.abs() > self.range_window {
                    continue;
                }
                let score = self.score.score(dr, db);
                if best.map_or(true, |(s, _, _)| score < s) {
                    best = Some((score, sample.distance_mm, bearing));
                }
            }

            match best {
                None => {
                    let miss = misses.record_miss(&beacon.id);
                    log::debug!("Beacon {} not found (miss {})", beacon.id, miss);
                }
                Some((score, range, bearing)) => {
                    let miss = misses.record_hit(&beacon.id);
                    log::debug!(
                        "Beacon {} matched r={:.0} b={:.2}° score={:.2} miss={}",
                        beacon.id,
                        range,
                        bearing.to_degrees(),
                        score,
                        miss
                    );
                    observations.push(Observation::new(
                        beacon.id.clone(),
                        range,
                        bearing,
                        self.measurement_noise(miss),
                    ));
                }
            }
        }

        MatchOutcome {
            observations,
            visibility: misses.visibility(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beacons::{Beacon, MahalanobisScore};
    use crate::types::Sample;
    use approx::assert_relative_eq;

    fn table() -> BeaconMap {
        BeaconMap::new(vec![
            Beacon::new("A", 50.0, -1594.0),
            Beacon::new("B", 1950.0, -1594.0),
            Beacon::new("C", 1000.0, 1594.0),
        ])
        .unwrap()
    }

    /// Sample at a robot-frame bearing (rad) and range.
    fn at(bearing: f64, range: f64, quality: u8) -> Sample {
        Sample::new(bearing.to_degrees().rem_euclid(360.0), range, quality, false)
    }

    fn background() -> Vec<Sample> {
        (0..360).map(|deg| Sample::new(deg as f64, 5000.0, 10, false)).collect()
    }

    #[test]
    fn test_prefers_exact_prediction_over_out_of_window_sample() {
        let map = BeaconMap::new(vec![Beacon::new("B", 1950.0, -1594.0)]).unwrap();
        let pose = Pose::new(500.0, 0.0, 0.0);
        let (r_hat, b_hat) = predict_measurement(&pose, 1950.0, -1594.0);

        let scan = Scan::new(vec![
            at(b_hat, r_hat + 400.0, 63), // strong but outside the range window
            at(b_hat, r_hat, 5),
        ]);
        let matcher = BeaconMatcher::new(&MatcherConfig::default()).unwrap();
        let mut misses = MissCounters::new(&map, 8);
        let out = matcher.match_beacons(&pose, &scan, &map, &mut misses);

        assert_eq!(out.observations.len(), 1);
        let obs = &out.observations[0];
        assert_eq!(obs.beacon_id, "B");
        assert_relative_eq!(obs.range(), r_hat, epsilon = 1e-9);
        assert_relative_eq!(obs.bearing(), b_hat, epsilon = 1e-9);
        assert_eq!(out.visibility.get("B"), Some(&true));
    }

    #[test]
    fn test_picks_lowest_score_and_first_on_ties() {
        let map = BeaconMap::new(vec![Beacon::new("B", 1950.0, -1594.0)]).unwrap();
        let pose = Pose::new(500.0, 0.0, 0.0);
        let (r_hat, b_hat) = predict_measurement(&pose, 1950.0, -1594.0);

        let scan = Scan::new(vec![
            at(b_hat, r_hat + 60.0, 40),
            at(b_hat, r_hat - 20.0, 40),
            at(b_hat, r_hat + 20.0, 40),
        ]);
        let matcher = BeaconMatcher::new(&MatcherConfig::default()).unwrap();
        let mut misses = MissCounters::new(&map, 8);
        let out = matcher.match_beacons(&pose, &scan, &map, &mut misses);
        assert_relative_eq!(out.observations[0].range(), r_hat - 20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_custom_score_changes_the_pick() {
        let map = BeaconMap::new(vec![Beacon::new("B", 1950.0, -1594.0)]).unwrap();
        let pose = Pose::new(500.0, 0.0, 0.0);
        let (r_hat, b_hat) = predict_measurement(&pose, 1950.0, -1594.0);
        // 2σ in range only vs 1.2σ on both axes
        let scan = Scan::new(vec![
            at(b_hat, r_hat + 60.0, 40),
            at(b_hat + 1.2_f64.to_radians(), r_hat + 36.0, 40),
        ]);
        let config = MatcherConfig::default();

        let l1 = BeaconMatcher::new(&config).unwrap();
        let mut misses = MissCounters::new(&map, 8);
        let out = l1.match_beacons(&pose, &scan, &map, &mut misses);
        assert_relative_eq!(out.observations[0].range(), r_hat + 60.0, epsilon = 1e-9);

        let mahalanobis = BeaconMatcher::new(&config)
            .unwrap()
            .with_score(Box::new(MahalanobisScore {
                sigma_r: 30.0,
                sigma_b: 1.0_f64.to_radians(),
            }));
        let mut misses = MissCounters::new(&map, 8);
        let out = mahalanobis.match_beacons(&pose, &scan, &map, &mut misses);
        assert_relative_eq!(out.observations[0].range(), r_hat + 36.0, epsilon = 1e-9);
    }

    #[test]
    fn test_gate_straddles_the_seam() {
        // Robot faces +x; a beacon straight behind sits at bearing ±π.
        let map = BeaconMap::new(vec![Beacon::new("R", -1000.0, 0.0)]).unwrap();
        let pose = Pose::new(0.0, 0.0, 0.0);
        let (r_hat, b_hat) = predict_measurement(&pose, -1000.0, 0.0);
        assert_relative_eq!(b_hat.abs(), std::f64::consts::PI, epsilon = 1e-12);

        let matcher = BeaconMatcher::new(&MatcherConfig::default()).unwrap();
        for offset_deg in [-5.0_f64, -1.0, 1.0, 5.0] {
            // 175°..185° in sensor degrees, both sides of the seam
            let sample = Sample::new(180.0 + offset_deg, r_hat, 30, false);
            let mut misses = MissCounters::new(&map, 8);
            let out = matcher.match_beacons(&pose, &Scan::new(vec![sample]), &map, &mut misses);
            assert_eq!(out.observations.len(), 1, "offset {}", offset_deg);
            let db = angle_diff(out.observations[0].bearing(), b_hat);
            assert_relative_eq!(db, offset_deg.to_radians(), epsilon = 1e-9);
        }

        // Just outside the 6° window on either side
        for offset_deg in [-6.5_f64, 6.5] {
            let sample = Sample::new(180.0 + offset_deg, r_hat, 30, false);
            let mut misses = MissCounters::new(&map, 8);
            let out = matcher.match_beacons(&pose, &Scan::new(vec![sample]), &map, &mut misses);
            assert!(out.observations.is_empty());
            assert_eq!(misses.get("R"), 1);
        }
    }

    #[test]
    fn test_gate_straddles_zero_degrees() {
        // Beacon dead ahead: sensor angles near 359° and 1° both qualify.
        let map = BeaconMap::new(vec![Beacon::new("F", 1500.0, 0.0)]).unwrap();
        let pose = Pose::new(0.0, 0.0, 0.0);
        let matcher = BeaconMatcher::new(&MatcherConfig::default()).unwrap();
        for angle in [357.0, 359.5, 0.5, 3.0] {
            let mut misses = MissCounters::new(&map, 8);
            let scan = Scan::new(vec![Sample::new(angle, 1500.0, 30, false)]);
            let out = matcher.match_beacons(&pose, &scan, &map, &mut misses);
            assert_eq!(out.observations.len(), 1, "angle {}", angle);
        }
    }

    #[test]
    fn test_no_cross_beacon_match() {
        // Only B is physically present; A and C must not grab its return.
        let map = table();
        let pose = Pose::new(500.0, 0.0, 0.0);
        let (r_b, b_b) = predict_measurement(&pose, 1950.0, -1594.0);
        let mut samples = background();
        samples.push(at(b_b, r_b, 60));

        let matcher = BeaconMatcher::new(&MatcherConfig::default()).unwrap();
        let mut misses = MissCounters::new(&map, 8);
        let out = matcher.match_beacons(&pose, &Scan::new(samples), &map, &mut misses);

        let ids: Vec<&str> = out.observations.iter().map(|o| o.beacon_id.as_str()).collect();
        assert_eq!(ids, vec!["B"]);
        assert_eq!(misses.get("A"), 1);
        assert_eq!(misses.get("C"), 1);
        assert_eq!(out.visibility.get("A"), Some(&false));
    }

    #[test]
    fn test_noise_inflates_after_occlusion_and_recovers() {
        let map = BeaconMap::new(vec![Beacon::new("B", 1950.0, -1594.0)]).unwrap();
        let pose = Pose::new(500.0, 0.0, 0.0);
        let (r_hat, b_hat) = predict_measurement(&pose, 1950.0, -1594.0);
        let config = MatcherConfig::default();
        let matcher = BeaconMatcher::new(&config).unwrap();
        let mut misses = MissCounters::new(&map, config.miss_max);

        let empty = Scan::new(background());
        for _ in 0..50 {
            let out = matcher.match_beacons(&pose, &empty, &map, &mut misses);
            assert!(out.observations.is_empty());
        }
        assert_eq!(misses.get("B"), config.miss_max);

        let visible = Scan::new(vec![at(b_hat, r_hat, 40)]);
        let sigma_r = config.sigma_r_mm;
        let mut last_var = f64::INFINITY;
        for expected_miss in (0..config.miss_max).rev() {
            let out = matcher.match_beacons(&pose, &visible, &map, &mut misses);
            assert_eq!(misses.get("B"), expected_miss);
            let factor = 1.0 + 0.25 * expected_miss as f64;
            let var = out.observations[0].r[(0, 0)];
            assert_relative_eq!(var, (sigma_r * factor).powi(2), epsilon = 1e-9);
            assert!(var < last_var);
            last_var = var;
        }
        assert!(misses.is_visible("B"));
    }

    #[test]
    fn test_rejects_degenerate_noise() {
        let config = MatcherConfig {
            sigma_r_mm: 0.0,
            ..MatcherConfig::default()
        };
        assert!(matches!(
            BeaconMatcher::new(&config),
            Err(crate::Error::InvalidConfig(_))
        ));
    }
}
