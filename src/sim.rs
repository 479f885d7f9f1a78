//! Synthetic LIDAR revolutions for a known pose.
//!
//! Each revolution is a 0.5° grid of background returns with one return per
//! visible beacon placed at its exact (noisy) bearing. Output is either
//! decoded samples or the encoded wire stream.

use std::collections::HashSet;

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::angle::wrap_angle;
use crate::beacons::matcher::predict_measurement;
use crate::beacons::BeaconMap;
use crate::error::{Error, Result};
use crate::lidar::encode_sample;
use crate::types::{Pose, Sample};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Angular spacing of the background grid [deg]
    pub step_deg: f64,
    /// Wall distance reported away from beacons [mm]
    pub background_mm: f64,
    pub range_sigma_mm: f64,
    pub bearing_sigma_deg: f64,
    /// Probability that a background sample comes back with zero distance
    pub dropout: f64,
    /// Adjacent grid samples each reflector occupies
    pub beacon_returns: usize,
    /// 0 = seed from entropy
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            step_deg: 0.5,
            background_mm: 4500.0,
            range_sigma_mm: 30.0,
            bearing_sigma_deg: 1.0,
            dropout: 0.0,
            beacon_returns: 1,
            seed: 42,
        }
    }
}

const BEACON_QUALITY: u8 = 60;
const BACKGROUND_QUALITY: u8 = 20;

pub struct ScanSimulator {
    config: SimConfig,
    beacons: BeaconMap,
    occluded: HashSet<String>,
    rng: StdRng,
}

impl ScanSimulator {
    pub fn new(beacons: BeaconMap, config: SimConfig) -> Result<Self> {
        if !(config.step_deg.is_finite() && config.step_deg > 0.0 && config.step_deg < 360.0) {
            return Err(Error::InvalidConfig(format!(
                "sim step_deg must be in (0, 360), got {}",
                config.step_deg
            )));
        }
        if !(config.range_sigma_mm >= 0.0 && config.bearing_sigma_deg >= 0.0) {
            return Err(Error::InvalidConfig("sim noise sigmas must be >= 0".to_string()));
        }
        if !(0.0..=1.0).contains(&config.dropout) {
            return Err(Error::InvalidConfig("sim dropout must be in [0, 1]".to_string()));
        }
        if config.beacon_returns == 0 {
            return Err(Error::InvalidConfig("sim beacon_returns must be >= 1".to_string()));
        }
        let rng = if config.seed == 0 {
            StdRng::from_entropy()
        } else {
            StdRng::seed_from_u64(config.seed)
        };
        Ok(Self {
            config,
            beacons,
            occluded: HashSet::new(),
            rng,
        })
    }

    /// Hide or reveal one beacon.
    pub fn set_occluded(&mut self, id: &str, occluded: bool) {
        if occluded {
            self.occluded.insert(id.to_string());
        } else {
            self.occluded.remove(id);
        }
    }

    fn gaussian(&mut self, stddev: f64) -> f64 {
        if stddev == 0.0 {
            return 0.0;
        }
        let n: f64 = self.rng.sample(StandardNormal);
        n * stddev
    }

    /// One revolution as seen from `pose`. The first sample carries the
    /// start flag.
    pub fn revolution(&mut self, pose: &Pose) -> Vec<Sample> {
        let step = self.config.step_deg;
        let steps = (360.0 / step).floor() as usize;
        let mut samples: Vec<Sample> = (0..steps)
            .map(|i| {
                Sample::new(i as f64 * step, self.config.background_mm, BACKGROUND_QUALITY, false)
            })
            .collect();

        if self.config.dropout > 0.0 {
            for sample in samples.iter_mut() {
                if self.rng.gen::<f64>() < self.config.dropout {
                    sample.distance_mm = 0.0;
                    sample.quality = 0;
                }
            }
        }

        let returns: Vec<(f64, f64)> = self
            .beacons
            .iter()
            .filter(|b| !self.occluded.contains(&b.id))
            .map(|b| predict_measurement(pose, b.x, b.y))
            .collect();
        // Centered on the noisy bearing; the center return is written last
        let half = (self.config.beacon_returns - 1) as f64 / 2.0;
        let mut offsets: Vec<f64> = (0..self.config.beacon_returns)
            .map(|i| (i as f64 - half) * step)
            .collect();
        offsets.sort_by(|a, b| b.abs().total_cmp(&a.abs()));

        for (range, bearing) in returns {
            let ranges: Vec<f64> = offsets
                .iter()
                .map(|_| range + self.gaussian(self.config.range_sigma_mm))
                .collect();
            let bearing_sigma = self.config.bearing_sigma_deg.to_radians();
            let bearing = wrap_angle(bearing + self.gaussian(bearing_sigma));
            for (&offset, &range) in offsets.iter().zip(&ranges) {
                let angle_deg = (bearing.to_degrees() + offset).rem_euclid(360.0);
                let slot = ((angle_deg / step).round() as usize) % steps;
                samples[slot] = Sample::new(angle_deg, range, BEACON_QUALITY, false);
            }
        }

        samples[0].start_flag = true;
        samples
    }

    /// One revolution encoded as wire records.
    ///
    /// The assembler closes a revolution when the next one starts, so a
    /// stream of N revolutions yields N - 1 scans.
    pub fn revolution_bytes(&mut self, pose: &Pose) -> Vec<u8> {
        self.revolution(pose)
            .iter()
            .flat_map(|s| encode_sample(s.quality, s.angle_deg, s.distance_mm, s.start_flag))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beacons::Beacon;
    use crate::lidar::{decode_next, RECORD_LEN};

    fn map() -> BeaconMap {
        BeaconMap::new(vec![
            Beacon::new("A", 50.0, -1594.0),
            Beacon::new("C", 1000.0, 1594.0),
        ])
        .unwrap()
    }

    fn quiet() -> SimConfig {
        SimConfig {
            range_sigma_mm: 0.0,
            bearing_sigma_deg: 0.0,
            ..SimConfig::default()
        }
    }

    #[test]
    fn test_revolution_layout() {
        let mut sim = ScanSimulator::new(map(), quiet()).unwrap();
        let samples = sim.revolution(&Pose::new(500.0, 0.0, 0.0));
        assert_eq!(samples.len(), 720);
        assert!(samples[0].start_flag);
        assert_eq!(samples.iter().filter(|s| s.start_flag).count(), 1);
        assert_eq!(samples.iter().filter(|s| s.quality == BEACON_QUALITY).count(), 2);
    }

    #[test]
    fn test_beacon_return_matches_geometry() {
        let pose = Pose::new(500.0, 0.0, 0.4);
        let mut sim = ScanSimulator::new(map(), quiet()).unwrap();
        let samples = sim.revolution(&pose);
        let (r, b) = predict_measurement(&pose, 1000.0, 1594.0);
        let hit = samples
            .iter()
            .find(|s| (s.distance_mm - r).abs() < 1e-9)
            .unwrap();
        assert!((crate::angle::angle_diff(hit.bearing_rad(), b)).abs() < 1e-9);
    }

    #[test]
    fn test_wide_reflector_spans_adjacent_samples() {
        let config = SimConfig {
            beacon_returns: 5,
            ..quiet()
        };
        let pose = Pose::new(500.0, 0.0, 0.0);
        let mut sim = ScanSimulator::new(map(), config).unwrap();
        let samples = sim.revolution(&pose);
        assert_eq!(samples.len(), 720);

        let (r, b) = predict_measurement(&pose, 1000.0, 1594.0);
        let hits: Vec<&Sample> = samples
            .iter()
            .filter(|s| s.quality == BEACON_QUALITY && (s.distance_mm - r).abs() < 1e-9)
            .collect();
        assert_eq!(hits.len(), 5);
        assert!(hits
            .iter()
            .any(|s| crate::angle::angle_diff(s.bearing_rad(), b).abs() < 1e-9));
        assert!(hits
            .iter()
            .all(|s| crate::angle::angle_diff(s.bearing_rad(), b).abs() < 1.01_f64.to_radians()));
    }

    #[test]
    fn test_occlusion_removes_return() {
        let mut sim = ScanSimulator::new(map(), quiet()).unwrap();
        sim.set_occluded("A", true);
        let samples = sim.revolution(&Pose::new(500.0, 0.0, 0.0));
        assert_eq!(samples.iter().filter(|s| s.quality == BEACON_QUALITY).count(), 1);
        sim.set_occluded("A", false);
        let samples = sim.revolution(&Pose::new(500.0, 0.0, 0.0));
        assert_eq!(samples.iter().filter(|s| s.quality == BEACON_QUALITY).count(), 2);
    }

    #[test]
    fn test_bytes_decode_back() {
        let mut sim = ScanSimulator::new(map(), SimConfig::default()).unwrap();
        let bytes = sim.revolution_bytes(&Pose::new(500.0, 0.0, 0.0));
        assert_eq!(bytes.len(), 720 * RECORD_LEN);
        let mut offset = 0;
        let mut decoded = 0;
        while offset < bytes.len() {
            let (sample, consumed) = decode_next(&bytes[offset..]);
            assert_eq!(consumed, RECORD_LEN);
            assert_eq!(sample.unwrap().start_flag, decoded == 0);
            offset += consumed;
            decoded += 1;
        }
        assert_eq!(decoded, 720);
    }

    #[test]
    fn test_seeded_noise_is_reproducible() {
        let pose = Pose::new(500.0, 0.0, 0.0);
        let mut a = ScanSimulator::new(map(), SimConfig::default()).unwrap();
        let mut b = ScanSimulator::new(map(), SimConfig::default()).unwrap();
        assert_eq!(a.revolution_bytes(&pose), b.revolution_bytes(&pose));
    }

    #[test]
    fn test_rejects_bad_config() {
        let bad = SimConfig {
            step_deg: 0.0,
            ..SimConfig::default()
        };
        assert!(ScanSimulator::new(map(), bad).is_err());
        let bad = SimConfig {
            dropout: 1.5,
            ..SimConfig::default()
        };
        assert!(ScanSimulator::new(map(), bad).is_err());
    }
}
