//! Per-cycle pipeline: bytes → samples → scans → observations → filter.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::beacons::{AbsoluteLocator, BeaconMap, BeaconMatcher, MissCounters};
use crate::config::LocalizerConfig;
use crate::error::Result;
use crate::filters::pose_ekf::PoseEkfState;
use crate::filters::{MotionInput, PoseEkf};
use crate::lidar::{decode_next, ScanAssembler};
use crate::types::{Observation, Pose, PoseSnapshot, Scan, StateMat};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalizerState {
    Uninitialized,
    /// Waiting for the first valid record
    Syncing,
    Tracking,
}

impl fmt::Display for LocalizerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Syncing => "syncing",
            Self::Tracking => "tracking",
        };
        f.write_str(name)
    }
}

/// Pipeline counters. Monotonic for the life of the instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalizerStats {
    pub frames_decoded: u64,
    /// Bytes dropped while hunting for a record boundary
    pub bytes_skipped: u64,
    pub scans_completed: u64,
    pub scans_discarded: u64,
    pub predicts: u64,
    pub observations_applied: u64,
}

/// Result of matching and correcting against one scan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub pose: Pose,
    pub covariance_trace: f64,
    pub scan_len: usize,
    pub matched: usize,
    pub applied: usize,
    pub visibility: BTreeMap<String, bool>,
}

pub struct Localizer {
    beacons: BeaconMap,
    assembler: ScanAssembler,
    matcher: BeaconMatcher,
    locator: AbsoluteLocator,
    ekf: PoseEkf,
    misses: MissCounters,
    pending: Vec<u8>,
    state: LocalizerState,
    stats: LocalizerStats,
}

impl Localizer {
    pub fn new(config: LocalizerConfig) -> Result<Self> {
        config.validate()?;
        let beacons = BeaconMap::from_config(&config.beacons)?;
        let misses = MissCounters::new(&beacons, config.matcher.miss_max);

        log::info!(
            "Localizer ready: {} beacons, start pose ({:.0}, {:.0}, {:.1}°)",
            beacons.len(),
            config.filter.init_x_mm,
            config.filter.init_y_mm,
            config.filter.init_theta_deg
        );

        Ok(Self {
            assembler: ScanAssembler::new(&config.scan),
            matcher: BeaconMatcher::new(&config.matcher)?,
            locator: AbsoluteLocator::new(&config.locate, &config.matcher)?,
            ekf: PoseEkf::new(&config.filter)?,
            misses,
            beacons,
            pending: Vec::with_capacity(4096),
            state: LocalizerState::Uninitialized,
            stats: LocalizerStats::default(),
        })
    }

    pub fn begin_sync(&mut self) {
        if self.state == LocalizerState::Uninitialized {
            self.set_state(LocalizerState::Syncing);
        }
    }

    fn set_state(&mut self, state: LocalizerState) {
        if self.state != state {
            log::info!("Localizer {} -> {}", self.state, state);
            self.state = state;
        }
    }

    /// Feed raw wire bytes. Every revolution completed by these bytes is
    /// matched and corrected in order; one report per revolution.
    pub fn ingest(&mut self, bytes: &[u8]) -> Vec<CycleReport> {
        self.begin_sync();
        self.pending.extend_from_slice(bytes);

        let mut reports = Vec::new();
        let mut offset = 0;
        loop {
            let (sample, consumed) = decode_next(&self.pending[offset..]);
            if consumed == 0 {
                break;
            }
            offset += consumed;

            let Some(sample) = sample else {
                self.stats.bytes_skipped += 1;
                continue;
            };
            self.stats.frames_decoded += 1;
            if self.state == LocalizerState::Syncing {
                self.set_state(LocalizerState::Tracking);
            }
            if let Some(scan) = self.assembler.feed(sample) {
                reports.push(self.process_scan(&scan));
            }
        }
        self.pending.drain(..offset);
        reports
    }

    /// Match one revolution against the current estimate and fold the
    /// observations in. A scan with no beacons is a predict-only cycle.
    pub fn process_scan(&mut self, scan: &Scan) -> CycleReport {
        let outcome = self
            .matcher
            .match_beacons(&self.ekf.pose(), scan, &self.beacons, &mut self.misses);
        let applied = self.correct(&outcome.observations);

        let pose = self.ekf.pose();
        log::debug!(
            "Scan of {} samples: {}/{} beacons applied, pose ({:.0}, {:.0}, {:.1}°) trace {:.1}",
            scan.len(),
            applied,
            self.beacons.len(),
            pose.x,
            pose.y,
            pose.theta.to_degrees(),
            self.ekf.trace()
        );

        CycleReport {
            pose,
            covariance_trace: self.ekf.trace(),
            scan_len: scan.len(),
            matched: outcome.observations.len(),
            applied,
            visibility: outcome.visibility,
        }
    }

    pub fn predict(&mut self, motion: &MotionInput) -> Result<()> {
        self.ekf.predict(motion)?;
        self.stats.predicts += 1;
        Ok(())
    }

    pub fn correct(&mut self, observations: &[Observation]) -> usize {
        let applied = self.ekf.correct(observations, &self.beacons);
        self.stats.observations_applied += applied as u64;
        applied
    }

    /// Predict, then process one scan.
    pub fn step(&mut self, motion: &MotionInput, scan: &Scan) -> Result<CycleReport> {
        self.predict(motion)?;
        Ok(self.process_scan(scan))
    }

    pub fn pose(&self) -> Pose {
        self.ekf.pose()
    }

    /// Pose from the reflectors in `scan` alone, ignoring the current
    /// estimate. Feed the result to [`Localizer::reset`] to re-seed.
    pub fn locate_absolute(&self, scan: &Scan) -> Option<Pose> {
        self.locator.locate(scan, &self.beacons)
    }

    pub fn visibility(&self) -> BTreeMap<String, bool> {
        self.misses.visibility()
    }

    pub fn covariance(&self) -> &StateMat {
        self.ekf.covariance()
    }

    pub fn covariance_trace(&self) -> f64 {
        self.ekf.trace()
    }

    pub fn filter_state(&self) -> PoseEkfState {
        self.ekf.get_state()
    }

    pub fn state(&self) -> LocalizerState {
        self.state
    }

    pub fn beacons(&self) -> &BeaconMap {
        &self.beacons
    }

    pub fn stats(&self) -> LocalizerStats {
        LocalizerStats {
            scans_completed: self.assembler.scans_emitted(),
            scans_discarded: self.assembler.scans_discarded(),
            ..self.stats
        }
    }

    pub fn snapshot(&self, sequence: u64) -> PoseSnapshot {
        PoseSnapshot {
            pose: self.ekf.pose(),
            covariance_trace: self.ekf.trace(),
            visible_beacons: self.misses.visible_count() as u32,
            sequence,
        }
    }

    /// Start over at `pose`: initial covariance, all beacons visible, no
    /// partial revolution or buffered bytes.
    pub fn reset(&mut self, pose: Pose) {
        self.ekf.reset(pose);
        self.misses.reset();
        self.assembler.reset();
        self.pending.clear();
        log::info!(
            "Localizer reset to ({:.0}, {:.0}, {:.1}°)",
            pose.x,
            pose.y,
            pose.theta.to_degrees()
        );
        if self.state == LocalizerState::Tracking {
            self.set_state(LocalizerState::Syncing);
        }
    }
}
