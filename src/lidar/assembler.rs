//! Revolution assembly.

use crate::config::ScanConfig;
use crate::types::{Sample, Scan};

/// Accumulates decoded samples into complete revolutions.
///
/// A revolution closes on every 0→1 edge of the start flag. The edge check
/// sees every sample, including ones the distance clamp throws away, so the
/// clamp never shifts revolution boundaries.
#[derive(Clone, Debug)]
pub struct ScanAssembler {
    min_samples: usize,
    min_dist_mm: f64,
    max_dist_mm: f64,
    last_start_flag: bool,
    pending: Vec<Sample>,
    scans_emitted: u64,
    scans_discarded: u64,
}

impl ScanAssembler {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            min_samples: config.min_samples,
            min_dist_mm: config.min_dist_mm,
            max_dist_mm: config.max_dist_mm,
            last_start_flag: false,
            pending: Vec::with_capacity(1024),
            scans_emitted: 0,
            scans_discarded: 0,
        }
    }

    /// Feed one sample; returns the previous revolution when this sample
    /// starts a new one and the previous one was long enough.
    pub fn feed(&mut self, sample: Sample) -> Option<Scan> {
        let rising_edge = sample.start_flag && !self.last_start_flag;
        self.last_start_flag = sample.start_flag;

        if rising_edge {
            if self.pending.len() > self.min_samples {
                self.scans_emitted += 1;
                let samples = std::mem::replace(&mut self.pending, Vec::with_capacity(1024));
                return Some(Scan::new(samples));
            }
            if !self.pending.is_empty() {
                log::debug!(
                    "Dropping incomplete revolution ({} samples)",
                    self.pending.len()
                );
            }
            self.scans_discarded += 1;
            self.pending.clear();
            return None;
        }

        if self.in_clamp(sample.distance_mm) {
            self.pending.push(sample);
        }
        None
    }

    fn in_clamp(&self, distance_mm: f64) -> bool {
        distance_mm > self.min_dist_mm && distance_mm < self.max_dist_mm
    }

    /// Throw away the partial revolution and the start-flag history.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.last_start_flag = false;
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn scans_emitted(&self) -> u64 {
        self.scans_emitted
    }

    pub fn scans_discarded(&self) -> u64 {
        self.scans_discarded
    }
}
