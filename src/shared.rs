//! Thread-safe handle around one `Localizer`.
//!
//! The odometry thread and the LIDAR ingestion thread both go through the
//! mutex, so a correction always starts from the state the last prediction
//! left. Readers that only need the pose use `latest_pose()`, which reads an
//! `AtomicCell` published after every mutation and never waits on the mutex.

use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam::atomic::AtomicCell;

use crate::error::{Error, Result};
use crate::filters::MotionInput;
use crate::localizer::{CycleReport, Localizer};
use crate::types::{Pose, PoseSnapshot};

#[derive(Clone)]
pub struct SharedLocalizer {
    inner: Arc<Mutex<Localizer>>,
    snapshot: Arc<AtomicCell<PoseSnapshot>>,
}

impl SharedLocalizer {
    pub fn new(localizer: Localizer) -> Self {
        let snapshot = localizer.snapshot(0);
        Self {
            inner: Arc::new(Mutex::new(localizer)),
            snapshot: Arc::new(AtomicCell::new(snapshot)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Localizer>> {
        self.inner.lock().map_err(|_| Error::LockPoisoned)
    }

    // Called with the lock held so sequence numbers follow mutation order.
    fn publish(&self, localizer: &Localizer) {
        let sequence = self.snapshot.load().sequence + 1;
        self.snapshot.store(localizer.snapshot(sequence));
    }

    pub fn latest_pose(&self) -> PoseSnapshot {
        self.snapshot.load()
    }

    pub fn predict(&self, motion: &MotionInput) -> Result<()> {
        let mut localizer = self.lock()?;
        localizer.predict(motion)?;
        self.publish(&localizer);
        Ok(())
    }

    pub fn ingest(&self, bytes: &[u8]) -> Result<Vec<CycleReport>> {
        let mut localizer = self.lock()?;
        let reports = localizer.ingest(bytes);
        if !reports.is_empty() {
            self.publish(&localizer);
        }
        Ok(reports)
    }

    pub fn reset(&self, pose: Pose) -> Result<()> {
        let mut localizer = self.lock()?;
        localizer.reset(pose);
        self.publish(&localizer);
        Ok(())
    }

    /// Run a read-only closure under the lock.
    pub fn with<R>(&self, f: impl FnOnce(&Localizer) -> R) -> Result<R> {
        let localizer = self.lock()?;
        Ok(f(&localizer))
    }
}
