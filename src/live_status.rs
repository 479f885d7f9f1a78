use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;
use crate::localizer::{Localizer, LocalizerState, LocalizerStats};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LiveStatus {
    pub timestamp: f64,
    pub uptime_seconds: u64,
    pub state: LocalizerState,
    // Pose estimate
    pub x_mm: f64,
    pub y_mm: f64,
    pub heading_deg: f64,
    pub covariance_trace: f64,
    pub filter_updates: u64,
    // Beacons
    pub visibility: BTreeMap<String, bool>,
    pub visible_beacons: usize,
    // Pipeline counters
    pub stats: LocalizerStats,
}

impl LiveStatus {
    pub fn from_localizer(localizer: &Localizer, uptime_seconds: u64) -> Self {
        let filter = localizer.filter_state();
        let visibility = localizer.visibility();
        Self {
            timestamp: current_timestamp(),
            uptime_seconds,
            state: localizer.state(),
            x_mm: filter.pose.x,
            y_mm: filter.pose.y,
            heading_deg: filter.pose.theta.to_degrees(),
            covariance_trace: filter.covariance_trace,
            filter_updates: filter.updates,
            visible_beacons: visibility.values().filter(|&&v| v).count(),
            visibility,
            stats: localizer.stats(),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
