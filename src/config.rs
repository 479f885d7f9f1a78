//! Tuning constants for the whole pipeline.
//!
//! Angles are stored in degrees so config files stay readable; the
//! components convert to radians when they are built.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ─── Scan assembly ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// A revolution must hold strictly more samples than this to be emitted
    pub min_samples: usize,
    /// Exclusive distance clamp [mm]
    pub min_dist_mm: f64,
    pub max_dist_mm: f64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            min_samples: 50,
            min_dist_mm: 60.0,
            max_dist_mm: 6000.0,
        }
    }
}

// ─── Beacon matching ─────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreKind {
    /// |dr|/σr + |db|/σb
    L1,
    /// (dr/σr)² + (db/σb)²
    Mahalanobis,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub bearing_window_deg: f64,
    pub range_window_mm: f64,
    pub sigma_r_mm: f64,
    pub sigma_b_deg: f64,
    pub miss_max: u32,
    /// R grows by (1 + miss_inflation * miss) per axis
    pub miss_inflation: f64,
    pub score: ScoreKind,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            bearing_window_deg: 6.0,
            range_window_mm: 150.0,
            sigma_r_mm: 30.0,
            sigma_b_deg: 1.0,
            miss_max: 8,
            miss_inflation: 0.25,
            score: ScoreKind::L1,
        }
    }
}

// ─── Filter ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub init_x_mm: f64,
    pub init_y_mm: f64,
    pub init_theta_deg: f64,
    pub init_sigma_xy_mm: f64,
    pub init_sigma_theta_deg: f64,
    /// Odometry linear speed noise [mm/s]
    pub sigma_v: f64,
    /// Odometry yaw rate noise [rad/s]
    pub sigma_w: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            init_x_mm: 500.0,
            init_y_mm: 0.0,
            init_theta_deg: 0.0,
            init_sigma_xy_mm: 400.0,
            init_sigma_theta_deg: 5.0,
            sigma_v: 30.0,
            sigma_w: 0.05,
        }
    }
}

// ─── Absolute fix ────────────────────────────────────────────────────────────

/// Trilateration from reflector returns alone, used to (re)seed the filter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocateConfig {
    /// Returns at or below this quality are not reflectors
    pub quality_min: u8,
    /// Max distance from a point to its cluster centroid [mm]
    pub cluster_radius_mm: f64,
    /// Smaller clusters are dropped
    pub min_points: usize,
    /// RMS range disagreement above which a fix is rejected [mm]
    pub max_range_residual_mm: f64,
    /// RMS heading disagreement above which a fix is rejected [deg]
    pub max_bearing_residual_deg: f64,
}

impl Default for LocateConfig {
    fn default() -> Self {
        Self {
            quality_min: 40,
            cluster_radius_mm: 100.0,
            min_points: 3,
            max_range_residual_mm: 100.0,
            max_bearing_residual_deg: 5.0,
        }
    }
}

// ─── Beacon map ──────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BeaconConfig {
    pub id: String,
    pub x_mm: f64,
    pub y_mm: f64,
}

impl BeaconConfig {
    pub fn new(id: &str, x_mm: f64, y_mm: f64) -> Self {
        Self {
            id: id.to_string(),
            x_mm,
            y_mm,
        }
    }
}

fn default_beacons() -> Vec<BeaconConfig> {
    vec![
        BeaconConfig::new("A", 50.0, -1594.0),
        BeaconConfig::new("B", 1950.0, -1594.0),
        BeaconConfig::new("C", 1000.0, 1594.0),
    ]
}

// ─── Top level ───────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizerConfig {
    pub scan: ScanConfig,
    pub matcher: MatcherConfig,
    pub filter: FilterConfig,
    pub locate: LocateConfig,
    pub beacons: Vec<BeaconConfig>,
}

impl Default for LocalizerConfig {
    fn default() -> Self {
        Self {
            scan: ScanConfig::default(),
            matcher: MatcherConfig::default(),
            filter: FilterConfig::default(),
            locate: LocateConfig::default(),
            beacons: default_beacons(),
        }
    }
}

fn require_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "{} must be finite and > 0, got {}",
            name, value
        )))
    }
}

fn require_finite(name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!("{} must be finite", name)))
    }
}

impl LocalizerConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject anything that would make the innovation covariance degenerate
    /// or the gating windows meaningless.
    pub fn validate(&self) -> Result<()> {
        self.matcher.validate()?;
        self.scan.validate()?;
        self.filter.validate()?;
        self.locate.validate()?;

        if self.beacons.is_empty() {
            return Err(Error::InvalidConfig("beacon map is empty".to_string()));
        }
        let mut seen = HashSet::new();
        for beacon in &self.beacons {
            require_finite("beacon.x_mm", beacon.x_mm)?;
            require_finite("beacon.y_mm", beacon.y_mm)?;
            if !seen.insert(beacon.id.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate beacon id {:?}",
                    beacon.id
                )));
            }
        }
        Ok(())
    }
}

impl MatcherConfig {
    pub fn validate(&self) -> Result<()> {
        require_positive("matcher.sigma_r_mm", self.sigma_r_mm)?;
        require_positive("matcher.sigma_b_deg", self.sigma_b_deg)?;
        require_positive("matcher.bearing_window_deg", self.bearing_window_deg)?;
        require_positive("matcher.range_window_mm", self.range_window_mm)?;
        if self.bearing_window_deg >= 180.0 {
            return Err(Error::InvalidConfig(
                "matcher.bearing_window_deg must be < 180".to_string(),
            ));
        }
        if self.miss_max == 0 {
            return Err(Error::InvalidConfig(
                "matcher.miss_max must be >= 1".to_string(),
            ));
        }
        if !(self.miss_inflation.is_finite() && self.miss_inflation >= 0.0) {
            return Err(Error::InvalidConfig(
                "matcher.miss_inflation must be finite and >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<()> {
        require_finite("scan.min_dist_mm", self.min_dist_mm)?;
        require_positive("scan.max_dist_mm", self.max_dist_mm)?;
        if self.min_dist_mm < 0.0 || self.min_dist_mm >= self.max_dist_mm {
            return Err(Error::InvalidConfig(format!(
                "scan distance clamp ({}, {}) is empty",
                self.min_dist_mm, self.max_dist_mm
            )));
        }
        Ok(())
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<()> {
        require_finite("filter.init_x_mm", self.init_x_mm)?;
        require_finite("filter.init_y_mm", self.init_y_mm)?;
        require_finite("filter.init_theta_deg", self.init_theta_deg)?;
        require_positive("filter.init_sigma_xy_mm", self.init_sigma_xy_mm)?;
        require_positive("filter.init_sigma_theta_deg", self.init_sigma_theta_deg)?;
        require_positive("filter.sigma_v", self.sigma_v)?;
        require_positive("filter.sigma_w", self.sigma_w)?;
        Ok(())
    }
}

impl LocateConfig {
    pub fn validate(&self) -> Result<()> {
        require_positive("locate.cluster_radius_mm", self.cluster_radius_mm)?;
        require_positive("locate.max_range_residual_mm", self.max_range_residual_mm)?;
        require_positive(
            "locate.max_bearing_residual_deg",
            self.max_bearing_residual_deg,
        )?;
        if self.min_points == 0 {
            return Err(Error::InvalidConfig(
                "locate.min_points must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}
