//! Known landmark map and data association.

pub mod locate;
pub mod matcher;
pub mod miss_counter;
pub mod score;

pub use locate::{trilaterate, AbsoluteLocator, Cluster};
pub use matcher::{BeaconMatcher, MatchOutcome};
pub use miss_counter::MissCounters;
pub use score::{L1Score, MahalanobisScore, MatchScore};

use serde::{Deserialize, Serialize};

use crate::config::BeaconConfig;
use crate::error::{Error, Result};

/// Fixed reflector in the table frame [mm].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Beacon {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

impl Beacon {
    pub fn new(id: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            id: id.into(),
            x,
            y,
        }
    }
}

/// Ordered, immutable beacon list. Iteration order is the configured order
/// and drives every per-beacon loop, which keeps matching deterministic.
#[derive(Clone, Debug, PartialEq)]
pub struct BeaconMap {
    beacons: Vec<Beacon>,
}

impl BeaconMap {
    pub fn new(beacons: Vec<Beacon>) -> Result<Self> {
        if beacons.is_empty() {
            return Err(Error::InvalidConfig("beacon map is empty".to_string()));
        }
        for (i, beacon) in beacons.iter().enumerate() {
            if !(beacon.x.is_finite() && beacon.y.is_finite()) {
                return Err(Error::InvalidConfig(format!(
                    "beacon {:?} has non-finite coordinates",
                    beacon.id
                )));
            }
            if beacons[..i].iter().any(|b| b.id == beacon.id) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate beacon id {:?}",
                    beacon.id
                )));
            }
        }
        Ok(Self { beacons })
    }

    pub fn from_config(configs: &[BeaconConfig]) -> Result<Self> {
        Self::new(
            configs
                .iter()
                .map(|c| Beacon::new(c.id.clone(), c.x_mm, c.y_mm))
                .collect(),
        )
    }

    pub fn get(&self, id: &str) -> Option<&Beacon> {
        self.beacons.iter().find(|b| b.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Beacon> {
        self.beacons.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.beacons.iter().map(|b| b.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.beacons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beacons.is_empty()
    }
}
