pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

/// One range/bearing return decoded from the LIDAR wire format.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Bearing in the sensor frame, degrees in [0, 360)
    pub angle_deg: f64,
    pub distance_mm: f64,
    /// Signal quality, 0..=63
    pub quality: u8,
    /// Set on the first sample of a new revolution
    pub start_flag: bool,
}

impl Sample {
    pub fn new(angle_deg: f64, distance_mm: f64, quality: u8, start_flag: bool) -> Self {
        Self {
            angle_deg,
            distance_mm,
            quality,
            start_flag,
        }
    }

    /// Bearing in radians, wrapped to (-π, π].
    pub fn bearing_rad(&self) -> f64 {
        crate::angle::wrap_angle(self.angle_deg.to_radians())
    }
}

/// One complete revolution of clamp-filtered samples.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Scan {
    pub samples: Vec<Sample>,
}

impl Scan {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }
}

/// Robot pose in the table frame [mm, mm, rad].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    /// Heading in (-π, π], 0 along +x, counter-clockwise positive
    pub theta: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    pub fn from_state(state: &StateVec) -> Self {
        Self {
            x: state[0],
            y: state[1],
            theta: state[2],
        }
    }

    pub fn to_state(&self) -> StateVec {
        StateVec::new(self.x, self.y, self.theta)
    }

    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        (x - self.x).hypot(y - self.y)
    }
}

/// A matched beacon return ready for the filter update.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub beacon_id: String,
    /// (range_mm, bearing_rad)
    pub z: BeaconMeasVec,
    /// Diagonal measurement covariance
    pub r: BeaconNoise,
}

impl Observation {
    pub fn new(
        beacon_id: impl Into<String>,
        range_mm: f64,
        bearing_rad: f64,
        r: BeaconNoise,
    ) -> Self {
        Self {
            beacon_id: beacon_id.into(),
            z: BeaconMeasVec::new(range_mm, bearing_rad),
            r,
        }
    }

    pub fn range(&self) -> f64 {
        self.z[0]
    }

    pub fn bearing(&self) -> f64 {
        self.z[1]
    }
}

/// Lock-free published view of the latest estimate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseSnapshot {
    pub pose: Pose,
    pub covariance_trace: f64,
    pub visible_beacons: u32,
    /// Bumped on every predict / correct
    pub sequence: u64,
}
