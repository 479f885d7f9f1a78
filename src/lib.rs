//! Beacon-based pose localization for a robot carrying an RPLIDAR C1.
//!
//! Raw LIDAR bytes are decoded into samples, assembled into revolutions,
//! matched against a fixed beacon map and fused with odometry in a 3-state
//! EKF.

pub mod angle;
pub mod beacons;
pub mod config;
pub mod error;
pub mod filters;
pub mod lidar;
pub mod live_status;
pub mod localizer;
pub mod shared;
pub mod sim;
pub mod transport;
pub mod types;

pub use beacons::{AbsoluteLocator, Beacon, BeaconMap, BeaconMatcher, MatchOutcome, MissCounters};
pub use config::LocalizerConfig;
pub use error::{Error, Result};
pub use filters::{MotionInput, PoseEkf};
pub use lidar::{decode_next, encode_sample, RplidarDriver, ScanAssembler};
pub use localizer::{CycleReport, Localizer, LocalizerState, LocalizerStats};
pub use shared::SharedLocalizer;
pub use types::{Observation, Pose, PoseSnapshot, Sample, Scan};
