//! Odometry inputs for the prediction step.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One odometry increment, dispatched once per `predict`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MotionInput {
    /// Unicycle model: linear speed [mm/s], yaw rate [rad/s], step [s]
    Velocity { v: f64, w: f64, dt: f64 },
    /// Pose increment already expressed in the table frame [mm, mm, rad]
    Delta { dx: f64, dy: f64, dtheta: f64 },
}

impl MotionInput {
    pub fn velocity(v: f64, w: f64, dt: f64) -> Self {
        Self::Velocity { v, w, dt }
    }

    pub fn delta(dx: f64, dy: f64, dtheta: f64) -> Self {
        Self::Delta { dx, dy, dtheta }
    }

    /// No motion over `dt`.
    pub fn still(dt: f64) -> Self {
        Self::Velocity { v: 0.0, w: 0.0, dt }
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Velocity { v, w, dt } => {
                if !(v.is_finite() && w.is_finite()) {
                    return Err(Error::InvalidMotion(format!(
                        "non-finite velocity v={} w={}",
                        v, w
                    )));
                }
                if !(dt.is_finite() && dt > 0.0) {
                    return Err(Error::InvalidMotion(format!(
                        "dt must be finite and > 0, got {}",
                        dt
                    )));
                }
            }
            Self::Delta { dx, dy, dtheta } => {
                if !(dx.is_finite() && dy.is_finite() && dtheta.is_finite()) {
                    return Err(Error::InvalidMotion(format!(
                        "non-finite delta ({}, {}, {})",
                        dx, dy, dtheta
                    )));
                }
            }
        }
        Ok(())
    }

    /// Parse one odometry line: `v <mm/s> <rad/s> <dt>` or `d <dx> <dy> <dtheta>`.
    pub fn parse_line(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let kind = parts
            .next()
            .ok_or_else(|| Error::InvalidMotion("empty odometry line".to_string()))?;
        let values = parts
            .map(|p| {
                p.parse::<f64>()
                    .map_err(|_| Error::InvalidMotion(format!("bad number {:?}", p)))
            })
            .collect::<Result<Vec<f64>>>()?;
        if values.len() != 3 {
            return Err(Error::InvalidMotion(format!(
                "expected 3 values after {:?}, got {}",
                kind,
                values.len()
            )));
        }
        let input = match kind {
            "v" | "vel" => Self::velocity(values[0], values[1], values[2]),
            "d" | "delta" => Self::delta(values[0], values[1], values[2]),
            other => {
                return Err(Error::InvalidMotion(format!(
                    "unknown odometry kind {:?}",
                    other
                )))
            }
        };
        input.validate()?;
        Ok(input)
    }
}
