//! Heading arithmetic.

use std::f64::consts::{PI, TAU};

/// Wrap an angle into (-π, π].
///
/// Values already inside the interval are returned untouched, so wrapping is
/// exactly idempotent.
pub fn wrap_angle(theta: f64) -> f64 {
    if theta > -PI && theta <= PI {
        return theta;
    }
    let wrapped = (theta + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

/// Signed shortest difference `a - b`, wrapped.
pub fn angle_diff(a: f64, b: f64) -> f64 {
    wrap_angle(a - b)
}
