//! Candidate ranking for data association. Lower is better.

use crate::config::ScoreKind;

pub trait MatchScore: Send + Sync {
    /// `range_residual` in mm, `bearing_residual` in rad (already wrapped).
    fn score(&self, range_residual: f64, bearing_residual: f64) -> f64;
}

/// Sigma-normalized L1 distance; the reproducible baseline.
#[derive(Clone, Copy, Debug)]
pub struct L1Score {
    pub sigma_r: f64,
    pub sigma_b: f64,
}

impl MatchScore for L1Score {
    fn score(&self, range_residual: f64, bearing_residual: f64) -> f64 {
        range_residual.abs() / self.sigma_r + bearing_residual.abs() / self.sigma_b
    }
}

/// Squared Mahalanobis distance under the base diagonal noise.
#[derive(Clone, Copy, Debug)]
pub struct MahalanobisScore {
    pub sigma_r: f64,
    pub sigma_b: f64,
}

impl MatchScore for MahalanobisScore {
    fn score(&self, range_residual: f64, bearing_residual: f64) -> f64 {
        (range_residual / self.sigma_r).powi(2) + (bearing_residual / self.sigma_b).powi(2)
    }
}

pub fn build_score(kind: ScoreKind, sigma_r: f64, sigma_b: f64) -> Box<dyn MatchScore> {
    match kind {
        ScoreKind::L1 => Box::new(L1Score { sigma_r, sigma_b }),
        ScoreKind::Mahalanobis => Box::new(MahalanobisScore { sigma_r, sigma_b }),
    }
}
