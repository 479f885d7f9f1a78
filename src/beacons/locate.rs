//! Absolute position fix from reflector returns alone.
//!
//! High-quality returns are grouped into clusters, every pairing of clusters
//! with map beacons is trilaterated, and the pairing whose ranges and
//! bearings agree best wins. No prior pose is needed, so this is what seeds
//! or re-seeds the filter after the tracked estimate has gone stale.

use nalgebra::{DMatrix, DVector};

use super::BeaconMap;
use crate::angle::{angle_diff, wrap_angle};
use crate::config::{LocateConfig, MatcherConfig};
use crate::error::Result;
use crate::types::{Pose, Scan};

/// Clusters beyond this many (largest first) are ignored
const MAX_CLUSTERS: usize = 6;

/// Relative singular value below which the anchor geometry is degenerate
const RANK_EPS: f64 = 1e-9;

/// Group of reflector returns, centroid in the robot frame [mm].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cluster {
    pub x: f64,
    pub y: f64,
    pub points: usize,
}

impl Cluster {
    pub fn range(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn bearing(&self) -> f64 {
        self.y.atan2(self.x)
    }
}

/// Robot-frame points of every return above `quality_min`.
pub fn reflective_points(scan: &Scan, quality_min: u8) -> Vec<(f64, f64)> {
    scan.iter()
        .filter(|s| s.quality > quality_min && s.distance_mm > 0.0)
        .map(|s| {
            let (sin, cos) = s.bearing_rad().sin_cos();
            (s.distance_mm * cos, s.distance_mm * sin)
        })
        .collect()
}

/// Greedy clustering: each point joins the nearest centroid within
/// `radius_mm` or starts a new cluster. Clusters smaller than `min_points`
/// are dropped.
pub fn cluster_points(points: &[(f64, f64)], radius_mm: f64, min_points: usize) -> Vec<Cluster> {
    let radius_sq = radius_mm * radius_mm;
    // (sum_x, sum_y, count)
    let mut sums: Vec<(f64, f64, usize)> = Vec::new();

    for &(px, py) in points {
        let mut best = None;
        let mut best_dist_sq = radius_sq;
        for (i, &(sx, sy, n)) in sums.iter().enumerate() {
            let dx = px - sx / n as f64;
            let dy = py - sy / n as f64;
            let dist_sq = dx * dx + dy * dy;
            if dist_sq <= best_dist_sq {
                best_dist_sq = dist_sq;
                best = Some(i);
            }
        }
        match best {
            Some(i) => {
                sums[i].0 += px;
                sums[i].1 += py;
                sums[i].2 += 1;
            }
            None => sums.push((px, py, 1)),
        }
    }

    sums.into_iter()
        .filter(|&(_, _, n)| n >= min_points)
        .map(|(sx, sy, n)| Cluster {
            x: sx / n as f64,
            y: sy / n as f64,
            points: n,
        })
        .collect()
}

/// Least-squares position from ranges to known anchors.
///
/// Subtracting the first range equation from the others leaves a linear
/// system in (x, y), solved by SVD. Needs at least three anchors that are
/// not collinear.
pub fn trilaterate(anchors: &[(f64, f64)], ranges: &[f64]) -> Option<(f64, f64)> {
    if anchors.len() < 3 || anchors.len() != ranges.len() {
        return None;
    }
    let (x0, y0) = anchors[0];
    let d0 = ranges[0];
    let rows = anchors.len() - 1;

    let mut a = DMatrix::<f64>::zeros(rows, 2);
    let mut b = DVector::<f64>::zeros(rows);
    for (i, (&(xi, yi), &di)) in anchors[1..].iter().zip(&ranges[1..]).enumerate() {
        a[(i, 0)] = 2.0 * (xi - x0);
        a[(i, 1)] = 2.0 * (yi - y0);
        b[i] = d0 * d0 - di * di + xi * xi - x0 * x0 + yi * yi - y0 * y0;
    }

    let svd = a.svd(true, true);
    let largest = svd.singular_values.max();
    if largest <= 0.0 || svd.rank(largest * RANK_EPS) < 2 {
        return None;
    }
    let solution = svd.solve(&b, largest * RANK_EPS).ok()?;
    let (x, y) = (solution[0], solution[1]);
    (x.is_finite() && y.is_finite()).then_some((x, y))
}

/// One trilaterated pairing and how well it explains the clusters.
#[derive(Clone, Copy, Debug)]
struct Candidate {
    pose: Pose,
    cost: f64,
    range_rms: f64,
    bearing_rms: f64,
}

pub struct AbsoluteLocator {
    quality_min: u8,
    cluster_radius: f64,
    min_points: usize,
    max_range_residual: f64,
    max_bearing_residual: f64,
    sigma_r: f64,
    sigma_b: f64,
}

impl AbsoluteLocator {
    pub fn new(config: &LocateConfig, matcher: &MatcherConfig) -> Result<Self> {
        config.validate()?;
        matcher.validate()?;
        Ok(Self {
            quality_min: config.quality_min,
            cluster_radius: config.cluster_radius_mm,
            min_points: config.min_points,
            max_range_residual: config.max_range_residual_mm,
            max_bearing_residual: config.max_bearing_residual_deg.to_radians(),
            sigma_r: matcher.sigma_r_mm,
            sigma_b: matcher.sigma_b_deg.to_radians(),
        })
    }

    /// Reflector clusters in `scan`, largest first.
    pub fn clusters(&self, scan: &Scan) -> Vec<Cluster> {
        let points = reflective_points(scan, self.quality_min);
        let mut clusters = cluster_points(&points, self.cluster_radius, self.min_points);
        clusters.sort_by(|a, b| b.points.cmp(&a.points));
        clusters.truncate(MAX_CLUSTERS);
        clusters
    }

    /// Pose from `scan` alone, or `None` when fewer than three reflectors
    /// are seen or no pairing with the map is consistent.
    pub fn locate(&self, scan: &Scan, beacons: &BeaconMap) -> Option<Pose> {
        let clusters = self.clusters(scan);
        if clusters.len() < 3 || beacons.len() < 3 {
            log::debug!("Absolute fix needs 3 reflectors, saw {}", clusters.len());
            return None;
        }
        let anchors: Vec<(f64, f64)> = beacons.iter().map(|b| (b.x, b.y)).collect();

        let mut best: Option<Candidate> = None;
        for pairing in pairings(clusters.len(), anchors.len()) {
            let Some(candidate) = self.evaluate(&clusters, &anchors, &pairing) else {
                continue;
            };
            if best.map_or(true, |b| candidate.cost < b.cost) {
                best = Some(candidate);
            }
        }

        let best = best?;
        let consistent = best.range_rms <= self.max_range_residual
            && best.bearing_rms <= self.max_bearing_residual;
        if !consistent {
            log::debug!(
                "Rejecting absolute fix: range rms {:.1} mm, bearing rms {:.2}°",
                best.range_rms,
                best.bearing_rms.to_degrees()
            );
            return None;
        }
        log::info!(
            "Absolute fix ({:.0}, {:.0}, {:.1}°) from {} reflectors",
            best.pose.x,
            best.pose.y,
            best.pose.theta.to_degrees(),
            clusters.len()
        );
        Some(best.pose)
    }

    fn evaluate(
        &self,
        clusters: &[Cluster],
        anchors: &[(f64, f64)],
        pairing: &[(usize, usize)],
    ) -> Option<Candidate> {
        let paired: Vec<(f64, f64)> = pairing.iter().map(|&(_, a)| anchors[a]).collect();
        let ranges: Vec<f64> = pairing.iter().map(|&(c, _)| clusters[c].range()).collect();
        let (x, y) = trilaterate(&paired, &ranges)?;

        // Heading implied by each pair; their circular mean is the estimate.
        let headings: Vec<f64> = pairing
            .iter()
            .map(|&(c, a)| {
                let (ax, ay) = anchors[a];
                wrap_angle((ay - y).atan2(ax - x) - clusters[c].bearing())
            })
            .collect();
        let (sin_sum, cos_sum) = headings
            .iter()
            .fold((0.0, 0.0), |(s, c), h| (s + h.sin(), c + h.cos()));
        let theta = sin_sum.atan2(cos_sum);

        let n = pairing.len() as f64;
        let mut range_sq = 0.0;
        let mut bearing_sq = 0.0;
        for ((&(ax, ay), &r), &h) in paired.iter().zip(&ranges).zip(&headings) {
            range_sq += ((ax - x).hypot(ay - y) - r).powi(2);
            bearing_sq += angle_diff(h, theta).powi(2);
        }

        let cost = range_sq / (self.sigma_r * self.sigma_r)
            + bearing_sq / (self.sigma_b * self.sigma_b);
        Some(Candidate {
            pose: Pose::new(x, y, theta),
            cost,
            range_rms: (range_sq / n).sqrt(),
            bearing_rms: (bearing_sq / n).sqrt(),
        })
    }
}

/// Every way to pair `min(clusters, anchors)` clusters with distinct
/// anchors, as (cluster, anchor) lists.
fn pairings(clusters: usize, anchors: usize) -> Vec<Vec<(usize, usize)>> {
    let want = clusters.min(anchors);
    let mut out = Vec::new();
    let mut used = vec![false; clusters];
    let mut current = Vec::with_capacity(want);
    extend_pairing(0, anchors, want, &mut used, &mut current, &mut out);
    out
}

fn extend_pairing(
    anchor: usize,
    anchors: usize,
    want: usize,
    used: &mut [bool],
    current: &mut Vec<(usize, usize)>,
    out: &mut Vec<Vec<(usize, usize)>>,
) {
    if current.len() == want {
        out.push(current.clone());
        return;
    }
    if anchors - anchor < want - current.len() {
        return;
    }
    for cluster in 0..used.len() {
        if used[cluster] {
            continue;
        }
        used[cluster] = true;
        current.push((cluster, anchor));
        extend_pairing(anchor + 1, anchors, want, used, current, out);
        current.pop();
        used[cluster] = false;
    }
    // Leave this anchor unpaired
    extend_pairing(anchor + 1, anchors, want, used, current, out);
}
