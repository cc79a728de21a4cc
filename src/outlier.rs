// Epipolar consistency check between the previous and current positions of
// the tracked features: a fundamental matrix is fitted with RANSAC and the
// features far from their epipolar lines are discarded.

use crate::all::*;

use rand::{seq::index::sample, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

const SAMPLE_SIZE: usize = 8;
const MAX_ITERATIONS: usize = 1000;

pub struct FundamentalRansac {
  // Maximum distance to the epipolar line, in virtual pinhole pixels.
  pub threshold: f64,
  pub confidence: f64,
  pub focal_length: f64,
  rng: Xoshiro256PlusPlus,
}

impl FundamentalRansac {
  pub fn new(p: &ParameterSet) -> FundamentalRansac {
    FundamentalRansac {
      threshold: p.f_threshold,
      confidence: p.ransac_confidence,
      focal_length: p.focal_length,
      rng: Xoshiro256PlusPlus::seed_from_u64(p.ransac_seed),
    }
  }

  // Marks the pairs consistent with the best fundamental matrix. Returns
  // `None` when there are too few pairs or no model could be fitted.
  pub fn find_inliers(&mut self, points0: &[Vector2d], points1: &[Vector2d]) -> Option<Vec<bool>> {
    assert_eq!(points0.len(), points1.len());
    let n = points0.len();
    if n < SAMPLE_SIZE { return None }
    let threshold2 = self.threshold * self.threshold;

    let mut best: Option<(usize, Vec<bool>)> = None;
    let mut iterations = MAX_ITERATIONS;
    let mut i = 0;
    while i < iterations {
      i += 1;
      let indices = sample(&mut self.rng, n, SAMPLE_SIZE);
      let s0: Vec<Vector2d> = indices.iter().map(|j| points0[j]).collect();
      let s1: Vec<Vector2d> = indices.iter().map(|j| points1[j]).collect();
      let f = match eight_point(&s0, &s1) {
        Some(f) => f,
        None => continue,
      };
      let inliers: Vec<bool> = points0.iter().zip(points1)
        .map(|(p0, p1)| epipolar_error(&f, p0, p1) <= threshold2)
        .collect();
      let count = inliers.iter().filter(|x| **x).count();
      if best.as_ref().map_or(true, |(c, _)| count > *c) {
        iterations = iterations.min(adaptive_iterations(count, n, self.confidence));
        best = Some((count, inliers));
      }
    }
    let (count, inliers) = best?;
    debug!("Fundamental matrix RANSAC: {}/{} inliers after {} iterations.", count, n, i);
    Some(inliers)
  }
}

// Number of iterations for `confidence` of having drawn one all-inlier sample.
fn adaptive_iterations(inliers: usize, n: usize, confidence: f64) -> usize {
  let w = inliers as f64 / n as f64;
  let good = w.powi(SAMPLE_SIZE as i32);
  if good >= 1. { return 0 }
  let denominator = (1. - good).ln();
  if denominator > -f64::EPSILON { return MAX_ITERATIONS }
  let k = (1. - confidence).ln() / denominator;
  if !k.is_finite() || k >= MAX_ITERATIONS as f64 { return MAX_ITERATIONS }
  k.ceil().max(0.) as usize
}

// Hartley normalization: zero centroid, mean distance sqrt(2).
fn normalize_points(points: &[Vector2d]) -> (Vec<Vector2d>, Matrix3d) {
  let centroid = points.iter().fold(Vector2d::zeros(), |acc, p| acc + p) / points.len() as f64;
  let mean_dist = points.iter().map(|p| (p - centroid).norm()).sum::<f64>() / points.len() as f64;
  let scale = if mean_dist < f64::EPSILON { 1. } else { 2f64.sqrt() / mean_dist };
  let transform = Matrix3d::new(
    scale, 0., -scale * centroid[0],
    0., scale, -scale * centroid[1],
    0., 0., 1.,
  );
  let normalized = points.iter().map(|p| scale * (p - centroid)).collect();
  (normalized, transform)
}

// Fundamental matrix `F` with `p1^T F p0 = 0` from eight or more pairs.
pub fn eight_point(points0: &[Vector2d], points1: &[Vector2d]) -> Option<Matrix3d> {
  let (q0, t0) = normalize_points(points0);
  let (q1, t1) = normalize_points(points1);
  // Padded with zero rows so that the SVD yields the full 9x9 basis.
  let mut a = DMatrix::<f64>::zeros(q0.len().max(9), 9);
  for (row, (p0, p1)) in q0.iter().zip(&q1).enumerate() {
    let (x0, y0, x1, y1) = (p0[0], p0[1], p1[0], p1[1]);
    let values = [x1 * x0, x1 * y0, x1, y1 * x0, y1 * y0, y1, x0, y0, 1.];
    for (col, v) in values.iter().enumerate() {
      a[(row, col)] = *v;
    }
  }
  let svd = a.svd(false, true);
  let v_t = svd.v_t?;
  let f = v_t.row(svd.singular_values.argmin().0);
  let f = Matrix3d::new(
    f[0], f[1], f[2],
    f[3], f[4], f[5],
    f[6], f[7], f[8],
  );
  let f = enforce_rank2(&f)?;
  let f = t1.transpose() * f * t0;
  if !f.iter().all(|v| v.is_finite()) { return None }
  Some(f)
}

fn enforce_rank2(f: &Matrix3d) -> Option<Matrix3d> {
  let svd = f.svd(true, true);
  let mut singular_values = svd.singular_values;
  let i = singular_values.argmin().0;
  singular_values[i] = 0.;
  Some(svd.u? * Matrix3d::from_diagonal(&singular_values) * svd.v_t?)
}

// Larger of the squared distances of each point to the epipolar line of its
// pair.
pub fn epipolar_error(f: &Matrix3d, p0: &Vector2d, p1: &Vector2d) -> f64 {
  let h0 = Vector3d::new(p0[0], p0[1], 1.);
  let h1 = Vector3d::new(p1[0], p1[1], 1.);
  let l1 = f * h0;
  let l0 = f.transpose() * h1;
  let d1 = h1.dot(&l1);
  let d0 = h0.dot(&l0);
  let s1 = l1[0] * l1[0] + l1[1] * l1[1];
  let s0 = l0[0] * l0[0] + l0[1] * l0[1];
  if s0 <= 0. || s1 <= 0. { return f64::INFINITY }
  (d1 * d1 / s1).max(d0 * d0 / s0)
}

// Drops propagated tracks that are inconsistent with the epipolar geometry
// between the previous and current frame. Both positions are lifted with
// `camera` and reprojected with a distortion free virtual pinhole camera so
// that the pixel threshold means the same for every lens. Tracks that cannot
// be lifted are left for the undistortion step to drop.
pub fn reject_with_f(
  ransac: &mut FundamentalRansac,
  camera: &Camera,
  propagated: Vec<Propagated>,
  scale: f64,
  width: usize,
  height: usize,
) -> Vec<Propagated> {
  let center = Vector2d::new(width as f64 / 2., height as f64 / 2.);
  let focal_length = ransac.focal_length;
  let virtual_pixel = |p: &Vector2d| {
    lift_pixel(camera, p, scale, BearingMode::UnitPlane)
      .map(|b| focal_length * Vector2d::new(b[0], b[1]) + center)
  };
  let mut indices = vec![];
  let mut points0 = vec![];
  let mut points1 = vec![];
  for (i, p) in propagated.iter().enumerate() {
    if let (Some(v0), Some(v1)) = (virtual_pixel(&p.previous_pixel), virtual_pixel(&p.track.pixel)) {
      indices.push(i);
      points0.push(v0);
      points1.push(v1);
    }
  }
  let inliers = match ransac.find_inliers(&points0, &points1) {
    Some(inliers) => inliers,
    None => {
      debug!("Skipping fundamental matrix check with {} features.", points0.len());
      return propagated;
    },
  };
  let mut keep = vec![true; propagated.len()];
  for (i, inlier) in indices.into_iter().zip(inliers) {
    keep[i] = inlier;
  }
  let n = propagated.len();
  let kept: Vec<Propagated> = propagated.into_iter()
    .zip(keep)
    .filter_map(|(p, keep)| if keep { Some(p) } else { None })
    .collect();
  debug!("Fundamental matrix check removed {}/{} features.", n - kept.len(), n);
  kept
}
