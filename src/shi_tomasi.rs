// Corner detector ranking pixels by the smaller eigenvalue of the local
// structure tensor, see "Good Features to Track" by Shi and Tomasi.

use crate::all::*;

// Pixels closer than this to the edge get no response.
const BORDER: usize = 2;

pub struct CornerDetector {
  pub quality: f64,
  response: Vec<f64>,
  gradients: Vec<[f64; 3]>,
}

impl CornerDetector {
  pub fn new(quality: f64) -> CornerDetector {
    CornerDetector {
      quality,
      response: vec![],
      gradients: vec![],
    }
  }

  // Products of Sobel derivatives `[gx*gx, gx*gy, gy*gy]` at each pixel.
  fn compute_gradients(&mut self, image: &Image) {
    let (w, h) = (image.width, image.height);
    self.gradients.clear();
    self.gradients.resize(w * h, [0.; 3]);
    if w < 3 || h < 3 { return }
    let v = |x: usize, y: usize| image.data[y * w + x] as f64;
    for y in 1..(h - 1) {
      for x in 1..(w - 1) {
        let gx = (v(x + 1, y - 1) + 2. * v(x + 1, y) + v(x + 1, y + 1)
          - v(x - 1, y - 1) - 2. * v(x - 1, y) - v(x - 1, y + 1)) / 8.;
        let gy = (v(x - 1, y + 1) + 2. * v(x, y + 1) + v(x + 1, y + 1)
          - v(x - 1, y - 1) - 2. * v(x, y - 1) - v(x + 1, y - 1)) / 8.;
        self.gradients[y * w + x] = [gx * gx, gx * gy, gy * gy];
      }
    }
  }

  // Minimum eigenvalue of the structure tensor summed over a 3x3 block.
  fn compute_response(&mut self, image: &Image) -> f64 {
    let (w, h) = (image.width, image.height);
    self.compute_gradients(image);
    self.response.clear();
    self.response.resize(w * h, 0.);
    let mut max_response = 0.;
    if w <= 2 * BORDER || h <= 2 * BORDER { return max_response }
    for y in BORDER..(h - BORDER) {
      for x in BORDER..(w - BORDER) {
        let mut s = [0.; 3];
        for yy in (y - 1)..=(y + 1) {
          for xx in (x - 1)..=(x + 1) {
            let g = &self.gradients[yy * w + xx];
            s[0] += g[0];
            s[1] += g[1];
            s[2] += g[2];
          }
        }
        let a = 0.5 * (s[0] + s[2]);
        let b = 0.5 * (s[0] - s[2]);
        let r = a - (b * b + s[1] * s[1]).sqrt();
        self.response[y * w + x] = r;
        if r > max_response { max_response = r }
      }
    }
    max_response
  }

  fn is_local_max(&self, x: usize, y: usize, w: usize) -> bool {
    let r = self.response[y * w + x];
    for yy in (y - 1)..=(y + 1) {
      for xx in (x - 1)..=(x + 1) {
        if self.response[yy * w + xx] > r { return false }
      }
    }
    true
  }
}

impl FeatureDetector for CornerDetector {
  fn detect(&mut self, image: &Image, mask: &Mask, _max_count: usize) -> Vec<Vector2d> {
    let (w, h) = (image.width, image.height);
    let max_response = self.compute_response(image);
    if max_response <= 0. { return vec![] }
    let threshold = self.quality * max_response;
    let mut corners: Vec<(f64, usize, usize)> = vec![];
    for y in BORDER..(h - BORDER) {
      for x in BORDER..(w - BORDER) {
        let r = self.response[y * w + x];
        if r < threshold || r <= 0. { continue }
        if !mask.is_open_at(x, y) { continue }
        if !self.is_local_max(x, y, w) { continue }
        corners.push((r, x, y));
      }
    }
    // Stable, so equal responses stay in raster order.
    corners.sort_by(|a, b| b.0.total_cmp(&a.0));
    debug!("Found {} corner candidates.", corners.len());
    corners.into_iter()
      .map(|(_, x, y)| Vector2d::new(x as f64, y as f64))
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  // Dark background with bright squares whose corners are the features.
  fn squares_image() -> Image {
    Image::from_fn(80, 60, |x, y| {
      let in_a = (20..30).contains(&x) && (15..25).contains(&y);
      let in_b = (50..65).contains(&x) && (30..45).contains(&y);
      if in_a || in_b { 200 } else { 20 }
    })
  }

  #[test]
  fn test_finds_square_corners() {
    let image = squares_image();
    let mask = Mask::new(image.width, image.height);
    let mut detector = CornerDetector::new(0.01);
    let corners = detector.detect(&image, &mask, 100);
    assert!(corners.len() >= 8);
    // The eight strongest responses sit near the true corners.
    let truth = [
      [20., 15.], [29., 15.], [20., 24.], [29., 24.],
      [50., 30.], [64., 30.], [50., 44.], [64., 44.],
    ];
    for c in corners.iter().take(8) {
      let near = truth.iter().any(|t| (c - Vector2d::new(t[0], t[1])).norm() < 2.5);
      assert!(near, "{}", c);
    }
  }

  #[test]
  fn test_respects_mask_and_flat_images() {
    let image = squares_image();
    let mut mask = Mask::new(image.width, image.height);
    mask.close_disk(&Vector2d::new(25., 20.), 12.);
    let mut detector = CornerDetector::new(0.01);
    let corners = detector.detect(&image, &mask, 100);
    assert!(!corners.is_empty());
    assert!(corners.iter().all(|c| mask.is_open(c)));
    assert!(corners.iter().all(|c| c[0] > 40.));

    let flat = Image::from_fn(30, 30, |_, _| 77);
    assert!(detector.detect(&flat, &Mask::new(30, 30), 10).is_empty());
  }
}
