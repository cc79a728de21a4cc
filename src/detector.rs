use crate::all::*;

// Values 9 and 12 are popular, allowing quick rejection logic.
const FAST_VARIANT_N: usize = 9;

// A Bresenham circle.
const CIRCLE: [[i32; 2]; 16] = [
  [ 0, -3], [ 1, -3], [ 2, -2], [ 3, -1], [ 3,  0], [ 3,  1], [ 2,  2], [ 1,  3],
  [ 0,  3], [-1,  3], [-2,  2], [-3,  1], [-3,  0], [-3, -1], [-2, -2], [-1, -3],
];

// Half width of the window used for the Harris score.
const HARRIS_RADIUS: usize = 3;
const HARRIS_K: f64 = 0.04;
// Keypoints need both the full circle and the Harris window inside the image.
const BORDER: usize = HARRIS_RADIUS + 1;

// Finds candidate positions for new features. Candidates are returned
// strongest first and only on open pixels of `mask`. `max_count` is a hint of
// how many will be accepted.
pub trait FeatureDetector: Send {
  fn detect(&mut self, image: &Image, mask: &Mask, max_count: usize) -> Vec<Vector2d>;
}

pub fn make_detector(p: &ParameterSet) -> Box<dyn FeatureDetector> {
  match p.detector {
    DetectorKind::Corners => Box::new(CornerDetector::new(p.corner_quality)),
    DetectorKind::RegionKeypoints => Box::new(RegionDetector::new(p)),
  }
}

// FAST keypoints searched separately in each cell of a grid so that every
// part of the image gets its share of new features.
pub struct RegionDetector {
  pub threshold: i16,
  pub cols: usize,
  pub rows: Option<usize>,
  pub quota: usize,
}

struct Keypoint {
  x: usize,
  y: usize,
  score: f64,
}

impl RegionDetector {
  pub fn new(p: &ParameterSet) -> RegionDetector {
    RegionDetector {
      threshold: p.fast_threshold as i16,
      cols: p.region_cols,
      rows: p.region_rows,
      quota: p.region_quota,
    }
  }

  pub fn grid(&self, width: usize, height: usize) -> [usize; 2] {
    let rows = self.rows.unwrap_or(if width == height { self.cols } else { 1 });
    [self.cols.max(1), rows.max(1)]
  }

  // Best keypoints of one cell, at most `quota` of them.
  fn detect_cell(
    &self,
    image: &Image,
    mask: &Mask,
    x_range: std::ops::Range<usize>,
    y_range: std::ops::Range<usize>,
  ) -> Vec<Keypoint> {
    let x0 = x_range.start.max(BORDER);
    let x1 = x_range.end.min(image.width.saturating_sub(BORDER));
    let y0 = y_range.start.max(BORDER);
    let y1 = y_range.end.min(image.height.saturating_sub(BORDER));
    if x0 >= x1 || y0 >= y1 { return vec![] }
    let cell_width = x1 - x0;
    let mut scores = vec![f64::NEG_INFINITY; cell_width * (y1 - y0)];
    let mut keypoints = vec![];
    for y in y0..y1 {
      for x in x0..x1 {
        if !mask.is_open_at(x, y) { continue }
        if !self.detect_at_pixel(x as i32, y as i32, image) { continue }
        let score = harris_score(x, y, image);
        scores[(y - y0) * cell_width + (x - x0)] = score;
        keypoints.push(Keypoint { x, y, score });
      }
    }

    // Non-maximum suppression among 8-connected neighbors, ties go to the
    // first one in raster order.
    let mut kept: Vec<Keypoint> = vec![];
    for k in keypoints {
      let (cx, cy) = (k.x - x0, k.y - y0);
      let mut suppressed = false;
      for y in cy.saturating_sub(1)..(cy + 2).min(y1 - y0) {
        for x in cx.saturating_sub(1)..(cx + 2).min(cell_width) {
          if (x, y) == (cx, cy) { continue }
          let s = scores[y * cell_width + x];
          if s > k.score || (s == k.score && (y, x) < (cy, cx)) {
            suppressed = true;
          }
        }
      }
      if !suppressed { kept.push(k) }
    }
    kept.sort_by(|a, b| b.score.total_cmp(&a.score));
    kept.truncate(self.quota);
    kept
  }

  fn detect_at_pixel(&self, x: i32, y: i32, image: &Image) -> bool {
    let center_value = value(x, y, image);
    if continuous(x, y, image, |v| v < center_value - self.threshold) { return true }
    if continuous(x, y, image, |v| v > center_value + self.threshold) { return true }
    false
  }
}

impl FeatureDetector for RegionDetector {
  fn detect(&mut self, image: &Image, mask: &Mask, _max_count: usize) -> Vec<Vector2d> {
    let [cols, rows] = self.grid(image.width, image.height);
    let cell_width = image.width / cols;
    let cell_height = image.height / rows;
    let mut cells = vec![];
    for row in 0..rows {
      for col in 0..cols {
        let x_end = if col + 1 == cols { image.width } else { (col + 1) * cell_width };
        let y_end = if row + 1 == rows { image.height } else { (row + 1) * cell_height };
        cells.push(self.detect_cell(image, mask, col * cell_width..x_end, row * cell_height..y_end));
      }
    }
    debug!(
      "Found {} keypoints in {}x{} regions.",
      cells.iter().map(|c| c.len()).sum::<usize>(), cols, rows,
    );
    // Take the best of each cell first, then the second best and so on.
    let mut candidates = vec![];
    for rank in 0..self.quota {
      for cell in &cells {
        if let Some(k) = cell.get(rank) {
          candidates.push(Vector2d::new(k.x as f64, k.y as f64));
        }
      }
    }
    candidates
  }
}

fn continuous<F: Fn(i16) -> bool>(x: i32, y: i32, image: &Image, f: F) -> bool {
  // Quick rejection for 9 and 12 variants.
  if !f(value(x + 3, y, image)) && !f(value(x - 3, y, image)) { return false }

  // Wraps around so that arcs crossing the start of the circle are found.
  let mut n = 0;
  for p in CircleIterator::new(x, y).take(CIRCLE.len() + FAST_VARIANT_N - 1) {
    if f(value(p[0], p[1], image)) {
      n += 1;
      if n >= FAST_VARIANT_N { return true }
    }
    else {
      n = 0;
    }
  }
  false
}

// Harris corner response over a square window, with central difference
// gradients.
fn harris_score(x: usize, y: usize, image: &Image) -> f64 {
  let w = image.width;
  let v = |x: usize, y: usize| image.data[y * w + x] as f64;
  let (mut a, mut b, mut c) = (0., 0., 0.);
  for yy in (y - HARRIS_RADIUS)..=(y + HARRIS_RADIUS) {
    for xx in (x - HARRIS_RADIUS)..=(x + HARRIS_RADIUS) {
      let gx = 0.5 * (v(xx + 1, yy) - v(xx - 1, yy));
      let gy = 0.5 * (v(xx, yy + 1) - v(xx, yy - 1));
      a += gx * gx;
      b += gx * gy;
      c += gy * gy;
    }
  }
  a * c - b * b - HARRIS_K * (a + c) * (a + c)
}

struct CircleIterator {
  center: [i32; 2],
  ind: usize,
}

impl CircleIterator {
  pub fn new(x: i32, y:i32) -> CircleIterator {
    CircleIterator {
      center: [x, y],
      ind: 0,
    }
  }
}

impl Iterator for CircleIterator {
  type Item = [i32; 2];

  fn next(&mut self) -> Option<Self::Item> {
    let c = CIRCLE[self.ind % CIRCLE.len()];
    self.ind += 1;
    Some([self.center[0] + c[0], self.center[1] + c[1]])
  }
}

fn value(x: i32, y: i32, image: &Image) -> i16 {
  image.data[y as usize * image.width + x as usize] as i16
}

#[cfg(test)]
mod tests {
  use super::*;

  // Bright isolated blobs on a dark background, one per `centers` entry.
  fn blobs(width: usize, height: usize, centers: &[[usize; 2]]) -> Image {
    Image::from_fn(width, height, |x, y| {
      let inside = centers.iter().any(|c| {
        let dx = x as i32 - c[0] as i32;
        let dy = y as i32 - c[1] as i32;
        dx * dx + dy * dy <= 2
      });
      if inside { 220 } else { 30 }
    })
  }

  fn detector(rows: Option<usize>) -> RegionDetector {
    let mut p = ParameterSet::default();
    p.region_cols = 2;
    p.region_rows = rows;
    p.region_quota = 3;
    RegionDetector::new(&p)
  }

  #[test]
  fn test_segment_test_wraps_around() {
    // The bright arc covers circle positions 12..16 and 0..4.
    let mut image = Image::from_fn(9, 9, |_, _| 50);
    for i in (12..16).chain(0..5) {
      let c = CIRCLE[i];
      image.set_value((4 + c[0]) as usize, (4 + c[1]) as usize, 200);
    }
    let d = detector(None);
    assert!(d.detect_at_pixel(4, 4, &image));
    image.set_value(4, 1, 50);
    assert!(!d.detect_at_pixel(4, 4, &image));
  }

  #[test]
  fn test_grid() {
    let d = detector(None);
    assert_eq!(d.grid(64, 64), [2, 2]);
    assert_eq!(d.grid(64, 48), [2, 1]);
    assert_eq!(detector(Some(3)).grid(64, 48), [2, 3]);
  }

  #[test]
  fn test_every_cell_contributes() {
    let centers = [[10, 10], [14, 22], [40, 12], [12, 45], [48, 50], [50, 40]];
    let image = blobs(64, 64, &centers);
    let mut d = detector(None);
    let mask = Mask::new(64, 64);
    let candidates = d.detect(&image, &mask, 100);
    assert!(!candidates.is_empty());
    // The first four candidates come from four different cells.
    let cells: HashSet<(usize, usize)> = candidates.iter().take(4)
      .map(|c| ((c[0] / 32.) as usize, (c[1] / 32.) as usize))
      .collect();
    assert_eq!(cells.len(), 4);
    for c in &candidates {
      assert!(centers.iter().any(|t| (c - Vector2d::new(t[0] as f64, t[1] as f64)).norm() < 1.5));
    }
  }

  #[test]
  fn test_respects_mask() {
    let image = blobs(64, 64, &[[10, 10], [40, 40]]);
    let mut mask = Mask::new(64, 64);
    mask.close_disk(&Vector2d::new(10., 10.), 5.);
    let candidates = detector(None).detect(&image, &mask, 10);
    assert!(!candidates.is_empty());
    assert!(candidates.iter().all(|c| (c - Vector2d::new(40., 40.)).norm() < 1.5));
  }
}
