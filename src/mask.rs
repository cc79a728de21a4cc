use crate::all::*;

// Occupancy grid over the tracking-resolution image. New features may only
// be placed on open pixels.
#[derive(Clone, Debug)]
pub struct Mask {
  open: Vec<bool>,
  pub width: usize,
  pub height: usize,
}

impl Mask {
  pub fn new(width: usize, height: usize) -> Mask {
    Mask {
      open: vec![true; width * height],
      width,
      height,
    }
  }

  pub fn check_size(&self, width: usize, height: usize) -> Result<()> {
    if self.width != width || self.height != height || self.open.len() != width * height {
      bail!(
        "Mask is {}x{} but the image is {}x{}.",
        self.width, self.height, width, height,
      );
    }
    Ok(())
  }

  // Pixels are addressed by rounding to the nearest integer, outside
  // positions count as closed.
  pub fn is_open(&self, p: &Vector2d) -> bool {
    let p = from_f64(p);
    if p[0] < 0 || p[1] < 0 || p[0] >= self.width as i32 || p[1] >= self.height as i32 {
      return false;
    }
    self.open[p[1] as usize * self.width + p[0] as usize]
  }

  #[inline(always)]
  pub fn is_open_at(&self, x: usize, y: usize) -> bool {
    self.open[y * self.width + x]
  }

  // Closes a filled disk of `radius` around the rounded center.
  pub fn close_disk(&mut self, center: &Vector2d, radius: f64) {
    let c = from_f64(center);
    let r = radius.ceil() as i32;
    let r2 = radius * radius;
    for y in (c[1] - r).max(0)..=(c[1] + r).min(self.height as i32 - 1) {
      for x in (c[0] - r).max(0)..=(c[0] + r).min(self.width as i32 - 1) {
        let dx = (x - c[0]) as f64;
        let dy = (y - c[1]) as f64;
        if dx * dx + dy * dy <= r2 {
          self.open[y as usize * self.width + x as usize] = false;
        }
      }
    }
  }

  pub fn open_pixels(&self) -> &[bool] {
    &self.open
  }
}

// Greedily keeps the longest-lived tracks so that no two kept tracks are
// within `min_distance` of each other. Ties in age keep the input order.
// Returns the kept tracks and the mask with a disk closed around each of them.
pub fn build_mask(
  mut tracks: Vec<Track>,
  min_distance: f64,
  width: usize,
  height: usize,
) -> (Vec<Track>, Mask) {
  let mut mask = Mask::new(width, height);
  // `sort_by` is stable.
  tracks.sort_by(|a, b| b.age.cmp(&a.age));
  let mut retained = Vec::with_capacity(tracks.len());
  for track in tracks {
    if !mask.is_open(&track.pixel) { continue }
    mask.close_disk(&track.pixel, min_distance);
    retained.push(track);
  }
  (retained, mask)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn track(id: usize, x: f64, y: f64, age: usize) -> Track {
    Track::new(TrackId(id), 0, Vector2d::new(x, y), age)
  }

  #[test]
  fn test_close_disk() {
    let mut mask = Mask::new(20, 20);
    mask.close_disk(&Vector2d::new(10.2, 9.8), 3.);
    assert!(!mask.is_open(&Vector2d::new(10., 10.)));
    assert!(!mask.is_open(&Vector2d::new(13., 10.)));
    assert!(mask.is_open(&Vector2d::new(13., 13.)));
    assert!(mask.is_open(&Vector2d::new(14., 10.)));
    assert!(!mask.is_open(&Vector2d::new(-1., 10.)));
    // Disks at the image corner are clipped.
    mask.close_disk(&Vector2d::new(0., 0.), 2.);
    assert!(!mask.is_open_at(0, 0));
  }

  #[test]
  fn test_prefers_old_tracks() {
    let tracks = vec![
      track(1, 50., 50., 1),
      track(2, 55., 50., 5),
      track(3, 100., 50., 2),
      track(4, 104., 50., 2),
    ];
    let (retained, mask) = build_mask(tracks, 10., 200, 100);
    let ids: Vec<_> = retained.iter().map(|t| t.id.0).collect();
    // Id 2 is older than 1, id 3 comes before 4 with equal age.
    assert_eq!(ids, vec![2, 3]);
    assert!(!mask.is_open(&Vector2d::new(50., 50.)));
    assert!(mask.is_open(&Vector2d::new(150., 50.)));
  }

  #[test]
  fn test_minimum_distance_holds() {
    let mut tracks = vec![];
    for i in 0..100 {
      tracks.push(track(i, (i * 7 % 90) as f64 + 5., (i * 13 % 90) as f64 + 5., i % 4 + 1));
    }
    let min_distance = 12.;
    let (retained, _) = build_mask(tracks, min_distance, 100, 100);
    assert!(!retained.is_empty());
    for a in &retained {
      for b in &retained {
        if a.id == b.id { continue }
        assert!((a.pixel - b.pixel).norm() > min_distance);
      }
    }
    for w in retained.windows(2) {
      assert!(w[0].age >= w[1].age);
    }
  }

  #[test]
  fn test_check_size() {
    let mask = Mask::new(10, 5);
    assert!(mask.check_size(10, 5).is_ok());
    assert!(mask.check_size(5, 10).is_err());
  }
}
