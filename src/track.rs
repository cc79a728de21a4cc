use crate::all::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackId(pub usize);

impl fmt::Display for TrackId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

// One feature as seen by one camera in the current frame.
#[derive(Clone, Debug)]
pub struct Track {
  pub id: TrackId,
  // Index of the observing camera, 0 for the primary one.
  pub camera: usize,
  // Pixels at tracking resolution.
  pub pixel: Vector2d,
  // Number of consecutive frames the feature has been tracked, 1 when new.
  pub age: usize,
  pub bearing: Vector3d,
  pub velocity: Vector3d,
}

impl Track {
  pub fn new(id: TrackId, camera: usize, pixel: Vector2d, age: usize) -> Track {
    Track {
      id,
      camera,
      pixel,
      age,
      bearing: Vector3d::zeros(),
      velocity: Vector3d::zeros(),
    }
  }
}

// Hands out process-unique ids that are never reused.
#[derive(Debug, Default)]
pub struct IdAllocator {
  next: usize,
}

impl IdAllocator {
  pub fn new() -> IdAllocator {
    IdAllocator { next: 0 }
  }

  pub fn next_id(&mut self) -> TrackId {
    let id = TrackId(self.next);
    self.next += 1;
    id
  }
}

pub fn bearing_map(tracks: &[Track]) -> HashMap<TrackId, Vector3d> {
  tracks.iter().map(|track| (track.id, track.bearing)).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_ids_are_unique() {
    let mut ids = IdAllocator::new();
    let a = ids.next_id();
    let b = ids.next_id();
    assert_eq!(a, TrackId(0));
    assert_eq!(b, TrackId(1));
    assert_ne!(ids.next_id(), a);
  }
}
