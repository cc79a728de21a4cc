use crate::all::*;

// Finite difference bearing velocities, matched by id against the previous
// frame. Ids without a previous bearing, an empty previous frame and a
// non-positive `dt` all give zero velocity.
pub fn compute_velocities(
  tracks: &mut [Track],
  previous: &HashMap<TrackId, Vector3d>,
  dt: f64,
) {
  if previous.is_empty() || dt <= 0. {
    if !previous.is_empty() {
      warn!("Non-positive time step {} between frames, reporting zero velocities.", dt);
    }
    for track in tracks.iter_mut() {
      track.velocity = Vector3d::zeros();
    }
    return;
  }
  for track in tracks.iter_mut() {
    track.velocity = match previous.get(&track.id) {
      Some(prev) => (track.bearing - prev) / dt,
      None => Vector3d::zeros(),
    };
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn track(id: usize, bearing: Vector3d) -> Track {
    let mut track = Track::new(TrackId(id), 0, Vector2d::zeros(), 1);
    track.bearing = bearing;
    track
  }

  #[test]
  fn test_velocity() {
    let mut tracks = vec![
      track(7, Vector3d::new(0.12, 0.20, 1.)),
      track(8, Vector3d::new(0.5, 0.5, 1.)),
    ];
    let mut previous = HashMap::new();
    previous.insert(TrackId(7), Vector3d::new(0.10, 0.20, 1.));
    compute_velocities(&mut tracks, &previous, 0.1);
    assert!((tracks[0].velocity - Vector3d::new(0.2, 0., 0.)).norm() < 1e-12);
    // New id.
    assert_eq!(tracks[1].velocity, Vector3d::zeros());
  }

  #[test]
  fn test_degenerate_cases() {
    let mut tracks = vec![track(1, Vector3d::new(0.3, 0.1, 1.))];
    tracks[0].velocity = Vector3d::new(1., 1., 1.);
    compute_velocities(&mut tracks, &HashMap::new(), 0.1);
    assert_eq!(tracks[0].velocity, Vector3d::zeros());

    let mut previous = HashMap::new();
    previous.insert(TrackId(1), Vector3d::new(0.2, 0.1, 1.));
    compute_velocities(&mut tracks, &previous, 0.);
    assert_eq!(tracks[0].velocity, Vector3d::zeros());
    compute_velocities(&mut tracks, &previous, -0.1);
    assert_eq!(tracks[0].velocity, Vector3d::zeros());
  }
}
