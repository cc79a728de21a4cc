use crate::all::*;

// One feature as seen by one camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraObservation {
  pub camera: usize,
  pub bearing: Vector3d,
  // Pixels at tracking resolution.
  pub pixel: Vector2d,
  pub velocity: Vector3d,
}

impl CameraObservation {
  // Flat layout consumed by the estimator: bearing, pixel, velocity.
  pub fn to_array(&self) -> [f64; 8] {
    [
      self.bearing[0], self.bearing[1], self.bearing[2],
      self.pixel[0], self.pixel[1],
      self.velocity[0], self.velocity[1], self.velocity[2],
    ]
  }
}

// Output of one processed frame. Ids are in ascending order and each id
// lists its observations by ascending camera index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeatureFrame {
  pub time: f64,
  pub features: BTreeMap<TrackId, Vec<CameraObservation>>,
}

#[derive(Serialize)]
struct FeatureRecord<'a> {
  id: TrackId,
  camera: usize,
  data: &'a [f64; 8],
}

#[derive(Serialize)]
struct FrameRecord<'a> {
  time: f64,
  features: Vec<FeatureRecord<'a>>,
}

impl FeatureFrame {
  pub fn new(time: f64, tracks: &[&[Track]]) -> FeatureFrame {
    let mut features: BTreeMap<TrackId, Vec<CameraObservation>> = BTreeMap::new();
    for tracks in tracks {
      for track in tracks.iter() {
        features.entry(track.id).or_default().push(CameraObservation {
          camera: track.camera,
          bearing: track.bearing,
          pixel: track.pixel,
          velocity: track.velocity,
        });
      }
    }
    for observations in features.values_mut() {
      observations.sort_by_key(|o| o.camera);
    }
    FeatureFrame { time, features }
  }

  pub fn len(&self) -> usize {
    self.features.len()
  }

  pub fn is_empty(&self) -> bool {
    self.features.is_empty()
  }

  pub fn get(&self, id: TrackId) -> Option<&[CameraObservation]> {
    self.features.get(&id).map(|o| o.as_slice())
  }

  // Iterates `(id, camera, [bx, by, bz, u, v, vx, vy, vz])` tuples.
  pub fn tuples(&self) -> impl Iterator<Item = (TrackId, usize, [f64; 8])> + '_ {
    self.features.iter().flat_map(|(id, observations)| {
      observations.iter().map(move |o| (*id, o.camera, o.to_array()))
    })
  }

  // One JSON object per frame, for line-delimited output.
  pub fn to_json(&self) -> Result<String> {
    let arrays: Vec<(TrackId, usize, [f64; 8])> = self.tuples().collect();
    let record = FrameRecord {
      time: self.time,
      features: arrays.iter()
        .map(|(id, camera, data)| FeatureRecord { id: *id, camera: *camera, data })
        .collect(),
    };
    Ok(serde_json::to_string(&record)?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn track(id: usize, camera: usize, x: f64) -> Track {
    let mut track = Track::new(TrackId(id), camera, Vector2d::new(x, 2.), 1);
    track.bearing = Vector3d::new(x / 10., 0.2, 1.);
    track.velocity = Vector3d::new(0.5, 0., 0.);
    track
  }

  #[test]
  fn test_ordering() {
    let left = vec![track(5, 0, 1.), track(2, 0, 3.), track(9, 0, 4.)];
    let right = vec![track(9, 1, 3.5), track(2, 1, 2.)];
    let frame = FeatureFrame::new(1.5, &[&right, &left]);
    let tuples: Vec<_> = frame.tuples().map(|(id, camera, _)| (id.0, camera)).collect();
    assert_eq!(tuples, vec![(2, 0), (2, 1), (5, 0), (9, 0), (9, 1)]);
    assert_eq!(frame.len(), 3);
    assert_eq!(frame.get(TrackId(9)).unwrap()[1].pixel, Vector2d::new(3.5, 2.));
  }

  #[test]
  fn test_array_layout() {
    let frame = FeatureFrame::new(0., &[&[track(1, 0, 3.)]]);
    let (_, _, a) = frame.tuples().next().unwrap();
    assert_eq!(a, [0.3, 0.2, 1., 3., 2., 0.5, 0., 0.]);
    let json = frame.to_json().unwrap();
    assert!(json.starts_with(r#"{"time":0.0,"features":[{"id":1,"camera":0,"data":[0.3"#));
  }
}
