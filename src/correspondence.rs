use crate::all::*;

// Points this close to the image edge are dropped (pixels).
pub const BORDER_SIZE: i32 = 1;
// Forward-backward tracking must return within this distance (pixels).
pub const MAX_FLOW_BACK_ERROR: f64 = 0.5;
// Fewer successes than this from the predicted pass triggers a full search.
pub const MIN_PREDICTED_SUCCESSES: usize = 10;

// Same rounding as used for mask lookups.
pub fn in_border(p: &Vector2d, width: usize, height: usize) -> bool {
  let q = from_f64(p);
  BORDER_SIZE <= q[0] && q[0] < width as i32 - BORDER_SIZE
    && BORDER_SIZE <= q[1] && q[1] < height as i32 - BORDER_SIZE
}

// A track carried into the current frame along with where it was before.
#[derive(Clone, Debug)]
pub struct Propagated {
  pub track: Track,
  pub previous_pixel: Vector2d,
}

// Validation logic shared by temporal and stereo correspondence. The pixel
// level search is delegated to `solver`.
pub struct Correspondence<'a> {
  pub solver: &'a dyn FlowSolver,
  pub settings: LkSettings,
  pub prediction_levels: usize,
  pub flow_back: bool,
}

impl<'a> Correspondence<'a> {
  pub fn new(solver: &'a dyn FlowSolver, p: &ParameterSet) -> Correspondence<'a> {
    Correspondence {
      solver,
      settings: LkSettings::new(p),
      prediction_levels: p.prediction_lk_levels,
      flow_back: p.flow_back,
    }
  }

  // Moves tracks of the previous frame into the current one. Removed ids
  // are dropped before any flow is computed, survivors have their age
  // incremented.
  pub fn propagate(
    &self,
    prev: &Frame,
    cur: &Frame,
    tracks: &[Track],
    removed: &HashSet<TrackId>,
    predictions: &HashMap<TrackId, Vector2d>,
  ) -> Vec<Propagated> {
    let tracks: Vec<&Track> = tracks.iter()
      .filter(|track| !removed.contains(&track.id))
      .collect();
    if tracks.is_empty() { return vec![] }
    let points: Vec<Vector2d> = tracks.iter().map(|track| track.pixel).collect();

    let forward = self.forward(prev, cur, &tracks, &points, predictions);
    let statuses = self.validate(prev, cur, &points, &forward, true);

    let mut propagated = vec![];
    for (i, track) in tracks.into_iter().enumerate() {
      if !statuses[i] { continue }
      let mut track = track.clone();
      track.pixel = forward[i].unwrap_or(track.pixel);
      track.age += 1;
      propagated.push(Propagated {
        track,
        previous_pixel: points[i],
      });
    }
    debug!("Propagated {}/{} features.", propagated.len(), points.len());
    propagated
  }

  // Forward flow, warm started at the predicted positions when there are any.
  fn forward(
    &self,
    prev: &Frame,
    cur: &Frame,
    tracks: &[&Track],
    points: &[Vector2d],
    predictions: &HashMap<TrackId, Vector2d>,
  ) -> Vec<Option<Vector2d>> {
    let predicted: Vec<usize> = (0..tracks.len())
      .filter(|i| predictions.contains_key(&tracks[*i].id))
      .collect();
    let plain: Vec<usize> = (0..tracks.len())
      .filter(|i| !predictions.contains_key(&tracks[*i].id))
      .collect();
    let mut result = vec![None; tracks.len()];

    let mut fallback = plain;
    if !predicted.is_empty() {
      let requests: Vec<FlowRequest> = predicted.iter()
        .map(|i| FlowRequest {
          point: points[*i],
          guess: predictions.get(&tracks[*i].id).copied(),
        })
        .collect();
      let settings = self.settings.with_levels(self.prediction_levels);
      let predicted_result = self.solver.solve(prev, cur, &requests, &settings);
      let successes = predicted_result.iter().filter(|p| p.is_some()).count();
      if successes < MIN_PREDICTED_SUCCESSES {
        debug!("Predicted flow succeeded for only {} points, searching without prediction.", successes);
        fallback.extend(predicted.iter());
      }
      else {
        for (i, p) in predicted.iter().zip(predicted_result) {
          result[*i] = p;
        }
      }
    }

    if !fallback.is_empty() {
      fallback.sort_unstable();
      let requests: Vec<FlowRequest> = fallback.iter()
        .map(|i| FlowRequest::new(points[*i]))
        .collect();
      let full_result = self.solver.solve(prev, cur, &requests, &self.settings);
      for (i, p) in fallback.iter().zip(full_result) {
        result[*i] = p;
      }
    }
    result
  }

  // Forward-backward check and border check. `frame0` holds `points`,
  // `frame1` holds `forward`. With `seeded` the backward search starts from
  // the original point using the reduced pyramid.
  fn validate(
    &self,
    frame0: &Frame,
    frame1: &Frame,
    points: &[Vector2d],
    forward: &[Option<Vector2d>],
    seeded: bool,
  ) -> Vec<bool> {
    let mut statuses: Vec<bool> = forward.iter().map(|p| p.is_some()).collect();
    if self.flow_back {
      let requests: Vec<FlowRequest> = points.iter().zip(forward)
        .map(|(p0, p1)| FlowRequest {
          point: p1.unwrap_or(*p0),
          guess: if seeded { Some(*p0) } else { None },
        })
        .collect();
      let settings = if seeded {
        self.settings.with_levels(self.prediction_levels)
      }
      else {
        self.settings
      };
      let backward = self.solver.solve(frame1, frame0, &requests, &settings);
      for i in 0..statuses.len() {
        statuses[i] = statuses[i] && match backward[i] {
          Some(p) => (p - points[i]).norm() <= MAX_FLOW_BACK_ERROR,
          None => false,
        };
      }
    }
    for i in 0..statuses.len() {
      if let (true, Some(p)) = (statuses[i], forward[i]) {
        statuses[i] = in_border(&p, frame1.width(), frame1.height());
      }
    }
    statuses
  }

  // Finds the tracks of the primary camera in the secondary camera image of
  // the same instant. Matched tracks keep their id and age.
  pub fn stereo(
    &self,
    left: &Frame,
    right: &Frame,
    tracks: &[Track],
  ) -> Vec<Track> {
    if tracks.is_empty() { return vec![] }
    let points: Vec<Vector2d> = tracks.iter().map(|track| track.pixel).collect();
    let requests: Vec<FlowRequest> = points.iter().map(|p| FlowRequest::new(*p)).collect();
    let forward = self.solver.solve(left, right, &requests, &self.settings);

    let statuses = self.validate(left, right, &points, &forward, false);

    let mut matched = vec![];
    for (i, track) in tracks.iter().enumerate() {
      if let (true, Some(p)) = (statuses[i], forward[i]) {
        matched.push(Track::new(track.id, 1, p, track.age));
      }
    }
    debug!("Matched {}/{} features in the second camera.", matched.len(), tracks.len());
    matched
  }
}
