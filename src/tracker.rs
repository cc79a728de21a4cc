use crate::all::*;

// Everything kept from the last successfully processed frame.
struct TrackerState {
  time: f64,
  frame: Frame,
  right_frame: Option<Frame>,
  tracks: Vec<Track>,
  stereo_tracks: Vec<Track>,
}

pub struct Tracker {
  parameters: ParameterSet,
  cameras: Vec<Camera>,
  solver: Box<dyn FlowSolver>,
  detector: Box<dyn FeatureDetector>,
  ransac: FundamentalRansac,
  ids: IdAllocator,
  state: Option<TrackerState>,
  // Buffers of replaced frames, reused for the next ones.
  unused_frames: Vec<Frame>,
  predictions: HashMap<TrackId, Vector3d>,
  removed: HashSet<TrackId>,
}

impl Tracker {
  // One camera for mono tracking, two for stereo.
  pub fn new(parameters: ParameterSet, cameras: Vec<Camera>) -> Result<Tracker> {
    let solver = make_flow_solver(parameters.flow_backend);
    Tracker::with_solver(parameters, cameras, solver)
  }

  pub fn with_solver(
    parameters: ParameterSet,
    cameras: Vec<Camera>,
    solver: Box<dyn FlowSolver>,
  ) -> Result<Tracker> {
    parameters.validate()?;
    if cameras.is_empty() || cameras.len() > 2 {
      bail!("Expected one or two cameras, got {}.", cameras.len());
    }
    Ok(Tracker {
      detector: make_detector(&parameters),
      ransac: FundamentalRansac::new(&parameters),
      parameters,
      cameras,
      solver,
      ids: IdAllocator::new(),
      state: None,
      unused_frames: vec![],
      predictions: HashMap::new(),
      removed: HashSet::new(),
    })
  }

  // Predicted bearings of tracked features in the next frame, used to warm
  // start the optical flow. Consumed by the next processed frame.
  pub fn set_prediction(&mut self, predictions: HashMap<TrackId, Vector3d>) {
    self.predictions = predictions;
  }

  // Features that should no longer be tracked, dropped on the next frame.
  pub fn remove_outliers<I: IntoIterator<Item = TrackId>>(&mut self, ids: I) {
    self.removed.extend(ids);
  }

  pub fn is_stereo(&self) -> bool {
    self.cameras.len() == 2
  }

  pub fn frame(&self) -> Option<&Frame> {
    self.state.as_ref().map(|s| &s.frame)
  }

  pub fn right_frame(&self) -> Option<&Frame> {
    self.state.as_ref().and_then(|s| s.right_frame.as_ref())
  }

  pub fn tracks(&self) -> &[Track] {
    self.state.as_ref().map_or(&[], |s| &s.tracks)
  }

  fn scale(&self) -> f64 {
    if self.parameters.downsample { 2. } else { 1. }
  }

  // Tracks features into a new frame. `right` is used only with a stereo
  // camera setup. On error the state of the previous frame is kept as is.
  pub fn process(&mut self, time: f64, left: &Image, right: Option<&Image>) -> Result<FeatureFrame> {
    let p = &self.parameters;
    left.check().context("Invalid left image.")?;
    let right = if self.cameras.len() == 2 { right } else { None };
    if let Some(right) = right {
      right.check().context("Invalid right image.")?;
      if (right.width, right.height) != (left.width, left.height) {
        bail!(
          "Left image is {}x{} but the right one is {}x{}.",
          left.width, left.height, right.width, right.height,
        );
      }
    }
    if let Some(state) = &self.state {
      let (w, h) = if p.downsample { (left.width / 2, left.height / 2) } else { (left.width, left.height) };
      if (w, h) != (state.frame.width(), state.frame.height()) {
        bail!(
          "Frame size changed from {}x{} to {}x{}.",
          state.frame.width(), state.frame.height(), w, h,
        );
      }
    }

    let frame = Frame::new(left, self.unused_frames.pop(), p.lk_levels, p.downsample)?;
    let right_frame = match right {
      Some(right) => Some(Frame::new(right, self.unused_frames.pop(), p.lk_levels, p.downsample)?),
      None => None,
    };
    let (width, height) = (frame.width(), frame.height());
    let scale = self.scale();
    let p = &self.parameters;
    let correspondence = Correspondence::new(self.solver.as_ref(), p);

    // Temporal correspondence.
    let mut propagated = vec![];
    let mut epipolar_outliers = vec![];
    let mut dt = 0.;
    if let Some(state) = &self.state {
      dt = time - state.time;
      let predictions: HashMap<TrackId, Vector2d> = self.predictions.iter()
        .filter_map(|(id, bearing)| Some((*id, project_bearing(&self.cameras[0], bearing, scale)?)))
        .collect();
      propagated = correspondence.propagate(&state.frame, &frame, &state.tracks, &self.removed, &predictions);
      if p.reject_with_f {
        let before: Vec<(TrackId, Vector2d)> = propagated.iter()
          .map(|p| (p.track.id, p.track.pixel))
          .collect();
        propagated = reject_with_f(&mut self.ransac, &self.cameras[0], propagated, scale, width, height);
        let kept: HashSet<TrackId> = propagated.iter().map(|p| p.track.id).collect();
        epipolar_outliers = before.into_iter()
          .filter(|(id, _)| !kept.contains(id))
          .map(|(_, pixel)| pixel)
          .collect();
      }
    }
    let flow: Vec<(Vector2d, Vector2d)> = propagated.iter()
      .map(|p| (p.previous_pixel, p.track.pixel))
      .collect();
    let tracks: Vec<Track> = propagated.into_iter().map(|p| p.track).collect();

    // Spacing and replenishment.
    let (mut tracks, mut mask) = build_mask(tracks, p.min_distance, width, height);
    let retained = tracks.len();
    replenish(self.detector.as_mut(), &frame.image, &mut mask, &mut tracks, &mut self.ids, p)?;

    let mut tracks = undistort_tracks(&self.cameras[0], tracks, scale, p.bearing_mode);
    let previous = self.state.as_ref().map(|s| bearing_map(&s.tracks)).unwrap_or_default();
    compute_velocities(&mut tracks, &previous, dt);

    // Stereo correspondence.
    let mut stereo_tracks = vec![];
    if let Some(right_frame) = &right_frame {
      stereo_tracks = correspondence.stereo(&frame, right_frame, &tracks);
      stereo_tracks = undistort_tracks(&self.cameras[1], stereo_tracks, scale, p.bearing_mode);
      let previous = self.state.as_ref().map(|s| bearing_map(&s.stereo_tracks)).unwrap_or_default();
      compute_velocities(&mut stereo_tracks, &previous, dt);
    }
    info!(
      "Frame {:.3}: {} tracked, {} retained, {} new, {} stereo.",
      time, flow.len(), retained, tracks.len().saturating_sub(retained), stereo_tracks.len(),
    );

    if p.show_track {
      let mut d = DEBUG_DATA.lock().unwrap();
      d.epipolar_outliers = epipolar_outliers;
      d.detections = tracks.iter().filter(|t| t.age == 1).map(|t| t.pixel).collect();
      d.detection_mask = mask.open_pixels().to_vec();
      d.mask_width = mask.width;
      d.flow = flow;
      d.tracks = tracks.clone();
      d.stereo_tracks = stereo_tracks.clone();
    }

    let output = FeatureFrame::new(time, &[&tracks, &stereo_tracks]);

    // Commit.
    let old = self.state.replace(TrackerState {
      time,
      frame,
      right_frame,
      tracks,
      stereo_tracks,
    });
    if let Some(old) = old {
      self.unused_frames.push(old.frame);
      self.unused_frames.extend(old.right_frame);
    }
    self.predictions.clear();
    self.removed.clear();
    Ok(output)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const W: usize = 160;
  const H: usize = 120;

  fn camera() -> Camera {
    Camera::pinhole(Matrix3d::new(
      100., 0., 80.,
      0., 100., 60.,
      0., 0., 1.,
    ), vec![]).unwrap()
  }

  fn parameters() -> ParameterSet {
    let mut p = ParameterSet::default();
    p.min_distance = 15.;
    p.max_tracks = 40;
    p
  }

  fn ids(frame: &FeatureFrame) -> Vec<TrackId> {
    frame.features.keys().copied().collect()
  }

  #[test]
  fn test_static_frames_keep_ids() {
    let mut tracker = Tracker::new(parameters(), vec![camera()]).unwrap();
    let image = textured_image(W, H, Vector2d::zeros());
    let first = tracker.process(0., &image, None).unwrap();
    assert!(!first.is_empty());
    assert!(first.len() <= 40);
    for (_, _, a) in first.tuples() {
      // Zero velocity on first sight, unit plane bearings.
      assert_eq!(&a[5..8], &[0., 0., 0.]);
      assert_eq!(a[2], 1.);
    }

    let second = tracker.process(0.1, &image, None).unwrap();
    assert_eq!(ids(&first), ids(&second));
    assert!(tracker.tracks().iter().all(|t| t.age == 2));
    for (_, _, a) in second.tuples() {
      assert_eq!(&a[5..8], &[0., 0., 0.]);
    }
    for (id, observations) in &second.features {
      assert_eq!(observations.len(), 1);
      assert_eq!(observations[0].pixel, first.get(*id).unwrap()[0].pixel);
    }
  }

  #[test]
  fn test_translation_velocity() {
    let mut tracker = Tracker::new(parameters(), vec![camera()]).unwrap();
    let first = tracker.process(1.0, &textured_image(W, H, Vector2d::zeros()), None).unwrap();
    let shift = Vector2d::new(2., 1.);
    let second = tracker.process(1.1, &textured_image(W, H, shift), None).unwrap();

    let survivors: Vec<TrackId> = ids(&second).into_iter()
      .filter(|id| first.get(*id).is_some())
      .collect();
    assert!(2 * survivors.len() >= first.len());
    let mut accurate = 0;
    for id in &survivors {
      let o0 = first.get(*id).unwrap()[0];
      let o1 = second.get(*id).unwrap()[0];
      if (o1.pixel - o0.pixel - shift).norm() < 0.2 {
        accurate += 1;
        // Bearings move by shift / focal length in 0.1 seconds.
        assert!((o1.velocity - Vector3d::new(0.2, 0.1, 0.)).norm() < 0.03);
      }
    }
    assert!(2 * accurate >= survivors.len());
    assert!(tracker.tracks().iter().filter(|t| t.age == 2).count() == survivors.len());
  }

  #[test]
  fn test_stereo_observations() {
    let mut tracker = Tracker::new(parameters(), vec![camera(), camera()]).unwrap();
    assert!(tracker.is_stereo());
    let left = textured_image(W, H, Vector2d::zeros());
    let disparity = Vector2d::new(-4., 0.);
    let right = textured_image(W, H, disparity);
    let output = tracker.process(0., &left, Some(&right)).unwrap();

    let stereo: Vec<_> = output.features.values().filter(|o| o.len() == 2).collect();
    assert!(!stereo.is_empty());
    let mut accurate = 0;
    for observations in &stereo {
      assert_eq!(observations[0].camera, 0);
      assert_eq!(observations[1].camera, 1);
      if (observations[1].pixel - observations[0].pixel - disparity).norm() < 0.2 {
        accurate += 1;
      }
    }
    assert!(2 * accurate >= stereo.len());
    // Tuples of one id are adjacent and ordered by camera.
    let tuples: Vec<_> = output.tuples().map(|(id, camera, _)| (id, camera)).collect();
    let mut sorted = tuples.clone();
    sorted.sort();
    assert_eq!(tuples, sorted);
  }

  #[test]
  fn test_stereo_velocity() {
    let mut tracker = Tracker::new(parameters(), vec![camera(), camera()]).unwrap();
    let disparity = Vector2d::new(-4., 0.);
    let first = tracker.process(
      0.,
      &textured_image(W, H, Vector2d::zeros()),
      Some(&textured_image(W, H, disparity)),
    ).unwrap();
    let shift = Vector2d::new(2., 1.);
    let second = tracker.process(
      0.1,
      &textured_image(W, H, shift),
      Some(&textured_image(W, H, shift + disparity)),
    ).unwrap();

    let mut continuing = 0;
    let mut accurate = 0;
    for (id, observations) in &second.features {
      if observations.len() < 2 { continue }
      let right1 = observations[1];
      let right0 = match first.get(*id) {
        Some(o) if o.len() == 2 => o[1],
        _ => continue,
      };
      continuing += 1;
      assert!(right1.velocity.norm() > 0.);
      if (right1.pixel - right0.pixel - shift).norm() < 0.2 {
        accurate += 1;
        assert!((right1.velocity - Vector3d::new(0.2, 0.1, 0.)).norm() < 0.03);
      }
    }
    assert!(continuing > 0);
    assert!(2 * accurate >= continuing);
  }

  // Small bright squares on a dark background, spaced wider than the
  // minimum distance.
  fn blocks() -> Image {
    Image::from_fn(W, H, |x, y| {
      let near = |v: usize| v >= 18 && v % 20 >= 18 || v >= 20 && v % 20 <= 2;
      let inside = near(x) && near(y) && x <= 142 && y <= 102;
      if inside { 220 } else { 30 }
    })
  }

  #[test]
  fn test_region_keypoints() {
    let mut p = parameters();
    p.detector = DetectorKind::RegionKeypoints;
    p.flow_backend = FlowBackend::Parallel;
    let mut tracker = Tracker::new(p, vec![camera()]).unwrap();
    let image = blocks();
    let first = tracker.process(0., &image, None).unwrap();
    assert!(!first.is_empty());
    assert!(first.len() <= 40);
    let pixels: Vec<Vector2d> = first.features.values().map(|o| o[0].pixel).collect();
    for (i, a) in pixels.iter().enumerate() {
      for b in &pixels[i + 1..] {
        assert!((a - b).norm() >= 15.);
      }
    }

    let second = tracker.process(0.1, &image, None).unwrap();
    for id in ids(&first) {
      assert!(second.get(id).is_some());
    }
    assert!(tracker.tracks().iter().filter(|t| t.age == 2).count() == first.len());
  }

  #[test]
  fn test_failed_frame_keeps_state() {
    let mut tracker = Tracker::new(parameters(), vec![camera(), camera()]).unwrap();
    let image = textured_image(W, H, Vector2d::zeros());
    let first = tracker.process(0., &image, Some(&image)).unwrap();

    assert!(tracker.process(0.1, &Image::empty(), None).is_err());
    let small = textured_image(W / 2, H, Vector2d::zeros());
    assert!(tracker.process(0.1, &image, Some(&small)).is_err());
    assert!(tracker.process(0.1, &small, None).is_err());
    let mut kept: Vec<TrackId> = tracker.tracks().iter().map(|t| t.id).collect();
    kept.sort();
    assert_eq!(ids(&first), kept);

    let second = tracker.process(0.1, &image, Some(&image)).unwrap();
    assert_eq!(ids(&first), ids(&second));
    assert!(tracker.tracks().iter().all(|t| t.age == 2));
  }

  #[test]
  fn test_removed_ids_and_prediction() {
    let mut tracker = Tracker::new(parameters(), vec![camera()]).unwrap();
    let image = textured_image(W, H, Vector2d::zeros());
    let first = tracker.process(0., &image, None).unwrap();
    let removed = ids(&first)[0];
    tracker.remove_outliers([removed]);
    let predictions: HashMap<TrackId, Vector3d> = tracker.tracks().iter()
      .map(|t| (t.id, t.bearing))
      .collect();
    tracker.set_prediction(predictions);

    let second = tracker.process(0.1, &image, None).unwrap();
    assert!(second.get(removed).is_none());
    for id in ids(&first).into_iter().skip(1) {
      assert!(second.get(id).is_some());
    }
    assert!(tracker.predictions.is_empty());
    assert!(tracker.removed.is_empty());

    // Removed ids never come back.
    let third = tracker.process(0.2, &image, None).unwrap();
    assert!(third.get(removed).is_none());
  }

  #[test]
  fn test_invalid_setup() {
    assert!(Tracker::new(parameters(), vec![]).is_err());
    assert!(Tracker::new(parameters(), vec![camera(), camera(), camera()]).is_err());
    let mut p = parameters();
    p.lk_win_size = 4;
    assert!(Tracker::new(p, vec![camera()]).is_err());
  }

  #[test]
  fn test_downsampled_unit_sphere() {
    let mut p = parameters();
    p.downsample = true;
    p.bearing_mode = BearingMode::UnitSphere;
    let camera = Camera::pinhole(Matrix3d::new(
      200., 0., 160.,
      0., 200., 120.,
      0., 0., 1.,
    ), vec![]).unwrap();
    let mut tracker = Tracker::new(p, vec![camera]).unwrap();
    let output = tracker.process(0., &textured_image(2 * W, 2 * H, Vector2d::zeros()), None).unwrap();
    assert!(!output.is_empty());
    assert_eq!(tracker.frame().unwrap().width(), W);
    for (_, _, a) in output.tuples() {
      let b = Vector3d::new(a[0], a[1], a[2]);
      assert!((b.norm() - 1.).abs() < 1e-12);
      // Tracking pixel u maps to calibration pixel 2u.
      assert!((b[0] / b[2] - (2. * a[3] - 160.) / 200.).abs() < 1e-9);
    }
  }

  #[test]
  fn test_debug_data() {
    let mut p = parameters();
    p.show_track = true;
    let mut tracker = Tracker::new(p, vec![camera()]).unwrap();
    let image = textured_image(W, H, Vector2d::zeros());
    let output = tracker.process(0., &image, None).unwrap();
    let d = DEBUG_DATA.lock().unwrap();
    assert_eq!(d.tracks.len(), output.len());
    assert_eq!(d.detections.len(), output.len());
    assert_eq!(d.detection_mask.len(), W * H);
  }

}
