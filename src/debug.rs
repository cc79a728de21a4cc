use crate::all::*;

// Side channel for visualization. Written by the tracker only when
// `show_track` is set, read by the binary between frames.
lazy_static! {
  pub static ref DEBUG_DATA: Mutex<DebugData> = Mutex::new(DebugData::default());
}

#[derive(Default)]
pub struct DebugData {
  // Features detected on the latest frame.
  pub detections: Vec<Vector2d>,
  // Open pixels of the latest detection mask.
  pub detection_mask: Vec<bool>,
  pub mask_width: usize,
  // Previous and current position of each propagated feature.
  pub flow: Vec<(Vector2d, Vector2d)>,
  // Features dropped by the fundamental matrix check.
  pub epipolar_outliers: Vec<Vector2d>,
  pub tracks: Vec<Track>,
  pub stereo_tracks: Vec<Track>,
}
