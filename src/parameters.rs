use crate::all::*;

#[derive(clap::ArgEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowBackend {
  // Points are solved one after another on the calling thread.
  Serial,
  // Points are distributed over a thread pool.
  Parallel,
}

#[derive(clap::ArgEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BearingMode {
  // Bearings scaled so that `z = 1`.
  UnitPlane,
  // Bearings of unit length.
  UnitSphere,
}

#[derive(clap::ArgEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorKind {
  // Shi-Tomasi corners over the whole image.
  Corners,
  // FAST keypoints searched independently in a grid of image regions.
  RegionKeypoints,
}

#[derive(Clone, Debug)]
#[derive(clap::Parser)]
pub struct ParameterSet {
  // Tracker module.
  #[clap(long, default_value = "150")]
  pub max_tracks: usize,
  #[clap(long, default_value = "30")]
  pub min_distance: f64,
  #[clap(long)]
  pub downsample: bool,
  #[clap(long, arg_enum, default_value = "unit-plane")]
  pub bearing_mode: BearingMode,

  // Pyramidal Lucas-Kanade feature tracker.
  #[clap(long, default_value = "3")]
  pub lk_levels: usize,
  #[clap(long, default_value = "30")]
  pub lk_iters: usize,
  #[clap(long, default_value = "21")]
  pub lk_win_size: usize,
  #[clap(long, default_value = "0.01")]
  pub lk_epsilon: f64,
  #[clap(long, default_value = "1")]
  pub prediction_lk_levels: usize,
  #[clap(long, parse(try_from_str), default_value = "true")]
  pub flow_back: bool,
  #[clap(long, arg_enum, default_value = "serial")]
  pub flow_backend: FlowBackend,

  // Feature detection.
  #[clap(long, arg_enum, default_value = "corners")]
  pub detector: DetectorKind,
  #[clap(long, default_value = "0.01")]
  pub corner_quality: f64,
  #[clap(long, default_value = "4")]
  pub region_cols: usize,
  // Defaults to `region_cols` for square images and 1 otherwise.
  #[clap(long)]
  pub region_rows: Option<usize>,
  #[clap(long, default_value = "10")]
  pub region_quota: usize,
  #[clap(long, default_value = "20")]
  pub fast_threshold: u8,

  // Fundamental matrix outlier rejection.
  #[clap(long)]
  pub reject_with_f: bool,
  #[clap(long, default_value = "1.0")]
  pub f_threshold: f64,
  #[clap(long, default_value = "0.99")]
  pub ransac_confidence: f64,
  #[clap(long, default_value = "460")]
  pub focal_length: f64,
  #[clap(long, default_value = "0")]
  pub ransac_seed: u64,

  // Visualizations.
  #[clap(long)]
  pub show_track: bool,
}

// Same values as when nothing is given on the command line.
impl Default for ParameterSet {
  fn default() -> ParameterSet {
    <ParameterSet as clap::Parser>::parse_from(["vio-frontend"])
  }
}

impl ParameterSet {
  pub fn validate(&self) -> Result<()> {
    if self.lk_win_size % 2 != 1 {
      bail!("Lucas-Kanade window size must be odd number.");
    }
    if self.lk_win_size < 3 {
      bail!("Lucas-Kanade window size must be at least 3.");
    }
    if self.lk_iters == 0 {
      bail!("Lucas-Kanade needs at least one iteration.");
    }
    if self.prediction_lk_levels > self.lk_levels {
      bail!("Prediction pyramid depth {} exceeds pyramid depth {}.", self.prediction_lk_levels, self.lk_levels);
    }
    if self.max_tracks == 0 {
      bail!("Target feature count must be positive.");
    }
    if self.min_distance < 0. {
      bail!("Minimum feature distance cannot be negative.");
    }
    if self.region_cols == 0 || self.region_rows == Some(0) {
      bail!("Region detector grid must have at least one cell.");
    }
    if !(0. ..1.).contains(&self.ransac_confidence) {
      bail!("RANSAC confidence must be in [0, 1).");
    }
    Ok(())
  }
}
