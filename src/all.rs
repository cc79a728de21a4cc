// NOTE This kind of import-all file isn't a common Rust idiom.

pub use crate::{
  camera::*,
  camera_kannala_brandt::*,
  camera_pinhole::*,
  camera_setup::*,
  correspondence::*,
  debug::*,
  detector::*,
  feature_frame::*,
  frame::*,
  image::*,
  mask::*,
  optical_flow::*,
  outlier::*,
  parameters::*,
  pyramid::*,
  replenish::*,
  shi_tomasi::*,
  track::*,
  tracker::*,
  types::*,
  undistort::*,
  util::*,
  velocity::*,
};

pub use {
  std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
    fs::File,
    io::{BufRead, BufReader, Read},
    ops::Index,
    path::{Path, PathBuf},
    sync::Mutex,
  },
  log::{debug, error, info, warn, LevelFilter},
  nalgebra::{dmatrix, matrix, DMatrix},
  anyhow::{anyhow, bail, Context as AnyhowContext, Result},
  lazy_static::lazy_static,
  serde::{Deserialize, Serialize},
};
