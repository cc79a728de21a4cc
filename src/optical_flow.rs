// Pyramidal Lucas-Kanade tracker based on:
// <http://robots.stanford.edu/cs223b04/algo_tracking.pdf>
// “Pyramidal Implementation of the Lucas Kanade Feature Tracker
//   Description of the algorithm” by Jean-Yves Bouguet

use crate::all::*;

use rayon::prelude::*;

// Minimum eigenvalue of the spatial gradient matrix, averaged per window
// pixel. Windows below this have too little texture to be tracked.
const MIN_EIGENVALUE: f64 = 1e-2;

#[derive(Clone, Copy, Debug)]
pub struct LkSettings {
  // Index of the coarsest pyramid level used, 0 tracks on the full image only.
  pub levels: usize,
  pub iters: usize,
  pub win_size: usize,
  // Iteration stops once the update is shorter than this (pixels).
  pub epsilon: f64,
}

impl LkSettings {
  pub fn new(p: &ParameterSet) -> LkSettings {
    LkSettings {
      levels: p.lk_levels,
      iters: p.lk_iters,
      win_size: p.lk_win_size,
      epsilon: p.lk_epsilon,
    }
  }

  pub fn with_levels(&self, levels: usize) -> LkSettings {
    LkSettings { levels, ..*self }
  }
}

#[derive(Clone, Copy, Debug)]
pub struct FlowRequest {
  pub point: Vector2d,
  // Starting position of the search in the second image, defaults to `point`.
  pub guess: Option<Vector2d>,
}

impl FlowRequest {
  pub fn new(point: Vector2d) -> FlowRequest {
    FlowRequest { point, guess: None }
  }
}

// Sparse optical flow between two frames. Returns one entry per request,
// `None` for points that could not be tracked.
pub trait FlowSolver: Send + Sync {
  fn solve(
    &self,
    frame0: &Frame,
    frame1: &Frame,
    requests: &[FlowRequest],
    settings: &LkSettings,
  ) -> Vec<Option<Vector2d>>;
}

pub struct SerialFlow;

pub struct ParallelFlow;

impl FlowSolver for SerialFlow {
  fn solve(
    &self,
    frame0: &Frame,
    frame1: &Frame,
    requests: &[FlowRequest],
    settings: &LkSettings,
  ) -> Vec<Option<Vector2d>> {
    let mut workspace = Workspace::new(settings.win_size);
    requests.iter()
      .map(|request| track_point(&mut workspace, frame0, frame1, request, settings))
      .collect()
  }
}

impl FlowSolver for ParallelFlow {
  fn solve(
    &self,
    frame0: &Frame,
    frame1: &Frame,
    requests: &[FlowRequest],
    settings: &LkSettings,
  ) -> Vec<Option<Vector2d>> {
    requests.par_iter()
      .map_init(
        || Workspace::new(settings.win_size),
        |workspace, request| track_point(workspace, frame0, frame1, request, settings),
      )
      .collect()
  }
}

pub fn make_flow_solver(backend: FlowBackend) -> Box<dyn FlowSolver> {
  match backend {
    FlowBackend::Serial => Box::new(SerialFlow),
    FlowBackend::Parallel => Box::new(ParallelFlow),
  }
}

#[allow(non_snake_case)]
struct Workspace {
  Ix: Matrixd,
  Iy: Matrixd,
  It: Matrixd,
  // Samples around the source feature, one pixel wider than the window on each side.
  grid0: Matrixd,
  grid1: Matrixd,
}

impl Workspace {
  fn new(win_size: usize) -> Workspace {
    Workspace {
      Ix: DMatrix::zeros(win_size, win_size),
      Iy: DMatrix::zeros(win_size, win_size),
      It: DMatrix::zeros(win_size, win_size),
      grid0: DMatrix::zeros(win_size + 2, win_size + 2),
      grid1: DMatrix::zeros(win_size, win_size),
    }
  }
}

#[allow(non_snake_case)]
fn track_point(
  ws: &mut Workspace,
  frame0: &Frame,
  frame1: &Frame,
  request: &FlowRequest,
  settings: &LkSettings,
) -> Option<Vector2d> {
  let feature0 = request.point;
  let mut top = settings.levels
    .min(frame0.level_count() - 1)
    .min(frame1.level_count() - 1);
  while top > 0 && !usable_level(&frame0.get_level(top), &frame1.get_level(top)) {
    top -= 1;
  }

  let mut g = match request.guess {
    Some(guess) => (guess - feature0) / u32::pow(2, top as u32) as f64,
    None => Vector2d::zeros(),
  };
  let mut d = Vector2d::zeros();
  for L in (0..top + 1).rev() {
    let u = feature0 / u32::pow(2, L as u32) as f64;
    // Failures on coarse levels only skip the refinement of that level.
    d = match refine_level(ws, &frame0.get_level(L), &frame1.get_level(L), u, g, settings) {
      Some(nu) => nu,
      None if L > 0 => Vector2d::zeros(),
      None => return None,
    };
    if L > 0 { g = 2. * (g + d) }
  }
  let feature1 = feature0 + g + d;
  if !inside(&frame1.get_level(0), feature1) { return None }
  Some(feature1)
}

// Iterative Lucas-Kanade on one level, returns the residual flow on top of
// the guess `g`.
#[allow(non_snake_case)]
fn refine_level(
  ws: &mut Workspace,
  level0: &Level,
  level1: &Level,
  u: Vector2d,
  g: Vector2d,
  settings: &LkSettings,
) -> Option<Vector2d> {
  let r = (settings.win_size - 1) / 2;
  if !inside(level0, u) { return None }
  scharr(level0, u, r, &mut ws.Ix, &mut ws.Iy, &mut ws.grid0);
  let G = spatial_gradient(&ws.Ix, &ws.Iy);
  if min_eigenvalue(&G) / ((settings.win_size * settings.win_size) as f64) < MIN_EIGENVALUE {
    return None;
  }
  let inv_G = G.try_inverse()?;
  let mut nu = Vector2d::zeros();
  for _ in 0..settings.iters {
    let center = u + g + nu;
    if !inside(level1, center) { return None }
    image_difference(r, &ws.grid0, &mut ws.It, &mut ws.grid1, level1, center);
    let eta = inv_G * flow_vector(&ws.Ix, &ws.Iy, &ws.It);
    nu += eta;
    if eta.norm() < settings.epsilon { break }
  }
  Some(nu)
}

fn usable_level(level0: &Level, level1: &Level) -> bool {
  level0.width >= 2 && level0.height >= 2 && level1.width >= 2 && level1.height >= 2
}

fn inside(level: &Level, u: Vector2d) -> bool {
  u[0] >= 0. && u[1] >= 0.
    && u[0] <= (level.width - 1) as f64
    && u[1] <= (level.height - 1) as f64
}

#[allow(non_snake_case)]
fn image_difference(
  r: usize,
  I0: &Matrixd,
  It: &mut Matrixd,
  grid1: &mut Matrixd,
  level: &Level,
  center: Vector2d,
) {
  fill_grid(level, r as i32, center, grid1);
  *It = I0.slice((1, 1), (grid1.nrows(), grid1.ncols())) - &*grid1;
}

fn flow_vector(
  ix: &Matrixd,
  iy: &Matrixd,
  it: &Matrixd,
) -> Vector2d {
  Vector2d::new(it.dot(ix), it.dot(iy))
}

fn spatial_gradient(
  ix: &Matrixd,
  iy: &Matrixd,
) -> Matrix2d {
  assert_eq!(ix.shape(), iy.shape());
  let x2 = ix.dot(ix);
  let y2 = iy.dot(iy);
  let xy = ix.dot(iy);
  Matrix2d::new(x2, xy, xy, y2)
}

fn min_eigenvalue(g: &Matrix2d) -> f64 {
  let a = g[(0, 0)];
  let b = g[(0, 1)];
  let c = g[(1, 1)];
  0.5 * (a + c) - (0.25 * (a - c) * (a - c) + b * b).sqrt()
}

// Samples a square of side `2r + 1` centered at `center`.
fn fill_grid(
  level: &Level,
  r: i32,
  center: Vector2d,
  grid: &mut Matrixd,
) {
  let n = (2 * r + 1) as usize;
  if grid.shape() != (n, n) {
    *grid = DMatrix::zeros(n, n);
  }
  for (y_ind, y) in (-r..=r).enumerate() {
    for (x_ind, x) in (-r..=r).enumerate() {
      grid[(y_ind, x_ind)] = bilinear(level, center + Vector2d::new(x as f64, y as f64));
    }
  }
}

// Gradients over the window of radius `r`, with the samples they were
// computed from (one pixel of margin) left in `grid`.
fn scharr(
  level: &Level,
  center: Vector2d,
  r: usize,
  out_x: &mut Matrixd,
  out_y: &mut Matrixd,
  grid: &mut Matrixd,
) {
  fill_grid(level, r as i32 + 1, center, grid);
  let n = grid.nrows() - 2;
  if out_x.shape() != (n, n) { *out_x = Matrixd::zeros(n, n) }
  if out_y.shape() != (n, n) { *out_y = Matrixd::zeros(n, n) }
  for y in 1..(grid.nrows() - 1) {
    for x in 1..(grid.ncols() - 1) {
      out_x[(y - 1, x - 1)] = (10. * grid[(y, x + 1)]
        + 3. * grid[(y + 1, x + 1)]
        + 3. * grid[(y - 1, x + 1)]
        - 10. * grid[(y, x - 1)]
        - 3. * grid[(y + 1, x - 1)]
        - 3. * grid[(y - 1, x - 1)]
      ) / 32.;
      out_y[(y - 1, x - 1)] = (10. * grid[(y + 1, x)]
        + 3. * grid[(y + 1, x + 1)]
        + 3. * grid[(y + 1, x - 1)]
        - 10. * grid[(y - 1, x)]
        - 3. * grid[(y - 1, x + 1)]
        - 3. * grid[(y - 1, x - 1)]
      ) / 32.;
    }
  }
}

// Bilinear interpolation, coordinates outside the level are clamped to the
// nearest edge pixel.
#[inline(always)]
fn bilinear(level: &Level, u: Vector2d) -> f64 {
  let max_x = (level.width - 1) as f64;
  let max_y = (level.height - 1) as f64;
  let x = u[0].max(0.).min(max_x);
  let y = u[1].max(0.).min(max_y);
  let x0 = x as usize;
  let y0 = y as usize;
  let x1 = usize::min(x0 + 1, level.width - 1);
  let y1 = usize::min(y0 + 1, level.height - 1);
  let xa = x - x0 as f64;
  let ya = y - y0 as f64;
  let v = |x: usize, y: usize| level.data[y * level.width + x] as f64;
  (1. - xa) * (1. - ya) * v(x0, y0)
    + xa * (1. - ya) * v(x1, y0)
    + (1. - xa) * ya * v(x0, y1)
    + xa * ya * v(x1, y1)
}
