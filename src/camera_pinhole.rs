// Pinhole mode with OpenCV distortion model using only the radial components.
//
// NOTE This code is heavily based on the HybVIO implementation here:
//   <https://github.com/SpectacularAI/HybVIO/blob/main/src/tracker/camera.cpp>

use crate::all::*;

const UNDISTORT_MAX_ITERATIONS: usize = 20;
const UNDISTORT_CONVERGENCE_THRESHOLD: f64 = 1e-5;

pub struct PinholeModel {
  pub camera_matrix: Matrix3d,
  pub camera_matrix_inv: Matrix3d,
  pub distortion_coefficients: Vec<f64>,
}

impl PinholeModel {
  pub fn new(
    camera_matrix: Matrix3d,
    distortion_coefficients: Vec<f64>,
  ) -> Result<PinholeModel> {
    if !distortion_coefficients.is_empty() && distortion_coefficients.len() != 3 {
      bail!("Pinhole model takes 0 or 3 radial distortion coefficients, got {}.", distortion_coefficients.len());
    }
    let camera_matrix_inv = camera_matrix.try_inverse()
      .ok_or(anyhow!("Camera matrix is not invertible."))?;
    Ok(PinholeModel {
      camera_matrix,
      camera_matrix_inv,
      distortion_coefficients,
    })
  }

  fn distort(&self, p: Vector2d, compute_derivative: bool) -> (Vector2d, Option<Matrix2d>) {
    if self.distortion_coefficients.is_empty() {
      return (p, if compute_derivative { Some(Matrix2d::identity()) } else { None });
    }
    let c = &self.distortion_coefficients;
    let x = p[0];
    let y = p[1];
    let r2 = x * x + y * y;
    let theta = 1. + r2 * (c[0] + r2 * (c[1] + r2 * c[2]));
    let dtheta = c[0] + r2 * (c[1] * 2. + r2 * c[2] * 3.);
    let dp = if compute_derivative {
      Some(Matrix2d::new(
        theta + x * dtheta * 2. * x, x * dtheta * 2. * y,
        y * dtheta * 2. * x, theta + y * dtheta * 2. * y
      ))
    }
    else {
      None
    };
    (Vector2d::new(x * theta, y * theta), dp)
  }

  fn undistort(&self, dist: Vector2d) -> Option<Vector2d> {
    if self.distortion_coefficients.is_empty() { return Some(dist) }
    let mut point = dist;
    for _ in 0..UNDISTORT_MAX_ITERATIONS {
      let (p, dp) = self.distort(point, true);
      let delta = dp?.try_inverse()? * (dist - p);
      point += delta;
      if delta.norm() < UNDISTORT_CONVERGENCE_THRESHOLD { break }
    }
    Some(point)
  }
}

impl CameraModel for PinholeModel {
  fn pixel_to_ray(&self, pixel: Vector2d) -> Option<Vector3d> {
    let dist = self.camera_matrix_inv * Vector3d::new(pixel[0], pixel[1], 1.);
    let p = self.undistort(Vector2d::new(dist[0], dist[1]))?;
    Some(Vector3d::new(p[0], p[1], 1.).normalize())
  }

  fn ray_to_pixel_d(&self, ray: Vector3d, compute_derivative: bool)
    -> (Option<Vector2d>, Option<Matrix23d>)
  {
    if ray[2] <= 0. { return (None, None) }
    let iz = 1. / ray[2];
    let (dist, ddist) = self.distort(iz * Vector2d::new(ray[0], ray[1]), compute_derivative);
    let p = Vector3d::new(dist[0], dist[1], 1.);
    let pixel = self.camera_matrix * p;

    let dpixel = match ddist {
      Some(ddist) => {
        let dhomog = matrix!(
          iz, 0., -ray[0] * iz * iz;
          0., iz, -ray[1] * iz * iz;
        );
        Some(self.camera_matrix.fixed_slice::<2, 2>(0, 0) * ddist * dhomog)
      },
      None => None,
    };
    (Some(Vector2d::new(pixel[0], pixel[1])), dpixel)
  }
}
