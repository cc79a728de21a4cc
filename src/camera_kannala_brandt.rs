// Kannala-Brandt fisheye model with four coefficients (the OpenCV fisheye
// model). Incidence angle `theta` maps to distorted radius
//   theta_d = theta (1 + k1 theta^2 + k2 theta^4 + k3 theta^6 + k4 theta^8).

use crate::all::*;

const UNDISTORT_MAX_ITERATIONS: usize = 20;
const UNDISTORT_CONVERGENCE_THRESHOLD: f64 = 1e-10;

pub struct KannalaBrandtModel {
  pub camera_matrix: Matrix3d,
  pub camera_matrix_inv: Matrix3d,
  pub coefficients: [f64; 4],
}

impl KannalaBrandtModel {
  pub fn new(camera_matrix: Matrix3d, coefficients: &[f64]) -> Result<KannalaBrandtModel> {
    if coefficients.len() != 4 {
      bail!("Kannala-Brandt model takes 4 distortion coefficients, got {}.", coefficients.len());
    }
    let camera_matrix_inv = camera_matrix.try_inverse()
      .ok_or(anyhow!("Camera matrix is not invertible."))?;
    Ok(KannalaBrandtModel {
      camera_matrix,
      camera_matrix_inv,
      coefficients: [coefficients[0], coefficients[1], coefficients[2], coefficients[3]],
    })
  }

  // Returns `theta_d` and its derivative wrt `theta`.
  fn distort_angle(&self, theta: f64) -> (f64, f64) {
    let k = &self.coefficients;
    let t2 = theta * theta;
    let poly = 1. + t2 * (k[0] + t2 * (k[1] + t2 * (k[2] + t2 * k[3])));
    let dpoly = 1. + t2 * (3. * k[0] + t2 * (5. * k[1] + t2 * (7. * k[2] + t2 * 9. * k[3])));
    (theta * poly, dpoly)
  }

  // Newton iteration for `theta` given `theta_d`.
  fn undistort_angle(&self, theta_d: f64) -> Option<f64> {
    let mut theta = theta_d;
    for _ in 0..UNDISTORT_MAX_ITERATIONS {
      let (f, df) = self.distort_angle(theta);
      if df.abs() < 1e-12 { return None }
      let delta = (f - theta_d) / df;
      theta -= delta;
      if delta.abs() < UNDISTORT_CONVERGENCE_THRESHOLD { break }
    }
    if !theta.is_finite() || theta < 0. || theta >= std::f64::consts::PI { return None }
    Some(theta)
  }
}

impl CameraModel for KannalaBrandtModel {
  fn pixel_to_ray(&self, pixel: Vector2d) -> Option<Vector3d> {
    let p = self.camera_matrix_inv * Vector3d::new(pixel[0], pixel[1], 1.);
    let theta_d = (p[0] * p[0] + p[1] * p[1]).sqrt();
    if theta_d < 1e-12 {
      return Some(Vector3d::new(0., 0., 1.));
    }
    let theta = self.undistort_angle(theta_d)?;
    let s = theta.sin() / theta_d;
    Some(Vector3d::new(p[0] * s, p[1] * s, theta.cos()))
  }

  fn ray_to_pixel_d(&self, ray: Vector3d, compute_derivative: bool)
    -> (Option<Vector2d>, Option<Matrix23d>)
  {
    let r = (ray[0] * ray[0] + ray[1] * ray[1]).sqrt();
    if r < 1e-12 {
      if ray[2] <= 0. { return (None, None) }
      let c = self.camera_matrix * Vector3d::new(0., 0., 1.);
      let dpixel = if compute_derivative {
        let iz = 1. / ray[2];
        Some(self.camera_matrix.fixed_slice::<2, 2>(0, 0) * matrix!(
          iz, 0., 0.;
          0., iz, 0.;
        ))
      }
      else {
        None
      };
      return (Some(Vector2d::new(c[0], c[1])), dpixel);
    }
    let theta = r.atan2(ray[2]);
    let (theta_d, dtheta_d) = self.distort_angle(theta);
    let q = Vector2d::new(ray[0], ray[1]) * (theta_d / r);
    let pixel = self.camera_matrix * Vector3d::new(q[0], q[1], 1.);

    let dpixel = if compute_derivative {
      // d theta / d ray.
      let n2 = r * r + ray[2] * ray[2];
      let dtheta = Vector3d::new(
        ray[2] * ray[0] / (r * n2),
        ray[2] * ray[1] / (r * n2),
        -r / n2,
      );
      // d r / d ray.
      let dr = Vector3d::new(ray[0] / r, ray[1] / r, 0.);
      // q = [x, y] * theta_d / r.
      let scale = theta_d / r;
      let dscale = dtheta * (dtheta_d / r) - dr * (theta_d / (r * r));
      let mut dq = Matrix23d::zeros();
      for i in 0..2 {
        for j in 0..3 {
          dq[(i, j)] = ray[i] * dscale[j] + if i == j { scale } else { 0. };
        }
      }
      Some(self.camera_matrix.fixed_slice::<2, 2>(0, 0) * dq)
    }
    else {
      None
    };
    (Some(Vector2d::new(pixel[0], pixel[1])), dpixel)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn model() -> KannalaBrandtModel {
    KannalaBrandtModel::new(Matrix3d::new(
      380., 0., 320.,
      0., 380., 240.,
      0., 0., 1.,
    ), &[0.012, -0.004, 0.0012, -0.0003]).unwrap()
  }

  #[test]
  fn test_round_trip() {
    let camera = model();
    for ray in [
      Vector3d::new(0., 0., 1.),
      Vector3d::new(0.3, -0.2, 1.),
      Vector3d::new(1.5, 0.5, 0.2),
      Vector3d::new(-1., 0.3, -0.1),
    ] {
      let ray = ray.normalize();
      let pixel = camera.ray_to_pixel(ray).unwrap();
      let back = camera.pixel_to_ray(pixel).unwrap();
      assert!((back - ray).norm() < 1e-8, "{} {}", back, ray);
    }
  }

  #[test]
  fn test_derivative() {
    let camera = model();
    let ray = Vector3d::new(0.4, -0.3, 0.8);
    let (pixel, d) = camera.ray_to_pixel_d(ray, true);
    let (pixel, d) = (pixel.unwrap(), d.unwrap());
    assert!((camera.ray_to_pixel(ray).unwrap() - pixel).norm() < 1e-12);
    let h = 1e-6;
    for i in 0..3 {
      let mut r0 = ray;
      let mut r1 = ray;
      r0[i] -= h;
      r1[i] += h;
      let numeric = (camera.ray_to_pixel(r1).unwrap() - camera.ray_to_pixel(r0).unwrap()) / (2. * h);
      assert!((numeric - d.column(i)).norm() < 1e-3);
    }
  }

  #[test]
  fn test_coefficient_count() {
    assert!(KannalaBrandtModel::new(Matrix3d::identity(), &[0.1, 0.2]).is_err());
  }
}
