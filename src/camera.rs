use crate::all::*;

// Intrinsic camera parameters for a single camera.
pub struct Camera {
  pub kind: CameraKind,
  pub model: Box<dyn CameraModel>,
  // Native image size the calibration was made for, if known.
  pub image_size: Option<[usize; 2]>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraKind {
  Pinhole,
  KannalaBrandt4,
}

pub trait CameraModel {
  // Lifts a pixel to a viewing ray of unit length.
  fn pixel_to_ray(&self, pixel: Vector2d) -> Option<Vector3d>;

  fn ray_to_pixel_d(&self, ray: Vector3d, compute_derivative: bool)
    -> (Option<Vector2d>, Option<Matrix23d>);

  fn ray_to_pixel(&self, ray: Vector3d) -> Option<Vector2d> {
    self.ray_to_pixel_d(ray, false).0
  }
}

impl Camera {
  pub fn new(kind: CameraKind, model: Box<dyn CameraModel>) -> Camera {
    Camera {
      kind,
      model,
      image_size: None,
    }
  }

  pub fn pinhole(camera_matrix: Matrix3d, distortion_coefficients: Vec<f64>) -> Result<Camera> {
    Ok(Camera::new(
      CameraKind::Pinhole,
      Box::new(PinholeModel::new(camera_matrix, distortion_coefficients)?),
    ))
  }
}

impl fmt::Debug for Camera {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Camera")
      .field("kind", &self.kind)
      .field("image_size", &self.image_size)
      .finish()
  }
}
