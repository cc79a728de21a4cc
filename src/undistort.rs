use crate::all::*;

// Lifts tracking-resolution pixels to bearings through the camera model.
// `scale` converts tracking pixels to calibration pixels (2 when the images
// were downsampled). Returns `None` for pixels the model cannot lift.
pub fn lift_pixel(
  camera: &Camera,
  pixel: &Vector2d,
  scale: f64,
  mode: BearingMode,
) -> Option<Vector3d> {
  let ray = camera.model.pixel_to_ray(scale * pixel)?;
  normalize_bearing(ray, mode)
}

pub fn normalize_bearing(ray: Vector3d, mode: BearingMode) -> Option<Vector3d> {
  match mode {
    BearingMode::UnitSphere => {
      let n = ray.norm();
      if n <= 0. { return None }
      Some(ray / n)
    },
    BearingMode::UnitPlane => {
      if ray[2] <= 0. { return None }
      Some(ray / ray[2])
    },
  }
}

// Fills the bearing of every track, dropping the ones that cannot be lifted.
pub fn undistort_tracks(
  camera: &Camera,
  tracks: Vec<Track>,
  scale: f64,
  mode: BearingMode,
) -> Vec<Track> {
  let n = tracks.len();
  let tracks: Vec<Track> = tracks.into_iter()
    .filter_map(|mut track| {
      track.bearing = lift_pixel(camera, &track.pixel, scale, mode)?;
      Some(track)
    })
    .collect();
  if tracks.len() < n {
    debug!("Dropped {} features that could not be undistorted.", n - tracks.len());
  }
  tracks
}

// Projects a bearing back to tracking-resolution pixels.
pub fn project_bearing(camera: &Camera, bearing: &Vector3d, scale: f64) -> Option<Vector2d> {
  camera.model.ray_to_pixel(*bearing).map(|p| p / scale)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn camera() -> Camera {
    Camera::pinhole(Matrix3d::new(
      400., 0., 320.,
      0., 400., 240.,
      0., 0., 1.,
    ), vec![]).unwrap()
  }

  #[test]
  fn test_modes() {
    let camera = camera();
    let pixel = Vector2d::new(360., 200.);
    let plane = lift_pixel(&camera, &pixel, 1., BearingMode::UnitPlane).unwrap();
    assert!((plane - Vector3d::new(0.1, -0.1, 1.)).norm() < 1e-12);
    let sphere = lift_pixel(&camera, &pixel, 1., BearingMode::UnitSphere).unwrap();
    assert!((sphere.norm() - 1.).abs() < 1e-12);
    // Both describe the same direction.
    assert!((sphere / sphere[2] - plane).norm() < 1e-12);
  }

  #[test]
  fn test_downsampled_pixels_are_rescaled() {
    let camera = camera();
    let native = lift_pixel(&camera, &Vector2d::new(360., 200.), 1., BearingMode::UnitPlane).unwrap();
    let half = lift_pixel(&camera, &Vector2d::new(180., 100.), 2., BearingMode::UnitPlane).unwrap();
    assert!((native - half).norm() < 1e-12);
    let back = project_bearing(&camera, &half, 2.).unwrap();
    assert!((back - Vector2d::new(180., 100.)).norm() < 1e-9);
  }

  #[test]
  fn test_unit_plane_rejects_backward_rays() {
    assert!(normalize_bearing(Vector3d::new(1., 0., -0.5), BearingMode::UnitPlane).is_none());
    assert!(normalize_bearing(Vector3d::new(1., 0., -0.5), BearingMode::UnitSphere).is_some());
  }
}
