use crate::all::*;

#[derive(Deserialize)]
#[allow(non_snake_case)]
pub struct CameraSetup {
  pub focalLengthX: f64,
  pub focalLengthY: f64,
  pub principalPointX: f64,
  pub principalPointY: f64,
  #[serde(default)]
  pub distortionCoefficients: Vec<f64>,
  pub model: String,
  // Needed to size the video input and to scale pixels of a downsampled image.
  pub imageWidth: Option<usize>,
  pub imageHeight: Option<usize>,
}

#[derive(Deserialize)]
pub struct CameraSetupRoot {
  pub cameras: Vec<CameraSetup>,
}

const MAX_PARENT_DIRECTORY_HEIGHT: usize = 1;
const SETUP_FILE_NAME: &str = "calibration.json";

impl Camera {
  // One camera for mono, two for stereo, from the first `calibration.json`
  // found in `path` or its parent.
  pub fn load(path: &Path) -> Result<Vec<Camera>> {
    for dir in path.ancestors().take(MAX_PARENT_DIRECTORY_HEIGHT + 1) {
      let setup_path = dir.join(SETUP_FILE_NAME);
      if setup_path.exists() {
        info!("Reading camera parameters from {}.", setup_path.display());
        return parse_setup(&setup_path);
      }
    }
    bail!("Failed to find a {}.", SETUP_FILE_NAME);
  }
}

fn parse_setup(path: &Path) -> Result<Vec<Camera>> {
  let s = std::fs::read_to_string(path)
    .context(format!("Failed to read file {}.", path.display()))?;
  parse_setup_str(&s)
    .context(format!("Failed to parse {}.", path.display()))
}

pub fn parse_setup_str(s: &str) -> Result<Vec<Camera>> {
  let root: CameraSetupRoot = serde_json::from_str(s)?;
  if root.cameras.is_empty() || root.cameras.len() > 2 {
    bail!("Expected one or two cameras, got {}.", root.cameras.len());
  }
  root.cameras.into_iter()
    .map(convert_setup)
    .collect::<Result<Vec<_>>>()
}

fn convert_setup(d: CameraSetup) -> Result<Camera> {
  let camera_matrix = Matrix3d::new(
    d.focalLengthX, 0., d.principalPointX,
    0., d.focalLengthY, d.principalPointY,
    0., 0., 1.
  );
  let kind = convert_model(&d.model)?;
  let model: Box<dyn CameraModel> = match kind {
    CameraKind::Pinhole => Box::new(PinholeModel::new(camera_matrix, d.distortionCoefficients)?),
    CameraKind::KannalaBrandt4 => Box::new(KannalaBrandtModel::new(camera_matrix, &d.distortionCoefficients)?),
  };
  let image_size = match (d.imageWidth, d.imageHeight) {
    (Some(w), Some(h)) => Some([w, h]),
    _ => None,
  };
  Ok(Camera {
    kind,
    model,
    image_size,
  })
}

fn convert_model(model: &str) -> Result<CameraKind> {
  match model {
    "pinhole" => Ok(CameraKind::Pinhole),
    "kannala-brandt4" => Ok(CameraKind::KannalaBrandt4),
    _ => bail!("Unknown camera model {}.", &model),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_stereo_setup() {
    let s = r#"{
      "cameras": [
        {
          "focalLengthX": 458.0, "focalLengthY": 457.0,
          "principalPointX": 367.0, "principalPointY": 248.0,
          "distortionCoefficients": [-0.28, 0.07, 0.0002],
          "model": "pinhole",
          "imageWidth": 752, "imageHeight": 480
        },
        {
          "focalLengthX": 380.0, "focalLengthY": 380.0,
          "principalPointX": 320.0, "principalPointY": 240.0,
          "distortionCoefficients": [0.01, 0.0, 0.0, 0.0],
          "model": "kannala-brandt4"
        }
      ]
    }"#;
    let cameras = parse_setup_str(s).unwrap();
    assert_eq!(cameras.len(), 2);
    assert_eq!(cameras[0].kind, CameraKind::Pinhole);
    assert_eq!(cameras[0].image_size, Some([752, 480]));
    assert_eq!(cameras[1].kind, CameraKind::KannalaBrandt4);
    assert_eq!(cameras[1].image_size, None);
    let ray = cameras[1].model.pixel_to_ray(Vector2d::new(320., 240.)).unwrap();
    assert!((ray - Vector3d::new(0., 0., 1.)).norm() < 1e-12);
  }

  #[test]
  fn test_parse_errors() {
    assert!(parse_setup_str(r#"{ "cameras": [] }"#).is_err());
    let unknown = r#"{ "cameras": [{
      "focalLengthX": 1.0, "focalLengthY": 1.0,
      "principalPointX": 0.0, "principalPointY": 0.0,
      "model": "equirectangular"
    }] }"#;
    let err = parse_setup_str(unknown).unwrap_err();
    assert!(format!("{}", err).contains("Unknown camera model"));
  }
}
