use vio_frontend::all::*;

use crate::video::VideoInput;

// Reads a recording folder: `data.jsonl` lists the frame timestamps, the
// frames themselves are in `data.avi` and, for stereo, `data2.avi`.
pub struct Input {
  reader: BufReader<File>,
  line: String,
  videos: Vec<VideoInput>,
}

pub struct InputFrame {
  pub time: f64,
  // One image per camera.
  pub images: Vec<Image>,
}

const VIDEO_FILE_NAMES: [&str; 2] = ["data.avi", "data2.avi"];

impl Input {
  pub fn new(path: &Path, cameras: &[Camera]) -> Result<Input> {
    let data_path = path.join("data.jsonl");
    let file = File::open(&data_path)
      .context(format!("Failed to open {}.", data_path.display()))?;
    let mut videos = vec![];
    for (camera, file_name) in cameras.iter().zip(VIDEO_FILE_NAMES) {
      let video_path = path.join(file_name);
      if !video_path.exists() {
        if videos.is_empty() { bail!("Missing video file {}.", video_path.display()) }
        warn!("Missing video file {}, tracking with one camera.", video_path.display());
        break;
      }
      videos.push(VideoInput::new(&video_path, camera.image_size)?);
    }
    Ok(Input {
      reader: BufReader::new(file),
      line: String::new(),
      videos,
    })
  }

  // Not using `impl Iterator` to allow returning `Result`.
  // End of data is signaled by `Result::Ok(Option::None)`.
  pub fn next(&mut self) -> Result<Option<InputFrame>> {
    loop {
      self.line.clear();
      match self.reader.read_line(&mut self.line) {
        Ok(0) => return Ok(None),
        Err(err) => bail!("Failed to read line. {}", err),
        _ => {},
      }
      if self.line.trim().is_empty() { continue }
      let value: serde_json::Value = serde_json::from_str(&self.line)
        .context(format!("Input::next JSON deserialization failed for line: {}", self.line))?;
      let value = value.as_object()
        .ok_or(anyhow!("JSONL line is not a map."))?;

      if let Some(frames) = value.get("frames") {
        let frames = frames.as_array()
          .ok_or(anyhow!("Frames field is not an array."))?;
        let time = match value.get("time").and_then(|t| t.as_f64()) {
          Some(time) => time,
          None => frames.first()
            .and_then(|f| f["time"].as_f64())
            .ok_or(anyhow!("Frame time is not a number."))?,
        };
        let mut images = vec![];
        for video in &mut self.videos {
          match video.read()? {
            Some(image) => images.push(image),
            None => return Ok(None),
          }
        }
        return Ok(Some(InputFrame { time, images }));
      }
      else if value.contains_key("sensor") || value.contains_key("groundTruth") {
        // Pass.
      }
      else {
        warn!("Unrecognized data: {}", self.line.trim());
      }
    }
  }
}
