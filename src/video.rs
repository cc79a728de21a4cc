use vio_frontend::all::*;

use std::process::{ChildStdout, Command, Stdio};

// Grayscale frames decoded by an `ffmpeg` child process.
pub struct VideoInput {
  child_stdout: ChildStdout,
  width: usize,
  height: usize,
}

impl VideoInput {
  // Frame dimensions come from the calibration when available, otherwise
  // they are probed from the file.
  pub fn new(path: &Path, image_size: Option<[usize; 2]>) -> Result<VideoInput> {
    let path = path.to_str().ok_or(anyhow!("Failed to parse video path."))?;
    let [width, height] = match image_size {
      Some(size) => size,
      None => probe_size(path)?,
    };
    let cmd_str = format!("ffmpeg -i {} -f rawvideo -vcodec rawvideo -vsync vfr -pix_fmt gray - 2>/dev/null", path);
    // `bash -c` splits the command into tokens.
    let child = Command::new("bash").args(["-c", &cmd_str])
      .stdout(Stdio::piped())
      .spawn()
      .context("Failed to start ffmpeg.")?;
    let child_stdout = child.stdout.ok_or(anyhow!("Failed to capture ffmpeg output."))?;
    info!("Reading {}x{} video from {}.", width, height, path);
    Ok(VideoInput {
      child_stdout,
      width,
      height,
    })
  }

  // Returns `None` at the end of the video.
  pub fn read(&mut self) -> Result<Option<Image>> {
    let mut data = vec![0; self.width * self.height];
    match self.child_stdout.read_exact(&mut data) {
      Ok(()) => Ok(Some(Image::new(data, self.width, self.height)?)),
      Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
      Err(err) => Err(err).context("Reading bytes from video input failed."),
    }
  }
}

fn probe_size(path: &str) -> Result<[usize; 2]> {
  let output = Command::new("ffprobe")
    .args(["-v", "error", "-select_streams", "v:0", "-show_entries", "stream=width,height", "-of", "csv=p=0:s=x", path])
    .output()
    .context("Failed to run ffprobe.")?;
  let s = String::from_utf8_lossy(&output.stdout);
  let parts: Vec<&str> = s.trim().split('x').collect();
  if parts.len() != 2 {
    bail!("Could not probe the size of video {}.", path);
  }
  Ok([parts[0].parse()?, parts[1].parse()?])
}
