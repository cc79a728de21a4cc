use crate::all::*;

// One camera image at tracking resolution together with its pyramid.
pub struct Frame {
  pub image: Image,
  pub pyramid: Pyramid,
}

pub struct Level<'a> {
  pub data: &'a [u8],
  pub width: usize,
  pub height: usize,
}

impl Frame {
  // Builds the tracking-resolution frame, halving the input if `downsample`
  // is set. Buffers of `unused_frame` are reused to avoid allocation.
  pub fn new(
    input: &Image,
    unused_frame: Option<Frame>,
    level_count: usize,
    downsample: bool,
  ) -> Result<Frame> {
    input.check().context("Invalid input image.")?;
    let (mut image, unused_pyramid) = match unused_frame {
      Some(unused_frame) => (unused_frame.image, Some(unused_frame.pyramid)),
      None => (Image::empty(), None),
    };
    if downsample {
      if input.width < 2 || input.height < 2 {
        bail!("Image {}x{} is too small to downsample.", input.width, input.height);
      }
      input.downscale_into(&mut image);
    }
    else {
      image.data.clear();
      image.data.extend_from_slice(&input.data);
      image.width = input.width;
      image.height = input.height;
    }
    let pyramid = Pyramid::new(&image, unused_pyramid, level_count);
    Ok(Frame {
      image,
      pyramid,
    })
  }

  pub fn width(&self) -> usize {
    self.image.width
  }

  pub fn height(&self) -> usize {
    self.image.height
  }

  pub fn level_count(&self) -> usize {
    self.pyramid.levels.len() + 1
  }

  pub fn get_level(&self, level: usize) -> Level {
    let image = if level == 0 { &self.image } else { &self.pyramid.levels[level - 1] };
    Level {
      data: &image.data,
      width: image.width,
      height: image.height,
    }
  }
}
