use crate::all::*;

// Row-major grayscale image storage.
// Could also have used nalebgra::DMatrix, but the added complexity
// only seems to help with algorithms like the optical flow.
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
  pub data: Vec<u8>,
  pub width: usize,
  pub height: usize,
}

impl Image {
  pub fn empty() -> Image {
    Image {
      data: vec![],
      width: 0,
      height: 0,
    }
  }

  pub fn new(data: Vec<u8>, width: usize, height: usize) -> Result<Image> {
    let image = Image { data, width, height };
    image.check()?;
    Ok(image)
  }

  pub fn from_fn<F: Fn(usize, usize) -> u8>(width: usize, height: usize, f: F) -> Image {
    let mut data = Vec::with_capacity(width * height);
    for y in 0..height {
      for x in 0..width {
        data.push(f(x, y));
      }
    }
    Image { data, width, height }
  }

  pub fn is_empty(&self) -> bool {
    self.width == 0 || self.height == 0
  }

  // A single channel buffer matching the stated dimensions.
  pub fn check(&self) -> Result<()> {
    if self.is_empty() {
      bail!("Image is empty.");
    }
    if self.data.len() != self.width * self.height {
      bail!(
        "Image buffer has {} bytes, expected {} for a {}x{} single channel image.",
        self.data.len(), self.width * self.height, self.width, self.height,
      );
    }
    Ok(())
  }

  #[inline(always)]
  pub fn value(&self, x: usize, y: usize) -> u8 {
    self.data[y * self.width + x]
  }

  #[inline(always)]
  pub fn set_value(&mut self, x: usize, y: usize, value: u8) {
    self.data[y * self.width + x] = value;
  }

  // Halves both dimensions by averaging 2x2 blocks. An odd last row or
  // column is dropped. The output buffer is reused.
  pub fn downscale_into(&self, out: &mut Image) {
    out.width = self.width / 2;
    out.height = self.height / 2;
    out.data.clear();
    out.data.reserve(out.width * out.height);
    for y in 0..out.height {
      let row0 = &self[2 * y];
      let row1 = &self[2 * y + 1];
      for x in 0..out.width {
        let sum = row0[2 * x] as u16 + row0[2 * x + 1] as u16
          + row1[2 * x] as u16 + row1[2 * x + 1] as u16;
        out.data.push(((sum + 2) / 4) as u8);
      }
    }
  }
}

// Element access in the manner of `image[y][x]`.
impl Index<usize> for Image {
  type Output = [u8];
  fn index(&self, y: usize) -> &Self::Output {
    &self.data[y * self.width .. (y + 1) * self.width]
  }
}

impl fmt::Display for Image {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut s = String::new();
    for y in 0..self.height {
      for x in 0..self.width {
        s += &format!("{:>3},", self.value(x, y));
      }
      s += "\n";
    }
    write!(f, "{}", s)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_check() {
    assert!(Image::empty().check().is_err());
    assert!(Image::new(vec![0; 5], 2, 3).is_err());
    assert!(Image::new(vec![0; 6], 2, 3).is_ok());
  }

  #[test]
  fn test_downscale() {
    let image = Image::new(vec![
      0, 4, 8, 8, 1,
      4, 0, 8, 8, 1,
      10, 10, 0, 0, 1,
      10, 10, 0, 1, 1,
      7, 7, 7, 7, 7,
    ], 5, 5).unwrap();
    let mut small = Image::new(vec![255; 9], 3, 3).unwrap();
    image.downscale_into(&mut small);
    assert_eq!(small.width, 2);
    assert_eq!(small.height, 2);
    assert_eq!(small.data, vec![2, 8, 10, 0]);
    assert_eq!(small[1], [10, 0]);
  }
}
