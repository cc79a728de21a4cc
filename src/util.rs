#[cfg(test)]
use crate::all::*;

pub fn format_log(
  buf: &mut env_logger::fmt::Formatter,
  record: &log::Record,
) -> std::io::Result<()> {
  use std::io::Write;
  let mut style = buf.style();
  use env_logger::fmt::Color::*;
  use log::Level::*;
  style.set_color(match record.level() {
    Error => Red,
    Warn => Rgb(200, 200, 200),
    Info => Green,
    Debug => Magenta,
    Trace => Blue,
  });

  let s = format!("{:30}{}",
    format!("{}:{}",
      record.file().unwrap_or("?"),
      record.line().unwrap_or(0),
    ),
    record.args()
  );
  writeln!(buf, "{}", style.value(s))
}

// Smooth two-dimensional texture sampled at `(x, y) - shift`. Integer shifts
// give exactly translated images.
#[cfg(test)]
pub fn textured_image(width: usize, height: usize, shift: Vector2d) -> Image {
  Image::from_fn(width, height, |x, y| {
    let x = x as f64 - shift[0];
    let y = y as f64 - shift[1];
    let v = 128.
      + 50. * (x / 4.5).sin() * (y / 5.5).cos()
      + 40. * ((x + 2. * y) / 9.).sin();
    v.round() as u8
  })
}
