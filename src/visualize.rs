use vio_frontend::all::*;

pub struct VisualizeArgs<'a> {
  pub buffer: &'a mut Vec<u32>,
  pub tracker: &'a Tracker,
  pub buffer_w: usize,
  pub buffer_h: usize,
}

const YELLOW: u32 = (255 << 16) | (255 << 8);
const CYAN: u32 = (255 << 8) | 255;
const RED: u32 = 255 << 16;

#[inline(always)]
fn draw_pixel(args: &mut VisualizeArgs, p: &Vector2i, v: u32) {
  if p[0] < 0 || p[0] >= args.buffer_w as i32 { return }
  if p[1] < 0 || p[1] >= args.buffer_h as i32 { return }
  args.buffer[p[1] as usize * args.buffer_w + p[0] as usize] = v;
}

fn draw_square(args: &mut VisualizeArgs, p: &Vector2i, v: u32, r: i32) {
  for z in (-r)..(r+1) {
    draw_pixel(args, &(p + Vector2i::new(z, -r)), v);
    draw_pixel(args, &(p + Vector2i::new(z, r)), v);
    draw_pixel(args, &(p + Vector2i::new(-r, z)), v);
    draw_pixel(args, &(p + Vector2i::new(r, z)), v);
  }
}

fn draw_line(args: &mut VisualizeArgs, mut p0: Vector2i, mut p1: Vector2i, v: u32) {
  let dx = p1[0] - p0[0];
  let dy = p1[1] - p0[1];
  if dx == 0 && dy == 0 {
    draw_pixel(args, &p0, v);
    return;
  }
  if dx.abs() < dy.abs() {
    if p0[1] > p1[1] { (p0, p1) = (p1, p0); }
    let k = dx as f32 / dy as f32;
    for y in p0[1] ..= p1[1] {
      let x = p0[0] + (k * (y - p0[1]) as f32).round() as i32;
      draw_pixel(args, &Vector2i::new(x, y), v);
    }
  }
  else {
    if p0[0] > p1[0] { (p0, p1) = (p1, p0); }
    let k = dy as f32 / dx as f32;
    for x in p0[0] ..= p1[0] {
      let y = p0[1] + (k * (x - p0[0]) as f32).round() as i32;
      draw_pixel(args, &Vector2i::new(x, y), v);
    }
  }
}

fn draw_buffer(
  args: &mut VisualizeArgs,
  image: &Image,
  // Top-left coordinates of drawing target.
  ax: usize,
  ay: usize,
) {
  let w = image.width;
  let h = image.height;
  for y in 0..h {
    if y + ay >= args.buffer_h { continue }
    for x in 0..w {
      if x + ax >= args.buffer_w { continue }
      let gray = image.data[y * w + x] as u32;
      args.buffer[(y + ay) * args.buffer_w + x + ax] = gray | (gray << 8) | (gray << 16);
    }
  }
}

// Older tracks are drawn greener.
fn age_color(age: usize) -> u32 {
  let length = 10;
  let i = age.min(length);
  let red = 255 * (length - i) / length;
  let green = 255 * i / length;
  ((green as u32) << 8) | ((red as u32) << 16)
}

pub fn visualize(args: &mut VisualizeArgs) -> Result<()> {
  // Clear buffer.
  for v in args.buffer.iter_mut() {
    *v = 0;
  }

  let frame = args.tracker.frame().ok_or(anyhow!("Cannot visualize before processing the first frame."))?;
  let width = frame.width();
  draw_buffer(args, &frame.image, 0, 0);
  if let Some(right_frame) = args.tracker.right_frame() {
    draw_buffer(args, &right_frame.image, width, 0);
  }

  let d = DEBUG_DATA.lock().unwrap();
  // Darken the closed part of the detection mask.
  if d.mask_width == width {
    for (i, open) in d.detection_mask.iter().enumerate() {
      if *open { continue }
      let (x, y) = (i % width, i / width);
      if y >= args.buffer_h || x >= args.buffer_w { continue }
      let v = &mut args.buffer[y * args.buffer_w + x];
      *v = (*v >> 1) & 0x7f7f7f;
    }
  }

  for (p0, p1) in &d.flow {
    draw_line(args, from_f64(p0), from_f64(p1), YELLOW);
  }
  for track in &d.tracks {
    draw_square(args, &from_f64(&track.pixel), age_color(track.age), 3);
  }
  for p in &d.detections {
    draw_square(args, &from_f64(p), CYAN, 2);
  }
  for p in &d.epipolar_outliers {
    draw_square(args, &from_f64(p), RED, 4);
  }
  let ax = Vector2d::new(width as f64, 0.);
  for track in &d.stereo_tracks {
    draw_square(args, &from_f64(&(track.pixel + ax)), age_color(track.age), 3);
  }
  Ok(())
}
