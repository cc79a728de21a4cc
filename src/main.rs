mod event_loop;
mod input;
mod video;
mod visualize;

use vio_frontend::all::*;

use event_loop::{handle_event, EventLoopArgs};
use input::Input;

use std::io::{BufWriter, Write};

use clap::Parser;
use softbuffer::GraphicsContext;
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::WindowBuilder;
use winit::platform::run_return::EventLoopExtRunReturn;

#[derive(Parser)]
struct Args {
  // Folder with `calibration.json`, `data.jsonl` and the videos.
  #[clap(short)]
  input_folder: String,
  // Write every feature frame as a line of JSON to this file.
  #[clap(long)]
  output: Option<String>,
  // Process all frames without opening a window.
  #[clap(long)]
  headless: bool,
  #[clap(flatten)]
  parameters: ParameterSet,
}

// Feeds recorded frames to the tracker.
pub struct Session {
  input: Input,
  pub tracker: Tracker,
  output: Option<BufWriter<File>>,
  frame_count: usize,
}

impl Session {
  // Returns false once the input is exhausted.
  pub fn step(&mut self) -> Result<bool> {
    let frame = match self.input.next()? {
      Some(frame) => frame,
      None => {
        info!("Processed {} frames.", self.frame_count);
        if let Some(output) = &mut self.output { output.flush()? }
        return Ok(false);
      },
    };
    let feature_frame = self.tracker.process(frame.time, &frame.images[0], frame.images.get(1))
      .context(format!("Failed to process frame at time {}.", frame.time))?;
    if let Some(output) = &mut self.output {
      writeln!(output, "{}", feature_frame.to_json()?)?;
    }
    self.frame_count += 1;
    Ok(true)
  }
}

fn handle_error(err: &anyhow::Error) {
  for (i, e) in err.chain().enumerate() {
    println!("  {}: {}", i + 1, e);
  }
}

fn main() {
  if let Err(err) = run() {
    handle_error(&err);
  }
}

fn init_logging() {
  env_logger::Builder::new()
    .filter_level(LevelFilter::Info)
    .format(format_log)
    .init();
}

fn run() -> Result<()> {
  let mut args = Args::parse();
  args.parameters.validate()?;
  let input_folder_path = Path::new(&args.input_folder);
  let cameras = Camera::load(input_folder_path)?;
  let input = Input::new(input_folder_path, &cameras)?;
  let output = match &args.output {
    Some(path) => Some(BufWriter::new(File::create(path).context(format!("Failed to create {}.", path))?)),
    None => None,
  };
  args.parameters.show_track |= !args.headless;
  let mut session = Session {
    input,
    tracker: Tracker::new(args.parameters.clone(), cameras)?,
    output,
    frame_count: 0,
  };

  if args.headless {
    init_logging();
    while session.step()? {}
    return Ok(());
  }

  let width = 1920;
  let height = 1080;
  let size = winit::dpi::PhysicalSize::new(width, height);
  let mut event_loop = EventLoop::new();
  let window = WindowBuilder::new()
    .with_resizable(false)
    .with_decorations(false)
    .with_min_inner_size(size)
    .with_max_inner_size(size)
    .build(&event_loop)
    .context("Failed to create window.")?;
  let mut graphics_context = unsafe { GraphicsContext::new(window) }
    .map_err(|err| anyhow!("Failed to create graphics context. {:?}", err))?;

  // Start logging after winit setup to skip a debug print.
  init_logging();

  let mut buffer = vec![];
  let mut args = EventLoopArgs {
    session: &mut session,
    buffer: &mut buffer,
    graphics_context: &mut graphics_context,
    step_mode: false,
    advance: false,
  };

  event_loop.run_return(move |event, _, control_flow| {
    if let Err(err) = handle_event(event, control_flow, &mut args) {
      handle_error(&err);
      *control_flow = ControlFlow::Exit;
    }
  });
  Ok(())
}
