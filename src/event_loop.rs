use vio_frontend::all::*;

use crate::Session;
use crate::visualize::{visualize, VisualizeArgs};

use softbuffer::GraphicsContext;
use winit::event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent};
use winit::event_loop::ControlFlow;
use winit::window::Window;

pub struct EventLoopArgs<'a> {
  pub session: &'a mut Session,
  pub buffer: &'a mut Vec<u32>,
  pub graphics_context: &'a mut GraphicsContext<Window>,
  // Process one frame per press of Enter.
  pub step_mode: bool,
  pub advance: bool,
}

pub fn handle_event(
  event: Event<()>,
  control_flow: &mut ControlFlow,
  args: &mut EventLoopArgs,
) -> Result<()> {
  let (window_width, window_height) = {
    let size = args.graphics_context.window().inner_size();
    (size.width as usize, size.height as usize)
  };
  if args.buffer.len() != window_width * window_height {
    *args.buffer = vec![0; window_width * window_height];
  }

  match event {
    Event::RedrawRequested(window_id) if window_id == args.graphics_context.window().id() => {
      args.graphics_context.set_buffer(&args.buffer, window_width as u16, window_height as u16);
    },
    Event::WindowEvent {
      event,
      window_id,
    } => {
      if event == WindowEvent::CloseRequested && window_id == args.graphics_context.window().id() {
        *control_flow = ControlFlow::Exit;
      }
      match event {
        WindowEvent::KeyboardInput {
          input: KeyboardInput {
            state: ElementState::Pressed,
            virtual_keycode: Some(keycode),
            scancode: _,
            ..
          },
          is_synthetic: _,
          device_id: _,
        } => {
          match keycode {
            VirtualKeyCode::Escape | VirtualKeyCode::Q => {
              *control_flow = ControlFlow::Exit;
            },
            VirtualKeyCode::Space => {
              args.step_mode = !args.step_mode;
            },
            VirtualKeyCode::Return => {
              args.advance = true;
            },
            _ => {}, // Other keys.
          }
        },
        _ => {}, // Other window events.
      }
    },
    Event::MainEventsCleared => {
      if args.step_mode && !args.advance { return Ok(()) }
      args.advance = false;
      if !args.session.step()? {
        *control_flow = ControlFlow::Exit;
        return Ok(());
      }
      visualize(&mut VisualizeArgs {
        buffer: args.buffer,
        tracker: &args.session.tracker,
        buffer_w: window_width,
        buffer_h: window_height,
      })?;
      args.graphics_context.window().request_redraw();
    },
    _ => {}, // Other events.
  }
  Ok(())
}
