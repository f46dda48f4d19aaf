#[cfg(feature = "metal")]
use gfx_backend_metal as back;

#[cfg(feature = "vulkan")]
use gfx_backend_vulkan as back;

mod app;
mod config;
mod error;
mod gl;
mod renderer;
mod run_loop;
mod scene;
mod shader;

use config::Config;
use error::{ContextError, InitError};
use renderer::Renderer;
use run_loop::RunLoop;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use gfx_hal::{prelude::*, Features};
use winit::event::{Event, KeyboardInput, VirtualKeyCode, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};

fn main() {
    env_logger::init();
    let config = Config::default();

    let event_loop = EventLoop::<()>::with_user_event();
    let proxy = event_loop.create_proxy();
    let wb = winit::window::WindowBuilder::new()
        .with_title(config.title)
        .with_inner_size(winit::dpi::Size::Physical(winit::dpi::PhysicalSize::new(
            config.width,
            config.height,
        )))
        .with_min_inner_size(winit::dpi::Size::Logical(winit::dpi::LogicalSize::new(
            config.min_size,
            config.min_size,
        )));
    let window = match wb.build(&event_loop) {
        Ok(window) => window,
        Err(err) => {
            log::error!("{}", InitError::from(ContextError::resource("window", err)));
            return;
        }
    };

    let run_loop = match config.frame_limit {
        Some(frames) => RunLoop::with_frame_limit(frames),
        None => RunLoop::new(),
    };
    let stop = run_loop.stop_handle();
    let resized = Arc::new(AtomicBool::new(false));

    let resized_cloned = Arc::clone(&resized);
    let handler = thread::spawn(move || {
        match render(&window, &config, &run_loop, resized_cloned) {
            Ok(frames) => log::info!("rendered {} frames", frames),
            Err(err) => log::error!("{}", err),
        }
        // wake the event loop so the window closes with the render thread
        let _ = proxy.send_event(());
    });

    let mut handler = Some(handler);

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Wait;
        match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested
                | WindowEvent::KeyboardInput {
                    input:
                        KeyboardInput {
                            virtual_keycode: Some(VirtualKeyCode::Escape),
                            ..
                        },
                    ..
                } => {
                    log::info!("close requested");
                    stop.stop();
                }
                WindowEvent::Resized(_) => {
                    resized.store(true, Ordering::Relaxed);
                }
                _ => {}
            },
            Event::UserEvent(()) => {
                if let Some(handler) = handler.take() {
                    if handler.join().is_err() {
                        log::error!("render thread panicked");
                    }
                }
                *control_flow = ControlFlow::Exit;
            }
            _ => {}
        }
    });
}

/// Opens the device on the window's surface and runs the scene until the
/// stop handle fires.
fn render(
    window: &winit::window::Window,
    config: &Config,
    run_loop: &RunLoop,
    resized: Arc<AtomicBool>,
) -> Result<u64, InitError> {
    let instance = back::Instance::create(config.title, 1)
        .map_err(|err| ContextError::Unsupported(format!("{:?}", err)))?;
    let mut surface = unsafe { instance.create_surface(window) }
        .map_err(|err| ContextError::resource("surface", err))?;

    let result = render_on_surface(&instance, &mut surface, config, run_loop, resized);

    unsafe {
        instance.destroy_surface(surface);
    }
    result
}

fn render_on_surface(
    instance: &back::Instance,
    surface: &mut <back::Backend as gfx_hal::Backend>::Surface,
    config: &Config,
    run_loop: &RunLoop,
    resized: Arc<AtomicBool>,
) -> Result<u64, InitError> {
    let mut adapters = instance.enumerate_adapters();
    let (adapter_idx, family_idx) = adapters
        .iter()
        .enumerate()
        .find_map(|(idx, adapter)| {
            adapter
                .queue_families
                .iter()
                .position(|family| {
                    surface.supports_queue_family(family) && family.queue_type().supports_graphics()
                })
                .map(|family_idx| (idx, family_idx))
        })
        .ok_or(ContextError::NoAdapter)?;
    let adapter = adapters.remove(adapter_idx);
    log::info!("using adapter: {}", adapter.info.name);

    let family = &adapter.queue_families[family_idx];
    let mut gpu = unsafe {
        adapter
            .physical_device
            .open(&[(family, &[1.0])], Features::empty())
    }
    .map_err(|err| ContextError::Device(format!("{:?}", err)))?;

    let mut queue_group = gpu
        .queue_groups
        .pop()
        .ok_or_else(|| ContextError::Device("no queue group was opened".into()))?;
    let family_id = queue_group.family;
    let queue = queue_group
        .queues
        .first_mut()
        .ok_or_else(|| ContextError::Device("queue group has no queues".into()))?;
    let device = gpu.device;

    let mut renderer = Renderer::new(
        surface, &adapter, &device, queue, family_id, config, resized,
    )?;
    app::run(&mut renderer, config, run_loop)
}
