//! Morphlight: interactive shell around the multi-pass renderer.
//!
//! `morphlight` opens a window; `morphlight --headless <frames>` renders into
//! the command-log device and prints a summary.

mod assets;
mod config;
mod controls;
mod logging;

use anyhow::{bail, Context, Result};
use config::DemoConfig;
use controls::{Controls, InputState};
use engine_core::FrameClock;
use glam::Vec3;
use renderer::{Camera, FrameRenderer, GpuDevice, GraphicsDevice, RecordingDevice, RenderError, SceneConfig};
use std::sync::Arc;
use std::time::Duration;
use winit::{
    application::ApplicationHandler,
    event::{DeviceEvent, DeviceId, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

const CAMERA_START: Vec3 = Vec3::new(0.0, 10.0, -60.0);
const HEADLESS_STEP: Duration = Duration::from_micros(16_667);

/// Everything that lives while the window is open.
struct DemoState {
    window: Arc<Window>,
    device: GpuDevice,
    renderer: FrameRenderer,
    scene: SceneConfig,
    camera: Camera,
    input: InputState,
    controls: Controls,
    clock: FrameClock,
    camera_speed: f32,
}

impl DemoState {
    async fn new(window: Arc<Window>, config: &DemoConfig) -> Result<Self> {
        let mut device = GpuDevice::new(window.clone(), config.vsync)
            .await
            .context("opening the GPU device")?;
        for texture in assets::load_textures(config)? {
            device.upload_texture(&texture.name, &texture.image, texture.srgb);
        }
        let library = device.texture_library();
        let size = device.back_buffer_size();
        let renderer = FrameRenderer::with_shadow_map_size(&mut device, &library, size, config.shadow_map_size)
            .context("creating frame resources")?;

        let mut camera = Camera::new(CAMERA_START);
        camera.set_aspect(size.0, size.1);

        Ok(Self {
            window,
            device,
            renderer,
            scene: config.scene.clone(),
            camera,
            input: InputState::default(),
            controls: Controls::default(),
            clock: FrameClock::new(),
            camera_speed: config.camera_speed,
        })
    }

    /// Handle a window event. Returns true if the app should exit.
    fn handle_window_event(&mut self, event: WindowEvent) -> bool {
        match event {
            WindowEvent::CloseRequested => true,
            WindowEvent::Resized(size) => {
                self.resize(size.width, size.height);
                false
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    if key == KeyCode::Escape && event.state.is_pressed() {
                        return true;
                    }
                    self.input.process_keyboard(key, event.state);
                }
                false
            }
            WindowEvent::MouseInput { state, button, .. } => {
                self.input.process_mouse_button(button, state);
                false
            }
            WindowEvent::RedrawRequested => {
                let exit = self.redraw();
                self.window.request_redraw();
                exit
            }
            _ => false,
        }
    }

    fn handle_device_event(&mut self, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta } = event {
            self.input.process_mouse_motion(delta);
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.device.resize(width, height);
        self.camera.set_aspect(width, height);
        if let Err(e) = self.renderer.resize(&mut self.device, width, height) {
            log::error!("Failed to resize render targets: {}", e);
        }
    }

    /// Renders one frame. Returns true if rendering cannot continue.
    fn redraw(&mut self) -> bool {
        let dt = self.clock.tick();
        self.controls
            .apply(&self.input, &mut self.scene, &mut self.camera, self.camera_speed, dt);
        self.input.end_frame();

        match self.renderer.frame(&mut self.device, &mut self.scene, &self.camera, dt) {
            Ok(report) => {
                if self.clock.frame_count() % 300 == 0 {
                    log::debug!(
                        "{:.0} fps, {} shadow passes, {} scene draws",
                        self.clock.fps(),
                        report.shadow.passes,
                        report.scene.draws
                    );
                }
                false
            }
            Err(RenderError::Surface(e)) => {
                log::warn!("Surface error, skipping frame: {}", e);
                let size = self.window.inner_size();
                self.resize(size.width, size.height);
                false
            }
            Err(e @ RenderError::DeviceLost(_)) => {
                log::error!("{}", e);
                true
            }
            Err(e) => {
                log::error!("Frame failed: {}", e);
                false
            }
        }
    }
}

/// Application handler for winit.
struct App {
    config: DemoConfig,
    state: Option<DemoState>,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        let window_attrs = Window::default_attributes()
            .with_title("Morphlight")
            .with_inner_size(winit::dpi::LogicalSize::new(
                self.config.window_width,
                self.config.window_height,
            ));

        let window = match event_loop.create_window(window_attrs) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        match pollster::block_on(DemoState::new(window.clone(), &self.config)) {
            Ok(state) => {
                self.state = Some(state);
                window.request_redraw();
            }
            Err(e) => {
                log::error!("Failed to initialize renderer: {:#}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Some(state) = &mut self.state {
            if state.handle_window_event(event) {
                event_loop.exit();
            }
        }
    }

    fn device_event(&mut self, _: &ActiveEventLoop, _: DeviceId, event: DeviceEvent) {
        if let Some(state) = &mut self.state {
            state.handle_device_event(event);
        }
    }
}

/// Renders `frames` frames into the command-log device.
fn run_headless(config: &DemoConfig, frames: u32) -> Result<()> {
    let names: Vec<String> = assets::load_textures(config)?
        .into_iter()
        .map(|texture| texture.name)
        .collect();
    let mut device =
        RecordingDevice::with_textures(config.window_width, config.window_height, names.iter().map(String::as_str));
    let library = device.texture_library();
    let mut renderer = FrameRenderer::with_shadow_map_size(
        &mut device,
        &library,
        (config.window_width, config.window_height),
        config.shadow_map_size,
    )
    .context("creating frame resources")?;

    let mut scene = config.scene.clone();
    let mut camera = Camera::new(CAMERA_START);
    camera.set_aspect(config.window_width, config.window_height);
    let mut clock = FrameClock::new();

    let mut draws = 0;
    for frame in 0..frames {
        let dt = clock.advance(HEADLESS_STEP);
        device.clear_log();
        let report = renderer
            .frame(&mut device, &mut scene, &camera, dt)
            .with_context(|| format!("rendering frame {frame}"))?;
        draws = device.draws().count();
        log::trace!("Frame {}: {:?}", frame, report);
    }

    log::info!(
        "Rendered {} frames headless; last frame issued {} draws, animation time {:.2}s",
        frames,
        draws,
        scene.deformation.time
    );
    Ok(())
}

fn parse_headless(args: &[String]) -> Result<Option<u32>> {
    match args.iter().position(|a| a == "--headless") {
        None => Ok(None),
        Some(i) => {
            let Some(count) = args.get(i + 1) else {
                bail!("--headless needs a frame count");
            };
            let frames = count
                .parse()
                .with_context(|| format!("invalid frame count '{count}'"))?;
            Ok(Some(frames))
        }
    }
}

fn main() -> Result<()> {
    let config = DemoConfig::load();
    logging::init_logging(&config.logging);

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Some(frames) = parse_headless(&args)? {
        return run_headless(&config, frames);
    }

    println!("Morphlight controls:");
    println!("  WASD/QE  fly            right mouse  look");
    println!("  F1 post  F2 blur/bloom  F3 HDR  F4 gamma  F5 wireframe");
    println!("  F6 grass  F7 dynamic tessellation  F8 normals  F9 shadow preview");
    println!("  1-9 blur passes  [ ] blend  - = exposure  Tab lights  Esc quit");

    log::info!("Starting Morphlight");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App { config, state: None };
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn headless_flag() {
        assert_eq!(parse_headless(&args(&[])).expect("no flag"), None);
        assert_eq!(parse_headless(&args(&["--headless", "12"])).expect("flag"), Some(12));
        assert!(parse_headless(&args(&["--headless"])).is_err());
        assert!(parse_headless(&args(&["--headless", "many"])).is_err());
    }

    /// A few frames of the default scene run end to end without a GPU.
    #[test]
    fn headless_run() {
        let mut config = DemoConfig::default();
        config.texture_size = 4;
        config.scene.post.enabled = true;
        run_headless(&config, 3).expect("headless run");
    }
}
