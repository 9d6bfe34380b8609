//! Application event loop.
//!
//! [`App`] owns the window, the GPU [`Context`] and the [`FrameOrchestrator`].
//! Everything is created when winit first resumes the application; a frame is
//! rendered on every `RedrawRequested` until the window is closed, after which
//! the orchestrator releases its resources.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use instant::Instant;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{DeviceEvent, DeviceId, ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{CursorGrabMode, Window, WindowId},
};

use crate::{
    camera::{Camera, CameraController, FreeCameraController},
    config::Config,
    context::Context,
    frame::FrameOrchestrator,
    resources,
};

/// Everything that exists once the window is up.
#[derive(Debug)]
struct AppState {
    ctx: Context,
    orchestrator: FrameOrchestrator,
    camera: Camera,
    controller: FreeCameraController,
}

impl AppState {
    async fn new(window: Arc<Window>, config: &Config) -> Result<Self> {
        let mut ctx = Context::new(window, config).await?;
        let model = resources::load_model_gltf(
            &config.model_path,
            &ctx.device,
            &ctx.queue,
            &ctx.pipelines.layouts.texture,
        )
        .await
        .with_context(|| format!("failed to load model {}", config.model_path.display()))?;
        let panorama = resources::load_panorama(&config.panorama_path, &ctx.device, &ctx.queue)
            .await
            .with_context(|| {
                format!("failed to load panorama {}", config.panorama_path.display())
            })?;
        let orchestrator = FrameOrchestrator::new(&mut ctx, config, panorama, model)?;
        Ok(Self {
            ctx,
            orchestrator,
            camera: Camera::new(&config.camera),
            controller: FreeCameraController::default(),
        })
    }
}

fn grab_cursor(window: &Window) {
    let grabbed = window
        .set_cursor_grab(CursorGrabMode::Locked)
        .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined));
    if let Err(e) = grabbed {
        log::warn!("could not grab the cursor: {e}");
    }
    window.set_cursor_visible(false);
}

pub struct App {
    async_runtime: tokio::runtime::Runtime,
    config: Config,
    state: Option<AppState>,
    // Set when startup fails; `run` returns it after the loop has exited.
    error: Option<anyhow::Error>,
    last_time: Instant,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let async_runtime =
            tokio::runtime::Runtime::new().context("failed to start the async runtime")?;
        Ok(Self {
            async_runtime,
            config,
            state: None,
            error: None,
            last_time: Instant::now(),
        })
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<AppState> {
        let window_attributes = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height))
            .with_resizable(self.config.resizable);
        let window = Arc::new(
            event_loop
                .create_window(window_attributes)
                .context("failed to create the window")?,
        );
        grab_cursor(&window);
        let state = self
            .async_runtime
            .block_on(AppState::new(window.clone(), &self.config))?;
        window.request_redraw();
        Ok(state)
    }

    fn render(state: &mut AppState, dt: instant::Duration) {
        let result = state.orchestrator.frame(
            &mut state.ctx,
            &mut state.camera,
            &mut state.controller,
            dt,
        );
        if let Err(e) = result {
            match e.downcast_ref::<wgpu::SurfaceError>() {
                // Reconfigure the surface if it's lost or outdated
                Some(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    state.ctx.reconfigure();
                }
                _ => log::error!("Unable to render: {e:#}"),
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        match self.init(event_loop) {
            Ok(state) => {
                self.last_time = Instant::now();
                self.state = Some(state);
            }
            Err(e) => {
                log::error!("startup failed: {e:#}");
                self.error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: DeviceId,
        event: DeviceEvent,
    ) {
        let Some(state) = &mut self.state else {
            return;
        };
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            state.controller.handle_mouse(dx, dy);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(state) = &mut self.state else {
            return;
        };
        if state.controller.handle_window_event(&event) {
            return;
        }
        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => event_loop.exit(),
            WindowEvent::Resized(size) => state.ctx.resize(size.width, size.height),
            WindowEvent::Focused(true) => {
                if let Some(window) = state.ctx.window() {
                    grab_cursor(window);
                }
            }
            WindowEvent::RedrawRequested => {
                let dt = self.last_time.elapsed();
                self.last_time = Instant::now();
                Self::render(state, dt);
                if let Some(window) = state.ctx.window() {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &mut self.state {
            state.orchestrator.shutdown();
        }
    }
}

/// Open the window and render until it is closed.
pub fn run(config: Config) -> Result<()> {
    let env = env_logger::Env::default().default_filter_or(config.log_filter.as_str());
    if let Err(e) = env_logger::Builder::from_env(env).try_init() {
        println!("Warning: Could not initialize logger: {}", e);
    }

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config)?;
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
