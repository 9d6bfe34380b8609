use std::sync::Arc;

use anyhow::{Context as _, Result};
use winit::window::Window;

use crate::{
    config::Config,
    data_structures::texture::Texture,
    pipelines::PipelineCache,
    state::RenderState,
};

/// Where the main pass ends up.
#[derive(Debug)]
pub enum Output {
    Window {
        window: Arc<Window>,
        surface: wgpu::Surface<'static>,
    },
    /// Stand-in for the window when running without one.
    Offscreen { texture: Texture },
}

/// A frame acquired from the [`Output`]; the main pass resolves into `view`.
#[derive(Debug)]
pub struct Frame {
    surface: Option<wgpu::SurfaceTexture>,
    pub view: wgpu::TextureView,
}

impl Frame {
    /// Hand the frame to the compositor. No-op offscreen.
    pub fn present(self) {
        if let Some(surface) = self.surface {
            surface.present();
        }
    }
}

/// GPU device, queue, output and the state every pass works against.
#[derive(Debug)]
pub struct Context {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub output: Output,
    /// Format and size of the main framebuffer, also when offscreen.
    pub config: wgpu::SurfaceConfiguration,
    pub sample_count: u32,
    pub(crate) depth_texture: Texture,
    pub(crate) msaa_texture: Option<Texture>,
    pub pipelines: PipelineCache,
    pub state: RenderState,
}

async fn request_device(
    instance: &wgpu::Instance,
    compatible_surface: Option<&wgpu::Surface<'_>>,
) -> Result<(wgpu::Adapter, wgpu::Device, wgpu::Queue)> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface,
            force_fallback_adapter: false,
        })
        .await
        .context("no suitable GPU adapter")?;
    log::info!("using adapter {:?}", adapter.get_info().name);

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("vista device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            memory_hints: Default::default(),
            trace: wgpu::Trace::Off,
        })
        .await
        .context("failed to create device and queue")?;
    Ok((adapter, device, queue))
}

/// The requested MSAA sample count if the adapter supports it for both the
/// colour and the depth format, 1 otherwise.
fn supported_sample_count(
    adapter: &wgpu::Adapter,
    color_format: wgpu::TextureFormat,
    requested: u32,
) -> u32 {
    if requested <= 1 {
        return 1;
    }
    let supported = [color_format, Texture::DEPTH_FORMAT].iter().all(|format| {
        adapter
            .get_texture_format_features(*format)
            .flags
            .sample_count_supported(requested)
    });
    if supported {
        requested
    } else {
        log::warn!(
            "{}x MSAA is not supported for {:?}, rendering without multisampling",
            requested,
            color_format
        );
        1
    }
}

impl Context {
    /// Set up the device for `window` and configure its surface.
    pub async fn new(window: Arc<Window>, config: &Config) -> Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance
            .create_surface(window.clone())
            .context("failed to create the window surface")?;
        let (adapter, device, queue) = request_device(&instance, Some(&surface)).await?;

        let surface_caps = surface.get_capabilities(&adapter);
        // Shaders write linear colour and rely on an sRGB surface for encoding.
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .context("the surface reports no formats")?;
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let sample_count = supported_sample_count(&adapter, surface_format, config.msaa_samples);
        Ok(Self::assemble(
            device,
            queue,
            Output::Window { window, surface },
            surface_config,
            sample_count,
        ))
    }

    /// A context without window: the main pass renders into an offscreen
    /// texture of `config.width` x `config.height` that can be read back.
    pub async fn headless(config: &Config) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let (adapter, device, queue) = request_device(&instance, None).await?;

        let format = wgpu::TextureFormat::Rgba8UnormSrgb;
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            format,
            width: config.width.max(1),
            height: config.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Opaque,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        let texture = Texture::create_render_texture(
            &device,
            [surface_config.width, surface_config.height],
            format,
            "offscreen framebuffer",
        );
        let sample_count = supported_sample_count(&adapter, format, config.msaa_samples);
        Ok(Self::assemble(
            device,
            queue,
            Output::Offscreen { texture },
            surface_config,
            sample_count,
        ))
    }

    fn assemble(
        device: wgpu::Device,
        queue: wgpu::Queue,
        output: Output,
        config: wgpu::SurfaceConfiguration,
        sample_count: u32,
    ) -> Self {
        let size = [config.width, config.height];
        let depth_texture =
            Texture::create_depth_texture(&device, size, sample_count, "depth_texture");
        let msaa_texture = (sample_count > 1)
            .then(|| Texture::create_msaa_texture(&device, size, config.format, sample_count));
        let pipelines = PipelineCache::new(&device, config.format, sample_count);
        let state = RenderState::new(config.width, config.height);
        log::info!(
            "context ready: {}x{} {:?}, {} sample(s)",
            config.width,
            config.height,
            config.format,
            sample_count
        );
        Self {
            device,
            queue,
            output,
            config,
            sample_count,
            depth_texture,
            msaa_texture,
            pipelines,
            state,
        }
    }

    pub fn window(&self) -> Option<&Arc<Window>> {
        match &self.output {
            Output::Window { window, .. } => Some(window),
            Output::Offscreen { .. } => None,
        }
    }

    pub fn size(&self) -> [u32; 2] {
        [self.config.width, self.config.height]
    }

    pub fn aspect(&self) -> f32 {
        self.config.width as f32 / self.config.height.max(1) as f32
    }

    /// The offscreen framebuffer, when running headless.
    pub fn offscreen_texture(&self) -> Option<&Texture> {
        match &self.output {
            Output::Offscreen { texture } => Some(texture),
            Output::Window { .. } => None,
        }
    }

    /// Follow a new framebuffer size. Zero sizes (minimised windows) are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        match &mut self.output {
            Output::Window { surface, .. } => surface.configure(&self.device, &self.config),
            Output::Offscreen { texture } => {
                *texture = Texture::create_render_texture(
                    &self.device,
                    [width, height],
                    self.config.format,
                    "offscreen framebuffer",
                );
            }
        }
        self.depth_texture = Texture::create_depth_texture(
            &self.device,
            [width, height],
            self.sample_count,
            "depth_texture",
        );
        if self.sample_count > 1 {
            self.msaa_texture = Some(Texture::create_msaa_texture(
                &self.device,
                [width, height],
                self.config.format,
                self.sample_count,
            ));
        }
        self.state.set_window_size(width, height);
        log::debug!("resized to {}x{}", width, height);
    }

    /// Reconfigure the surface with the current size, after `Lost`/`Outdated`.
    pub fn reconfigure(&mut self) {
        let (width, height) = match self.window() {
            Some(window) => {
                let size = window.inner_size();
                (size.width, size.height)
            }
            None => (self.config.width, self.config.height),
        };
        self.resize(width, height);
    }

    pub fn acquire_frame(&self) -> Result<Frame, wgpu::SurfaceError> {
        match &self.output {
            Output::Window { surface, .. } => {
                let surface = surface.get_current_texture()?;
                let view = surface
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                Ok(Frame {
                    surface: Some(surface),
                    view,
                })
            }
            Output::Offscreen { texture } => Ok(Frame {
                surface: None,
                view: texture.view.clone(),
            }),
        }
    }

    /// Colour attachment of the main pass for `frame`, resolving MSAA into it
    /// when enabled.
    pub fn color_attachment<'a>(
        &'a self,
        frame: &'a Frame,
        clear: wgpu::Color,
    ) -> wgpu::RenderPassColorAttachment<'a> {
        let (view, resolve_target) = match &self.msaa_texture {
            Some(msaa) => (&msaa.view, Some(&frame.view)),
            None => (&frame.view, None),
        };
        wgpu::RenderPassColorAttachment {
            view,
            depth_slice: None,
            resolve_target,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(clear),
                store: wgpu::StoreOp::Store,
            },
        }
    }

    pub fn depth_attachment(&self) -> wgpu::RenderPassDepthStencilAttachment<'_> {
        wgpu::RenderPassDepthStencilAttachment {
            view: &self.depth_texture.view,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }
    }
}
