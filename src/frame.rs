//! Per-frame orchestration.
//!
//! A frame runs through [`FrameStage`]s in a fixed order. Each stage is
//! entered through [`FrameOrchestrator::advance`], which rejects anything out of
//! order, so a stage can never run twice or be skipped within one frame.

use anyhow::{Result, bail};
use cgmath::{Matrix4, SquareMatrix};
use instant::Duration;

use crate::{
    camera::{Camera, CameraController},
    config::Config,
    context::Context,
    data_structures::{
        model::{DrawModel, Mesh, Model},
        registry::{ResourceRegistry, TextureId},
        texture::Texture,
    },
    passes::{
        cubemap::{BakedCubemap, CubemapBaker},
        shadow::ShadowPass,
    },
    pipelines::{
        ShaderKind,
        grid::Grid,
        uniforms::{MatrixUniform, UniformSlot},
    },
    state::{RenderState, Viewport},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStage {
    CameraUpdate,
    ShadowPass,
    MainPassBegin,
    SkyboxDraw,
    SceneDraw,
    DebugOverlayDraw,
    MainPassEnd,
    Present,
}

impl FrameStage {
    pub const ORDER: [FrameStage; 8] = [
        FrameStage::CameraUpdate,
        FrameStage::ShadowPass,
        FrameStage::MainPassBegin,
        FrameStage::SkyboxDraw,
        FrameStage::SceneDraw,
        FrameStage::DebugOverlayDraw,
        FrameStage::MainPassEnd,
        FrameStage::Present,
    ];

    /// The stage after `self`, `None` after [`FrameStage::Present`].
    pub fn next(self) -> Option<FrameStage> {
        let index = Self::ORDER.iter().position(|stage| *stage == self)?;
        Self::ORDER.get(index + 1).copied()
    }
}

/// Tracks the stage a frame is in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageCursor {
    current: Option<FrameStage>,
}

impl StageCursor {
    pub fn current(&self) -> Option<FrameStage> {
        self.current
    }

    /// Enter `stage`, which must directly follow the current one.
    /// [`FrameStage::CameraUpdate`] is always accepted and starts a new frame,
    /// which also recovers from a frame that was aborted by an error.
    pub fn advance(&mut self, stage: FrameStage) -> Result<()> {
        let allowed = stage == FrameStage::CameraUpdate
            || self.current.and_then(FrameStage::next) == Some(stage);
        if !allowed {
            bail!("frame stage {:?} cannot follow {:?}", stage, self.current);
        }
        self.current = Some(stage);
        Ok(())
    }
}

/// Counts frames and logs the frame rate once per second.
#[derive(Debug, Default)]
pub struct FrameStats {
    frames: u32,
    elapsed: Duration,
    last_fps: Option<f32>,
}

impl FrameStats {
    pub fn tick(&mut self, dt: Duration) {
        self.frames += 1;
        self.elapsed += dt;
        if self.elapsed >= Duration::from_secs(1) {
            let fps = self.frames as f32 / self.elapsed.as_secs_f32();
            log::debug!("{fps:.0} FPS");
            self.last_fps = Some(fps);
            self.frames = 0;
            self.elapsed = Duration::ZERO;
        }
    }

    /// Frame rate over the last full second, once one has passed.
    pub fn fps(&self) -> Option<f32> {
        self.last_fps
    }
}

/// Run `draw` with back-face culling and depth writes disabled, as the skybox
/// needs. Both flags are restored on every exit path.
pub fn skybox_scope<T>(
    state: &mut RenderState,
    draw: impl FnOnce(&mut RenderState) -> Result<T>,
) -> Result<T> {
    let mut scoped = state.scoped();
    scoped.set_backface_culling(false);
    scoped.set_depth_write(false);
    draw(&mut scoped)
}

/// Run `draw` in a 2D context confined to `viewport`: identity projection and
/// view, no culling, no depth writes. Everything is restored afterwards.
pub fn overlay_scope<T>(
    state: &mut RenderState,
    viewport: Viewport,
    draw: impl FnOnce(&mut RenderState) -> Result<T>,
) -> Result<T> {
    let mut scoped = state.scoped();
    scoped.push_projection(Matrix4::identity());
    scoped.set_view(Matrix4::identity());
    scoped.set_backface_culling(false);
    scoped.set_depth_write(false);
    scoped.set_viewport(viewport);
    let result = draw(&mut scoped);
    scoped.pop_projection()?;
    result
}

/// Owns everything drawn each frame and runs the stages in order.
#[derive(Debug)]
pub struct FrameOrchestrator {
    registry: ResourceRegistry,
    panorama: TextureId,
    environment: BakedCubemap,
    environment_bind_group: wgpu::BindGroup,
    shadow: ShadowPass,
    overlay_bind_group: wgpu::BindGroup,
    cube: Mesh,
    model: Model,
    grid: Option<Grid>,
    skybox_uniform: UniformSlot,
    scene_uniform: UniformSlot,
    grid_uniform: UniformSlot,
    clear_colour: wgpu::Color,
    overlay_size: u32,
    stage: StageCursor,
    stats: FrameStats,
}

impl FrameOrchestrator {
    /// Bake the environment from `panorama`, create the shadow map and build
    /// every pipeline the frame uses.
    pub fn new(ctx: &mut Context, config: &Config, panorama: Texture, mut model: Model) -> Result<Self> {
        let mut registry = ResourceRegistry::new();
        let panorama_id = registry.insert_texture(panorama.clone());
        let cube = Mesh::cube(&ctx.device, "unit cube", 1.0);

        let environment = CubemapBaker::bake(
            ctx,
            &mut registry,
            &panorama,
            &cube,
            config.cubemap_size,
            config.target_policy,
        )?;
        let shadow = ShadowPass::new(ctx, &mut registry, config)?;
        model.place(config.model_position, config.model_scale);

        let layouts = &ctx.pipelines.layouts;
        let environment_bind_group = layouts.sampled_bind_group(
            &ctx.device,
            registry.texture(environment.texture)?,
            "environment",
        )?;
        let overlay_bind_group =
            layouts.depth_bind_group(&ctx.device, shadow.depth_texture(&registry)?, "shadow overlay")?;
        let skybox_uniform = UniformSlot::new(&ctx.device, layouts, "skybox matrices");
        let scene_uniform = UniformSlot::new(&ctx.device, layouts, "scene matrices");
        let grid_uniform = UniformSlot::new(&ctx.device, layouts, "grid matrices");
        let grid = config.grid.as_ref().map(|grid| Grid::new(&ctx.device, grid));

        let mut keys = vec![
            ctx.state.pipeline_key(ShaderKind::Lit),
            ctx.state.pipeline_key(ShaderKind::Grid),
        ];
        keys.push(skybox_scope(&mut ctx.state, |state| {
            Ok(state.pipeline_key(ShaderKind::Skybox))
        })?);
        keys.push(overlay_scope(
            &mut ctx.state,
            Viewport::new(config.overlay_size, config.overlay_size),
            |state| Ok(state.pipeline_key(ShaderKind::Overlay)),
        )?);
        for key in keys {
            ctx.pipelines.prepare(&ctx.device, key);
        }
        log::info!(
            "frame orchestrator ready, {} pipelines, {} resources",
            ctx.pipelines.len(),
            registry.len()
        );

        Ok(Self {
            registry,
            panorama: panorama_id,
            environment,
            environment_bind_group,
            shadow,
            overlay_bind_group,
            cube,
            model,
            grid,
            skybox_uniform,
            scene_uniform,
            grid_uniform,
            clear_colour: config.clear_colour,
            overlay_size: config.overlay_size,
            stage: StageCursor::default(),
            stats: FrameStats::default(),
        })
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn environment(&self) -> &BakedCubemap {
        &self.environment
    }

    pub fn panorama(&self) -> TextureId {
        self.panorama
    }

    pub fn shadow(&self) -> &ShadowPass {
        &self.shadow
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// The last stage entered; `Some(Present)` after a complete frame.
    pub fn stage(&self) -> Option<FrameStage> {
        self.stage.current()
    }

    /// Enter `stage`; see [`StageCursor::advance`].
    pub fn advance(&mut self, stage: FrameStage) -> Result<()> {
        self.stage.advance(stage)
    }

    /// Render one frame. A `wgpu::SurfaceError` from acquiring the frame is
    /// returned as is inside the error, so callers can downcast it.
    pub fn frame(
        &mut self,
        ctx: &mut Context,
        camera: &mut Camera,
        controller: &mut dyn CameraController,
        dt: Duration,
    ) -> Result<()> {
        self.advance(FrameStage::CameraUpdate)?;
        controller.update(camera, dt);

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });

        self.advance(FrameStage::ShadowPass)?;
        self.shadow
            .record(ctx, &self.registry, &mut encoder, &self.model)?;

        self.advance(FrameStage::MainPassBegin)?;
        let frame = ctx.acquire_frame()?;
        ctx.state.set_projection(camera.projection_matrix(ctx.aspect()));
        ctx.state.set_view(camera.view_matrix());
        let (projection, view) = (ctx.state.projection(), ctx.state.view());
        self.scene_uniform.write(
            &ctx.queue,
            &MatrixUniform::new(projection, view, self.model.transform),
        );
        self.grid_uniform.write(
            &ctx.queue,
            &MatrixUniform::new(projection, view, Matrix4::identity()),
        );
        self.skybox_uniform.write(
            &ctx.queue,
            &MatrixUniform::new(projection, camera.rotation_only_view(), Matrix4::identity()),
        );
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("main pass"),
            color_attachments: &[Some(ctx.color_attachment(&frame, self.clear_colour))],
            depth_stencil_attachment: Some(ctx.depth_attachment()),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        ctx.state.viewport().apply(&mut pass);

        self.advance(FrameStage::SkyboxDraw)?;
        let pipelines = &ctx.pipelines;
        skybox_scope(&mut ctx.state, |state| {
            let key = state.use_shader(ShaderKind::Skybox);
            pass.set_pipeline(pipelines.get(key)?);
            pass.set_bind_group(0, &self.skybox_uniform.bind_group, &[]);
            pass.set_bind_group(1, &self.environment_bind_group, &[]);
            pass.draw_mesh(&self.cube);
            Ok(())
        })?;

        self.advance(FrameStage::SceneDraw)?;
        let key = ctx.state.use_shader(ShaderKind::Lit);
        pass.set_pipeline(ctx.pipelines.get(key)?);
        pass.set_bind_group(0, &self.scene_uniform.bind_group, &[]);
        pass.draw_model(&self.model, Some(1));
        if let Some(grid) = &self.grid {
            let key = ctx.state.use_shader(ShaderKind::Grid);
            pass.set_pipeline(ctx.pipelines.get(key)?);
            pass.set_bind_group(0, &self.grid_uniform.bind_group, &[]);
            grid.draw(&mut pass);
        }
        ctx.state.clear_shader();

        self.advance(FrameStage::DebugOverlayDraw)?;
        let window = ctx.state.window_viewport();
        let corner = Viewport {
            x: 0,
            y: 0,
            width: self.overlay_size.min(window.width),
            height: self.overlay_size.min(window.height),
        };
        let pipelines = &ctx.pipelines;
        overlay_scope(&mut ctx.state, corner, |state| {
            let key = state.use_shader(ShaderKind::Overlay);
            state.viewport().apply(&mut pass);
            pass.set_pipeline(pipelines.get(key)?);
            pass.set_bind_group(0, &self.overlay_bind_group, &[]);
            pass.draw(0..3, 0..1);
            Ok(())
        })?;
        ctx.state.viewport().apply(&mut pass);

        self.advance(FrameStage::MainPassEnd)?;
        drop(pass);
        ctx.queue.submit(std::iter::once(encoder.finish()));

        self.advance(FrameStage::Present)?;
        frame.present();
        self.stats.tick(dt);
        Ok(())
    }

    /// Release every texture and render target, newest first.
    pub fn shutdown(&mut self) {
        log::info!("releasing {} resources", self.registry.len());
        self.registry.release_all();
    }
}
