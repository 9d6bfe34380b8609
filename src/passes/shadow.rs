//! Depth-only shadow map pass.
//!
//! The model is rendered every frame from a fixed orthographic projection into
//! a square depth-only target. The resulting depth texture is shown by the debug
//! overlay; the light-space matrix is kept for shading but nothing samples the
//! map for lighting yet.

use anyhow::{Context as _, Result};
use cgmath::{Matrix4, SquareMatrix};

use crate::{
    camera::OPENGL_TO_WGPU_MATRIX,
    config::Config,
    context::Context,
    data_structures::{
        model::{DrawModel, Model},
        registry::{ResourceRegistry, TargetId},
        render_target::{AttachmentSpec, Clear},
        texture::Texture,
    },
    pipelines::{
        ShaderKind,
        uniforms::{MatrixUniform, UniformSlot},
    },
};

/// Square orthographic projection `ortho(-h, h, -h, h, near, far)` in wgpu depth
/// range. The shadow map uses half its resolution as `h`.
pub fn shadow_projection(half_extent: f32, near: f32, far: f32) -> Matrix4<f32> {
    OPENGL_TO_WGPU_MATRIX
        * cgmath::ortho(-half_extent, half_extent, -half_extent, half_extent, near, far)
}

#[derive(Debug)]
pub struct ShadowPass {
    target: TargetId,
    resolution: u32,
    half_extent: f32,
    near: f32,
    far: f32,
    uniform: UniformSlot,
    light_space: Matrix4<f32>,
}

impl ShadowPass {
    /// Create the shadow map target and the pipeline it is drawn with.
    pub fn new(ctx: &mut Context, registry: &mut ResourceRegistry, config: &Config) -> Result<Self> {
        let resolution = config.shadow_resolution;
        let target = registry
            .create_target(
                &ctx.device,
                &AttachmentSpec::depth_only("shadow map", [resolution, resolution]),
                config.target_policy,
            )
            .context("creating the shadow map")?;
        let key = ctx.state.pipeline_key(ShaderKind::DepthOnly);
        ctx.pipelines.prepare(&ctx.device, key);
        let uniform = UniformSlot::new(&ctx.device, &ctx.pipelines.layouts, "shadow matrices");
        log::info!("shadow map {resolution}x{resolution}");
        Ok(Self {
            target,
            resolution,
            half_extent: config.shadow_half_extent(),
            near: config.shadow_near,
            far: config.shadow_far,
            uniform,
            light_space: Matrix4::identity(),
        })
    }

    pub fn target(&self) -> TargetId {
        self.target
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn projection(&self) -> Matrix4<f32> {
        shadow_projection(self.half_extent, self.near, self.far)
    }

    /// Projection, view and model matrix of the last recorded pass.
    pub fn light_space(&self) -> Matrix4<f32> {
        self.light_space
    }

    pub fn depth_texture<'r>(&self, registry: &'r ResourceRegistry) -> Result<&'r Texture> {
        registry
            .target(self.target)?
            .depth_texture()
            .context("shadow map has no depth attachment")
    }

    /// Record the shadow pass into `encoder`: clear depth to 1.0 and draw every
    /// mesh of `model` depth-only. Leaves the render state as it found it.
    pub fn record(
        &mut self,
        ctx: &mut Context,
        registry: &ResourceRegistry,
        encoder: &mut wgpu::CommandEncoder,
        model: &Model,
    ) -> Result<()> {
        let target = registry.target(self.target)?;
        let mut state = ctx.state.scoped();
        target.bind(&mut state);
        state.push_projection(self.projection());
        state.set_view(Matrix4::identity());
        let key = state.use_shader(ShaderKind::DepthOnly);
        let pipeline = ctx.pipelines.get(key)?;

        let light_space = state.projection() * state.view() * model.transform;
        self.uniform.write(
            &ctx.queue,
            &MatrixUniform::new(state.projection(), state.view(), model.transform),
        );
        {
            let mut pass = target.begin_pass(encoder, &state, Clear::DEPTH)?;
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &self.uniform.bind_group, &[]);
            pass.draw_model(model, None);
        }

        state.pop_projection()?;
        target.unbind(&mut state);
        state.clear_shader();
        self.light_space = light_space;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Vector4;

    fn default_projection() -> Matrix4<f32> {
        let config = Config::default();
        shadow_projection(config.shadow_half_extent(), config.shadow_near, config.shadow_far)
    }

    #[test]
    fn extent_is_half_the_resolution() {
        let p = default_projection();
        let corner = p * Vector4::new(512.0, -512.0, -1.0, 1.0);
        assert!((corner.x - 1.0).abs() < 1e-6);
        assert!((corner.y + 1.0).abs() < 1e-6);
        let outside = p * Vector4::new(600.0, 0.0, -1.0, 1.0);
        assert!(outside.x > 1.0);
    }

    #[test]
    fn depth_range_is_zero_to_one() {
        let p = default_projection();
        let near = p * Vector4::new(0.0, 0.0, -0.01, 1.0);
        let far = p * Vector4::new(0.0, 0.0, -1000.0, 1.0);
        assert!(near.z.abs() < 1e-6);
        assert!((far.z - 1.0).abs() < 1e-6);
    }

    #[test]
    fn extent_follows_the_configured_resolution() {
        let config = Config {
            shadow_resolution: 256,
            ..Config::default()
        };
        let p = shadow_projection(config.shadow_half_extent(), config.shadow_near, config.shadow_far);
        let edge = p * Vector4::new(128.0, 128.0, -1.0, 1.0);
        assert!((edge.x - 1.0).abs() < 1e-6);
        assert!((edge.y - 1.0).abs() < 1e-6);
    }
}
