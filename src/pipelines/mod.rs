//! Shader programs and the render pipelines built from them.
//!
//! A pipeline in wgpu bakes in what GL keeps as mutable global state (culling,
//! depth writes). Each shader program therefore has one pipeline variant per
//! combination of those flags, identified by a [`PipelineKey`] that
//! [`RenderState`](crate::state::RenderState) derives from its current flags.
//! Variants are built up front with [`PipelineCache::prepare`] and only looked up
//! while a frame is recorded.

use std::collections::HashMap;

use anyhow::{Result, anyhow};

use crate::{
    data_structures::{
        model::{ModelVertex, Vertex},
        texture::Texture,
    },
    pipelines::{
        basic::{PipelineSpec, mk_render_pipeline},
        grid::LineVertex,
        uniforms::Layouts,
    },
};

pub mod basic;
pub mod grid;
pub mod uniforms;

/// The shader programs the renderer knows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    /// Projects an equirectangular panorama onto the faces of a cube.
    Equirect,
    /// Samples the environment cubemap behind everything else.
    Skybox,
    /// Writes depth only; used for the shadow map.
    DepthOnly,
    /// Base colour texture with a fixed ambient and directional term.
    Lit,
    /// Shows a depth texture as grayscale.
    Overlay,
    /// Coloured lines on the ground plane.
    Grid,
}

impl ShaderKind {
    pub const ALL: [ShaderKind; 6] = [
        ShaderKind::Equirect,
        ShaderKind::Skybox,
        ShaderKind::DepthOnly,
        ShaderKind::Lit,
        ShaderKind::Overlay,
        ShaderKind::Grid,
    ];

    fn source(self) -> wgpu::ShaderModuleDescriptor<'static> {
        let (label, source) = match self {
            ShaderKind::Equirect => ("equirect shader", include_str!("equirect.wgsl")),
            ShaderKind::Skybox => ("skybox shader", include_str!("skybox.wgsl")),
            ShaderKind::DepthOnly => ("depth shader", include_str!("depth.wgsl")),
            ShaderKind::Lit => ("lit shader", include_str!("lit.wgsl")),
            ShaderKind::Overlay => ("overlay shader", include_str!("overlay.wgsl")),
            ShaderKind::Grid => ("grid shader", include_str!("grid.wgsl")),
        };
        wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        }
    }
}

/// Identifies one pipeline variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub shader: ShaderKind,
    pub backface_culling: bool,
    pub depth_write: bool,
}

/// Every pipeline variant the renderer may ask for, with its layouts.
#[derive(Debug)]
pub struct PipelineCache {
    pub layouts: Layouts,
    surface_format: wgpu::TextureFormat,
    sample_count: u32,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl PipelineCache {
    /// `surface_format` and `sample_count` describe the main pass; the bake and
    /// shadow programs render offscreen and ignore both.
    pub fn new(device: &wgpu::Device, surface_format: wgpu::TextureFormat, sample_count: u32) -> Self {
        Self {
            layouts: Layouts::new(device),
            surface_format,
            sample_count,
            pipelines: HashMap::new(),
        }
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_format
    }

    /// Build the variant for `key` unless it already exists.
    pub fn prepare(&mut self, device: &wgpu::Device, key: PipelineKey) {
        if self.pipelines.contains_key(&key) {
            return;
        }
        log::debug!("building pipeline {:?}", key);
        let pipeline = self.build(device, key);
        self.pipelines.insert(key, pipeline);
    }

    pub fn get(&self, key: PipelineKey) -> Result<&wgpu::RenderPipeline> {
        self.pipelines
            .get(&key)
            .ok_or_else(|| anyhow!("pipeline {:?} was not prepared", key))
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    fn build(&self, device: &wgpu::Device, key: PipelineKey) -> wgpu::RenderPipeline {
        let layouts = &self.layouts;
        let (bind_group_layouts, spec): (Vec<&wgpu::BindGroupLayout>, PipelineSpec) = match key
            .shader
        {
            ShaderKind::Equirect => (
                vec![&layouts.matrices, &layouts.texture],
                PipelineSpec {
                    color_format: Some(Texture::HDR_FORMAT),
                    vertex_layouts: vec![ModelVertex::desc()],
                    ..PipelineSpec::offscreen()
                },
            ),
            ShaderKind::DepthOnly => (
                vec![&layouts.matrices],
                PipelineSpec {
                    vertex_layouts: vec![ModelVertex::desc()],
                    ..PipelineSpec::offscreen()
                },
            ),
            ShaderKind::Skybox => (
                vec![&layouts.matrices, &layouts.cube],
                PipelineSpec {
                    // Depth is pinned to 1.0, which must pass against the cleared buffer.
                    depth_compare: wgpu::CompareFunction::LessEqual,
                    vertex_layouts: vec![ModelVertex::desc()],
                    ..self.main_pass()
                },
            ),
            ShaderKind::Lit => (
                vec![&layouts.matrices, &layouts.texture],
                PipelineSpec {
                    vertex_layouts: vec![ModelVertex::desc()],
                    ..self.main_pass()
                },
            ),
            ShaderKind::Overlay => (
                vec![&layouts.depth],
                PipelineSpec {
                    depth_compare: wgpu::CompareFunction::Always,
                    ..self.main_pass()
                },
            ),
            ShaderKind::Grid => (
                vec![&layouts.matrices],
                PipelineSpec {
                    topology: wgpu::PrimitiveTopology::LineList,
                    vertex_layouts: vec![LineVertex::desc()],
                    ..self.main_pass()
                },
            ),
        };

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{:?} pipeline layout", key.shader)),
            bind_group_layouts: &bind_group_layouts,
            immediate_size: 0,
        });
        mk_render_pipeline(device, &layout, key, &spec, key.shader.source())
    }

    fn main_pass(&self) -> PipelineSpec {
        PipelineSpec {
            color_format: Some(self.surface_format),
            sample_count: self.sample_count,
            ..PipelineSpec::offscreen()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn keys_distinguish_state_flags() {
        let mut keys = HashSet::new();
        for shader in ShaderKind::ALL {
            for backface_culling in [false, true] {
                for depth_write in [false, true] {
                    keys.insert(PipelineKey {
                        shader,
                        backface_culling,
                        depth_write,
                    });
                }
            }
        }
        assert_eq!(keys.len(), ShaderKind::ALL.len() * 4);
    }
}
