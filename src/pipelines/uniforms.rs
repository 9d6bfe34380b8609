//! Bind group layouts shared by the shader programs, and the per-draw matrix
//! uniform.
//!
//! Group 0 of every program that transforms vertices is a [`MatrixUniform`].
//! `Queue::write_buffer` only lands at the next submit, so two draws recorded
//! into the same submission must not share a [`UniformSlot`].

use anyhow::{Result, anyhow};
use cgmath::{Matrix4, SquareMatrix};
use wgpu::util::DeviceExt;

use crate::data_structures::texture::{Texture, TextureKind};

#[derive(Debug)]
pub struct Layouts {
    /// `MatrixUniform` at binding 0.
    pub matrices: wgpu::BindGroupLayout,
    /// 2D float texture at binding 0, filtering sampler at binding 1.
    pub texture: wgpu::BindGroupLayout,
    /// Cube texture at binding 0, filtering sampler at binding 1.
    pub cube: wgpu::BindGroupLayout,
    /// Unfiltered depth texture at binding 0.
    pub depth: wgpu::BindGroupLayout,
}

fn sampled_layout(
    device: &wgpu::Device,
    view_dimension: wgpu::TextureViewDimension,
    label: &str,
) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
        label: Some(label),
    })
}

impl Layouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let matrices = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
            label: Some("matrices_bind_group_layout"),
        });
        let depth = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Depth,
                },
                count: None,
            }],
            label: Some("depth_bind_group_layout"),
        });
        Self {
            matrices,
            texture: sampled_layout(
                device,
                wgpu::TextureViewDimension::D2,
                "texture_bind_group_layout",
            ),
            cube: sampled_layout(
                device,
                wgpu::TextureViewDimension::Cube,
                "cube_bind_group_layout",
            ),
            depth,
        }
    }

    /// Bind group for a sampled texture; picks the 2D or cube layout from the
    /// texture kind.
    pub fn sampled_bind_group(
        &self,
        device: &wgpu::Device,
        texture: &Texture,
        label: &str,
    ) -> Result<wgpu::BindGroup> {
        let layout = match texture.kind {
            TextureKind::Flat => &self.texture,
            TextureKind::Cube => &self.cube,
            TextureKind::Depth => return self.depth_bind_group(device, texture, label),
        };
        let sampler = texture
            .sampler
            .as_ref()
            .ok_or_else(|| anyhow!("{label}: texture has no sampler"))?;
        Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
            label: Some(label),
        }))
    }

    pub fn depth_bind_group(
        &self,
        device: &wgpu::Device,
        texture: &Texture,
        label: &str,
    ) -> Result<wgpu::BindGroup> {
        anyhow::ensure!(
            texture.kind == TextureKind::Depth,
            "{label}: expected a depth texture, got {:?}",
            texture.kind
        );
        Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.depth,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            }],
            label: Some(label),
        }))
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MatrixUniform {
    pub projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
}

impl MatrixUniform {
    pub fn new(projection: Matrix4<f32>, view: Matrix4<f32>, model: Matrix4<f32>) -> Self {
        Self {
            projection: projection.into(),
            view: view.into(),
            model: model.into(),
        }
    }
}

impl Default for MatrixUniform {
    fn default() -> Self {
        let identity: [[f32; 4]; 4] = Matrix4::<f32>::identity().into();
        Self {
            projection: identity,
            view: identity,
            model: identity,
        }
    }
}

/// A matrix uniform buffer with its bind group.
#[derive(Debug)]
pub struct UniformSlot {
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

impl UniformSlot {
    pub fn new(device: &wgpu::Device, layouts: &Layouts, label: &str) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&[MatrixUniform::default()]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &layouts.matrices,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some(label),
        });
        Self { buffer, bind_group }
    }

    pub fn write(&self, queue: &wgpu::Queue, uniform: &MatrixUniform) {
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[*uniform]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_layout_is_three_matrices() {
        assert_eq!(std::mem::size_of::<MatrixUniform>(), 3 * 64);
    }

    #[test]
    fn matrices_are_column_major() {
        let translation = Matrix4::from_translation(cgmath::Vector3::new(1.0, 2.0, 3.0));
        let uniform = MatrixUniform::new(translation, Matrix4::identity(), Matrix4::identity());
        assert_eq!(uniform.projection[3], [1.0, 2.0, 3.0, 1.0]);
    }
}
