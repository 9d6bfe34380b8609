use std::ops::Range;

use cgmath::{Matrix4, SquareMatrix, Vector3};
use wgpu::util::DeviceExt;

use crate::data_structures::texture::Texture;

pub trait Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static>;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
    pub normal: [f32; 3],
}

impl Vertex for ModelVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<ModelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 5]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

#[derive(Debug)]
pub struct Material {
    pub name: String,
    pub diffuse_texture: Texture,
    pub bind_group: wgpu::BindGroup,
}

impl Material {
    /// `layout` must be the texture + sampler layout of the lit pipeline.
    pub fn new(
        device: &wgpu::Device,
        name: &str,
        diffuse_texture: Texture,
        layout: &wgpu::BindGroupLayout,
    ) -> anyhow::Result<Self> {
        let sampler = diffuse_texture
            .sampler
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("material {name}: diffuse texture has no sampler"))?;
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&diffuse_texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
            label: Some(name),
        });

        Ok(Self {
            name: String::from(name),
            diffuse_texture,
            bind_group,
        })
    }
}

#[derive(Debug)]
pub struct Mesh {
    pub name: String,
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub num_elements: u32,
    /// Index into [`Model::materials`].
    pub material: usize,
}

impl Mesh {
    pub fn new(
        device: &wgpu::Device,
        name: &str,
        vertices: &[ModelVertex],
        indices: &[u32],
        material: usize,
    ) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{:?} Vertex Buffer", name)),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{:?} Index Buffer", name)),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            name: name.to_string(),
            vertex_buffer,
            index_buffer,
            num_elements: indices.len() as u32,
            material,
        }
    }

    /// Axis-aligned cube centred on the origin with edge length `size`.
    ///
    /// Every face winds counter-clockwise seen from outside, so back-face
    /// culling must be disabled to see it from within (skybox, cubemap bake).
    pub fn cube(device: &wgpu::Device, name: &str, size: f32) -> Self {
        let (vertices, indices) = cube_geometry(size);
        Self::new(device, name, &vertices, &indices, 0)
    }
}

/// Vertices and indices of [`Mesh::cube`]: four vertices and two triangles per
/// face, faces in +X, -X, +Y, -Y, +Z, -Z order.
pub fn cube_geometry(size: f32) -> (Vec<ModelVertex>, Vec<u32>) {
    // (normal, u, v) with u x v == normal
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];
    let half = size / 2.0;
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, u, v) in faces {
        let (n, u, v) = (Vector3::from(normal), Vector3::from(u), Vector3::from(v));
        let base = vertices.len() as u32;
        for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let position = (n + u * su + v * sv) * half;
            vertices.push(ModelVertex {
                position: position.into(),
                tex_coords: [(su + 1.0) / 2.0, 1.0 - (sv + 1.0) / 2.0],
                normal,
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    (vertices, indices)
}

#[derive(Debug)]
pub struct Model {
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    /// World transform applied to every mesh.
    pub transform: Matrix4<f32>,
}

impl Model {
    pub fn new(meshes: Vec<Mesh>, materials: Vec<Material>) -> Self {
        Self {
            meshes,
            materials,
            transform: Matrix4::identity(),
        }
    }

    pub fn from_mesh(mesh: Mesh, material: Material) -> Self {
        Self::new(vec![mesh], vec![material])
    }

    /// Place the model at `position` with a uniform `scale`.
    pub fn place(&mut self, position: [f32; 3], scale: f32) {
        self.transform =
            Matrix4::from_translation(Vector3::from(position)) * Matrix4::from_scale(scale);
    }
}

pub trait DrawModel {
    fn draw_mesh(&mut self, mesh: &Mesh);
    fn draw_mesh_instanced(&mut self, mesh: &Mesh, instances: Range<u32>);
    /// Draw every mesh, binding each mesh's material at `material_group` when
    /// given. Meshes whose material index is out of range are skipped.
    fn draw_model(&mut self, model: &Model, material_group: Option<u32>);
}

impl DrawModel for wgpu::RenderPass<'_> {
    fn draw_mesh(&mut self, mesh: &Mesh) {
        self.draw_mesh_instanced(mesh, 0..1);
    }

    fn draw_mesh_instanced(&mut self, mesh: &Mesh, instances: Range<u32>) {
        self.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        self.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        self.draw_indexed(0..mesh.num_elements, 0, instances);
    }

    fn draw_model(&mut self, model: &Model, material_group: Option<u32>) {
        for mesh in &model.meshes {
            if let Some(group) = material_group {
                let Some(material) = model.materials.get(mesh.material) else {
                    log::warn!("mesh {} has no material {}", mesh.name, mesh.material);
                    continue;
                };
                self.set_bind_group(group, &material.bind_group, &[]);
            }
            self.draw_mesh(mesh);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::InnerSpace;

    #[test]
    fn cube_faces_wind_outwards() {
        let (vertices, indices) = cube_geometry(2.0);
        assert_eq!(vertices.len(), 24);
        assert_eq!(indices.len(), 36);
        for tri in indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]]
                .map(|i| Vector3::from(vertices[i as usize].position));
            let face_normal = (b - a).cross(c - a).normalize();
            let normal = Vector3::from(vertices[tri[0] as usize].normal);
            assert!((face_normal - normal).magnitude() < 1e-6);
        }
    }

    #[test]
    fn cube_spans_its_size() {
        let (vertices, _) = cube_geometry(100.0);
        for v in &vertices {
            assert!(v.position.iter().all(|c| c.abs() == 50.0));
        }
    }
}
