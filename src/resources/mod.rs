//! Loading models and panoramas from disk, and reading GPU data back.

use std::{
    io::{BufReader, Cursor},
    path::Path,
};

use anyhow::{Context as _, Result, bail};
use cgmath::{Matrix, Matrix3, Matrix4, SquareMatrix, Vector3};

use crate::data_structures::{
    model::{self, Material, Mesh, ModelVertex},
    texture::Texture,
};

pub mod readback;

pub async fn load_binary(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Decode an equirectangular panorama (HDR, EXR or any 8-bit format) into a
/// linear `Rgba16Float` texture.
pub async fn load_panorama(
    path: &Path,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
) -> Result<Texture> {
    let bytes = load_binary(path).await?;
    let img = image::load_from_memory(&bytes)
        .with_context(|| format!("failed to decode panorama {}", path.display()))?;
    log::info!(
        "loaded panorama {} ({}x{})",
        path.display(),
        img.width(),
        img.height()
    );
    Texture::from_hdr_image(device, queue, &img, &path.display().to_string())
}

/// Load a glTF 2.0 model (`.gltf` or `.glb`).
///
/// Node transforms of the default scene are baked into the vertices, so the
/// returned model has an identity transform. Materials are reduced to their base
/// colour: the base colour texture when there is one, a 1x1 texture of the base
/// colour factor otherwise. Primitives without material get a white one.
pub async fn load_model_gltf(
    path: &Path,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
) -> Result<model::Model> {
    let gltf_bytes = load_binary(path).await?;
    let gltf_reader = BufReader::new(Cursor::new(gltf_bytes));
    let gltf = gltf::Gltf::from_reader(gltf_reader)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

    // Load buffers
    let mut buffer_data = Vec::new();
    for buffer in gltf.buffers() {
        match buffer.source() {
            gltf::buffer::Source::Bin => match gltf.blob.as_deref() {
                Some(blob) => buffer_data.push(blob.to_vec()),
                None => bail!("{}: binary buffer without GLB blob", path.display()),
            },
            gltf::buffer::Source::Uri(uri) => {
                if uri.starts_with("data:") {
                    bail!("{}: embedded data URIs are not supported", path.display());
                }
                buffer_data.push(load_binary(&base_dir.join(uri)).await?);
            }
        }
    }

    // Load materials
    let mut materials = Vec::new();
    for material in gltf.materials() {
        let name = material.name().unwrap_or("material").to_string();
        let pbr = material.pbr_metallic_roughness();
        let diffuse_texture = match pbr.base_color_texture() {
            Some(info) => match info.texture().source().source() {
                gltf::image::Source::View { view, mime_type } => {
                    let bytes = buffer_data
                        .get(view.buffer().index())
                        .and_then(|buffer| buffer.get(view.offset()..view.offset() + view.length()))
                        .with_context(|| format!("{}: texture view out of bounds", path.display()))?;
                    Texture::from_bytes(device, queue, bytes, &name, mime_type.split('/').last())?
                }
                gltf::image::Source::Uri { uri, mime_type } => {
                    let bytes = load_binary(&base_dir.join(uri)).await?;
                    Texture::from_bytes(
                        device,
                        queue,
                        &bytes,
                        uri,
                        mime_type.and_then(|mt| mt.split('/').last()),
                    )
                    .with_context(|| format!("failed to decode texture {uri}"))?
                }
            },
            None => {
                let rgba = pbr
                    .base_color_factor()
                    .map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
                Texture::create_solid(rgba, 1, 1, device, queue)
            }
        };
        materials.push(Material::new(device, &name, diffuse_texture, layout)?);
    }
    let default_material = materials.len();
    materials.push(Material::new(
        device,
        "default",
        Texture::create_solid([255; 4], 1, 1, device, queue),
        layout,
    )?);

    let mut meshes = Vec::new();
    let scene = gltf
        .default_scene()
        .or_else(|| gltf.scenes().next())
        .with_context(|| format!("{} contains no scene", path.display()))?;
    for node in scene.nodes() {
        collect_meshes(
            &node,
            Matrix4::identity(),
            &buffer_data,
            device,
            default_material,
            &mut meshes,
        );
    }
    if meshes.is_empty() {
        bail!("{} contains no drawable meshes", path.display());
    }
    log::info!(
        "loaded model {} ({} meshes, {} materials)",
        path.display(),
        meshes.len(),
        materials.len()
    );
    Ok(model::Model::new(meshes, materials))
}

fn collect_meshes(
    node: &gltf::Node,
    parent: Matrix4<f32>,
    buffers: &[Vec<u8>],
    device: &wgpu::Device,
    default_material: usize,
    meshes: &mut Vec<Mesh>,
) {
    let transform = parent * Matrix4::from(node.transform().matrix());
    if let Some(mesh) = node.mesh() {
        let name = mesh.name().unwrap_or("unknown_mesh");
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                log::warn!("skipping non-triangle primitive of mesh {name}");
                continue;
            }
            let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));
            let Some(positions) = reader.read_positions() else {
                log::warn!("skipping primitive of mesh {name} without positions");
                continue;
            };
            let mut vertices: Vec<ModelVertex> = positions
                .map(|position| ModelVertex {
                    position,
                    ..Default::default()
                })
                .collect();
            if let Some(normals) = reader.read_normals() {
                vertices
                    .iter_mut()
                    .zip(normals)
                    .for_each(|(vertex, normal)| vertex.normal = normal);
            }
            if let Some(tex_coords) = reader.read_tex_coords(0).map(|v| v.into_f32()) {
                vertices
                    .iter_mut()
                    .zip(tex_coords)
                    .for_each(|(vertex, uv)| vertex.tex_coords = uv);
            }
            bake_transform(&mut vertices, transform);

            let indices: Vec<u32> = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..vertices.len() as u32).collect(),
            };
            let material = primitive.material().index().unwrap_or(default_material);
            meshes.push(Mesh::new(device, name, &vertices, &indices, material));
        }
    }
    for child in node.children() {
        collect_meshes(&child, transform, buffers, device, default_material, meshes);
    }
}

/// Move vertices into the space of `transform`; normals use its inverse transpose.
fn bake_transform(vertices: &mut [ModelVertex], transform: Matrix4<f32>) {
    if transform == Matrix4::identity() {
        return;
    }
    let linear = Matrix3::from_cols(
        transform.x.truncate(),
        transform.y.truncate(),
        transform.z.truncate(),
    );
    let normal_matrix = linear
        .invert()
        .map(|inverse| inverse.transpose())
        .unwrap_or(linear);
    for vertex in vertices {
        let position = transform * Vector3::from(vertex.position).extend(1.0);
        vertex.position = position.truncate().into();
        vertex.normal = (normal_matrix * Vector3::from(vertex.normal)).into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(position: [f32; 3], normal: [f32; 3]) -> ModelVertex {
        ModelVertex {
            position,
            tex_coords: [0.0; 2],
            normal,
        }
    }

    #[test]
    fn baking_translates_positions_but_not_normals() {
        let mut vertices = [vertex([1.0, 0.0, 0.0], [0.0, 1.0, 0.0])];
        bake_transform(
            &mut vertices,
            Matrix4::from_translation(Vector3::new(0.0, 5.0, 0.0)),
        );
        assert_eq!(vertices[0].position, [1.0, 5.0, 0.0]);
        assert_eq!(vertices[0].normal, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn baking_keeps_normals_perpendicular_under_non_uniform_scale() {
        let mut vertices = [vertex([1.0, 1.0, 0.0], [1.0, 1.0, 0.0])];
        bake_transform(&mut vertices, Matrix4::from_nonuniform_scale(2.0, 1.0, 1.0));
        assert_eq!(vertices[0].position, [2.0, 1.0, 0.0]);
        assert_eq!(vertices[0].normal, [0.5, 1.0, 0.0]);
    }

    #[test]
    fn missing_files_name_the_path() {
        let err = futures::executor::block_on(load_binary(Path::new("does/not/exist.gltf")))
            .unwrap_err();
        assert!(format!("{err:#}").contains("does/not/exist.gltf"));
    }
}
