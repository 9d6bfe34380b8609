//! Copy textures back to the CPU, for tests and screenshots.

use anyhow::{Context as _, Result, bail};
use instant::Duration;

use crate::data_structures::texture::Texture;

/// Tightly packed texels of array layer `layer` (mip 0) of `texture`.
///
/// Submits its own copy and blocks on the device until it has finished, so all
/// previously submitted work is complete when this returns.
pub async fn read_texture_layer(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &Texture,
    layer: u32,
) -> Result<Vec<u8>> {
    let format = texture.format();
    let aspect = if format.is_depth_stencil_format() {
        wgpu::TextureAspect::DepthOnly
    } else {
        wgpu::TextureAspect::All
    };
    let Some(texel_size) = format.block_copy_size(Some(aspect)) else {
        bail!("{format:?} cannot be copied to a buffer");
    };
    let (width, height) = (texture.width(), texture.height());
    let unpadded_bytes_per_row = width * texel_size;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

    let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback buffer"),
        size: (padded_bytes_per_row * height) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            aspect,
            texture: &texture.texture,
            mip_level: 0,
            origin: wgpu::Origin3d {
                x: 0,
                y: 0,
                z: layer,
            },
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &output_buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
    let buffer_slice = output_buffer.slice(..);
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        // The receiver is only gone if the caller stopped waiting.
        let _ = tx.send(result);
    });
    device.poll(wgpu::PollType::Wait {
        submission_index: None,
        timeout: Some(Duration::from_secs(5)),
    })?;
    rx.receive()
        .await
        .context("buffer mapping was cancelled")?
        .context("failed to map the readback buffer")?;

    let mut texels = Vec::with_capacity((unpadded_bytes_per_row * height) as usize);
    {
        let data = buffer_slice.get_mapped_range();
        for row in data.chunks(padded_bytes_per_row as usize) {
            texels.extend_from_slice(&row[..unpadded_bytes_per_row as usize]);
        }
    }
    output_buffer.unmap();
    Ok(texels)
}

/// Texels of an `Rgba16Float` texture layer as `f32`.
pub async fn read_rgba16f(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &Texture,
    layer: u32,
) -> Result<Vec<[f32; 4]>> {
    if texture.format() != wgpu::TextureFormat::Rgba16Float {
        bail!("expected Rgba16Float, got {:?}", texture.format());
    }
    let bytes = read_texture_layer(device, queue, texture, layer).await?;
    Ok(bytes
        .chunks_exact(8)
        .map(|texel| {
            [0, 1, 2, 3].map(|channel| {
                half::f16::from_le_bytes([texel[2 * channel], texel[2 * channel + 1]]).to_f32()
            })
        })
        .collect())
}

/// Values of a `Depth32Float` texture.
pub async fn read_depth(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &Texture,
) -> Result<Vec<f32>> {
    if texture.format() != Texture::DEPTH_FORMAT {
        bail!("expected {:?}, got {:?}", Texture::DEPTH_FORMAT, texture.format());
    }
    let bytes = read_texture_layer(device, queue, texture, 0).await?;
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// An 8-bit RGBA texture as an image.
pub async fn read_rgba8(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &Texture,
) -> Result<image::RgbaImage> {
    match texture.format() {
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => (),
        other => bail!("expected an Rgba8 texture, got {other:?}"),
    }
    let bytes = read_texture_layer(device, queue, texture, 0).await?;
    image::RgbaImage::from_raw(texture.width(), texture.height(), bytes)
        .context("readback size does not match the texture")
}
