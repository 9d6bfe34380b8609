//! Reference grid on the ground plane.

use wgpu::util::DeviceExt;

use crate::{config::GridConfig, data_structures::model::Vertex};

const CENTER_COLOR: [f32; 3] = [0.5, 0.5, 0.5];
const LINE_COLOR: [f32; 3] = [0.75, 0.75, 0.75];

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LineVertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex for LineVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
            wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<LineVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

/// `slices + 1` lines along each axis, `spacing` apart, centred on the origin.
/// The two lines through the origin are darker.
pub fn grid_lines(config: &GridConfig) -> Vec<LineVertex> {
    let half = (config.slices / 2) as f32 * config.spacing;
    let mut vertices = Vec::with_capacity((config.slices as usize + 1) * 4);
    for i in 0..=config.slices {
        let offset = -half + i as f32 * config.spacing;
        let color = if i == config.slices / 2 {
            CENTER_COLOR
        } else {
            LINE_COLOR
        };
        vertices.extend_from_slice(&[
            LineVertex {
                position: [offset, 0.0, -half],
                color,
            },
            LineVertex {
                position: [offset, 0.0, half],
                color,
            },
            LineVertex {
                position: [-half, 0.0, offset],
                color,
            },
            LineVertex {
                position: [half, 0.0, offset],
                color,
            },
        ]);
    }
    vertices
}

#[derive(Debug)]
pub struct Grid {
    pub vertex_buffer: wgpu::Buffer,
    pub vertex_count: u32,
}

impl Grid {
    pub fn new(device: &wgpu::Device, config: &GridConfig) -> Self {
        let vertices = grid_lines(config);
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Grid Vertex Buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        Self {
            vertex_buffer,
            vertex_count: vertices.len() as u32,
        }
    }

    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.draw(0..self.vertex_count, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_spans_slices_times_spacing() {
        let config = GridConfig {
            slices: 20,
            spacing: 10.0,
        };
        let lines = grid_lines(&config);
        assert_eq!(lines.len(), 21 * 4);
        let max = lines
            .iter()
            .flat_map(|v| [v.position[0], v.position[2]])
            .fold(f32::MIN, f32::max);
        assert_eq!(max, 100.0);
        assert!(lines.iter().all(|v| v.position[1] == 0.0));
    }

    #[test]
    fn only_the_axes_are_dark() {
        let lines = grid_lines(&GridConfig {
            slices: 4,
            spacing: 1.0,
        });
        let dark: Vec<_> = lines.iter().filter(|v| v.color == CENTER_COLOR).collect();
        assert_eq!(dark.len(), 4);
        assert!(dark.iter().all(|v| v.position[0] == 0.0 || v.position[2] == 0.0));
    }
}
