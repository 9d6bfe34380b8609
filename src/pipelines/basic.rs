use crate::{data_structures::texture::Texture, pipelines::PipelineKey};

/// Fixed-function settings of a pipeline that do not come from the state flags.
#[derive(Clone, Debug)]
pub struct PipelineSpec {
    /// `None` builds a pipeline without fragment stage (depth only).
    pub color_format: Option<wgpu::TextureFormat>,
    pub sample_count: u32,
    pub depth_format: Option<wgpu::TextureFormat>,
    pub depth_compare: wgpu::CompareFunction,
    pub topology: wgpu::PrimitiveTopology,
    pub vertex_layouts: Vec<wgpu::VertexBufferLayout<'static>>,
    pub blend: Option<wgpu::BlendState>,
}

impl PipelineSpec {
    /// Single-sampled, depth tested, no colour output.
    pub fn offscreen() -> Self {
        Self {
            color_format: None,
            sample_count: 1,
            depth_format: Some(Texture::DEPTH_FORMAT),
            depth_compare: wgpu::CompareFunction::Less,
            topology: wgpu::PrimitiveTopology::TriangleList,
            vertex_layouts: Vec::new(),
            blend: Some(wgpu::BlendState::REPLACE),
        }
    }
}

pub fn mk_render_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    key: PipelineKey,
    spec: &PipelineSpec,
    shader: wgpu::ShaderModuleDescriptor,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(shader);
    let targets = [spec.color_format.map(|format| wgpu::ColorTargetState {
        format,
        blend: spec.blend,
        write_mask: wgpu::ColorWrites::ALL,
    })];
    let label = format!("{:?} pipeline", key);

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: Some(&label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &spec.vertex_layouts,
            compilation_options: Default::default(),
        },
        fragment: spec.color_format.map(|_| wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &targets,
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: spec.topology,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: key.backface_culling.then_some(wgpu::Face::Back),
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: spec.depth_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: key.depth_write,
            depth_compare: spec.depth_compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: spec.sample_count,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview_mask: None,
    })
}
