use crate::activation::PipelineError;
use crate::types::{BlendFactor, BlendSpec, ConstantBlock, PipelineSpec, VertexFormat};

use super::WgpuModule;

/// Layout of the `Constants` block at set 0, binding 0.
pub(crate) fn constant_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("constants layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: wgpu::BufferSize::new(ConstantBlock::SIZE),
            },
            count: None,
        }],
    })
}

pub(crate) struct ShaderPipeline {
    pub pipeline: wgpu::RenderPipeline,
    pub constant_buffer: wgpu::Buffer,
    pub constant_bind_group: wgpu::BindGroup,
}

impl ShaderPipeline {
    pub fn new(
        device: &wgpu::Device,
        constant_layout: &wgpu::BindGroupLayout,
        surface_format: wgpu::TextureFormat,
        vertex: &WgpuModule,
        fragment: &WgpuModule,
        spec: &PipelineSpec,
    ) -> Result<Self, PipelineError> {
        let constant_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("constants"),
            size: ConstantBlock::SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let constant_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("constants bind group"),
            layout: constant_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: constant_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("shader pipeline layout"),
            bind_group_layouts: &[constant_layout],
            push_constant_ranges: &[],
        });

        let attributes = vertex_attributes(spec);
        let vertex_buffers = [wgpu::VertexBufferLayout {
            array_stride: spec.stride(),
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        }];

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("shader pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex.module,
                entry_point: Some("main"),
                buffers: &vertex_buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment.module,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(blend_state(&spec.blend)),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(PipelineError::Pipeline(err.to_string()));
        }

        Ok(Self {
            pipeline,
            constant_buffer,
            constant_bind_group,
        })
    }
}

fn vertex_attributes(spec: &PipelineSpec) -> Vec<wgpu::VertexAttribute> {
    let mut offset = 0;
    spec.attributes
        .iter()
        .enumerate()
        .map(|(location, attribute)| {
            let format = match attribute.format {
                VertexFormat::Float2 => wgpu::VertexFormat::Float32x2,
            };
            let entry = wgpu::VertexAttribute {
                format,
                offset,
                shader_location: location as u32,
            };
            offset += attribute.format.size();
            entry
        })
        .collect()
}

fn blend_state(spec: &BlendSpec) -> wgpu::BlendState {
    let factor = |factor: BlendFactor| match factor {
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
    };
    wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: factor(spec.color.src),
            dst_factor: factor(spec.color.dst),
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: factor(spec.alpha.src),
            dst_factor: factor(spec.alpha.dst),
            operation: wgpu::BlendOperation::Add,
        },
    }
}
