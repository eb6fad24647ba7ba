//! `wgpu` implementation of [`GpuBackend`].
//!
//! - `context` owns instance/device/surface wiring and rebuilds the swapchain
//!   when the window resizes.
//! - `pipeline` turns the backend-neutral [`PipelineSpec`] into a render
//!   pipeline with the constant block bound at set 0, binding 0.
//!
//! - `reflect` reads the constant block layout back out of the SPIR-V so named
//!   constants land where the shader expects them.
//!
//! Only SPIR-V is consumed. The GLSL naga writes targets OpenGL drivers (no
//! descriptor bindings, GL clip space), so it, like ESSL, Metal and Direct3D
//! output, is rejected with [`PipelineError::UnsupportedTarget`].

mod context;
mod pipeline;
mod reflect;

use std::borrow::Cow;
use std::sync::Arc;

use anyhow::Result;
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::activation::{DrawCall, GpuBackend, PipelineError};
use crate::source::ShaderStage;
use crate::target::{CompileTarget, TargetLanguage};
use crate::types::{ConstantLocation, PipelineSpec, Vertex};

use context::GpuContext;
use pipeline::ShaderPipeline;
use reflect::ConstantLayout;

const SPIRV_MAGIC: u32 = 0x0723_0203;

pub struct WgpuModule {
    stage: ShaderStage,
    module: wgpu::ShaderModule,
    constants: ConstantLayout,
}

pub struct WgpuPipeline {
    inner: ShaderPipeline,
    constants: ConstantLayout,
}

pub struct WgpuGeometry {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
}

pub struct WgpuBackend {
    context: GpuContext,
    constant_layout: wgpu::BindGroupLayout,
    clear_color: wgpu::Color,
}

impl WgpuBackend {
    pub fn new(window: Arc<Window>) -> Result<Self> {
        let context = GpuContext::new(window)?;
        let constant_layout = pipeline::constant_layout(&context.device);
        Ok(Self {
            context,
            constant_layout,
            clear_color: wgpu::Color::BLACK,
        })
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.context.size
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.context.resize(new_size);
    }

    fn module_words(
        target: CompileTarget,
        stage: ShaderStage,
        code: &[u8],
    ) -> Result<Vec<u32>, PipelineError> {
        match target.language {
            TargetLanguage::SpirV => spirv_words(stage, code),
            language => Err(PipelineError::UnsupportedTarget { language }),
        }
    }
}

fn spirv_words(stage: ShaderStage, code: &[u8]) -> Result<Vec<u32>, PipelineError> {
    if code.len() % 4 != 0 {
        return Err(PipelineError::Module {
            stage,
            message: format!("SPIR-V length {} is not a multiple of 4", code.len()),
        });
    }
    let words: Vec<u32> = code
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    if words.first() != Some(&SPIRV_MAGIC) {
        return Err(PipelineError::Module {
            stage,
            message: "missing SPIR-V magic number".to_string(),
        });
    }
    Ok(words)
}

impl GpuBackend for WgpuBackend {
    type Module = WgpuModule;
    type Pipeline = WgpuPipeline;
    type Geometry = WgpuGeometry;
    type FrameError = wgpu::SurfaceError;

    fn create_module(
        &mut self,
        target: CompileTarget,
        stage: ShaderStage,
        code: &[u8],
    ) -> Result<WgpuModule, PipelineError> {
        let words = Self::module_words(target, stage, code)?;
        let constants = ConstantLayout::from_spirv(&words).map_err(|err| PipelineError::Module {
            stage,
            message: format!("unreadable SPIR-V: {err}"),
        })?;
        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(match stage {
                ShaderStage::Vertex => "shader vertex",
                ShaderStage::Fragment => "shader fragment",
            }),
            source: wgpu::ShaderSource::SpirV(Cow::Owned(words)),
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(PipelineError::Module {
                stage,
                message: err.to_string(),
            });
        }
        tracing::debug!(
            %stage,
            language = %target.language,
            bytes = code.len(),
            "created shader module"
        );
        Ok(WgpuModule {
            stage,
            module,
            constants,
        })
    }

    fn create_pipeline(
        &mut self,
        vertex: &WgpuModule,
        fragment: &WgpuModule,
        spec: &PipelineSpec,
    ) -> Result<WgpuPipeline, PipelineError> {
        debug_assert_eq!(vertex.stage, ShaderStage::Vertex);
        debug_assert_eq!(fragment.stage, ShaderStage::Fragment);
        let inner = ShaderPipeline::new(
            &self.context.device,
            &self.constant_layout,
            self.context.surface_format,
            vertex,
            fragment,
            spec,
        )?;
        let mut constants = vertex.constants.clone();
        constants.merge(&fragment.constants);
        Ok(WgpuPipeline { inner, constants })
    }

    fn constant_location(&self, pipeline: &WgpuPipeline, name: &str) -> Option<ConstantLocation> {
        pipeline.constants.get(name)
    }

    fn create_geometry(
        &mut self,
        vertices: &[Vertex],
        indices: &[u16],
    ) -> Result<WgpuGeometry, PipelineError> {
        if vertices.is_empty() || indices.is_empty() {
            return Err(PipelineError::Geometry(
                "geometry needs at least one vertex and index".to_string(),
            ));
        }
        let device = &self.context.device;
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("triangle vertices"),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("triangle indices"),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Ok(WgpuGeometry {
            vertices: vertex_buffer,
            indices: index_buffer,
        })
    }

    fn submit_frame(
        &mut self,
        draw: Option<DrawCall<'_, Self>>,
    ) -> Result<(), wgpu::SurfaceError> {
        let context = &self.context;
        if let Some(draw) = &draw {
            context.queue.write_buffer(
                &draw.pipeline.inner.constant_buffer,
                0,
                draw.constants.as_bytes(),
            );
        }

        let frame = context.surface.get_current_texture()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("frame pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            if let Some(draw) = &draw {
                render_pass.set_pipeline(&draw.pipeline.inner.pipeline);
                render_pass.set_bind_group(0, &draw.pipeline.inner.constant_bind_group, &[]);
                render_pass.set_vertex_buffer(0, draw.geometry.vertices.slice(..));
                render_pass.set_index_buffer(
                    draw.geometry.indices.slice(..),
                    wgpu::IndexFormat::Uint16,
                );
                render_pass.draw_indexed(0..draw.index_count, 0, 0..1);
            }
        }

        context.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CompileRequest, CrossCompiler, NagaCompiler, DEFAULT_FRAGMENT_SHADER};
    use crate::target::Platform;

    fn target(language: TargetLanguage) -> CompileTarget {
        CompileTarget {
            platform: Platform::Linux,
            language,
        }
    }

    #[test]
    fn spirv_words_require_magic_and_alignment() {
        let mut code = SPIRV_MAGIC.to_le_bytes().to_vec();
        code.extend_from_slice(&[1, 0, 0, 0]);
        assert_eq!(spirv_words(ShaderStage::Vertex, &code).unwrap(), vec![SPIRV_MAGIC, 1]);

        assert!(matches!(
            spirv_words(ShaderStage::Vertex, &code[..6]),
            Err(PipelineError::Module { .. })
        ));
        assert!(matches!(
            spirv_words(ShaderStage::Fragment, &[0, 0, 0, 0]),
            Err(PipelineError::Module {
                stage: ShaderStage::Fragment,
                ..
            })
        ));
    }

    #[test]
    fn only_spirv_output_is_consumed() {
        for language in [
            TargetLanguage::Glsl,
            TargetLanguage::Essl,
            TargetLanguage::Metal,
            TargetLanguage::D3D11,
            TargetLanguage::D3D9,
        ] {
            let result = WgpuBackend::module_words(target(language), ShaderStage::Vertex, b"blob");
            assert!(matches!(
                result,
                Err(PipelineError::UnsupportedTarget { language: l }) if l == language
            ));
        }
    }

    #[test]
    fn naga_output_is_routed_by_language() {
        let compile = |language| {
            let mut output = vec![0u8; 32 * 1024];
            let report = NagaCompiler::new().compile(
                &CompileRequest {
                    source: DEFAULT_FRAGMENT_SHADER,
                    system: "linux",
                    target: language,
                    stage: ShaderStage::Fragment,
                },
                &mut output,
            );
            assert!(report.is_success(), "{}", report.log);
            output.truncate(report.length);
            output
        };

        let glsl = compile(TargetLanguage::Glsl);
        assert!(matches!(
            WgpuBackend::module_words(target(TargetLanguage::Glsl), ShaderStage::Fragment, &glsl),
            Err(PipelineError::UnsupportedTarget {
                language: TargetLanguage::Glsl
            })
        ));

        let spirv = compile(TargetLanguage::SpirV);
        let words =
            WgpuBackend::module_words(target(TargetLanguage::SpirV), ShaderStage::Fragment, &spirv)
                .unwrap();
        let layout = ConstantLayout::from_spirv(&words).unwrap();
        assert!(layout.get("sg_mouse").is_some());
    }
}
