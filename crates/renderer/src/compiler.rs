//! Cross-compiler seam and the naga-backed implementation.
//!
//! The compile task only relies on the [`CrossCompiler`] contract: the
//! compiler writes its output into a caller-supplied buffer and reports an
//! error count. A positive count means failure and the log explains why.

use crate::source::ShaderStage;
use crate::target::TargetLanguage;

/// Everything the cross-compiler needs for one stage.
#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    pub source: &'a str,
    pub system: &'a str,
    pub target: TargetLanguage,
    pub stage: ShaderStage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileReport {
    /// Number of errors; anything above zero is a failed compile.
    pub errors: u32,
    /// Bytes written to the output buffer.
    pub length: usize,
    pub log: String,
}

impl CompileReport {
    pub fn success(length: usize) -> Self {
        Self {
            errors: 0,
            length,
            log: String::new(),
        }
    }

    pub fn failure(errors: u32, log: impl Into<String>) -> Self {
        Self {
            errors: errors.max(1),
            length: 0,
            log: log.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors == 0
    }
}

pub trait CrossCompiler: Send {
    /// Compiles `request` into `output`, returning the error count and length.
    fn compile(&mut self, request: &CompileRequest<'_>, output: &mut [u8]) -> CompileReport;
}

impl<C: CrossCompiler + ?Sized> CrossCompiler for Box<C> {
    fn compile(&mut self, request: &CompileRequest<'_>, output: &mut [u8]) -> CompileReport {
        (**self).compile(request, output)
    }
}

/// Compiles Vulkan-flavoured GLSL through naga.
///
/// Supported targets are SPIR-V, desktop GLSL 4.50, ESSL 3.10 and MSL. naga
/// cannot produce Direct3D bytecode, so those targets always report an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct NagaCompiler;

impl NagaCompiler {
    pub fn new() -> Self {
        Self
    }

    fn translate(&self, request: &CompileRequest<'_>) -> Result<Vec<u8>, (u32, String)> {
        let stage = request.stage.to_naga();
        let mut frontend = naga::front::glsl::Frontend::default();
        let module = frontend
            .parse(&naga::front::glsl::Options::from(stage), request.source)
            .map_err(|err| (err.errors.len() as u32, err.to_string()))?;

        let info = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module)
        .map_err(|err| (1, format!("validation failed: {err}")))?;

        match request.target {
            TargetLanguage::SpirV => {
                // Member names let the consumer locate constants by name.
                let mut options = naga::back::spv::Options::default();
                options.flags |= naga::back::spv::WriterFlags::DEBUG;
                let words = naga::back::spv::write_vec(&module, &info, &options, None)
                .map_err(|err| (1, format!("SPIR-V output failed: {err}")))?;
                Ok(bytemuck::cast_slice::<u32, u8>(&words).to_vec())
            }
            TargetLanguage::Glsl | TargetLanguage::Essl => {
                let version = if request.target == TargetLanguage::Glsl {
                    naga::back::glsl::Version::Desktop(450)
                } else {
                    naga::back::glsl::Version::Embedded {
                        version: 310,
                        is_webgl: false,
                    }
                };
                let options = naga::back::glsl::Options {
                    version,
                    ..Default::default()
                };
                let pipeline_options = naga::back::glsl::PipelineOptions {
                    shader_stage: stage,
                    entry_point: "main".to_string(),
                    multiview: None,
                };
                let mut text = String::new();
                let mut writer = naga::back::glsl::Writer::new(
                    &mut text,
                    &module,
                    &info,
                    &options,
                    &pipeline_options,
                    naga::proc::BoundsCheckPolicies::default(),
                )
                .map_err(|err| (1, format!("GLSL output failed: {err}")))?;
                writer
                    .write()
                    .map_err(|err| (1, format!("GLSL output failed: {err}")))?;
                Ok(text.into_bytes())
            }
            TargetLanguage::Metal => {
                let (text, _) = naga::back::msl::write_string(
                    &module,
                    &info,
                    &naga::back::msl::Options::default(),
                    &naga::back::msl::PipelineOptions::default(),
                )
                .map_err(|err| (1, format!("MSL output failed: {err}")))?;
                Ok(text.into_bytes())
            }
            TargetLanguage::D3D11 | TargetLanguage::D3D9 => Err((
                1,
                format!(
                    "{} bytecode cannot be produced by naga; use the platform shader compiler",
                    request.target
                ),
            )),
        }
    }
}

impl CrossCompiler for NagaCompiler {
    fn compile(&mut self, request: &CompileRequest<'_>, output: &mut [u8]) -> CompileReport {
        let compiled = match self.translate(request) {
            Ok(bytes) => bytes,
            Err((errors, log)) => return CompileReport::failure(errors, log),
        };
        if compiled.len() > output.len() {
            return CompileReport::failure(
                1,
                format!(
                    "compiled {} shader is {} bytes but the output buffer holds {}",
                    request.stage,
                    compiled.len(),
                    output.len()
                ),
            );
        }
        output[..compiled.len()].copy_from_slice(&compiled);
        tracing::trace!(
            system = request.system,
            language = %request.target,
            stage = request.stage.tag(),
            bytes = compiled.len(),
            "naga translated shader"
        );
        CompileReport::success(compiled.len())
    }
}

/// Full-screen triangle vertex shader fed by the static geometry buffer.
pub const DEFAULT_VERTEX_SHADER: &str = r"#version 450
layout(location = 0) in vec2 vertex_position;
layout(location = 1) in vec2 vertex_uv;
layout(location = 0) out vec2 frag_uv;

void main() {
    frag_uv = vertex_uv;
    gl_Position = vec4(vertex_position, 0.0, 1.0);
}
";

/// Fragment shader reading the named constant block.
///
/// The block layout matches [`crate::types::CONSTANT_SLOTS`]; other layouts
/// are located by member name when the pipeline is built.
pub const DEFAULT_FRAGMENT_SHADER: &str = r"#version 450
layout(location = 0) in vec2 frag_uv;
layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform Constants {
    vec4 sg_data[4];
    vec2 i_resolution;
    vec2 sg_mouse;
    vec2 sg_alpha;
    float i_time;
} constants;

void main() {
    vec2 resolution = max(constants.i_resolution, vec2(1.0));
    vec2 p = gl_FragCoord.xy / resolution;
    vec2 mouse = constants.sg_mouse / resolution;
    float wave = 0.5 + 0.5 * sin(constants.i_time + frag_uv.x * 6.2831853);
    float glow = 1.0 - clamp(length(p - mouse), 0.0, 1.0);
    vec3 color = mix(constants.sg_data[3].yzw, constants.sg_data[2].zwx, frag_uv.y * wave);
    color += vec3(0.15) * glow;
    out_color = vec4(color, constants.sg_alpha.x);
}
";

#[cfg(test)]
mod tests {
    use super::*;

    const SCRATCH: usize = 32 * 1024;

    fn compile(source: &str, target: TargetLanguage, stage: ShaderStage) -> (CompileReport, Vec<u8>) {
        let mut output = vec![0u8; SCRATCH];
        let report = NagaCompiler::new().compile(
            &CompileRequest {
                source,
                system: "linux",
                target,
                stage,
            },
            &mut output,
        );
        output.truncate(report.length);
        (report, output)
    }

    #[test]
    fn default_shaders_compile_to_spirv() {
        for (source, stage) in [
            (DEFAULT_VERTEX_SHADER, ShaderStage::Vertex),
            (DEFAULT_FRAGMENT_SHADER, ShaderStage::Fragment),
        ] {
            let (report, bytes) = compile(source, TargetLanguage::SpirV, stage);
            assert!(report.is_success(), "{stage}: {}", report.log);
            assert_eq!(bytes.len() % 4, 0);
            assert_eq!(&bytes[..4], &0x0723_0203u32.to_ne_bytes());
        }
    }

    #[test]
    fn text_targets_emit_source() {
        let (report, bytes) = compile(
            DEFAULT_FRAGMENT_SHADER,
            TargetLanguage::Glsl,
            ShaderStage::Fragment,
        );
        assert!(report.is_success(), "{}", report.log);
        assert!(String::from_utf8(bytes).unwrap().starts_with("#version 450"));

        let (report, bytes) = compile(
            DEFAULT_VERTEX_SHADER,
            TargetLanguage::Metal,
            ShaderStage::Vertex,
        );
        assert!(report.is_success(), "{}", report.log);
        assert!(String::from_utf8(bytes).unwrap().contains("metal"));
    }

    #[test]
    fn translation_is_deterministic() {
        let first = compile(DEFAULT_FRAGMENT_SHADER, TargetLanguage::SpirV, ShaderStage::Fragment);
        let second = compile(DEFAULT_FRAGMENT_SHADER, TargetLanguage::SpirV, ShaderStage::Fragment);
        assert_eq!(first, second);
    }

    #[test]
    fn broken_source_reports_errors() {
        let (report, bytes) = compile(
            "#version 450\nvoid main() { undefined_call(); }\n",
            TargetLanguage::SpirV,
            ShaderStage::Fragment,
        );
        assert!(report.errors > 0);
        assert!(!report.log.is_empty());
        assert!(bytes.is_empty());
    }

    #[test]
    fn direct3d_targets_are_rejected() {
        let (report, _) = compile(DEFAULT_VERTEX_SHADER, TargetLanguage::D3D11, ShaderStage::Vertex);
        assert_eq!(report.errors, 1);
        assert!(report.log.contains("d3d11"));
    }

    #[test]
    fn output_larger_than_buffer_fails() {
        let mut output = [0u8; 16];
        let report = NagaCompiler::new().compile(
            &CompileRequest {
                source: DEFAULT_VERTEX_SHADER,
                system: "linux",
                target: TargetLanguage::SpirV,
                stage: ShaderStage::Vertex,
            },
            &mut output,
        );
        assert!(!report.is_success());
        assert!(report.log.contains("output buffer"));
    }
}
