//! Background compilation of the vertex/fragment pair.
//!
//! A [`CompileTask`] owns the arena with both sources already loaded. When it
//! runs, each stage is compiled once into a zeroed scratch buffer and the
//! result is copied into an exactly sized arena region. The arena travels back
//! to the render loop inside the [`CompiledProgram`], so the compiled bytes are
//! only reachable after the outcome has been received.

use std::thread::{self, JoinHandle};

use crate::arena::{Arena, ArenaError, ArenaRegion};
use crate::compiler::{CompileRequest, CrossCompiler};
use crate::handshake::WorkerLink;
use crate::source::{ShaderSource, ShaderStage};
use crate::target::{CompileTarget, TargetResolution, UnresolvedTarget};

/// Size of the buffer the cross-compiler writes into.
pub const DEFAULT_SCRATCH_CAPACITY: usize = 32 * 1024;

pub type CompileOutcome = Result<CompiledProgram, CompileError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Arena(#[from] ArenaError),
    #[error("{stage} shader failed to compile with {errors} error(s): {diagnostic}")]
    Shader {
        stage: ShaderStage,
        errors: u32,
        diagnostic: String,
    },
    #[error(transparent)]
    UnresolvedTarget(#[from] UnresolvedTarget),
    #[error("{stage} shader source is not valid UTF-8")]
    InvalidSource { stage: ShaderStage },
    #[error("render loop went away before compilation started")]
    Cancelled,
}

impl CompileError {
    /// Stage the error is attributed to, when there is one.
    pub fn stage(&self) -> Option<ShaderStage> {
        match self {
            CompileError::Shader { stage, .. } | CompileError::InvalidSource { stage } => {
                Some(*stage)
            }
            _ => None,
        }
    }
}

/// Compiled bytes for one stage, living in the program's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompiledShader {
    stage: ShaderStage,
    region: ArenaRegion,
}

impl CompiledShader {
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn len(&self) -> usize {
        self.region.len()
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    pub fn region(&self) -> ArenaRegion {
        self.region
    }
}

/// Result of a successful compile cycle.
#[derive(Debug)]
pub struct CompiledProgram {
    arena: Arena,
    target: CompileTarget,
    vertex: CompiledShader,
    fragment: CompiledShader,
}

impl CompiledProgram {
    pub fn target(&self) -> CompileTarget {
        self.target
    }

    pub fn shader(&self, stage: ShaderStage) -> CompiledShader {
        match stage {
            ShaderStage::Vertex => self.vertex,
            ShaderStage::Fragment => self.fragment,
        }
    }

    pub fn bytes(&self, stage: ShaderStage) -> &[u8] {
        self.arena.bytes(self.shader(stage).region)
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }
}

pub struct CompileTask {
    arena: Arena,
    vertex: ShaderSource,
    fragment: ShaderSource,
    target: TargetResolution,
    compiler: Box<dyn CrossCompiler>,
    scratch: Vec<u8>,
}

impl CompileTask {
    pub fn new(
        arena: Arena,
        vertex: ShaderSource,
        fragment: ShaderSource,
        target: TargetResolution,
        compiler: Box<dyn CrossCompiler>,
    ) -> Self {
        Self {
            arena,
            vertex,
            fragment,
            target,
            compiler,
            scratch: vec![0u8; DEFAULT_SCRATCH_CAPACITY],
        }
    }

    pub fn with_scratch_capacity(mut self, capacity: usize) -> Self {
        self.scratch = vec![0u8; capacity];
        self
    }

    /// Compiles both stages on the current thread.
    pub fn run(mut self) -> CompileOutcome {
        let target = self.target.target()?;
        let vertex = self.compile_stage(&target, self.vertex)?;
        let fragment = self.compile_stage(&target, self.fragment)?;
        tracing::debug!(
            language = %target.language,
            vertex_bytes = vertex.len(),
            fragment_bytes = fragment.len(),
            arena_used = self.arena.used(),
            "shader pair compiled"
        );
        Ok(CompiledProgram {
            arena: self.arena,
            target,
            vertex,
            fragment,
        })
    }

    /// Runs the task on a dedicated thread once the render loop signals start.
    pub fn spawn(self, link: WorkerLink) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("shader-compile".to_string())
            .spawn(move || {
                if link.wait_for_start().is_err() {
                    tracing::debug!("render loop dropped before start; compile task exiting");
                    return;
                }
                let outcome = self.run();
                if let Err(err) = &outcome {
                    tracing::debug!(error = %err, "compile task failed");
                }
                link.publish(outcome);
            })
    }

    fn compile_stage(
        &mut self,
        target: &CompileTarget,
        source: ShaderSource,
    ) -> Result<CompiledShader, CompileError> {
        let stage = source.stage();
        let text = source
            .text(&self.arena)
            .ok_or(CompileError::InvalidSource { stage })?;

        self.scratch.fill(0);
        let report = self.compiler.compile(
            &CompileRequest {
                source: text,
                system: target.system_id(),
                target: target.language,
                stage,
            },
            &mut self.scratch,
        );

        if !report.is_success() {
            tracing::debug!(%stage, source = text, "rejected shader source");
            return Err(CompileError::Shader {
                stage,
                errors: report.errors,
                diagnostic: report.log,
            });
        }
        if report.length > self.scratch.len() {
            return Err(CompileError::Shader {
                stage,
                errors: 1,
                diagnostic: format!(
                    "compiler reported {} bytes for a {} byte buffer",
                    report.length,
                    self.scratch.len()
                ),
            });
        }

        let region = self.arena.allocate_copy(&self.scratch[..report.length])?;
        tracing::debug!(%stage, bytes = report.length, "compiled shader stage");
        Ok(CompiledShader { stage, region })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::compiler::CompileReport;
    use crate::source::store_source;
    use crate::target::{resolve, GraphicsBackend, Platform};

    /// Cross-compiler stand-in that echoes a stage-tagged payload.
    pub(crate) struct ScriptedCompiler {
        pub calls: Arc<Mutex<Vec<ShaderStage>>>,
        pub fail_stage: Option<(ShaderStage, u32)>,
        pub output_len: usize,
    }

    impl ScriptedCompiler {
        pub(crate) fn new() -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                fail_stage: None,
                output_len: 8,
            }
        }
    }

    impl CrossCompiler for ScriptedCompiler {
        fn compile(&mut self, request: &CompileRequest<'_>, output: &mut [u8]) -> CompileReport {
            self.calls.lock().unwrap().push(request.stage);
            if let Some((stage, errors)) = self.fail_stage {
                if stage == request.stage {
                    return CompileReport::failure(errors, "scripted failure");
                }
            }
            let fill = match request.stage {
                ShaderStage::Vertex => b'v',
                ShaderStage::Fragment => b'f',
            };
            output[..self.output_len].fill(fill);
            CompileReport::success(self.output_len)
        }
    }

    pub(crate) fn task_with(
        compiler: impl CrossCompiler + 'static,
        arena_capacity: usize,
    ) -> CompileTask {
        let mut arena = Arena::with_capacity(arena_capacity);
        let vertex = store_source(&mut arena, b"vertex", ShaderStage::Vertex).unwrap();
        let fragment = store_source(&mut arena, b"fragment", ShaderStage::Fragment).unwrap();
        CompileTask::new(
            arena,
            vertex,
            fragment,
            resolve(Platform::Linux, GraphicsBackend::Vulkan),
            Box::new(compiler),
        )
    }

    #[test]
    fn compiles_each_stage_exactly_once() {
        let compiler = ScriptedCompiler::new();
        let calls = compiler.calls.clone();
        let program = task_with(compiler, 256).run().unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec![ShaderStage::Vertex, ShaderStage::Fragment]
        );
        assert_eq!(program.bytes(ShaderStage::Vertex), b"vvvvvvvv");
        assert_eq!(program.bytes(ShaderStage::Fragment), b"ffffffff");
        assert_eq!(program.target().language_id(), "spirv");

        let vertex = program.shader(ShaderStage::Vertex).region();
        let fragment = program.shader(ShaderStage::Fragment).region();
        assert!(vertex.end() <= fragment.offset());
    }

    #[test]
    fn fragment_errors_surface_as_shader_error() {
        let mut compiler = ScriptedCompiler::new();
        compiler.fail_stage = Some((ShaderStage::Fragment, 2));
        let err = task_with(compiler, 256).run().unwrap_err();

        assert_eq!(
            err,
            CompileError::Shader {
                stage: ShaderStage::Fragment,
                errors: 2,
                diagnostic: "scripted failure".to_string(),
            }
        );
        assert_eq!(err.stage(), Some(ShaderStage::Fragment));
    }

    #[test]
    fn arena_exhaustion_is_recoverable() {
        let mut compiler = ScriptedCompiler::new();
        compiler.output_len = 64;
        // Sources take 16 bytes, leaving room for one 64 byte stage only.
        let err = task_with(compiler, 100).run().unwrap_err();
        assert!(matches!(
            err,
            CompileError::Arena(ArenaError::CapacityExceeded { requested: 64, .. })
        ));
    }

    #[test]
    fn unresolved_target_never_reaches_the_compiler() {
        let compiler = ScriptedCompiler::new();
        let calls = compiler.calls.clone();
        let mut task = task_with(compiler, 256);
        task.target = resolve(Platform::Linux, GraphicsBackend::Metal);

        let err = task.run().unwrap_err();
        assert!(matches!(err, CompileError::UnresolvedTarget(_)));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn invalid_utf8_source_is_rejected() {
        let mut arena = Arena::with_capacity(64);
        let vertex = store_source(&mut arena, &[0xff, 0xfe], ShaderStage::Vertex).unwrap();
        let fragment = store_source(&mut arena, b"ok", ShaderStage::Fragment).unwrap();
        let task = CompileTask::new(
            arena,
            vertex,
            fragment,
            resolve(Platform::Linux, GraphicsBackend::Vulkan),
            Box::new(ScriptedCompiler::new()),
        );
        assert_eq!(
            task.run().unwrap_err(),
            CompileError::InvalidSource {
                stage: ShaderStage::Vertex
            }
        );
    }
}
