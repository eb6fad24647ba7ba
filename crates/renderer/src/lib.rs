//! Asynchronous shader cross-compilation and pipeline activation.
//!
//! GLSL sources are loaded into an [`arena::Arena`], compiled off the render
//! thread for the configured platform/backend pair, and handed back to the
//! render loop, which builds the GPU pipeline exactly once:
//!
//! ```text
//!   RendererConfig
//!        │ load sources, resolve target
//!        ▼
//!   CompileTask ──(thread "shader-compile")──▶ CrossCompiler (naga)
//!        ▲ start                                   │
//!        │                                         ▼ done(CompileOutcome)
//!   RenderState::frame ◀── bounded poll ── handshake
//!        │
//!        └─▶ GpuBackend: modules, pipeline, geometry, draw
//! ```
//!
//! Frames keep flowing while compilation is in flight; they only clear the
//! surface until the pipeline is ready. [`Renderer::compile`] runs the same
//! worker headless and writes the compiled artifacts without opening a window.

pub mod activation;
pub mod arena;
pub mod artifacts;
pub mod bootstrap;
pub mod compiler;
pub mod gpu;
pub mod handshake;
pub mod source;
pub mod target;
pub mod task;
pub mod types;
mod window;

use std::path::PathBuf;

use anyhow::{Context, Result};

pub use activation::{ActivationError, ActivationPhase, GpuBackend, PipelineError, RenderState};
pub use artifacts::ArtifactStore;
pub use compiler::{CrossCompiler, NagaCompiler};
pub use source::ShaderStage;
pub use target::{GraphicsBackend, Platform, TargetLanguage};
pub use task::{CompileError, CompiledProgram};
pub use types::{RendererConfig, ShaderInput};

/// Entry point for the windowed and headless paths.
pub struct Renderer {
    config: RendererConfig,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Opens the window and renders until it is closed.
    pub fn run(&mut self) -> Result<()> {
        window::run(&self.config)
    }

    /// Compiles both stages without a GPU and persists the results.
    ///
    /// Returns the paths that were written. A compile failure is an error;
    /// individual file write failures, and artifacts that would replace a
    /// shader input, are logged and left out of the result.
    pub fn compile(&self) -> Result<Vec<PathBuf>> {
        let program = bootstrap::compile_blocking(&self.config, Box::new(NagaCompiler::new()))?
            .context("shader compilation failed")?;
        tracing::info!(
            language = %program.target().language,
            vertex_bytes = program.bytes(ShaderStage::Vertex).len(),
            fragment_bytes = program.bytes(ShaderStage::Fragment).len(),
            "compiled shader pair"
        );

        let Some(store) = self.config.artifact_store() else {
            tracing::warn!("artifact output disabled; compiled shaders were discarded");
            return Ok(Vec::new());
        };
        Ok(store.persist_logged(&program))
    }
}
