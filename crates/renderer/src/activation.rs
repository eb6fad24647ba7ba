//! Render-loop side of shader activation.
//!
//! [`RenderState`] signals the compile worker on the first frame, polls for the
//! outcome with a bounded wait on every frame after that, and builds the GPU
//! objects exactly once when a compiled program arrives:
//!
//! ```text
//!   AwaitingStart ──start──▶ Compiling ──done(Ok)──▶ Ready
//!                                │
//!                                └──done(Err) / lost──▶ Failed
//! ```
//!
//! Until the state is `Ready` every frame is clear-only. `Ready` and `Failed`
//! are terminal; nothing is rebuilt or rewritten once they are reached.

use std::fmt;
use std::time::Duration;

use crate::artifacts::ArtifactStore;
use crate::handshake::{DonePoll, RenderLink, DEFAULT_POLL_TIMEOUT};
use crate::source::ShaderStage;
use crate::target::{CompileTarget, TargetLanguage};
use crate::task::{CompileError, CompiledProgram};
use crate::types::{
    ConstantBlock, ConstantLocation, PipelineSpec, Vertex, DEFAULT_SCENE_DATA, SCENE_DATA_LEN,
    TRIANGLE_INDICES, TRIANGLE_VERTICES,
};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{language} shaders cannot be consumed by this backend")]
    UnsupportedTarget { language: TargetLanguage },
    #[error("failed to create {stage} shader module: {message}")]
    Module { stage: ShaderStage, message: String },
    #[error("failed to create render pipeline: {0}")]
    Pipeline(String),
    #[error("failed to create geometry buffers: {0}")]
    Geometry(String),
}

/// Why activation ended in [`ActivationPhase::Failed`].
#[derive(Debug, thiserror::Error)]
pub enum ActivationError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("compile worker exited without reporting an outcome")]
    WorkerLost,
}

/// GPU collaborator the activation state machine drives.
pub trait GpuBackend {
    type Module;
    type Pipeline;
    type Geometry;
    type FrameError: std::error::Error;

    fn create_module(
        &mut self,
        target: CompileTarget,
        stage: ShaderStage,
        code: &[u8],
    ) -> Result<Self::Module, PipelineError>;

    fn create_pipeline(
        &mut self,
        vertex: &Self::Module,
        fragment: &Self::Module,
        spec: &PipelineSpec,
    ) -> Result<Self::Pipeline, PipelineError>;

    /// Location of a named constant in the pipeline, if the pipeline has it.
    fn constant_location(&self, pipeline: &Self::Pipeline, name: &str)
        -> Option<ConstantLocation>;

    fn create_geometry(
        &mut self,
        vertices: &[Vertex],
        indices: &[u16],
    ) -> Result<Self::Geometry, PipelineError>;

    /// Clears the target and, when `draw` is present, issues one indexed draw.
    fn submit_frame(&mut self, draw: Option<DrawCall<'_, Self>>) -> Result<(), Self::FrameError>;
}

pub struct DrawCall<'a, B: GpuBackend + ?Sized> {
    pub pipeline: &'a B::Pipeline,
    pub geometry: &'a B::Geometry,
    pub constants: &'a ConstantBlock,
    pub index_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationPhase {
    AwaitingStart,
    Compiling,
    Ready,
    Failed,
}

impl fmt::Display for ActivationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActivationPhase::AwaitingStart => "awaiting-start",
            ActivationPhase::Compiling => "compiling",
            ActivationPhase::Ready => "ready",
            ActivationPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct ActivationOptions {
    pub poll_timeout: Duration,
    pub artifacts: Option<ArtifactStore>,
    pub scene_data: [f32; SCENE_DATA_LEN],
}

impl Default for ActivationOptions {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            artifacts: None,
            scene_data: DEFAULT_SCENE_DATA,
        }
    }
}

/// Per-frame values fed into the named constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInputs {
    pub elapsed: Duration,
    pub resolution: (u32, u32),
    pub mouse: (f32, f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub phase: ActivationPhase,
    /// Whether this frame issued the indexed draw.
    pub drew: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct NamedConstants {
    time: Option<ConstantLocation>,
    resolution: Option<ConstantLocation>,
    data: Option<ConstantLocation>,
    alpha: Option<ConstantLocation>,
    mouse: Option<ConstantLocation>,
}

impl NamedConstants {
    fn lookup<B: GpuBackend>(backend: &B, pipeline: &B::Pipeline) -> Self {
        let find = |name: &str| {
            let location = backend.constant_location(pipeline, name);
            if location.is_none() {
                tracing::warn!(constant = name, "pipeline does not expose constant");
            }
            location
        };
        Self {
            time: find("i_time"),
            resolution: find("i_resolution"),
            data: find("sg_data"),
            alpha: find("sg_alpha"),
            mouse: find("sg_mouse"),
        }
    }
}

struct ActivePipeline<B: GpuBackend> {
    pipeline: B::Pipeline,
    geometry: B::Geometry,
    constants: NamedConstants,
    _vertex: B::Module,
    _fragment: B::Module,
}

enum Phase<B: GpuBackend> {
    AwaitingStart,
    Compiling,
    Ready(ActivePipeline<B>),
    Failed(ActivationError),
}

/// Activation state owned by the render loop.
pub struct RenderState<B: GpuBackend> {
    link: RenderLink,
    phase: Phase<B>,
    options: ActivationOptions,
    constants: ConstantBlock,
}

impl<B: GpuBackend> RenderState<B> {
    pub fn new(link: RenderLink, options: ActivationOptions) -> Self {
        Self {
            link,
            phase: Phase::AwaitingStart,
            options,
            constants: ConstantBlock::new(),
        }
    }

    pub fn phase(&self) -> ActivationPhase {
        match self.phase {
            Phase::AwaitingStart => ActivationPhase::AwaitingStart,
            Phase::Compiling => ActivationPhase::Compiling,
            Phase::Ready(_) => ActivationPhase::Ready,
            Phase::Failed(_) => ActivationPhase::Failed,
        }
    }

    pub fn failure(&self) -> Option<&ActivationError> {
        match &self.phase {
            Phase::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Advances activation and submits one frame.
    pub fn frame(
        &mut self,
        backend: &mut B,
        inputs: &FrameInputs,
    ) -> Result<FrameReport, B::FrameError> {
        self.advance(backend);

        let drew = match &self.phase {
            Phase::Ready(active) => {
                write_constants(&mut self.constants, &active.constants, &self.options, inputs);
                backend.submit_frame(Some(DrawCall {
                    pipeline: &active.pipeline,
                    geometry: &active.geometry,
                    constants: &self.constants,
                    index_count: TRIANGLE_INDICES.len() as u32,
                }))?;
                true
            }
            _ => {
                backend.submit_frame(None)?;
                false
            }
        };

        Ok(FrameReport {
            phase: self.phase(),
            drew,
        })
    }

    fn advance(&mut self, backend: &mut B) {
        if matches!(self.phase, Phase::AwaitingStart) {
            self.link.signal_start();
            self.phase = Phase::Compiling;
            tracing::info!("shader compilation started");
        }
        if !matches!(self.phase, Phase::Compiling) {
            return;
        }

        match self.link.poll_done(self.options.poll_timeout) {
            DonePoll::NotStarted | DonePoll::Pending => {}
            DonePoll::Done(Ok(program)) => match self.activate(backend, program) {
                Ok(active) => {
                    tracing::info!("shader pipeline ready");
                    self.phase = Phase::Ready(active);
                }
                Err(err) => self.fail(err.into()),
            },
            DonePoll::Done(Err(err)) => self.fail(err.into()),
            DonePoll::Disconnected | DonePoll::Consumed => self.fail(ActivationError::WorkerLost),
        }
    }

    fn activate(
        &self,
        backend: &mut B,
        program: CompiledProgram,
    ) -> Result<ActivePipeline<B>, PipelineError> {
        let target = program.target();
        let vertex = backend.create_module(
            target,
            ShaderStage::Vertex,
            program.bytes(ShaderStage::Vertex),
        )?;
        let fragment = backend.create_module(
            target,
            ShaderStage::Fragment,
            program.bytes(ShaderStage::Fragment),
        )?;

        if let Some(store) = &self.options.artifacts {
            store.persist_logged(&program);
        }

        let pipeline = backend.create_pipeline(&vertex, &fragment, &PipelineSpec::standard())?;
        let constants = NamedConstants::lookup(backend, &pipeline);
        let geometry = backend.create_geometry(&TRIANGLE_VERTICES, &TRIANGLE_INDICES)?;

        Ok(ActivePipeline {
            pipeline,
            geometry,
            constants,
            _vertex: vertex,
            _fragment: fragment,
        })
    }

    fn fail(&mut self, err: ActivationError) {
        tracing::error!(error = %err, "shader activation failed; rendering clear frames only");
        self.phase = Phase::Failed(err);
    }
}

fn write_constants(
    block: &mut ConstantBlock,
    named: &NamedConstants,
    options: &ActivationOptions,
    inputs: &FrameInputs,
) {
    let slots = [
        (named.data, &options.scene_data[..]),
        (named.alpha, &[1.0, 1.0][..]),
        (named.mouse, &[inputs.mouse.0, inputs.mouse.1][..]),
        (
            named.resolution,
            &[inputs.resolution.0 as f32, inputs.resolution.1 as f32][..],
        ),
        (named.time, &[inputs.elapsed.as_secs_f32()][..]),
    ];
    for (location, values) in slots {
        if let Some(location) = location {
            block.set(location, values);
        }
    }
}
