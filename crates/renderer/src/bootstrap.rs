//! Start-up wiring: load sources, resolve the target, and launch the worker.

use std::thread::JoinHandle;

use anyhow::{anyhow, Context, Result};

use crate::activation::{ActivationOptions, GpuBackend, RenderState};
use crate::arena::Arena;
use crate::compiler::{CrossCompiler, DEFAULT_FRAGMENT_SHADER, DEFAULT_VERTEX_SHADER};
use crate::handshake::{handshake, DonePoll};
use crate::source::{load_source, store_source, ShaderSource, ShaderStage};
use crate::target::resolve;
use crate::task::{CompileOutcome, CompileTask};
use crate::types::{RendererConfig, ShaderInput};

/// Builds the compile task for `config` with both sources loaded.
pub fn prepare_task(
    config: &RendererConfig,
    compiler: Box<dyn CrossCompiler>,
) -> Result<CompileTask> {
    let mut arena = Arena::with_capacity(config.arena_capacity);
    let vertex = load_input(&mut arena, &config.vertex_shader, ShaderStage::Vertex)?;
    let fragment = load_input(&mut arena, &config.fragment_shader, ShaderStage::Fragment)?;

    let target = resolve(config.platform, config.backend);
    match target.target() {
        Ok(target) => tracing::debug!(
            system = target.system_id(),
            language = target.language_id(),
            "resolved shader target"
        ),
        Err(err) => tracing::warn!(error = %err, "shader target is unresolved"),
    }

    Ok(CompileTask::new(arena, vertex, fragment, target, compiler)
        .with_scratch_capacity(config.scratch_capacity))
}

fn load_input(arena: &mut Arena, input: &ShaderInput, stage: ShaderStage) -> Result<ShaderSource> {
    match input {
        ShaderInput::File(path) => Ok(load_source(arena, path, stage)?),
        ShaderInput::Builtin => {
            let text = match stage {
                ShaderStage::Vertex => DEFAULT_VERTEX_SHADER,
                ShaderStage::Fragment => DEFAULT_FRAGMENT_SHADER,
            };
            store_source(arena, text.as_bytes(), stage)
                .with_context(|| format!("no arena space for the built-in {stage} shader"))
        }
    }
}

/// Spawns the compile worker and returns the render-side state that drives it.
pub fn launch<B: GpuBackend>(
    config: &RendererConfig,
    compiler: Box<dyn CrossCompiler>,
) -> Result<(RenderState<B>, JoinHandle<()>)> {
    let task = prepare_task(config, compiler)?;
    let (render, worker) = handshake();
    let handle = task
        .spawn(worker)
        .context("failed to spawn shader compile thread")?;
    let options = ActivationOptions {
        poll_timeout: config.poll_timeout,
        artifacts: config.artifact_store(),
        scene_data: config.scene_data,
    };
    Ok((RenderState::new(render, options), handle))
}

/// Runs one compile cycle through the worker thread and blocks for the result.
pub fn compile_blocking(
    config: &RendererConfig,
    compiler: Box<dyn CrossCompiler>,
) -> Result<CompileOutcome> {
    let task = prepare_task(config, compiler)?;
    let (mut render, worker) = handshake();
    let handle = task
        .spawn(worker)
        .context("failed to spawn shader compile thread")?;

    render.signal_start();
    let outcome = match render.wait_done() {
        DonePoll::Done(outcome) => outcome,
        other => return Err(anyhow!("compile worker ended without an outcome ({other:?})")),
    };
    handle
        .join()
        .map_err(|_| anyhow!("shader compile thread panicked"))?;
    Ok(outcome)
}
