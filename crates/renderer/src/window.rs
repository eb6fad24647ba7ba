use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::{Window, WindowBuilder};

use crate::activation::{ActivationPhase, FrameInputs, RenderState};
use crate::bootstrap;
use crate::compiler::NagaCompiler;
use crate::gpu::WgpuBackend;
use crate::types::RendererConfig;

/// Everything the event loop closure owns.
struct WindowState {
    window: Arc<Window>,
    backend: WgpuBackend,
    render: RenderState<WgpuBackend>,
    mouse: Option<PhysicalPosition<f64>>,
    started: Instant,
    last_phase: ActivationPhase,
}

impl WindowState {
    fn window(&self) -> &Window {
        self.window.as_ref()
    }

    fn size(&self) -> PhysicalSize<u32> {
        self.backend.size()
    }

    fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.backend.resize(new_size);
    }

    fn render_frame(&mut self) -> Result<(), wgpu::SurfaceError> {
        let size = self.size();
        let mouse = self
            .mouse
            .map(|pos| (pos.x as f32, pos.y as f32))
            .unwrap_or_default();
        let inputs = FrameInputs {
            elapsed: self.started.elapsed(),
            resolution: (size.width, size.height),
            mouse,
        };
        let report = self.render.frame(&mut self.backend, &inputs)?;
        if report.phase != self.last_phase {
            tracing::debug!(
                from = %self.last_phase,
                to = %report.phase,
                "activation phase changed"
            );
            self.last_phase = report.phase;
        }
        Ok(())
    }
}

/// Opens the window, launches the compile worker, and drives the event loop.
///
/// Frames are produced from the first redraw on; until the compiled shaders
/// arrive they only clear the surface.
pub fn run(config: &RendererConfig) -> Result<()> {
    let event_loop = EventLoop::new().context("failed to initialize event loop")?;
    let window_size = PhysicalSize::new(config.surface_size.0, config.surface_size.1);
    let window = WindowBuilder::new()
        .with_title(config.title.as_str())
        .with_inner_size(window_size)
        .build(&event_loop)
        .context("failed to create window")?;
    let window = Arc::new(window);

    let backend = WgpuBackend::new(window.clone())?;
    let (render, _worker) = bootstrap::launch(config, Box::new(NagaCompiler::new()))?;
    let mut state = WindowState {
        window,
        backend,
        render,
        mouse: None,
        started: Instant::now(),
        last_phase: ActivationPhase::AwaitingStart,
    };
    state.window().request_redraw();

    event_loop
        .run(move |event, elwt| {
            elwt.set_control_flow(ControlFlow::Wait);

            match event {
                Event::WindowEvent { window_id, event } if window_id == state.window().id() => {
                    match event {
                        WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                            elwt.exit();
                        }
                        WindowEvent::CursorMoved { position, .. } => {
                            state.mouse = Some(position);
                        }
                        WindowEvent::Resized(new_size) => {
                            state.resize(new_size);
                        }
                        WindowEvent::RedrawRequested => match state.render_frame() {
                            Ok(()) => {}
                            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                                let size = state.size();
                                state.resize(size);
                            }
                            Err(wgpu::SurfaceError::OutOfMemory) => {
                                tracing::error!("surface out of memory; exiting");
                                elwt.exit();
                            }
                            Err(other) => {
                                tracing::warn!(error = %other, "surface error; retrying next frame");
                            }
                        },
                        _ => {}
                    }
                }
                Event::AboutToWait => {
                    state.window().request_redraw();
                }
                _ => {}
            }
        })
        .map_err(|err| anyhow!("event loop error: {err}"))
}
