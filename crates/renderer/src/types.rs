use std::path::PathBuf;
use std::time::Duration;

use bytemuck::{Pod, Zeroable};

use crate::arena::DEFAULT_ARENA_CAPACITY;
use crate::artifacts::ArtifactStore;
use crate::handshake::DEFAULT_POLL_TIMEOUT;
use crate::target::{GraphicsBackend, Platform};
use crate::task::DEFAULT_SCRATCH_CAPACITY;

/// Number of floats in the `sg_data` scene block.
pub const SCENE_DATA_LEN: usize = 16;

/// Scene block uploaded as `sg_data` every frame.
pub const DEFAULT_SCENE_DATA: [f32; SCENE_DATA_LEN] = [
    4.5, 0.0, 0.0, -12.0, //
    0.0, 0.0, 0.0, 0.02, //
    0.02, 0.02, 0.87, 0.88, //
    0.86, 0.18, 0.25, 0.31,
];

/// Vertex layout of the static geometry: `vertex_position` then `vertex_uv`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

pub const TRIANGLE_VERTICES: [Vertex; 3] = [
    Vertex {
        position: [-1.0, -1.0],
        uv: [0.0, 0.0],
    },
    Vertex {
        position: [1.0, -1.0],
        uv: [1.0, 0.0],
    },
    Vertex {
        position: [-1.0, 1.0],
        uv: [0.0, 1.0],
    },
];

pub const TRIANGLE_INDICES: [u16; 3] = [0, 1, 2];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Float2,
}

impl VertexFormat {
    pub fn size(self) -> u64 {
        match self {
            VertexFormat::Float2 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub name: &'static str,
    pub format: VertexFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    One,
    Zero,
    SrcAlpha,
    OneMinusSrcAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendComponent {
    pub src: BlendFactor,
    pub dst: BlendFactor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendSpec {
    pub color: BlendComponent,
    pub alpha: BlendComponent,
}

impl BlendSpec {
    /// Classic `src * a + dst * (1 - a)` blending on both channels.
    pub const ALPHA: BlendSpec = BlendSpec {
        color: BlendComponent {
            src: BlendFactor::SrcAlpha,
            dst: BlendFactor::OneMinusSrcAlpha,
        },
        alpha: BlendComponent {
            src: BlendFactor::SrcAlpha,
            dst: BlendFactor::OneMinusSrcAlpha,
        },
    };
}

/// Backend-neutral description of the one pipeline the renderer builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSpec {
    pub attributes: &'static [VertexAttribute],
    pub blend: BlendSpec,
}

impl PipelineSpec {
    pub const ATTRIBUTES: [VertexAttribute; 2] = [
        VertexAttribute {
            name: "vertex_position",
            format: VertexFormat::Float2,
        },
        VertexAttribute {
            name: "vertex_uv",
            format: VertexFormat::Float2,
        },
    ];

    pub fn standard() -> Self {
        Self {
            attributes: &Self::ATTRIBUTES,
            blend: BlendSpec::ALPHA,
        }
    }

    pub fn stride(&self) -> u64 {
        self.attributes.iter().map(|attr| attr.format.size()).sum()
    }
}

/// Float offset and width of a named constant inside [`ConstantBlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantLocation {
    pub offset: usize,
    pub components: usize,
}

/// std140 layout of the `Constants` uniform block, in floats.
pub const CONSTANT_SLOTS: [(&str, ConstantLocation); 5] = [
    (
        "sg_data",
        ConstantLocation {
            offset: 0,
            components: SCENE_DATA_LEN,
        },
    ),
    (
        "i_resolution",
        ConstantLocation {
            offset: 16,
            components: 2,
        },
    ),
    (
        "sg_mouse",
        ConstantLocation {
            offset: 18,
            components: 2,
        },
    ),
    (
        "sg_alpha",
        ConstantLocation {
            offset: 20,
            components: 2,
        },
    ),
    (
        "i_time",
        ConstantLocation {
            offset: 22,
            components: 1,
        },
    ),
];

pub fn constant_location(name: &str) -> Option<ConstantLocation> {
    CONSTANT_SLOTS
        .iter()
        .find(|(slot, _)| *slot == name)
        .map(|(_, location)| *location)
}

const CONSTANT_FLOATS: usize = 24;

/// CPU mirror of the `Constants` uniform block (96 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ConstantBlock {
    data: [f32; CONSTANT_FLOATS],
}

impl ConstantBlock {
    pub const FLOATS: usize = CONSTANT_FLOATS;
    pub const SIZE: u64 = (CONSTANT_FLOATS * 4) as u64;

    pub fn new() -> Self {
        Self::zeroed()
    }

    /// Writes up to `location.components` values; extra values are ignored.
    pub fn set(&mut self, location: ConstantLocation, values: &[f32]) {
        let count = values.len().min(location.components);
        self.data[location.offset..location.offset + count].copy_from_slice(&values[..count]);
    }

    pub fn get(&self, location: ConstantLocation) -> &[f32] {
        &self.data[location.offset..location.offset + location.components]
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

impl Default for ConstantBlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a stage's GLSL comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderInput {
    /// The shader bundled with the crate.
    Builtin,
    File(PathBuf),
}

/// Immutable configuration passed to the renderer at start-up.
///
/// Everything here is resolved before the window opens; the render loop never
/// re-reads settings.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Window size in physical pixels.
    pub surface_size: (u32, u32),
    pub title: String,
    pub vertex_shader: ShaderInput,
    pub fragment_shader: ShaderInput,
    pub platform: Platform,
    pub backend: GraphicsBackend,
    pub arena_capacity: usize,
    pub scratch_capacity: usize,
    /// Upper bound on the per-frame wait for the compile outcome.
    pub poll_timeout: Duration,
    /// Where compiled blobs are cached; `None` disables persistence.
    pub artifacts: Option<ArtifactStore>,
    pub scene_data: [f32; SCENE_DATA_LEN],
}

impl RendererConfig {
    /// The artifact store, barred from writing over either shader input.
    pub fn artifact_store(&self) -> Option<ArtifactStore> {
        let sources = [&self.vertex_shader, &self.fragment_shader]
            .into_iter()
            .filter_map(|input| match input {
                ShaderInput::File(path) => Some(path.clone()),
                ShaderInput::Builtin => None,
            });
        self.artifacts.clone().map(|store| store.protecting(sources))
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            surface_size: (1024, 768),
            title: "Shader".to_string(),
            vertex_shader: ShaderInput::Builtin,
            fragment_shader: ShaderInput::Builtin,
            platform: Platform::host().unwrap_or(Platform::Linux),
            backend: GraphicsBackend::Vulkan,
            arena_capacity: DEFAULT_ARENA_CAPACITY,
            scratch_capacity: DEFAULT_SCRATCH_CAPACITY,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            artifacts: Some(ArtifactStore::new(".", "shader")),
            scene_data: DEFAULT_SCENE_DATA,
        }
    }
}
