use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::arena::{Arena, ArenaError, ArenaRegion};

/// Programmable stage a shader is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// Short stage tag used by the cross-compiler and in artifact file names.
    pub fn tag(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vert",
            ShaderStage::Fragment => "frag",
        }
    }

    pub(crate) fn to_naga(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to read {stage} shader at {path}")]
    Read {
        stage: ShaderStage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no arena space for {stage} shader source")]
    Arena {
        stage: ShaderStage,
        #[source]
        source: ArenaError,
    },
}

/// NUL-terminated shader text stored in an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderSource {
    stage: ShaderStage,
    region: ArenaRegion,
}

impl ShaderSource {
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Region including the trailing NUL.
    pub fn region(&self) -> ArenaRegion {
        self.region
    }

    /// Source bytes without the terminator.
    pub fn text_bytes<'a>(&self, arena: &'a Arena) -> &'a [u8] {
        let bytes = arena.bytes(self.region);
        bytes.strip_suffix(&[0]).unwrap_or(bytes)
    }

    pub fn text<'a>(&self, arena: &'a Arena) -> Option<&'a str> {
        std::str::from_utf8(self.text_bytes(arena)).ok()
    }
}

/// Copies `text` into the arena followed by a NUL byte.
pub fn store_source(
    arena: &mut Arena,
    text: &[u8],
    stage: ShaderStage,
) -> Result<ShaderSource, ArenaError> {
    let region = arena.allocate(text.len() + 1)?;
    let buffer = arena.bytes_mut(region);
    buffer[..text.len()].copy_from_slice(text);
    buffer[text.len()] = 0;
    Ok(ShaderSource { stage, region })
}

/// Reads a shader file into the arena.
pub fn load_source(
    arena: &mut Arena,
    path: &Path,
    stage: ShaderStage,
) -> Result<ShaderSource, SourceError> {
    let data = fs::read(path).map_err(|source| SourceError::Read {
        stage,
        path: path.to_path_buf(),
        source,
    })?;
    let source = store_source(arena, &data, stage)
        .map_err(|source| SourceError::Arena { stage, source })?;
    tracing::debug!(
        path = %path.display(),
        %stage,
        bytes = data.len(),
        "loaded shader source"
    );
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_source_is_nul_terminated() {
        let mut arena = Arena::with_capacity(64);
        let source = store_source(&mut arena, b"void main() {}", ShaderStage::Vertex).unwrap();

        assert_eq!(source.region().len(), 15);
        assert_eq!(arena.bytes(source.region()).last(), Some(&0));
        assert_eq!(source.text(&arena), Some("void main() {}"));
    }

    #[test]
    fn loads_file_into_arena() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shader.frag.glsl");
        fs::write(&path, "#version 450\n").unwrap();

        let mut arena = Arena::with_capacity(64);
        let source = load_source(&mut arena, &path, ShaderStage::Fragment).unwrap();
        assert_eq!(source.stage(), ShaderStage::Fragment);
        assert_eq!(source.text(&arena), Some("#version 450\n"));
    }

    #[test]
    fn missing_file_and_full_arena_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut arena = Arena::with_capacity(4);

        let missing = load_source(&mut arena, &dir.path().join("nope"), ShaderStage::Vertex);
        assert!(matches!(missing, Err(SourceError::Read { .. })));

        let path = dir.path().join("big.glsl");
        fs::write(&path, "0123456789").unwrap();
        let full = load_source(&mut arena, &path, ShaderStage::Vertex);
        assert!(matches!(
            full,
            Err(SourceError::Arena {
                source: ArenaError::CapacityExceeded { requested: 11, .. },
                ..
            })
        ));
        assert_eq!(arena.used(), 0);
    }
}
