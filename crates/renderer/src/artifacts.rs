use std::fs;
use std::path::{Path, PathBuf};

use crate::source::ShaderStage;
use crate::task::CompiledProgram;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to write shader artifact {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("shader artifact {path} would overwrite a shader source")]
    WouldOverwriteSource { path: PathBuf },
}

impl ArtifactError {
    pub fn path(&self) -> &Path {
        match self {
            ArtifactError::Write { path, .. } | ArtifactError::WouldOverwriteSource { path } => {
                path
            }
        }
    }
}

/// Destination for compiled shader blobs: `<dir>/<name>.<stage>.<language>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStore {
    dir: PathBuf,
    name: String,
    sources: Vec<PathBuf>,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
            sources: Vec::new(),
        }
    }

    /// Marks `sources` as files this store must never write over.
    pub fn protecting(mut self, sources: impl IntoIterator<Item = PathBuf>) -> Self {
        self.sources.extend(sources);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, stage: ShaderStage, extension: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}.{}", self.name, stage.tag(), extension))
    }

    /// Writes both stages, replacing any previous content.
    ///
    /// Each file is attempted independently; failures are returned rather than
    /// raised so callers can log them and keep rendering. A path that resolves
    /// to one of the protected sources is never written.
    pub fn persist(&self, program: &CompiledProgram) -> Vec<Result<PathBuf, ArtifactError>> {
        let extension = program.target().language_id();
        [ShaderStage::Vertex, ShaderStage::Fragment]
            .into_iter()
            .map(|stage| {
                let path = self.path_for(stage, extension);
                if self.sources.iter().any(|source| same_file(source, &path)) {
                    return Err(ArtifactError::WouldOverwriteSource { path });
                }
                match fs::write(&path, program.bytes(stage)) {
                    Ok(()) => Ok(path),
                    Err(source) => Err(ArtifactError::Write { path, source }),
                }
            })
            .collect()
    }

    /// [`ArtifactStore::persist`] with failures logged; returns the written paths.
    pub fn persist_logged(&self, program: &CompiledProgram) -> Vec<PathBuf> {
        let mut written = Vec::new();
        for result in self.persist(program) {
            match result {
                Ok(path) => {
                    tracing::info!(path = %path.display(), "wrote shader artifact");
                    written.push(path);
                }
                Err(ArtifactError::Write { path, source }) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %source,
                        "failed to cache shader artifact"
                    );
                }
                Err(err) => {
                    tracing::warn!(path = %err.path().display(), "{err}; skipped");
                }
            }
        }
        written
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::tests::{task_with, ScriptedCompiler};

    #[test]
    fn writes_one_file_per_stage_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), "shader");
        let vertex_path = dir.path().join("shader.vert.spirv");
        fs::write(&vertex_path, vec![b'x'; 100]).unwrap();

        let program = task_with(ScriptedCompiler::new(), 256).run().unwrap();
        let written: Vec<_> = store
            .persist(&program)
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(
            written,
            vec![vertex_path.clone(), dir.path().join("shader.frag.spirv")]
        );
        assert_eq!(fs::read(&vertex_path).unwrap(), b"vvvvvvvv");
        assert_eq!(
            fs::read(dir.path().join("shader.frag.spirv")).unwrap(),
            b"ffffffff"
        );
    }

    #[test]
    fn missing_directory_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("absent"), "shader");
        let program = task_with(ScriptedCompiler::new(), 256).run().unwrap();

        let results = store.persist(&program);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(Result::is_err));
        assert!(store.persist_logged(&program).is_empty());
    }

    #[test]
    fn protected_sources_are_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("shader.frag.spirv");
        fs::write(&source, b"original").unwrap();
        let store = ArtifactStore::new(dir.path(), "shader")
            .protecting([dir.path().join(".").join("shader.frag.spirv")]);
        let program = task_with(ScriptedCompiler::new(), 256).run().unwrap();

        let results = store.persist(&program);
        assert_eq!(
            results[0].as_ref().unwrap(),
            &dir.path().join("shader.vert.spirv")
        );
        assert!(matches!(
            &results[1],
            Err(ArtifactError::WouldOverwriteSource { path }) if path == &source
        ));
        assert_eq!(fs::read(&source).unwrap(), b"original");
        assert_eq!(
            store.persist_logged(&program),
            vec![dir.path().join("shader.vert.spirv")]
        );
    }
}
