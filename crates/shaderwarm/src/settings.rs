//! `shaderwarm.toml` and its merge with command-line flags.
//!
//! Precedence is flags, then the settings file, then built-in defaults. The
//! result is a fully resolved [`RendererConfig`]; nothing is re-read later.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use renderer::types::SCENE_DATA_LEN;
use renderer::{ArtifactStore, RendererConfig, ShaderInput};
use serde::Deserialize;

use crate::cli::{parse_backend, parse_platform, parse_surface_size, RunArgs};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings file at {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file at {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid `{field}` setting: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub vertex: Option<PathBuf>,
    pub fragment: Option<PathBuf>,
    pub backend: Option<String>,
    pub platform: Option<String>,
    pub title: Option<String>,
    pub size: Option<String>,
    pub poll_us: Option<u64>,
    pub arena_kib: Option<usize>,
    pub scratch_kib: Option<usize>,
    pub scene_data: Option<Vec<f32>>,
    pub artifacts: ArtifactSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArtifactSettings {
    pub enabled: Option<bool>,
    pub dir: Option<PathBuf>,
    pub name: Option<String>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Like [`Settings::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, SettingsError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no settings file; using defaults");
            Ok(Self::default())
        }
    }

    /// Merges `args` over these settings into a renderer configuration.
    pub fn resolve(&self, args: &RunArgs) -> Result<RendererConfig, SettingsError> {
        let mut config = RendererConfig::default();

        if let Some(path) = args.vertex.as_ref().or(self.vertex.as_ref()) {
            config.vertex_shader = ShaderInput::File(path.clone());
        }
        if let Some(path) = args.fragment.as_ref().or(self.fragment.as_ref()) {
            config.fragment_shader = ShaderInput::File(path.clone());
        }

        if let Some(backend) = args.backend {
            config.backend = backend;
        } else if let Some(value) = &self.backend {
            config.backend = parse_backend(value).map_err(|message| invalid("backend", message))?;
        }
        if let Some(platform) = args.platform {
            config.platform = platform;
        } else if let Some(value) = &self.platform {
            config.platform =
                parse_platform(value).map_err(|message| invalid("platform", message))?;
        }

        if let Some(title) = &self.title {
            config.title = title.clone();
        }
        if let Some(size) = args.size {
            config.surface_size = size;
        } else if let Some(value) = &self.size {
            config.surface_size =
                parse_surface_size(value).map_err(|message| invalid("size", message))?;
        }

        if let Some(poll_us) = args.poll_us.or(self.poll_us) {
            config.poll_timeout = Duration::from_micros(poll_us);
        }
        if let Some(kib) = args.arena_kib.or(self.arena_kib) {
            config.arena_capacity = kib_to_bytes("arena_kib", kib)?;
        }
        if let Some(kib) = args.scratch_kib.or(self.scratch_kib) {
            config.scratch_capacity = kib_to_bytes("scratch_kib", kib)?;
        }

        if let Some(values) = &self.scene_data {
            config.scene_data = values.as_slice().try_into().map_err(|_| {
                invalid(
                    "scene_data",
                    format!("expected {SCENE_DATA_LEN} values, found {}", values.len()),
                )
            })?;
        }

        let enabled = !args.no_artifacts && self.artifacts.enabled.unwrap_or(true);
        config.artifacts = if enabled {
            let dir = args
                .artifact_dir
                .clone()
                .or_else(|| self.artifacts.dir.clone())
                .unwrap_or_else(|| PathBuf::from("."));
            let name = args
                .artifact_name
                .clone()
                .or_else(|| self.artifacts.name.clone())
                .unwrap_or_else(|| "shader".to_string());
            if name.trim().is_empty() || name.contains(['/', '\\']) {
                return Err(invalid(
                    "artifact name",
                    format!("'{name}' is not a plain file name"),
                ));
            }
            Some(ArtifactStore::new(dir, name))
        } else {
            None
        };

        Ok(config)
    }
}

fn invalid(field: &'static str, message: impl Into<String>) -> SettingsError {
    SettingsError::Invalid {
        field,
        message: message.into(),
    }
}

fn kib_to_bytes(field: &'static str, kib: usize) -> Result<usize, SettingsError> {
    if kib == 0 {
        return Err(invalid(field, "must be greater than zero"));
    }
    kib.checked_mul(1024)
        .ok_or_else(|| invalid(field, format!("{kib} KiB is too large")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use renderer::{GraphicsBackend, Platform};
    use tempfile::TempDir;

    #[test]
    fn empty_settings_resolve_to_defaults() {
        let config = Settings::default().resolve(&RunArgs::default()).unwrap();
        let defaults = RendererConfig::default();

        assert_eq!(config.surface_size, (1024, 768));
        assert_eq!(config.vertex_shader, ShaderInput::Builtin);
        assert_eq!(config.backend, defaults.backend);
        assert_eq!(config.arena_capacity, defaults.arena_capacity);
        assert_eq!(config.artifacts, Some(ArtifactStore::new(".", "shader")));
    }

    #[test]
    fn flags_override_file_values() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("shaderwarm.toml");
        fs::write(
            &path,
            r#"
backend = "opengl"
platform = "android"
size = "640x480"
arena_kib = 64

[artifacts]
dir = "cache"
name = "scene"
"#,
        )
        .unwrap();
        let settings = Settings::load(&path).unwrap();

        let args = RunArgs {
            platform: Some(Platform::Linux),
            artifact_name: Some("override".to_string()),
            ..RunArgs::default()
        };
        let config = settings.resolve(&args).unwrap();

        assert_eq!(config.backend, GraphicsBackend::OpenGl);
        assert_eq!(config.platform, Platform::Linux);
        assert_eq!(config.surface_size, (640, 480));
        assert_eq!(config.arena_capacity, 64 * 1024);
        assert_eq!(config.artifacts, Some(ArtifactStore::new("cache", "override")));
    }

    #[test]
    fn artifacts_can_be_disabled_from_either_side() {
        let settings = Settings {
            artifacts: ArtifactSettings {
                enabled: Some(false),
                ..ArtifactSettings::default()
            },
            ..Settings::default()
        };
        assert_eq!(settings.resolve(&RunArgs::default()).unwrap().artifacts, None);

        let args = RunArgs {
            no_artifacts: true,
            ..RunArgs::default()
        };
        assert_eq!(Settings::default().resolve(&args).unwrap().artifacts, None);
    }

    #[test]
    fn invalid_values_name_the_field() {
        let settings = Settings {
            scene_data: Some(vec![1.0; 3]),
            ..Settings::default()
        };
        assert!(matches!(
            settings.resolve(&RunArgs::default()),
            Err(SettingsError::Invalid {
                field: "scene_data",
                ..
            })
        ));

        let settings = Settings {
            backend: Some("glide".to_string()),
            ..Settings::default()
        };
        assert!(matches!(
            settings.resolve(&RunArgs::default()),
            Err(SettingsError::Invalid {
                field: "backend",
                ..
            })
        ));

        let args = RunArgs {
            scratch_kib: Some(0),
            ..RunArgs::default()
        };
        assert!(Settings::default().resolve(&args).is_err());
    }

    #[test]
    fn unknown_keys_and_missing_files_are_handled() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("shaderwarm.toml");
        fs::write(&path, "colour = \"red\"\n").unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(SettingsError::Parse { .. })
        ));

        let missing = root.path().join("absent.toml");
        assert_eq!(Settings::load_or_default(&missing).unwrap(), Settings::default());
        assert!(matches!(
            Settings::load(&missing),
            Err(SettingsError::Read { .. })
        ));
    }
}
