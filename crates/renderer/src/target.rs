//! Maps the configured platform and graphics backend onto the identifiers the
//! cross-compiler understands.
//!
//! Resolution happens once at startup from explicit configuration values.
//! Combinations without a mapping resolve to [`TargetResolution::Unresolved`]
//! and any compile attempt against them fails instead of picking a default.

use std::fmt;

/// Operating system family the shaders are built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    Android,
    Ios,
    Html5,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::Windows,
        Platform::MacOs,
        Platform::Linux,
        Platform::Android,
        Platform::Ios,
        Platform::Html5,
    ];

    /// Platform of the running binary, if it is one we know how to target.
    pub fn host() -> Option<Self> {
        if cfg!(target_os = "windows") {
            Some(Platform::Windows)
        } else if cfg!(target_os = "macos") {
            Some(Platform::MacOs)
        } else if cfg!(target_os = "android") {
            Some(Platform::Android)
        } else if cfg!(target_os = "ios") {
            Some(Platform::Ios)
        } else if cfg!(target_os = "linux") {
            Some(Platform::Linux)
        } else if cfg!(target_os = "emscripten") {
            Some(Platform::Html5)
        } else {
            None
        }
    }

    /// System identifier handed to the cross-compiler.
    pub fn id(self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::MacOs => "macos",
            Platform::Linux => "linux",
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::Html5 => "html5",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|platform| platform.id() == id)
    }

    /// Whether OpenGL on this platform means an embedded (ES) profile.
    fn uses_embedded_gl(self) -> bool {
        matches!(self, Platform::Android | Platform::Ios | Platform::Html5)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Graphics API the compiled shaders will be consumed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphicsBackend {
    Vulkan,
    Direct3D9,
    Direct3D11,
    Direct3D12,
    Metal,
    OpenGl,
}

impl GraphicsBackend {
    pub const ALL: [GraphicsBackend; 6] = [
        GraphicsBackend::Vulkan,
        GraphicsBackend::Direct3D9,
        GraphicsBackend::Direct3D11,
        GraphicsBackend::Direct3D12,
        GraphicsBackend::Metal,
        GraphicsBackend::OpenGl,
    ];

    pub fn id(self) -> &'static str {
        match self {
            GraphicsBackend::Vulkan => "vulkan",
            GraphicsBackend::Direct3D9 => "direct3d9",
            GraphicsBackend::Direct3D11 => "direct3d11",
            GraphicsBackend::Direct3D12 => "direct3d12",
            GraphicsBackend::Metal => "metal",
            GraphicsBackend::OpenGl => "opengl",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|backend| backend.id() == id)
    }
}

impl fmt::Display for GraphicsBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Shader format produced by the cross-compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetLanguage {
    SpirV,
    D3D11,
    D3D9,
    Metal,
    Glsl,
    Essl,
}

impl TargetLanguage {
    /// Identifier passed to the cross-compiler; doubles as the artifact extension.
    pub fn id(self) -> &'static str {
        match self {
            TargetLanguage::SpirV => "spirv",
            TargetLanguage::D3D11 => "d3d11",
            TargetLanguage::D3D9 => "d3d9",
            TargetLanguage::Metal => "metal",
            TargetLanguage::Glsl => "glsl",
            TargetLanguage::Essl => "essl",
        }
    }
}

impl fmt::Display for TargetLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// A fully resolved `(system, language)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompileTarget {
    pub platform: Platform,
    pub language: TargetLanguage,
}

impl CompileTarget {
    pub fn system_id(&self) -> &'static str {
        self.platform.id()
    }

    pub fn language_id(&self) -> &'static str {
        self.language.id()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no shader target for the {backend} backend on {platform}")]
pub struct UnresolvedTarget {
    pub platform: Platform,
    pub backend: GraphicsBackend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetResolution {
    Resolved(CompileTarget),
    Unresolved(UnresolvedTarget),
}

impl TargetResolution {
    pub fn target(&self) -> Result<CompileTarget, UnresolvedTarget> {
        match *self {
            TargetResolution::Resolved(target) => Ok(target),
            TargetResolution::Unresolved(unresolved) => Err(unresolved),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, TargetResolution::Resolved(_))
    }
}

/// Resolves the compiler identifiers for a platform/backend pair.
pub fn resolve(platform: Platform, backend: GraphicsBackend) -> TargetResolution {
    use GraphicsBackend as B;
    use Platform as P;

    let language = match (backend, platform) {
        (B::Vulkan, P::Windows | P::MacOs | P::Linux | P::Android) => Some(TargetLanguage::SpirV),
        (B::Direct3D11 | B::Direct3D12, P::Windows) => Some(TargetLanguage::D3D11),
        (B::Direct3D9, P::Windows) => Some(TargetLanguage::D3D9),
        (B::Metal, P::MacOs | P::Ios) => Some(TargetLanguage::Metal),
        (B::OpenGl, platform) if platform.uses_embedded_gl() => Some(TargetLanguage::Essl),
        (B::OpenGl, _) => Some(TargetLanguage::Glsl),
        _ => None,
    };

    match language {
        Some(language) => TargetResolution::Resolved(CompileTarget { platform, language }),
        None => TargetResolution::Unresolved(UnresolvedTarget { platform, backend }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn language(platform: Platform, backend: GraphicsBackend) -> Option<TargetLanguage> {
        resolve(platform, backend).target().ok().map(|t| t.language)
    }

    #[test]
    fn resolves_each_backend_to_its_language() {
        use GraphicsBackend as B;
        use Platform as P;

        assert_eq!(language(P::Linux, B::Vulkan), Some(TargetLanguage::SpirV));
        assert_eq!(language(P::Android, B::Vulkan), Some(TargetLanguage::SpirV));
        assert_eq!(language(P::MacOs, B::Vulkan), Some(TargetLanguage::SpirV));
        assert_eq!(language(P::Windows, B::Direct3D11), Some(TargetLanguage::D3D11));
        assert_eq!(language(P::Windows, B::Direct3D12), Some(TargetLanguage::D3D11));
        assert_eq!(language(P::Windows, B::Direct3D9), Some(TargetLanguage::D3D9));
        assert_eq!(language(P::MacOs, B::Metal), Some(TargetLanguage::Metal));
        assert_eq!(language(P::Ios, B::Metal), Some(TargetLanguage::Metal));
        assert_eq!(language(P::Linux, B::OpenGl), Some(TargetLanguage::Glsl));
        assert_eq!(language(P::MacOs, B::OpenGl), Some(TargetLanguage::Glsl));
        assert_eq!(language(P::Android, B::OpenGl), Some(TargetLanguage::Essl));
        assert_eq!(language(P::Html5, B::OpenGl), Some(TargetLanguage::Essl));
        assert_eq!(language(P::Ios, B::OpenGl), Some(TargetLanguage::Essl));
    }

    #[test]
    fn unmapped_pairs_stay_unresolved() {
        use GraphicsBackend as B;
        use Platform as P;

        for (platform, backend) in [
            (P::Linux, B::Metal),
            (P::Linux, B::Direct3D11),
            (P::Ios, B::Vulkan),
            (P::Html5, B::Vulkan),
            (P::Android, B::Direct3D9),
        ] {
            let resolution = resolve(platform, backend);
            assert_eq!(
                resolution,
                TargetResolution::Unresolved(UnresolvedTarget { platform, backend })
            );
        }
    }

    #[test]
    fn resolution_is_deterministic_for_every_pair() {
        for platform in Platform::ALL {
            for backend in GraphicsBackend::ALL {
                assert_eq!(resolve(platform, backend), resolve(platform, backend));
            }
        }
    }

    #[test]
    fn identifiers_round_trip_through_from_id() {
        for platform in Platform::ALL {
            assert_eq!(Platform::from_id(platform.id()), Some(platform));
        }
        for backend in GraphicsBackend::ALL {
            assert_eq!(GraphicsBackend::from_id(backend.id()), Some(backend));
        }
        assert_eq!(Platform::from_id("amiga"), None);

        let target = resolve(Platform::Linux, GraphicsBackend::Vulkan)
            .target()
            .unwrap();
        assert_eq!(target.system_id(), "linux");
        assert_eq!(target.language_id(), "spirv");
    }
}
