use std::path::PathBuf;

use clap::{Parser, Subcommand};
use renderer::{GraphicsBackend, Platform};

#[derive(Parser, Debug)]
#[command(
    name = "shaderwarm",
    author,
    version,
    about = "Compile a GLSL shader pair in the background and render it once it is ready"
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Vertex shader (GLSL 450). Defaults to the built-in full-screen triangle shader.
    #[arg(long, value_name = "FILE", global = true)]
    pub vertex: Option<PathBuf>,

    /// Fragment shader (GLSL 450). Defaults to the built-in gradient shader.
    #[arg(long, value_name = "FILE", global = true)]
    pub fragment: Option<PathBuf>,

    /// Graphics backend the shaders are compiled for: `vulkan`, `direct3d9`,
    /// `direct3d11`, `direct3d12`, `metal`, or `opengl`.
    #[arg(long, value_name = "BACKEND", value_parser = parse_backend, global = true)]
    pub backend: Option<GraphicsBackend>,

    /// Platform the shaders are compiled for (defaults to the host).
    #[arg(long, value_name = "PLATFORM", value_parser = parse_platform, global = true)]
    pub platform: Option<Platform>,

    /// Directory compiled shaders are written to.
    #[arg(long, value_name = "DIR", global = true)]
    pub artifact_dir: Option<PathBuf>,

    /// Base file name for compiled shaders (`<name>.vert.<lang>`).
    #[arg(long, value_name = "NAME", global = true)]
    pub artifact_name: Option<String>,

    /// Do not write compiled shaders to disk.
    #[arg(long, global = true)]
    pub no_artifacts: bool,

    /// Per-frame wait for the compile result, in microseconds.
    #[arg(long, value_name = "MICROSECONDS", global = true)]
    pub poll_us: Option<u64>,

    /// Arena capacity for sources and compiled output, in KiB.
    #[arg(long, value_name = "KIB", global = true)]
    pub arena_kib: Option<usize>,

    /// Scratch buffer the compiler writes into, in KiB.
    #[arg(long, value_name = "KIB", global = true)]
    pub scratch_kib: Option<usize>,

    /// Window size (e.g. `1024x768`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_surface_size, global = true)]
    pub size: Option<(u32, u32)>,

    /// Settings file to use instead of `<config dir>/shaderwarm.toml`.
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile both stages without opening a window and write the artifacts.
    Compile,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_backend(value: &str) -> Result<GraphicsBackend, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("backend must not be empty".to_string());
    }

    let normalized = trimmed.to_ascii_lowercase();
    let backend = match normalized.as_str() {
        "vk" => Some(GraphicsBackend::Vulkan),
        "d3d9" | "dx9" => Some(GraphicsBackend::Direct3D9),
        "d3d11" | "dx11" => Some(GraphicsBackend::Direct3D11),
        "d3d12" | "dx12" => Some(GraphicsBackend::Direct3D12),
        "gl" => Some(GraphicsBackend::OpenGl),
        other => GraphicsBackend::from_id(other),
    };
    backend.ok_or_else(|| {
        format!(
            "unknown backend '{trimmed}'; expected vulkan, direct3d9, direct3d11, direct3d12, metal, or opengl"
        )
    })
}

pub fn parse_platform(value: &str) -> Result<Platform, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("platform must not be empty".to_string());
    }

    let normalized = trimmed.to_ascii_lowercase();
    let platform = match normalized.as_str() {
        "osx" | "darwin" => Some(Platform::MacOs),
        "web" | "wasm" => Some(Platform::Html5),
        other => Platform::from_id(other),
    };
    platform.ok_or_else(|| {
        format!("unknown platform '{trimmed}'; expected windows, macos, linux, android, ios, or html5")
    })
}

pub fn parse_surface_size(spec: &str) -> Result<(u32, u32), String> {
    let trimmed = spec.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| "expected WxH format, e.g. 1024x768".to_string())?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| "invalid width in size specification".to_string())?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| "invalid height in size specification".to_string())?;

    if width == 0 || height == 0 {
        return Err("surface dimensions must be greater than zero".to_string());
    }

    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_accepts_ids_and_aliases() {
        assert_eq!(parse_backend("vulkan"), Ok(GraphicsBackend::Vulkan));
        assert_eq!(parse_backend(" VK "), Ok(GraphicsBackend::Vulkan));
        assert_eq!(parse_backend("dx12"), Ok(GraphicsBackend::Direct3D12));
        assert_eq!(parse_backend("opengl"), Ok(GraphicsBackend::OpenGl));
        assert!(parse_backend("glide").is_err());
        assert!(parse_backend("").is_err());
    }

    #[test]
    fn platform_accepts_ids_and_aliases() {
        assert_eq!(parse_platform("linux"), Ok(Platform::Linux));
        assert_eq!(parse_platform("osx"), Ok(Platform::MacOs));
        assert_eq!(parse_platform("wasm"), Ok(Platform::Html5));
        assert!(parse_platform("beos").is_err());
    }

    #[test]
    fn surface_size_parses_and_rejects_zero() {
        assert_eq!(parse_surface_size("1024x768"), Ok((1024, 768)));
        assert_eq!(parse_surface_size(" 640 X 480 "), Ok((640, 480)));
        assert!(parse_surface_size("0x10").is_err());
        assert!(parse_surface_size("1024").is_err());
    }

    #[test]
    fn flags_are_accepted_after_the_compile_subcommand() {
        let cli = Cli::try_parse_from([
            "shaderwarm",
            "compile",
            "--backend",
            "opengl",
            "--size",
            "800x600",
            "--no-artifacts",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Command::Compile)));
        assert_eq!(cli.run.backend, Some(GraphicsBackend::OpenGl));
        assert_eq!(cli.run.size, Some((800, 600)));
        assert!(cli.run.no_artifacts);
    }
}
