use std::fs;

use anyhow::{Context, Result};
use renderer::{Renderer, RendererConfig};
use tracing_subscriber::EnvFilter;

use crate::cli::RunArgs;
use crate::paths::AppPaths;
use crate::settings::Settings;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(args: &RunArgs) -> Result<Settings> {
    if let Some(path) = &args.config {
        return Ok(Settings::load(path)?);
    }
    let paths = AppPaths::discover()?;
    tracing::debug!(dir = %paths.config_dir().display(), "using configuration directory");
    Ok(Settings::load_or_default(&paths.settings_file())?)
}

fn resolve_config(args: &RunArgs) -> Result<RendererConfig> {
    let settings = load_settings(args)?;
    let config = settings
        .resolve(args)
        .context("failed to resolve renderer configuration")?;
    tracing::debug!(
        platform = %config.platform,
        backend = %config.backend,
        width = config.surface_size.0,
        height = config.surface_size.1,
        "resolved configuration"
    );
    Ok(config)
}

/// Opens the window and renders until it is closed.
pub fn run(args: RunArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    tracing::info!(
        platform = %config.platform,
        backend = %config.backend,
        "launching shader window"
    );
    let mut renderer = Renderer::new(config);
    renderer.run()
}

/// Compiles without a window and prints the written artifact paths.
pub fn compile(args: RunArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    if let Some(store) = &config.artifacts {
        fs::create_dir_all(store.dir()).with_context(|| {
            format!(
                "failed to prepare artifact directory {}",
                store.dir().display()
            )
        })?;
    }

    let written = Renderer::new(config).compile()?;
    for path in &written {
        println!("{}", path.display());
    }
    Ok(())
}
