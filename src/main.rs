mod anim;
mod app;
mod calc;
mod config;
mod input;
mod model;
mod render;
mod sim;

use anyhow::{Context, Result};
use std::{fs::OpenOptions, path::Path, sync::Mutex};
use tracing_subscriber::EnvFilter;

/// stdout belongs to the TUI, so logs go to a file in the data dir.
fn init_tracing(log_path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("opening {}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .compact()
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let paths = config::project_paths()?;
    init_tracing(&paths.log_path)?;

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        render::restore_terminal();
        tracing::error!(%info, "panic");
        default_hook(info);
    }));

    tracing::info!(log = %paths.log_path.display(), "logging to file");
    app::run(paths)
}
