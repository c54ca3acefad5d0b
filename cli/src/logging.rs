//! Tracing setup.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

/// Log file used while the TUI owns the terminal.
pub const LOG_FILE_NAME: &str = "kubeforward.log";

/// Set up the `tracing` library.
///
/// `RUST_LOG` wins over the configured filter. Output goes to stderr, or to
/// `~/.kubeforward/kubeforward.log` when `to_file` is set so it cannot draw
/// over the TUI.
pub fn init(default_filter: &str, to_file: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    if to_file {
        let path = log_path()?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init()
            .map_err(|e| anyhow!(e))
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| anyhow!(e))
    }
}

fn log_path() -> Result<PathBuf> {
    let dir = kubeforward_core::config::config_dir()?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    Ok(dir.join(LOG_FILE_NAME))
}
