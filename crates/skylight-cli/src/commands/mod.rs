//! Subcommand implementations

pub mod env;
pub mod hrtime;
pub mod lex_sql;
pub mod load;
pub mod smoke;

use std::path::{Path, PathBuf};

use anyhow::Context;
use skylight_nif::{Gate, LoadStatus, SkylightConfig};

/// Build the effective config: file (if any), then environment, then `--lib`.
pub fn resolve_config(path: Option<&Path>, lib: Option<PathBuf>) -> anyhow::Result<SkylightConfig> {
    let config = match path {
        Some(path) => SkylightConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SkylightConfig::default(),
    };
    let mut config = config
        .with_env_overrides()
        .context("Invalid SKYLIGHT_* environment")?;

    if let Some(lib) = lib {
        config.library_path = Some(lib);
    }
    tracing::debug!(library_path = ?config.library_path, settings = config.env.len(), "config resolved");
    Ok(config)
}

/// Load the configured library into the process-wide gate.
pub fn load_gate(config: &SkylightConfig) -> anyhow::Result<(&'static Gate, LoadStatus)> {
    let gate = Gate::global();
    let status = config
        .load_library(gate)
        .context("Could not load libskylight")?;
    Ok((gate, status))
}
