//! `skylight load` - Load libskylight and report the outcome.

use skylight_nif::{LoadStatus, SkylightConfig};

pub fn execute(config: &SkylightConfig) -> anyhow::Result<()> {
    let (gate, status) = super::load_gate(config)?;
    match status {
        LoadStatus::Loaded => println!("loaded"),
        LoadStatus::AlreadyLoaded => println!("already loaded"),
    }
    if let Some(path) = gate.libskylight()?.path() {
        println!("Library:      {}", path);
    }
    Ok(())
}
