//! `skylight hrtime` - Print the native clock.

use skylight_nif::SkylightConfig;

pub fn execute(config: &SkylightConfig) -> anyhow::Result<()> {
    let (gate, _) = super::load_gate(config)?;
    println!("{}", gate.hrtime()?);
    Ok(())
}
