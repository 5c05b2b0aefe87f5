//! `skylight env` - Show the instrumenter env entries.

use anyhow::Context;
use skylight_nif::SkylightConfig;

pub fn execute(config: &SkylightConfig, as_toml: bool) -> anyhow::Result<()> {
    if as_toml {
        let rendered = config
            .to_toml_string()
            .context("Could not render config")?;
        print!("{}", rendered);
        return Ok(());
    }

    if config.env.is_empty() {
        println!("No SKYLIGHT_* settings configured.");
        return Ok(());
    }
    for pair in config.env_pairs().chunks(2) {
        if let [key, value] = pair {
            println!(
                "{}={}",
                String::from_utf8_lossy(key),
                String::from_utf8_lossy(value)
            );
        }
    }
    Ok(())
}
