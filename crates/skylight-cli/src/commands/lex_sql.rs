//! `skylight lex-sql` - Normalize a SQL statement through libskylight.

use anyhow::Context;
use skylight_nif::{sql, Gate, SkylightConfig};

pub fn execute(config: &SkylightConfig, statement: &str, show_title: bool) -> anyhow::Result<()> {
    let (gate, _) = super::load_gate(config)?;
    for line in run(gate, statement, show_title)? {
        println!("{}", line);
    }
    Ok(())
}

/// Lines to print for `statement`: the normalized form, then the title if asked.
pub fn run(gate: &Gate, statement: &str, show_title: bool) -> anyhow::Result<Vec<String>> {
    let lexed = sql::lex(gate, statement.as_bytes()).context("lex_sql failed")?;

    let mut lines = vec![String::from_utf8_lossy(&lexed.statement).into_owned()];
    if show_title {
        let title = match &lexed.title {
            Some(title) => String::from_utf8_lossy(title).into_owned(),
            None => "(none)".to_string(),
        };
        lines.push(format!("Title:        {}", title));
    }
    Ok(lines)
}
