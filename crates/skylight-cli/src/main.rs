//! `skylight` - probe a libskylight installation
//!
//! Loads the library the way a host runtime would and drives a few calls
//! through it, so a broken install shows up here instead of in production.

mod commands;

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "skylight")]
#[command(about = "Probe a libskylight installation", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (skylight.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to libskylight; overrides the config file and SKYLIGHT_LIB_PATH
    #[arg(long, global = true, value_name = "PATH")]
    lib: Option<PathBuf>,

    /// More logging (-v debug, -vv trace); RUST_LOG wins when set
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load libskylight and report whether this call loaded it
    Load,

    /// Print the native monotonic clock
    Hrtime,

    /// Normalize a SQL statement
    LexSql {
        /// Statement to normalize
        sql: String,
        /// Also print the extracted title
        #[arg(long)]
        title: bool,
    },

    /// Print the env entries an instrumenter would be created with
    Env {
        /// Print the whole resolved config as skylight.toml instead
        #[arg(long)]
        toml: bool,
    },

    /// Run one instrumented request end to end
    Smoke {
        /// Endpoint name for the trace
        #[arg(long, default_value = "SkylightProbe#smoke")]
        endpoint: String,
        /// Number of spans to record
        #[arg(long, default_value_t = 3)]
        spans: u32,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = commands::resolve_config(cli.config.as_deref(), cli.lib)?;

    match cli.command {
        Commands::Load => commands::load::execute(&config),
        Commands::Hrtime => commands::hrtime::execute(&config),
        Commands::LexSql { sql, title } => commands::lex_sql::execute(&config, &sql, title),
        Commands::Env { toml } => commands::env::execute(&config, toml),
        Commands::Smoke { endpoint, spans } => commands::smoke::execute(&config, &endpoint, spans),
    }
}
