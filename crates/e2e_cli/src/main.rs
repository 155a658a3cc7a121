//! E2E CLI - Command-line access to the e2e condition-polling runtime.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use e2e_core::Config;
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;

#[derive(Parser)]
#[command(name = "e2e")]
#[command(about = "Await eventually-consistent conditions from the shell", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to $E2E_CONFIG or ./e2e.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll a command until it succeeds or the timeout elapses
    Await(AwaitArgs),
    /// Print the effective configuration
    Config,
    /// Print the run id and freshly generated unique users
    Ids {
        /// User prefix (defaults to the configured prefix)
        #[arg(long)]
        prefix: Option<String>,
        /// Number of users to generate
        #[arg(long, default_value = "1")]
        count: usize,
    },
}

#[derive(Args)]
pub struct AwaitArgs {
    /// Condition description used in logs and the timeout message
    #[arg(short, long)]
    description: Option<String>,
    /// Overall timeout, e.g. 30s, 500ms, 2m (defaults to the eventual-consistency timeout)
    #[arg(long, value_parser = commands::wait::parse_duration)]
    timeout: Option<std::time::Duration>,
    /// Pause between attempts in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,
    /// Pause before the first attempt in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,
    /// Succeed on non-empty stdout and print it, instead of on exit status 0
    #[arg(long)]
    capture: bool,
    /// Command to run as the probe
    #[arg(trailing_var_arg = true, required = true, num_args = 1..)]
    command: Vec<String>,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            let mut config = Config::load(path)?;
            config.apply_overrides(|name| std::env::var(name).ok())?;
            config
        }
        None => Config::from_env()?,
    };
    Ok(config)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    // Initialize tracing subscriber
    // RUST_LOG wins over the configured filter
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Await(args) => commands::wait::run(args, &config),
        Commands::Config => commands::config::run(&config).map(|()| ExitCode::SUCCESS),
        Commands::Ids { prefix, count } => {
            commands::ids::run(prefix.as_deref(), count, &config).map(|()| ExitCode::SUCCESS)
        }
    }
}
