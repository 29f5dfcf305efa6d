//! unipack - package unikernel images

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use unipack_cli::cmd;
use unipack_cli::{Cli, Commands};
use unipack_core::Config;
use unipack_core::config::try_unipack_home;
use unipack_schema::LogType;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let home = try_unipack_home().context("could not determine the unipack home directory")?;
    let mut config = Config::load(&home)?;
    config.apply_env(|key| std::env::var(key).ok())?;
    cli.apply(&mut config);

    init_logging(&config);

    match cli.command {
        Commands::Pkg(args) => cmd::pkg::pkg(Arc::new(config), args).await,
        Commands::Pull { dir } => cmd::pull::pull(&config, &dir).await,
        Commands::Completions { shell } => {
            cmd::completions::completions(shell);
            Ok(())
        }
    }
}

/// RUST_LOG wins over the configured level; logs always go to stderr.
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if config.log.log_type == LogType::Json {
        builder.json().init();
    } else {
        builder.init();
    }
}
