mod config;
mod keys;
mod listen;

use anyhow::{Context, Result};
use focusvol_core::config::Config;

use crate::Commands;

/// Run a one-shot CLI command.
pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Config { command } => config::run(command),
        Commands::Keys => keys::run(),
        Commands::Listen => listen::run(),
        Commands::Daemon { .. } => unreachable!("daemon command handled in main"),
    }
}

fn load_config() -> Result<Config> {
    let path = Config::default_path().context("failed to resolve XDG config directory")?;
    Config::load(&path).with_context(|| format!("failed to load {}", path.display()))
}
