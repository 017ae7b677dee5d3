use anyhow::{Context, Result};
use focusvol_core::config::Config;

use super::load_config;
use crate::ConfigCommands;

pub fn run(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let config = load_config()?;
            print!("{}", config.to_toml()?);
        }
        ConfigCommands::Dir => {
            let dir = Config::default_dir().context("failed to resolve XDG config directory")?;
            println!("{}", dir.display());
        }
    }
    Ok(())
}
