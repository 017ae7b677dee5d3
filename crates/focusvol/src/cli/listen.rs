use anyhow::{Context, Result};
use focusvol_core::hotkey::HotkeyDispatcher;

use super::load_config;
use crate::keyboard::RdevCapture;

/// Listen on this thread and print each configured binding as it fires.
pub fn run() -> Result<()> {
    let config = load_config()?;
    let mut dispatcher = HotkeyDispatcher::new();

    for (action, combo) in config.hotkeys.combos()? {
        println!("{action}: {combo}");
        let label = combo.to_string();
        dispatcher.register_combo(combo, move || println!("{action} ({label})"));
    }

    println!("Listening for hotkeys. Press Ctrl+C to exit.");
    dispatcher
        .listen_blocking(RdevCapture)
        .context("hotkey capture failed")
}
