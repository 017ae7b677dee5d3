use anyhow::Result;
use focusvol_core::hotkey::Key;

pub fn run() -> Result<()> {
    for name in Key::names() {
        println!("{name}");
    }
    println!("any single printable character (a, 7, /, ...)");
    Ok(())
}
