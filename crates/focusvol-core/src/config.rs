use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::controller::DEFAULT_STEP;
use crate::hotkey::{HotkeyCombo, HotkeyError};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config from {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write config to {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to parse config from {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml_edit::de::Error,
    },
    #[error("failed to serialize config: {source}")]
    Serialize { source: toml_edit::ser::Error },
    #[error("failed to create config directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("invalid hotkey for {action}: {source}")]
    Hotkey {
        action: HotkeyAction,
        source: HotkeyError,
    },
}

/// Something a hotkey can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    VolumeUp,
    VolumeDown,
    ToggleMute,
    Quit,
}

impl HotkeyAction {
    pub const ALL: [HotkeyAction; 4] = [
        HotkeyAction::VolumeUp,
        HotkeyAction::VolumeDown,
        HotkeyAction::ToggleMute,
        HotkeyAction::Quit,
    ];

    /// The config key for this action.
    #[must_use]
    pub fn config_key(self) -> &'static str {
        match self {
            HotkeyAction::VolumeUp => "volume_up",
            HotkeyAction::VolumeDown => "volume_down",
            HotkeyAction::ToggleMute => "toggle_mute",
            HotkeyAction::Quit => "quit",
        }
    }
}

impl fmt::Display for HotkeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

/// Key bindings. Each entry is a list of keys held together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotkeyConfig {
    #[serde(default = "default_volume_up")]
    pub volume_up: Vec<String>,
    #[serde(default = "default_volume_down")]
    pub volume_down: Vec<String>,
    #[serde(default = "default_toggle_mute")]
    pub toggle_mute: Vec<String>,
    #[serde(default = "default_quit")]
    pub quit: Vec<String>,
}

fn keys(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|t| (*t).to_string()).collect()
}
fn default_volume_up() -> Vec<String> {
    keys(&["alt_gr", "page_up"])
}
fn default_volume_down() -> Vec<String> {
    keys(&["alt_gr", "page_down"])
}
fn default_toggle_mute() -> Vec<String> {
    keys(&["alt_gr", "shift"])
}
fn default_quit() -> Vec<String> {
    keys(&["ctrl", "cmd", "esc"])
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        HotkeyConfig {
            volume_up: default_volume_up(),
            volume_down: default_volume_down(),
            toggle_mute: default_toggle_mute(),
            quit: default_quit(),
        }
    }
}

impl HotkeyConfig {
    /// Keys bound to `action`.
    #[must_use]
    pub fn keys(&self, action: HotkeyAction) -> &[String] {
        match action {
            HotkeyAction::VolumeUp => &self.volume_up,
            HotkeyAction::VolumeDown => &self.volume_down,
            HotkeyAction::ToggleMute => &self.toggle_mute,
            HotkeyAction::Quit => &self.quit,
        }
    }

    /// Parse every binding, reporting the first invalid one.
    pub fn combos(&self) -> Result<Vec<(HotkeyAction, HotkeyCombo)>, ConfigError> {
        HotkeyAction::ALL
            .iter()
            .map(|&action| {
                HotkeyCombo::parse(self.keys(action))
                    .map(|combo| (action, combo))
                    .map_err(|source| ConfigError::Hotkey { action, source })
            })
            .collect()
    }
}

/// Volume stepping parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeConfig {
    /// Fraction of full scale per volume up/down press.
    #[serde(default = "default_step")]
    pub step: f64,
}

fn default_step() -> f64 {
    DEFAULT_STEP
}

impl Default for VolumeConfig {
    fn default() -> Self {
        VolumeConfig {
            step: default_step(),
        }
    }
}

/// Indicator behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupConfig {
    /// How long the indicator stays up after the last change.
    #[serde(default = "default_display_ms")]
    pub display_ms: u64,
}

fn default_display_ms() -> u64 {
    2000
}

impl Default for PopupConfig {
    fn default() -> Self {
        PopupConfig {
            display_ms: default_display_ms(),
        }
    }
}

impl PopupConfig {
    #[must_use]
    pub fn display_duration(&self) -> Duration {
        Duration::from_millis(self.display_ms)
    }
}

/// Top-level configuration.
///
/// Forward-compatible: unknown fields are silently ignored (no `deny_unknown_fields`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub hotkeys: HotkeyConfig,
    #[serde(default)]
    pub volume: VolumeConfig,
    #[serde(default)]
    pub popup: PopupConfig,
}

impl Config {
    /// Load config from a TOML file. Returns default config if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                toml_edit::de::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: path.to_owned(),
                    source,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Config::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.to_owned(),
                source,
            }),
        }
    }

    /// Serialize this config to a TOML string with one `[section]` per group.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let mut doc = toml_edit::ser::to_document(self)
            .map_err(|source| ConfigError::Serialize { source })?;
        expand_top_level_tables(&mut doc);
        Ok(doc.to_string())
    }

    /// Returns the default config directory path.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join("focusvol"))
    }

    /// Returns the default config file path.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        Some(Self::default_dir()?.join("config.toml"))
    }
}

fn create_parent(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
            path: parent.to_owned(),
            source,
        })?;
    }
    Ok(())
}

/// Convert top-level `InlineTable` values into proper `Table` entries so they
/// render as `[section]` headers instead of `section = { ... }` one-liners.
fn expand_top_level_tables(doc: &mut toml_edit::DocumentMut) {
    use toml_edit::{Item, Value};

    let keys: Vec<String> = doc.iter().map(|(k, _)| k.to_owned()).collect();
    for key in keys {
        let Some(item) = doc.get_mut(&key) else {
            continue;
        };
        if let Item::Value(Value::InlineTable(inline)) = item {
            let table = inline.clone().into_table();
            *item = Item::Table(table);
        }
    }
}

const HEADER: &str = "\
# focusvol configuration
# Restart the daemon after editing.
#
# Key names: ctrl, alt, alt_gr, shift, cmd, page_up, page_down, home, end,
# delete, space, enter, esc, tab, backspace, up, down, left, right, f1-f12,
# or any single printable character. Run `focusvol keys` for the full list.

";

const EXAMPLE: &str = "\n\
# Example: bigger steps and a shorter indicator
# [volume]
# step = 0.05
#
# [popup]
# display_ms = 1000
";

/// Generate the default config file content for new users.
///
/// The body comes from the same serialization path as `Config::to_toml()`, so
/// documented defaults can never drift from the code.
pub fn default_config_content() -> Result<String, ConfigError> {
    let body = Config::default().to_toml()?;
    Ok(format!("{HEADER}{body}{EXAMPLE}"))
}

/// Write the default config with comments to the given path if it doesn't exist.
/// Creates parent directories as needed. Returns true if the file was created.
pub fn bootstrap_config(path: &Path) -> Result<bool, ConfigError> {
    if path.exists() {
        return Ok(false);
    }

    create_parent(path)?;

    std::fs::write(path, default_config_content()?).map_err(|source| ConfigError::Write {
        path: path.to_owned(),
        source,
    })?;

    Ok(true)
}
