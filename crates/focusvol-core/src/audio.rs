use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Volume as a normalized value in [0.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Volume(f64);

impl Volume {
    pub const ZERO: Volume = Volume(0.0);
    pub const MAX: Volume = Volume(1.0);

    /// Create a Volume from a normalized float, clamped to [0.0, 1.0].
    #[must_use]
    pub fn new(value: f64) -> Self {
        Volume(value.clamp(0.0, 1.0))
    }

    /// Create a Volume from a whole percentage. Values above 100 clamp to 1.0.
    #[must_use]
    pub fn from_percent(percent: u8) -> Self {
        Volume::new(f64::from(percent) / 100.0)
    }

    /// Get the raw normalized value.
    #[must_use]
    pub fn get(self) -> f64 {
        self.0
    }

    /// Nearest whole percentage (halves round away from zero).
    #[must_use]
    pub fn percent(self) -> u8 {
        (self.0 * 100.0).round().clamp(0.0, 100.0) as u8
    }

    /// Shift by a signed step, clamping to the valid range.
    #[must_use]
    pub fn offset(self, delta: f64) -> Self {
        Volume::new(self.0 + delta)
    }
}

/// Identifier of the process that owns a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(pub u32);

impl ProcessId {
    /// The identifier of this process.
    #[must_use]
    pub fn current() -> Self {
        ProcessId(std::process::id())
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("audio server unavailable: {0}")]
    Unavailable(String),
    #[error("audio session for '{0}' no longer exists")]
    SessionGone(String),
    #[error("audio server did not reply within {0} ms")]
    Timeout(u64),
}

/// A live per-process audio control endpoint.
///
/// Implementations talk to the OS on every call. Nothing is cached at this
/// layer; a handle whose process stopped producing audio reports
/// [`AudioError::SessionGone`].
pub trait AudioSession: Send + Sync + fmt::Debug {
    /// Executable base name this session belongs to.
    fn process_name(&self) -> &str;

    fn master_volume(&self) -> Result<Volume, AudioError>;

    fn set_master_volume(&self, volume: Volume) -> Result<(), AudioError>;

    fn is_muted(&self) -> Result<bool, AudioError>;

    fn set_mute(&self, mute: bool) -> Result<(), AudioError>;
}

/// Shared reference to a live audio session.
pub type SessionHandle = Arc<dyn AudioSession>;

/// One entry of a session enumeration.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub process_name: String,
    pub handle: SessionHandle,
}

/// Enumerates the audio sessions currently known to the sound server.
pub trait SessionSource: Send {
    fn enumerate_sessions(&self) -> Result<Vec<SessionEntry>, AudioError>;
}

/// Window and process queries.
pub trait WindowSource: Send {
    /// Process owning the focused window, if any window is focused.
    fn foreground_process_id(&self) -> Option<ProcessId>;

    /// Base name of the executable running as `pid`, or `None` when the
    /// process cannot be inspected.
    fn executable_basename(&self, pid: ProcessId) -> Option<String>;
}
