//! In-memory platform used by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::audio::{
    AudioError, AudioSession, ProcessId, SessionEntry, SessionSource, Volume, WindowSource,
};

#[derive(Debug)]
struct SessionState {
    volume: Volume,
    muted: bool,
    mute_writes: usize,
    volume_writes: usize,
}

/// Fake audio session recording every write.
#[derive(Debug)]
pub struct MockSession {
    name: String,
    state: Mutex<SessionState>,
    gone: AtomicBool,
}

impl MockSession {
    pub fn new(name: &str, volume: f64) -> Arc<Self> {
        Arc::new(MockSession {
            name: name.to_string(),
            state: Mutex::new(SessionState {
                volume: Volume::new(volume),
                muted: false,
                mute_writes: 0,
                volume_writes: 0,
            }),
            gone: AtomicBool::new(false),
        })
    }

    pub fn volume(&self) -> f64 {
        self.state.lock().unwrap().volume.get()
    }

    pub fn muted(&self) -> bool {
        self.state.lock().unwrap().muted
    }

    pub fn force_mute(&self, muted: bool) {
        self.state.lock().unwrap().muted = muted;
    }

    pub fn mute_writes(&self) -> usize {
        self.state.lock().unwrap().mute_writes
    }

    pub fn volume_writes(&self) -> usize {
        self.state.lock().unwrap().volume_writes
    }

    /// Make every subsequent call fail as if the stream had closed.
    pub fn vanish(&self) {
        self.gone.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), AudioError> {
        if self.gone.load(Ordering::SeqCst) {
            Err(AudioError::SessionGone(self.name.clone()))
        } else {
            Ok(())
        }
    }
}

impl AudioSession for MockSession {
    fn process_name(&self) -> &str {
        &self.name
    }

    fn master_volume(&self) -> Result<Volume, AudioError> {
        self.check()?;
        Ok(self.state.lock().unwrap().volume)
    }

    fn set_master_volume(&self, volume: Volume) -> Result<(), AudioError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        state.volume = volume;
        state.volume_writes += 1;
        Ok(())
    }

    fn is_muted(&self) -> Result<bool, AudioError> {
        self.check()?;
        Ok(self.state.lock().unwrap().muted)
    }

    fn set_mute(&self, mute: bool) -> Result<(), AudioError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        state.muted = mute;
        state.mute_writes += 1;
        Ok(())
    }
}

#[derive(Default)]
struct PlatformState {
    foreground: Option<ProcessId>,
    executables: HashMap<ProcessId, String>,
    sessions: Vec<Arc<MockSession>>,
    enumerations: usize,
    fail_enumeration: bool,
}

/// Fake window system and sound server sharing one state.
///
/// Clones observe the same state, so a test can keep one clone while the
/// resolver owns another.
#[derive(Clone, Default)]
pub struct MockPlatform {
    inner: Arc<Mutex<PlatformState>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_process(&self, pid: u32, executable: &str) {
        self.inner
            .lock()
            .unwrap()
            .executables
            .insert(ProcessId(pid), executable.to_string());
    }

    pub fn add_session(&self, executable: &str, volume: f64) -> Arc<MockSession> {
        let session = MockSession::new(executable, volume);
        self.inner.lock().unwrap().sessions.push(session.clone());
        session
    }

    pub fn remove_sessions(&self) {
        self.inner.lock().unwrap().sessions.clear();
    }

    pub fn focus(&self, pid: u32) {
        self.inner.lock().unwrap().foreground = Some(ProcessId(pid));
    }

    pub fn enumerations(&self) -> usize {
        self.inner.lock().unwrap().enumerations
    }

    pub fn fail_enumeration(&self, fail: bool) {
        self.inner.lock().unwrap().fail_enumeration = fail;
    }
}

impl SessionSource for MockPlatform {
    fn enumerate_sessions(&self) -> Result<Vec<SessionEntry>, AudioError> {
        let mut state = self.inner.lock().unwrap();
        state.enumerations += 1;
        if state.fail_enumeration {
            return Err(AudioError::Unavailable("mock failure".into()));
        }
        Ok(state
            .sessions
            .iter()
            .map(|s| SessionEntry {
                process_name: s.process_name().to_string(),
                handle: s.clone(),
            })
            .collect())
    }
}

impl WindowSource for MockPlatform {
    fn foreground_process_id(&self) -> Option<ProcessId> {
        self.inner.lock().unwrap().foreground
    }

    fn executable_basename(&self, pid: ProcessId) -> Option<String> {
        self.inner.lock().unwrap().executables.get(&pid).cloned()
    }
}
