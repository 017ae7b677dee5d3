use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::audio::{ProcessId, SessionHandle, SessionSource, WindowSource};

/// How long a resolution result is reused for the same process.
pub const CACHE_TTL: Duration = Duration::from_secs(2);

/// Last resolution result. The handle may be empty: "no session" is cached too.
#[derive(Default)]
struct ResolutionCache {
    pid: Option<ProcessId>,
    resolved_at: Option<Instant>,
    handle: Option<SessionHandle>,
}

impl ResolutionCache {
    fn is_fresh_for(&self, pid: ProcessId, now: Instant) -> bool {
        match (self.pid, self.resolved_at) {
            (Some(cached), Some(at)) => {
                cached == pid && now.saturating_duration_since(at) < CACHE_TTL
            }
            _ => false,
        }
    }
}

/// Maps the focused window's process to a live audio session.
///
/// Enumerating sessions is comparatively slow, so the result for a process is
/// kept for [`CACHE_TTL`]. Lookups for this utility's own process never hit
/// the sound server: the previous handle is returned instead, so focusing the
/// indicator keeps controlling the application that was adjusted last.
pub struct SessionResolver<S, W> {
    sessions: S,
    windows: W,
    own_pid: ProcessId,
    cache: ResolutionCache,
}

impl<S: SessionSource, W: WindowSource> SessionResolver<S, W> {
    pub fn new(sessions: S, windows: W) -> Self {
        SessionResolver {
            sessions,
            windows,
            own_pid: ProcessId::current(),
            cache: ResolutionCache::default(),
        }
    }

    /// Override the identifier treated as "this process".
    #[must_use]
    pub fn with_own_pid(mut self, pid: ProcessId) -> Self {
        self.own_pid = pid;
        self
    }

    /// Resolve the session of the currently focused window.
    pub fn resolve_foreground(&mut self) -> Option<SessionHandle> {
        self.resolve_foreground_at(Instant::now())
    }

    /// Resolve the focused window's session with an explicit timestamp.
    pub fn resolve_foreground_at(&mut self, now: Instant) -> Option<SessionHandle> {
        let pid = self.windows.foreground_process_id()?;
        self.resolve_at(pid, now)
    }

    /// Resolve the audio session owned by `pid`.
    pub fn resolve(&mut self, pid: ProcessId) -> Option<SessionHandle> {
        self.resolve_at(pid, Instant::now())
    }

    /// Resolve with an explicit timestamp (for testing).
    pub fn resolve_at(&mut self, pid: ProcessId, now: Instant) -> Option<SessionHandle> {
        if pid == self.own_pid {
            return self.cache.handle.clone();
        }

        if self.cache.is_fresh_for(pid, now) {
            debug!("session cache hit for pid {pid}");
            return self.cache.handle.clone();
        }

        let handle = self.lookup(pid);
        self.cache = ResolutionCache {
            pid: Some(pid),
            resolved_at: Some(now),
            handle: handle.clone(),
        };
        handle
    }

    fn lookup(&self, pid: ProcessId) -> Option<SessionHandle> {
        let Some(name) = self.windows.executable_basename(pid) else {
            debug!("could not determine executable for pid {pid}");
            return None;
        };

        let sessions = match self.sessions.enumerate_sessions() {
            Ok(s) => s,
            Err(e) => {
                warn!("failed to enumerate audio sessions: {e}");
                return None;
            }
        };

        let found = sessions
            .into_iter()
            .find(|entry| entry.process_name == name)
            .map(|entry| entry.handle);
        match &found {
            Some(_) => debug!("resolved audio session for {name} (pid {pid})"),
            None => debug!("no audio session for {name} (pid {pid})"),
        }
        found
    }
}
