use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::audio::{AudioError, SessionHandle, SessionSource, Volume, WindowSource};
use crate::events::{EventBus, VolumeEvent};
use crate::resolver::SessionResolver;

/// Default volume change per step (2% of full scale).
pub const DEFAULT_STEP: f64 = 0.02;

/// Repeated mute/unmute/toggle calls closer together than this are dropped.
pub const MUTE_DEBOUNCE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
enum Direction {
    Up,
    Down,
}

/// Volume and mute control for whichever application owns the focused window.
///
/// Every operation resolves the focused window's session first and is a
/// silent no-op when it has none. Successful operations publish exactly one
/// [`VolumeEvent`]. Failures from the sound server are logged and end the
/// operation; nothing is returned to the caller.
pub struct VolumeController<S, W> {
    resolver: SessionResolver<S, W>,
    step: f64,
    last_mute_call: Option<Instant>,
    events: EventBus<VolumeEvent>,
}

impl<S: SessionSource, W: WindowSource> VolumeController<S, W> {
    pub fn new(resolver: SessionResolver<S, W>) -> Self {
        VolumeController {
            resolver,
            step: DEFAULT_STEP,
            last_mute_call: None,
            events: EventBus::new(),
        }
    }

    /// Use a different step size. Non-positive or non-finite values keep the default.
    #[must_use]
    pub fn with_step(mut self, step: f64) -> Self {
        if step.is_finite() && step > 0.0 {
            self.step = step.min(1.0);
        }
        self
    }

    #[must_use]
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Receive every change this controller publishes.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<VolumeEvent> {
        self.events.subscribe()
    }

    pub fn volume_up(&mut self) {
        self.step_volume(Direction::Up, Instant::now());
    }

    pub fn volume_down(&mut self) {
        self.step_volume(Direction::Down, Instant::now());
    }

    /// Set the focused application's volume to `percent`.
    ///
    /// Values outside 0..=100 are ignored. The mute flag is left alone.
    pub fn set_volume(&mut self, percent: i32) {
        let Ok(percent) = u8::try_from(percent) else {
            return;
        };
        if percent > 100 {
            return;
        }
        let Some(session) = self.resolver.resolve_foreground() else {
            return;
        };
        if let Err(e) = session.set_master_volume(Volume::from_percent(percent)) {
            warn!("failed to set volume of {}: {e}", session.process_name());
            return;
        }
        self.events.publish(VolumeEvent::Changed {
            session,
            percent,
            icon: None,
        });
    }

    pub fn mute(&mut self) {
        self.mute_at(Instant::now());
    }

    pub fn unmute(&mut self) {
        self.unmute_at(Instant::now());
    }

    pub fn toggle_mute(&mut self) {
        self.toggle_mute_at(Instant::now());
    }

    /// [`Self::mute`] with an explicit timestamp (for testing).
    pub fn mute_at(&mut self, now: Instant) {
        if self.debounced(now) {
            return;
        }
        if let Some(session) = self.resolver.resolve_foreground_at(now) {
            self.apply_mute(session);
        }
    }

    /// [`Self::unmute`] with an explicit timestamp (for testing).
    pub fn unmute_at(&mut self, now: Instant) {
        if self.debounced(now) {
            return;
        }
        if let Some(session) = self.resolver.resolve_foreground_at(now) {
            self.apply_unmute(session);
        }
    }

    /// [`Self::toggle_mute`] with an explicit timestamp (for testing).
    pub fn toggle_mute_at(&mut self, now: Instant) {
        if self.debounced(now) {
            return;
        }
        let Some(session) = self.resolver.resolve_foreground_at(now) else {
            return;
        };
        match session.is_muted() {
            Ok(true) => self.apply_unmute(session),
            Ok(false) => self.apply_mute(session),
            Err(e) => warn!("failed to read mute state of {}: {e}", session.process_name()),
        }
    }

    /// Returns true when the call must be dropped. Only accepted calls move
    /// the debounce window.
    fn debounced(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_mute_call {
            if now.saturating_duration_since(last) < MUTE_DEBOUNCE {
                debug!("mute call dropped by debounce");
                return true;
            }
        }
        self.last_mute_call = Some(now);
        false
    }

    fn step_volume(&mut self, direction: Direction, now: Instant) {
        let Some(session) = self.resolver.resolve_foreground_at(now) else {
            return;
        };
        let delta = match direction {
            Direction::Up => self.step,
            Direction::Down => -self.step,
        };
        match step_session(&session, delta) {
            Ok(volume) => self.events.publish(VolumeEvent::Changed {
                session,
                percent: volume.percent(),
                icon: None,
            }),
            Err(e) => warn!("failed to step volume of {}: {e}", session.process_name()),
        }
    }

    fn apply_mute(&mut self, session: SessionHandle) {
        if let Err(e) = session.set_mute(true) {
            warn!("failed to mute {}: {e}", session.process_name());
            return;
        }
        debug!("muted {}", session.process_name());
        self.events.publish(VolumeEvent::Muted {
            session,
            icon: None,
        });
    }

    fn apply_unmute(&mut self, session: SessionHandle) {
        let volume = match unmute_session(&session) {
            Ok(v) => v,
            Err(e) => {
                warn!("failed to unmute {}: {e}", session.process_name());
                return;
            }
        };
        debug!("unmuted {}", session.process_name());
        self.events.publish(VolumeEvent::Unmuted {
            session,
            percent: volume.percent(),
            icon: None,
        });
    }
}

/// Unmute if needed, then move the volume by `delta`. Returns the new volume.
fn step_session(session: &SessionHandle, delta: f64) -> Result<Volume, AudioError> {
    if session.is_muted()? {
        session.set_mute(false)?;
    }
    let volume = session.master_volume()?.offset(delta);
    session.set_master_volume(volume)?;
    Ok(volume)
}

fn unmute_session(session: &SessionHandle) -> Result<Volume, AudioError> {
    session.set_mute(false)?;
    session.master_volume()
}
