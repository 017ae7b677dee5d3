use tracing::{debug, warn};

use crate::audio::{AudioError, SessionHandle, Volume};
use crate::events::{UiEvent, VolumeEvent};

/// Meeting point between the volume controller and the indicator.
///
/// Lives on the UI loop. Controller events reach it through a channel, so
/// the last active session is only ever touched from that loop. Changes
/// made from the indicator go straight to that session and are not turned
/// back into events.
#[derive(Default)]
pub struct BridgeHub {
    last_session: Option<SessionHandle>,
}

impl BridgeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the event's session and return what the indicator should show.
    pub fn on_controller_event(&mut self, event: &VolumeEvent) -> UiEvent {
        self.last_session = Some(event.session().clone());
        event.to_ui()
    }

    /// The session the indicator currently refers to.
    #[must_use]
    pub fn last_session(&self) -> Option<&SessionHandle> {
        self.last_session.as_ref()
    }

    /// Apply a volume chosen in the indicator to the last active session.
    ///
    /// Unmutes first when needed. Does nothing before the first controller
    /// event. Blocks for the duration of the sound server round trips.
    pub fn apply_volume_from_ui(&self, percent: u8) {
        let Some(session) = &self.last_session else {
            debug!("no active session for volume {percent}%");
            return;
        };
        if let Err(e) = apply(session, Volume::from_percent(percent)) {
            warn!(
                "failed to apply volume {percent}% to {}: {e}",
                session.process_name()
            );
        }
    }
}

fn apply(session: &SessionHandle, volume: Volume) -> Result<(), AudioError> {
    if session.is_muted()? {
        session.set_mute(false)?;
    }
    session.set_master_volume(volume)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::audio::ProcessId;
    use crate::controller::VolumeController;
    use crate::mock::{MockPlatform, MockSession};
    use crate::resolver::SessionResolver;

    #[test]
    fn ui_change_without_history_is_noop() {
        let hub = BridgeHub::new();
        hub.apply_volume_from_ui(40);
        assert!(hub.last_session().is_none());
    }

    #[test]
    fn controller_event_updates_last_session() {
        let mut hub = BridgeHub::new();
        let a = MockSession::new("a", 0.1);
        let b = MockSession::new("b", 0.2);

        hub.on_controller_event(&VolumeEvent::Muted {
            session: a,
            icon: None,
        });
        let ui = hub.on_controller_event(&VolumeEvent::Changed {
            session: b.clone(),
            percent: 20,
            icon: Some("audio-volume-low".into()),
        });

        let expected: SessionHandle = b;
        assert!(Arc::ptr_eq(hub.last_session().unwrap(), &expected));
        assert_eq!(
            ui,
            UiEvent::VolumeChanged {
                percent: 20,
                icon: Some("audio-volume-low".into())
            }
        );
    }

    #[test]
    fn ui_change_unmutes_and_writes_volume() {
        let mut hub = BridgeHub::new();
        let session = MockSession::new("mpv", 0.7);
        session.force_mute(true);
        hub.on_controller_event(&VolumeEvent::Muted {
            session: session.clone(),
            icon: None,
        });

        hub.apply_volume_from_ui(25);

        assert!(!session.muted());
        assert!((session.volume() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn ui_change_on_vanished_session_is_contained() {
        let mut hub = BridgeHub::new();
        let session = MockSession::new("mpv", 0.7);
        hub.on_controller_event(&VolumeEvent::Muted {
            session: session.clone(),
            icon: None,
        });
        session.vanish();

        hub.apply_volume_from_ui(25);
        assert_eq!(session.volume_writes(), 0);
    }

    #[test]
    fn drag_after_hotkey_targets_reported_session_without_new_event() {
        let platform = MockPlatform::new();
        platform.add_process(100, "firefox");
        platform.focus(100);
        let firefox = platform.add_session("firefox", 0.5);
        let resolver =
            SessionResolver::new(platform.clone(), platform.clone()).with_own_pid(ProcessId(1));
        let mut controller = VolumeController::new(resolver);
        let mut events = controller.subscribe();
        let mut hub = BridgeHub::new();

        controller.volume_up();
        let event = events.try_recv().unwrap();
        hub.on_controller_event(&event);

        // Focus moves to another application; the drag still targets firefox.
        platform.add_process(200, "terminal");
        platform.focus(200);
        hub.apply_volume_from_ui(40);

        assert!((firefox.volume() - 0.40).abs() < 1e-9);
        assert!(events.try_recv().is_err());
    }
}
