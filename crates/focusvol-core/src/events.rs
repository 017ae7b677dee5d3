use std::fmt;

use tokio::sync::mpsc;

use crate::audio::SessionHandle;

/// Change notification published by the volume controller.
///
/// Carries the session it concerns so the receiver can keep talking to the
/// same application after focus moves elsewhere.
#[derive(Clone)]
pub enum VolumeEvent {
    Changed {
        session: SessionHandle,
        percent: u8,
        icon: Option<String>,
    },
    Muted {
        session: SessionHandle,
        icon: Option<String>,
    },
    Unmuted {
        session: SessionHandle,
        percent: u8,
        icon: Option<String>,
    },
}

impl VolumeEvent {
    #[must_use]
    pub fn session(&self) -> &SessionHandle {
        match self {
            VolumeEvent::Changed { session, .. }
            | VolumeEvent::Muted { session, .. }
            | VolumeEvent::Unmuted { session, .. } => session,
        }
    }

    /// Strip the session, leaving what the indicator needs to render.
    #[must_use]
    pub fn to_ui(&self) -> UiEvent {
        match self {
            VolumeEvent::Changed { percent, icon, .. } => UiEvent::VolumeChanged {
                percent: *percent,
                icon: icon.clone(),
            },
            VolumeEvent::Muted { icon, .. } => UiEvent::Muted { icon: icon.clone() },
            VolumeEvent::Unmuted { percent, icon, .. } => UiEvent::Unmuted {
                percent: *percent,
                icon: icon.clone(),
            },
        }
    }
}

impl fmt::Debug for VolumeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.session().process_name();
        match self {
            VolumeEvent::Changed { percent, .. } => write!(f, "Changed({name}, {percent}%)"),
            VolumeEvent::Muted { .. } => write!(f, "Muted({name})"),
            VolumeEvent::Unmuted { percent, .. } => write!(f, "Unmuted({name}, {percent}%)"),
        }
    }
}

/// Payload-only event delivered to the indicator on the UI loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    VolumeChanged { percent: u8, icon: Option<String> },
    Muted { icon: Option<String> },
    Unmuted { percent: u8, icon: Option<String> },
}

/// Typed publish/subscribe fan-out.
///
/// Publishing never blocks and may happen on any thread. Each subscriber
/// drains its receiver on its own event loop, so handlers always run in the
/// subscriber's context rather than the publisher's. Subscribers whose
/// receiver was dropped are pruned on the next publish.
pub struct EventBus<E> {
    subscribers: Vec<mpsc::UnboundedSender<E>>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        EventBus {
            subscribers: Vec::new(),
        }
    }
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn publish(&mut self, event: E) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSession;

    #[test]
    fn every_subscriber_receives_each_event() {
        let mut bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(7u8);
        bus.publish(9u8);

        assert_eq!(a.try_recv().unwrap(), 7);
        assert_eq!(a.try_recv().unwrap(), 9);
        assert_eq!(b.try_recv().unwrap(), 7);
        assert_eq!(b.try_recv().unwrap(), 9);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut bus = EventBus::new();
        let _kept = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(1u8);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn publish_from_another_thread() {
        let mut bus = EventBus::new();
        let mut rx = bus.subscribe();

        std::thread::spawn(move || bus.publish("hello"))
            .join()
            .unwrap();

        assert_eq!(rx.try_recv().unwrap(), "hello");
    }

    #[test]
    fn ui_event_drops_session() {
        let event = VolumeEvent::Unmuted {
            session: MockSession::new("mpv", 0.4),
            percent: 40,
            icon: None,
        };
        assert_eq!(
            event.to_ui(),
            UiEvent::Unmuted {
                percent: 40,
                icon: None
            }
        );
        assert_eq!(format!("{event:?}"), "Unmuted(mpv, 40%)");
    }
}
