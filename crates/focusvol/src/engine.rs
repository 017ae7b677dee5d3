use std::time::Duration;

use focusvol_core::events::{UiEvent, VolumeEvent};
use focusvol_core::hub::BridgeHub;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::tray::TrayAction;

/// The on-screen volume indicator as seen from the UI loop.
pub trait PopupView {
    async fn on_volume_changed(&mut self, percent: u8, icon: Option<String>);

    async fn on_muted(&mut self, icon: Option<String>);

    async fn on_unmuted(&mut self, percent: u8, icon: Option<String>);

    /// The user set a volume on the indicator itself.
    async fn on_user_drag(&mut self, percent: u8);

    async fn hide(&mut self);

    /// Release the indicator at shutdown.
    async fn close(&mut self) {}
}

/// All channel endpoints consumed by the engine.
pub struct EngineChannels {
    pub volume_rx: mpsc::UnboundedReceiver<VolumeEvent>,
    pub tray_action_rx: mpsc::Receiver<TrayAction>,
}

async fn show<P: PopupView>(popup: &mut P, event: UiEvent) {
    match event {
        UiEvent::VolumeChanged { percent, icon } => popup.on_volume_changed(percent, icon).await,
        UiEvent::Muted { icon } => popup.on_muted(icon).await,
        UiEvent::Unmuted { percent, icon } => popup.on_unmuted(percent, icon).await,
    }
}

/// UI loop.
///
/// Owns the [`BridgeHub`], feeds controller events to the indicator and
/// applies volumes chosen there. The indicator hides itself `display`
/// after the last change.
pub async fn run<P: PopupView>(
    mut popup: P,
    display: Duration,
    channels: EngineChannels,
    cancel: CancellationToken,
) {
    let EngineChannels {
        mut volume_rx,
        mut tray_action_rx,
    } = channels;
    let mut hub = BridgeHub::new();
    let mut hide_at: Option<Instant> = None;

    info!("engine started");

    loop {
        let hide_deadline = hide_at.unwrap_or_else(Instant::now);
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("engine received shutdown signal");
                break;
            }

            Some(event) = volume_rx.recv() => {
                debug!("controller event: {event:?}");
                let ui = hub.on_controller_event(&event);
                show(&mut popup, ui).await;
                hide_at = Some(Instant::now() + display);
            }

            Some(action) = tray_action_rx.recv() => match action {
                TrayAction::SetVolume(percent) => {
                    let percent = percent.min(100);
                    popup.on_user_drag(percent).await;
                    // Short PulseAudio round trips; keep the other tasks running.
                    tokio::task::block_in_place(|| hub.apply_volume_from_ui(percent));
                    hide_at = Some(Instant::now() + display);
                }
                TrayAction::Quit => {
                    info!("quit requested from tray");
                    cancel.cancel();
                    break;
                }
            },

            _ = tokio::time::sleep_until(hide_deadline), if hide_at.is_some() => {
                popup.hide().await;
                hide_at = None;
            }
        }
    }

    popup.close().await;
}
