use std::time::Duration;

use focusvol_core::events::UiEvent;
use focusvol_core::popup::PopupModel;
use ksni::TrayMethods;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::engine::PopupView;

/// Actions from the system tray to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrayAction {
    /// The user picked a volume from the menu.
    SetVolume(u8),
    Quit,
}

/// Menu volume presets, in percent.
const PRESETS: [u8; 11] = [0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100];

struct FocusvolTray {
    model: PopupModel,
    action_tx: mpsc::Sender<TrayAction>,
}

impl FocusvolTray {
    fn send(&self, action: TrayAction) {
        // Menu callbacks are synchronous; never block the D-Bus dispatcher.
        if let Err(e) = self.action_tx.try_send(action) {
            warn!("tray action dropped: {e}");
        }
    }
}

impl ksni::Tray for FocusvolTray {
    fn id(&self) -> String {
        "focusvol".into()
    }

    fn title(&self) -> String {
        self.model.label().to_string()
    }

    fn status(&self) -> ksni::Status {
        if self.model.is_visible() {
            ksni::Status::Active
        } else {
            ksni::Status::Passive
        }
    }

    fn icon_name(&self) -> String {
        self.model.icon_name()
    }

    fn tool_tip(&self) -> ksni::ToolTip {
        ksni::ToolTip {
            title: format!("Volume: {}", self.model.label()),
            ..Default::default()
        }
    }

    fn menu(&self) -> Vec<ksni::MenuItem<Self>> {
        let current = self.model.slider();
        let presets = PRESETS
            .iter()
            .map(|&percent| {
                let marker = if percent == current { "● " } else { "" };
                ksni::MenuItem::Standard(ksni::menu::StandardItem {
                    label: format!("{marker}{percent}%"),
                    activate: Box::new(move |tray: &mut Self| {
                        tray.send(TrayAction::SetVolume(percent));
                    }),
                    ..Default::default()
                })
            })
            .collect();

        vec![
            ksni::MenuItem::SubMenu(ksni::menu::SubMenu {
                label: "Volume".into(),
                submenu: presets,
                ..Default::default()
            }),
            ksni::MenuItem::Separator,
            ksni::MenuItem::Standard(ksni::menu::StandardItem {
                label: "Quit".into(),
                activate: Box::new(|tray: &mut Self| tray.send(TrayAction::Quit)),
                ..Default::default()
            }),
        ]
    }
}

/// The volume indicator, shown as a StatusNotifierItem.
///
/// The item goes `Active` while the indicator is up and back to `Passive`
/// when hidden. Without a tray host every update is a no-op.
pub struct TrayPopup {
    handle: Option<ksni::Handle<FocusvolTray>>,
}

impl TrayPopup {
    /// Register the tray item.
    ///
    /// Uses ksni for SNI (StatusNotifierItem) registration on KDE/Wayland.
    pub async fn spawn(action_tx: mpsc::Sender<TrayAction>) -> Self {
        // spawn() consumes self, so reconstruct FocusvolTray on each retry.
        for attempt in 1..=5u64 {
            let tray = FocusvolTray {
                model: PopupModel::new(),
                action_tx: action_tx.clone(),
            };
            match tray.spawn().await {
                Ok(handle) => {
                    return TrayPopup {
                        handle: Some(handle),
                    }
                }
                Err(e) => {
                    if attempt < 5 {
                        warn!("tray spawn failed (attempt {attempt}/5): {e}");
                        tokio::time::sleep(Duration::from_millis(500 * attempt)).await;
                    } else {
                        warn!("tray spawn failed after {attempt} attempts: {e}");
                    }
                }
            }
        }
        TrayPopup { handle: None }
    }

    async fn update(&self, f: impl FnOnce(&mut PopupModel) + Send) {
        let Some(handle) = &self.handle else {
            return;
        };
        if handle.update(|tray| f(&mut tray.model)).await.is_none() {
            debug!("tray service is gone");
        }
    }
}

impl PopupView for TrayPopup {
    async fn on_volume_changed(&mut self, percent: u8, icon: Option<String>) {
        self.update(|m| m.apply(&UiEvent::VolumeChanged { percent, icon }))
            .await;
    }

    async fn on_muted(&mut self, icon: Option<String>) {
        self.update(|m| m.apply(&UiEvent::Muted { icon })).await;
    }

    async fn on_unmuted(&mut self, percent: u8, icon: Option<String>) {
        self.update(|m| m.apply(&UiEvent::Unmuted { percent, icon }))
            .await;
    }

    async fn on_user_drag(&mut self, percent: u8) {
        self.update(|m| {
            m.drag(percent);
        })
        .await;
    }

    async fn hide(&mut self) {
        self.update(PopupModel::hide).await;
    }

    async fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.shutdown().await;
        }
    }
}
