use crate::events::UiEvent;

/// Label shown while the application is muted.
pub const MUTED_LABEL: &str = "✕";

/// What the volume indicator displays.
///
/// The slider position and the label are tracked separately: muting moves
/// the slider to zero and swaps the label for [`MUTED_LABEL`], while a drag
/// updates the label without going through an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupModel {
    slider: u8,
    label: String,
    icon: Option<String>,
    muted: bool,
    visible: bool,
}

impl Default for PopupModel {
    fn default() -> Self {
        PopupModel {
            slider: 0,
            label: MUTED_LABEL.to_string(),
            icon: None,
            muted: false,
            visible: false,
        }
    }
}

impl PopupModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update from a controller event and become visible.
    pub fn apply(&mut self, event: &UiEvent) {
        match event {
            UiEvent::VolumeChanged { percent, icon } | UiEvent::Unmuted { percent, icon } => {
                self.slider = (*percent).min(100);
                self.label = self.slider.to_string();
                self.icon = icon.clone();
                self.muted = false;
            }
            UiEvent::Muted { icon } => {
                self.slider = 0;
                self.label = MUTED_LABEL.to_string();
                self.icon = icon.clone();
                self.muted = true;
            }
        }
        self.visible = true;
    }

    /// The user moved the slider. Returns the clamped value to apply.
    pub fn drag(&mut self, percent: u8) -> u8 {
        self.slider = percent.min(100);
        self.label = self.slider.to_string();
        self.muted = false;
        self.visible = true;
        self.slider
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    #[must_use]
    pub fn slider(&self) -> u8 {
        self.slider
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Icon to display: the one supplied with the last event, or a
    /// freedesktop icon name derived from the current level.
    #[must_use]
    pub fn icon_name(&self) -> String {
        if let Some(icon) = &self.icon {
            return icon.clone();
        }
        let name = match (self.muted, self.slider) {
            (true, _) | (false, 0) => "audio-volume-muted",
            (false, 1..=33) => "audio-volume-low",
            (false, 34..=66) => "audio-volume-medium",
            _ => "audio-volume-high",
        };
        name.to_string()
    }
}
