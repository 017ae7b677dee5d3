use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HotkeyError {
    #[error("a hotkey needs at least one key")]
    Empty,
    #[error("invalid key '{0}'")]
    InvalidKey(String),
    #[error("key capture failed: {0}")]
    Capture(String),
}

/// A key as seen by the dispatcher.
///
/// Left and right variants of a modifier are the same key. Printable keys
/// are identified by their lowercase ASCII character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Ctrl,
    Alt,
    AltGr,
    Shift,
    Cmd,
    PageUp,
    PageDown,
    Home,
    End,
    Delete,
    Space,
    Enter,
    Esc,
    Tab,
    Backspace,
    Up,
    Down,
    Left,
    Right,
    F(u8),
    Char(char),
}

/// Named keys accepted in hotkey definitions, in canonical spelling.
const NAMED_KEYS: &[(&str, Key)] = &[
    ("ctrl", Key::Ctrl),
    ("alt", Key::Alt),
    ("shift", Key::Shift),
    ("cmd", Key::Cmd),
    ("alt_gr", Key::AltGr),
    ("page_up", Key::PageUp),
    ("page_down", Key::PageDown),
    ("home", Key::Home),
    ("end", Key::End),
    ("delete", Key::Delete),
    ("space", Key::Space),
    ("enter", Key::Enter),
    ("esc", Key::Esc),
    ("tab", Key::Tab),
    ("backspace", Key::Backspace),
    ("up", Key::Up),
    ("down", Key::Down),
    ("left", Key::Left),
    ("right", Key::Right),
];

const ALIASES: &[(&str, Key)] = &[
    ("altgr", Key::AltGr),
    ("pageup", Key::PageUp),
    ("pagedown", Key::PageDown),
];

impl Key {
    /// Every accepted multi-character key name, canonical spelling first.
    pub fn names() -> impl Iterator<Item = String> {
        NAMED_KEYS
            .iter()
            .map(|(name, _)| (*name).to_string())
            .chain((1..=12).map(|n| format!("f{n}")))
    }

    /// A printable key: ASCII 33..=126, stored lowercase.
    #[must_use]
    pub fn printable(c: char) -> Option<Key> {
        if c.is_ascii_graphic() {
            Some(Key::Char(c.to_ascii_lowercase()))
        } else {
            None
        }
    }
}

impl FromStr for Key {
    type Err = HotkeyError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let invalid = || HotkeyError::InvalidKey(token.to_string());
        let lower = token.to_lowercase();

        let mut chars = lower.chars();
        match (chars.next(), chars.next()) {
            (None, _) => return Err(invalid()),
            (Some(c), None) => return Key::printable(c).ok_or_else(invalid),
            _ => {}
        }

        if let Some((_, key)) = NAMED_KEYS
            .iter()
            .chain(ALIASES)
            .find(|(name, _)| *name == lower)
        {
            return Ok(*key);
        }

        (1..=12u8)
            .find(|n| lower == format!("f{n}"))
            .map(Key::F)
            .ok_or_else(invalid)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::F(n) => write!(f, "f{n}"),
            Key::Char(c) => write!(f, "{c}"),
            named => {
                let name = NAMED_KEYS
                    .iter()
                    .find(|(_, key)| key == named)
                    .map_or("?", |(name, _)| *name);
                f.write_str(name)
            }
        }
    }
}

/// Whether a key went down or came up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Press,
    Release,
}

/// A raw key transition delivered by a [`KeyCapture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub action: KeyAction,
}

impl KeyEvent {
    #[must_use]
    pub fn press(key: Key) -> Self {
        KeyEvent {
            key,
            action: KeyAction::Press,
        }
    }

    #[must_use]
    pub fn release(key: Key) -> Self {
        KeyEvent {
            key,
            action: KeyAction::Release,
        }
    }
}

/// A validated, normalized set of keys that must be held together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeyCombo {
    keys: BTreeSet<Key>,
}

impl HotkeyCombo {
    /// Parse key tokens such as `["ctrl", "page_up"]`.
    pub fn parse<T: AsRef<str>>(tokens: &[T]) -> Result<Self, HotkeyError> {
        if tokens.is_empty() {
            return Err(HotkeyError::Empty);
        }
        let keys = tokens
            .iter()
            .map(|t| t.as_ref().parse::<Key>())
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(HotkeyCombo { keys })
    }

    #[must_use]
    pub fn contains(&self, key: Key) -> bool {
        self.keys.contains(&key)
    }

    #[must_use]
    pub fn keys(&self) -> &BTreeSet<Key> {
        &self.keys
    }
}

impl fmt::Display for HotkeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.keys.iter().map(Key::to_string).collect();
        f.write_str(&names.join("+"))
    }
}

/// Which keys of one combo are currently held.
#[derive(Debug, Default)]
struct PressState {
    held: BTreeSet<Key>,
    fired: bool,
}

impl PressState {
    /// Returns true when this press completes the combo for the first time
    /// since it was last incomplete.
    fn press(&mut self, combo: &HotkeyCombo, key: Key) -> bool {
        if !combo.contains(key) {
            return false;
        }
        self.held.insert(key);
        if !self.fired && self.held == combo.keys {
            self.fired = true;
            return true;
        }
        false
    }

    fn release(&mut self, combo: &HotkeyCombo, key: Key) {
        // Sides are not tracked: releasing either Ctrl releases Ctrl.
        if combo.contains(key) {
            self.held.remove(&key);
            self.fired = false;
        }
    }
}

type Callback = Box<dyn FnMut() + Send>;

struct Binding {
    combo: HotkeyCombo,
    state: PressState,
    callback: Callback,
}

/// Source of global key events.
///
/// Implementations only observe: the keystrokes still reach the focused
/// application.
pub trait KeyCapture: Send + 'static {
    /// Deliver events to `sink` until capture ends. Blocks the calling thread.
    fn run<F>(self, sink: F) -> Result<(), HotkeyError>
    where
        F: FnMut(KeyEvent) + Send + 'static;
}

/// Handle to a listener started with [`HotkeyDispatcher::listen`].
pub struct ListenerHandle {
    stopped: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl ListenerHandle {
    /// Stop delivering events to callbacks. The process keeps running.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

/// Registry of global hotkeys.
///
/// Each combo tracks its own press state, so combos never depend on the
/// order in which their keys go down. Callbacks run synchronously on the
/// thread that delivers key events.
#[derive(Default)]
pub struct HotkeyDispatcher {
    bindings: Vec<Binding>,
}

impl HotkeyDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` to run whenever all of `keys` are held together.
    pub fn register<T, F>(&mut self, keys: &[T], callback: F) -> Result<(), HotkeyError>
    where
        T: AsRef<str>,
        F: FnMut() + Send + 'static,
    {
        self.register_combo(HotkeyCombo::parse(keys)?, callback);
        Ok(())
    }

    /// Register an already validated combo.
    pub fn register_combo<F>(&mut self, combo: HotkeyCombo, callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        debug!("registered hotkey {combo}");
        self.bindings.push(Binding {
            combo,
            state: PressState::default(),
            callback: Box::new(callback),
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Feed one key event to every registered combo.
    pub fn dispatch(&mut self, event: KeyEvent) {
        for binding in &mut self.bindings {
            match event.action {
                KeyAction::Press => {
                    if binding.state.press(&binding.combo, event.key) {
                        debug!("hotkey {} fired", binding.combo);
                        (binding.callback)();
                    }
                }
                KeyAction::Release => binding.state.release(&binding.combo, event.key),
            }
        }
    }

    /// Start capturing on a background thread and return immediately.
    pub fn listen<C: KeyCapture>(self, capture: C) -> Result<ListenerHandle, HotkeyError> {
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = stopped.clone();
        let thread = std::thread::Builder::new()
            .name("hotkeys".into())
            .spawn(move || {
                if let Err(e) = self.run_capture(capture, Some(flag)) {
                    warn!("hotkey listener ended: {e}");
                }
            })
            .map_err(|e| HotkeyError::Capture(e.to_string()))?;
        Ok(ListenerHandle { stopped, thread })
    }

    /// Capture on the calling thread until capture ends.
    pub fn listen_blocking<C: KeyCapture>(self, capture: C) -> Result<(), HotkeyError> {
        self.run_capture(capture, None)
    }

    fn run_capture<C: KeyCapture>(
        mut self,
        capture: C,
        stopped: Option<Arc<AtomicBool>>,
    ) -> Result<(), HotkeyError> {
        capture.run(move |event| {
            if stopped.as_ref().is_some_and(|s| s.load(Ordering::SeqCst)) {
                return;
            }
            self.dispatch(event);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn fired(count: &Arc<AtomicUsize>) -> usize {
        count.load(Ordering::SeqCst)
    }

    fn ctrl_pageup() -> (HotkeyDispatcher, Arc<AtomicUsize>) {
        let mut d = HotkeyDispatcher::new();
        let (count, cb) = counter();
        d.register(&["ctrl", "page_up"], cb).unwrap();
        (d, count)
    }

    #[test]
    fn fires_once_when_combo_completes() {
        let (mut d, count) = ctrl_pageup();
        d.dispatch(KeyEvent::press(Key::Ctrl));
        assert_eq!(fired(&count), 0);
        d.dispatch(KeyEvent::press(Key::PageUp));
        assert_eq!(fired(&count), 1);
    }

    #[test]
    fn press_order_does_not_matter() {
        let (mut d, count) = ctrl_pageup();
        d.dispatch(KeyEvent::press(Key::PageUp));
        d.dispatch(KeyEvent::press(Key::Ctrl));
        assert_eq!(fired(&count), 1);
    }

    #[test]
    fn key_repeat_does_not_refire() {
        let (mut d, count) = ctrl_pageup();
        d.dispatch(KeyEvent::press(Key::Ctrl));
        d.dispatch(KeyEvent::press(Key::PageUp));
        for _ in 0..5 {
            d.dispatch(KeyEvent::press(Key::PageUp));
            d.dispatch(KeyEvent::press(Key::Ctrl));
        }
        assert_eq!(fired(&count), 1);
    }

    #[test]
    fn release_and_repress_fires_again() {
        let (mut d, count) = ctrl_pageup();
        d.dispatch(KeyEvent::press(Key::Ctrl));
        d.dispatch(KeyEvent::press(Key::PageUp));
        d.dispatch(KeyEvent::release(Key::PageUp));
        d.dispatch(KeyEvent::press(Key::PageUp));
        assert_eq!(fired(&count), 2);

        d.dispatch(KeyEvent::release(Key::Ctrl));
        d.dispatch(KeyEvent::release(Key::PageUp));
        d.dispatch(KeyEvent::press(Key::PageUp));
        d.dispatch(KeyEvent::press(Key::Ctrl));
        assert_eq!(fired(&count), 3);
    }

    #[test]
    fn release_never_fires() {
        let (mut d, count) = ctrl_pageup();
        d.dispatch(KeyEvent::press(Key::Ctrl));
        d.dispatch(KeyEvent::press(Key::PageUp));
        d.dispatch(KeyEvent::release(Key::Ctrl));
        d.dispatch(KeyEvent::release(Key::PageUp));
        assert_eq!(fired(&count), 1);
    }

    #[test]
    fn unrelated_keys_are_ignored() {
        let (mut d, count) = ctrl_pageup();
        d.dispatch(KeyEvent::press(Key::Ctrl));
        d.dispatch(KeyEvent::press(Key::Char('x')));
        d.dispatch(KeyEvent::release(Key::Char('x')));
        d.dispatch(KeyEvent::press(Key::PageUp));
        assert_eq!(fired(&count), 1);
    }

    #[test]
    fn combos_are_independent() {
        let mut d = HotkeyDispatcher::new();
        let (up, up_cb) = counter();
        let (mute, mute_cb) = counter();
        d.register(&["alt_gr", "page_up"], up_cb).unwrap();
        d.register(&["alt_gr", "shift"], mute_cb).unwrap();

        d.dispatch(KeyEvent::press(Key::AltGr));
        d.dispatch(KeyEvent::press(Key::PageUp));
        d.dispatch(KeyEvent::press(Key::Shift));
        assert_eq!(fired(&up), 1);
        assert_eq!(fired(&mute), 1);

        d.dispatch(KeyEvent::release(Key::Shift));
        d.dispatch(KeyEvent::press(Key::Shift));
        assert_eq!(fired(&up), 1);
        assert_eq!(fired(&mute), 2);
    }

    #[test]
    fn single_key_combo() {
        let mut d = HotkeyDispatcher::new();
        let (count, cb) = counter();
        d.register(&["f9"], cb).unwrap();
        d.dispatch(KeyEvent::press(Key::F(9)));
        d.dispatch(KeyEvent::release(Key::F(9)));
        d.dispatch(KeyEvent::press(Key::F(9)));
        assert_eq!(fired(&count), 2);
    }

    #[test]
    fn empty_combo_is_rejected() {
        let mut d = HotkeyDispatcher::new();
        let keys: [&str; 0] = [];
        assert_eq!(d.register(&keys, || {}), Err(HotkeyError::Empty));
        assert!(d.is_empty());
    }

    #[test]
    fn unknown_multi_char_token_is_rejected() {
        let mut d = HotkeyDispatcher::new();
        assert_eq!(
            d.register(&["ctrl", "zz"], || {}),
            Err(HotkeyError::InvalidKey("zz".into()))
        );
        assert!(d.is_empty());
    }

    #[test]
    fn function_keys_need_exact_spelling() {
        let mut d = HotkeyDispatcher::new();
        for token in ["f01", "f+1", "f012", "F001"] {
            assert_eq!(
                d.register(&["ctrl", token], || {}),
                Err(HotkeyError::InvalidKey(token.into()))
            );
        }
        assert!(d.is_empty());

        for name in Key::names().filter(|n| n.starts_with('f')) {
            assert!(d.register(&["ctrl", name.as_str()], || {}).is_ok(), "{name}");
        }
        assert_eq!(d.len(), 12);
    }

    #[test]
    fn ctrl_a_is_accepted() {
        let mut d = HotkeyDispatcher::new();
        assert!(d.register(&["ctrl", "a"], || {}).is_ok());
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn token_validation() {
        assert!("".parse::<Key>().is_err());
        assert!(" ".parse::<Key>().is_err());
        assert!("é".parse::<Key>().is_err());
        assert!("\u{7f}".parse::<Key>().is_err());
        assert!("f0".parse::<Key>().is_err());
        assert!("f13".parse::<Key>().is_err());
        assert!("f01".parse::<Key>().is_err());
        assert!("f+1".parse::<Key>().is_err());
        assert!("f012".parse::<Key>().is_err());
        assert!("f 1".parse::<Key>().is_err());
        assert_eq!("!".parse::<Key>(), Ok(Key::Char('!')));
        assert_eq!("~".parse::<Key>(), Ok(Key::Char('~')));
        assert_eq!("F12".parse::<Key>(), Ok(Key::F(12)));
    }

    #[test]
    fn tokens_are_normalized_to_lowercase() {
        assert_eq!("CTRL".parse::<Key>(), Ok(Key::Ctrl));
        assert_eq!("Page_Up".parse::<Key>(), Ok(Key::PageUp));
        assert_eq!("A".parse::<Key>(), Ok(Key::Char('a')));
    }

    #[test]
    fn aliases_resolve_to_canonical_keys() {
        assert_eq!("pageup".parse::<Key>(), Ok(Key::PageUp));
        assert_eq!("pagedown".parse::<Key>(), Ok(Key::PageDown));
        assert_eq!("altgr".parse::<Key>(), Ok(Key::AltGr));
    }

    #[test]
    fn combo_display_is_canonical() {
        let combo = HotkeyCombo::parse(&["PAGEUP", "ctrl"]).unwrap();
        assert_eq!(combo.to_string(), "ctrl+page_up");
    }

    #[test]
    fn names_cover_function_keys() {
        let names: Vec<String> = Key::names().collect();
        assert!(names.contains(&"alt_gr".to_string()));
        assert!(names.contains(&"f12".to_string()));
        assert!(!names.contains(&"pageup".to_string()));
    }

    /// Capture that replays a fixed script, then ends.
    struct ScriptedCapture(Vec<KeyEvent>);

    impl KeyCapture for ScriptedCapture {
        fn run<F>(self, mut sink: F) -> Result<(), HotkeyError>
        where
            F: FnMut(KeyEvent) + Send + 'static,
        {
            for event in self.0 {
                sink(event);
            }
            Ok(())
        }
    }

    /// Capture fed from a channel, ending when the sender is dropped.
    struct ChannelCapture(mpsc::Receiver<KeyEvent>);

    impl KeyCapture for ChannelCapture {
        fn run<F>(self, mut sink: F) -> Result<(), HotkeyError>
        where
            F: FnMut(KeyEvent) + Send + 'static,
        {
            while let Ok(event) = self.0.recv() {
                sink(event);
            }
            Ok(())
        }
    }

    #[test]
    fn listen_blocking_runs_on_caller_thread() {
        let (d, count) = ctrl_pageup();
        let script = vec![
            KeyEvent::press(Key::Ctrl),
            KeyEvent::press(Key::PageUp),
            KeyEvent::release(Key::PageUp),
            KeyEvent::press(Key::PageUp),
        ];
        d.listen_blocking(ScriptedCapture(script)).unwrap();
        assert_eq!(fired(&count), 2);
    }

    #[test]
    fn listen_runs_callbacks_on_background_thread() {
        let mut d = HotkeyDispatcher::new();
        let (name_tx, name_rx) = mpsc::channel();
        d.register(&["ctrl", "a"], move || {
            let name = std::thread::current().name().map(str::to_string);
            let _ = name_tx.send(name);
        })
        .unwrap();

        let (key_tx, key_rx) = mpsc::channel();
        let handle = d.listen(ChannelCapture(key_rx)).unwrap();
        key_tx.send(KeyEvent::press(Key::Ctrl)).unwrap();
        key_tx.send(KeyEvent::press(Key::Char('a'))).unwrap();

        let name = name_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(name.as_deref(), Some("hotkeys"));
        assert!(!handle.is_stopped());
    }

    #[test]
    fn stopped_listener_discards_events() {
        let (d, count) = ctrl_pageup();
        let (key_tx, key_rx) = mpsc::channel();
        let handle = d.listen(ChannelCapture(key_rx)).unwrap();

        handle.stop();
        key_tx.send(KeyEvent::press(Key::Ctrl)).unwrap();
        key_tx.send(KeyEvent::press(Key::PageUp)).unwrap();
        drop(key_tx);

        for _ in 0..200 {
            if handle.is_finished() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(handle.is_finished());
        assert_eq!(fired(&count), 0);
    }
}
