use focusvol_core::hotkey::{HotkeyError, Key, KeyCapture, KeyEvent};
use tracing::trace;

/// Global key observation through `rdev`.
///
/// Needs an X11 session (XWayland works for most desktops). Keystrokes are
/// only observed, never grabbed.
#[derive(Debug, Default, Clone, Copy)]
pub struct RdevCapture;

impl KeyCapture for RdevCapture {
    fn run<F>(self, mut sink: F) -> Result<(), HotkeyError>
    where
        F: FnMut(KeyEvent) + Send + 'static,
    {
        rdev::listen(move |event| {
            if let Some(key_event) = translate(&event.event_type) {
                trace!("{key_event:?}");
                sink(key_event);
            }
        })
        .map_err(|e| HotkeyError::Capture(format!("{e:?}")))
    }
}

fn translate(event: &rdev::EventType) -> Option<KeyEvent> {
    match event {
        rdev::EventType::KeyPress(key) => map_key(*key).map(KeyEvent::press),
        rdev::EventType::KeyRelease(key) => map_key(*key).map(KeyEvent::release),
        _ => None,
    }
}

/// Map an `rdev` key to ours. Left and right modifiers collapse into one.
fn map_key(key: rdev::Key) -> Option<Key> {
    use rdev::Key as R;

    let mapped = match key {
        R::ControlLeft | R::ControlRight => Key::Ctrl,
        R::Alt => Key::Alt,
        R::AltGr => Key::AltGr,
        R::ShiftLeft | R::ShiftRight => Key::Shift,
        R::MetaLeft | R::MetaRight => Key::Cmd,
        R::PageUp => Key::PageUp,
        R::PageDown => Key::PageDown,
        R::Home => Key::Home,
        R::End => Key::End,
        R::Delete => Key::Delete,
        R::Space => Key::Space,
        R::Return | R::KpReturn => Key::Enter,
        R::Escape => Key::Esc,
        R::Tab => Key::Tab,
        R::Backspace => Key::Backspace,
        R::UpArrow => Key::Up,
        R::DownArrow => Key::Down,
        R::LeftArrow => Key::Left,
        R::RightArrow => Key::Right,
        R::F1 => Key::F(1),
        R::F2 => Key::F(2),
        R::F3 => Key::F(3),
        R::F4 => Key::F(4),
        R::F5 => Key::F(5),
        R::F6 => Key::F(6),
        R::F7 => Key::F(7),
        R::F8 => Key::F(8),
        R::F9 => Key::F(9),
        R::F10 => Key::F(10),
        R::F11 => Key::F(11),
        R::F12 => Key::F(12),
        other => return Key::printable(printable_char(other)?),
    };
    Some(mapped)
}

fn printable_char(key: rdev::Key) -> Option<char> {
    use rdev::Key as R;

    let c = match key {
        R::KeyA => 'a',
        R::KeyB => 'b',
        R::KeyC => 'c',
        R::KeyD => 'd',
        R::KeyE => 'e',
        R::KeyF => 'f',
        R::KeyG => 'g',
        R::KeyH => 'h',
        R::KeyI => 'i',
        R::KeyJ => 'j',
        R::KeyK => 'k',
        R::KeyL => 'l',
        R::KeyM => 'm',
        R::KeyN => 'n',
        R::KeyO => 'o',
        R::KeyP => 'p',
        R::KeyQ => 'q',
        R::KeyR => 'r',
        R::KeyS => 's',
        R::KeyT => 't',
        R::KeyU => 'u',
        R::KeyV => 'v',
        R::KeyW => 'w',
        R::KeyX => 'x',
        R::KeyY => 'y',
        R::KeyZ => 'z',
        R::Num0 | R::Kp0 => '0',
        R::Num1 | R::Kp1 => '1',
        R::Num2 | R::Kp2 => '2',
        R::Num3 | R::Kp3 => '3',
        R::Num4 | R::Kp4 => '4',
        R::Num5 | R::Kp5 => '5',
        R::Num6 | R::Kp6 => '6',
        R::Num7 | R::Kp7 => '7',
        R::Num8 | R::Kp8 => '8',
        R::Num9 | R::Kp9 => '9',
        R::Minus | R::KpMinus => '-',
        R::KpPlus => '+',
        R::KpMultiply => '*',
        R::KpDivide | R::Slash => '/',
        R::Equal => '=',
        R::LeftBracket => '[',
        R::RightBracket => ']',
        R::SemiColon => ';',
        R::Quote => '\'',
        R::BackSlash | R::IntlBackslash => '\\',
        R::BackQuote => '`',
        R::Comma => ',',
        R::Dot => '.',
        _ => return None,
    };
    Some(c)
}
