//! Text entry on the virtual keyboard
//!
//! A uinput keyboard can only press keys, so Unicode strokes are turned back
//! into characters and typed with the GTK/IBus hex entry sequence:
//! `Ctrl+Shift+U`, the code point in hex, then `Space`.

use evdev::Key;
use multikeys_core::{KeyStroke, Modifier, Modifiers, OutputFactory};

/// Reassembles characters from the UTF-16 units of Unicode down strokes.
#[derive(Debug, Default)]
pub struct Utf16Composer {
    pending_high: Option<u16>,
}

impl Utf16Composer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one code unit. Returns a character once one is complete.
    ///
    /// A high surrogate is held until its low half arrives. Unpaired halves
    /// are dropped.
    pub fn push(&mut self, unit: u16) -> Option<char> {
        match unit {
            0xD800..=0xDBFF => {
                if let Some(stale) = self.pending_high.replace(unit) {
                    tracing::debug!("Dropping unpaired high surrogate {:#06x}", stale);
                }
                None
            }
            0xDC00..=0xDFFF => match self.pending_high.take() {
                Some(high) => char::decode_utf16([high, unit])
                    .next()
                    .and_then(|r| r.ok()),
                None => {
                    tracing::debug!("Dropping unpaired low surrogate {:#06x}", unit);
                    None
                }
            },
            _ => {
                if let Some(stale) = self.pending_high.take() {
                    tracing::debug!("Dropping unpaired high surrogate {:#06x}", stale);
                }
                char::from_u32(u32::from(unit))
            }
        }
    }
}

/// Key strokes that type `ch` through hex entry.
pub fn hex_entry_strokes(factory: &OutputFactory, ch: char) -> Vec<KeyStroke> {
    let mut strokes = Vec::new();

    let prefix = Modifiers::NONE
        .with(Modifier::LeftCtrl)
        .with(Modifier::LeftShift);
    if let Ok(chord) = factory.virtual_key(Key::KEY_U.code(), prefix) {
        strokes.extend_from_slice(chord.down_strokes());
        strokes.extend_from_slice(chord.up_strokes());
    }

    for digit in format!("{:x}", u32::from(ch)).chars() {
        if let Some(key) = hex_digit_key(digit) {
            tap(factory, key, &mut strokes);
        }
    }
    tap(factory, Key::KEY_SPACE, &mut strokes);

    strokes
}

fn tap(factory: &OutputFactory, key: Key, strokes: &mut Vec<KeyStroke>) {
    if let Ok(output) = factory.virtual_key(key.code(), Modifiers::NONE) {
        strokes.extend_from_slice(output.down_strokes());
        strokes.extend_from_slice(output.up_strokes());
    }
}

fn hex_digit_key(digit: char) -> Option<Key> {
    let key = match digit {
        '0' => Key::KEY_0,
        '1' => Key::KEY_1,
        '2' => Key::KEY_2,
        '3' => Key::KEY_3,
        '4' => Key::KEY_4,
        '5' => Key::KEY_5,
        '6' => Key::KEY_6,
        '7' => Key::KEY_7,
        '8' => Key::KEY_8,
        '9' => Key::KEY_9,
        'a' => Key::KEY_A,
        'b' => Key::KEY_B,
        'c' => Key::KEY_C,
        'd' => Key::KEY_D,
        'e' => Key::KEY_E,
        'f' => Key::KEY_F,
        _ => return None,
    };
    Some(key)
}
