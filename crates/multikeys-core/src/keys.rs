//! Key codes and key names
//!
//! Key codes live in the Linux evdev key-code space. Names are resolved the
//! same way everywhere (config, CLI, daemon): a short alias table for the
//! common spellings, then evdev's own `KEY_*` names.

use std::fmt;
use std::str::FromStr;

use evdev::Key;
use serde::Serialize;

use crate::error::BuildError;

/// Highest key code the kernel accepts (`KEY_MAX`)
const KEY_MAX: u16 = 0x2ff;

/// A validated key code in the evdev key-code space.
///
/// Code 0 (`KEY_RESERVED`) and anything above `KEY_MAX` are rejected, so a
/// `KeyCode` can always be handed to the virtual device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct KeyCode(u16);

impl KeyCode {
    /// Validate a raw key code.
    pub fn new(code: u16) -> Result<Self, BuildError> {
        if code == 0 || code > KEY_MAX {
            return Err(BuildError::InvalidKeyCode { code });
        }
        Ok(Self(code))
    }

    pub fn code(self) -> u16 {
        self.0
    }

    pub fn to_key(self) -> Key {
        Key::new(self.0)
    }
}

impl From<Key> for KeyCode {
    fn from(key: Key) -> Self {
        Self(key.code())
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = format!("{:?}", self.to_key());
        match name.strip_prefix("KEY_") {
            Some(short) => write!(f, "{}", short),
            None => write!(f, "{:#06x}", self.0),
        }
    }
}

/// Spellings that don't match evdev's `KEY_*` names directly.
const ALIASES: &[(&[&str], Key)] = &[
    (&["CAPSLOCK", "CAPS_LOCK", "CAPS"], Key::KEY_CAPSLOCK),
    (&["ESCAPE", "ESC"], Key::KEY_ESC),
    (&["ENTER", "RETURN"], Key::KEY_ENTER),
    (&["LEFTCTRL", "LCTRL", "CTRL"], Key::KEY_LEFTCTRL),
    (&["RIGHTCTRL", "RCTRL"], Key::KEY_RIGHTCTRL),
    (&["LEFTSHIFT", "LSHIFT", "SHIFT"], Key::KEY_LEFTSHIFT),
    (&["RIGHTSHIFT", "RSHIFT"], Key::KEY_RIGHTSHIFT),
    (&["LEFTALT", "LALT", "ALT"], Key::KEY_LEFTALT),
    (&["RIGHTALT", "RALT", "ALTGR"], Key::KEY_RIGHTALT),
    (
        &["LEFTMETA", "LMETA", "LWIN", "SUPER", "META", "WIN"],
        Key::KEY_LEFTMETA,
    ),
    (&["RIGHTMETA", "RMETA", "RWIN"], Key::KEY_RIGHTMETA),
    (&["MINUS", "-"], Key::KEY_MINUS),
    (&["EQUALS", "EQUAL", "="], Key::KEY_EQUAL),
    (&["LEFTBRACE", "LBRACE", "["], Key::KEY_LEFTBRACE),
    (&["RIGHTBRACE", "RBRACE", "]"], Key::KEY_RIGHTBRACE),
    (&["SEMICOLON", ";"], Key::KEY_SEMICOLON),
    (&["APOSTROPHE", "'"], Key::KEY_APOSTROPHE),
    (&["GRAVE", "`"], Key::KEY_GRAVE),
    (&["BACKSLASH", "\\"], Key::KEY_BACKSLASH),
    (&["COMMA", ","], Key::KEY_COMMA),
    (&["DOT", "PERIOD", "."], Key::KEY_DOT),
    (&["SLASH", "/"], Key::KEY_SLASH),
    (&["UPARROW"], Key::KEY_UP),
    (&["DOWNARROW"], Key::KEY_DOWN),
    (&["LEFTARROW"], Key::KEY_LEFT),
    (&["RIGHTARROW"], Key::KEY_RIGHT),
    (&["PGUP"], Key::KEY_PAGEUP),
    (&["PGDN", "PGDOWN"], Key::KEY_PAGEDOWN),
    (&["INS"], Key::KEY_INSERT),
    (&["DEL"], Key::KEY_DELETE),
    (&["NUMPAD0"], Key::KEY_KP0),
    (&["NUMPAD1"], Key::KEY_KP1),
    (&["NUMPAD2"], Key::KEY_KP2),
    (&["NUMPAD3"], Key::KEY_KP3),
    (&["NUMPAD4"], Key::KEY_KP4),
    (&["NUMPAD5"], Key::KEY_KP5),
    (&["NUMPAD6"], Key::KEY_KP6),
    (&["NUMPAD7"], Key::KEY_KP7),
    (&["NUMPAD8"], Key::KEY_KP8),
    (&["NUMPAD9"], Key::KEY_KP9),
    (&["KPDECIMAL", "NUMPAD_DOT"], Key::KEY_KPDOT),
    (&["NUMPAD_ENTER"], Key::KEY_KPENTER),
    (&["KPADD", "NUMPAD_PLUS"], Key::KEY_KPPLUS),
    (&["KPSUBTRACT", "NUMPAD_MINUS"], Key::KEY_KPMINUS),
    (&["KPMULTIPLY", "NUMPAD_MULTIPLY"], Key::KEY_KPASTERISK),
    (&["KPDIVIDE", "NUMPAD_DIVIDE"], Key::KEY_KPSLASH),
    (&["NUM_LOCK"], Key::KEY_NUMLOCK),
    (&["XF86BACK"], Key::KEY_BACK),
    (&["XF86FORWARD"], Key::KEY_FORWARD),
];

/// Parse a key name (case-insensitive) into a key code.
///
/// Accepts the aliases above, bare evdev names without the prefix
/// (`"A"`, `"F13"`, `"Home"`, `"KP7"`) and raw evdev names (`"KEY_LEFTMETA"`).
/// Returns `None` for anything else.
pub fn parse_key(name: &str) -> Option<KeyCode> {
    let upper = name.trim().to_uppercase();
    if upper.is_empty() {
        return None;
    }

    if let Some((_, key)) = ALIASES
        .iter()
        .find(|(names, _)| names.contains(&upper.as_str()))
    {
        return Some(KeyCode::from(*key));
    }

    let raw = if upper.starts_with("KEY_") {
        upper
    } else {
        format!("KEY_{}", upper)
    };

    match Key::from_str(&raw) {
        Ok(key) => KeyCode::new(key.code()).ok(),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_aliases() {
        assert_eq!(parse_key("CapsLock"), Some(Key::KEY_CAPSLOCK.into()));
        assert_eq!(parse_key("esc"), Some(Key::KEY_ESC.into()));
        assert_eq!(parse_key("Super"), Some(Key::KEY_LEFTMETA.into()));
        assert_eq!(parse_key("["), Some(Key::KEY_LEFTBRACE.into()));
        assert_eq!(parse_key("PgDn"), Some(Key::KEY_PAGEDOWN.into()));
    }

    #[test]
    fn test_parse_key_bare_evdev_names() {
        assert_eq!(parse_key("A"), Some(Key::KEY_A.into()));
        assert_eq!(parse_key("f13"), Some(Key::KEY_F13.into()));
        assert_eq!(parse_key("Home"), Some(Key::KEY_HOME.into()));
        assert_eq!(parse_key("7"), Some(Key::KEY_7.into()));
        assert_eq!(parse_key("KP7"), Some(Key::KEY_KP7.into()));
    }

    #[test]
    fn test_parse_key_raw_evdev_format() {
        assert_eq!(parse_key("KEY_LEFTMETA"), Some(Key::KEY_LEFTMETA.into()));
        assert_eq!(parse_key("key_esc"), Some(Key::KEY_ESC.into()));
    }

    #[test]
    fn test_parse_key_unknown() {
        assert_eq!(parse_key("NotAKey"), None);
        assert_eq!(parse_key("KEY_NOTAKEY123"), None);
        assert_eq!(parse_key(""), None);
        assert_eq!(parse_key("RESERVED"), None, "KEY_RESERVED is not a usable key");
    }

    #[test]
    fn test_key_code_bounds() {
        assert!(KeyCode::new(0).is_err());
        assert!(KeyCode::new(0x2ff).is_ok());
        assert_eq!(
            KeyCode::new(0x300),
            Err(BuildError::InvalidKeyCode { code: 0x300 })
        );
    }

    #[test]
    fn test_key_code_display() {
        assert_eq!(KeyCode::from(Key::KEY_A).to_string(), "A");
        assert_eq!(KeyCode::from(Key::KEY_LEFTCTRL).to_string(), "LEFTCTRL");
    }
}
