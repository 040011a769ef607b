//! Modifier flags
//!
//! Eight side-specific modifiers packed into one byte. The bit order is also
//! the canonical order in which shortcut outputs press their modifiers:
//! Ctrl-L, Ctrl-R, Alt-L, Alt-R, Win-L, Win-R, Shift-L, Shift-R.

use std::fmt;
use std::ops::{BitAnd, BitOr};

use evdev::Key;
use serde::Serialize;
use thiserror::Error;

use crate::keys::KeyCode;

/// A single side-specific modifier key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Modifier {
    LeftCtrl,
    RightCtrl,
    LeftAlt,
    RightAlt,
    LeftWin,
    RightWin,
    LeftShift,
    RightShift,
}

impl Modifier {
    /// All modifiers in canonical order.
    pub const CANONICAL: [Modifier; 8] = [
        Modifier::LeftCtrl,
        Modifier::RightCtrl,
        Modifier::LeftAlt,
        Modifier::RightAlt,
        Modifier::LeftWin,
        Modifier::RightWin,
        Modifier::LeftShift,
        Modifier::RightShift,
    ];

    pub fn bit(self) -> u8 {
        1 << (self as u8)
    }

    /// The key that is pressed to synthesize this modifier.
    pub fn key(self) -> KeyCode {
        let key = match self {
            Modifier::LeftCtrl => Key::KEY_LEFTCTRL,
            Modifier::RightCtrl => Key::KEY_RIGHTCTRL,
            Modifier::LeftAlt => Key::KEY_LEFTALT,
            Modifier::RightAlt => Key::KEY_RIGHTALT,
            Modifier::LeftWin => Key::KEY_LEFTMETA,
            Modifier::RightWin => Key::KEY_RIGHTMETA,
            Modifier::LeftShift => Key::KEY_LEFTSHIFT,
            Modifier::RightShift => Key::KEY_RIGHTSHIFT,
        };
        KeyCode::from(key)
    }

    /// Check if a key code is a modifier key and return which one.
    pub fn from_key(code: u16) -> Option<Self> {
        Self::CANONICAL
            .into_iter()
            .find(|modifier| modifier.key().code() == code)
    }

    /// Parse a modifier name (case-insensitive).
    ///
    /// Side-specific names are `LCtrl`, `RCtrl`, `LAlt`, `RAlt`, `LWin`,
    /// `RWin`, `LShift`, `RShift` (plus `Left*`/`Right*` spellings). The
    /// unsided `Ctrl`, `Alt`, `Shift` and `Win`/`Super`/`Meta` mean the left key
    /// only: a trigger written with `Shift` is not satisfied by right shift.
    /// Map both sides with two entries when either should match.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_uppercase().as_str() {
            "LCTRL" | "LEFTCTRL" | "CTRL" | "CONTROL" => Some(Modifier::LeftCtrl),
            "RCTRL" | "RIGHTCTRL" => Some(Modifier::RightCtrl),
            "LALT" | "LEFTALT" | "ALT" => Some(Modifier::LeftAlt),
            "RALT" | "RIGHTALT" | "ALTGR" => Some(Modifier::RightAlt),
            "LWIN" | "LEFTWIN" | "LSUPER" | "LMETA" | "LEFTMETA" | "WIN" | "SUPER" | "META" => {
                Some(Modifier::LeftWin)
            }
            "RWIN" | "RIGHTWIN" | "RSUPER" | "RMETA" | "RIGHTMETA" => Some(Modifier::RightWin),
            "LSHIFT" | "LEFTSHIFT" | "SHIFT" => Some(Modifier::LeftShift),
            "RSHIFT" | "RIGHTSHIFT" => Some(Modifier::RightShift),
            _ => None,
        }
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Modifier::LeftCtrl => "LCtrl",
            Modifier::RightCtrl => "RCtrl",
            Modifier::LeftAlt => "LAlt",
            Modifier::RightAlt => "RAlt",
            Modifier::LeftWin => "LWin",
            Modifier::RightWin => "RWin",
            Modifier::LeftShift => "LShift",
            Modifier::RightShift => "RShift",
        };
        write!(f, "{}", name)
    }
}

/// A set of modifiers, stored as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Modifiers(u8);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of modifiers in the set.
    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn contains(self, modifier: Modifier) -> bool {
        self.0 & modifier.bit() != 0
    }

    pub fn insert(&mut self, modifier: Modifier) {
        self.0 |= modifier.bit();
    }

    pub fn remove(&mut self, modifier: Modifier) {
        self.0 &= !modifier.bit();
    }

    pub fn with(mut self, modifier: Modifier) -> Self {
        self.insert(modifier);
        self
    }

    /// Iterate over the set in canonical order.
    pub fn iter(self) -> impl Iterator<Item = Modifier> {
        Modifier::CANONICAL
            .into_iter()
            .filter(move |modifier| self.contains(*modifier))
    }

    /// Parse a `+`-separated list such as `"LCtrl+LShift"`.
    ///
    /// An empty string is the empty set. Duplicates are rejected so that a
    /// typo like `"Ctrl+LCtrl"` doesn't go unnoticed.
    pub fn parse(input: &str) -> Result<Self, ModifierParseError> {
        let input = input.trim();
        let mut set = Modifiers::NONE;
        if input.is_empty() {
            return Ok(set);
        }

        for part in input.split('+') {
            let part = part.trim();
            let modifier = Modifier::from_name(part).ok_or_else(|| ModifierParseError {
                input: input.to_string(),
                reason: format!("unknown modifier '{}'", part),
            })?;
            if set.contains(modifier) {
                return Err(ModifierParseError {
                    input: input.to_string(),
                    reason: format!("duplicate modifier {}", modifier),
                });
            }
            set.insert(modifier);
        }

        Ok(set)
    }
}

impl BitAnd for Modifiers {
    type Output = Modifiers;

    fn bitand(self, rhs: Self) -> Self::Output {
        Modifiers(self.0 & rhs.0)
    }
}

impl BitOr for Modifiers {
    type Output = Modifiers;

    fn bitor(self, rhs: Self) -> Self::Output {
        Modifiers(self.0 | rhs.0)
    }
}

impl FromIterator<Modifier> for Modifiers {
    fn from_iter<I: IntoIterator<Item = Modifier>>(iter: I) -> Self {
        let mut set = Modifiers::NONE;
        for modifier in iter {
            set.insert(modifier);
        }
        set
    }
}

impl fmt::Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        for (i, modifier) in self.iter().enumerate() {
            if i > 0 {
                write!(f, "+")?;
            }
            write!(f, "{}", modifier)?;
        }
        Ok(())
    }
}

/// Error type for modifier list parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to parse modifiers '{input}': {reason}")]
pub struct ModifierParseError {
    pub input: String,
    pub reason: String,
}
