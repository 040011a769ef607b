//! Errors raised while building remap tables

use thiserror::Error;

use crate::output::OutputKind;

/// Errors that can occur while turning an output specification into a
/// descriptor.
///
/// These only ever happen at table build time. A table that built
/// successfully never produces an error during lookup or replay.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// The value is above U+10FFFF or inside the surrogate range
    #[error("invalid Unicode scalar value U+{value:04X}")]
    InvalidScalar { value: u32 },

    /// The key code is outside the platform key-code space
    #[error("invalid key code {code:#06x}")]
    InvalidKeyCode { code: u16 },

    /// A macro or string output with nothing in it
    #[error("{kind} output must not be empty")]
    EmptySequence { kind: OutputKind },

    /// One step of a macro refers to an invalid key code
    #[error("macro step {index} has invalid key code {code:#06x}")]
    InvalidMacroEntry { index: usize, code: u16 },

    /// One character of a string output is not a valid scalar value
    #[error("string character {index} is not a valid Unicode scalar value (U+{value:04X})")]
    InvalidStringChar { index: usize, value: u32 },

    /// A script output without a path
    #[error("script output needs a program path")]
    EmptyScriptPath,

    /// The trigger is already mapped on this device
    #[error("trigger is already mapped on this device")]
    DuplicateTrigger,
}
