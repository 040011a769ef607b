//! Output factory
//!
//! Turns an [`OutputSpec`] (a kind plus its raw parameters, as loaded from the
//! config) into an [`OutputDescriptor`] with its stroke sequence precomputed.
//! All validation happens here, so a descriptor that exists is always safe to
//! replay.
//!
//! # Stroke shapes
//!
//! ```text
//! unicode  U+00E9      down(E9) up(E9)
//! unicode  U+1F605     down(D83D) down(DE05) up(D83D) up(DE05)
//! virtual  LCtrl+LShift+A
//!                      down(LCtrl) down(LShift) down(A) up(A) up(LShift) up(LCtrl)
//! string   "a😅"       down(61) up(61) down(D83D) down(DE05) up(D83D) up(DE05)
//! macro                one stroke per step, verbatim
//! script / no-op       no strokes
//! ```

use std::path::PathBuf;

use crate::error::BuildError;
use crate::keys::KeyCode;
use crate::modifiers::Modifiers;
use crate::output::{
    Direction, KeyStroke, MacroOutput, OutputDescriptor, OutputKind, ScriptOutput, StringOutput,
    UnicodeOutput, VirtualOutput,
};

/// One step of a macro: a raw key code and whether it goes down or up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacroStep {
    pub key: u16,
    pub direction: Direction,
}

impl MacroStep {
    pub fn down(key: u16) -> Self {
        Self {
            key,
            direction: Direction::Down,
        }
    }

    pub fn up(key: u16) -> Self {
        Self {
            key,
            direction: Direction::Up,
        }
    }
}

/// An output kind with its unvalidated parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSpec {
    NoOp,
    /// A single scalar value
    Unicode(u32),
    /// A key code and the modifiers to hold around it
    Virtual { key: u16, modifiers: Modifiers },
    Macro(Vec<MacroStep>),
    /// Scalar values, in typing order
    String(Vec<u32>),
    Script(PathBuf),
}

impl OutputSpec {
    pub fn kind(&self) -> OutputKind {
        match self {
            OutputSpec::NoOp => OutputKind::NoOp,
            OutputSpec::Unicode(_) => OutputKind::Unicode,
            OutputSpec::Virtual { .. } => OutputKind::Virtual,
            OutputSpec::Macro(_) => OutputKind::Macro,
            OutputSpec::String(_) => OutputKind::String,
            OutputSpec::Script(_) => OutputKind::Script,
        }
    }
}

/// Builds output descriptors.
///
/// The factory holds nothing but the stroke prototypes, so one instance can
/// build any number of tables and calls never affect each other.
#[derive(Debug, Clone, Copy)]
pub struct OutputFactory {
    key_down: Direction,
    key_up: Direction,
}

impl Default for OutputFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputFactory {
    pub fn new() -> Self {
        Self {
            key_down: Direction::Down,
            key_up: Direction::Up,
        }
    }

    /// Build any output kind from its specification.
    pub fn build(&self, spec: &OutputSpec) -> Result<OutputDescriptor, BuildError> {
        match spec {
            OutputSpec::NoOp => Ok(self.noop()),
            OutputSpec::Unicode(value) => self.unicode(*value).map(OutputDescriptor::Unicode),
            OutputSpec::Virtual { key, modifiers } => self
                .virtual_key(*key, *modifiers)
                .map(OutputDescriptor::Virtual),
            OutputSpec::Macro(steps) => self.macro_sequence(steps).map(OutputDescriptor::Macro),
            OutputSpec::String(values) => self.string(values).map(OutputDescriptor::String),
            OutputSpec::Script(path) => self.script(path.clone()).map(OutputDescriptor::Script),
        }
    }

    pub fn noop(&self) -> OutputDescriptor {
        OutputDescriptor::NoOp
    }

    /// Build a single-character output.
    ///
    /// Characters above U+FFFF become a surrogate pair: both halves go down
    /// (high, low) before both come up (high, low).
    pub fn unicode(&self, value: u32) -> Result<UnicodeOutput, BuildError> {
        let ch = char::from_u32(value).ok_or(BuildError::InvalidScalar { value })?;
        let mut strokes = Vec::with_capacity(4);
        self.push_char(ch, &mut strokes);
        Ok(UnicodeOutput {
            codepoint: value,
            strokes,
        })
    }

    /// Build a shortcut output.
    ///
    /// With `m` modifiers there are `m + 1` downs followed by `m + 1` ups.
    /// Modifier `i` (in canonical order) goes down at slot `i` and up at the
    /// mirrored slot `m - i`; the key itself takes the slot left in the middle,
    /// so releases unwind in reverse order of the presses.
    pub fn virtual_key(&self, key: u16, modifiers: Modifiers) -> Result<VirtualOutput, BuildError> {
        let key = KeyCode::new(key)?;
        let m = modifiers.len();

        let mut downs = vec![KeyStroke::key(key, self.key_down); m + 1];
        let mut ups = vec![KeyStroke::key(key, self.key_up); m + 1];

        for (index, modifier) in modifiers.iter().enumerate() {
            downs[index] = KeyStroke::key(modifier.key(), self.key_down);
            ups[m - index] = KeyStroke::key(modifier.key(), self.key_up);
        }
        // Slot m of the downs and slot 0 of the ups still hold the key.

        downs.extend(ups);
        Ok(VirtualOutput {
            key,
            modifiers,
            strokes: downs,
        })
    }

    /// Build a macro output. Steps are copied verbatim; balancing downs and
    /// ups is up to whoever wrote the macro.
    pub fn macro_sequence(&self, steps: &[MacroStep]) -> Result<MacroOutput, BuildError> {
        if steps.is_empty() {
            return Err(BuildError::EmptySequence {
                kind: OutputKind::Macro,
            });
        }

        let strokes = steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                let key = KeyCode::new(step.key).map_err(|_| BuildError::InvalidMacroEntry {
                    index,
                    code: step.key,
                })?;
                let direction = match step.direction {
                    Direction::Down => self.key_down,
                    Direction::Up => self.key_up,
                };
                Ok(KeyStroke::key(key, direction))
            })
            .collect::<Result<Vec<_>, BuildError>>()?;

        Ok(MacroOutput { strokes })
    }

    /// Build a string output from scalar values.
    ///
    /// Every character is encoded like [`unicode`](Self::unicode) and fully
    /// released before the next one starts.
    pub fn string(&self, values: &[u32]) -> Result<StringOutput, BuildError> {
        if values.is_empty() {
            return Err(BuildError::EmptySequence {
                kind: OutputKind::String,
            });
        }

        let mut text = String::with_capacity(values.len());
        let mut strokes = Vec::with_capacity(values.len() * 2);
        for (index, &value) in values.iter().enumerate() {
            let ch = char::from_u32(value).ok_or(BuildError::InvalidStringChar { index, value })?;
            text.push(ch);
            self.push_char(ch, &mut strokes);
        }

        Ok(StringOutput { text, strokes })
    }

    /// Build a script output. The path is stored as given.
    pub fn script(&self, path: PathBuf) -> Result<ScriptOutput, BuildError> {
        if path.as_os_str().is_empty() {
            return Err(BuildError::EmptyScriptPath);
        }
        Ok(ScriptOutput { path })
    }

    fn push_char(&self, ch: char, strokes: &mut Vec<KeyStroke>) {
        let mut buf = [0u16; 2];
        let units = ch.encode_utf16(&mut buf);
        for unit in units.iter() {
            strokes.push(KeyStroke::unicode(*unit, self.key_down));
        }
        for unit in units.iter() {
            strokes.push(KeyStroke::unicode(*unit, self.key_up));
        }
    }
}
