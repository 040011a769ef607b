//! Output descriptors
//!
//! An [`OutputDescriptor`] is what a remap entry resolves to. Each variant
//! keeps the parameters it was built from together with the precomputed
//! stroke sequence, so replaying it is a plain slice walk. Descriptors are
//! only created by [`OutputFactory`](crate::OutputFactory) and never change
//! afterwards.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::keys::KeyCode;
use crate::modifiers::Modifiers;

/// Direction of a synthetic stroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Down,
    Up,
}

/// What a synthetic stroke acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrokeTarget {
    /// A real key on the virtual keyboard
    Key(KeyCode),
    /// One UTF-16 code unit to be synthesized as text
    Unicode(u16),
}

/// One primitive key-down or key-up event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct KeyStroke {
    pub target: StrokeTarget,
    pub direction: Direction,
}

impl KeyStroke {
    pub fn key(key: KeyCode, direction: Direction) -> Self {
        Self {
            target: StrokeTarget::Key(key),
            direction,
        }
    }

    pub fn unicode(unit: u16, direction: Direction) -> Self {
        Self {
            target: StrokeTarget::Unicode(unit),
            direction,
        }
    }

    pub fn is_down(&self) -> bool {
        self.direction == Direction::Down
    }
}

impl fmt::Display for KeyStroke {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.direction {
            Direction::Down => "down",
            Direction::Up => "up",
        };
        match self.target {
            StrokeTarget::Key(key) => write!(f, "{}({})", dir, key),
            StrokeTarget::Unicode(unit) => write!(f, "{}(U+{:04X})", dir, unit),
        }
    }
}

/// Discriminant of an [`OutputDescriptor`], used for logging and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    NoOp,
    Unicode,
    Virtual,
    Macro,
    String,
    Script,
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputKind::NoOp => "no-op",
            OutputKind::Unicode => "unicode",
            OutputKind::Virtual => "virtual",
            OutputKind::Macro => "macro",
            OutputKind::String => "string",
            OutputKind::Script => "script",
        };
        write!(f, "{}", name)
    }
}

/// A single Unicode character.
///
/// The stroke list holds all downs, then all ups: one pair for the Basic
/// Multilingual Plane, two pairs (high then low surrogate) above it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnicodeOutput {
    pub(crate) codepoint: u32,
    pub(crate) strokes: Vec<KeyStroke>,
}

/// A key pressed together with a set of modifiers (a shortcut).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualOutput {
    pub(crate) key: KeyCode,
    pub(crate) modifiers: Modifiers,
    pub(crate) strokes: Vec<KeyStroke>,
}

impl VirtualOutput {
    /// Modifier downs in canonical order, then the key down.
    pub fn down_strokes(&self) -> &[KeyStroke] {
        &self.strokes[..self.modifiers.len() + 1]
    }

    /// Key up, then modifier ups in reverse order.
    pub fn up_strokes(&self) -> &[KeyStroke] {
        &self.strokes[self.modifiers.len() + 1..]
    }
}

/// A verbatim sequence of key downs and ups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroOutput {
    pub(crate) strokes: Vec<KeyStroke>,
}

/// A typed string; each character is balanced before the next one starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringOutput {
    pub(crate) text: String,
    pub(crate) strokes: Vec<KeyStroke>,
}

impl StringOutput {
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// An external program to launch. Produces no strokes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutput {
    pub(crate) path: PathBuf,
}

impl ScriptOutput {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// What a matched key produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputDescriptor {
    /// Swallow the key and produce nothing
    NoOp,
    Unicode(UnicodeOutput),
    Virtual(VirtualOutput),
    Macro(MacroOutput),
    String(StringOutput),
    Script(ScriptOutput),
}

impl OutputDescriptor {
    pub fn kind(&self) -> OutputKind {
        match self {
            OutputDescriptor::NoOp => OutputKind::NoOp,
            OutputDescriptor::Unicode(_) => OutputKind::Unicode,
            OutputDescriptor::Virtual(_) => OutputKind::Virtual,
            OutputDescriptor::Macro(_) => OutputKind::Macro,
            OutputDescriptor::String(_) => OutputKind::String,
            OutputDescriptor::Script(_) => OutputKind::Script,
        }
    }

    /// The full ordered stroke sequence to replay.
    pub fn strokes(&self) -> &[KeyStroke] {
        match self {
            OutputDescriptor::NoOp | OutputDescriptor::Script(_) => &[],
            OutputDescriptor::Unicode(output) => &output.strokes,
            OutputDescriptor::Virtual(output) => &output.strokes,
            OutputDescriptor::Macro(output) => &output.strokes,
            OutputDescriptor::String(output) => &output.strokes,
        }
    }

    /// Number of primitive events this descriptor produces.
    pub fn count(&self) -> usize {
        self.strokes().len()
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, OutputDescriptor::NoOp)
    }

    /// The program to launch, for script outputs.
    pub fn script_path(&self) -> Option<&Path> {
        match self {
            OutputDescriptor::Script(output) => Some(output.path()),
            _ => None,
        }
    }
}

impl fmt::Display for OutputDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputDescriptor::NoOp => write!(f, "block"),
            OutputDescriptor::Unicode(output) => write!(f, "unicode U+{:04X}", output.codepoint),
            OutputDescriptor::Virtual(output) if output.modifiers.is_empty() => {
                write!(f, "virtual {}", output.key)
            }
            OutputDescriptor::Virtual(output) => {
                write!(f, "virtual {}+{}", output.modifiers, output.key)
            }
            OutputDescriptor::Macro(output) => write!(f, "macro ({} steps)", output.strokes.len()),
            OutputDescriptor::String(output) => write!(f, "string {:?}", output.text),
            OutputDescriptor::Script(output) => write!(f, "script {}", output.path.display()),
        }
    }
}
