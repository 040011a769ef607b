//! Remap lookup and output synthesis for multikeys
//!
//! This crate is the part of multikeys that decides what happens to a physical
//! key event. It owns the per-device remap tables, answers "block or pass
//! through" for each event, and turns every configured output into the exact
//! ordered sequence of key-down/key-up strokes the injector has to replay.
//!
//! It does no I/O: capture, injection and script launching live in the daemon.

mod engine;
mod error;
mod factory;
mod keys;
mod modifiers;
mod output;

pub use engine::{
    Decision, KeyDirection, KeyEvent, Rejection, RemapEngine, RemapEntry, RemapTable,
    RemapTables, Trigger,
};
pub use error::BuildError;
pub use factory::{MacroStep, OutputFactory, OutputSpec};
pub use keys::{parse_key, KeyCode};
pub use modifiers::{Modifier, ModifierParseError, Modifiers};
pub use output::{
    Direction, KeyStroke, MacroOutput, OutputDescriptor, OutputKind, ScriptOutput, StringOutput,
    StrokeTarget, UnicodeOutput, VirtualOutput,
};
