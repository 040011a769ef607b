//! Remap engine
//!
//! The engine answers one question per physical key event: should this event
//! be blocked and replaced, or passed through untouched?
//!
//! # Lookup
//!
//! ```text
//!   KeyEvent { device, scan_code, direction, modifiers }
//!        │
//!        ▼
//!   tables.get(device) ──── none ───────────────▶ PassThrough
//!        │
//!        ▼
//!   key = (scan_code, modifiers & relevant[scan_code])
//!   table.get(key) ──────── none ───────────────▶ PassThrough
//!        │
//!        ▼
//!   Block(descriptor)
//! ```
//!
//! `relevant[scan_code]` is the union of the modifiers in every trigger on
//! that scan code, so modifiers those triggers never mention don't prevent a
//! match. Triggers on other keys have no say in it.
//!
//! # Publishing
//!
//! The whole device → table map is published as one `Arc`. Reload builds a new
//! map off to the side and swaps it in; a lookup that already took a snapshot
//! finishes against the old map.
//!
//! # Injected events
//!
//! The engine can't tell synthetic events from hardware ones. Callers must
//! only feed it events from physical devices; feeding back the injector's own
//! output loops forever on any rule that emits its own trigger.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::BuildError;
use crate::factory::{OutputFactory, OutputSpec};
use crate::modifiers::Modifiers;
use crate::output::OutputDescriptor;

/// Raw direction of a physical key event (evdev values 0, 1, 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyDirection {
    Release,
    Press,
    Repeat,
}

impl KeyDirection {
    /// Map an evdev key event value. Unknown values yield `None`.
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(KeyDirection::Release),
            1 => Some(KeyDirection::Press),
            2 => Some(KeyDirection::Repeat),
            _ => None,
        }
    }
}

/// One physical key transition, as handed over by the capture layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent<'a> {
    pub device: &'a str,
    pub scan_code: u16,
    pub direction: KeyDirection,
    /// Modifiers held on the device when the event happened
    pub modifiers: Modifiers,
}

/// The part of an event a remap entry matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Trigger {
    pub scan_code: u16,
    pub modifiers: Modifiers,
}

impl Trigger {
    pub fn new(scan_code: u16, modifiers: Modifiers) -> Self {
        Self {
            scan_code,
            modifiers,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifiers.is_empty() {
            write!(f, "{:#04x}", self.scan_code)
        } else {
            write!(f, "{}+{:#04x}", self.modifiers, self.scan_code)
        }
    }
}

/// Table construction input: one trigger and what it should produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapEntry {
    pub trigger: Trigger,
    pub output: OutputSpec,
}

/// An entry that was left out of a table, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub device: String,
    pub trigger: Trigger,
    pub error: BuildError,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "device '{}', trigger {}: {}",
            self.device, self.trigger, self.error
        )
    }
}

/// The result of evaluating one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Leave the event alone
    PassThrough,
    /// Suppress the event; the descriptor says what to produce instead
    Block(Arc<OutputDescriptor>),
}

impl Decision {
    pub fn is_block(&self) -> bool {
        matches!(self, Decision::Block(_))
    }

    pub fn descriptor(&self) -> Option<&OutputDescriptor> {
        match self {
            Decision::PassThrough => None,
            Decision::Block(descriptor) => Some(descriptor),
        }
    }

    /// The descriptor to replay for an event in this direction.
    ///
    /// Releases and autorepeats of a mapped key are blocked too, but only the
    /// initial press produces output.
    pub fn replay_on(&self, direction: KeyDirection) -> Option<&OutputDescriptor> {
        match direction {
            KeyDirection::Press => self.descriptor(),
            KeyDirection::Release | KeyDirection::Repeat => None,
        }
    }
}

/// All remaps for one device.
#[derive(Debug, Clone, Default)]
pub struct RemapTable {
    entries: HashMap<Trigger, Arc<OutputDescriptor>>,
    /// Modifiers that take part in matching, per scan code
    relevant: HashMap<u16, Modifiers>,
}

impl RemapTable {
    /// Add an already-built descriptor. Fails if the trigger is taken.
    pub fn insert(
        &mut self,
        trigger: Trigger,
        descriptor: OutputDescriptor,
    ) -> Result<(), BuildError> {
        if self.entries.contains_key(&trigger) {
            return Err(BuildError::DuplicateTrigger);
        }
        let relevant = self.relevant.entry(trigger.scan_code).or_default();
        *relevant = *relevant | trigger.modifiers;
        self.entries.insert(trigger, Arc::new(descriptor));
        Ok(())
    }

    /// Look up the descriptor for a scan code with the given held modifiers.
    pub fn lookup(&self, scan_code: u16, held: Modifiers) -> Option<&Arc<OutputDescriptor>> {
        let mask = self.relevant_modifiers(scan_code);
        self.entries.get(&Trigger::new(scan_code, held & mask))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Modifiers that take part in matching `scan_code`.
    pub fn relevant_modifiers(&self, scan_code: u16) -> Modifiers {
        self.relevant.get(&scan_code).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Trigger, &OutputDescriptor)> {
        self.entries.iter().map(|(trigger, output)| (trigger, output.as_ref()))
    }
}

/// The device → table map that gets published as a whole.
#[derive(Debug, Clone, Default)]
pub struct RemapTables {
    devices: HashMap<String, RemapTable>,
}

impl RemapTables {
    /// Build tables for every device.
    ///
    /// Entries that fail to build (or repeat a trigger already mapped on the
    /// same device) are skipped and returned as rejections; everything else
    /// loads. The first definition of a trigger wins.
    pub fn build<I, D, E>(devices: I) -> (Self, Vec<Rejection>)
    where
        I: IntoIterator<Item = (D, E)>,
        D: Into<String>,
        E: IntoIterator<Item = RemapEntry>,
    {
        let factory = OutputFactory::new();
        let mut tables = RemapTables::default();
        let mut rejections = Vec::new();

        for (device, entries) in devices {
            let device = device.into();
            let mut table = tables.devices.remove(&device).unwrap_or_default();

            for entry in entries {
                let result = factory
                    .build(&entry.output)
                    .and_then(|descriptor| table.insert(entry.trigger, descriptor));

                if let Err(error) = result {
                    tracing::warn!(
                        "Skipping remap on '{}' for {}: {}",
                        device,
                        entry.trigger,
                        error
                    );
                    rejections.push(Rejection {
                        device: device.clone(),
                        trigger: entry.trigger,
                        error,
                    });
                }
            }

            tracing::debug!("Built table for '{}' with {} entries", device, table.len());
            tables.devices.insert(device, table);
        }

        (tables, rejections)
    }

    /// Evaluate one event against these tables.
    pub fn evaluate(&self, event: &KeyEvent<'_>) -> Decision {
        let Some(table) = self.devices.get(event.device) else {
            return Decision::PassThrough;
        };
        match table.lookup(event.scan_code, event.modifiers) {
            Some(descriptor) => Decision::Block(Arc::clone(descriptor)),
            None => Decision::PassThrough,
        }
    }

    pub fn table(&self, device: &str) -> Option<&RemapTable> {
        self.devices.get(device)
    }

    pub fn devices(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Total number of entries across all devices.
    pub fn entry_count(&self) -> usize {
        self.devices.values().map(RemapTable::len).sum()
    }
}

/// Holds the currently published tables.
///
/// Cheap to share behind an `Arc`; lookups take the read lock only long
/// enough to clone the inner `Arc`.
#[derive(Debug, Default)]
pub struct RemapEngine {
    tables: RwLock<Arc<RemapTables>>,
}

impl RemapEngine {
    pub fn new(tables: RemapTables) -> Self {
        Self {
            tables: RwLock::new(Arc::new(tables)),
        }
    }

    /// The tables as of now. Later publishes don't affect the snapshot.
    pub fn snapshot(&self) -> Arc<RemapTables> {
        self.tables.read().clone()
    }

    /// Evaluate one event against the current tables.
    pub fn evaluate(&self, event: &KeyEvent<'_>) -> Decision {
        self.tables.read().evaluate(event)
    }

    /// Replace all tables at once and hand back the previous set.
    pub fn publish(&self, tables: RemapTables) -> Arc<RemapTables> {
        let next = Arc::new(tables);
        std::mem::replace(&mut *self.tables.write(), next)
    }
}
