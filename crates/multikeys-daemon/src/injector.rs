//! Virtual device injection via uinput
//!
//! All synthetic output, remapped or passed through, leaves through one
//! virtual keyboard named [`VIRTUAL_DEVICE_NAME`]. Capture skips that device,
//! which is what keeps injected events from being remapped a second time.

use anyhow::Result;
use evdev::{uinput::VirtualDeviceBuilder, AttributeSet, EventType, InputEvent, Key};
use multikeys_core::{Direction, KeyStroke, OutputFactory, StrokeTarget};

use crate::device::VIRTUAL_DEVICE_NAME;
use crate::unicode::hex_entry_strokes;

/// Highest key code the virtual keyboard advertises (`KEY_MAX`).
const KEY_MAX: u16 = 0x2ff;

/// A virtual input device for injecting events
pub struct VirtualDevice {
    device: evdev::uinput::VirtualDevice,
    factory: OutputFactory,
}

impl VirtualDevice {
    /// Create the virtual keyboard
    pub fn new_keyboard() -> Result<Self> {
        let mut keys = AttributeSet::<Key>::new();

        for code in 1..=KEY_MAX {
            keys.insert(Key::new(code));
        }

        let device = VirtualDeviceBuilder::new()?
            .name(VIRTUAL_DEVICE_NAME)
            .with_keys(&keys)?
            .build()?;

        Ok(Self {
            device,
            factory: OutputFactory::new(),
        })
    }

    /// Emit raw input events
    pub fn emit(&mut self, events: &[InputEvent]) -> Result<()> {
        self.device.emit(events)?;
        Ok(())
    }

    /// Send one key event followed by a SYN_REPORT
    pub fn send_key(&mut self, code: u16, value: i32) -> Result<()> {
        let key = InputEvent::new(EventType::KEY, code, value);
        let syn = InputEvent::new(EventType::SYNCHRONIZATION, 0, 0);
        self.emit(&[key, syn])
    }

    /// Type one character via hex entry.
    pub fn type_char(&mut self, ch: char) -> Result<()> {
        for stroke in hex_entry_strokes(&self.factory, ch) {
            if let StrokeTarget::Key(key) = stroke.target {
                self.send_key(key.code(), stroke_value(&stroke))?;
            }
        }
        Ok(())
    }
}

/// evdev event value for a stroke
pub fn stroke_value(stroke: &KeyStroke) -> i32 {
    match stroke.direction {
        Direction::Down => 1,
        Direction::Up => 0,
    }
}
