//! Event dispatch
//!
//! Every grabbed keyboard forwards its raw events to a single dispatch task.
//! For each key event the dispatcher:
//!
//! 1. records the device's modifier state as it was *before* the event,
//! 2. on a press, asks the [`RemapEngine`] for a decision,
//! 3. either re-emits the event unchanged or replays the matched output.
//!
//! Repeats and releases follow the decision taken for their press.
//!
//! Anything other than key events is dropped; the injector writes its own
//! SYN_REPORT after each key.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use evdev::{EventType, InputEvent};
use multikeys_core::{
    Decision, KeyDirection, KeyEvent, Modifier, Modifiers, OutputDescriptor, RemapEngine,
    StrokeTarget,
};
use tokio::sync::mpsc;

use crate::injector::{stroke_value, VirtualDevice};
use crate::unicode::Utf16Composer;

/// A raw event tagged with the identifier of the device it came from.
#[derive(Debug, Clone)]
pub struct DeviceEvent {
    pub device: Arc<str>,
    pub event: InputEvent,
}

/// Where the dispatcher's output goes.
pub trait EventSink {
    /// Emit one key event on the virtual keyboard.
    fn send_key(&mut self, code: u16, value: i32) -> Result<()>;

    /// Type one character.
    fn type_char(&mut self, ch: char) -> Result<()>;

    /// Start an external program without waiting for it.
    fn launch_script(&mut self, path: &Path) -> Result<()>;
}

impl EventSink for VirtualDevice {
    fn send_key(&mut self, code: u16, value: i32) -> Result<()> {
        VirtualDevice::send_key(self, code, value)
    }

    fn type_char(&mut self, ch: char) -> Result<()> {
        VirtualDevice::type_char(self, ch)
    }

    fn launch_script(&mut self, path: &Path) -> Result<()> {
        spawn_script(path)
    }
}

/// Launch `path` and reap it in the background.
pub fn spawn_script(path: &Path) -> Result<()> {
    let mut child = tokio::process::Command::new(path)
        .spawn()
        .with_context(|| format!("Failed to launch script {}", path.display()))?;

    let shown = path.display().to_string();
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) if status.success() => {
                tracing::debug!("Script {} finished", shown);
            }
            Ok(status) => {
                tracing::warn!("Script {} exited with {}", shown, status);
            }
            Err(e) => {
                tracing::warn!("Failed to wait for script {}: {}", shown, e);
            }
        }
    });

    Ok(())
}

/// Per-device key state.
#[derive(Debug, Default)]
struct DeviceState {
    /// Modifiers currently held
    modifiers: Modifiers,
    /// Keys whose press was blocked; their repeats and release are too
    blocked: HashSet<u16>,
}

/// Turns physical key events into output on an [`EventSink`].
pub struct Dispatcher<S> {
    engine: Arc<RemapEngine>,
    devices: HashMap<Arc<str>, DeviceState>,
    composer: Utf16Composer,
    sink: S,
}

impl<S: EventSink> Dispatcher<S> {
    pub fn new(engine: Arc<RemapEngine>, sink: S) -> Self {
        Self {
            engine,
            devices: HashMap::new(),
            composer: Utf16Composer::new(),
            sink,
        }
    }

    /// Process events until every reader has hung up.
    pub async fn run(mut self, mut rx: mpsc::Receiver<DeviceEvent>) {
        while let Some(DeviceEvent { device, event }) = rx.recv().await {
            if let Err(e) = self.handle(&device, &event) {
                tracing::error!("Failed to handle event from '{}': {:#}", device, e);
            }
        }
        tracing::info!("All input devices closed, dispatcher stopping");
    }

    /// Handle one raw event from `device`.
    ///
    /// Only a press is looked up. Repeats and the release follow whatever
    /// the press decided, so a key never ends up half pressed when modifiers
    /// change or the tables are reloaded while it is held.
    pub fn handle(&mut self, device: &Arc<str>, event: &InputEvent) -> Result<()> {
        if event.event_type() != EventType::KEY {
            return Ok(());
        }

        let code = event.code();
        let value = event.value();
        let Some(direction) = KeyDirection::from_value(value) else {
            return self.sink.send_key(code, value);
        };

        let state = self.devices.entry(Arc::clone(device)).or_default();
        let modifiers = state.modifiers;
        if let Some(modifier) = Modifier::from_key(code) {
            match direction {
                KeyDirection::Press => state.modifiers.insert(modifier),
                KeyDirection::Release => state.modifiers.remove(modifier),
                KeyDirection::Repeat => {}
            }
        }

        match direction {
            KeyDirection::Press => {}
            KeyDirection::Repeat if state.blocked.contains(&code) => return Ok(()),
            KeyDirection::Release if state.blocked.remove(&code) => return Ok(()),
            KeyDirection::Repeat | KeyDirection::Release => {
                return self.sink.send_key(code, value);
            }
        }

        let decision = self.engine.evaluate(&KeyEvent {
            device: device.as_ref(),
            scan_code: code,
            direction,
            modifiers,
        });

        match &decision {
            Decision::PassThrough => self.sink.send_key(code, value),
            Decision::Block(descriptor) => {
                tracing::trace!("Blocked {:#04x} on '{}': {}", code, device, descriptor);
                state.blocked.insert(code);
                match decision.replay_on(direction) {
                    Some(descriptor) => self.replay(descriptor),
                    None => Ok(()),
                }
            }
        }
    }

    fn replay(&mut self, descriptor: &OutputDescriptor) -> Result<()> {
        if let Some(path) = descriptor.script_path() {
            tracing::debug!("Launching {}", path.display());
            return self.sink.launch_script(path);
        }

        // Keys this replay has put down and not yet released
        let mut pressed: Vec<u16> = Vec::new();

        for stroke in descriptor.strokes() {
            let result = match stroke.target {
                StrokeTarget::Key(key) => {
                    if stroke.is_down() {
                        pressed.push(key.code());
                    } else {
                        pressed.retain(|&code| code != key.code());
                    }
                    self.sink.send_key(key.code(), stroke_value(stroke))
                }
                StrokeTarget::Unicode(unit) if stroke.is_down() => {
                    match self.composer.push(unit) {
                        Some(ch) => self.sink.type_char(ch),
                        None => Ok(()),
                    }
                }
                StrokeTarget::Unicode(_) => Ok(()),
            };

            if let Err(e) = result {
                self.release_all(&pressed);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Release `pressed` in reverse order after a failed replay.
    fn release_all(&mut self, pressed: &[u16]) {
        for &code in pressed.iter().rev() {
            if let Err(e) = self.sink.send_key(code, 0) {
                tracing::warn!("Failed to release {:#04x} after a failed replay: {:#}", code, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use evdev::Key;
    use multikeys_core::{OutputSpec, RemapEntry, RemapTables, Trigger};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Output {
        Key(u16, i32),
        Char(char),
        Script(PathBuf),
    }

    #[derive(Default)]
    struct RecordingSink {
        output: Vec<Output>,
        /// Fail the nth `send_key` call (0-based), once
        fail_key_at: Option<usize>,
        key_calls: usize,
    }

    impl EventSink for RecordingSink {
        fn send_key(&mut self, code: u16, value: i32) -> Result<()> {
            let call = self.key_calls;
            self.key_calls += 1;
            if self.fail_key_at == Some(call) {
                anyhow::bail!("uinput write failed");
            }
            self.output.push(Output::Key(code, value));
            Ok(())
        }

        fn type_char(&mut self, ch: char) -> Result<()> {
            self.output.push(Output::Char(ch));
            Ok(())
        }

        fn launch_script(&mut self, path: &Path) -> Result<()> {
            self.output.push(Output::Script(path.to_path_buf()));
            Ok(())
        }
    }

    const KBD: &str = "KBD-1";

    fn dispatcher(entries: Vec<RemapEntry>) -> Dispatcher<RecordingSink> {
        let (tables, rejections) = RemapTables::build([(KBD.to_string(), entries)]);
        assert!(rejections.is_empty(), "test tables must build cleanly");
        Dispatcher::new(Arc::new(RemapEngine::new(tables)), RecordingSink::default())
    }

    fn entry(scan_code: Key, modifiers: Modifiers, output: OutputSpec) -> RemapEntry {
        RemapEntry {
            trigger: Trigger::new(scan_code.code(), modifiers),
            output,
        }
    }

    fn key_event(key: Key, value: i32) -> InputEvent {
        InputEvent::new(EventType::KEY, key.code(), value)
    }

    fn feed(d: &mut Dispatcher<RecordingSink>, device: &str, events: &[(Key, i32)]) {
        let device: Arc<str> = Arc::from(device);
        for &(key, value) in events {
            d.handle(&device, &key_event(key, value))
                .expect("recording sink never fails");
        }
    }

    #[test]
    fn test_unmapped_keys_pass_through() {
        let mut d = dispatcher(vec![]);
        feed(&mut d, KBD, &[(Key::KEY_Q, 1), (Key::KEY_Q, 2), (Key::KEY_Q, 0)]);

        assert_eq!(
            d.sink.output,
            vec![
                Output::Key(Key::KEY_Q.code(), 1),
                Output::Key(Key::KEY_Q.code(), 2),
                Output::Key(Key::KEY_Q.code(), 0),
            ]
        );
    }

    #[test]
    fn test_non_key_events_are_dropped() {
        let mut d = dispatcher(vec![]);
        let device: Arc<str> = Arc::from(KBD);
        let syn = InputEvent::new(EventType::SYNCHRONIZATION, 0, 0);
        let msc = InputEvent::new(EventType::MISC, 4, 30);
        d.handle(&device, &syn).expect("syn");
        d.handle(&device, &msc).expect("msc");

        assert!(d.sink.output.is_empty(), "only key events are re-emitted");
    }

    #[test]
    fn test_virtual_output_replays_on_press_only() {
        let mods = Modifiers::NONE
            .with(Modifier::LeftCtrl)
            .with(Modifier::LeftShift);
        let mut d = dispatcher(vec![entry(
            Key::KEY_S,
            Modifiers::NONE,
            OutputSpec::Virtual {
                key: Key::KEY_A.code(),
                modifiers: mods,
            },
        )]);

        feed(&mut d, KBD, &[(Key::KEY_S, 1), (Key::KEY_S, 2), (Key::KEY_S, 0)]);

        assert_eq!(
            d.sink.output,
            vec![
                Output::Key(Key::KEY_LEFTCTRL.code(), 1),
                Output::Key(Key::KEY_LEFTSHIFT.code(), 1),
                Output::Key(Key::KEY_A.code(), 1),
                Output::Key(Key::KEY_A.code(), 0),
                Output::Key(Key::KEY_LEFTSHIFT.code(), 0),
                Output::Key(Key::KEY_LEFTCTRL.code(), 0),
            ],
            "repeat and release of a mapped key produce nothing"
        );
    }

    #[test]
    fn test_modifier_state_selects_trigger() {
        let shift = Modifiers::NONE.with(Modifier::LeftShift);
        let mut d = dispatcher(vec![entry(Key::KEY_CAPSLOCK, shift, OutputSpec::NoOp)]);

        feed(
            &mut d,
            KBD,
            &[
                (Key::KEY_CAPSLOCK, 1),
                (Key::KEY_CAPSLOCK, 0),
                (Key::KEY_LEFTSHIFT, 1),
                (Key::KEY_CAPSLOCK, 1),
                (Key::KEY_CAPSLOCK, 0),
                (Key::KEY_LEFTSHIFT, 0),
            ],
        );

        assert_eq!(
            d.sink.output,
            vec![
                Output::Key(Key::KEY_CAPSLOCK.code(), 1),
                Output::Key(Key::KEY_CAPSLOCK.code(), 0),
                Output::Key(Key::KEY_LEFTSHIFT.code(), 1),
                Output::Key(Key::KEY_LEFTSHIFT.code(), 0),
            ],
            "shift+capslock is swallowed, plain capslock is not"
        );
    }

    #[test]
    fn test_release_follows_press_when_modifiers_change() {
        let shift = Modifiers::NONE.with(Modifier::LeftShift);
        let mut d = dispatcher(vec![entry(Key::KEY_CAPSLOCK, shift, OutputSpec::NoOp)]);

        // Caps goes down alone, shift is pressed while it is held
        feed(
            &mut d,
            KBD,
            &[
                (Key::KEY_CAPSLOCK, 1),
                (Key::KEY_LEFTSHIFT, 1),
                (Key::KEY_CAPSLOCK, 2),
                (Key::KEY_CAPSLOCK, 0),
                (Key::KEY_LEFTSHIFT, 0),
            ],
        );

        assert_eq!(
            d.sink.output,
            vec![
                Output::Key(Key::KEY_CAPSLOCK.code(), 1),
                Output::Key(Key::KEY_LEFTSHIFT.code(), 1),
                Output::Key(Key::KEY_CAPSLOCK.code(), 2),
                Output::Key(Key::KEY_CAPSLOCK.code(), 0),
                Output::Key(Key::KEY_LEFTSHIFT.code(), 0),
            ],
            "caps was pressed through, so its repeat and release go through too"
        );
    }

    #[test]
    fn test_blocked_press_keeps_release_blocked() {
        let shift = Modifiers::NONE.with(Modifier::LeftShift);
        let mut d = dispatcher(vec![entry(Key::KEY_CAPSLOCK, shift, OutputSpec::NoOp)]);

        // Shift is let go before caps is
        feed(
            &mut d,
            KBD,
            &[
                (Key::KEY_LEFTSHIFT, 1),
                (Key::KEY_CAPSLOCK, 1),
                (Key::KEY_LEFTSHIFT, 0),
                (Key::KEY_CAPSLOCK, 2),
                (Key::KEY_CAPSLOCK, 0),
                (Key::KEY_CAPSLOCK, 1),
                (Key::KEY_CAPSLOCK, 0),
            ],
        );

        assert_eq!(
            d.sink.output,
            vec![
                Output::Key(Key::KEY_LEFTSHIFT.code(), 1),
                Output::Key(Key::KEY_LEFTSHIFT.code(), 0),
                Output::Key(Key::KEY_CAPSLOCK.code(), 1),
                Output::Key(Key::KEY_CAPSLOCK.code(), 0),
            ],
            "no stray release for the swallowed press; the next plain press is fresh"
        );
    }

    #[test]
    fn test_reload_while_key_held() {
        let engine = Arc::new(RemapEngine::new(RemapTables::default()));
        let mut d = Dispatcher::new(Arc::clone(&engine), RecordingSink::default());
        let mapped = |key| {
            RemapTables::build([(
                KBD.to_string(),
                vec![entry(key, Modifiers::NONE, OutputSpec::NoOp)],
            )])
            .0
        };

        // Pressed before the key was mapped: released normally
        feed(&mut d, KBD, &[(Key::KEY_Z, 1)]);
        engine.publish(mapped(Key::KEY_Z));
        feed(&mut d, KBD, &[(Key::KEY_Z, 0)]);

        // Pressed while mapped: release stays blocked after the mapping is gone
        feed(&mut d, KBD, &[(Key::KEY_Z, 1)]);
        engine.publish(RemapTables::default());
        feed(&mut d, KBD, &[(Key::KEY_Z, 0)]);

        assert_eq!(
            d.sink.output,
            vec![
                Output::Key(Key::KEY_Z.code(), 1),
                Output::Key(Key::KEY_Z.code(), 0),
            ]
        );
    }

    #[test]
    fn test_failed_replay_releases_pressed_keys() {
        let mods = Modifiers::NONE
            .with(Modifier::LeftCtrl)
            .with(Modifier::LeftShift);
        let mut d = dispatcher(vec![entry(
            Key::KEY_S,
            Modifiers::NONE,
            OutputSpec::Virtual {
                key: Key::KEY_A.code(),
                modifiers: mods,
            },
        )]);
        // ctrl down, shift down, then the A down fails
        d.sink.fail_key_at = Some(2);

        let device: Arc<str> = Arc::from(KBD);
        let result = d.handle(&device, &key_event(Key::KEY_S, 1));

        assert!(result.is_err(), "the write error is still reported");
        assert_eq!(
            d.sink.output,
            vec![
                Output::Key(Key::KEY_LEFTCTRL.code(), 1),
                Output::Key(Key::KEY_LEFTSHIFT.code(), 1),
                Output::Key(Key::KEY_A.code(), 0),
                Output::Key(Key::KEY_LEFTSHIFT.code(), 0),
                Output::Key(Key::KEY_LEFTCTRL.code(), 0),
            ],
            "everything the replay pressed is released"
        );
    }

    #[tokio::test]
    async fn test_spawn_script_reports_missing_program() {
        let err = spawn_script(Path::new("/nonexistent/multikeys-script"))
            .expect_err("missing program cannot be launched");
        assert!(err.to_string().contains("/nonexistent/multikeys-script"));
    }

    #[test]
    fn test_modifier_press_sees_state_before_itself() {
        // LShift with no modifiers held maps; pressing it must not count itself.
        let mut d = dispatcher(vec![entry(
            Key::KEY_LEFTSHIFT,
            Modifiers::NONE,
            OutputSpec::Unicode(u32::from('x')),
        )]);

        feed(&mut d, KBD, &[(Key::KEY_LEFTSHIFT, 1)]);

        assert_eq!(d.sink.output, vec![Output::Char('x')]);
    }

    #[test]
    fn test_modifiers_are_tracked_per_device() {
        let ctrl = Modifiers::NONE.with(Modifier::LeftCtrl);
        let mut d = dispatcher(vec![entry(Key::KEY_J, ctrl, OutputSpec::NoOp)]);

        feed(&mut d, "other", &[(Key::KEY_LEFTCTRL, 1)]);
        feed(&mut d, KBD, &[(Key::KEY_J, 1)]);

        assert_eq!(
            d.sink.output,
            vec![
                Output::Key(Key::KEY_LEFTCTRL.code(), 1),
                Output::Key(Key::KEY_J.code(), 1),
            ],
            "ctrl held on another keyboard does not trigger"
        );
    }

    #[test]
    fn test_string_output_types_characters() {
        let text: Vec<u32> = "Hi🙂".chars().map(u32::from).collect();
        let mut d = dispatcher(vec![entry(
            Key::KEY_5,
            Modifiers::NONE,
            OutputSpec::String(text),
        )]);

        feed(&mut d, KBD, &[(Key::KEY_5, 1), (Key::KEY_5, 0)]);

        assert_eq!(
            d.sink.output,
            vec![Output::Char('H'), Output::Char('i'), Output::Char('🙂')]
        );
    }

    #[test]
    fn test_supplementary_unicode_is_one_char() {
        let mut d = dispatcher(vec![entry(
            Key::KEY_2,
            Modifiers::NONE,
            OutputSpec::Unicode(0x1F605),
        )]);

        feed(&mut d, KBD, &[(Key::KEY_2, 1)]);

        assert_eq!(d.sink.output, vec![Output::Char('😅')]);
    }

    #[test]
    fn test_script_is_launched_once() {
        let path = PathBuf::from("/usr/local/bin/open-app");
        let mut d = dispatcher(vec![entry(
            Key::KEY_6,
            Modifiers::NONE,
            OutputSpec::Script(path.clone()),
        )]);

        feed(&mut d, KBD, &[(Key::KEY_6, 1), (Key::KEY_6, 2), (Key::KEY_6, 0)]);

        assert_eq!(d.sink.output, vec![Output::Script(path)]);
    }

    #[test]
    fn test_macro_replays_verbatim() {
        use multikeys_core::MacroStep;

        let steps = vec![
            MacroStep::down(Key::KEY_LEFTCTRL.code()),
            MacroStep::down(Key::KEY_F.code()),
            MacroStep::up(Key::KEY_F.code()),
            MacroStep::up(Key::KEY_LEFTCTRL.code()),
        ];
        let mut d = dispatcher(vec![entry(
            Key::KEY_F1,
            Modifiers::NONE,
            OutputSpec::Macro(steps),
        )]);

        feed(&mut d, KBD, &[(Key::KEY_F1, 1), (Key::KEY_F1, 0)]);

        assert_eq!(
            d.sink.output,
            vec![
                Output::Key(Key::KEY_LEFTCTRL.code(), 1),
                Output::Key(Key::KEY_F.code(), 1),
                Output::Key(Key::KEY_F.code(), 0),
                Output::Key(Key::KEY_LEFTCTRL.code(), 0),
            ]
        );
    }

    #[test]
    fn test_reload_takes_effect_on_next_event() {
        let engine = Arc::new(RemapEngine::new(RemapTables::default()));
        let mut d = Dispatcher::new(Arc::clone(&engine), RecordingSink::default());

        feed(&mut d, KBD, &[(Key::KEY_Z, 1)]);

        let (tables, _) = RemapTables::build([(
            KBD.to_string(),
            vec![entry(Key::KEY_Z, Modifiers::NONE, OutputSpec::NoOp)],
        )]);
        engine.publish(tables);

        feed(&mut d, KBD, &[(Key::KEY_Z, 1)]);

        assert_eq!(
            d.sink.output,
            vec![Output::Key(Key::KEY_Z.code(), 1)],
            "second press is blocked by the published table"
        );
    }
}
