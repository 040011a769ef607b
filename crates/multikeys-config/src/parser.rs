//! KDL configuration parser
//!
//! ```kdl
//! global {
//!     log-level "debug"
//! }
//!
//! device "usb-0000:00:14.0-2/input0" alias="Macro pad" {
//!     unicode 0x02 0x1F605
//!     virtual "F1" "A" mods="LCtrl+LShift"
//!     macro "F2" "+LCtrl" "F" "-LCtrl"
//!     string "F3" "Hi."
//!     script "F4" "~/bin/open-app"
//!     block "CapsLock" when="LShift"
//! }
//! ```
//!
//! Every child of a `device` node is one remap entry: the node name is the
//! output kind, the first argument is the trigger (scan code or key name) and
//! the remaining arguments are the output's parameters. An entry that can't
//! be understood is recorded in [`Config::rejected`] and skipped; the rest of
//! the file still loads.

use std::path::{Path, PathBuf};

use kdl::{KdlEntry, KdlNode, KdlValue};
use multikeys_core::{parse_key, MacroStep, Modifiers, OutputSpec, RemapEntry, Trigger};

use crate::error::{ConfigError, EntryProblem, SourceLocation};
use crate::model::*;

/// Extract source location from a KDL node's name span
fn get_node_location(node: &KdlNode, source: &str) -> SourceLocation {
    let span = node.name().span();
    let offset = span.offset();
    let len = span.len();

    let (line, column) = offset_to_line_col(source, offset);

    SourceLocation::new(line, column, offset, len)
}

/// Convert byte offset to line and column (1-indexed)
fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;

    for (i, ch) in source.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }

    (line, col)
}

/// Parse a configuration file from the given path
pub fn parse_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config_str(&content)
}

/// Parse configuration from a string
pub fn parse_config_str(content: &str) -> Result<Config, ConfigError> {
    let doc: kdl::KdlDocument = content.parse().map_err(|e: kdl::KdlError| {
        // kdl uses an older miette version, so rebuild the span from offset/len
        let offset = e.span.offset();
        let len = e.span.len();
        let span = miette::SourceSpan::from((offset, len));
        ConfigError::ParseError {
            src: content.to_string(),
            span,
            source: e,
        }
    })?;

    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "global" => {
                config.global = parse_global(node)?;
            }
            "device" => {
                let device = parse_device(node, content, &mut config.rejected)?;
                config.devices.push(device);
            }
            name => {
                tracing::warn!("Unknown top-level node: {}", name);
            }
        }
    }

    Ok(config)
}

fn parse_global(node: &KdlNode) -> Result<GlobalConfig, ConfigError> {
    let mut global = GlobalConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "log-level" => {
                    if let Some(val) = first_argument(child).and_then(KdlValue::as_string) {
                        global.log_level = val
                            .parse()
                            .map_err(|message| ConfigError::Invalid { message })?;
                    }
                }
                name => {
                    tracing::warn!("Unknown global config option: {}", name);
                }
            }
        }
    }

    Ok(global)
}

fn parse_device(
    node: &KdlNode,
    source: &str,
    rejected: &mut Vec<EntryProblem>,
) -> Result<DeviceConfig, ConfigError> {
    let id = first_argument(node)
        .and_then(KdlValue::as_string)
        .map(str::to_string)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ConfigError::MissingField {
            field: "device identifier (e.g., `device \"usb-0000:00:14.0-2/input0\" { ... }`)"
                .to_string(),
        })?;

    let alias = property(node, "alias")
        .and_then(KdlValue::as_string)
        .map(str::to_string);

    let mut device = DeviceConfig {
        id,
        alias,
        entries: Vec::new(),
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match parse_entry(child) {
                Ok(entry) => device.entries.push(entry),
                Err(message) => {
                    let problem = EntryProblem {
                        device: device.id.clone(),
                        node: child.name().value().to_string(),
                        location: get_node_location(child, source),
                        message,
                    };
                    tracing::warn!("Skipping config entry at {}", problem);
                    rejected.push(problem);
                }
            }
        }
    }

    Ok(device)
}

/// Parse one remap entry. Errors are human-readable reasons.
fn parse_entry(node: &KdlNode) -> Result<RemapEntry, String> {
    let kind = node.name().value();

    for entry in node.entries() {
        if let Some(name) = entry.name() {
            match (name.value(), kind) {
                ("when", _) | ("mods", "virtual") => {}
                (other, _) => return Err(format!("unknown property `{}`", other)),
            }
        }
    }

    let args = arguments(node);
    let (trigger_arg, rest) = args
        .split_first()
        .ok_or_else(|| "missing trigger (scan code or key name)".to_string())?;

    let scan_code = parse_key_value(trigger_arg)?;
    let modifiers = match property(node, "when") {
        Some(value) => parse_modifiers(value)?,
        None => Modifiers::NONE,
    };

    let output = match kind {
        "block" => {
            expect_count(rest, 0)?;
            OutputSpec::NoOp
        }
        "unicode" => {
            expect_count(rest, 1)?;
            OutputSpec::Unicode(parse_codepoint(rest[0])?)
        }
        "virtual" => {
            expect_count(rest, 1)?;
            let key = parse_key_value(rest[0])?;
            let modifiers = match property(node, "mods") {
                Some(value) => parse_modifiers(value)?,
                None => Modifiers::NONE,
            };
            OutputSpec::Virtual { key, modifiers }
        }
        "macro" => {
            if rest.is_empty() {
                return Err("macro needs at least one step".to_string());
            }
            let mut steps = Vec::with_capacity(rest.len() * 2);
            for value in rest {
                parse_macro_step(value, &mut steps)?;
            }
            OutputSpec::Macro(steps)
        }
        "string" => {
            expect_count(rest, 1)?;
            let text = rest[0]
                .as_string()
                .ok_or_else(|| format!("expected a string, got {}", rest[0]))?;
            OutputSpec::String(text.chars().map(u32::from).collect())
        }
        "script" => {
            expect_count(rest, 1)?;
            let path = rest[0]
                .as_string()
                .ok_or_else(|| format!("expected a program path, got {}", rest[0]))?;
            OutputSpec::Script(PathBuf::from(shellexpand::tilde(path).into_owned()))
        }
        other => return Err(format!("unknown output kind `{}`", other)),
    };

    Ok(RemapEntry {
        trigger: Trigger::new(scan_code, modifiers),
        output,
    })
}

fn arguments(node: &KdlNode) -> Vec<&KdlValue> {
    node.entries()
        .iter()
        .filter(|entry| entry.name().is_none())
        .map(KdlEntry::value)
        .collect()
}

fn first_argument(node: &KdlNode) -> Option<&KdlValue> {
    node.entries()
        .iter()
        .find(|entry| entry.name().is_none())
        .map(KdlEntry::value)
}

fn property<'a>(node: &'a KdlNode, key: &str) -> Option<&'a KdlValue> {
    node.entries()
        .iter()
        .find(|entry| entry.name().map(|n| n.value()) == Some(key))
        .map(KdlEntry::value)
}

fn expect_count(values: &[&KdlValue], expected: usize) -> Result<(), String> {
    if values.len() == expected {
        return Ok(());
    }
    Err(format!(
        "expected {} output argument(s), got {}",
        expected,
        values.len()
    ))
}

/// A key given either as an integer code or as a key name.
fn parse_key_value(value: &KdlValue) -> Result<u16, String> {
    if let Some(code) = value.as_i64() {
        return u16::try_from(code).map_err(|_| format!("key code {} is out of range", code));
    }
    let name = value
        .as_string()
        .ok_or_else(|| format!("expected a key code or key name, got {}", value))?;
    parse_key(name)
        .map(|key| key.code())
        .ok_or_else(|| format!("unknown key '{}'", name))
}

fn parse_modifiers(value: &KdlValue) -> Result<Modifiers, String> {
    let text = value
        .as_string()
        .ok_or_else(|| format!("expected a modifier list like \"LCtrl+LShift\", got {}", value))?;
    Modifiers::parse(text).map_err(|e| e.to_string())
}

/// A code point given as an integer, or as a string holding one character.
fn parse_codepoint(value: &KdlValue) -> Result<u32, String> {
    if let Some(code) = value.as_i64() {
        return u32::try_from(code).map_err(|_| format!("code point {} is out of range", code));
    }
    let text = value
        .as_string()
        .ok_or_else(|| format!("expected a code point or a character, got {}", value))?;
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Ok(u32::from(ch)),
        _ => Err(format!(
            "expected exactly one character, got {:?} (use `string` for text)",
            text
        )),
    }
}

/// `"+X"` presses X, `"-X"` releases it, a bare `"X"` (or integer code) taps it.
fn parse_macro_step(value: &KdlValue, steps: &mut Vec<MacroStep>) -> Result<(), String> {
    if let Some(code) = value.as_i64() {
        let key = u16::try_from(code).map_err(|_| format!("key code {} is out of range", code))?;
        steps.push(MacroStep::down(key));
        steps.push(MacroStep::up(key));
        return Ok(());
    }

    let text = value
        .as_string()
        .ok_or_else(|| format!("expected a macro step like \"+LCtrl\", got {}", value))?;

    let (prefix, name) = if text.len() > 1 && (text.starts_with('+') || text.starts_with('-')) {
        (text.chars().next(), &text[1..])
    } else {
        (None, text)
    };

    let key = parse_key(name)
        .ok_or_else(|| format!("unknown key '{}' in macro step \"{}\"", name, text))?
        .code();

    match prefix {
        Some('+') => steps.push(MacroStep::down(key)),
        Some(_) => steps.push(MacroStep::up(key)),
        None => {
            steps.push(MacroStep::down(key));
            steps.push(MacroStep::up(key));
        }
    }
    Ok(())
}
