//! Configuration data model

use multikeys_core::{Rejection, RemapEntry, RemapTables};

use crate::error::EntryProblem;

/// Root configuration structure
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub global: GlobalConfig,
    pub devices: Vec<DeviceConfig>,
    /// Entries that were skipped because they could not be parsed
    pub rejected: Vec<EntryProblem>,
}

impl Config {
    /// Build the remap tables described by this configuration.
    ///
    /// Entries that parse but fail to build (bad code points, invalid key
    /// codes, duplicate triggers...) come back as rejections.
    pub fn build_tables(&self) -> (RemapTables, Vec<Rejection>) {
        RemapTables::build(
            self.devices
                .iter()
                .map(|device| (device.id.clone(), device.entries.iter().cloned())),
        )
    }

    /// Total number of parsed remap entries across all devices.
    pub fn entry_count(&self) -> usize {
        self.devices.iter().map(|d| d.entries.len()).sum()
    }
}

/// Global settings
#[derive(Debug, Clone, Default)]
pub struct GlobalConfig {
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string for an `EnvFilter`.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown log level: {}", s)),
        }
    }
}

/// The identifier a `device` node is matched against.
///
/// The kernel's physical path is preferred because it stays the same across
/// reboots and tells two identical keyboards apart. Devices without one fall
/// back to their unique id, then their name.
pub fn device_identifier(
    physical_path: Option<&str>,
    unique_name: Option<&str>,
    name: &str,
) -> String {
    physical_path
        .filter(|p| !p.is_empty())
        .or(unique_name.filter(|u| !u.is_empty()))
        .unwrap_or(name)
        .to_string()
}

/// Remaps for one physical keyboard
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Device identifier, matched exactly (see `multikeys devices`)
    pub id: String,
    /// Friendly name used in logs
    pub alias: Option<String>,
    pub entries: Vec<RemapEntry>,
}

impl DeviceConfig {
    /// Alias if there is one, identifier otherwise.
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.id)
    }
}
