//! Device enumeration and management

use std::path::PathBuf;

use anyhow::Result;
use evdev::Device;

/// Name of the uinput device all synthetic output goes through.
///
/// Capture never opens a device with this name, so nothing the daemon injects
/// is ever evaluated again.
pub const VIRTUAL_DEVICE_NAME: &str = "multikeys virtual keyboard";

/// Information about an input device
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: PathBuf,
    pub name: String,
    /// Identifier matched against `device` nodes in the config
    pub id: String,
}

/// Open every physical keyboard under /dev/input.
///
/// The daemon's own virtual keyboard is skipped.
pub fn open_keyboards() -> Result<Vec<(DeviceInfo, Device)>> {
    let mut devices = Vec::new();

    for entry in std::fs::read_dir("/dev/input")? {
        let entry = entry?;
        let path = entry.path();

        // Only look at event* devices
        if !path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("event"))
            .unwrap_or(false)
        {
            continue;
        }

        let device = match Device::open(&path) {
            Ok(device) => device,
            Err(e) => {
                tracing::debug!("Could not open {}: {}", path.display(), e);
                continue;
            }
        };

        let name = device.name().unwrap_or("Unknown").to_string();
        if is_own_device(&name) {
            tracing::debug!("Skipping our own virtual device at {}", path.display());
            continue;
        }
        if !is_keyboard(&device) {
            continue;
        }

        let id = multikeys_config::device_identifier(
            device.physical_path(),
            device.unique_name(),
            &name,
        );
        devices.push((DeviceInfo { path, name, id }, device));
    }

    Ok(devices)
}

/// Whether a device is the injector's output device.
pub fn is_own_device(name: &str) -> bool {
    name == VIRTUAL_DEVICE_NAME
}

/// Check if a device is a keyboard
pub fn is_keyboard(device: &Device) -> bool {
    device
        .supported_events()
        .contains(evdev::EventType::KEY)
        && device
            .supported_keys()
            .map(|keys| keys.contains(evdev::Key::KEY_A))
            .unwrap_or(false)
}
