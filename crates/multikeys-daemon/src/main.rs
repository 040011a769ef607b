//! multikeys daemon
//!
//! Grabs physical keyboards and remaps keys per device according to
//! configuration. Send SIGHUP to reload the configuration.

mod device;
mod dispatch;
mod injector;
mod unicode;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use multikeys_config::Config;
use multikeys_core::RemapEngine;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::device::DeviceInfo;
use crate::dispatch::{DeviceEvent, Dispatcher};
use crate::injector::VirtualDevice;

/// Raw events buffered between the device readers and the dispatcher
const EVENT_QUEUE: usize = 256;

#[derive(Parser, Debug)]
#[command(name = "multikeysd")]
#[command(about = "Per-keyboard key remapping daemon")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/multikeys/config.kdl")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Expand tilde in config path
    let config_path: PathBuf = shellexpand::tilde(&args.config).into_owned().into();

    let config = multikeys_config::parse_config(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.global.log_level.as_filter())),
        )
        .init();

    tracing::info!("Loaded configuration from {}", config_path.display());

    let engine = Arc::new(RemapEngine::new(build_tables(&config)));

    let virtual_device = VirtualDevice::new_keyboard()
        .context("Failed to create virtual keyboard (is /dev/uinput accessible?)")?;

    let (tx, rx) = mpsc::channel(EVENT_QUEUE);
    let keyboards = device::open_keyboards().context("Failed to enumerate input devices")?;
    if keyboards.is_empty() {
        anyhow::bail!("No keyboards found under /dev/input");
    }

    for (info, device) in keyboards {
        if let Err(e) = spawn_reader(info.clone(), device, tx.clone()) {
            tracing::warn!(
                "Not capturing '{}' ({}): {:#}",
                info.name,
                info.path.display(),
                e
            );
        }
    }
    drop(tx);

    let dispatcher = Dispatcher::new(Arc::clone(&engine), virtual_device);
    let dispatch_task = tokio::spawn(dispatcher.run(rx));

    tracing::info!("multikeys daemon running");

    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;

    loop {
        tokio::select! {
            _ = hangup.recv() => reload(&config_path, &engine),
            _ = terminate.recv() => break,
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
        }
    }

    tracing::info!("Shutting down...");
    dispatch_task.abort();

    Ok(())
}

/// Build tables from `config`, logging everything that was left out.
fn build_tables(config: &Config) -> multikeys_core::RemapTables {
    for problem in &config.rejected {
        tracing::warn!("Skipped config entry: {}", problem);
    }

    let (tables, rejections) = config.build_tables();
    if !rejections.is_empty() {
        tracing::warn!("{} remap(s) rejected while building tables", rejections.len());
    }

    for device in &config.devices {
        tracing::info!(
            "Device '{}': {} remap(s)",
            device.display_name(),
            tables.table(&device.id).map(|t| t.len()).unwrap_or(0)
        );
    }

    tables
}

/// Re-read the configuration and publish new tables.
///
/// A config that fails to parse leaves the current tables in place.
fn reload(config_path: &Path, engine: &RemapEngine) {
    tracing::info!("Reloading configuration from {}", config_path.display());

    match multikeys_config::parse_config(config_path) {
        Ok(config) => {
            let tables = build_tables(&config);
            let count = tables.entry_count();
            engine.publish(tables);
            tracing::info!("Published {} remap(s)", count);
        }
        Err(e) => {
            tracing::error!("Reload failed, keeping current remaps: {}", e);
        }
    }
}

/// Grab `device` and forward its events to the dispatcher.
fn spawn_reader(
    info: DeviceInfo,
    mut device: evdev::Device,
    tx: mpsc::Sender<DeviceEvent>,
) -> Result<()> {
    device.grab().with_context(|| {
        format!(
            "Failed to grab device '{}' for exclusive access. \
             Is another program holding it?",
            info.name
        )
    })?;

    let mut events = device
        .into_event_stream()
        .with_context(|| format!("Failed to create event stream for '{}'", info.name))?;

    tracing::info!(
        "Capturing '{}' at {} (id \"{}\")",
        info.name,
        info.path.display(),
        info.id
    );

    let id: Arc<str> = Arc::from(info.id.as_str());
    tokio::spawn(async move {
        loop {
            match events.next_event().await {
                Ok(event) => {
                    let forwarded = DeviceEvent {
                        device: Arc::clone(&id),
                        event,
                    };
                    if tx.send(forwarded).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Stopped reading '{}': {}", info.name, e);
                    break;
                }
            }
        }
    });

    Ok(())
}
