//! multikeys CLI
//!
//! Checks configuration, lists keyboards and dry-runs the remap engine.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use miette::IntoDiagnostic;
use multikeys_core::{
    parse_key, Decision, KeyDirection, KeyEvent, KeyStroke, Modifiers, RemapTables,
};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "multikeys")]
#[command(about = "Per-keyboard key remapping tool")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/multikeys/config.kdl")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration file
    Validate,

    /// List keyboards and the identifiers to use in `device` nodes
    Devices,

    /// Show what the daemon would do with one key event
    Simulate {
        /// Device identifier
        #[arg(short, long)]
        device: String,

        /// Scan code (decimal or 0x hex) or key name
        #[arg(short, long)]
        key: String,

        /// Held modifiers, e.g. "LCtrl+LShift"
        #[arg(short, long, default_value = "")]
        mods: String,

        /// Event direction
        #[arg(long, value_enum, default_value_t = SimDirection::Press)]
        direction: SimDirection,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SimDirection {
    Press,
    Release,
    Repeat,
}

impl From<SimDirection> for KeyDirection {
    fn from(direction: SimDirection) -> Self {
        match direction {
            SimDirection::Press => KeyDirection::Press,
            SimDirection::Release => KeyDirection::Release,
            SimDirection::Repeat => KeyDirection::Repeat,
        }
    }
}

fn main() -> miette::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    // Expand tilde in config path
    let config_path: PathBuf = shellexpand::tilde(&cli.config).into_owned().into();

    match cli.command {
        Commands::Validate => cmd_validate(&config_path),
        Commands::Devices => cmd_devices(),
        Commands::Simulate {
            device,
            key,
            mods,
            direction,
            json,
        } => cmd_simulate(&config_path, &device, &key, &mods, direction.into(), json),
    }
}

fn cmd_validate(config_path: &Path) -> miette::Result<()> {
    println!("Validating configuration: {}", config_path.display());

    let config = multikeys_config::parse_config(config_path)?;
    let (tables, rejections) = config.build_tables();

    println!("  Devices: {}", config.devices.len());
    for device in &config.devices {
        let loaded = loaded_remaps(&tables, &device.id);
        println!(
            "    - {} ({} remap(s), {} loaded)",
            device.display_name(),
            device.entries.len(),
            loaded.len()
        );
        for line in loaded {
            println!("        {}", line);
        }
    }

    let problems = config.rejected.len() + rejections.len();
    if problems == 0 {
        println!("Configuration is valid!");
        return Ok(());
    }

    println!("\nProblems:");
    for problem in &config.rejected {
        println!("  {}", problem);
    }
    for rejection in &rejections {
        println!("  {}", rejection);
    }

    Err(miette::miette!(
        "{} entr{} would be skipped",
        problems,
        if problems == 1 { "y" } else { "ies" }
    ))
}

fn cmd_devices() -> miette::Result<()> {
    println!("Keyboards:\n");

    for entry in std::fs::read_dir("/dev/input").into_diagnostic()? {
        let entry = entry.into_diagnostic()?;
        let path = entry.path();

        if !path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("event"))
            .unwrap_or(false)
        {
            continue;
        }

        // Skip devices we can't open
        let Ok(device) = evdev::Device::open(&path) else {
            continue;
        };

        let is_keyboard = device.supported_events().contains(evdev::EventType::KEY)
            && device
                .supported_keys()
                .map(|keys| keys.contains(evdev::Key::KEY_A))
                .unwrap_or(false);
        if !is_keyboard {
            continue;
        }

        let name = device.name().unwrap_or("Unknown");
        let input_id = device.input_id();
        let id =
            multikeys_config::device_identifier(device.physical_path(), device.unique_name(), name);

        println!("  {}", name);
        println!("    Path: {}", path.display());
        println!("    USB ID: {:04x}:{:04x}", input_id.vendor(), input_id.product());
        println!("    Identifier: \"{}\"", id);
        println!();
    }

    Ok(())
}

/// One line per loaded remap of `device`, ordered by trigger.
fn loaded_remaps(tables: &RemapTables, device: &str) -> Vec<String> {
    let Some(table) = tables.table(device) else {
        return Vec::new();
    };
    let mut remaps: Vec<_> = table.iter().collect();
    remaps.sort_by_key(|(trigger, _)| (trigger.scan_code, trigger.modifiers.bits()));
    remaps
        .into_iter()
        .map(|(trigger, output)| format!("{} -> {}", trigger, output))
        .collect()
}

/// Result of a dry-run evaluation.
#[derive(Debug, Serialize)]
struct SimulateReport {
    device: String,
    scan_code: u16,
    modifiers: String,
    blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    strokes: Vec<KeyStroke>,
    #[serde(skip_serializing_if = "Option::is_none")]
    script: Option<PathBuf>,
}

fn cmd_simulate(
    config_path: &Path,
    device: &str,
    key: &str,
    mods: &str,
    direction: KeyDirection,
    json: bool,
) -> miette::Result<()> {
    let config = multikeys_config::parse_config(config_path)?;
    let scan_code = parse_scan_code(key)?;
    let modifiers = Modifiers::parse(mods).into_diagnostic()?;

    let (tables, _) = config.build_tables();
    if tables.table(device).is_none() {
        let known: Vec<&str> = tables.devices().collect();
        eprintln!(
            "warning: no remaps for \"{}\" (configured: {})",
            device,
            if known.is_empty() {
                "none".to_string()
            } else {
                known.join(", ")
            }
        );
    }
    let report = evaluate_report(&tables, device, scan_code, modifiers, direction);

    if json {
        let text = serde_json::to_string_pretty(&report).into_diagnostic()?;
        println!("{}", text);
        return Ok(());
    }

    println!(
        "{} {:#04x} with {} on \"{}\"",
        match direction {
            KeyDirection::Press => "press",
            KeyDirection::Release => "release",
            KeyDirection::Repeat => "repeat",
        },
        report.scan_code,
        report.modifiers,
        report.device
    );
    match &report.output {
        None => println!("  pass-through"),
        Some(output) => {
            println!("  block: {}", output);
            if let Some(script) = &report.script {
                println!("  launches {}", script.display());
            }
            for stroke in &report.strokes {
                println!("    {}", stroke);
            }
        }
    }

    Ok(())
}

fn evaluate_report(
    tables: &RemapTables,
    device: &str,
    scan_code: u16,
    modifiers: Modifiers,
    direction: KeyDirection,
) -> SimulateReport {
    let decision = tables.evaluate(&KeyEvent {
        device,
        scan_code,
        direction,
        modifiers,
    });

    let mut report = SimulateReport {
        device: device.to_string(),
        scan_code,
        modifiers: modifiers.to_string(),
        blocked: decision.is_block(),
        output: None,
        strokes: Vec::new(),
        script: None,
    };

    if let Decision::Block(descriptor) = &decision {
        report.output = Some(descriptor.to_string());
        if let Some(replayed) = decision.replay_on(direction) {
            report.strokes = replayed.strokes().to_vec();
            report.script = replayed.script_path().map(Path::to_path_buf);
        }
    }

    report
}

/// Scan code as decimal, `0x` hex, or a key name.
fn parse_scan_code(input: &str) -> miette::Result<u16> {
    let input = input.trim();
    let parsed = match input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => input.parse::<u16>().ok(),
    };

    parsed
        .or_else(|| parse_key(input).map(|key| key.code()))
        .ok_or_else(|| miette::miette!("'{}' is not a scan code or known key name", input))
}
