//! Clap derive structures for the `lumen` CLI.
//!
//! Defines the command tree, global flags and shared value enums. Kept
//! free of workspace types so `build.rs` can render man pages from it.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// lumen -- drive addressable LED controllers from the command line
#[derive(Debug, Parser)]
#[command(
    name = "lumen",
    version,
    about = "Control LED controllers over serial, Bluetooth and Wi-Fi",
    long_about = "Control addressable LED controllers from the command line.\n\n\
        Devices are described by profiles in the config file (see `lumen config`).\n\
        Every command connects, does its work and disconnects; `lumen shell`\n\
        keeps one connection open with undo, redo and snapshots.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Device profile to use (defaults to `default_device`)
    #[arg(long, short = 'd', env = "LUMEN_DEVICE", global = true)]
    pub device: Option<String>,

    /// Connect to this address instead of a profile (needs --family)
    #[arg(long, short = 'a', global = true, requires = "family")]
    pub address: Option<String>,

    /// Firmware family for --address
    #[arg(long, short = 'f', global = true)]
    pub family: Option<FamilyArg>,

    /// Config file (overrides the platform default location)
    #[arg(long, env = "LUMEN_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Drive an in-memory simulated device instead of hardware
    #[arg(long, env = "LUMEN_SIMULATE", global = true)]
    pub simulate: bool,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "LUMEN_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Connect timeout in seconds (overrides config)
    #[arg(long, env = "LUMEN_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Value Enums ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FamilyArg {
    /// Line protocol over a serial port or Bluetooth SPP
    SerialText,
    /// Line protocol over a BLE UART service
    BleText,
    /// Line-delimited JSON over TCP
    WifiJson,
    /// Framed binary protocol over a serial port
    SerialBinary,
    /// In-memory device
    Mock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportArg {
    Serial,
    Ble,
    Socket,
    Mock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PowerState {
    On,
    Off,
    Toggle,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Discover nearby or attached devices
    Scan(ScanArgs),

    /// List configured device profiles
    #[command(alias = "ls")]
    Devices,

    /// Show the device's current state
    #[command(alias = "st")]
    Status,

    /// Set a solid color
    Color(ColorArgs),

    /// Set brightness (0-100)
    #[command(alias = "bri")]
    Brightness(BrightnessArgs),

    /// Switch the device on or off
    Power(PowerArgs),

    /// Start or stop an effect
    #[command(alias = "fx")]
    Effect(EffectArgs),

    /// Recall a preset stored on the device
    Preset(PresetArgs),

    /// Interactive session with undo, redo, presets and snapshots
    Shell(ShellArgs),

    /// Manage CLI configuration and device profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Device commands ──────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Channel to enumerate
    #[arg(default_value = "serial")]
    pub transport: TransportArg,

    /// Listen window in seconds (radio transports)
    #[arg(long, short = 'w')]
    pub window: Option<u64>,
}

#[derive(Debug, Args)]
pub struct ColorArgs {
    /// Hex color: #rrggbb, rrggbb or #rgb
    pub hex: String,
}

#[derive(Debug, Args)]
pub struct BrightnessArgs {
    /// Percent
    #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
    pub level: u8,
}

#[derive(Debug, Args)]
pub struct PowerArgs {
    pub state: PowerState,
}

#[derive(Debug, Args)]
pub struct EffectArgs {
    /// Effect name (e.g. rainbow, pulse, strobe)
    #[arg(required_unless_present = "stop")]
    pub name: Option<String>,

    /// Speed (0-100)
    #[arg(long, short = 's', value_parser = clap::value_parser!(u8).range(0..=100))]
    pub speed: Option<u8>,

    /// Intensity (0-100)
    #[arg(long, short = 'i', value_parser = clap::value_parser!(u8).range(0..=100))]
    pub intensity: Option<u8>,

    /// Stop the running effect
    #[arg(long, conflicts_with_all = ["name", "speed", "intensity"])]
    pub stop: bool,
}

#[derive(Debug, Args)]
pub struct PresetArgs {
    /// Preset name as known by the firmware
    pub name: String,
}

#[derive(Debug, Args)]
pub struct ShellArgs {
    /// Print controller events to stderr as they happen
    #[arg(long, short = 'e')]
    pub events: bool,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Print the config file location
    Path,

    /// Add or replace a device profile
    AddDevice(AddDeviceArgs),

    /// Remove a device profile
    #[command(alias = "rm-device")]
    RemoveDevice(RemoveDeviceArgs),
}

#[derive(Debug, Args)]
pub struct AddDeviceArgs {
    /// Profile name
    pub name: String,

    /// tty path, BLE MAC or host:port
    #[arg(long = "at")]
    pub at: String,

    /// Firmware family
    #[arg(long = "kind", default_value = "serial-text")]
    pub kind: FamilyArg,

    /// Display name
    #[arg(long)]
    pub label: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    pub baud: Option<u32>,

    /// Make this the default device
    #[arg(long)]
    pub default: bool,
}

#[derive(Debug, Args)]
pub struct RemoveDeviceArgs {
    pub name: String,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    pub shell: clap_complete::Shell,
}
