//! Clap derive structures for the `espgrow` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.
//! Depends on clap only, so `build.rs` can include it for man pages.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// espgrow -- talk to an espgrow environmental controller
#[derive(Debug, Parser)]
#[command(
    name = "espgrow",
    version,
    about = "Monitor and control an espgrow environmental controller",
    long_about = "Mirrors sensors, devices and automation rules from an espgrow\n\
        controller over its WebSocket link, and sends control commands.\n\n\
        Device toggles are confirmed by the controller before they are reported.",
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
    /// Controller profile to use
    #[arg(long, short = 'p', env = "ESPGROW_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Controller address, e.g. 192.168.1.40 or ws://grow.local/ws (overrides profile)
    #[arg(long, short = 'c', env = "ESPGROW_CONTROLLER", global = true)]
    pub controller: Option<String>,

    /// Offset for schedule times in minutes east of UTC (default: local zone)
    #[arg(long, env = "ESPGROW_UTC_OFFSET", global = true, allow_hyphen_values = true)]
    pub utc_offset: Option<i32>,

    /// Output format
    #[arg(long, short = 'o', env = "ESPGROW_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output
    #[arg(long, env = "ESPGROW_COLOR", global = true)]
    pub color: Option<ColorMode>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Seconds to wait for the controller
    #[arg(long, env = "ESPGROW_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// One-screen summary of the controller
    #[command(alias = "st")]
    Status,

    /// Stream live changes until interrupted
    Watch(WatchArgs),

    /// List and control actuators
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Sensors, live readings and history
    #[command(alias = "s")]
    Sensors(SensorsArgs),

    /// Automation rules
    #[command(alias = "r")]
    Rules(RulesArgs),

    /// Controller health and latency
    #[command(alias = "sys")]
    System(SystemArgs),

    /// Light sensor PPFD calibration
    Ppfd(PpfdArgs),

    /// Controller clock offset
    #[command(alias = "tz")]
    Timezone(TimezoneArgs),

    /// Download devices, rules and sensors to a JSON file
    Backup {
        /// Destination file
        file: PathBuf,
    },

    /// Replace the controller configuration from a backup file
    Restore {
        /// Backup file written by `espgrow backup`
        file: PathBuf,
    },

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Stop after this many seconds
    #[arg(long, short = 'd')]
    pub duration: Option<u64>,

    /// Also print every sensor reading push
    #[arg(long)]
    pub readings: bool,
}

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List devices and their confirmed state
    #[command(alias = "ls")]
    List,

    /// Switch a device to the opposite state and wait for confirmation
    Toggle {
        /// Device ID
        device: String,
    },

    /// Register a new device
    Add(DeviceSpec),

    /// Change a device
    Update {
        /// Device ID
        device: String,

        #[command(flatten)]
        fields: DeviceFields,
    },

    /// Remove a device
    #[command(alias = "rm")]
    Remove {
        /// Device ID
        device: String,
    },
}

#[derive(Debug, Args)]
pub struct DeviceSpec {
    /// Device ID
    pub id: String,

    /// Display name
    pub name: String,

    /// Device type
    #[arg(long = "type", short = 't', value_enum)]
    pub device_type: DeviceKindArg,

    /// How the controller switches it
    #[arg(long, short = 'm', value_enum, default_value = "relay")]
    pub method: ControlMethodArg,

    /// IP address (Shelly / Tasmota)
    #[arg(long)]
    pub ip: Option<String>,

    /// GPIO pin (relay)
    #[arg(long)]
    pub pin: Option<u32>,
}

#[derive(Debug, Args)]
pub struct DeviceFields {
    /// New display name
    #[arg(long)]
    pub name: Option<String>,

    /// New device type
    #[arg(long = "type", value_enum)]
    pub device_type: Option<DeviceKindArg>,

    /// New control method
    #[arg(long, value_enum)]
    pub method: Option<ControlMethodArg>,

    /// New IP address
    #[arg(long)]
    pub ip: Option<String>,

    /// New GPIO pin
    #[arg(long)]
    pub pin: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeviceKindArg {
    Fan,
    Light,
    Heater,
    Pump,
    Humidifier,
    Dehumidifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ControlMethodArg {
    Relay,
    #[value(name = "shelly-gen1", alias = "shelly")]
    ShellyGen1,
    #[value(name = "shelly-gen2")]
    ShellyGen2,
    Tasmota,
}

// ── Sensors ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SensorsArgs {
    #[command(subcommand)]
    pub command: SensorsCommand,
}

#[derive(Debug, Subcommand)]
pub enum SensorsCommand {
    /// List configured sensors
    #[command(alias = "ls")]
    List,

    /// Wait for the next live readings push and show it
    Readings,

    /// Fetch a history series
    History {
        /// Sensor ID
        sensor: String,

        /// Time window
        #[arg(long, short = 'r', value_enum, default_value = "24h")]
        range: RangeArg,

        /// Only show the last N points
        #[arg(long)]
        tail: Option<usize>,
    },

    /// Register a new sensor
    Add(SensorSpec),

    /// Remove a sensor
    #[command(alias = "rm")]
    Remove {
        /// Sensor ID
        sensor: String,
    },
}

#[derive(Debug, Args)]
pub struct SensorSpec {
    /// Sensor ID
    pub id: String,

    /// Display name
    pub name: String,

    /// Measured quantity
    #[arg(long = "type", short = 't', value_enum)]
    pub sensor_type: SensorKindArg,

    /// Unit label, e.g. °C, %, ppm
    #[arg(long, short = 'u')]
    pub unit: String,

    /// Hardware driver, e.g. sht4x, scd4x, as7341, calculated
    #[arg(long)]
    pub hardware: String,

    /// Bus address
    #[arg(long)]
    pub address: Option<String>,

    /// Temperature source for derived sensors
    #[arg(long)]
    pub temp_source: Option<String>,

    /// Humidity source for derived sensors
    #[arg(long)]
    pub hum_source: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SensorKindArg {
    Temperature,
    Humidity,
    Co2,
    Light,
    Vpd,
    SoilMoisture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RangeArg {
    #[value(name = "12h")]
    Short,
    #[value(name = "24h")]
    Medium,
    #[value(name = "7d")]
    Long,
}

// ── Rules ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub command: RulesCommand,
}

#[derive(Debug, Subcommand)]
pub enum RulesCommand {
    /// List rules (schedule times in local time)
    #[command(alias = "ls")]
    List,

    /// Enable or disable a rule
    Toggle {
        /// Rule ID
        rule: String,
    },

    /// Remove a rule
    #[command(alias = "rm")]
    Remove {
        /// Rule ID
        rule: String,
    },

    /// Create a sensor-threshold rule
    AddSensor {
        /// Rule ID
        id: String,

        /// Display name
        name: String,

        /// Sensor to watch
        #[arg(long)]
        sensor: String,

        /// Comparison
        #[arg(long = "op", value_enum)]
        operator: OperatorArg,

        /// Trigger threshold
        #[arg(long, allow_hyphen_values = true)]
        threshold: f64,

        /// Separate release threshold (enables hysteresis)
        #[arg(long, allow_hyphen_values = true)]
        threshold_off: Option<f64>,

        /// Minimum run time in milliseconds
        #[arg(long)]
        min_run_ms: Option<u64>,

        /// Device to act on
        #[arg(long)]
        device: String,

        /// What to do when the rule fires
        #[arg(long, value_enum, default_value = "on")]
        action: ActionArg,
    },

    /// Create a daily schedule rule
    AddSchedule {
        /// Rule ID
        id: String,

        /// Display name
        name: String,

        /// Local on time, HH:MM
        #[arg(long)]
        on: String,

        /// Local off time, HH:MM
        #[arg(long)]
        off: String,

        /// Device to act on
        #[arg(long)]
        device: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OperatorArg {
    #[value(name = "gt", alias = ">")]
    GreaterThan,
    #[value(name = "ge", alias = ">=")]
    GreaterOrEqual,
    #[value(name = "lt", alias = "<")]
    LessThan,
    #[value(name = "le", alias = "<=")]
    LessOrEqual,
    #[value(name = "eq", alias = "=")]
    Equal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ActionArg {
    On,
    Off,
}

// ── System ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SystemArgs {
    #[command(subcommand)]
    pub command: SystemCommand,
}

#[derive(Debug, Subcommand)]
pub enum SystemCommand {
    /// Firmware, memory, uptime and Wi-Fi signal
    Info,

    /// Measure the round trip to the controller
    Ping {
        /// Number of pings
        #[arg(long, short = 'n', default_value = "1")]
        count: u32,
    },
}

// ── PPFD ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct PpfdArgs {
    #[command(subcommand)]
    pub command: PpfdCommand,
}

#[derive(Debug, Subcommand)]
pub enum PpfdCommand {
    /// Show the calibration factor
    Get,

    /// Calibrate against a reference meter reading (µmol/m²/s)
    Calibrate {
        /// Reference PPFD
        known_ppfd: f64,
    },

    /// Restore the factory calibration
    Reset,
}

// ── Timezone ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct TimezoneArgs {
    #[command(subcommand)]
    pub command: TimezoneCommand,
}

#[derive(Debug, Subcommand)]
pub enum TimezoneCommand {
    /// Show the controller's offset
    Get,

    /// Set the controller's offset: minutes (-300) or ±HH:MM (-05:00)
    Set {
        #[arg(allow_hyphen_values = true)]
        offset: String,
    },
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

    /// List profiles (* marks the default)
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name
        name: String,
    },

    /// Create or update a profile
    Init {
        /// Profile name
        #[arg(long, default_value = "default")]
        name: String,

        /// Make this the default profile
        #[arg(long)]
        set_default: bool,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
