use std::time::Duration;

use apdulink_frame::{PacketConfig, Reassembly, DEFAULT_PACKET_SIZE};
use apdulink_session::MockRegistry;
use apdulink_transport::{DeviceFilter, DeviceRegistry};
use clap::{Args, Subcommand, ValueEnum};

use crate::exit::{CliError, CliResult, DATA_INVALID, USAGE};
use crate::output::OutputFormat;

pub mod devices;
pub mod exchange;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List attached devices.
    Devices(DevicesArgs),
    /// Send one command APDU and print the response.
    Exchange(ExchangeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, backend: Backend, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Devices(args) => devices::run(args, backend, format),
        Command::Exchange(args) => exchange::run(args, backend, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum Backend {
    /// USB HID devices (requires the `hid` feature).
    Hid,
    /// In-memory device answering every command with 9000.
    Mock,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum ReassemblyMode {
    /// Trust the first packet's length field.
    DeclaredLength,
    /// Per-packet continuation heuristic.
    Heuristic,
}

impl From<ReassemblyMode> for Reassembly {
    fn from(mode: ReassemblyMode) -> Self {
        match mode {
            ReassemblyMode::DeclaredLength => Reassembly::DeclaredLength,
            ReassemblyMode::Heuristic => Reassembly::Heuristic,
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    /// Only consider devices with this USB vendor id (hex, e.g. 2c97).
    #[arg(long, value_name = "VID")]
    pub vendor: Option<String>,
}

impl FilterArgs {
    pub fn to_filter(&self) -> CliResult<DeviceFilter> {
        match &self.vendor {
            Some(vendor) => Ok(DeviceFilter::vendor(parse_hex_u16("vendor", vendor)?)),
            None => Ok(DeviceFilter::any()),
        }
    }
}

#[derive(Args, Debug)]
pub struct DevicesArgs {
    #[command(flatten)]
    pub filter: FilterArgs,
    /// Print only the number of matching devices.
    #[arg(long)]
    pub count: bool,
}

#[derive(Args, Debug)]
pub struct ExchangeArgs {
    /// Command APDU as hex (spaces and a 0x prefix are accepted).
    pub apdu: String,
    #[command(flatten)]
    pub filter: FilterArgs,
    /// Index of the device among the matching ones.
    #[arg(long, default_value = "0")]
    pub index: usize,
    /// Deadline for the response (e.g. 20s, 500ms).
    #[arg(long, default_value = "20s")]
    pub timeout: String,
    /// How the end of a response is detected.
    #[arg(long, value_name = "MODE", default_value = "declared-length")]
    pub reassembly: ReassemblyMode,
    /// Channel identifier (hex).
    #[arg(long, default_value = "0101")]
    pub channel: String,
    /// Packet width in bytes.
    #[arg(long, default_value_t = DEFAULT_PACKET_SIZE)]
    pub packet_size: usize,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn open_registry(backend: Backend, packet: PacketConfig) -> CliResult<Box<dyn DeviceRegistry>> {
    match backend {
        Backend::Hid => hid_registry(),
        Backend::Mock => Ok(Box::new(MockRegistry::new().with_packet_config(packet))),
    }
}

#[cfg(feature = "hid")]
fn hid_registry() -> CliResult<Box<dyn DeviceRegistry>> {
    let registry = apdulink_transport::HidRegistry::new()
        .map_err(|err| crate::exit::transport_error("hid init failed", err))?;
    Ok(Box::new(registry))
}

#[cfg(not(feature = "hid"))]
fn hid_registry() -> CliResult<Box<dyn DeviceRegistry>> {
    Err(CliError::new(
        USAGE,
        "built without HID support (enable the `hid` feature or use --backend mock)",
    ))
}

pub fn parse_timeout(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "timeout must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid timeout value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

pub fn parse_hex_u16(what: &str, input: &str) -> CliResult<u16> {
    let digits = strip_hex_prefix(input.trim());
    u16::from_str_radix(digits, 16)
        .map_err(|_| CliError::new(USAGE, format!("invalid {what}: {input}")))
}

pub fn parse_apdu(input: &str) -> CliResult<Vec<u8>> {
    let digits: String = strip_hex_prefix(input.trim())
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    hex::decode(&digits).map_err(|err| CliError::new(DATA_INVALID, format!("invalid APDU hex: {err}")))
}

fn strip_hex_prefix(input: &str) -> &str {
    input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input)
}
