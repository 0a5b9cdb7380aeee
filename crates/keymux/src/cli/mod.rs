//! CLI subcommands: topology, status-byte decoding, matrix scans.

mod bus;
mod config_cmd;
mod decode;
mod devices;
mod scan;
mod status;
mod topology;

use std::path::Path;

use clap::Subcommand;
use serde::Serialize;

pub(super) use crate::RUNNING;
pub(super) use keymux_lib::config::Config;
pub(super) use keymux_lib::error::Result;
pub(super) use keymux_lib::scanner::AddressedScanner;
pub(super) use keymux_lib::status::{self as key_status, KeyEvent};
pub(super) use keymux_lib::topology::KeyPosition;

const PADDING: usize = 2;

/// Compute alignment width for a command's key-value output.
/// Ensures at least PADDING spaces after the longest key in either level,
/// with top-level and indent values aligned to the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn format_kv(key: &str, value: impl std::fmt::Display, w: usize) -> String {
    format!("{key:<width$}{value}", width = w)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{}", format_kv(key, value, w));
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w - 2);
}

/// Format a list of bus addresses as `0x70, 0x71`.
pub(super) fn format_addresses(addresses: &[u8]) -> String {
    if addresses.is_empty() {
        return "(none)".into();
    }
    addresses
        .iter()
        .map(|a| format!("0x{a:02X}"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(super) fn print_json(value: &impl Serialize) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(std::io::Error::from)?;
    println!("{text}");
    Ok(())
}

/// Load the config from `custom_path`, or from the platform default location.
pub(super) fn load_config(custom_path: Option<&Path>) -> Config {
    match custom_path {
        Some(path) => {
            let (config, warnings) = Config::load_from(path);
            for w in &warnings {
                log::warn!("{w}");
            }
            config
        }
        None => Config::load(),
    }
}

/// Reject a config that cannot drive hardware, listing every problem.
pub(super) fn require_valid(config: &Config) -> Result<()> {
    config.validate().map_err(|errors| {
        let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        keymux_lib::KeymuxError::Config(msgs.join("; "))
    })
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub valid: bool,
    pub problems: Vec<String>,
    pub settings: Config,
}

#[derive(Serialize)]
pub(super) struct TopologyOutput {
    pub device_count: usize,
    pub channel_count: usize,
    pub keys_per_channel: usize,
    pub total_keys: usize,
    pub capacity: usize,
    pub keys: Vec<KeyRowJson>,
}

#[derive(Serialize)]
pub(super) struct KeyRowJson {
    pub index: usize,
    #[serde(flatten)]
    pub position: KeyPosition,
    pub channel_select: u8,
    pub key_address: u8,
}

#[derive(Serialize)]
pub(super) struct DecodeJson {
    pub raw: u8,
    pub empty: bool,
    pub release: bool,
    pub code: u8,
    pub event: KeyEvent,
}

#[derive(Serialize)]
pub(super) struct DevicesOutput {
    pub bus: String,
    pub expected: usize,
    pub count: usize,
    pub devices: Vec<u8>,
}

#[derive(Serialize)]
pub(super) struct SweepJson {
    pub sweep: u64,
    pub readings: Vec<u32>,
}

#[derive(Serialize)]
pub(super) struct GroupOutput {
    pub group: String,
    pub keys: Vec<GroupKeyJson>,
}

#[derive(Serialize)]
pub(super) struct GroupKeyJson {
    pub index: usize,
    #[serde(flatten)]
    pub position: KeyPosition,
    pub value: u32,
}

#[derive(Serialize)]
pub(super) struct ControllerEventJson {
    pub controller: usize,
    pub address: u8,
    pub event: KeyEvent,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the logical key index to (device, channel, key) table
    Topology,

    /// Decode key-controller status bytes (decimal, 0x hex or 0b binary)
    Decode {
        /// Status bytes to decode
        #[arg(required = true, value_name = "BYTE", value_parser = decode::parse_byte)]
        bytes: Vec<u8>,
    },

    /// Show current configuration and file path
    Config,

    /// Scan the bus and list discovered multiplexers
    Devices,

    /// Read every key in logical order
    Scan {
        /// Keep sweeping until Ctrl+C
        #[arg(long)]
        watch: bool,
        /// Pause between sweeps in watch mode (milliseconds)
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,
    },

    /// Read a named key group from the config
    Group {
        /// Group name (see the [groups] table in the config file)
        name: String,
    },

    /// Poll every status controller and print decoded events
    Status,
}

pub fn run(cmd: Command, json: bool, custom_path: Option<&Path>) -> Result<()> {
    match cmd {
        Command::Topology => topology::cmd_topology(&load_config(custom_path), json),
        Command::Decode { bytes } => decode::cmd_decode(&bytes, json),
        Command::Config => config_cmd::cmd_config(json, custom_path),
        Command::Devices => devices::cmd_devices(&load_config(custom_path), json),
        Command::Scan { watch, interval_ms } => {
            scan::cmd_scan(&load_config(custom_path), json, watch, interval_ms)
        }
        Command::Group { name } => scan::cmd_group(&load_config(custom_path), &name, json),
        Command::Status => status::cmd_status(&load_config(custom_path), json),
    }
}
