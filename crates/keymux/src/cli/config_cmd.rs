//! `config` subcommand: show current configuration, file path and problems.

use std::path::Path;

use super::{Config, ConfigOutput, Result, format_addresses, kv, kv_indent, kv_width, print_json};

pub(super) fn cmd_config(json: bool, custom_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(custom_path);
    let config_path = custom_path.map(|p| p.to_path_buf()).or_else(Config::path);
    let config_exists = config_path.as_ref().map(|p| p.exists()).unwrap_or(false);
    let problems: Vec<String> = match config.validate() {
        Ok(()) => Vec::new(),
        Err(errors) => errors.iter().map(|e| e.to_string()).collect(),
    };

    if json {
        return print_json(&ConfigOutput {
            config_file: config_path.as_ref().map(|p| p.display().to_string()),
            config_file_exists: config_exists,
            valid: problems.is_empty(),
            problems,
            settings: config,
        });
    }

    // Human-readable output
    let w = kv_width(
        &["Config file:"],
        &[
            "out_of_range:",
            "multiplexers:",
            "channels:",
            "keys_per_channel:",
            "total_keys:",
            "key_addresses:",
            "channel_select:",
            "bit_resolution:",
            "bus:",
            "scan_range:",
            "controllers:",
        ],
    );

    match &config_path {
        Some(p) => {
            if config_exists {
                kv("Config file:", format_args!("{} (loaded)", p.display()), w);
            } else {
                kv(
                    "Config file:",
                    format_args!("{} (not found, using defaults)", p.display()),
                    w,
                );
            }
        }
        None => kv("Config file:", "(no config directory)", w),
    }
    println!();

    let matrix = &config.matrix;
    println!("Settings:");
    kv_indent("out_of_range:", config.out_of_range, w);
    kv_indent("multiplexers:", matrix.device_count, w);
    kv_indent("channels:", matrix.channel_count, w);
    kv_indent("keys_per_channel:", matrix.keys_per_channel, w);
    kv_indent("total_keys:", matrix.total_keys, w);
    kv_indent("key_addresses:", format_addresses(&matrix.key_addresses), w);
    kv_indent("channel_select:", format_addresses(&matrix.channel_select), w);
    kv_indent("bit_resolution:", matrix.bit_resolution, w);
    kv_indent("bus:", &config.bus.path, w);
    kv_indent(
        "scan_range:",
        format_args!("0x{:02X}..=0x{:02X}", config.bus.scan_first, config.bus.scan_last),
        w,
    );
    kv_indent(
        "controllers:",
        format_addresses(&config.controllers.addresses),
        w,
    );
    println!();

    if config.groups.is_empty() {
        println!("Groups: (none)");
    } else {
        println!("Groups:");
        for (name, indices) in &config.groups {
            let list: Vec<String> = indices.iter().map(usize::to_string).collect();
            println!("  {name}: {}", list.join(", "));
        }
    }
    println!();

    if problems.is_empty() {
        println!("Validation: OK");
    } else {
        println!("Validation: {} problem(s)", problems.len());
        for p in &problems {
            println!("  - {p}");
        }
    }
    Ok(())
}
