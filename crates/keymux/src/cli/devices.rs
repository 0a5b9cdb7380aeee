//! `devices` subcommand: list multiplexers answering on the bus.

use super::{Config, DevicesOutput, Result, print_json};

pub(super) fn cmd_devices(config: &Config, json: bool) -> Result<()> {
    let mut bus = super::bus::open_bus(&config.bus)?;
    let devices = bus.scan()?;
    let expected = config.matrix.device_count;

    if json {
        return print_json(&DevicesOutput {
            bus: config.bus.path.clone(),
            expected,
            count: devices.len(),
            devices,
        });
    }

    if devices.is_empty() {
        println!(
            "No multiplexers found on {} (probed 0x{:02X}..=0x{:02X}).",
            config.bus.path, config.bus.scan_first, config.bus.scan_last
        );
        return Ok(());
    }

    println!(
        "Found {} multiplexer{} on {}:",
        devices.len(),
        if devices.len() == 1 { "" } else { "s" },
        config.bus.path
    );
    println!();

    for (i, addr) in devices.iter().enumerate() {
        println!("  [{i}] 0x{addr:02X}");
    }

    if devices.len() != expected {
        println!();
        println!("Warning: the matrix is configured for {expected}, scanning will fail.");
    }

    Ok(())
}
