//! Opening the hardware bus and the scanner on top of it.

use keymux_lib::bus::{BusError, KeyBus};
use keymux_lib::config::BusSettings;

use super::{AddressedScanner, Config, Result, require_valid};

/// Open the configured I2C character device.
#[cfg(target_os = "linux")]
pub(super) fn open_bus(settings: &BusSettings) -> Result<Box<dyn KeyBus>> {
    use keymux_lib::hal::HalBus;
    use linux_embedded_hal::I2cdev;

    let i2c = I2cdev::new(&settings.path)
        .map_err(|e| BusError::Open(format!("{}: {e}", settings.path)))?;
    log::debug!("opened {}", settings.path);
    Ok(Box::new(
        HalBus::new(i2c).with_scan_range(settings.scan_range()),
    ))
}

#[cfg(not(target_os = "linux"))]
pub(super) fn open_bus(settings: &BusSettings) -> Result<Box<dyn KeyBus>> {
    Err(BusError::Open(format!("{}: no I2C backend on this platform", settings.path)).into())
}

/// Validate the config, open the bus and discover the multiplexers.
pub(super) fn open_scanner(config: &Config) -> Result<AddressedScanner<Box<dyn KeyBus>>> {
    require_valid(config)?;
    let bus = open_bus(&config.bus)?;
    let scanner = AddressedScanner::new(config.matrix.clone(), bus)?
        .with_out_of_range(config.out_of_range);
    log::info!(
        "scanner ready: {} multiplexer(s), {} keys",
        scanner.devices().len(),
        scanner.topology().total_keys
    );
    Ok(scanner)
}
