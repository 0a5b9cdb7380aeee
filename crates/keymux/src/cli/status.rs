//! `status` subcommand: poll the status-byte key controllers once.

use super::{Config, ControllerEventJson, Result, format_addresses, print_json};

pub(super) fn cmd_status(config: &Config, json: bool) -> Result<()> {
    super::require_valid(config)?;
    let controllers = config.status_controllers();
    if controllers.count() == 0 {
        return Err(keymux_lib::KeymuxError::Config(
            "no status controllers configured ([controllers] addresses)".into(),
        ));
    }

    let mut bus = super::bus::open_bus(&config.bus)?;
    let events = controllers.poll(&mut bus)?;

    if json {
        let rows: Vec<ControllerEventJson> = events
            .into_iter()
            .filter_map(|(controller, event)| {
                let address = controllers.address(controller)?;
                Some(ControllerEventJson {
                    controller,
                    address,
                    event,
                })
            })
            .collect();
        return print_json(&rows);
    }

    if events.is_empty() {
        println!(
            "No pending events ({}).",
            format_addresses(&config.controllers.addresses)
        );
        return Ok(());
    }

    for (controller, event) in &events {
        let address = controllers.address(*controller).unwrap_or_default();
        println!(
            "  [{controller}] 0x{address:02X}  {}",
            super::decode::describe(event)
        );
    }
    Ok(())
}
