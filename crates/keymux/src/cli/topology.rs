//! `topology` subcommand: logical index to physical position table.

use super::{Config, KeyRowJson, Result, TopologyOutput, kv, kv_width, print_json};

pub(super) fn cmd_topology(config: &Config, json: bool) -> Result<()> {
    super::require_valid(config)?;
    let matrix = &config.matrix;
    // Validated above, so the product fits.
    let capacity = matrix.capacity().unwrap_or(usize::MAX);

    let keys: Vec<KeyRowJson> = matrix
        .positions()
        .enumerate()
        .map(|(index, position)| KeyRowJson {
            index,
            position,
            channel_select: matrix.channel_select[position.channel],
            key_address: matrix.key_addresses[position.key],
        })
        .collect();

    if json {
        return print_json(&TopologyOutput {
            device_count: matrix.device_count,
            channel_count: matrix.channel_count,
            keys_per_channel: matrix.keys_per_channel,
            total_keys: matrix.total_keys,
            capacity,
            keys,
        });
    }

    let w = kv_width(&["Multiplexers:", "Channels:", "Keys/channel:", "Keys:"], &[]);
    kv("Multiplexers:", matrix.device_count, w);
    kv("Channels:", matrix.channel_count, w);
    kv("Keys/channel:", matrix.keys_per_channel, w);
    kv(
        "Keys:",
        format_args!("{} of {} positions", matrix.total_keys, capacity),
        w,
    );
    println!();

    println!(
        "  {:>5}  {:>6}  {:>7}  {:>3}  {:>6}  {:>7}",
        "Index", "Device", "Channel", "Key", "Select", "Address"
    );
    for row in &keys {
        println!(
            "  {:>5}  {:>6}  {:>7}  {:>3}    0x{:02X}     0x{:02X}",
            row.index,
            row.position.device,
            row.position.channel,
            row.position.key,
            row.channel_select,
            row.key_address
        );
    }

    Ok(())
}
