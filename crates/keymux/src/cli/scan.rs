//! `scan` and `group` subcommands: read keys through the multiplexers.

use std::sync::atomic::Ordering;
use std::time::Duration;

use super::{
    Config, GroupKeyJson, GroupOutput, KeyPosition, RUNNING, Result, SweepJson, print_json,
};

fn print_readings(config: &Config, readings: &[u32]) {
    let width = usize::from(config.matrix.bit_resolution).div_ceil(4);
    for (index, value) in readings.iter().enumerate() {
        let pos = config
            .matrix
            .position_of(index)
            .unwrap_or(KeyPosition::ORIGIN);
        println!("  {index:>4}  {:<12}  0x{value:0width$X}", pos.to_string());
    }
}

/// Indices whose reading differs between two sweeps.
fn changed(previous: &[u32], current: &[u32]) -> Vec<usize> {
    previous
        .iter()
        .zip(current)
        .enumerate()
        .filter(|(_, (a, b))| a != b)
        .map(|(i, _)| i)
        .collect()
}

pub(super) fn cmd_scan(config: &Config, json: bool, watch: bool, interval_ms: u64) -> Result<()> {
    let mut scanner = super::bus::open_scanner(config)?;

    if !watch {
        let readings = scanner.read_all()?;
        if json {
            return print_json(&SweepJson {
                sweep: 0,
                readings,
            });
        }
        print_readings(config, &readings);
        return Ok(());
    }

    // Watch mode: one sweep per interval until Ctrl+C.
    let interval = Duration::from_millis(interval_ms);
    let mut previous: Option<Vec<u32>> = None;
    let mut sweep: u64 = 0;
    while RUNNING.load(Ordering::SeqCst) {
        let readings = scanner.read_all()?;
        if json {
            // One compact object per line so the stream can be piped.
            let line = serde_json::to_string(&SweepJson {
                sweep,
                readings: readings.clone(),
            })
            .map_err(std::io::Error::from)?;
            println!("{line}");
        } else {
            match &previous {
                None => print_readings(config, &readings),
                Some(prev) => {
                    for index in changed(prev, &readings) {
                        let pos = config
                            .matrix
                            .position_of(index)
                            .unwrap_or(KeyPosition::ORIGIN);
                        println!(
                            "[{sweep}] key {index} {pos}: {} -> {}",
                            prev[index], readings[index]
                        );
                    }
                }
            }
        }
        previous = Some(readings);
        sweep += 1;
        std::thread::sleep(interval);
    }

    log::debug!("watch stopped after {sweep} sweep(s)");
    Ok(())
}

pub(super) fn cmd_group(config: &Config, name: &str, json: bool) -> Result<()> {
    let positions = config.group_positions(name)?;
    let indices = &config.groups[name];
    let mut scanner = super::bus::open_scanner(config)?;
    let values = scanner.read_group(&positions)?;

    if json {
        let keys = indices
            .iter()
            .zip(positions)
            .zip(values)
            .map(|((&index, position), value)| GroupKeyJson {
                index,
                position,
                value,
            })
            .collect();
        return print_json(&GroupOutput {
            group: name.to_string(),
            keys,
        });
    }

    println!("Group \"{name}\" ({} keys):", positions.len());
    for ((index, pos), value) in indices.iter().zip(&positions).zip(&values) {
        println!("  {index:>4}  {:<12}  {value}", pos.to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changed_reports_differing_indices() {
        assert_eq!(changed(&[1, 2, 3, 4], &[1, 5, 3, 0]), vec![1, 3]);
        assert!(changed(&[7, 7], &[7, 7]).is_empty());
    }
}
