//! [`KeyBus`] over any embedded-hal 0.2 blocking I2C peripheral.

use std::fmt::Debug;
use std::ops::RangeInclusive;

use embedded_hal::blocking::i2c::{Read, Write};

use crate::bus::{BusError, KeyBus, Result};

/// Default probe range for `scan`: the TCA9548-family multiplexer addresses.
pub const DEFAULT_SCAN_RANGE: RangeInclusive<u8> = 0x70..=0x77;

/// Adapter from an embedded-hal I2C peripheral to [`KeyBus`].
///
/// `scan` probes every address in the configured range with a one-byte read
/// and reports those that acknowledge, in ascending order. Keep the range
/// tight around the multiplexers: a key or controller that answers inside it
/// is counted as a device.
pub struct HalBus<I2C> {
    i2c: I2C,
    scan_range: RangeInclusive<u8>,
}

impl<I2C, E> HalBus<I2C>
where
    I2C: Read<Error = E> + Write<Error = E>,
    E: Debug,
{
    pub fn new(i2c: I2C) -> Self {
        Self {
            i2c,
            scan_range: DEFAULT_SCAN_RANGE,
        }
    }

    /// Restrict `scan` to the given inclusive address range.
    pub fn with_scan_range(mut self, range: RangeInclusive<u8>) -> Self {
        self.scan_range = range;
        self
    }

    pub fn scan_range(&self) -> &RangeInclusive<u8> {
        &self.scan_range
    }

    /// Release the underlying peripheral.
    pub fn into_inner(self) -> I2C {
        self.i2c
    }
}

/// Assemble a big-endian reading and keep its low `bits` bits.
fn assemble(bytes: &[u8], bits: u8) -> u32 {
    let raw = bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32);
    if bits >= 32 {
        raw
    } else {
        raw & ((1u32 << bits) - 1)
    }
}

impl<I2C, E> KeyBus for HalBus<I2C>
where
    I2C: Read<Error = E> + Write<Error = E>,
    E: Debug,
{
    fn scan(&mut self) -> Result<Vec<u8>> {
        let mut found = Vec::new();
        let mut probe = [0u8; 1];
        for address in self.scan_range.clone() {
            if self.i2c.read(address, &mut probe).is_ok() {
                found.push(address);
            }
        }
        log::debug!("bus scan found {} device(s): {found:02X?}", found.len());
        Ok(found)
    }

    fn write_to(&mut self, address: u8, data: &[u8]) -> Result<()> {
        self.i2c
            .write(address, data)
            .map_err(|e| BusError::Transport(format!("i2c write 0x{address:02X}: {e:?}")))
    }

    fn read_from(&mut self, address: u8, bits: u8) -> Result<u32> {
        let len = (bits.clamp(1, 32) as usize).div_ceil(8);
        let mut buf = [0u8; 4];
        self.i2c
            .read(address, &mut buf[..len])
            .map_err(|e| BusError::Transport(format!("i2c read 0x{address:02X}: {e:?}")))?;
        Ok(assemble(&buf[..len], bits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Minimal in-memory I2C peripheral: registered addresses answer reads
    /// with their stored bytes; anything else NACKs.
    #[derive(Default)]
    struct FakeI2c {
        present: HashMap<u8, Vec<u8>>,
        written: Vec<(u8, Vec<u8>)>,
    }

    impl Read for FakeI2c {
        type Error = &'static str;

        fn read(&mut self, address: u8, buffer: &mut [u8]) -> std::result::Result<(), Self::Error> {
            let data = self.present.get(&address).ok_or("nack")?;
            for (dst, src) in buffer.iter_mut().zip(data.iter().chain(std::iter::repeat(&0))) {
                *dst = *src;
            }
            Ok(())
        }
    }

    impl Write for FakeI2c {
        type Error = &'static str;

        fn write(&mut self, address: u8, bytes: &[u8]) -> std::result::Result<(), Self::Error> {
            if !self.present.contains_key(&address) {
                return Err("nack");
            }
            self.written.push((address, bytes.to_vec()));
            Ok(())
        }
    }

    impl FakeI2c {
        fn with(mut self, address: u8, data: &[u8]) -> Self {
            self.present.insert(address, data.to_vec());
            self
        }
    }

    #[test]
    fn scan_reports_acknowledging_addresses_in_range() {
        let mut bus = HalBus::new(
            FakeI2c::default()
                .with(0x71, &[0])
                .with(0x70, &[0])
                .with(0x30, &[0]),
        );
        assert_eq!(bus.scan().unwrap(), vec![0x70, 0x71]);
    }

    #[test]
    fn custom_scan_range() {
        let mut bus = HalBus::new(FakeI2c::default().with(0x71, &[0]).with(0x30, &[0]))
            .with_scan_range(0x20..=0x3F);
        assert_eq!(bus.scan().unwrap(), vec![0x30]);
        assert_eq!(bus.scan_range(), &(0x20..=0x3F));
    }

    #[test]
    fn read_assembles_big_endian_and_masks() {
        let mut bus = HalBus::new(FakeI2c::default().with(0x30, &[0xFA, 0xBC]));
        assert_eq!(bus.read_from(0x30, 12).unwrap(), 0x0ABC);
        assert_eq!(bus.read_from(0x30, 16).unwrap(), 0xFABC);
        assert_eq!(bus.read_from(0x30, 8).unwrap(), 0xFA);
    }

    #[test]
    fn read_full_width() {
        let mut bus = HalBus::new(FakeI2c::default().with(0x30, &[0xDE, 0xAD, 0xBE, 0xEF]));
        assert_eq!(bus.read_from(0x30, 32).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn errors_map_to_transport() {
        let mut bus = HalBus::new(FakeI2c::default());
        let err = bus.read_from(0x30, 8).unwrap_err();
        assert!(matches!(err, BusError::Transport(ref s) if s.contains("0x30")));
        assert!(bus.write_to(0x70, &[1]).is_err());
    }

    #[test]
    fn write_passes_bytes_through() {
        let mut bus = HalBus::new(FakeI2c::default().with(0x70, &[0]));
        bus.write_to(0x70, &[0x04]).unwrap();
        assert_eq!(bus.into_inner().written, vec![(0x70, vec![0x04])]);
    }

    #[test]
    fn assemble_masks_low_bits() {
        assert_eq!(assemble(&[0xFF], 1), 1);
        assert_eq!(assemble(&[0x12, 0x34, 0x56], 24), 0x12_3456);
    }
}
