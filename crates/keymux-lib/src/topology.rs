//! Matrix topology: physical layout of multiplexers, channels and keys.
//!
//! Logical key indices enumerate the physical space with the key (sub-address)
//! varying fastest, then the channel, then the device:
//!
//! ```text
//! index 0            → (0, 0, 0)
//! index 1            → (0, 0, 1)
//! index kpc          → (0, 1, 0)
//! index kpc * ch     → (1, 0, 0)
//! ```
//!
//! Only the first `total_keys` indices are valid; a partially populated last
//! device leaves the tail of the triple space unused.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Byte written to a multiplexer to deselect all of its channels.
pub const NO_CHANNEL: u8 = 0x00;

/// Physical address of one key: multiplexer device, channel on that device,
/// and key (sub-address) on that channel. All three are indices, not bus
/// addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct KeyPosition {
    pub device: usize,
    pub channel: usize,
    pub key: usize,
}

impl KeyPosition {
    /// The first key of the matrix.
    pub const ORIGIN: KeyPosition = KeyPosition {
        device: 0,
        channel: 0,
        key: 0,
    };

    pub const fn new(device: usize, channel: usize, key: usize) -> Self {
        KeyPosition {
            device,
            channel,
            key,
        }
    }
}

impl fmt::Display for KeyPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.device, self.channel, self.key)
    }
}

impl From<(usize, usize, usize)> for KeyPosition {
    fn from((device, channel, key): (usize, usize, usize)) -> Self {
        KeyPosition::new(device, channel, key)
    }
}

/// Immutable description of a multiplexed key matrix.
///
/// Device bus addresses are not part of the topology; they come from the bus
/// scan when a scanner is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    /// Number of multiplexers on the bus.
    #[serde(default = "default_device_count")]
    pub device_count: usize,

    /// Channels per multiplexer.
    #[serde(default = "default_channel_count")]
    pub channel_count: usize,

    /// Keys (sub-addresses) reachable on each channel.
    #[serde(default = "default_keys_per_channel")]
    pub keys_per_channel: usize,

    /// Number of populated keys. May be less than the full triple space.
    #[serde(default = "default_total_keys")]
    pub total_keys: usize,

    /// Byte written to a multiplexer to route it to channel `i`.
    #[serde(default = "default_channel_select")]
    pub channel_select: Vec<u8>,

    /// Bus address of key `i` on whichever channel is selected.
    /// Shared by every channel of every device.
    #[serde(default = "default_key_addresses")]
    pub key_addresses: Vec<u8>,

    /// Sensor reading width in bits.
    #[serde(default = "default_bit_resolution")]
    pub bit_resolution: u8,
}

fn default_device_count() -> usize {
    4
}
fn default_channel_count() -> usize {
    8
}
fn default_keys_per_channel() -> usize {
    4
}
fn default_total_keys() -> usize {
    104
}
fn default_channel_select() -> Vec<u8> {
    (0..8).map(|c| 1u8 << c).collect()
}
fn default_key_addresses() -> Vec<u8> {
    vec![0x30, 0x31, 0x32, 0x33]
}
fn default_bit_resolution() -> u8 {
    12
}

impl Default for Topology {
    /// Full-size 104-key board: four 8-channel multiplexers, four keys per channel.
    fn default() -> Self {
        Topology {
            device_count: default_device_count(),
            channel_count: default_channel_count(),
            keys_per_channel: default_keys_per_channel(),
            total_keys: default_total_keys(),
            channel_select: default_channel_select(),
            key_addresses: default_key_addresses(),
            bit_resolution: default_bit_resolution(),
        }
    }
}

/// A structural problem in a [`Topology`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// A count field is zero (`field` names it).
    ZeroCount(&'static str),
    /// A lookup table does not have one entry per channel / key.
    TableLength {
        table: &'static str,
        expected: usize,
        found: usize,
    },
    /// `total_keys` exceeds the physical triple space.
    TooManyKeys { total_keys: usize, capacity: usize },
    /// `device_count × channel_count × keys_per_channel` overflows `usize`.
    CapacityOverflow,
    /// `bit_resolution` outside 1..=32.
    BitResolution(u8),
    /// A channel-select byte equals [`NO_CHANNEL`] and would disable the device.
    NoChannelSelectCode { channel: usize },
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyError::ZeroCount(field) => write!(f, "{field} must be at least 1"),
            TopologyError::TableLength {
                table,
                expected,
                found,
            } => write!(f, "{table} has {found} entries, expected {expected}"),
            TopologyError::TooManyKeys {
                total_keys,
                capacity,
            } => write!(
                f,
                "total_keys {total_keys} exceeds matrix capacity of {capacity}"
            ),
            TopologyError::CapacityOverflow => write!(
                f,
                "device_count × channel_count × keys_per_channel is too large"
            ),
            TopologyError::BitResolution(bits) => {
                write!(f, "bit_resolution {bits} is outside 1..=32")
            }
            TopologyError::NoChannelSelectCode { channel } => write!(
                f,
                "channel_select[{channel}] is 0x00, which deselects every channel"
            ),
        }
    }
}

impl std::error::Error for TopologyError {}

impl Topology {
    /// Number of (device, channel, key) triples, populated or not.
    ///
    /// `None` if the product does not fit in a `usize`.
    pub fn capacity(&self) -> Option<usize> {
        self.device_count
            .checked_mul(self.channel_count)?
            .checked_mul(self.keys_per_channel)
    }

    /// Check table sizes and bounds, collecting every problem found.
    pub fn validate(&self) -> std::result::Result<(), Vec<TopologyError>> {
        let mut errors = Vec::new();

        for (field, value) in [
            ("device_count", self.device_count),
            ("channel_count", self.channel_count),
            ("keys_per_channel", self.keys_per_channel),
            ("total_keys", self.total_keys),
        ] {
            if value == 0 {
                errors.push(TopologyError::ZeroCount(field));
            }
        }

        if self.channel_select.len() != self.channel_count {
            errors.push(TopologyError::TableLength {
                table: "channel_select",
                expected: self.channel_count,
                found: self.channel_select.len(),
            });
        }
        if self.key_addresses.len() != self.keys_per_channel {
            errors.push(TopologyError::TableLength {
                table: "key_addresses",
                expected: self.keys_per_channel,
                found: self.key_addresses.len(),
            });
        }

        match self.capacity() {
            None => errors.push(TopologyError::CapacityOverflow),
            Some(capacity) if self.total_keys > capacity => {
                errors.push(TopologyError::TooManyKeys {
                    total_keys: self.total_keys,
                    capacity,
                });
            }
            Some(_) => {}
        }

        if !(1..=32).contains(&self.bit_resolution) {
            errors.push(TopologyError::BitResolution(self.bit_resolution));
        }

        for (channel, &code) in self.channel_select.iter().enumerate() {
            if code == NO_CHANNEL {
                errors.push(TopologyError::NoChannelSelectCode { channel });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Whether every coordinate of `pos` is inside the triple space.
    ///
    /// Positions past `total_keys` on a partially populated device still count
    /// as in range; they are addressable, just unpopulated.
    pub fn contains(&self, pos: KeyPosition) -> bool {
        pos.device < self.device_count
            && pos.channel < self.channel_count
            && pos.key < self.keys_per_channel
    }

    /// Convert a logical key index to its physical position.
    pub fn position_of(&self, index: usize) -> Option<KeyPosition> {
        if index >= self.total_keys {
            return None;
        }
        // Saturating: an index below usize::MAX then lands on device 0.
        let per_device = self.channel_count.saturating_mul(self.keys_per_channel);
        if per_device == 0 {
            return None;
        }
        Some(KeyPosition {
            device: index / per_device,
            channel: (index % per_device) / self.keys_per_channel,
            key: index % self.keys_per_channel,
        })
    }

    /// Convert a physical position back to its logical key index.
    ///
    /// Returns `None` for out-of-range positions and for unpopulated positions
    /// past `total_keys`.
    pub fn index_of(&self, pos: KeyPosition) -> Option<usize> {
        if !self.contains(pos) {
            return None;
        }
        let index = pos
            .device
            .checked_mul(self.channel_count)?
            .checked_add(pos.channel)?
            .checked_mul(self.keys_per_channel)?
            .checked_add(pos.key)?;
        (index < self.total_keys).then_some(index)
    }

    /// The position following `pos`, carrying key → channel → device and
    /// wrapping back to the origin after the last device.
    ///
    /// This walks the whole triple space and knows nothing about
    /// `total_keys`; sweeps bound themselves by iteration count.
    pub fn next(&self, pos: KeyPosition) -> KeyPosition {
        let KeyPosition {
            mut device,
            mut channel,
            mut key,
        } = pos;

        key += 1;
        if key >= self.keys_per_channel {
            key = 0;
            channel += 1;
        }
        if channel >= self.channel_count {
            channel = 0;
            device += 1;
        }
        if device >= self.device_count {
            device = 0;
        }

        KeyPosition {
            device,
            channel,
            key,
        }
    }

    /// Iterate over the positions of every populated key in logical order.
    pub fn positions(&self) -> impl Iterator<Item = KeyPosition> + '_ {
        (0..self.total_keys).filter_map(|i| self.position_of(i))
    }
}
