//! Bus transport: trait + in-memory multiplexer simulation.

use std::fmt;

// ── Error type ──

/// Bus transport errors.
///
/// String payloads follow the convention **"context: details"** where
/// *context* names the step that failed (e.g. `"i2c read"`, `"open"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Nothing acknowledged the given address.
    Nack(u8),
    /// The transport failed mid-transaction.
    Transport(String),
    /// The bus could not be opened.
    Open(String),
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::Nack(addr) => write!(f, "No acknowledge from address 0x{addr:02X}"),
            BusError::Transport(e) => write!(f, "Bus transaction failed: {e}"),
            BusError::Open(e) => write!(f, "Failed to open bus: {e}"),
        }
    }
}

impl std::error::Error for BusError {}

pub type Result<T> = std::result::Result<T, BusError>;

// ── Trait ──

/// A shared, addressed bus (I2C or similar).
///
/// Every call is a blocking round trip. Implementations report transport
/// failures as [`BusError`] and never retry on their own behalf.
pub trait KeyBus {
    /// Discover the addresses of devices present on the bus, in a stable order.
    fn scan(&mut self) -> Result<Vec<u8>>;

    /// Write raw bytes to the device at `address`.
    fn write_to(&mut self, address: u8, data: &[u8]) -> Result<()>;

    /// Read a `bits`-wide value from the device at `address`.
    fn read_from(&mut self, address: u8, bits: u8) -> Result<u32>;
}

impl<B: KeyBus + ?Sized> KeyBus for &mut B {
    fn scan(&mut self) -> Result<Vec<u8>> {
        (**self).scan()
    }

    fn write_to(&mut self, address: u8, data: &[u8]) -> Result<()> {
        (**self).write_to(address, data)
    }

    fn read_from(&mut self, address: u8, bits: u8) -> Result<u32> {
        (**self).read_from(address, bits)
    }
}

impl<B: KeyBus + ?Sized> KeyBus for Box<B> {
    fn scan(&mut self) -> Result<Vec<u8>> {
        (**self).scan()
    }

    fn write_to(&mut self, address: u8, data: &[u8]) -> Result<()> {
        (**self).write_to(address, data)
    }

    fn read_from(&mut self, address: u8, bits: u8) -> Result<u32> {
        (**self).read_from(address, bits)
    }
}

pub mod mock {
    use super::*;
    use std::collections::{HashMap, VecDeque};

    use crate::topology::{KeyPosition, NO_CHANNEL, Topology};

    /// One recorded bus transaction.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum BusOp {
        Scan,
        Write { address: u8, data: Vec<u8> },
        Read { address: u8, bits: u8 },
    }

    /// Simulated bus of channel multiplexers for tests.
    ///
    /// Writing a byte to a multiplexer address routes that multiplexer to the
    /// channel whose select code matches (or disconnects it on `0x00`). A read
    /// from a key address succeeds only when exactly one multiplexer is
    /// routed, and returns [`MockBus::reading_for`] of the key that answered,
    /// so tests can tell which physical key was read.
    ///
    /// Other addresses can be given queued register values with
    /// [`MockBus::push_value`] (e.g. status controllers).
    pub struct MockBus {
        /// Addresses returned by `scan`, in order.
        pub devices: Vec<u8>,
        /// Channel-select codes, indexed by channel.
        pub channel_select: Vec<u8>,
        /// Key addresses, indexed by key.
        pub key_addresses: Vec<u8>,
        /// Last control byte written to each multiplexer.
        pub routes: HashMap<u8, u8>,
        /// Every transaction, in issue order (failed ones included).
        pub ops: Vec<BusOp>,
        /// Queued read values for non-key addresses.
        pub values: HashMap<u8, VecDeque<u32>>,
        /// If set, writes to this address fail with a transport error.
        pub fail_writes_to: Option<u8>,
        /// If true, every read fails with a transport error.
        pub fail_reads: bool,
    }

    impl MockBus {
        /// A bus with the given multiplexers and no key tables.
        pub fn new(devices: Vec<u8>) -> Self {
            MockBus {
                devices,
                channel_select: Vec::new(),
                key_addresses: Vec::new(),
                routes: HashMap::new(),
                ops: Vec::new(),
                values: HashMap::new(),
                fail_writes_to: None,
                fail_reads: false,
            }
        }

        /// A bus populated with multiplexers at `devices`, wired per `topology`.
        pub fn for_topology(topology: &Topology, devices: Vec<u8>) -> Self {
            MockBus {
                channel_select: topology.channel_select.clone(),
                key_addresses: topology.key_addresses.clone(),
                ..MockBus::new(devices)
            }
        }

        /// Value a key read returns: device, channel and key packed into one word.
        pub fn reading_for(pos: KeyPosition) -> u32 {
            ((pos.device as u32) << 16) | ((pos.channel as u32) << 8) | pos.key as u32
        }

        /// Queue a value for the next read from `address`.
        pub fn push_value(&mut self, address: u8, value: u32) {
            self.values.entry(address).or_default().push_back(value);
        }

        /// All recorded writes as `(address, data)`.
        pub fn writes(&self) -> Vec<(u8, Vec<u8>)> {
            self.ops
                .iter()
                .filter_map(|op| match op {
                    BusOp::Write { address, data } => Some((*address, data.clone())),
                    _ => None,
                })
                .collect()
        }

        /// Addresses of all recorded reads.
        pub fn reads(&self) -> Vec<u8> {
            self.ops
                .iter()
                .filter_map(|op| match op {
                    BusOp::Read { address, .. } => Some(*address),
                    _ => None,
                })
                .collect()
        }

        /// Writes to multiplexer addresses that select a channel.
        pub fn channel_writes(&self) -> Vec<(u8, u8)> {
            self.mux_writes()
                .filter(|&(_, byte)| byte != NO_CHANNEL)
                .collect()
        }

        /// Writes to multiplexer addresses that deselect every channel.
        pub fn disable_writes(&self) -> Vec<u8> {
            self.mux_writes()
                .filter(|&(_, byte)| byte == NO_CHANNEL)
                .map(|(addr, _)| addr)
                .collect()
        }

        /// Multiplexers currently routed to a channel.
        pub fn enabled_devices(&self) -> Vec<u8> {
            self.devices
                .iter()
                .copied()
                .filter(|addr| self.routes.get(addr).is_some_and(|&b| b != NO_CHANNEL))
                .collect()
        }

        /// Forget recorded transactions (routing state is kept).
        pub fn clear_ops(&mut self) {
            self.ops.clear();
        }

        fn mux_writes(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
            self.ops.iter().filter_map(|op| match op {
                BusOp::Write { address, data }
                    if self.devices.contains(address) && !data.is_empty() =>
                {
                    Some((*address, data[0]))
                }
                _ => None,
            })
        }

        /// The key that answers at `address` given current routing.
        fn routed_key(&self, address: u8) -> Result<KeyPosition> {
            let key = self
                .key_addresses
                .iter()
                .position(|&a| a == address)
                .ok_or(BusError::Nack(address))?;
            let enabled = self.enabled_devices();
            let device_addr = match enabled.as_slice() {
                [] => return Err(BusError::Nack(address)),
                [one] => *one,
                _ => {
                    return Err(BusError::Transport(format!(
                        "mock: {} multiplexers enabled at once",
                        enabled.len()
                    )));
                }
            };
            let device = self
                .devices
                .iter()
                .position(|&a| a == device_addr)
                .ok_or(BusError::Nack(address))?;
            let code = self.routes[&device_addr];
            let channel = self
                .channel_select
                .iter()
                .position(|&c| c == code)
                .ok_or(BusError::Nack(address))?;
            Ok(KeyPosition {
                device,
                channel,
                key,
            })
        }
    }

    impl KeyBus for MockBus {
        fn scan(&mut self) -> Result<Vec<u8>> {
            self.ops.push(BusOp::Scan);
            Ok(self.devices.clone())
        }

        fn write_to(&mut self, address: u8, data: &[u8]) -> Result<()> {
            self.ops.push(BusOp::Write {
                address,
                data: data.to_vec(),
            });
            if self.fail_writes_to == Some(address) {
                return Err(BusError::Transport(
                    "mock: write failure injected".into(),
                ));
            }
            if self.devices.contains(&address) {
                let byte = data.first().copied().unwrap_or(NO_CHANNEL);
                self.routes.insert(address, byte);
                return Ok(());
            }
            self.routed_key(address).map(|_| ())
        }

        fn read_from(&mut self, address: u8, bits: u8) -> Result<u32> {
            self.ops.push(BusOp::Read { address, bits });
            if self.fail_reads {
                return Err(BusError::Transport("mock: read failure injected".into()));
            }
            if let Some(queue) = self.values.get_mut(&address) {
                return queue.pop_front().ok_or(BusError::Nack(address));
            }
            self.routed_key(address).map(Self::reading_for)
        }
    }
}
