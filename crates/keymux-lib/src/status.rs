//! Key-controller status bytes: decoding and controller reads.
//!
//! The alternative key controller reports one event per 8-bit status read:
//!
//! ```text
//!   bit 7    bit 6      bits 5..0
//! [ empty ][ release ][   code   ]
//! ```
//!
//! Codes 62 and 63 are reserved. With the empty flag set they are ordinary
//! keys; with it clear, 63 signals overflow (release set) or no event
//! (release clear). The controller's register table says nothing about 62 with
//! the empty flag clear, so those bytes decode to [`KeyEvent::Ambiguous`].

use serde::Serialize;

use crate::bus::{KeyBus, Result};

const EMPTY_BIT: u8 = 0x80;
const RELEASE_BIT: u8 = 0x40;
const CODE_MASK: u8 = 0x3F;

/// Reserved code with no documented meaning when the empty flag is clear.
pub const CODE_UNDEFINED: u8 = 62;
/// Reserved code signalling overflow or "nothing pressed".
pub const CODE_SPECIAL: u8 = 63;

/// Bit width of a status read.
pub const STATUS_BITS: u8 = 8;

/// Result of decoding one status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KeyEvent {
    /// A key changed state.
    Normal { code: u8, pressed: bool },
    /// The controller's event buffer overflowed.
    Overflow,
    /// Nothing to report.
    NoEvent,
    /// A reserved bit pattern the register table leaves undefined.
    Ambiguous { raw: u8 },
}

/// Field view of a raw status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusByte(pub u8);

impl StatusByte {
    pub fn empty(self) -> bool {
        self.0 & EMPTY_BIT != 0
    }

    pub fn release(self) -> bool {
        self.0 & RELEASE_BIT != 0
    }

    pub fn code(self) -> u8 {
        self.0 & CODE_MASK
    }

    pub fn decode(self) -> KeyEvent {
        decode(self.0)
    }
}

/// Decode a raw status byte. Defined for every byte value.
pub fn decode(raw: u8) -> KeyEvent {
    let status = StatusByte(raw);
    let code = status.code();
    let pressed = !status.release();

    if !matches!(code, CODE_UNDEFINED | CODE_SPECIAL) || status.empty() {
        return KeyEvent::Normal { code, pressed };
    }

    match (code, status.release()) {
        (CODE_SPECIAL, true) => KeyEvent::Overflow,
        (CODE_SPECIAL, false) => KeyEvent::NoEvent,
        _ => KeyEvent::Ambiguous { raw },
    }
}

/// The set of status controllers on the bus and how to address them.
pub struct StatusControllers {
    count: usize,
    address_of: Box<dyn Fn(usize) -> u8>,
}

impl StatusControllers {
    /// Controllers at the listed addresses, indexed in list order.
    pub fn from_addresses(addresses: Vec<u8>) -> Self {
        let count = addresses.len();
        Self {
            count,
            address_of: Box::new(move |i| addresses[i]),
        }
    }

    /// `count` controllers addressed by `address_of(index)`.
    pub fn with_mapping(count: usize, address_of: impl Fn(usize) -> u8 + 'static) -> Self {
        Self {
            count,
            address_of: Box::new(address_of),
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Bus address of controller `index`, if it exists.
    pub fn address(&self, index: usize) -> Option<u8> {
        (index < self.count).then(|| (self.address_of)(index))
    }

    /// Read the raw status byte of controller `index`.
    ///
    /// Returns `Ok(None)` without touching the bus if `index` is out of range.
    pub fn read(&self, bus: &mut impl KeyBus, index: usize) -> Result<Option<u8>> {
        let Some(address) = self.address(index) else {
            log::trace!("status controller {index} out of range ({})", self.count);
            return Ok(None);
        };
        let raw = bus.read_from(address, STATUS_BITS)?;
        Ok(Some((raw & 0xFF) as u8))
    }

    /// Read and decode every controller in index order, dropping `NoEvent`.
    pub fn poll(&self, bus: &mut impl KeyBus) -> Result<Vec<(usize, KeyEvent)>> {
        let mut events = Vec::new();
        for index in 0..self.count {
            if let Some(raw) = self.read(bus, index)? {
                match decode(raw) {
                    KeyEvent::NoEvent => {}
                    KeyEvent::Ambiguous { raw } => {
                        log::debug!("controller {index}: undefined status byte 0x{raw:02X}");
                        events.push((index, KeyEvent::Ambiguous { raw }));
                    }
                    event => events.push((index, event)),
                }
            }
        }
        Ok(events)
    }
}
