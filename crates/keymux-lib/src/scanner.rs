//! Addressed scanner: lazy multiplexer selection and key sweeps.
//!
//! The scanner remembers which multiplexer and channel are currently routed
//! and only writes a channel-select byte when the next key lives on a
//! different device or channel. Within one channel, moving between keys costs
//! no bus writes at all: the key is chosen purely by which sub-address the
//! next read goes to.
//!
//! ## Caller obligation
//!
//! The selection state mirrors the multiplexers' routing only as long as the
//! scanner is the sole writer on the bus. Anything else that re-routes a
//! multiplexer (another process, a second handle to the same adapter) makes
//! the cached state stale, and subsequent write elision will read the wrong
//! key. Call [`AddressedScanner::disable_all`] to resynchronise.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bus::{BusError, KeyBus};
use crate::topology::{KeyPosition, NO_CHANNEL, Topology};

// ── Error type ──

/// Scanner errors.
#[derive(Debug)]
pub enum ScanError {
    /// The bus scan found a different number of multiplexers than configured.
    TopologyMismatch { expected: usize, found: usize },
    /// The topology failed validation.
    InvalidTopology(String),
    /// A position outside the matrix was requested under [`OutOfRangePolicy::Reject`].
    OutOfRange(KeyPosition),
    /// A read or write was attempted before any key was selected.
    NotSelected,
    /// The transport failed; the bus error is carried unchanged.
    Bus(BusError),
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::TopologyMismatch { expected, found } => write!(
                f,
                "Topology mismatch: expected {expected} multiplexer{}, found {found}",
                if *expected == 1 { "" } else { "s" }
            ),
            ScanError::InvalidTopology(e) => write!(f, "Invalid topology: {e}"),
            ScanError::OutOfRange(pos) => write!(f, "Key position {pos} is out of range"),
            ScanError::NotSelected => write!(f, "No key selected"),
            ScanError::Bus(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScanError::Bus(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BusError> for ScanError {
    fn from(e: BusError) -> Self {
        ScanError::Bus(e)
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;

// ── Policy ──

/// What [`AddressedScanner::select`] does with a position outside the matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutOfRangePolicy {
    /// Do nothing and keep the current selection.
    #[default]
    Ignore,
    /// Fail with [`ScanError::OutOfRange`], keeping the current selection.
    Reject,
}

impl fmt::Display for OutOfRangePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutOfRangePolicy::Ignore => write!(f, "ignore"),
            OutOfRangePolicy::Reject => write!(f, "reject"),
        }
    }
}

// ── Scanner ──

/// Scanner over a bus of channel multiplexers.
///
/// Device indices follow the order in which the bus scan reported the
/// multiplexers at construction.
pub struct AddressedScanner<B: KeyBus> {
    topology: Topology,
    bus: B,
    /// Multiplexer bus addresses, indexed by device.
    devices: Vec<u8>,
    /// Currently routed position; `None` while every multiplexer is disabled.
    selected: Option<KeyPosition>,
    policy: OutOfRangePolicy,
}

impl<B: KeyBus> AddressedScanner<B> {
    /// Discover the multiplexers and disable all of them.
    ///
    /// Fails with [`ScanError::InvalidTopology`] before touching the bus, or
    /// with [`ScanError::TopologyMismatch`] right after the scan if the
    /// discovered device count differs from `topology.device_count`.
    pub fn new(topology: Topology, mut bus: B) -> Result<Self> {
        if let Err(errors) = topology.validate() {
            let msg: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            return Err(ScanError::InvalidTopology(msg.join("; ")));
        }

        let devices = bus.scan()?;
        if devices.len() != topology.device_count {
            return Err(ScanError::TopologyMismatch {
                expected: topology.device_count,
                found: devices.len(),
            });
        }
        log::debug!("multiplexers: {devices:02X?}");

        let mut scanner = AddressedScanner {
            topology,
            bus,
            devices,
            selected: None,
            policy: OutOfRangePolicy::default(),
        };
        scanner.disable_all()?;
        Ok(scanner)
    }

    /// Set how out-of-range positions are handled.
    pub fn with_out_of_range(mut self, policy: OutOfRangePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn out_of_range_policy(&self) -> OutOfRangePolicy {
        self.policy
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Discovered multiplexer addresses, indexed by device.
    pub fn devices(&self) -> &[u8] {
        &self.devices
    }

    /// The currently routed position, or `None` if everything is disabled.
    pub fn selection(&self) -> Option<KeyPosition> {
        self.selected
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Direct bus access. Re-routing a multiplexer through this handle makes
    /// the selection stale; call [`disable_all`](Self::disable_all) afterwards.
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn into_bus(self) -> B {
        self.bus
    }

    /// Deselect every channel on every multiplexer.
    ///
    /// If a write fails, the selection is kept unless the selected device was
    /// already disabled, so a later device switch still disables it.
    pub fn disable_all(&mut self) -> Result<()> {
        for (device, &address) in self.devices.iter().enumerate() {
            self.bus.write_to(address, &[NO_CHANNEL])?;
            if self.selected.is_some_and(|s| s.device == device) {
                self.selected = None;
            }
        }
        self.selected = None;
        log::debug!("disabled {} multiplexer(s)", self.devices.len());
        Ok(())
    }

    /// Deselect every channel on a single multiplexer.
    pub fn disable_device(&mut self, device: usize) -> Result<()> {
        let Some(&address) = self.devices.get(device) else {
            return self.out_of_range(KeyPosition::new(device, 0, 0));
        };
        self.bus.write_to(address, &[NO_CHANNEL])?;
        if self.selected.is_some_and(|s| s.device == device) {
            self.selected = None;
        }
        Ok(())
    }

    /// Route the bus to `(device, channel, key)`, writing only what changed.
    ///
    /// - different device (or nothing selected): disable the previous
    ///   device, then write the channel-select byte to the new one;
    /// - same device, different channel: write the channel-select byte;
    /// - same device and channel: no bus traffic.
    pub fn select(&mut self, device: usize, channel: usize, key: usize) -> Result<()> {
        self.select_position(KeyPosition::new(device, channel, key))
    }

    /// [`select`](Self::select) taking a [`KeyPosition`].
    pub fn select_position(&mut self, pos: KeyPosition) -> Result<()> {
        if !self.topology.contains(pos) {
            return self.out_of_range(pos);
        }

        let code = self.topology.channel_select[pos.channel];
        let current = self.selected;
        match current {
            Some(cur) if cur.device == pos.device => {
                if cur.channel != pos.channel {
                    log::debug!(
                        "channel {} -> {} on mux 0x{:02X}",
                        cur.channel,
                        pos.channel,
                        self.devices[pos.device]
                    );
                    self.bus.write_to(self.devices[pos.device], &[code])?;
                }
            }
            prev => {
                // The old device stays selected until its disable lands.
                if let Some(cur) = prev {
                    self.bus.write_to(self.devices[cur.device], &[NO_CHANNEL])?;
                    self.selected = None;
                }
                log::debug!(
                    "mux 0x{:02X} channel {}",
                    self.devices[pos.device],
                    pos.channel
                );
                self.bus.write_to(self.devices[pos.device], &[code])?;
            }
        }

        self.selected = Some(pos);
        Ok(())
    }

    /// Advance to the next position (key, then channel, then device), wrapping
    /// after the last device. Selects the first key if nothing is selected.
    pub fn select_next(&mut self) -> Result<()> {
        let next = match self.selected {
            Some(cur) => self.topology.next(cur),
            None => KeyPosition::ORIGIN,
        };
        self.select_position(next)
    }

    /// Read the currently selected key at the configured bit resolution.
    pub fn read(&mut self) -> Result<u32> {
        let address = self.selected_key_address()?;
        let value = self.bus.read_from(address, self.topology.bit_resolution)?;
        log::trace!("read 0x{address:02X} = {value}");
        Ok(value)
    }

    /// Write raw bytes to the currently selected key (e.g. sensor settings).
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let address = self.selected_key_address()?;
        self.bus.write_to(address, data).map_err(ScanError::from)
    }

    /// Read every populated key in logical order.
    ///
    /// Element `i` of the result is logical key `i`. The sweep starts from a
    /// full disable, runs exactly `total_keys` steps, and leaves the first key
    /// selected.
    pub fn read_all(&mut self) -> Result<Vec<u32>> {
        let mut readings = Vec::with_capacity(self.topology.total_keys);

        self.disable_all()?;
        self.select_position(KeyPosition::ORIGIN)?;
        for _ in 0..self.topology.total_keys {
            readings.push(self.read()?);
            self.select_next()?;
        }
        self.select_position(KeyPosition::ORIGIN)?;

        Ok(readings)
    }

    /// Read the given positions in order, then return to the first key.
    ///
    /// Repeated positions are read again. Under [`OutOfRangePolicy::Ignore`],
    /// an out-of-range position reads whichever key is still selected; if
    /// nothing is selected yet, the call fails with [`ScanError::NotSelected`].
    pub fn read_group(&mut self, positions: &[KeyPosition]) -> Result<Vec<u32>> {
        let mut readings = Vec::with_capacity(positions.len());
        for &pos in positions {
            self.select_position(pos)?;
            readings.push(self.read()?);
        }
        self.select_position(KeyPosition::ORIGIN)?;
        Ok(readings)
    }

    /// [`read_group`](Self::read_group) by logical key index.
    ///
    /// Indices at or past `total_keys` follow the out-of-range policy: skipped
    /// under `Ignore`, rejected under `Reject`.
    pub fn read_indices(&mut self, indices: &[usize]) -> Result<Vec<u32>> {
        let mut positions = Vec::with_capacity(indices.len());
        for &i in indices {
            match self.topology.position_of(i) {
                Some(pos) => positions.push(pos),
                None if self.policy == OutOfRangePolicy::Reject => {
                    return Err(ScanError::OutOfRange(self.unpopulated_position(i)));
                }
                None => log::trace!(
                    "skipping key index {i} (total {})",
                    self.topology.total_keys
                ),
            }
        }
        self.read_group(&positions)
    }

    fn selected_key_address(&self) -> Result<u8> {
        let pos = self.selected.ok_or(ScanError::NotSelected)?;
        Ok(self.topology.key_addresses[pos.key])
    }

    fn out_of_range(&self, pos: KeyPosition) -> Result<()> {
        match self.policy {
            OutOfRangePolicy::Ignore => {
                log::trace!("ignoring out-of-range position {pos}");
                Ok(())
            }
            OutOfRangePolicy::Reject => Err(ScanError::OutOfRange(pos)),
        }
    }

    /// Position an invalid index would map to if the matrix were unbounded.
    fn unpopulated_position(&self, index: usize) -> KeyPosition {
        let t = &self.topology;
        let per_device = t.channel_count * t.keys_per_channel;
        KeyPosition {
            device: index / per_device,
            channel: (index % per_device) / t.keys_per_channel,
            key: index % t.keys_per_channel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::{BusOp, MockBus};

    const MUXES: [u8; 2] = [0x70, 0x71];

    /// 2 devices × 3 channels × 2 keys, 9 of 12 positions populated.
    fn topology() -> Topology {
        Topology {
            device_count: 2,
            channel_count: 3,
            keys_per_channel: 2,
            total_keys: 9,
            channel_select: vec![0x01, 0x02, 0x04],
            key_addresses: vec![0x40, 0x41],
            bit_resolution: 10,
        }
    }

    fn scanner() -> AddressedScanner<MockBus> {
        let t = topology();
        let bus = MockBus::for_topology(&t, MUXES.to_vec());
        let mut s = AddressedScanner::new(t, bus).unwrap();
        s.bus_mut().clear_ops();
        s
    }

    fn reading(device: usize, channel: usize, key: usize) -> u32 {
        MockBus::reading_for(KeyPosition::new(device, channel, key))
    }

    // ── Construction ──

    #[test]
    fn new_disables_every_device_and_starts_unselected() {
        let t = topology();
        let bus = MockBus::for_topology(&t, MUXES.to_vec());
        let s = AddressedScanner::new(t, bus).unwrap();
        assert_eq!(s.devices(), &MUXES);
        assert_eq!(s.selection(), None);
        assert_eq!(s.bus().ops[0], BusOp::Scan);
        assert_eq!(s.bus().disable_writes(), vec![0x70, 0x71]);
        assert!(s.bus().channel_writes().is_empty());
    }

    #[test]
    fn new_keeps_discovered_order() {
        let t = topology();
        let bus = MockBus::for_topology(&t, vec![0x73, 0x70]);
        let mut s = AddressedScanner::new(t, bus).unwrap();
        s.select(0, 1, 0).unwrap();
        assert_eq!(s.bus().channel_writes(), vec![(0x73, 0x02)]);
    }

    #[test]
    fn new_with_wrong_device_count_fails_after_scan_only() {
        let t = topology();
        let mut bus = MockBus::for_topology(&t, vec![0x70, 0x71, 0x72]);
        let err = AddressedScanner::new(t, &mut bus).err().unwrap();
        assert!(matches!(
            err,
            ScanError::TopologyMismatch {
                expected: 2,
                found: 3
            }
        ));
        assert_eq!(bus.ops, vec![BusOp::Scan]);
    }

    #[test]
    fn new_with_invalid_topology_touches_nothing() {
        let mut t = topology();
        t.key_addresses.pop();
        let mut bus = MockBus::for_topology(&t, MUXES.to_vec());
        let err = AddressedScanner::new(t, &mut bus).err().unwrap();
        assert!(matches!(err, ScanError::InvalidTopology(ref s) if s.contains("key_addresses")));
        assert!(bus.ops.is_empty());
    }

    // ── select ──

    #[test]
    fn first_select_writes_channel_only() {
        let mut s = scanner();
        s.select(1, 2, 1).unwrap();
        assert_eq!(s.bus().writes(), vec![(0x71, vec![0x04])]);
        assert_eq!(s.selection(), Some(KeyPosition::new(1, 2, 1)));
    }

    #[test]
    fn repeated_select_issues_no_writes() {
        let mut s = scanner();
        s.select(0, 1, 0).unwrap();
        s.bus_mut().clear_ops();
        s.select(0, 1, 0).unwrap();
        assert!(s.bus().ops.is_empty());
    }

    #[test]
    fn key_change_on_same_channel_issues_no_writes() {
        let mut s = scanner();
        s.select(0, 1, 0).unwrap();
        s.bus_mut().clear_ops();
        s.select(0, 1, 1).unwrap();
        assert!(s.bus().ops.is_empty());
        assert_eq!(s.selection(), Some(KeyPosition::new(0, 1, 1)));
    }

    #[test]
    fn channel_change_writes_only_to_current_device() {
        let mut s = scanner();
        s.select(0, 0, 0).unwrap();
        s.bus_mut().clear_ops();
        s.select(0, 2, 1).unwrap();
        assert_eq!(s.bus().writes(), vec![(0x70, vec![0x04])]);
    }

    #[test]
    fn device_change_disables_previous_first() {
        let mut s = scanner();
        s.select(0, 2, 0).unwrap();
        s.bus_mut().clear_ops();
        s.select(1, 2, 0).unwrap();
        assert_eq!(
            s.bus().writes(),
            vec![(0x70, vec![0x00]), (0x71, vec![0x04])]
        );
        assert_eq!(s.bus().enabled_devices(), vec![0x71]);
    }

    #[test]
    fn out_of_range_select_is_ignored_by_default() {
        let mut s = scanner();
        s.select(0, 1, 1).unwrap();
        s.bus_mut().clear_ops();
        for (d, c, k) in [(2, 0, 0), (0, 3, 0), (0, 0, 2), (usize::MAX, 0, 0)] {
            s.select(d, c, k).unwrap();
        }
        assert!(s.bus().ops.is_empty());
        assert_eq!(s.selection(), Some(KeyPosition::new(0, 1, 1)));
    }

    #[test]
    fn out_of_range_select_rejected_under_reject_policy() {
        let mut s = scanner().with_out_of_range(OutOfRangePolicy::Reject);
        s.select(0, 1, 1).unwrap();
        let err = s.select(0, 3, 0).unwrap_err();
        assert!(matches!(err, ScanError::OutOfRange(p) if p == KeyPosition::new(0, 3, 0)));
        assert_eq!(s.selection(), Some(KeyPosition::new(0, 1, 1)));
    }

    #[test]
    fn select_unpopulated_tail_is_allowed() {
        let mut s = scanner();
        s.select(1, 2, 1).unwrap();
        assert_eq!(s.read().unwrap(), reading(1, 2, 1));
    }

    #[test]
    fn failed_device_switch_leaves_nothing_selected() {
        let mut s = scanner();
        s.select(0, 0, 0).unwrap();
        s.bus_mut().fail_writes_to = Some(0x71);
        let err = s.select(1, 0, 0).unwrap_err();
        assert!(matches!(err, ScanError::Bus(BusError::Transport(_))));
        assert_eq!(s.selection(), None);

        // Recovery re-routes from scratch.
        s.bus_mut().fail_writes_to = None;
        s.select(0, 0, 0).unwrap();
        assert_eq!(s.read().unwrap(), reading(0, 0, 0));
    }

    #[test]
    fn failed_disable_keeps_old_device_selected() {
        let mut s = scanner();
        s.select(0, 0, 0).unwrap();
        s.bus_mut().fail_writes_to = Some(0x70);
        let err = s.select(1, 0, 0).unwrap_err();
        assert!(matches!(err, ScanError::Bus(BusError::Transport(_))));
        assert_eq!(s.selection(), Some(KeyPosition::new(0, 0, 0)));
        // Device 1 was never routed.
        assert_eq!(s.bus().enabled_devices(), vec![0x70]);

        // The retry disables device 0 before routing device 1.
        s.bus_mut().fail_writes_to = None;
        s.select(1, 0, 0).unwrap();
        assert_eq!(s.bus().enabled_devices(), vec![0x71]);
        assert_eq!(s.read().unwrap(), reading(1, 0, 0));
    }

    #[test]
    fn failed_disable_all_keeps_selection_until_its_device_is_off() {
        let mut s = scanner();
        s.select(1, 0, 0).unwrap();
        // 0x70 is written first and fails; device 1 is still routed.
        s.bus_mut().fail_writes_to = Some(0x70);
        assert!(s.disable_all().is_err());
        assert_eq!(s.selection(), Some(KeyPosition::new(1, 0, 0)));

        s.bus_mut().fail_writes_to = None;
        s.select(0, 0, 0).unwrap();
        assert_eq!(s.bus().enabled_devices(), vec![0x70]);
        assert_eq!(s.read().unwrap(), reading(0, 0, 0));
    }

    #[test]
    fn failed_disable_all_after_selected_device_is_off_clears_selection() {
        let mut s = scanner();
        s.select(0, 1, 0).unwrap();
        s.bus_mut().fail_writes_to = Some(0x71);
        assert!(s.disable_all().is_err());
        assert_eq!(s.selection(), None);
        assert!(s.bus().enabled_devices().is_empty());
    }

    #[test]
    fn failed_disable_device_keeps_selection() {
        let mut s = scanner();
        s.select(1, 0, 0).unwrap();
        s.bus_mut().fail_writes_to = Some(0x71);
        assert!(s.disable_device(1).is_err());
        assert_eq!(s.selection(), Some(KeyPosition::new(1, 0, 0)));
    }

    // ── read / write ──

    #[test]
    fn read_before_select_is_not_selected() {
        let mut s = scanner();
        assert!(matches!(s.read(), Err(ScanError::NotSelected)));
        assert!(matches!(s.write(&[1]), Err(ScanError::NotSelected)));
        assert!(s.bus().ops.is_empty());
    }

    #[test]
    fn read_uses_key_address_and_resolution() {
        let mut s = scanner();
        s.select(1, 0, 1).unwrap();
        s.bus_mut().clear_ops();
        assert_eq!(s.read().unwrap(), reading(1, 0, 1));
        assert_eq!(
            s.bus().ops,
            vec![BusOp::Read {
                address: 0x41,
                bits: 10
            }]
        );
    }

    #[test]
    fn write_goes_to_selected_key() {
        let mut s = scanner();
        s.select(0, 1, 0).unwrap();
        s.bus_mut().clear_ops();
        s.write(&[0x10, 0x20]).unwrap();
        assert_eq!(s.bus().writes(), vec![(0x40, vec![0x10, 0x20])]);
    }

    #[test]
    fn bus_error_propagates_unchanged() {
        let mut s = scanner();
        s.select(0, 0, 0).unwrap();
        s.bus_mut().fail_reads = true;
        match s.read() {
            Err(ScanError::Bus(e)) => {
                assert_eq!(e, BusError::Transport("mock: read failure injected".into()))
            }
            other => panic!("expected bus error, got {other:?}"),
        }
    }

    // ── select_next ──

    #[test]
    fn select_next_from_nothing_selects_origin() {
        let mut s = scanner();
        s.select_next().unwrap();
        assert_eq!(s.selection(), Some(KeyPosition::ORIGIN));
    }

    #[test]
    fn select_next_walks_logical_order() {
        let t = topology();
        let mut s = scanner();
        s.select(0, 0, 0).unwrap();
        for i in 0..t.total_keys {
            assert_eq!(s.selection(), t.position_of(i), "index {i}");
            s.select_next().unwrap();
        }
    }

    #[test]
    fn select_next_wraps_after_last_device() {
        let mut s = scanner();
        s.select(1, 2, 1).unwrap();
        s.select_next().unwrap();
        assert_eq!(s.selection(), Some(KeyPosition::ORIGIN));
        assert_eq!(s.bus().enabled_devices(), vec![0x70]);
    }

    // ── disable ──

    #[test]
    fn disable_all_is_idempotent_and_resets_selection() {
        let mut s = scanner();
        s.select(1, 1, 0).unwrap();
        s.disable_all().unwrap();
        s.disable_all().unwrap();
        assert_eq!(s.selection(), None);
        assert!(s.bus().enabled_devices().is_empty());
        assert_eq!(s.bus().disable_writes(), vec![0x70, 0x71, 0x70, 0x71]);
    }

    #[test]
    fn reselect_after_disable_all_rewrites_channel() {
        let mut s = scanner();
        s.select(0, 0, 0).unwrap();
        s.disable_all().unwrap();
        s.bus_mut().clear_ops();
        s.select(0, 0, 0).unwrap();
        assert_eq!(s.bus().channel_writes(), vec![(0x70, 0x01)]);
    }

    #[test]
    fn disable_device_clears_matching_selection() {
        let mut s = scanner();
        s.select(1, 0, 0).unwrap();
        s.disable_device(0).unwrap();
        assert_eq!(s.selection(), Some(KeyPosition::new(1, 0, 0)));
        s.disable_device(1).unwrap();
        assert_eq!(s.selection(), None);
        assert!(s.bus().enabled_devices().is_empty());
    }

    #[test]
    fn disable_device_out_of_range_follows_policy() {
        let mut s = scanner();
        s.disable_device(5).unwrap();
        assert!(s.bus().ops.is_empty());
        let mut s = s.with_out_of_range(OutOfRangePolicy::Reject);
        assert!(matches!(s.disable_device(5), Err(ScanError::OutOfRange(_))));
    }

    // ── read_all ──

    #[test]
    fn read_all_returns_keys_in_logical_order() {
        let t = topology();
        let mut s = scanner();
        let readings = s.read_all().unwrap();
        let expected: Vec<u32> = t.positions().map(MockBus::reading_for).collect();
        assert_eq!(readings, expected);
    }

    #[test]
    fn read_all_issues_exactly_total_keys_reads() {
        let mut s = scanner();
        s.read_all().unwrap();
        assert_eq!(s.bus().reads().len(), 9);
    }

    #[test]
    fn read_all_elides_redundant_channel_writes() {
        let mut s = scanner();
        s.read_all().unwrap();
        // Visited channels: d0c0 d0c1 d0c2 d1c0 d1c1, then the trailing
        // select_next lands on d1c1 again and the final reset routes d0c0.
        assert_eq!(
            s.bus().channel_writes(),
            vec![
                (0x70, 0x01),
                (0x70, 0x02),
                (0x70, 0x04),
                (0x71, 0x01),
                (0x71, 0x02),
                (0x70, 0x01),
            ]
        );
        assert!(s.bus().channel_writes().len() < 9);
    }

    #[test]
    fn read_all_leaves_origin_selected() {
        let mut s = scanner();
        s.read_all().unwrap();
        assert_eq!(s.selection(), Some(KeyPosition::ORIGIN));
        assert_eq!(s.bus().enabled_devices(), vec![0x70]);
    }

    #[test]
    fn read_all_starts_with_full_disable() {
        let mut s = scanner();
        s.select(1, 1, 0).unwrap();
        s.bus_mut().clear_ops();
        s.read_all().unwrap();
        let writes = s.bus().writes();
        assert_eq!(writes[0], (0x70, vec![0x00]));
        assert_eq!(writes[1], (0x71, vec![0x00]));
        assert_eq!(writes[2], (0x70, vec![0x01]));
    }

    #[test]
    fn read_all_is_repeatable() {
        let mut s = scanner();
        let first = s.read_all().unwrap();
        let second = s.read_all().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn read_all_stops_on_bus_error() {
        let mut s = scanner();
        s.bus_mut().fail_reads = true;
        assert!(matches!(s.read_all(), Err(ScanError::Bus(_))));
        assert_eq!(s.bus().reads().len(), 1);
    }

    // ── read_group ──

    #[test]
    fn read_group_preserves_order_and_duplicates() {
        let mut s = scanner();
        let group = [
            KeyPosition::new(1, 0, 1),
            KeyPosition::new(0, 2, 0),
            KeyPosition::new(1, 0, 1),
        ];
        let readings = s.read_group(&group).unwrap();
        assert_eq!(
            readings,
            vec![reading(1, 0, 1), reading(0, 2, 0), reading(1, 0, 1)]
        );
        assert_eq!(s.bus().reads().len(), 3);
        assert_eq!(s.selection(), Some(KeyPosition::ORIGIN));
    }

    #[test]
    fn read_group_empty_just_resets() {
        let mut s = scanner();
        assert!(s.read_group(&[]).unwrap().is_empty());
        assert_eq!(s.selection(), Some(KeyPosition::ORIGIN));
    }

    #[test]
    fn read_group_out_of_range_rereads_current_key_when_ignored() {
        let mut s = scanner();
        let group = [KeyPosition::new(0, 1, 1), KeyPosition::new(9, 9, 9)];
        let readings = s.read_group(&group).unwrap();
        assert_eq!(readings, vec![reading(0, 1, 1), reading(0, 1, 1)]);
    }

    #[test]
    fn read_group_leading_out_of_range_with_nothing_selected_fails() {
        let mut s = scanner();
        let group = [KeyPosition::new(9, 9, 9), KeyPosition::new(0, 1, 1)];
        assert!(matches!(s.read_group(&group), Err(ScanError::NotSelected)));
        assert!(s.bus().ops.is_empty());
        assert_eq!(s.selection(), None);
    }

    #[test]
    fn read_indices_maps_through_topology() {
        let mut s = scanner();
        let readings = s.read_indices(&[8, 0, 3]).unwrap();
        assert_eq!(
            readings,
            vec![reading(1, 1, 0), reading(0, 0, 0), reading(0, 1, 1)]
        );
    }

    #[test]
    fn read_indices_skips_or_rejects_unpopulated() {
        let mut s = scanner();
        assert_eq!(s.read_indices(&[9, 1]).unwrap(), vec![reading(0, 0, 1)]);

        let mut s = s.with_out_of_range(OutOfRangePolicy::Reject);
        let err = s.read_indices(&[1, 9]).unwrap_err();
        assert!(matches!(err, ScanError::OutOfRange(p) if p == KeyPosition::new(1, 1, 1)));
    }

    // ── Errors ──

    #[test]
    fn display_messages() {
        assert_eq!(
            ScanError::TopologyMismatch {
                expected: 4,
                found: 3
            }
            .to_string(),
            "Topology mismatch: expected 4 multiplexers, found 3"
        );
        assert_eq!(
            ScanError::OutOfRange(KeyPosition::new(0, 9, 1)).to_string(),
            "Key position (0, 9, 1) is out of range"
        );
        assert_eq!(
            ScanError::Bus(BusError::Nack(0x40)).to_string(),
            "No acknowledge from address 0x40"
        );
    }

    #[test]
    fn source_is_bus_error() {
        let e = ScanError::Bus(BusError::Nack(0x40));
        let source = std::error::Error::source(&e).unwrap();
        assert!(source.to_string().contains("0x40"));
        assert!(std::error::Error::source(&ScanError::NotSelected).is_none());
    }

    #[test]
    fn policy_serde_names() {
        #[derive(Deserialize)]
        struct Wrap {
            p: OutOfRangePolicy,
        }
        let w: Wrap = toml::from_str("p = \"reject\"").unwrap();
        assert_eq!(w.p, OutOfRangePolicy::Reject);
        assert_eq!(OutOfRangePolicy::Ignore.to_string(), "ignore");
    }
}
