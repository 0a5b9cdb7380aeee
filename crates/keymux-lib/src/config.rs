//! Application configuration: TOML-based, platform-aware paths.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::scanner::OutOfRangePolicy;
use crate::status::StatusControllers;
use crate::topology::{KeyPosition, Topology, TopologyError};

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str =
    "# keymux configuration: changes made outside keymux may be overwritten.\n\n";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// What to do with out-of-range key positions: "ignore" (default) or "reject".
    #[serde(default)]
    pub out_of_range: OutOfRangePolicy,

    /// Multiplexer / channel / key layout.
    #[serde(default)]
    pub matrix: Topology,

    /// I2C bus device and multiplexer probe range.
    #[serde(default)]
    pub bus: BusSettings,

    /// Status-byte key controllers.
    #[serde(default)]
    pub controllers: ControllerSettings,

    /// Named key groups: group name → logical key indices, read in order.
    /// Example in TOML: `[groups]` / `wasd = [25, 38, 39, 40]`
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<usize>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusSettings {
    /// I2C character device. Default: "/dev/i2c-1".
    #[serde(default = "default_bus_path")]
    pub path: String,

    /// First address probed when discovering multiplexers. Default: 0x70.
    #[serde(default = "default_scan_first")]
    pub scan_first: u8,

    /// Last address probed when discovering multiplexers. Default: 0x77.
    #[serde(default = "default_scan_last")]
    pub scan_last: u8,
}

fn default_bus_path() -> String {
    "/dev/i2c-1".into()
}
fn default_scan_first() -> u8 {
    0x70
}
fn default_scan_last() -> u8 {
    0x77
}

impl Default for BusSettings {
    fn default() -> Self {
        BusSettings {
            path: default_bus_path(),
            scan_first: default_scan_first(),
            scan_last: default_scan_last(),
        }
    }
}

impl BusSettings {
    pub fn scan_range(&self) -> RangeInclusive<u8> {
        self.scan_first..=self.scan_last
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSettings {
    /// Bus address of each controller, in controller-index order. Empty = none.
    #[serde(default)]
    pub addresses: Vec<u8>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            out_of_range: OutOfRangePolicy::default(),
            matrix: Topology::default(),
            bus: BusSettings::default(),
            controllers: ControllerSettings::default(),
            groups: BTreeMap::new(),
        }
    }
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The `[matrix]` table is inconsistent.
    Matrix(TopologyError),
    /// `scan_first` is greater than `scan_last`.
    EmptyScanRange { first: u8, last: u8 },
    /// The probe range cannot hold `device_count` multiplexers.
    ScanRangeTooSmall { size: usize, device_count: usize },
    /// A key address lies inside the probe range and would be counted as a multiplexer.
    KeyInScanRange(u8),
    /// A controller address collides with a key or multiplexer address.
    ControllerAddress { address: u8, reason: String },
    /// A group references a key index past `total_keys`.
    GroupIndex {
        group: String,
        index: usize,
        total_keys: usize,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Matrix(e) => write!(f, "Invalid matrix: {e}"),
            ValidationError::EmptyScanRange { first, last } => write!(
                f,
                "Invalid bus scan range: 0x{first:02X} is after 0x{last:02X}"
            ),
            ValidationError::ScanRangeTooSmall { size, device_count } => write!(
                f,
                "Bus scan range covers {size} address{} but {device_count} multiplexer{} are configured",
                if *size == 1 { "" } else { "es" },
                if *device_count == 1 { "" } else { "s" }
            ),
            ValidationError::KeyInScanRange(addr) => write!(
                f,
                "Key address 0x{addr:02X} is inside the multiplexer scan range"
            ),
            ValidationError::ControllerAddress { address, reason } => {
                write!(f, "Invalid controller address 0x{address:02X}: {reason}")
            }
            ValidationError::GroupIndex {
                group,
                index,
                total_keys,
            } => write!(
                f,
                "Group \"{group}\" references key {index} (matrix has {total_keys} keys)"
            ),
        }
    }
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("keymux"))
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Load config from disk, or return defaults if not found.
    pub fn load() -> Self {
        let (config, warnings) = Self::load_with_warnings();
        for w in &warnings {
            log::warn!("{w}");
        }
        config
    }

    /// Save config to an arbitrary path atomically (write to temp file, then rename).
    ///
    /// A header comment is prepended to warn that manual edits may be overwritten.
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        let contents = format!("{CONFIG_HEADER}{serialized}");
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &contents)?;
        match std::fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Rename can fail across filesystems; fall back to direct write + cleanup
                let result = std::fs::write(path, &contents);
                let _ = std::fs::remove_file(&tmp);
                result
            }
        }
    }

    /// Load config from an arbitrary path, returning the config and any parse warnings.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist.
    /// Returns `(defaults, [warning])` if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Load config from the default path, returning the config and any parse warnings.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    /// Validate the entire config, collecting all errors.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(matrix_errors) = self.matrix.validate() {
            errors.extend(matrix_errors.into_iter().map(ValidationError::Matrix));
        }

        // Bus probe range
        let range = self.bus.scan_range();
        if range.is_empty() {
            errors.push(ValidationError::EmptyScanRange {
                first: self.bus.scan_first,
                last: self.bus.scan_last,
            });
        } else {
            let size = range.clone().count();
            if size < self.matrix.device_count {
                errors.push(ValidationError::ScanRangeTooSmall {
                    size,
                    device_count: self.matrix.device_count,
                });
            }
        }
        for &addr in &self.matrix.key_addresses {
            if range.contains(&addr) {
                errors.push(ValidationError::KeyInScanRange(addr));
            }
        }

        // Controllers must not answer at a key or multiplexer address
        for &address in &self.controllers.addresses {
            if self.matrix.key_addresses.contains(&address) {
                errors.push(ValidationError::ControllerAddress {
                    address,
                    reason: "same as a key address".into(),
                });
            } else if range.contains(&address) {
                errors.push(ValidationError::ControllerAddress {
                    address,
                    reason: "inside the multiplexer scan range".into(),
                });
            }
        }

        for (group, indices) in &self.groups {
            for &index in indices {
                if index >= self.matrix.total_keys {
                    errors.push(ValidationError::GroupIndex {
                        group: group.clone(),
                        index,
                        total_keys: self.matrix.total_keys,
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Names of the configured key groups, sorted.
    pub fn group_names(&self) -> Vec<&str> {
        self.groups.keys().map(String::as_str).collect()
    }

    /// Resolve a named group to physical key positions, in configured order.
    pub fn group_positions(&self, name: &str) -> crate::error::Result<Vec<KeyPosition>> {
        let Some(indices) = self.groups.get(name) else {
            let available = match self.group_names().as_slice() {
                [] => "no groups configured".to_string(),
                names => format!("available: {}", names.join(", ")),
            };
            return Err(crate::KeymuxError::Config(format!(
                "unknown group \"{name}\" ({available})"
            )));
        };
        indices
            .iter()
            .map(|&i| {
                self.matrix.position_of(i).ok_or_else(|| {
                    crate::KeymuxError::Config(format!(
                        "group \"{name}\": key {i} is out of range (matrix has {} keys)",
                        self.matrix.total_keys
                    ))
                })
            })
            .collect()
    }

    /// The configured status controllers.
    pub fn status_controllers(&self) -> StatusControllers {
        StatusControllers::from_addresses(self.controllers.addresses.clone())
    }
}
