//! Unified error type for the keymux-lib crate.
//!
//! [`KeymuxError`] wraps module-specific errors (`ScanError`, `BusError`) and
//! configuration problems. `From` impls allow `?` to propagate across module
//! boundaries.

use std::fmt;

use crate::bus::BusError;
use crate::scanner::ScanError;

/// Unified error type for keymux-lib operations.
#[derive(Debug)]
pub enum KeymuxError {
    /// Scanner error (topology mismatch, out-of-range selection, bus failure mid-scan).
    Scan(ScanError),
    /// Bus error outside a scanner (status reads, bus discovery).
    Bus(BusError),
    /// Standard I/O error (config file read/write).
    Io(std::io::Error),
    /// Configuration validation or lookup error.
    Config(String),
}

impl fmt::Display for KeymuxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeymuxError::Scan(e) => write!(f, "{e}"),
            KeymuxError::Bus(e) => write!(f, "{e}"),
            KeymuxError::Io(e) => write!(f, "I/O error: {e}"),
            KeymuxError::Config(e) => write!(f, "Config error: {e}"),
        }
    }
}

impl std::error::Error for KeymuxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KeymuxError::Scan(e) => Some(e),
            KeymuxError::Bus(e) => Some(e),
            KeymuxError::Io(e) => Some(e),
            KeymuxError::Config(_) => None,
        }
    }
}

impl From<ScanError> for KeymuxError {
    fn from(e: ScanError) -> Self {
        KeymuxError::Scan(e)
    }
}

impl From<BusError> for KeymuxError {
    fn from(e: BusError) -> Self {
        KeymuxError::Bus(e)
    }
}

impl From<std::io::Error> for KeymuxError {
    fn from(e: std::io::Error) -> Self {
        KeymuxError::Io(e)
    }
}

/// Crate-level Result alias using [`KeymuxError`].
pub type Result<T> = std::result::Result<T, KeymuxError>;
