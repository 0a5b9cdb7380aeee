//! keymux: multiplexed key-matrix scanning and key-controller status decoding.

pub mod bus;
pub mod config;
pub mod error;
pub mod hal;
pub mod scanner;
pub mod status;
pub mod topology;

pub use error::KeymuxError;
