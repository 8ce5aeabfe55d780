//! Error types for diskxfer-core.

use std::io;
use thiserror::Error;

/// Result type for diskxfer-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for diskxfer-core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Block-device read or reset failure, carrying the device's own
    /// status code and message (spec §6 device interface).
    #[error("device error (code 0x{code:02X}): {message}")]
    Device {
        /// Device-reported status code.
        code: u8,
        /// Device-reported status message.
        message: String,
    },

    /// Communication timeout.
    #[error("timeout: {0}")]
    Timeout(String),

    /// A decoded frame failed CRC validation.
    #[error("CRC mismatch")]
    Crc,

    /// A protocol invariant would be violated (would-skip, would-re-absorb).
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Configuration error (bad baud, start sector beyond disk, etc).
    #[error("configuration error: {0}")]
    Config(String),

    /// The transfer ended because the user requested an abort.
    #[error("transfer aborted by user")]
    Aborted,
}
