//! Transport errors

use thiserror::Error;

/// Errors that can occur while talking to the serial device
#[derive(Error, Debug)]
pub enum TransportError {
    /// The device node could not be opened
    #[error("Failed to open serial port {path}: {source}")]
    Open {
        /// Path of the device that failed to open
        path: String,
        /// Underlying OS error
        source: std::io::Error,
    },

    /// A termios call failed while capturing or applying settings
    #[error("Failed to configure serial port ({op}): {source}")]
    Configure {
        /// The termios operation that failed
        op: &'static str,
        /// Underlying OS error
        source: std::io::Error,
    },

    /// The requested baud rate has no termios speed constant
    #[error("Unsupported baud rate: {0}")]
    UnsupportedBaudRate(u32),

    /// The readiness wait expired before the descriptor became ready
    #[error("Timed out waiting for the device")]
    Timeout,

    /// A read returned end-of-file
    #[error("Serial device closed the connection")]
    Disconnected,

    /// A single-byte write wrote nothing
    #[error("Short write to serial device")]
    ShortWrite,

    /// Any other I/O failure on the descriptor
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
