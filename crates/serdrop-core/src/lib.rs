//! # serdrop core library
//!
//! Serial transport and probe payloads for serdrop, a repro tool for byte
//! loss on USB-CDC debug monitors.

#![warn(missing_docs)]

//!
//! This library provides:
//! - A blocking-with-timeout serial session over a POSIX terminal device
//! - Serial port discovery for the CLI front end
//! - The fixed GDB-style probe packet and the device's count-report decoding
//!
//! ## Example
//!
//! ```rust,ignore
//! use serdrop_core::prelude::*;
//! use std::time::Duration;
//!
//! let mut session = SerialSession::open(
//!     "/dev/ttyACM0",
//!     DEFAULT_BAUD_RATE,
//!     Duration::from_millis(DEFAULT_TIMEOUT_MS),
//! )?;
//! session.send_all(probe::G_PACKET)?;
//! let mut report = [0u8; probe::REPORT_LEN];
//! session.recv_exact(&mut report)?;
//! println!("device saw {} bytes", probe::decode_report(&report));
//! ```

pub mod probe;
pub mod transport;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::probe;
    pub use crate::transport::{
        SerialSession, TransportError, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_MS,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
