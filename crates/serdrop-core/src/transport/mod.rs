//! Serial transport layer
//!
//! A synchronous byte-oriented session over a POSIX terminal device, with a
//! per-byte timeout implemented as a readiness wait in front of each
//! single-byte read or write.

mod error;
pub mod serial;
mod session;

pub use error::TransportError;
pub use serial::{discover, PortCandidate};
pub use session::SerialSession;

/// Default baud rate for the debug monitor connection
pub const DEFAULT_BAUD_RATE: u32 = 230_400;

/// Default per-byte timeout in milliseconds
///
/// Generous because the first reply after a USB-CDC port opens can lag well
/// behind the wire rate.
pub const DEFAULT_TIMEOUT_MS: u64 = 2_000;
