//! serdrop - serial byte-loss repro tool
//!
//! Opens a serial connection to an embedded debug monitor, sends a fixed
//! GDB-style `G` packet 1000 times, and prints the byte count the device
//! reports after each packet next to the count it should have seen. A
//! reported count below the packet length means bytes were lost on the way
//! over.
//!
//! ```text
//! serdrop /dev/ttyACM0
//! serdrop /dev/tty.usbmodem11401
//! ```
//!
//! Exit code is 0 when the full loop completes and -1 on a missing argument
//! or any failure. Diagnostics go to stderr; the per-iteration counts go to
//! stdout.

use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use serdrop_core::probe;
use serdrop_core::transport::{self, SerialSession, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_MS};

/// Number of probe packets sent per run.
const PROBE_ITERATIONS: usize = 1000;

/// Repro tool for byte loss on USB-CDC debug monitors
#[derive(Parser)]
#[command(name = "serdrop", version, about)]
struct Cli {
    /// Serial device connected to the debug monitor
    /// (e.g. /dev/ttyACM0 or /dev/tty.usbmodem11401)
    device: Option<String>,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Some(device) = cli.device else {
        eprintln!("error: device parameter must be specified.");
        suggest_ports();
        process::exit(-1);
    };

    if let Err(err) = run(&device) {
        eprintln!("error: {err:#}");
        process::exit(-1);
    }
}

fn run(device: &str) -> Result<()> {
    println!("Opening connection to {device}...");
    let mut session = SerialSession::open(
        device,
        DEFAULT_BAUD_RATE,
        Duration::from_millis(DEFAULT_TIMEOUT_MS),
    )?;

    let expected = probe::expected_count();
    for _ in 0..PROBE_ITERATIONS {
        println!("Sending...");
        session
            .send_all(probe::G_PACKET)
            .context("failed to send bytes to serial port")?;

        println!("Receiving...");
        let mut raw = [0u8; probe::REPORT_LEN];
        session
            .recv_exact(&mut raw)
            .context("failed while reading bytes from serial port")?;

        let actual = probe::decode_report(&raw);
        println!("Count - actual: {actual}  expected: {expected}");
        if actual != expected {
            warn!(actual, expected, "byte count mismatch, transmission loss");
        }
    }

    session
        .close()
        .context("failed to restore terminal settings")?;
    Ok(())
}

/// Printed under the missing-argument diagnostic so the user can see which
/// device nodes exist.
fn suggest_ports() {
    let candidates = transport::discover();
    if candidates.is_empty() {
        eprintln!("No serial ports detected.");
        return;
    }
    eprintln!("Detected serial ports:");
    for port in candidates {
        eprintln!("  {port}");
    }
}
