//! Serial port discovery
//!
//! Finds candidate device nodes to suggest when the CLI is invoked without a
//! device argument.

use serialport::{SerialPortInfo, SerialPortType};
use std::fmt;
#[cfg(target_os = "linux")]
use std::fs;

/// A device node that may be the debug monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCandidate {
    /// Device node path (e.g. "/dev/ttyACM0" or "/dev/tty.usbmodem11401")
    pub path: String,

    /// Human-readable description, when the enumerator knows one
    pub description: Option<String>,
}

impl fmt::Display for PortCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(desc) => write!(f, "{} ({})", self.path, desc),
            None => write!(f, "{}", self.path),
        }
    }
}

impl From<SerialPortInfo> for PortCandidate {
    fn from(info: SerialPortInfo) -> Self {
        let description = match info.port_type {
            SerialPortType::UsbPort(usb) => {
                let named: Vec<String> = [usb.manufacturer, usb.product]
                    .into_iter()
                    .flatten()
                    .collect();
                if named.is_empty() {
                    Some(format!("USB {:04x}:{:04x}", usb.vid, usb.pid))
                } else {
                    Some(named.join(" "))
                }
            }
            SerialPortType::BluetoothPort => Some("Bluetooth".to_string()),
            _ => None,
        };
        Self {
            path: info.port_name,
            description,
        }
    }
}

/// Ordering rank for a device node:
///  - USB-CDC nodes first (the class mbed/Arduino firmware exposes)
///  - then USB-serial bridges
///  - then everything else, by name
/// Numeric suffixes sort numerically within a class.
fn rank(path: &str) -> (u8, usize, String) {
    let node = path.rsplit('/').next().unwrap_or(path);
    let classes: [(u8, &[&str]); 2] = [
        (0, &["ttyACM", "cu.usbmodem", "tty.usbmodem"]),
        (1, &["ttyUSB", "cu.usbserial", "tty.usbserial"]),
    ];
    for (class, prefixes) in classes {
        for prefix in prefixes {
            if let Some(rest) = node.strip_prefix(prefix) {
                let suffix = rest.parse::<usize>().unwrap_or(usize::MAX);
                return (class, suffix, node.to_string());
            }
        }
    }
    (2, 0, node.to_string())
}

/// List candidate serial devices, deduplicated and deterministically ordered.
pub fn discover() -> Vec<PortCandidate> {
    let mut candidates: Vec<PortCandidate> = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(PortCandidate::from)
        .collect();

    // The enumerator can miss nodes without udev metadata; scan /dev too.
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(node) = entry.file_name().to_str() {
                if node.starts_with("ttyACM") || node.starts_with("ttyUSB") {
                    let path = format!("/dev/{node}");
                    if !candidates.iter().any(|c| c.path == path) {
                        candidates.push(PortCandidate {
                            path,
                            description: None,
                        });
                    }
                }
            }
        }
    }

    candidates.sort_by_key(|c| rank(&c.path));
    candidates.dedup_by(|a, b| a.path == b.path);
    candidates
}
