//! Probe traffic
//!
//! The outbound side of the repro is a single fixed packet: a synthetic GDB
//! remote-serial-protocol `G` (write general registers) command, the frame
//! that reliably exposed byte loss on the monitor under test. The firmware
//! does not parse it; it counts the bytes that arrived and reports the count
//! back as a 4-byte little-endian integer.

use byteorder::{ByteOrder, LittleEndian};

/// The fixed `G` packet: `$G`, 400 hex digits of register contents, and the
/// `#f8` checksum placeholder. Null-free ASCII, sent raw with no trailing
/// terminator.
pub const G_PACKET: &[u8] = b"$G000000000000000001000000adc10020b4b90020d032002000000000010000001300800000000000000000000000000000000000a0b9002091ae010020e6010000000f61000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000#f8";

/// Size of the count report the device sends after each packet.
pub const REPORT_LEN: usize = 4;

/// The count a device that dropped nothing reports back.
pub fn expected_count() -> u32 {
    G_PACKET.len() as u32
}

/// Decode the little-endian byte count reported by the device.
pub fn decode_report(raw: &[u8; REPORT_LEN]) -> u32 {
    LittleEndian::read_u32(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn packet_is_a_framed_g_command() {
        assert!(G_PACKET.starts_with(b"$G"));
        assert!(G_PACKET.ends_with(b"#f8"));
        let payload = &G_PACKET[2..G_PACKET.len() - 3];
        assert!(payload.iter().all(u8::is_ascii_hexdigit));
    }

    #[test]
    fn packet_is_null_free_ascii() {
        assert!(G_PACKET.iter().all(|&b| b != 0 && b.is_ascii()));
    }

    #[test]
    fn packet_length_is_stable() {
        // The firmware side of the repro hardcodes this length.
        assert_eq!(G_PACKET.len(), 405);
        assert_eq!(expected_count(), 405);
    }

    #[test]
    fn report_decodes_little_endian() {
        assert_eq!(decode_report(&[0x95, 0x01, 0x00, 0x00]), 405);
        assert_eq!(decode_report(&[0xff, 0x00, 0x00, 0x00]), 255);
        assert_eq!(decode_report(&[0x00, 0x00, 0x00, 0x01]), 1 << 24);
    }
}
