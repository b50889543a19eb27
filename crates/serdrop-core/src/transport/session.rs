//! Serial session
//!
//! Owns the terminal device for the lifetime of a probe run: opens it,
//! captures the original termios so it can be put back on teardown, applies
//! raw mode, and exposes blocking single-byte reads and writes with a
//! timeout. The timeout is not implemented through `VMIN`/`VTIME` but by a
//! `select(2)` readiness wait in front of every syscall, so the same
//! deadline applies to both directions.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::time::Duration;
use std::{mem, ptr, thread};

use tracing::{debug, warn};

use super::TransportError;

/// Pause after configuring the port. Some USB-CDC firmware (mbed in
/// particular) drops bytes written immediately after the host opens the
/// port.
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Which way a readiness wait is looking.
#[derive(Debug, Clone, Copy)]
enum Direction {
    Read,
    Write,
}

/// An exclusive, synchronous session on a serial device.
///
/// Dropping the session restores the terminal configuration that was in
/// effect before [`SerialSession::open`] and closes the descriptor. Use
/// [`SerialSession::close`] instead when the caller wants to hear about a
/// failed restore.
pub struct SerialSession {
    file: File,
    /// Termios captured before reconfiguration; `None` once restored.
    saved: Option<libc::termios>,
    timeout: Duration,
}

impl SerialSession {
    /// Open and configure a serial device.
    ///
    /// The device is opened non-blocking (readiness waits carry the
    /// timeout), switched to raw 8N1 with modem flow control disabled, and
    /// flushed. The termios in effect beforehand is captured and restored on
    /// teardown.
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> Result<Self, TransportError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
            .open(path)
            .map_err(|source| TransportError::Open {
                path: path.to_string(),
                source,
            })?;

        let mut session = Self {
            file,
            saved: None,
            timeout,
        };
        // On failure the partially-configured session drops here, which
        // restores whatever was captured before the failing call.
        session.configure(baud_rate)?;
        debug!(path, baud_rate, "serial session configured");
        Ok(session)
    }

    /// Build a session around an existing descriptor (pty-backed tests).
    #[cfg(test)]
    pub(crate) fn from_fd(
        fd: std::os::fd::OwnedFd,
        baud_rate: u32,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let file = File::from(fd);
        // Match the open() path: the readiness waits assume a non-blocking
        // descriptor.
        let raw = file.as_raw_fd();
        let flags = unsafe { libc::fcntl(raw, libc::F_GETFL) };
        if flags == -1
            || unsafe { libc::fcntl(raw, libc::F_SETFL, flags | libc::O_NONBLOCK) } == -1
        {
            return Err(TransportError::Configure {
                op: "fcntl",
                source: io::Error::last_os_error(),
            });
        }

        let mut session = Self {
            file,
            saved: None,
            timeout,
        };
        session.configure(baud_rate)?;
        Ok(session)
    }

    fn configure(&mut self, baud_rate: u32) -> Result<(), TransportError> {
        let speed =
            baud_to_speed(baud_rate).ok_or(TransportError::UnsupportedBaudRate(baud_rate))?;
        let fd = self.file.as_raw_fd();

        let mut original: libc::termios = unsafe { mem::zeroed() };
        if unsafe { libc::tcgetattr(fd, &mut original) } != 0 {
            return Err(config_error("tcgetattr"));
        }
        self.saved = Some(original);

        let mut raw = original;
        unsafe { libc::cfmakeraw(&mut raw) };
        // cfmakeraw leaves a few translation flags platform-dependent; the
        // probe needs every byte verbatim in both directions.
        raw.c_iflag = 0;
        raw.c_oflag = 0;
        // 8N1, receiver on, no modem control lines, no hardware flow
        // control. Mask rather than assign so the speed bits survive on
        // platforms that keep them in c_cflag.
        raw.c_cflag &= !(libc::CSIZE | libc::PARENB | libc::CSTOPB | libc::CRTSCTS);
        raw.c_cflag |= libc::CS8 | libc::CREAD | libc::CLOCAL;
        // Timeouts are handled by the readiness wait, not the line
        // discipline.
        raw.c_cc[libc::VMIN] = 0;
        raw.c_cc[libc::VTIME] = 0;
        if unsafe { libc::cfsetspeed(&mut raw, speed) } != 0 {
            return Err(config_error("cfsetspeed"));
        }

        if unsafe { libc::tcflush(fd, libc::TCIOFLUSH) } != 0 {
            return Err(config_error("tcflush"));
        }
        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &raw) } != 0 {
            return Err(config_error("tcsetattr"));
        }

        thread::sleep(SETTLE_DELAY);
        Ok(())
    }

    /// Tear the session down, restoring the captured terminal configuration.
    ///
    /// [`Drop`] does the same restore best-effort; this variant reports a
    /// failed `tcsetattr` to the caller.
    pub fn close(mut self) -> Result<(), TransportError> {
        self.restore()
    }

    /// Receive one byte, waiting up to the session timeout for input.
    pub fn recv_byte(&mut self) -> Result<u8, TransportError> {
        self.wait_ready(Direction::Read)?;
        let mut byte = [0u8; 1];
        let n = self.file.read(&mut byte)?;
        if n == 0 {
            return Err(TransportError::Disconnected);
        }
        Ok(byte[0])
    }

    /// Fill `buffer` with received bytes.
    ///
    /// All-or-nothing: the first failed byte aborts the call and the buffer
    /// contents are unspecified.
    pub fn recv_exact(&mut self, buffer: &mut [u8]) -> Result<(), TransportError> {
        for slot in buffer.iter_mut() {
            *slot = self.recv_byte()?;
        }
        Ok(())
    }

    /// Send one byte, waiting up to the session timeout for writability.
    pub fn send_byte(&mut self, byte: u8) -> Result<(), TransportError> {
        self.wait_ready(Direction::Write)?;
        let n = self.file.write(&[byte])?;
        if n != 1 {
            return Err(TransportError::ShortWrite);
        }
        Ok(())
    }

    /// Send every byte of `data`, failing on the first byte that does not go
    /// through.
    pub fn send_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        for &byte in data {
            self.send_byte(byte)?;
        }
        Ok(())
    }

    /// Block until the descriptor is ready in the given direction or the
    /// session timeout elapses.
    fn wait_ready(&self, direction: Direction) -> Result<(), TransportError> {
        let fd = self.file.as_raw_fd();

        let mut ready: libc::fd_set = unsafe { mem::zeroed() };
        let mut errored: libc::fd_set = unsafe { mem::zeroed() };
        unsafe {
            libc::FD_SET(fd, &mut ready);
            libc::FD_SET(fd, &mut errored);
        }
        let mut deadline = libc::timeval {
            tv_sec: self.timeout.as_secs() as libc::time_t,
            tv_usec: self.timeout.subsec_micros() as libc::suseconds_t,
        };

        let (readfds, writefds) = match direction {
            Direction::Read => (&mut ready as *mut libc::fd_set, ptr::null_mut()),
            Direction::Write => (ptr::null_mut(), &mut ready as *mut libc::fd_set),
        };
        let n = unsafe { libc::select(fd + 1, readfds, writefds, &mut errored, &mut deadline) };
        match n {
            -1 => Err(TransportError::Io(io::Error::last_os_error())),
            0 => Err(TransportError::Timeout),
            _ => Ok(()),
        }
    }

    /// Put the original termios back, once.
    fn restore(&mut self) -> Result<(), TransportError> {
        if let Some(saved) = self.saved.take() {
            let fd = self.file.as_raw_fd();
            if unsafe { libc::tcsetattr(fd, libc::TCSAFLUSH, &saved) } != 0 {
                return Err(TransportError::Io(io::Error::last_os_error()));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for SerialSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // libc::termios has no Debug; show whether a capture is held.
        f.debug_struct("SerialSession")
            .field("file", &self.file)
            .field("timeout", &self.timeout)
            .field("saved", &self.saved.is_some())
            .finish()
    }
}

impl Drop for SerialSession {
    fn drop(&mut self) {
        if let Err(err) = self.restore() {
            warn!("failed to restore terminal settings: {err}");
        }
    }
}

fn config_error(op: &'static str) -> TransportError {
    TransportError::Configure {
        op,
        source: io::Error::last_os_error(),
    }
}

/// Map a numeric baud rate onto its termios speed constant.
fn baud_to_speed(baud_rate: u32) -> Option<libc::speed_t> {
    Some(match baud_rate {
        1_200 => libc::B1200,
        2_400 => libc::B2400,
        4_800 => libc::B4800,
        9_600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        #[cfg(target_os = "linux")]
        460_800 => libc::B460800,
        #[cfg(target_os = "linux")]
        921_600 => libc::B921600,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::termios::{tcgetattr, ControlFlags, LocalFlags};
    use pretty_assertions::assert_eq;
    use std::os::fd::OwnedFd;

    const TEST_TIMEOUT: Duration = Duration::from_millis(200);

    /// (master, slave) pty pair; the master keeps the pair alive.
    fn pty_pair() -> (OwnedFd, OwnedFd) {
        let pty = nix::pty::openpty(None, None).expect("openpty");
        (pty.master, pty.slave)
    }

    #[test]
    fn open_applies_raw_mode() {
        let (_master, slave) = pty_pair();
        let probe_fd = slave.try_clone().expect("dup slave");

        let session = SerialSession::from_fd(slave, 115_200, TEST_TIMEOUT).unwrap();
        let attrs = tcgetattr(&probe_fd).unwrap();
        assert!(!attrs.local_flags.contains(LocalFlags::ICANON));
        assert!(!attrs.local_flags.contains(LocalFlags::ECHO));
        assert!(attrs.control_flags.contains(ControlFlags::CS8));
        assert!(attrs.control_flags.contains(ControlFlags::CREAD));
        assert!(attrs.control_flags.contains(ControlFlags::CLOCAL));
        drop(session);
    }

    #[test]
    fn teardown_restores_prior_settings() {
        let (_master, slave) = pty_pair();
        let probe_fd = slave.try_clone().expect("dup slave");
        let before = tcgetattr(&probe_fd).unwrap();

        let session = SerialSession::from_fd(slave, 115_200, TEST_TIMEOUT).unwrap();
        let during = tcgetattr(&probe_fd).unwrap();
        assert_ne!(before.local_flags, during.local_flags);

        drop(session);
        let after = tcgetattr(&probe_fd).unwrap();
        assert_eq!(before.input_flags, after.input_flags);
        assert_eq!(before.output_flags, after.output_flags);
        assert_eq!(before.control_flags, after.control_flags);
        assert_eq!(before.local_flags, after.local_flags);
    }

    #[test]
    fn explicit_close_restores_prior_settings() {
        let (_master, slave) = pty_pair();
        let probe_fd = slave.try_clone().expect("dup slave");
        let before = tcgetattr(&probe_fd).unwrap();

        let session = SerialSession::from_fd(slave, 115_200, TEST_TIMEOUT).unwrap();
        session.close().unwrap();

        let after = tcgetattr(&probe_fd).unwrap();
        assert_eq!(before.local_flags, after.local_flags);
        assert_eq!(before.control_flags, after.control_flags);
    }

    #[test]
    fn unsupported_baud_rate_is_rejected() {
        let (_master, slave) = pty_pair();
        let err = SerialSession::from_fd(slave, 123_456, TEST_TIMEOUT).unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedBaudRate(123_456)));
    }

    #[test]
    fn session_is_debug_without_exposing_raw_termios() {
        let (_master, slave) = pty_pair();
        let session = SerialSession::from_fd(slave, 115_200, TEST_TIMEOUT).unwrap();
        let rendered = format!("{session:?}");
        assert!(rendered.contains("SerialSession"));
        assert!(rendered.contains("saved: true"));
    }

    #[test]
    fn baud_table_covers_the_monitor_rate() {
        assert!(baud_to_speed(230_400).is_some());
        assert!(baud_to_speed(115_200).is_some());
        assert!(baud_to_speed(0).is_none());
        assert!(baud_to_speed(123_456).is_none());
    }
}
