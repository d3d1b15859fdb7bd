//! The transport underneath a [`ReceiverSession`](crate::receiver_session::ReceiverSession).
//!
//! The tracker speaks a line protocol: single-byte commands go out, newline
//! terminated ASCII records come back. [`TrackerLink`] is the seam between the
//! session logic and whatever carries those bytes, so the session can be
//! driven by a real serial port or by the
//! [`SimulatedTracker`](crate::simulated_tracker::SimulatedTracker).

use log::{debug, warn};
use serial2::SerialPort;
use std::{io, path::Path, time::Duration};

/// Commands understood by the tracker. Each is sent as a single ASCII byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Restore factory software defaults.
    FactoryDefaults,
    /// Report positions in centimetres instead of inches.
    MetricUnits,
    /// Request one record from every active receiver.
    SingleRecord,
}

impl Command {
    /// The byte that goes on the wire.
    pub fn byte(self) -> u8 {
        match self {
            Command::FactoryDefaults => b'W',
            Command::MetricUnits => b'u',
            Command::SingleRecord => b'P',
        }
    }
}

/// A line-oriented, blocking connection to the tracker.
///
/// `read_record` must hand back whole records only. If it times out part way
/// through a line, the bytes already received are kept and the line is
/// completed by the next call, so a record can never straddle two samples.
pub trait TrackerLink {
    /// Write one command byte.
    fn send(&mut self, command: Command) -> io::Result<()>;

    /// Block until one full record has arrived and return it without its line
    /// terminator. Returns an [`io::ErrorKind::TimedOut`] error if nothing
    /// complete arrives within the link's read timeout.
    fn read_record(&mut self) -> io::Result<String>;

    /// Throw away everything that has been received but not yet read.
    fn discard_input(&mut self) -> io::Result<()>;
}

impl<L: TrackerLink + ?Sized> TrackerLink for Box<L> {
    fn send(&mut self, command: Command) -> io::Result<()> {
        (**self).send(command)
    }

    fn read_record(&mut self) -> io::Result<String> {
        (**self).read_record()
    }

    fn discard_input(&mut self) -> io::Result<()> {
        (**self).discard_input()
    }
}

/// A [`TrackerLink`] over a physical serial port (8 data bits, no parity,
/// one stop bit, no flow control).
pub struct SerialLink {
    port: SerialPort,
    line: Vec<u8>,
}

impl SerialLink {
    /// Open `device` at `baud_rate`, giving up on a read after `read_timeout`.
    pub fn open(device: impl AsRef<Path>, baud_rate: u32, read_timeout: Duration) -> io::Result<Self> {
        let mut port = SerialPort::open(device.as_ref(), baud_rate)?;
        port.set_read_timeout(read_timeout)?;
        port.set_write_timeout(read_timeout)?;
        debug!("Opened {} at {} baud", device.as_ref().display(), baud_rate);
        Ok(Self {
            port,
            line: Vec::with_capacity(64),
        })
    }

    /// Names of the serial devices present on this machine.
    pub fn available_ports() -> io::Result<Vec<std::path::PathBuf>> {
        SerialPort::available_ports()
    }

    /// Pulls a complete line out of the buffer, if there is one.
    fn take_line(&mut self) -> Option<String> {
        let end = self.line.iter().position(|&c| c == b'\n')?;
        let rest = self.line.split_off(end + 1);
        let raw = std::mem::replace(&mut self.line, rest);
        let text = match std::str::from_utf8(&raw) {
            Ok(s) => s.to_owned(),
            // Often happens right after power-up when there is still garbage
            // in the hardware buffer. The decoder rejects it downstream.
            Err(e) => {
                warn!("Failed to decode utf-8: {:?}", e);
                String::from_utf8_lossy(&raw).into_owned()
            }
        };
        Some(text.trim_end_matches(['\r', '\n']).to_owned())
    }
}

impl TrackerLink for SerialLink {
    fn send(&mut self, command: Command) -> io::Result<()> {
        debug!("Sending {:?}", command);
        self.port.write_all(&[command.byte()])
    }

    fn read_record(&mut self) -> io::Result<String> {
        let mut buffer = [0; 256];
        loop {
            if let Some(line) = self.take_line() {
                return Ok(line);
            }
            let read_len = self.port.read(&mut buffer)?;
            if read_len == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "tracker disconnected",
                ));
            }
            self.line.extend_from_slice(&buffer[..read_len]);
        }
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.line.clear();
        self.port.discard_input_buffer()
    }
}
