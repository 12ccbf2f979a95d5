//! Core traits for serial port abstraction.
//!
//! `SerialPortAdapter` lets the AT prober run against real hardware and
//! scripted mocks alike; `PortOpener` is the seam that decides which one a
//! probe gets for a given device path.

use super::error::PortError;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Longest line `read_line` will buffer before handing it back.
pub const MAX_LINE_LEN: usize = 1024;

/// Parameters used to open a serial device for probing.
///
/// Modems are always probed as 8N1 without flow control, so only the baud
/// rate and the per-read timeout vary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfiguration {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Timeout for a single read call.
    pub timeout: Duration,
}

impl PortConfiguration {
    pub fn new(baud_rate: u32, timeout: Duration) -> Self {
        Self { baud_rate, timeout }
    }
}

impl Default for PortConfiguration {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            timeout: Duration::from_secs(1),
        }
    }
}

/// Trait for serial port I/O operations.
///
/// Dropping the adapter releases the underlying device.
pub trait SerialPortAdapter: Send + std::fmt::Debug {
    /// Write bytes to the serial port.
    ///
    /// Returns the number of bytes actually written.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Read bytes from the serial port into the provided buffer.
    ///
    /// Returns the number of bytes actually read.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// Get the name/path of this serial port.
    fn name(&self) -> &str;

    /// Set the read/write timeout for this port.
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError>;

    /// Write the whole buffer, retrying short writes.
    fn write_all_bytes(&mut self, mut data: &[u8]) -> Result<(), PortError> {
        while !data.is_empty() {
            let written = self.write_bytes(data)?;
            if written == 0 {
                return Err(PortError::Io(std::io::ErrorKind::WriteZero.into()));
            }
            data = &data[written..];
        }
        Ok(())
    }
}

/// Opens serial devices by path.
pub trait PortOpener: Send + Sync {
    fn open(
        &self,
        path: &str,
        config: &PortConfiguration,
    ) -> Result<Box<dyn SerialPortAdapter>, PortError>;
}

/// Read one line from the port.
///
/// Bytes are consumed until `\n`, until a read times out, until `until`
/// passes or until [`MAX_LINE_LEN`] bytes are buffered; whatever arrived so
/// far is returned, possibly empty. Invalid UTF-8 is replaced rather than
/// rejected since modems occasionally emit line noise after a baud switch.
pub fn read_line(port: &mut dyn SerialPortAdapter, until: Instant) -> Result<String, PortError> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];

    while line.len() < MAX_LINE_LEN && Instant::now() < until {
        match port.read_bytes(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                line.push(byte[0]);
                if byte[0] == b'\n' {
                    break;
                }
            }
            Err(e) if e.is_read_timeout() => break,
            Err(e) => return Err(e),
        }
    }

    Ok(String::from_utf8_lossy(&line).into_owned())
}
