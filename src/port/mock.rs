//! Mock serial ports for testing.
//!
//! `MockSerialPort` replays a scripted byte stream and records every write.
//! `MockPortOpener` hands out scripted ports per `(path, baud)` so a whole
//! probing pass can run without hardware.

use super::error::PortError;
use super::traits::{PortConfiguration, PortOpener, SerialPortAdapter};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Inner state of the mock port.
#[derive(Debug, Default)]
struct MockPortState {
    /// Queue of bytes to be returned by read operations.
    read_queue: VecDeque<u8>,
    /// Log of all bytes written to the port.
    write_log: Vec<Vec<u8>>,
    /// Configured timeout duration.
    timeout: Duration,
    /// When set, every read fails with this I/O error kind.
    read_failure: Option<std::io::ErrorKind>,
}

/// Mock serial port implementation for testing.
///
/// An empty read queue behaves like a read timeout, which is exactly what an
/// unresponsive modem looks like.
///
/// # Example
/// ```
/// use modem_testbench::port::{read_line, MockSerialPort, SerialPortAdapter};
/// use std::time::{Duration, Instant};
///
/// let mut port = MockSerialPort::new("MOCK0");
/// port.enqueue_read(b"EC25\r\nOK\r\n");
///
/// port.write_bytes(b"AT+CGMM\r\n").unwrap();
/// let until = Instant::now() + Duration::from_secs(1);
/// assert_eq!(read_line(&mut port, until).unwrap(), "EC25\r\n");
/// assert_eq!(port.get_write_log(), vec![b"AT+CGMM\r\n".to_vec()]);
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    name: String,
    state: Arc<Mutex<MockPortState>>,
}

impl MockSerialPort {
    /// Create a new mock serial port with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockPortState {
                timeout: Duration::from_secs(1),
                ..Default::default()
            })),
        }
    }

    /// Enqueue bytes to be returned by subsequent read operations.
    pub fn enqueue_read(&mut self, data: &[u8]) {
        self.state.lock().read_queue.extend(data);
    }

    /// Make every subsequent read fail with the given I/O error kind.
    pub fn fail_reads(&mut self, kind: std::io::ErrorKind) {
        self.state.lock().read_failure = Some(kind);
    }

    /// Get a copy of all data written to the port.
    pub fn get_write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// Get the number of bytes still waiting to be read.
    pub fn available_bytes(&self) -> usize {
        self.state.lock().read_queue.len()
    }

    /// Currently configured timeout.
    pub fn timeout(&self) -> Duration {
        self.state.lock().timeout
    }
}

impl SerialPortAdapter for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        self.state.lock().write_log.push(data.to_vec());
        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();

        if let Some(kind) = state.read_failure {
            return Err(PortError::Io(kind.into()));
        }

        let mut bytes_read = 0;
        for byte in buffer.iter_mut() {
            match state.read_queue.pop_front() {
                Some(queued) => {
                    *byte = queued;
                    bytes_read += 1;
                }
                None => break,
            }
        }

        if bytes_read == 0 {
            Err(PortError::timeout(state.timeout))
        } else {
            Ok(bytes_read)
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.state.lock().timeout = timeout;
        Ok(())
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("available_bytes", &self.available_bytes())
            .finish()
    }
}

/// Port opener returning scripted mock ports.
///
/// Paths registered with [`fail_open`](Self::fail_open) refuse to open.
/// Any `(path, baud)` pair without a script opens a silent port.
#[derive(Default)]
pub struct MockPortOpener {
    scripts: Mutex<HashMap<(String, u32), MockSerialPort>>,
    failing: HashSet<String>,
    opened: Mutex<Vec<(String, u32)>>,
}

impl MockPortOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the bytes a device answers with when opened at `baud`.
    pub fn script(self, path: &str, baud: u32, response: &[u8]) -> Self {
        let mut port = MockSerialPort::new(path);
        port.enqueue_read(response);
        self.scripts.lock().insert((path.to_string(), baud), port);
        self
    }

    /// Make opening `path` fail as if the device node vanished.
    pub fn fail_open(mut self, path: &str) -> Self {
        self.failing.insert(path.to_string());
        self
    }

    /// Every `(path, baud)` pair that was successfully opened, in order.
    pub fn opened(&self) -> Vec<(String, u32)> {
        self.opened.lock().clone()
    }

    /// The scripted port for `(path, baud)`, for inspecting its write log.
    pub fn port(&self, path: &str, baud: u32) -> Option<MockSerialPort> {
        self.scripts.lock().get(&(path.to_string(), baud)).cloned()
    }
}

impl PortOpener for MockPortOpener {
    fn open(
        &self,
        path: &str,
        config: &PortConfiguration,
    ) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        if self.failing.contains(path) {
            return Err(PortError::not_found(path));
        }

        let mut port = self
            .scripts
            .lock()
            .get(&(path.to_string(), config.baud_rate))
            .cloned()
            .unwrap_or_else(|| MockSerialPort::new(path));
        port.set_timeout(config.timeout)?;

        self.opened
            .lock()
            .push((path.to_string(), config.baud_rate));
        Ok(Box::new(port))
    }
}
