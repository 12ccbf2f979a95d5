//! Port abstraction layer for serial communication.
//!
//! Provides the adapter trait used by the AT prober, the real `serialport`
//! backed implementation, and mocks for tests.

pub mod error;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use error::PortError;
pub use mock::{MockPortOpener, MockSerialPort};
pub use sync_port::{SyncSerialPort, SystemPortOpener};
pub use traits::*;
