//! Modem Testbench Library
//!
//! Discovers cellular modems and SIM cards attached to a test host, matches
//! them against a declaration file and runs test programs against every
//! matched device.
//!
//! # Modules
//!
//! - `config`: Configuration management with TOML support
//! - `declaration`: Declaration file parsing
//! - `device`: Declared, discovered and resolved device records
//! - `error`: Fatal harness errors
//! - `port`: Serial port abstraction used by the AT prober
//! - `probe`: AT modem and PC/SC card discovery
//! - `reconcile`: Matching declarations against discoveries
//! - `runner`: Test orchestration and subprocess execution
//! - `report`: Console transcript and JSON run report

pub mod config;
pub mod declaration;
pub mod device;
pub mod error;
pub mod port;
pub mod probe;
pub mod reconcile;
pub mod report;
pub mod runner;

// Re-export commonly used types for convenience
pub use device::{
    DeclaredDevice, DiscoveredDevice, IdentityKey, InterfaceKind, MatchKey, MissingDevice,
    ResolvedDevice,
};
pub use error::{HarnessError, HarnessResult};
pub use port::{MockSerialPort, PortConfiguration, PortError, SerialPortAdapter, SyncSerialPort};
pub use probe::{discover, DiscoveryPool, ProbeError};
pub use reconcile::{reconcile, Reconciliation};
pub use report::{ConsoleObserver, RunReport};
pub use runner::{Orchestrator, ProcessExecutor, RunSummary, TestExecutor, TestOutcome};

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
