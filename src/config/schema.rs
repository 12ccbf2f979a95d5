//! Configuration schema definitions.
//!
//! Every section is `#[serde(default)]`, so a config file only needs the keys
//! it changes.

use crate::device::DEFAULT_PIN;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial modem discovery
    pub serial: SerialConfig,
    /// Smart-card discovery
    pub pcsc: PcscConfig,
    /// Shared probing behaviour
    pub probe: ProbeConfig,
    /// Test program execution
    pub runner: RunnerConfig,
    /// Declaration file parsing
    pub declarations: DeclarationsConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Serial modem discovery section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Glob patterns for candidate device nodes
    pub globs: Vec<String>,
    /// Baud rates to try, in order
    pub baud_rates: Vec<u32>,
    /// Timeout of a single line read in milliseconds
    pub read_timeout_ms: u64,
    /// Deadline for one AT command/response exchange in milliseconds
    pub exchange_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            globs: vec!["/dev/ttyACM*".to_string(), "/dev/ttyUSB*".to_string()],
            baud_rates: vec![9600, 115200],
            read_timeout_ms: 1000,
            exchange_timeout_ms: 2000,
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_millis(self.exchange_timeout_ms)
    }
}

/// Smart-card discovery section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcscConfig {
    /// Probe PC/SC readers at all
    pub enabled: bool,
}

impl Default for PcscConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Shared probing section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Probe serial candidates on separate threads
    pub parallel: bool,
    /// PIN handed to test programs for every discovered device
    pub default_pin: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            default_pin: DEFAULT_PIN.to_string(),
        }
    }
}

/// Test program execution section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Wall-clock ceiling for one test invocation in seconds
    pub timeout_secs: u64,
    /// Time between SIGTERM and SIGKILL for a timed-out process group
    pub kill_grace_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            kill_grace_ms: 5000,
        }
    }
}

impl RunnerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

/// Declaration file section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeclarationsConfig {
    /// Column layout of the declaration file
    pub layout: DeclarationLayout,
}

/// Column layout of a declaration file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationLayout {
    /// `name;interface;match_key`
    #[default]
    Named,
    /// `interface;manufacturer;model`
    Legacy,
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    Pretty,
    /// Compact format
    #[default]
    Compact,
}
