//! AT modem prober.
//!
//! Each candidate serial device is opened at every configured baud rate in
//! turn and asked for its model (`AT+CGMM`) and manufacturer (`AT+CGMI`).
//! An `ERROR` reply means something is listening but it does not speak AT,
//! so the device is dropped. Silence only rules out the current baud rate.

use super::{DiscoveryPool, ProbeError};
use crate::config::{ProbeConfig, SerialConfig};
use crate::device::{DiscoveredDevice, IdentityKey, DEFAULT_PIN};
use crate::port::{read_line, PortConfiguration, PortError, PortOpener, SerialPortAdapter};
use parking_lot::Mutex;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Model identification query.
pub const MODEL_QUERY: &str = "AT+CGMM";

/// Manufacturer identification query.
pub const MANUFACTURER_QUERY: &str = "AT+CGMI";

/// How an AT exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtStatus {
    Ok,
    Error,
    Timeout,
}

impl fmt::Display for AtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Error => write!(f, "ERROR"),
            Self::Timeout => write!(f, "TIMEOUT"),
        }
    }
}

/// Result of one command/response exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtReply {
    pub status: AtStatus,
    /// Last non-empty line received before the terminator.
    pub payload: String,
}

/// Send `command` and collect lines until `OK`, `ERROR` or the deadline.
///
/// Empty lines never replace the payload. The deadline also bounds each line
/// read, so a device streaming bytes without a newline still times out.
pub fn exchange(
    port: &mut dyn SerialPortAdapter,
    command: &str,
    deadline: Duration,
) -> Result<AtReply, PortError> {
    port.write_all_bytes(format!("{command}\r\n").as_bytes())?;

    let until = Instant::now() + deadline;
    let mut payload = String::new();

    loop {
        let raw = read_line(port, until)?;
        let line = raw.trim();

        if line.starts_with("OK") {
            return Ok(AtReply {
                status: AtStatus::Ok,
                payload,
            });
        }
        if line.starts_with("ERROR") {
            return Ok(AtReply {
                status: AtStatus::Error,
                payload,
            });
        }
        if !line.is_empty() {
            payload = line.to_string();
        }

        if Instant::now() >= until {
            return Ok(AtReply {
                status: AtStatus::Timeout,
                payload,
            });
        }
    }
}

/// Tunables for a probing pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtProbeSettings {
    /// Baud rates in the order they are tried.
    pub baud_rates: Vec<u32>,
    /// Timeout of a single line read.
    pub read_timeout: Duration,
    /// Deadline of one command/response exchange.
    pub exchange_timeout: Duration,
    /// PIN recorded for every modem found.
    pub credential: String,
}

impl AtProbeSettings {
    pub fn from_config(serial: &SerialConfig, probe: &ProbeConfig) -> Self {
        Self {
            baud_rates: serial.baud_rates.clone(),
            read_timeout: serial.read_timeout(),
            exchange_timeout: serial.exchange_timeout(),
            credential: probe.default_pin.clone(),
        }
    }
}

impl Default for AtProbeSettings {
    fn default() -> Self {
        Self {
            baud_rates: vec![9600, 115200],
            read_timeout: Duration::from_secs(1),
            exchange_timeout: Duration::from_secs(2),
            credential: DEFAULT_PIN.to_string(),
        }
    }
}

/// A modem that answered both identification queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtIdentity {
    pub path: String,
    pub baud_rate: u32,
    pub model: String,
    pub manufacturer: String,
}

impl AtIdentity {
    pub fn key(&self) -> IdentityKey {
        IdentityKey::from_parts(&self.model, &self.manufacturer)
    }
}

/// Identify the modem behind `path`.
///
/// The port is reopened for every baud rate and dropped before the next
/// attempt or on any early return.
pub fn probe_device(
    opener: &dyn PortOpener,
    path: &str,
    settings: &AtProbeSettings,
) -> Result<AtIdentity, ProbeError> {
    for &baud in &settings.baud_rates {
        let config = PortConfiguration::new(baud, settings.read_timeout);
        let mut port = opener.open(path, &config).map_err(|source| ProbeError::Open {
            path: path.to_string(),
            source,
        })?;
        let port_error = |source| ProbeError::Port {
            path: path.to_string(),
            baud,
            source,
        };

        debug!(path, baud, "Querying model");
        let model = exchange(port.as_mut(), MODEL_QUERY, settings.exchange_timeout)
            .map_err(port_error)?;

        match model.status {
            AtStatus::Error => {
                return Err(ProbeError::NotAtDevice {
                    path: path.to_string(),
                    baud,
                })
            }
            AtStatus::Timeout => {
                debug!(path, baud, "No answer to model query");
                continue;
            }
            AtStatus::Ok => {}
        }

        let manufacturer = exchange(port.as_mut(), MANUFACTURER_QUERY, settings.exchange_timeout)
            .map_err(port_error)?;
        if manufacturer.status != AtStatus::Ok {
            return Err(ProbeError::ManufacturerQuery {
                path: path.to_string(),
                model: model.payload,
                status: manufacturer.status,
            });
        }

        return Ok(AtIdentity {
            path: path.to_string(),
            baud_rate: baud,
            model: model.payload,
            manufacturer: manufacturer.payload,
        });
    }

    Err(ProbeError::NoResponse {
        path: path.to_string(),
        bauds: settings.baud_rates.clone(),
    })
}

/// Expand glob patterns into candidate device paths.
///
/// Paths are deduplicated and keep pattern order, then glob order.
pub fn expand_globs(patterns: &[String]) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();

    for pattern in patterns {
        let entries = match glob::glob(pattern) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Ignoring invalid device pattern");
                continue;
            }
        };

        for entry in entries {
            match entry {
                Ok(path) => {
                    let path = path.to_string_lossy().into_owned();
                    if !paths.contains(&path) {
                        paths.push(path);
                    }
                }
                Err(e) => warn!(error = %e, "Unreadable device path"),
            }
        }
    }

    paths
}

/// Probes serial candidates and registers the modems it identifies.
pub struct AtProber<O> {
    opener: O,
    settings: AtProbeSettings,
    parallel: bool,
}

impl<O: PortOpener> AtProber<O> {
    pub fn new(opener: O, settings: AtProbeSettings) -> Self {
        Self {
            opener,
            settings,
            parallel: false,
        }
    }

    /// Probe candidates on scoped threads instead of one after another.
    ///
    /// With duplicates (one modem exposing several AT ports) the kept path
    /// is then whichever thread registers first.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn opener(&self) -> &O {
        &self.opener
    }

    /// Probe every path matching `patterns`.
    pub fn probe_globs(&self, patterns: &[String], pool: &mut DiscoveryPool) -> usize {
        let candidates = expand_globs(patterns);
        info!(count = candidates.len(), "Probing serial candidates");
        self.probe_paths(&candidates, pool)
    }

    /// Probe the given paths, returning how many new modems were registered.
    pub fn probe_paths(&self, paths: &[String], pool: &mut DiscoveryPool) -> usize {
        if !self.parallel || paths.len() < 2 {
            return paths
                .iter()
                .filter(|path| self.probe_one(path, pool))
                .count();
        }

        let shared = Mutex::new(pool);
        std::thread::scope(|scope| {
            let handles: Vec<_> = paths
                .iter()
                .map(|path| {
                    let shared = &shared;
                    scope.spawn(move || {
                        let outcome = probe_device(&self.opener, path, &self.settings);
                        // check-then-insert under one lock
                        let mut guard = shared.lock();
                        self.register(path, outcome, &mut **guard)
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| handle.join())
                .filter(|joined| matches!(joined, Ok(true)))
                .count()
        })
    }

    fn probe_one(&self, path: &str, pool: &mut DiscoveryPool) -> bool {
        let outcome = probe_device(&self.opener, path, &self.settings);
        self.register(path, outcome, pool)
    }

    fn register(
        &self,
        path: &str,
        outcome: Result<AtIdentity, ProbeError>,
        pool: &mut DiscoveryPool,
    ) -> bool {
        let identity = match outcome {
            Ok(identity) => identity,
            Err(e) => {
                warn!(path, "Skipping serial device: {e}");
                return false;
            }
        };

        let key = identity.key();
        let device = DiscoveredDevice::at_modem(key.clone(), &identity.path, identity.baud_rate)
            .with_credential(self.settings.credential.clone());

        if pool.insert(device) {
            info!(
                path,
                baud = identity.baud_rate,
                identity = %key,
                "Found AT modem"
            );
            true
        } else {
            debug!(path, identity = %key, "Modem already found on another port");
            false
        }
    }
}
