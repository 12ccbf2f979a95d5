//! Device discovery.
//!
//! Two independent probers feed one [`DiscoveryPool`]:
//!
//! ```text
//! serial globs ──> AtProber   ──┐
//!                               ├──> DiscoveryPool ──> reconcile
//! PC/SC readers ─> CardProber ──┘
//! ```
//!
//! A failing candidate never stops a probing pass. Each failure becomes a
//! [`ProbeError`], is logged, and the prober moves on to the next candidate.

pub mod at;
pub mod card;
#[cfg(feature = "pcsc")]
pub mod pcsc_system;

pub use at::{AtIdentity, AtProbeSettings, AtProber, AtReply, AtStatus};
pub use card::{ApduResponse, CardChannel, CardError, CardProber, CardSystem, NoCardSystem};
#[cfg(feature = "pcsc")]
pub use pcsc_system::PcscSystem;

use crate::config::Config;
use crate::device::{DiscoveredDevice, IdentityKey, InterfaceKind};
use crate::port::{PortError, SystemPortOpener};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

/// Why a single candidate was abandoned.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: PortError,
    },

    #[error("I/O error on {path} at {baud} baud: {source}")]
    Port {
        path: String,
        baud: u32,
        #[source]
        source: PortError,
    },

    #[error("{path} answered ERROR at {baud} baud, assuming it is not an AT modem")]
    NotAtDevice { path: String, baud: u32 },

    #[error("{path} did not answer at any of {bauds:?} baud")]
    NoResponse { path: String, bauds: Vec<u32> },

    #[error("{path} reported model '{model}' but the manufacturer query ended with {status}")]
    ManufacturerQuery {
        path: String,
        model: String,
        status: AtStatus,
    },

    #[error("card reader '{reader}': {source}")]
    Card {
        reader: String,
        #[source]
        source: CardError,
    },
}

/// Devices found so far, keyed by identity.
///
/// Iteration is ordered by identity key, which is what makes wildcard
/// assignment reproducible between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryPool {
    devices: BTreeMap<IdentityKey, DiscoveredDevice>,
}

impl DiscoveryPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device unless its identity is already known.
    ///
    /// Returns `false` when an earlier discovery kept the slot; the new
    /// entry is dropped.
    pub fn insert(&mut self, device: DiscoveredDevice) -> bool {
        use std::collections::btree_map::Entry;

        match self.devices.entry(device.identity.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(device);
                true
            }
        }
    }

    pub fn contains(&self, key: &IdentityKey) -> bool {
        self.devices.contains_key(key)
    }

    pub fn get(&self, key: &IdentityKey) -> Option<&DiscoveredDevice> {
        self.devices.get(key)
    }

    /// Remove and return the device with this identity.
    pub fn take(&mut self, key: &IdentityKey) -> Option<DiscoveredDevice> {
        self.devices.remove(key)
    }

    /// Remove and return the lowest-keyed device of the given kind.
    pub fn take_first_of_kind(&mut self, kind: InterfaceKind) -> Option<DiscoveredDevice> {
        let key = self
            .devices
            .values()
            .find(|device| device.kind == kind)
            .map(|device| device.identity.clone())?;
        self.devices.remove(&key)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiscoveredDevice> {
        self.devices.values()
    }

    pub fn into_devices(self) -> Vec<DiscoveredDevice> {
        self.devices.into_values().collect()
    }
}

impl FromIterator<DiscoveredDevice> for DiscoveryPool {
    fn from_iter<I: IntoIterator<Item = DiscoveredDevice>>(iter: I) -> Self {
        let mut pool = Self::new();
        for device in iter {
            pool.insert(device);
        }
        pool
    }
}

/// Run both probers against the real hardware described by `config`.
pub fn discover(config: &Config) -> DiscoveryPool {
    let mut pool = DiscoveryPool::new();

    let settings = AtProbeSettings::from_config(&config.serial, &config.probe);
    let modems = AtProber::new(SystemPortOpener, settings)
        .parallel(config.probe.parallel)
        .probe_globs(&config.serial.globs, &mut pool);

    let cards = if config.pcsc.enabled {
        probe_cards(&config.probe.default_pin, &mut pool)
    } else {
        0
    };

    info!(modems, cards, "Discovery finished");
    pool
}

#[cfg(feature = "pcsc")]
fn probe_cards(credential: &str, pool: &mut DiscoveryPool) -> usize {
    match PcscSystem::establish() {
        Ok(system) => CardProber::new(system)
            .with_credential(credential)
            .probe_into(pool),
        Err(e) => {
            tracing::warn!("PC/SC unavailable, skipping card readers: {e}");
            0
        }
    }
}

#[cfg(not(feature = "pcsc"))]
fn probe_cards(credential: &str, pool: &mut DiscoveryPool) -> usize {
    tracing::debug!("Built without PC/SC support");
    CardProber::new(NoCardSystem)
        .with_credential(credential)
        .probe_into(pool)
}
