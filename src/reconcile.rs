//! Matches declared devices against what probing found.
//!
//! Every declaration ends up either resolved or missing, and every
//! discovered device is consumed at most once. Exact keys are bound first so
//! a wildcard listed earlier cannot take the one device a later exact
//! declaration needs. Wildcards then draw from the remaining pool in key
//! order.

use crate::device::{DeclaredDevice, DiscoveredDevice, MatchKey, MissingDevice, ResolvedDevice};
use crate::probe::DiscoveryPool;
use serde::Serialize;
use tracing::{debug, info};

/// Outcome of matching declarations against a discovery pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    /// Bound declarations, in declaration order.
    pub resolved: Vec<ResolvedDevice>,
    /// Unsatisfied declarations, in declaration order.
    pub missing: Vec<MissingDevice>,
    /// Discovered devices no declaration asked for.
    pub unclaimed: Vec<DiscoveredDevice>,
}

impl Reconciliation {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Bind each declaration to at most one discovered device.
pub fn reconcile(declared: &[DeclaredDevice], mut pool: DiscoveryPool) -> Reconciliation {
    let mut bindings: Vec<Option<DiscoveredDevice>> = vec![None; declared.len()];

    // Exact keys ignore the discovered interface kind.
    for (slot, declaration) in bindings.iter_mut().zip(declared) {
        if let MatchKey::Exact(ref key) = declaration.key {
            *slot = pool.take(key);
        }
    }

    for (slot, declaration) in bindings.iter_mut().zip(declared) {
        if declaration.is_wildcard() {
            *slot = pool.take_first_of_kind(declaration.kind);
        }
    }

    let mut outcome = Reconciliation::default();
    for (binding, declaration) in bindings.into_iter().zip(declared) {
        match binding {
            Some(device) => {
                debug!(
                    name = %declaration.name,
                    identity = %device.identity,
                    connection = %device.connection,
                    "Declaration resolved"
                );
                outcome.resolved.push(ResolvedDevice::bind(declaration, device));
            }
            None => outcome.missing.push(MissingDevice {
                name: declaration.name.clone(),
                kind: declaration.kind,
            }),
        }
    }

    outcome.unclaimed = pool.into_devices();
    for device in &outcome.unclaimed {
        info!(
            identity = %device.identity,
            connection = %device.connection,
            "Discovered device is not declared"
        );
    }

    outcome
}
