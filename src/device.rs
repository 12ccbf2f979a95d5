//! Device records shared by the probers, the reconciler and the runner.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default PIN handed to test programs. Reserved for per-card PIN policy.
pub const DEFAULT_PIN: &str = "0000";

/// The literal match key that accepts any device of the declared interface.
pub const WILDCARD_KEY: &str = "*@*";

/// How a device is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InterfaceKind {
    /// Modem answering AT commands on a serial line.
    #[serde(rename = "AT")]
    At,
    /// SIM/UICC card behind a PC/SC reader.
    #[serde(rename = "PCSC")]
    Pcsc,
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::At => write!(f, "AT"),
            Self::Pcsc => write!(f, "PCSC"),
        }
    }
}

/// Error returned when an interface name is neither `AT` nor `PCSC`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown interface kind '{0}' (expected AT or PCSC)")]
pub struct UnknownInterface(pub String);

impl FromStr for InterfaceKind {
    type Err = UnknownInterface;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AT" => Ok(Self::At),
            "PCSC" | "PC/SC" => Ok(Self::Pcsc),
            _ => Err(UnknownInterface(s.to_string())),
        }
    }
}

/// Identity of a discovered device.
///
/// For modems this is `model@manufacturer` as reported by `AT+CGMM` and
/// `AT+CGMI`; for cards it is the reader name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Build the `model@manufacturer` key used in declaration files.
    pub fn from_parts(model: &str, manufacturer: &str) -> Self {
        Self(format!("{model}@{manufacturer}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a declaration will accept.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchKey {
    /// Any remaining device of the declared interface kind.
    Wildcard,
    /// Exactly this identity, whatever interface it was found on.
    Exact(IdentityKey),
}

/// Error returned for a match key that cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchKeyError {
    #[error("match key is empty")]
    Empty,
    #[error("partial wildcard '{0}' is not supported, use '*@*'")]
    PartialWildcard(String),
}

impl FromStr for MatchKey {
    type Err = MatchKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        if key.is_empty() {
            return Err(MatchKeyError::Empty);
        }
        if key == WILDCARD_KEY {
            return Ok(Self::Wildcard);
        }
        if key.split('@').any(|part| part == "*") {
            return Err(MatchKeyError::PartialWildcard(key.to_string()));
        }
        Ok(Self::Exact(IdentityKey::new(key)))
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wildcard => f.write_str(WILDCARD_KEY),
            Self::Exact(key) => key.fmt(f),
        }
    }
}

/// A device the rig is expected to have attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeclaredDevice {
    pub name: String,
    pub kind: InterfaceKind,
    pub key: MatchKey,
}

impl DeclaredDevice {
    pub fn new(name: impl Into<String>, kind: InterfaceKind, key: MatchKey) -> Self {
        Self {
            name: name.into(),
            kind,
            key,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self.key, MatchKey::Wildcard)
    }
}

/// A device found during probing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredDevice {
    pub identity: IdentityKey,
    pub kind: InterfaceKind,
    /// Serial path for modems, `pcsc:<n>` for cards.
    pub connection: String,
    /// Baud rate for modems, `0` for cards.
    pub speed: String,
    pub credential: String,
}

impl DiscoveredDevice {
    /// A modem that answered at `baud_rate` on `path`.
    pub fn at_modem(identity: IdentityKey, path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            identity,
            kind: InterfaceKind::At,
            connection: path.into(),
            speed: baud_rate.to_string(),
            credential: DEFAULT_PIN.to_string(),
        }
    }

    /// The `index`-th card successfully read in this run.
    pub fn pcsc_card(identity: IdentityKey, index: usize) -> Self {
        Self {
            identity,
            kind: InterfaceKind::Pcsc,
            connection: format!("pcsc:{index}"),
            speed: "0".to_string(),
            credential: DEFAULT_PIN.to_string(),
        }
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = credential.into();
        self
    }
}

/// A declaration bound to the device that satisfied it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedDevice {
    pub name: String,
    pub connection: String,
    pub speed: String,
    pub credential: String,
}

impl ResolvedDevice {
    pub fn bind(declared: &DeclaredDevice, discovered: DiscoveredDevice) -> Self {
        Self {
            name: declared.name.clone(),
            connection: discovered.connection,
            speed: discovered.speed,
            credential: discovered.credential,
        }
    }
}

/// A declaration nothing was found for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingDevice {
    pub name: String,
    pub kind: InterfaceKind,
}

impl fmt::Display for MissingDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {} interface", self.name, self.kind)
    }
}
