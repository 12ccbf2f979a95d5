//! Smart-card prober.
//!
//! Reads the ICCID of the card in every PC/SC reader with a fixed APDU
//! sequence:
//!
//! ```text
//! SELECT 3F00 (MF)      -> 61 xx
//! SELECT 2FE2 (EF ICCID) -> 61 LL
//! GET RESPONSE LL       -> FCP ... 90 00
//! READ BINARY <size>    -> ICCID 90 00
//! ```
//!
//! `<size>` comes from the file-size TLV (tag `80`) of the FCP template.

use super::{DiscoveryPool, ProbeError};
use crate::device::{DiscoveredDevice, IdentityKey, DEFAULT_PIN};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Master file identifier.
pub const MASTER_FILE: [u8; 2] = [0x3F, 0x00];

/// EF_ICCID identifier.
pub const ICCID_FILE: [u8; 2] = [0x2F, 0xE2];

/// SW1 announcing response bytes available via GET RESPONSE.
pub const SW1_RESPONSE_AVAILABLE: u8 = 0x61;

const FILE_SIZE_TAG: u8 = 0x80;
const FCP_HEADER_LEN: usize = 2;

#[derive(Debug, Error)]
pub enum CardError {
    #[error("card transport error: {0}")]
    Transport(String),

    #[error("{step} returned status {sw1:02X}{sw2:02X}")]
    Status {
        step: &'static str,
        sw1: u8,
        sw2: u8,
    },

    #[error("response APDU has {0} bytes, status word missing")]
    ShortResponse(usize),

    #[error("FCP template truncated at offset {offset} of {len}")]
    MalformedFcp { offset: usize, len: usize },

    #[error("ICCID file size {0} does not fit a short READ BINARY")]
    FileTooLarge(usize),
}

/// A response APDU split into data and status word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduResponse {
    pub data: Vec<u8>,
    pub sw1: u8,
    pub sw2: u8,
}

impl ApduResponse {
    pub fn new(data: Vec<u8>, sw1: u8, sw2: u8) -> Self {
        Self { data, sw1, sw2 }
    }

    /// Split a raw response whose last two bytes are SW1 SW2.
    pub fn from_raw(raw: &[u8]) -> Result<Self, CardError> {
        match raw {
            [data @ .., sw1, sw2] => Ok(Self::new(data.to_vec(), *sw1, *sw2)),
            _ => Err(CardError::ShortResponse(raw.len())),
        }
    }

    /// `90 00`
    pub fn is_success(&self) -> bool {
        self.sw1 == 0x90 && self.sw2 == 0x00
    }
}

/// SELECT by file identifier, asking for the FCP template.
pub fn select_file(fid: [u8; 2]) -> Vec<u8> {
    vec![0x00, 0xA4, 0x00, 0x04, 0x02, fid[0], fid[1]]
}

pub fn get_response(len: u8) -> Vec<u8> {
    vec![0x00, 0xC0, 0x00, 0x00, len]
}

/// READ BINARY of `len` bytes from offset 0.
pub fn read_binary(len: u8) -> Vec<u8> {
    vec![0x00, 0xB0, 0x00, 0x00, len]
}

/// File size announced by an FCP template.
///
/// TLVs are scanned from offset 2 (after the template tag and length). The
/// first tag `80` wins and its value is read as a big-endian integer. Without
/// one the size is 0.
pub fn fcp_file_size(fcp: &[u8]) -> Result<usize, CardError> {
    let truncated = |offset| CardError::MalformedFcp {
        offset,
        len: fcp.len(),
    };

    let mut offset = FCP_HEADER_LEN;
    while offset < fcp.len() {
        let tag = fcp[offset];
        let len = *fcp.get(offset + 1).ok_or_else(|| truncated(offset))? as usize;

        if tag == FILE_SIZE_TAG {
            let value = fcp
                .get(offset + 2..offset + 2 + len)
                .ok_or_else(|| truncated(offset))?;
            if len > std::mem::size_of::<usize>() {
                return Err(truncated(offset));
            }
            return Ok(value
                .iter()
                .fold(0usize, |size, &byte| (size << 8) | byte as usize));
        }

        offset += 2 + len;
    }

    Ok(0)
}

/// An open connection to a card.
pub trait CardChannel {
    fn transmit(&mut self, apdu: &[u8]) -> Result<ApduResponse, CardError>;
}

/// The reader enumeration side of PC/SC.
pub trait CardSystem {
    /// Names of the readers currently present.
    fn readers(&self) -> Result<Vec<String>, CardError>;

    /// Connect to the card in `reader`. Dropping the channel disconnects.
    fn connect(&self, reader: &str) -> Result<Box<dyn CardChannel>, CardError>;
}

/// Card system with no readers, used when PC/SC support is compiled out.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCardSystem;

impl CardSystem for NoCardSystem {
    fn readers(&self) -> Result<Vec<String>, CardError> {
        Ok(Vec::new())
    }

    fn connect(&self, reader: &str) -> Result<Box<dyn CardChannel>, CardError> {
        Err(CardError::Transport(format!(
            "no PC/SC support built in, cannot connect to '{reader}'"
        )))
    }
}

/// Run the ICCID read sequence on an open channel.
pub fn read_iccid(channel: &mut dyn CardChannel) -> Result<Vec<u8>, CardError> {
    let mf = channel.transmit(&select_file(MASTER_FILE))?;
    if mf.sw1 != SW1_RESPONSE_AVAILABLE {
        return Err(CardError::Status {
            step: "SELECT MF",
            sw1: mf.sw1,
            sw2: mf.sw2,
        });
    }

    let ef = channel.transmit(&select_file(ICCID_FILE))?;
    if ef.sw1 != SW1_RESPONSE_AVAILABLE {
        return Err(CardError::Status {
            step: "SELECT EF_ICCID",
            sw1: ef.sw1,
            sw2: ef.sw2,
        });
    }

    let fcp = channel.transmit(&get_response(ef.sw2))?;
    if !fcp.is_success() {
        return Err(CardError::Status {
            step: "GET RESPONSE",
            sw1: fcp.sw1,
            sw2: fcp.sw2,
        });
    }

    let size = fcp_file_size(&fcp.data)?;
    let le = u8::try_from(size).map_err(|_| CardError::FileTooLarge(size))?;

    let iccid = channel.transmit(&read_binary(le))?;
    if !iccid.is_success() {
        return Err(CardError::Status {
            step: "READ BINARY",
            sw1: iccid.sw1,
            sw2: iccid.sw2,
        });
    }

    Ok(iccid.data)
}

/// Render raw EF_ICCID content as digits (swapped BCD, `F` filler dropped).
pub fn format_iccid(raw: &[u8]) -> String {
    raw.iter()
        .flat_map(|byte| [byte & 0x0F, byte >> 4])
        .filter(|&nibble| nibble != 0x0F)
        .map(|nibble| char::from_digit(nibble as u32, 16).unwrap_or('?'))
        .collect()
}

/// Probes every PC/SC reader and registers the cards it can read.
pub struct CardProber<S> {
    system: S,
    credential: String,
}

impl<S: CardSystem> CardProber<S> {
    pub fn new(system: S) -> Self {
        Self {
            system,
            credential: DEFAULT_PIN.to_string(),
        }
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = credential.into();
        self
    }

    /// Probe all readers, returning how many cards were registered.
    ///
    /// Cards are numbered `pcsc:0`, `pcsc:1`, ... in reader order, counting
    /// only readers whose card was read successfully.
    pub fn probe_into(&self, pool: &mut DiscoveryPool) -> usize {
        let readers = match self.system.readers() {
            Ok(readers) => readers,
            Err(e) => {
                warn!("Could not enumerate card readers: {e}");
                return 0;
            }
        };
        info!(count = readers.len(), "Probing card readers");

        let mut index = 0;
        for reader in readers {
            let iccid = match self.probe_reader(&reader) {
                Ok(iccid) => iccid,
                Err(e) => {
                    warn!("Skipping card reader: {e}");
                    continue;
                }
            };

            let device = DiscoveredDevice::pcsc_card(IdentityKey::new(&reader), index)
                .with_credential(self.credential.clone());
            if pool.insert(device) {
                info!(
                    reader = %reader,
                    connection = %format!("pcsc:{index}"),
                    "Found SIM card"
                );
                debug!(reader = %reader, iccid = %format_iccid(&iccid), "ICCID read");
                index += 1;
            } else {
                warn!(reader = %reader, "Duplicate reader name, card ignored");
            }
        }

        index
    }

    fn probe_reader(&self, reader: &str) -> Result<Vec<u8>, ProbeError> {
        let card_error = |source| ProbeError::Card {
            reader: reader.to_string(),
            source,
        };

        let mut channel = self.system.connect(reader).map_err(card_error)?;
        read_iccid(channel.as_mut()).map_err(card_error)
    }
}
