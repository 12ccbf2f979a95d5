//! PC/SC backed [`CardSystem`] built on the `pcsc` crate.

use super::card::{ApduResponse, CardChannel, CardError, CardSystem};
use pcsc::{Card, Context, Protocols, Scope, ShareMode, MAX_BUFFER_SIZE};
use std::ffi::CString;

fn transport(e: pcsc::Error) -> CardError {
    CardError::Transport(e.to_string())
}

/// Readers visible to the user-scope PC/SC context.
pub struct PcscSystem {
    context: Context,
}

impl PcscSystem {
    /// Connect to the PC/SC resource manager.
    pub fn establish() -> Result<Self, CardError> {
        let context = Context::establish(Scope::User).map_err(transport)?;
        Ok(Self { context })
    }
}

impl CardSystem for PcscSystem {
    fn readers(&self) -> Result<Vec<String>, CardError> {
        match self.context.list_readers_owned() {
            Ok(names) => Ok(names
                .into_iter()
                .map(|name| name.to_string_lossy().into_owned())
                .collect()),
            Err(pcsc::Error::NoReadersAvailable) => Ok(Vec::new()),
            Err(e) => Err(transport(e)),
        }
    }

    fn connect(&self, reader: &str) -> Result<Box<dyn CardChannel>, CardError> {
        let name = CString::new(reader)
            .map_err(|_| CardError::Transport(format!("reader name '{reader}' contains NUL")))?;
        let card = self
            .context
            .connect(&name, ShareMode::Shared, Protocols::ANY)
            .map_err(transport)?;
        Ok(Box::new(PcscChannel { card }))
    }
}

struct PcscChannel {
    card: Card,
}

impl CardChannel for PcscChannel {
    fn transmit(&mut self, apdu: &[u8]) -> Result<ApduResponse, CardError> {
        let mut buffer = [0u8; MAX_BUFFER_SIZE];
        let raw = self.card.transmit(apdu, &mut buffer).map_err(transport)?;
        ApduResponse::from_raw(raw)
    }
}
