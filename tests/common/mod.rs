//! Shared test utilities for modem-testbench tests.
//!
//! This module provides common test infrastructure including:
//! - Scripted modem answers for `MockPortOpener`
//! - A scripted PC/SC card system
//! - Declaration file and test program builders

#![allow(dead_code)]

use modem_testbench::probe::{ApduResponse, AtProbeSettings, CardChannel, CardError, CardSystem};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Probe settings with short timeouts so silent ports fail fast.
pub fn fast_settings() -> AtProbeSettings {
    AtProbeSettings {
        read_timeout: Duration::from_millis(5),
        exchange_timeout: Duration::from_millis(20),
        ..AtProbeSettings::default()
    }
}

/// Bytes a healthy modem sends for `AT+CGMM` followed by `AT+CGMI`.
///
/// # Example
/// ```ignore
/// let opener = MockPortOpener::new().script("/dev/ttyUSB2", 9600, &modem_answers("EC25", "Quectel"));
/// ```
pub fn modem_answers(model: &str, manufacturer: &str) -> Vec<u8> {
    format!("AT+CGMM\r\n{model}\r\n\r\nOK\r\nAT+CGMI\r\n{manufacturer}\r\n\r\nOK\r\n").into_bytes()
}

/// FCP template announcing an EF of `size` bytes.
pub fn fcp_with_size(size: u8) -> Vec<u8> {
    vec![
        0x62, 0x0E, 0x82, 0x02, 0x41, 0x21, 0x83, 0x02, 0x2F, 0xE2, 0x8A, 0x01, 0x05, 0x80, 0x01,
        size,
    ]
}

/// How a scripted reader behaves.
#[derive(Debug, Clone)]
pub enum ScriptedCard {
    /// A SIM with this raw EF_ICCID content.
    Sim(Vec<u8>),
    /// Connecting fails, e.g. an empty reader.
    NoCard,
    /// The card rejects SELECT MF.
    Rejects,
}

/// `CardSystem` over in-memory readers.
#[derive(Debug, Default)]
pub struct ScriptedCardSystem {
    readers: Vec<(String, ScriptedCard)>,
}

impl ScriptedCardSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reader(mut self, name: &str, card: ScriptedCard) -> Self {
        self.readers.push((name.to_string(), card));
        self
    }
}

impl CardSystem for ScriptedCardSystem {
    fn readers(&self) -> Result<Vec<String>, CardError> {
        Ok(self.readers.iter().map(|(name, _)| name.clone()).collect())
    }

    fn connect(&self, reader: &str) -> Result<Box<dyn CardChannel>, CardError> {
        let card = self
            .readers
            .iter()
            .find(|(name, _)| name == reader)
            .map(|(_, card)| card.clone())
            .ok_or_else(|| CardError::Transport(format!("unknown reader {reader}")))?;

        match card {
            ScriptedCard::NoCard => Err(CardError::Transport("no smart card inserted".into())),
            ScriptedCard::Rejects => Ok(Box::new(SimChannel::rejecting())),
            ScriptedCard::Sim(iccid) => Ok(Box::new(SimChannel::new(iccid))),
        }
    }
}

/// Card channel answering the ICCID read sequence.
pub struct SimChannel {
    answers: HashMap<Vec<u8>, Vec<u8>>,
    pub sent: Vec<Vec<u8>>,
}

impl SimChannel {
    pub fn new(iccid: Vec<u8>) -> Self {
        let fcp = fcp_with_size(iccid.len() as u8);
        let mut answers = HashMap::new();
        answers.insert(vec![0x00, 0xA4, 0x00, 0x04, 0x02, 0x3F, 0x00], vec![0x61, 0x1C]);
        answers.insert(
            vec![0x00, 0xA4, 0x00, 0x04, 0x02, 0x2F, 0xE2],
            vec![0x61, fcp.len() as u8],
        );
        answers.insert(
            vec![0x00, 0xC0, 0x00, 0x00, fcp.len() as u8],
            [fcp, vec![0x90, 0x00]].concat(),
        );
        answers.insert(
            vec![0x00, 0xB0, 0x00, 0x00, iccid.len() as u8],
            [iccid, vec![0x90, 0x00]].concat(),
        );
        Self {
            answers,
            sent: Vec::new(),
        }
    }

    pub fn rejecting() -> Self {
        let mut answers = HashMap::new();
        answers.insert(vec![0x00, 0xA4, 0x00, 0x04, 0x02, 0x3F, 0x00], vec![0x6A, 0x82]);
        Self {
            answers,
            sent: Vec::new(),
        }
    }
}

impl CardChannel for SimChannel {
    fn transmit(&mut self, apdu: &[u8]) -> Result<ApduResponse, CardError> {
        self.sent.push(apdu.to_vec());
        match self.answers.get(apdu) {
            Some(raw) => ApduResponse::from_raw(raw),
            // INS not supported
            None => Ok(ApduResponse::new(Vec::new(), 0x6D, 0x00)),
        }
    }
}

/// Raw EF_ICCID content of `8901410312345678901`.
pub fn sample_iccid() -> Vec<u8> {
    vec![0x98, 0x10, 0x14, 0x30, 0x21, 0x43, 0x65, 0x87, 0x09, 0xF1]
}

/// Write a declaration file into `dir`.
pub fn write_declarations(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("devices.csv");
    std::fs::write(&path, content).expect("Failed to write declaration file");
    path
}

/// Write an executable shell script into `dir`.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> String {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    {
        let mut file = std::fs::File::create(&path).expect("Failed to create script");
        writeln!(file, "#!/bin/sh").expect("Failed to write script");
        file.write_all(body.as_bytes()).expect("Failed to write script");
        file.sync_all().expect("Failed to sync script");
    }
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("Failed to chmod script");
    path.to_string_lossy().into_owned()
}
