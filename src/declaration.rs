//! Declaration file loader.
//!
//! One record per line, fields separated by `;`. Blank lines and `#`
//! comments are skipped; anything else that does not parse aborts the run.

use crate::config::DeclarationLayout;
use crate::device::{DeclaredDevice, IdentityKey, InterfaceKind, MatchKey, WILDCARD_KEY};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Field separator used by declaration files.
pub const DELIMITER: char = ';';

#[derive(Debug, Error)]
pub enum DeclarationError {
    #[error("Failed to read declaration file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {message}")]
    Malformed {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

/// Load and parse a declaration file.
pub fn load(
    path: impl AsRef<Path>,
    layout: DeclarationLayout,
) -> Result<Vec<DeclaredDevice>, DeclarationError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| DeclarationError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    parse(&content, layout).map_err(|(line, message)| DeclarationError::Malformed {
        path: path.to_path_buf(),
        line,
        message,
    })
}

/// Parse declaration records.
///
/// On failure returns the 1-based line number and a description.
pub fn parse(
    content: &str,
    layout: DeclarationLayout,
) -> Result<Vec<DeclaredDevice>, (usize, String)> {
    let mut devices = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split(DELIMITER).map(str::trim).collect();
        if fields.len() != 3 {
            return Err((
                index + 1,
                format!("expected 3 fields separated by '{DELIMITER}', found {}", fields.len()),
            ));
        }
        if let Some(pos) = fields.iter().position(|f| f.is_empty()) {
            return Err((index + 1, format!("field {} is empty", pos + 1)));
        }

        let device = match layout {
            DeclarationLayout::Named => parse_named(&fields),
            DeclarationLayout::Legacy => parse_legacy(&fields),
        }
        .map_err(|message| (index + 1, message))?;

        devices.push(device);
    }

    Ok(devices)
}

/// `name;interface;match_key`
fn parse_named(fields: &[&str]) -> Result<DeclaredDevice, String> {
    let kind: InterfaceKind = fields[1].parse().map_err(|e| format!("{e}"))?;
    let key: MatchKey = fields[2].parse().map_err(|e| format!("{e}"))?;
    Ok(DeclaredDevice::new(fields[0], kind, key))
}

/// `interface;manufacturer;model`, named after the derived key.
fn parse_legacy(fields: &[&str]) -> Result<DeclaredDevice, String> {
    let kind: InterfaceKind = fields[0].parse().map_err(|e| format!("{e}"))?;
    let (manufacturer, model) = (fields[1], fields[2]);

    let key = match (model, manufacturer) {
        ("*", "*") => MatchKey::Wildcard,
        ("*", _) | (_, "*") => {
            return Err(format!(
                "partial wildcard '{model}@{manufacturer}' is not supported, use '{WILDCARD_KEY}'"
            ))
        }
        _ => MatchKey::Exact(IdentityKey::from_parts(model, manufacturer)),
    };

    Ok(DeclaredDevice::new(key.to_string(), kind, key))
}
