//! Top-level error type for the harness binary.
//!
//! Per-candidate probe failures and per-invocation test failures never reach
//! this type; they are logged and recorded. Only conditions that stop the
//! whole run end up here.

use crate::config::ConfigError;
use crate::declaration::DeclarationError;
use std::path::PathBuf;
use thiserror::Error;

/// A specialized `Result` type for harness setup.
pub type HarnessResult<T> = Result<T, HarnessError>;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Declaration(#[from] DeclarationError),

    #[error("No devices declared in '{}' and no test programs given", .0.display())]
    NothingToDo(PathBuf),

    #[error("Failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("Failed to write report to '{}': {source}", path.display())]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
