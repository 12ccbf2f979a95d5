//! Configuration module for modem-testbench.
//!
//! TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! 1. `--config <path>` on the command line
//! 2. `MODEM_TESTBENCH_CONFIG` environment variable
//! 3. `./testbench.toml`
//! 4. `~/.config/modem-testbench/config.toml` (XDG on Linux/macOS)
//! 5. `%APPDATA%\modem-testbench\config.toml` (Windows)
//! 6. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is `MODEM_TESTBENCH_<SECTION>_<KEY>`:
//! - `MODEM_TESTBENCH_SERIAL_BAUD_RATES=9600,115200`
//! - `MODEM_TESTBENCH_RUNNER_TIMEOUT_SECS=120`
//! - `MODEM_TESTBENCH_PCSC_ENABLED=false`
//!
//! # Example
//!
//! ```toml
//! [serial]
//! globs = ["/dev/ttyUSB*"]
//! baud_rates = [115200]
//!
//! [runner]
//! timeout_secs = 300
//!
//! [declarations]
//! layout = "legacy"
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    apply_env_overrides, get_default_config_path, load_from_file, resolve_config_path, validate,
    ConfigLoader,
};
pub use schema::{
    Config, DeclarationLayout, DeclarationsConfig, LogFormat, LoggingConfig, PcscConfig,
    ProbeConfig, RunnerConfig, SerialConfig,
};
