//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Config, DeclarationLayout, LogFormat};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "MODEM_TESTBENCH";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "MODEM_TESTBENCH_CONFIG";

/// Config file looked up in the working directory
const LOCAL_CONFIG_FILE: &str = "testbench.toml";

/// Config file name inside the per-user config directory
const CONFIG_FILE_NAME: &str = "config.toml";

/// Directory name under the per-user config directory
const APP_DIR: &str = "modem-testbench";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `explicit` (the `--config` flag); must exist
    /// 2. `MODEM_TESTBENCH_CONFIG` environment variable
    /// 3. `./testbench.toml`
    /// 4. `$XDG_CONFIG_HOME/modem-testbench/config.toml` (or `%APPDATA%` on Windows)
    /// 5. Built-in defaults
    ///
    /// Environment variables override file values, and the result is validated.
    pub fn load(explicit: Option<&Path>) -> ConfigResult<Self> {
        let config_path = match explicit {
            Some(path) if !path.exists() => return Err(ConfigError::NotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => resolve_config_path(),
        };

        let mut config = match config_path {
            Some(ref path) => load_from_file(path)?,
            None => Config::default(),
        };

        apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
        validate(&config)?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(&self.config)?)
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let cwd_config = PathBuf::from(LOCAL_CONFIG_FILE);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    get_default_config_path().filter(|path| path.exists())
}

/// Get the platform-specific config directory.
fn get_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}

/// Default per-user config file path.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE_NAME))
}

/// Load configuration from a file.
pub fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

fn parse_var<T: FromStr>(var: &str, value: &str, what: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse(var, format!("Invalid {what}")))
}

fn parse_list<T: FromStr>(var: &str, value: &str, what: &str) -> ConfigResult<Vec<T>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|item| parse_var(var, item, what))
        .collect()
}

fn parse_bool(var: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::env_parse(var, "Invalid boolean")),
    }
}

/// Apply environment variable overrides to the configuration.
///
/// Variables follow the pattern `MODEM_TESTBENCH_<SECTION>_<KEY>`, e.g.
/// `MODEM_TESTBENCH_SERIAL_BAUD_RATES=115200,9600` or
/// `MODEM_TESTBENCH_RUNNER_TIMEOUT_SECS=60`. List values are comma separated.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| format!("{ENV_PREFIX}_{key}");

    // Serial overrides
    let name = var("SERIAL_GLOBS");
    if let Some(val) = lookup(&name) {
        config.serial.globs = parse_list(&name, &val, "glob pattern")?;
    }
    let name = var("SERIAL_BAUD_RATES");
    if let Some(val) = lookup(&name) {
        config.serial.baud_rates = parse_list(&name, &val, "baud rate")?;
    }
    let name = var("SERIAL_READ_TIMEOUT_MS");
    if let Some(val) = lookup(&name) {
        config.serial.read_timeout_ms = parse_var(&name, &val, "timeout")?;
    }
    let name = var("SERIAL_EXCHANGE_TIMEOUT_MS");
    if let Some(val) = lookup(&name) {
        config.serial.exchange_timeout_ms = parse_var(&name, &val, "timeout")?;
    }

    let name = var("PCSC_ENABLED");
    if let Some(val) = lookup(&name) {
        config.pcsc.enabled = parse_bool(&name, &val)?;
    }

    // Probe overrides
    let name = var("PROBE_PARALLEL");
    if let Some(val) = lookup(&name) {
        config.probe.parallel = parse_bool(&name, &val)?;
    }
    if let Some(val) = lookup(&var("PROBE_DEFAULT_PIN")) {
        config.probe.default_pin = val;
    }

    // Runner overrides
    let name = var("RUNNER_TIMEOUT_SECS");
    if let Some(val) = lookup(&name) {
        config.runner.timeout_secs = parse_var(&name, &val, "timeout")?;
    }
    let name = var("RUNNER_KILL_GRACE_MS");
    if let Some(val) = lookup(&name) {
        config.runner.kill_grace_ms = parse_var(&name, &val, "grace period")?;
    }

    let name = var("DECLARATIONS_LAYOUT");
    if let Some(val) = lookup(&name) {
        config.declarations.layout = match val.trim().to_ascii_lowercase().as_str() {
            "named" => DeclarationLayout::Named,
            "legacy" => DeclarationLayout::Legacy,
            _ => return Err(ConfigError::env_parse(name, "Expected 'named' or 'legacy'")),
        };
    }

    // Logging overrides
    if let Some(val) = lookup(&var("LOGGING_LEVEL")) {
        config.logging.level = val;
    }
    let name = var("LOGGING_FORMAT");
    if let Some(val) = lookup(&name) {
        config.logging.format = match val.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => {
                return Err(ConfigError::env_parse(
                    name,
                    "Expected 'json', 'pretty' or 'compact'",
                ))
            }
        };
    }

    Ok(())
}

/// Reject configurations the probers or the runner cannot work with.
pub fn validate(config: &Config) -> ConfigResult<()> {
    if config.serial.baud_rates.is_empty() {
        return Err(ConfigError::validation(
            "serial.baud_rates",
            "at least one baud rate is required",
        ));
    }
    if config.serial.baud_rates.contains(&0) {
        return Err(ConfigError::validation(
            "serial.baud_rates",
            "baud rate must be positive",
        ));
    }
    if config.serial.exchange_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "serial.exchange_timeout_ms",
            "must be greater than zero",
        ));
    }
    if config.runner.timeout_secs == 0 {
        return Err(ConfigError::validation(
            "runner.timeout_secs",
            "must be greater than zero",
        ));
    }
    Ok(())
}
