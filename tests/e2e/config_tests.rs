//! E2E tests for configuration and declaration files on disk.

use crate::common::write_declarations;
use modem_testbench::config::{
    apply_env_overrides, load_from_file, validate, ConfigError, ConfigLoader, DeclarationLayout,
};
use modem_testbench::declaration::{self, DeclarationError};
use modem_testbench::device::{InterfaceKind, MatchKey};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::time::Duration;
use tempfile::TempDir;

#[test]
#[serial]
fn test_explicit_config_file_is_loaded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rig.toml");
    std::fs::write(
        &path,
        r#"
[serial]
globs = ["/dev/ttyUSB*"]
baud_rates = [115200]

[runner]
timeout_secs = 120

[declarations]
layout = "legacy"
"#,
    )
    .unwrap();

    let loader = ConfigLoader::load(Some(path.as_path())).unwrap();

    assert_eq!(loader.config_path.as_deref(), Some(path.as_path()));
    let config = loader.config();
    assert_eq!(config.serial.baud_rates, vec![115200]);
    assert_eq!(config.serial.globs, vec!["/dev/ttyUSB*".to_string()]);
    assert_eq!(config.runner.timeout(), Duration::from_secs(120));
    assert_eq!(config.declarations.layout, DeclarationLayout::Legacy);
    // Untouched sections keep their defaults.
    assert!(config.pcsc.enabled);
    assert_eq!(config.probe.default_pin, "0000");
}

#[test]
#[serial]
fn test_missing_explicit_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    let err = ConfigLoader::load(Some(dir.path().join("nope.toml").as_path())).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound(_)));
}

#[test]
fn test_invalid_toml_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[serial\nbaud_rates = ").unwrap();

    assert!(matches!(
        load_from_file(&path),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn test_empty_baud_list_fails_validation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.toml");
    std::fs::write(&path, "[serial]\nbaud_rates = []\n").unwrap();

    let config = load_from_file(&path).unwrap();
    assert!(matches!(
        validate(&config),
        Err(ConfigError::ValidationError { .. })
    ));
}

#[test]
fn test_env_overrides_beat_file_values() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rig.toml");
    std::fs::write(&path, "[runner]\ntimeout_secs = 120\n").unwrap();
    let mut config = load_from_file(&path).unwrap();

    apply_env_overrides(&mut config, |var| match var {
        "MODEM_TESTBENCH_RUNNER_TIMEOUT_SECS" => Some("30".to_string()),
        "MODEM_TESTBENCH_PCSC_ENABLED" => Some("off".to_string()),
        _ => None,
    })
    .unwrap();

    assert_eq!(config.runner.timeout_secs, 30);
    assert!(!config.pcsc.enabled);
}

#[test]
fn test_declaration_file_named_layout() {
    let dir = TempDir::new().unwrap();
    let path = write_declarations(
        dir.path(),
        "# bench 2\nlte;AT;EC25@Quectel\n\nsim;PCSC;*@*\n",
    );

    let devices = declaration::load(&path, DeclarationLayout::Named).unwrap();

    let summary: Vec<_> = devices
        .iter()
        .map(|d| (d.name.as_str(), d.kind, d.key.to_string()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("lte", InterfaceKind::At, "EC25@Quectel".to_string()),
            ("sim", InterfaceKind::Pcsc, "*@*".to_string()),
        ]
    );
    assert_eq!(devices[1].key, MatchKey::Wildcard);
}

#[test]
fn test_malformed_declaration_names_line() {
    let dir = TempDir::new().unwrap();
    let path = write_declarations(dir.path(), "lte;AT;EC25@Quectel\nbroken;AT\n");

    let err = declaration::load(&path, DeclarationLayout::Named).unwrap_err();

    match err {
        DeclarationError::Malformed { line, .. } => assert_eq!(line, 2),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_unreadable_declaration_file() {
    let dir = TempDir::new().unwrap();
    let err = declaration::load(dir.path().join("absent.csv"), DeclarationLayout::Named)
        .unwrap_err();
    assert!(matches!(err, DeclarationError::Read { .. }));
}
