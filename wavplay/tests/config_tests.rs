//! Configuration resolution tests
//!
//! Priority order: CLI > environment > TOML file > compiled defaults.
//!
//! Note: Uses serial_test to prevent environment variable races. Tests that
//! touch WAVPLAY_* variables are marked with #[serial].

use serial_test::serial;
use std::env;
use tempfile::TempDir;
use wavplay::config::{
    CliOverrides, PlayerConfig, TomlConfig, ENV_DEVICE, ENV_FRAMES, ENV_LATENCY_MS, ENV_LOG_LEVEL,
};
use wavplay::Error;

fn clear_env() {
    for name in [ENV_DEVICE, ENV_FRAMES, ENV_LATENCY_MS, ENV_LOG_LEVEL] {
        env::remove_var(name);
    }
}

fn file_config() -> TomlConfig {
    TomlConfig {
        device: Some("hw:1,0".to_string()),
        frames_per_period: Some(2048),
        latency_ms: Some(250),
        max_underrun_retries: Some(2),
        log_level: Some("debug".to_string()),
    }
}

#[test]
#[serial]
fn test_defaults_when_nothing_is_set() {
    clear_env();

    let config = PlayerConfig::layer(CliOverrides::default(), TomlConfig::default()).unwrap();
    assert_eq!(config, PlayerConfig::default());
}

#[test]
#[serial]
fn test_file_values_override_defaults() {
    clear_env();

    let config = PlayerConfig::layer(CliOverrides::default(), file_config()).unwrap();
    assert_eq!(config.device, "hw:1,0");
    assert_eq!(config.frames_per_period, 2048);
    assert_eq!(config.latency_ms, 250);
    assert_eq!(config.max_underrun_retries, 2);
    assert_eq!(config.log_level, "debug");
}

#[test]
#[serial]
fn test_env_overrides_file() {
    clear_env();
    env::set_var(ENV_DEVICE, "plughw:0,0");
    env::set_var(ENV_FRAMES, "256");

    let config = PlayerConfig::layer(CliOverrides::default(), file_config()).unwrap();
    assert_eq!(config.device, "plughw:0,0");
    assert_eq!(config.frames_per_period, 256);
    // Untouched by env
    assert_eq!(config.latency_ms, 250);

    clear_env();
}

#[test]
#[serial]
fn test_cli_overrides_env() {
    clear_env();
    env::set_var(ENV_DEVICE, "plughw:0,0");
    env::set_var(ENV_LATENCY_MS, "100");

    let cli = CliOverrides {
        device: Some("pulse".to_string()),
        latency_ms: Some(40),
        ..CliOverrides::default()
    };
    let config = PlayerConfig::layer(cli, file_config()).unwrap();
    assert_eq!(config.device, "pulse");
    assert_eq!(config.latency_ms, 40);

    clear_env();
}

#[test]
#[serial]
fn test_invalid_env_number_is_an_error() {
    clear_env();
    env::set_var(ENV_FRAMES, "lots");

    let result = PlayerConfig::layer(CliOverrides::default(), TomlConfig::default());
    assert!(matches!(result, Err(Error::Config(_))));

    clear_env();
}

#[test]
#[serial]
fn test_zero_frames_rejected() {
    clear_env();

    let cli = CliOverrides {
        frames_per_period: Some(0),
        ..CliOverrides::default()
    };
    let result = PlayerConfig::layer(cli, TomlConfig::default());
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_oversized_frames_rejected_from_every_source() {
    clear_env();

    let cli = CliOverrides {
        frames_per_period: Some(usize::MAX / 2),
        ..CliOverrides::default()
    };
    assert!(matches!(
        PlayerConfig::layer(cli, TomlConfig::default()),
        Err(Error::Config(_))
    ));

    env::set_var(ENV_FRAMES, "9223372036854775807");
    assert!(matches!(
        PlayerConfig::layer(CliOverrides::default(), TomlConfig::default()),
        Err(Error::Config(_))
    ));
    clear_env();

    let file = TomlConfig::from_toml_str("frames_per_period = 1000000").unwrap();
    assert!(matches!(
        PlayerConfig::layer(CliOverrides::default(), file),
        Err(Error::Config(_))
    ));
}

#[test]
#[serial]
fn test_explicit_config_file_is_loaded() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wavplay.toml");
    std::fs::write(&path, "device = \"hw:2,0\"\nlatency_ms = 120\n").unwrap();

    let cli = CliOverrides {
        config_file: Some(path),
        ..CliOverrides::default()
    };
    let config = PlayerConfig::resolve(cli).unwrap();
    assert_eq!(config.device, "hw:2,0");
    assert_eq!(config.latency_ms, 120);
    assert_eq!(config.latency_us(), 120_000);
    assert_eq!(config.frames_per_period, 512);
}

#[test]
#[serial]
fn test_missing_explicit_config_file_is_an_error() {
    clear_env();
    let dir = TempDir::new().unwrap();

    let cli = CliOverrides {
        config_file: Some(dir.path().join("absent.toml")),
        ..CliOverrides::default()
    };
    assert!(matches!(PlayerConfig::resolve(cli), Err(Error::Config(_))));
}
