//! Player configuration
//!
//! Each setting is resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`WAVPLAY_*`)
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::device::DEFAULT_DEVICE;
use crate::error::{Error, Result};
use crate::sink::{DEFAULT_PERIOD_FRAMES, MAX_PERIOD_FRAMES};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

pub const ENV_DEVICE: &str = "WAVPLAY_DEVICE";
pub const ENV_FRAMES: &str = "WAVPLAY_FRAMES";
pub const ENV_LATENCY_MS: &str = "WAVPLAY_LATENCY_MS";
pub const ENV_LOG_LEVEL: &str = "WAVPLAY_LOG_LEVEL";

/// Default device buffer latency in milliseconds
pub const DEFAULT_LATENCY_MS: u32 = 500;

/// Longest device buffer latency accepted (10 s)
pub const MAX_LATENCY_MS: u32 = 10_000;

/// Consecutive underruns tolerated on the same chunk before giving up
pub const DEFAULT_MAX_UNDERRUN_RETRIES: u32 = 16;

/// Resolved player settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerConfig {
    /// Playback device identifier
    pub device: String,
    /// Frames per write (and device period)
    pub frames_per_period: usize,
    /// Target device buffer latency
    pub latency_ms: u32,
    pub max_underrun_retries: u32,
    /// Default tracing filter when RUST_LOG is unset
    pub log_level: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            frames_per_period: DEFAULT_PERIOD_FRAMES,
            latency_ms: DEFAULT_LATENCY_MS,
            max_underrun_retries: DEFAULT_MAX_UNDERRUN_RETRIES,
            log_level: "info".to_string(),
        }
    }
}

/// Contents of the optional TOML config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    pub device: Option<String>,
    pub frames_per_period: Option<usize>,
    pub latency_ms: Option<u32>,
    pub max_underrun_retries: Option<u32>,
    pub log_level: Option<String>,
}

impl TomlConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config file: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub device: Option<String>,
    pub frames_per_period: Option<usize>,
    pub latency_ms: Option<u32>,
    pub log_level: Option<String>,
    /// Explicit config file; must exist when given
    pub config_file: Option<PathBuf>,
}

impl PlayerConfig {
    /// Resolve configuration from CLI, environment, config file and defaults.
    ///
    /// A missing default config file is not an error; a missing explicit one is.
    pub fn resolve(cli: CliOverrides) -> Result<Self> {
        let file = match cli.config_file.as_deref() {
            Some(path) => TomlConfig::load(path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => {
                    debug!("Loading config file {}", path.display());
                    TomlConfig::load(&path)?
                }
                None => TomlConfig::default(),
            },
        };
        Self::layer(cli, file)
    }

    /// Merge CLI values, environment and an already loaded config file
    pub fn layer(cli: CliOverrides, file: TomlConfig) -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            device: cli
                .device
                .or_else(|| env_value(ENV_DEVICE))
                .or(file.device)
                .unwrap_or(defaults.device),
            frames_per_period: pick(cli.frames_per_period, ENV_FRAMES, file.frames_per_period)?
                .unwrap_or(defaults.frames_per_period),
            latency_ms: pick(cli.latency_ms, ENV_LATENCY_MS, file.latency_ms)?
                .unwrap_or(defaults.latency_ms),
            max_underrun_retries: file
                .max_underrun_retries
                .unwrap_or(defaults.max_underrun_retries),
            log_level: cli
                .log_level
                .or_else(|| env_value(ENV_LOG_LEVEL))
                .or(file.log_level)
                .unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.device.trim().is_empty() {
            return Err(Error::Config("device identifier must not be empty".to_string()));
        }
        if self.frames_per_period == 0 {
            return Err(Error::Config("frames_per_period must be at least 1".to_string()));
        }
        if self.frames_per_period > MAX_PERIOD_FRAMES {
            return Err(Error::Config(format!(
                "frames_per_period must be at most {}, got {}",
                MAX_PERIOD_FRAMES, self.frames_per_period
            )));
        }
        if self.latency_ms == 0 {
            return Err(Error::Config("latency_ms must be at least 1".to_string()));
        }
        if self.latency_ms > MAX_LATENCY_MS {
            return Err(Error::Config(format!(
                "latency_ms must be at most {}, got {}",
                MAX_LATENCY_MS, self.latency_ms
            )));
        }
        Ok(())
    }

    /// Latency target in microseconds, as the sink expects it
    pub fn latency_us(&self) -> u32 {
        self.latency_ms.saturating_mul(1000)
    }
}

/// Platform config file location (`<config dir>/wavplay/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("wavplay").join("config.toml"))
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn pick<T: FromStr>(cli: Option<T>, env_name: &str, file: Option<T>) -> Result<Option<T>> {
    if cli.is_some() {
        return Ok(cli);
    }
    if let Some(raw) = env_value(env_name) {
        return raw.trim().parse().map(Some).map_err(|_| {
            warn!("Ignoring invalid {}={}", env_name, raw);
            Error::Config(format!("{} is not a valid number: {}", env_name, raw))
        });
    }
    Ok(file)
}
