//! Shared configuration for lumen front ends.
//!
//! TOML device profiles, environment overrides, and translation into
//! `lumen_core::ControllerConfig` and `lumen_core::Device`. The core never
//! reads disk; everything file-related lives here.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use lumen_core::{ControllerConfig, Device, DeviceFamily, RetryPolicy, TransportSettings};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no device named '{name}' in the config")]
    UnknownDevice { name: String },

    #[error("no device given and no default_device configured")]
    NoDevice,

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Device used when the command line names none.
    pub default_device: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named device profiles.
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceProfile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Seconds per connect attempt.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Milliseconds per command round trip.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Attempts for connects and idempotent commands.
    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_history_size")]
    pub history_size: usize,

    #[serde(default = "default_true")]
    pub query_status: bool,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            connect_timeout: default_connect_timeout(),
            command_timeout_ms: default_command_timeout_ms(),
            retries: default_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            history_size: default_history_size(),
            query_status: true,
            baud_rate: default_baud_rate(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_command_timeout_ms() -> u64 {
    2000
}
fn default_retries() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_history_size() -> usize {
    50
}
fn default_true() -> bool {
    true
}
fn default_baud_rate() -> u32 {
    9600
}

/// A named device.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeviceProfile {
    /// tty path, BLE MAC or `host:port`.
    pub address: String,

    /// Firmware family: "serial-text", "ble-text", "wifi-json",
    /// "serial-binary" or "mock".
    pub family: DeviceFamily,

    /// Display name; the profile name when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Override the serial baud rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baud_rate: Option<u32>,

    /// Override the connect timeout (seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<u64>,
}

impl Config {
    /// Look up a profile by name, falling back to `default_device`.
    pub fn resolve_device(
        &self,
        name: Option<&str>,
    ) -> Result<(String, &DeviceProfile), ConfigError> {
        let name = name
            .or(self.default_device.as_deref())
            .ok_or(ConfigError::NoDevice)?;
        let profile = self
            .devices
            .get(name)
            .ok_or_else(|| ConfigError::UnknownDevice { name: name.into() })?;
        Ok((name.to_owned(), profile))
    }

    /// Add or replace a profile. The first profile added becomes the default.
    pub fn upsert_device(&mut self, name: &str, profile: DeviceProfile) -> Result<(), ConfigError> {
        validate_device_name(name)?;
        if profile.address.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "address".into(),
                reason: "must not be empty".into(),
            });
        }
        self.devices.insert(name.to_owned(), profile);
        if self.default_device.is_none() {
            self.default_device = Some(name.to_owned());
        }
        Ok(())
    }

    /// Remove a profile, clearing `default_device` if it pointed at it.
    pub fn remove_device(&mut self, name: &str) -> Result<DeviceProfile, ConfigError> {
        let profile = self
            .devices
            .remove(name)
            .ok_or_else(|| ConfigError::UnknownDevice { name: name.into() })?;
        if self.default_device.as_deref() == Some(name) {
            self.default_device = None;
        }
        Ok(profile)
    }
}

fn validate_device_name(name: &str) -> Result<(), ConfigError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::Validation {
            field: "device name".into(),
            reason: format!("'{name}' may only contain letters, digits, '-' and '_'"),
        })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("rs", "lumen", "lumen").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("lumen");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from a specific file. Missing files yield the defaults.
///
/// `LUMEN_` variables override file values; nested keys use a double
/// underscore (`LUMEN_DEFAULTS__RETRIES=5`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("LUMEN_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file is missing or broken.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

/// Build the core's `Device` for a named profile.
pub fn profile_to_device(name: &str, profile: &DeviceProfile) -> Device {
    Device::new(
        name,
        profile.label.clone().unwrap_or_else(|| name.to_owned()),
        profile.address.clone(),
        profile.family,
    )
}

/// Build a `ControllerConfig` from the defaults plus an optional
/// profile's overrides.
pub fn to_controller_config(cfg: &Config, profile: Option<&DeviceProfile>) -> ControllerConfig {
    let d = &cfg.defaults;
    let connect_timeout = profile
        .and_then(|p| p.connect_timeout)
        .unwrap_or(d.connect_timeout);
    let mut transport = TransportSettings::default();
    transport.serial_baud_rate = profile.and_then(|p| p.baud_rate).unwrap_or(d.baud_rate);

    ControllerConfig {
        connect_timeout: Duration::from_secs(connect_timeout),
        command_timeout: Duration::from_millis(d.command_timeout_ms),
        retry: RetryPolicy {
            max_attempts: d.retries.max(1),
            delay: Duration::from_millis(d.retry_delay_ms),
        },
        max_history_size: d.history_size,
        query_status_on_connect: d.query_status,
        transport,
        ..ControllerConfig::default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn lamp() -> DeviceProfile {
        DeviceProfile {
            address: "/dev/ttyUSB0".into(),
            family: DeviceFamily::SerialText,
            label: Some("Desk lamp".into()),
            baud_rate: Some(115_200),
            connect_timeout: None,
        }
    }

    #[test]
    fn first_device_becomes_the_default() {
        let mut cfg = Config::default();
        cfg.upsert_device("desk", lamp()).unwrap();
        cfg.upsert_device("shelf", lamp()).unwrap();
        assert_eq!(cfg.default_device.as_deref(), Some("desk"));

        let (name, _) = cfg.resolve_device(None).unwrap();
        assert_eq!(name, "desk");
        assert!(matches!(
            cfg.resolve_device(Some("hall")),
            Err(ConfigError::UnknownDevice { .. })
        ));

        cfg.remove_device("desk").unwrap();
        assert_eq!(cfg.default_device, None);
        assert!(matches!(cfg.resolve_device(None), Err(ConfigError::NoDevice)));
    }

    #[test]
    fn bad_names_and_addresses_are_rejected() {
        let mut cfg = Config::default();
        assert!(cfg.upsert_device("desk lamp", lamp()).is_err());
        let blank = DeviceProfile {
            address: "  ".into(),
            ..lamp()
        };
        assert!(cfg.upsert_device("desk", blank).is_err());
    }

    #[test]
    fn profile_overrides_win_over_defaults() {
        let cfg = Config::default();
        let controller = to_controller_config(&cfg, Some(&lamp()));
        assert_eq!(controller.transport.serial_baud_rate, 115_200);
        assert_eq!(controller.connect_timeout, Duration::from_secs(10));
        assert_eq!(controller.retry.max_attempts, 3);

        let device = profile_to_device("desk", &lamp());
        assert_eq!(device.id, "desk");
        assert_eq!(device.name, "Desk lamp");
    }
}
