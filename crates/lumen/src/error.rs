//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use lumen_config::ConfigError;
use lumen_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const STATE: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const DEVICE: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the device: {reason}")]
    #[diagnostic(
        code(lumen::connection_failed),
        help(
            "Check that the device is powered and in range, and that the\n\
             address and family in its profile are right.\n\
             Try: lumen scan"
        )
    )]
    ConnectionFailed { reason: String },

    #[error("Permission denied: {reason}")]
    #[diagnostic(
        code(lumen::permission),
        help(
            "Serial ports usually need membership of the `dialout` group;\n\
             Bluetooth needs the adapter switched on."
        )
    )]
    Permission { reason: String },

    #[error("{operation} timed out after {millis}ms")]
    #[diagnostic(
        code(lumen::timeout),
        help("Increase the timeout with --timeout or check the device is responsive.")
    )]
    Timeout { operation: String, millis: u64 },

    // ── Device ───────────────────────────────────────────────────────
    #[error("Device rejected {command} ({code})")]
    #[diagnostic(code(lumen::device_rejected))]
    DeviceRejected { command: String, code: String },

    #[error("{message}")]
    #[diagnostic(code(lumen::illegal_state))]
    IllegalState { message: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(code(lumen::not_found), help("Run: {list_command}"))]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(lumen::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("No device selected")]
    #[diagnostic(
        code(lumen::no_device),
        help(
            "Pass --device, or --address with --family, or add a profile:\n\
             lumen config add-device desk --at /dev/ttyUSB0 --kind serial-text\n\
             Config file: {path}"
        )
    )]
    NoDevice { path: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(lumen::config))]
    Config { message: String },

    #[error("Internal error: {message}")]
    #[diagnostic(code(lumen::internal))]
    Internal { message: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not render JSON: {0}")]
    #[diagnostic(code(lumen::json))]
    Json(#[from] serde_json::Error),

    #[error("Could not render YAML: {0}")]
    #[diagnostic(code(lumen::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Permission { .. } => exit_code::PERMISSION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::DeviceRejected { .. } => exit_code::DEVICE,
            Self::IllegalState { .. } => exit_code::STATE,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } | Self::NoDevice { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

fn list_command(entity_type: &str) -> String {
    match entity_type {
        "device" => "lumen devices".into(),
        "preset" => "`presets` inside lumen shell".into(),
        "snapshot" => "`snapshots` inside lumen shell".into(),
        other => format!("lumen {other}s"),
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Permission { reason } => CliError::Permission { reason },
            CoreError::Connection { reason } => CliError::ConnectionFailed { reason },
            CoreError::Timeout {
                operation,
                timeout_ms,
            } => CliError::Timeout {
                operation,
                millis: timeout_ms,
            },
            e @ (CoreError::NotConnected | CoreError::Busy | CoreError::IllegalState { .. }) => {
                CliError::IllegalState {
                    message: e.to_string(),
                }
            }
            CoreError::Command { command, code } => CliError::DeviceRejected { command, code },
            CoreError::Validation { field, reason } => CliError::Validation { field, reason },
            CoreError::NotFound {
                entity_type,
                identifier,
            } => CliError::NotFound {
                list_command: list_command(&entity_type),
                resource_type: entity_type,
                identifier,
            },
            CoreError::Config { message } => CliError::Config { message },
            CoreError::Repository { message } | CoreError::Internal(message) => {
                CliError::Internal { message }
            }
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::UnknownDevice { name } => CliError::NotFound {
                resource_type: "device".into(),
                identifier: name,
                list_command: list_command("device"),
            },
            ConfigError::NoDevice => CliError::NoDevice {
                path: lumen_config::config_path().display().to_string(),
            },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use lumen_core::DeviceStatus;

    use super::*;

    #[test]
    fn core_errors_keep_their_exit_codes() {
        let cases = [
            (
                CoreError::Permission {
                    reason: "bluetooth off".into(),
                },
                exit_code::PERMISSION,
            ),
            (
                CoreError::Timeout {
                    operation: "connect".into(),
                    timeout_ms: 10_000,
                },
                exit_code::TIMEOUT,
            ),
            (
                CoreError::IllegalState {
                    operation: "set color #ffffff".into(),
                    status: DeviceStatus::Error,
                },
                exit_code::STATE,
            ),
            (
                CoreError::Command {
                    command: "PRESET disco".into(),
                    code: "E_NO_PRESET".into(),
                },
                exit_code::DEVICE,
            ),
            (
                CoreError::Internal("session gone".into()),
                exit_code::GENERAL,
            ),
        ];
        for (core, code) in cases {
            assert_eq!(CliError::from(core).exit_code(), code);
        }
    }
}
