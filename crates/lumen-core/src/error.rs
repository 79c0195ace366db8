// ── Core error types ──
//
// User-facing errors from lumen-core. Consumers never see raw transport
// failures: the `From<lumen_transport::Error>` impl translates link-level
// errors into domain variants (permission vs connection).

use thiserror::Error;

use crate::state_machine::DeviceStatus;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Preconditions ────────────────────────────────────────────────
    /// OS permission missing or radio disabled. Never retried.
    #[error("Permission denied: {reason}")]
    Permission { reason: String },

    // ── Connection errors ────────────────────────────────────────────
    #[error("Connection error: {reason}")]
    Connection { reason: String },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Not connected to a device")]
    NotConnected,

    #[error("A connection attempt is already in progress")]
    Busy,

    // ── Command errors ───────────────────────────────────────────────
    /// The device answered with an error token.
    #[error("Device rejected {command}: {code}")]
    Command { command: String, code: String },

    // ── Rejected at the boundary (never sent) ────────────────────────
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Cannot {operation} while device is {status}")]
    IllegalState {
        operation: String,
        status: DeviceStatus,
    },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: String,
        identifier: String,
    },

    #[error("Repository error: {message}")]
    Repository { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn validation(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for failures the retry policy applies to.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Timeout { .. } | Self::Command { .. }
        )
    }

    /// Returns `true` if the failure means the link itself is unusable.
    pub fn is_link_failure(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<lumen_transport::Error> for CoreError {
    fn from(err: lumen_transport::Error) -> Self {
        if err.is_permission() {
            return CoreError::Permission {
                reason: err.to_string(),
            };
        }
        match err {
            lumen_transport::Error::InvalidAddress { address, reason } => CoreError::Validation {
                field: "address".into(),
                reason: format!("{address}: {reason}"),
            },
            lumen_transport::Error::NotConnected => CoreError::NotConnected,
            other => CoreError::Connection {
                reason: other.to_string(),
            },
        }
    }
}
