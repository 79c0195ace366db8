use thiserror::Error;

/// Top-level error type for the `lumen-transport` crate.
///
/// Covers every failure mode a byte channel can report: link I/O,
/// OS preconditions (permissions, missing radios), and addressing.
/// `lumen-core` maps these into domain errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Link ────────────────────────────────────────────────────────
    /// Socket or file-descriptor level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port could not be opened or configured.
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Operation requires an open link.
    #[error("Transport is not connected")]
    NotConnected,

    /// The remote end closed the channel (EOF on read).
    #[error("Connection closed by device")]
    Closed,

    /// The device refused or dropped the link during setup.
    #[error("Cannot connect to {address}: {reason}")]
    ConnectFailed { address: String, reason: String },

    // ── Addressing ──────────────────────────────────────────────────
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    // ── Preconditions ───────────────────────────────────────────────
    /// The OS denied access (Bluetooth permission, tty group, etc.)
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The radio or subsystem backing this transport is missing or off.
    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    // ── Bluetooth LE ────────────────────────────────────────────────
    #[error("Bluetooth error: {0}")]
    Ble(String),
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(e) => e.kind() != std::io::ErrorKind::PermissionDenied,
            Self::Serial(e) => !matches!(
                e.kind,
                tokio_serial::ErrorKind::NoDevice
                    | tokio_serial::ErrorKind::Io(std::io::ErrorKind::PermissionDenied)
            ),
            Self::Closed | Self::ConnectFailed { .. } | Self::Ble(_) | Self::NotConnected => true,
            Self::InvalidAddress { .. } | Self::PermissionDenied(_) | Self::Unavailable(_) => false,
        }
    }

    /// Returns `true` if the failure is an OS precondition that retrying
    /// cannot fix (missing permission, disabled radio).
    pub fn is_permission(&self) -> bool {
        match self {
            Self::PermissionDenied(_) | Self::Unavailable(_) => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::PermissionDenied,
            Self::Serial(e) => {
                e.kind == tokio_serial::ErrorKind::Io(std::io::ErrorKind::PermissionDenied)
            }
            _ => false,
        }
    }
}
