// ── Transport strategy ──
//
// Uniform connect / send / receive / disconnect contract over
// heterogeneous byte channels. Transports are the only place raw I/O
// happens; everything above them speaks in frames and commands.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::serial::SerialTransport;
use crate::socket::SocketTransport;

// ── TransportKind ────────────────────────────────────────────────────

/// Which channel family a transport speaks.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TransportKind {
    /// Classic serial line: USB-UART, RFCOMM-bound Bluetooth SPP.
    Serial,
    /// Bluetooth Low Energy GATT serial service.
    Ble,
    /// TCP socket (Wi-Fi controllers).
    Socket,
    /// In-memory loopback for tests and demos.
    Mock,
}

// ── DiscoveredPeer ───────────────────────────────────────────────────

/// A device seen during enumeration, before any connection is made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredPeer {
    /// Address the transport can connect to (tty path, BLE MAC, host:port).
    pub address: String,
    /// Advertised or product name, if the channel reports one.
    pub name: Option<String>,
    pub kind: TransportKind,
    /// Signal strength for radio transports.
    pub rssi: Option<i16>,
}

// ── TransportStrategy ────────────────────────────────────────────────

/// A connectable byte channel to one device.
///
/// Implementations own the link exclusively; the caller serializes
/// operations (one in flight per instance). `receive` returns whatever
/// chunk the link delivers next, so callers must reassemble frames.
#[async_trait]
pub trait TransportStrategy: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// OS-level preconditions (permissions, radio enabled). Called once
    /// before the first connect attempt.
    async fn preflight(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Enumerate reachable devices for at most `window`.
    async fn discover(&self, window: Duration) -> Result<Vec<DiscoveredPeer>, Error>;

    async fn connect(&mut self, address: &str) -> Result<(), Error>;

    async fn disconnect(&mut self) -> Result<(), Error>;

    async fn send(&mut self, bytes: &[u8]) -> Result<(), Error>;

    async fn receive(&mut self) -> Result<Bytes, Error>;

    fn is_connected(&self) -> bool;

    /// Drop any input already buffered on the link.
    async fn flush_input(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

// ── Factory ──────────────────────────────────────────────────────────

/// Tuning shared by the transports the default factory builds.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub serial_baud_rate: u32,
    #[cfg(feature = "ble")]
    pub ble: crate::ble::BleSettings,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            serial_baud_rate: 9600,
            #[cfg(feature = "ble")]
            ble: crate::ble::BleSettings::default(),
        }
    }
}

/// Builds a fresh transport for a given kind.
pub trait TransportFactory: Send + Sync {
    fn create(&self, kind: TransportKind) -> Result<Box<dyn TransportStrategy>, Error>;
}

/// Factory for the real hardware transports.
#[derive(Debug, Clone, Default)]
pub struct DefaultTransportFactory {
    settings: TransportSettings,
}

impl DefaultTransportFactory {
    pub fn new(settings: TransportSettings) -> Self {
        Self { settings }
    }
}

impl TransportFactory for DefaultTransportFactory {
    fn create(&self, kind: TransportKind) -> Result<Box<dyn TransportStrategy>, Error> {
        match kind {
            TransportKind::Serial => Ok(Box::new(SerialTransport::new(
                self.settings.serial_baud_rate,
            ))),
            TransportKind::Socket => Ok(Box::new(SocketTransport::new())),
            #[cfg(feature = "ble")]
            TransportKind::Ble => Ok(Box::new(crate::ble::BleTransport::new(
                self.settings.ble.clone(),
            ))),
            #[cfg(not(feature = "ble"))]
            TransportKind::Ble => Err(Error::Unavailable(
                "built without Bluetooth LE support (enable the `ble` feature)".into(),
            )),
            TransportKind::Mock => Err(Error::Unavailable(
                "mock transports are created through MockFactory".into(),
            )),
        }
    }
}
