// ── Device identity ──
//
// A `Device` is what discovery (or a config profile) produces. It is
// immutable once created; the family tag decides which wire protocol
// and which transport are used.

use serde::{Deserialize, Serialize};

use lumen_transport::{DiscoveredPeer, TransportKind};

/// Firmware family, selecting a wire protocol and a transport.
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
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum DeviceFamily {
    /// Classic Bluetooth SPP or USB-UART module speaking the line protocol.
    SerialText,
    /// BLE UART bridge speaking the line protocol.
    BleText,
    /// Network controller speaking line-delimited JSON.
    WifiJson,
    /// Serial controller speaking the framed binary protocol.
    SerialBinary,
    /// In-memory device backed by the mock transport.
    Mock,
}

impl DeviceFamily {
    /// Guess the family of a discovered peer from its channel and name.
    pub fn infer(peer: &DiscoveredPeer) -> Self {
        let name = peer.name.as_deref().unwrap_or_default().to_ascii_lowercase();
        match peer.kind {
            TransportKind::Serial if name.contains("dmx") || name.contains("binary") => {
                Self::SerialBinary
            }
            TransportKind::Serial => Self::SerialText,
            TransportKind::Ble => Self::BleText,
            TransportKind::Socket => Self::WifiJson,
            TransportKind::Mock => Self::Mock,
        }
    }
}

/// A controllable LED device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Device {
    /// Stable identifier, unique within the registry.
    pub id: String,
    pub name: String,
    /// Transport address: tty path, BLE MAC or `host:port`.
    pub address: String,
    pub family: DeviceFamily,
}

impl Device {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
        family: DeviceFamily,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.into(),
            family,
        }
    }

    /// Build a registry entry from an enumeration result. The address
    /// doubles as the id since it is what the transport resolves.
    pub fn from_peer(peer: &DiscoveredPeer) -> Self {
        let family = DeviceFamily::infer(peer);
        Self {
            id: peer.address.clone(),
            name: peer.name.clone().unwrap_or_else(|| peer.address.clone()),
            address: peer.address.clone(),
            family,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(kind: TransportKind, name: Option<&str>) -> DiscoveredPeer {
        DiscoveredPeer {
            address: "addr".into(),
            name: name.map(str::to_owned),
            kind,
            rssi: None,
        }
    }

    #[test]
    fn family_inference() {
        assert_eq!(
            DeviceFamily::infer(&peer(TransportKind::Serial, Some("HC-05"))),
            DeviceFamily::SerialText
        );
        assert_eq!(
            DeviceFamily::infer(&peer(TransportKind::Serial, Some("USB DMX Interface"))),
            DeviceFamily::SerialBinary
        );
        assert_eq!(
            DeviceFamily::infer(&peer(TransportKind::Ble, None)),
            DeviceFamily::BleText
        );
        assert_eq!(
            DeviceFamily::infer(&peer(TransportKind::Socket, Some("strip"))),
            DeviceFamily::WifiJson
        );
    }

    #[test]
    fn unnamed_peers_fall_back_to_address() {
        let device = Device::from_peer(&peer(TransportKind::Serial, None));
        assert_eq!(device.name, "addr");
        assert_eq!(device.id, "addr");
    }

    #[test]
    fn family_round_trips_through_strings() {
        assert_eq!(DeviceFamily::WifiJson.to_string(), "wifi-json");
        assert_eq!(
            "serial-binary".parse::<DeviceFamily>().ok(),
            Some(DeviceFamily::SerialBinary)
        );
    }
}
