// lumen-transport: Byte-stream channels to LED controllers (serial, socket, BLE, mock)

pub mod error;
pub mod mock;
pub mod serial;
pub mod socket;
pub mod transport;

#[cfg(feature = "ble")]
pub mod ble;

pub use error::Error;
pub use mock::{MockConnect, MockFactory, MockHandle, MockSend, MockTransport};
pub use transport::{
    DefaultTransportFactory, DiscoveredPeer, TransportFactory, TransportKind, TransportSettings,
    TransportStrategy,
};
