// ── Bluetooth LE transport ──
//
// GATT "serial" bridge used by most BLE LED controllers: one
// characteristic accepts writes, another notifies replies. Defaults match
// the HM-10 style FFE0/FFE1 service.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter,
    ValueNotification, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use bytes::Bytes;
use futures::FutureExt;
use futures::stream::{Stream, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Error;
use crate::transport::{DiscoveredPeer, TransportKind, TransportStrategy};

/// Largest write most BLE LED firmwares accept without a negotiated MTU.
const WRITE_CHUNK: usize = 20;

/// GATT layout of the serial bridge.
#[derive(Debug, Clone)]
pub struct BleSettings {
    pub service: Uuid,
    pub write_characteristic: Uuid,
    pub notify_characteristic: Uuid,
    /// How long to scan when resolving an address on connect.
    pub scan_window: Duration,
}

impl Default for BleSettings {
    fn default() -> Self {
        Self {
            service: Uuid::from_u128(0x0000_ffe0_0000_1000_8000_0080_5f9b_34fb),
            write_characteristic: Uuid::from_u128(0x0000_ffe1_0000_1000_8000_0080_5f9b_34fb),
            notify_characteristic: Uuid::from_u128(0x0000_ffe1_0000_1000_8000_0080_5f9b_34fb),
            scan_window: Duration::from_secs(3),
        }
    }
}

impl From<btleplug::Error> for Error {
    fn from(err: btleplug::Error) -> Self {
        match err {
            btleplug::Error::PermissionDenied => {
                Self::PermissionDenied("Bluetooth access denied by the OS".into())
            }
            btleplug::Error::NotConnected => Self::NotConnected,
            other => Self::Ble(other.to_string()),
        }
    }
}

type Notifications = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

struct Link {
    peripheral: Peripheral,
    write_char: Characteristic,
    // The stream is only `Send`; the mutex makes the transport `Sync`.
    notifications: Mutex<Notifications>,
}

pub struct BleTransport {
    settings: BleSettings,
    link: Option<Link>,
}

impl BleTransport {
    pub fn new(settings: BleSettings) -> Self {
        Self {
            settings,
            link: None,
        }
    }

    fn link_mut(&mut self) -> Result<&mut Link, Error> {
        self.link.as_mut().ok_or(Error::NotConnected)
    }
}

async fn first_adapter() -> Result<Adapter, Error> {
    let manager = Manager::new().await?;
    manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::Unavailable("no Bluetooth adapters found".into()))
}

async fn scan(adapter: &Adapter, service: Uuid, window: Duration) -> Result<Vec<Peripheral>, Error> {
    adapter
        .start_scan(ScanFilter {
            services: vec![service],
        })
        .await?;
    tokio::time::sleep(window).await;
    let peripherals = adapter.peripherals().await?;
    adapter.stop_scan().await?;
    Ok(peripherals)
}

/// Resolve the bridge characteristics on a connected peripheral and
/// subscribe to replies.
async fn open_link(
    settings: &BleSettings,
    peripheral: &Peripheral,
) -> Result<(Characteristic, Notifications), Error> {
    peripheral.discover_services().await?;

    let chars = peripheral.characteristics();
    let write_char = chars
        .iter()
        .find(|c| c.uuid == settings.write_characteristic)
        .cloned()
        .ok_or_else(|| Error::Ble("write characteristic not found".into()))?;
    let notify_char = chars
        .iter()
        .find(|c| c.uuid == settings.notify_characteristic)
        .cloned()
        .ok_or_else(|| Error::Ble("notify characteristic not found".into()))?;

    peripheral.subscribe(&notify_char).await?;
    Ok((write_char, peripheral.notifications().await?))
}

/// Discard every item the stream can yield without waiting. Returns the
/// number dropped, or `None` once the stream has ended.
fn drain_ready<S: Stream + Unpin>(stream: &mut S) -> Option<usize> {
    let mut dropped = 0;
    loop {
        match stream.next().now_or_never() {
            Some(Some(_)) => dropped += 1,
            Some(None) => return None,
            None => return Some(dropped),
        }
    }
}

#[async_trait]
impl TransportStrategy for BleTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Ble
    }

    async fn preflight(&self) -> Result<(), Error> {
        first_adapter().await.map(|_| ())
    }

    async fn discover(&self, window: Duration) -> Result<Vec<DiscoveredPeer>, Error> {
        let adapter = first_adapter().await?;
        let mut peers = Vec::new();
        for peripheral in scan(&adapter, self.settings.service, window).await? {
            let props = peripheral.properties().await?;
            peers.push(DiscoveredPeer {
                address: peripheral.address().to_string(),
                name: props.as_ref().and_then(|p| p.local_name.clone()),
                kind: TransportKind::Ble,
                rssi: props.and_then(|p| p.rssi),
            });
        }
        Ok(peers)
    }

    async fn connect(&mut self, address: &str) -> Result<(), Error> {
        let adapter = first_adapter().await?;
        let found = scan(&adapter, self.settings.service, self.settings.scan_window).await?;
        let peripheral = found
            .into_iter()
            .find(|p| p.address().to_string().eq_ignore_ascii_case(address))
            .ok_or_else(|| Error::ConnectFailed {
                address: address.into(),
                reason: "device not advertising".into(),
            })?;

        peripheral.connect().await?;
        let (write_char, notifications) = match open_link(&self.settings, &peripheral).await {
            Ok(parts) => parts,
            Err(e) => {
                if let Err(close) = peripheral.disconnect().await {
                    warn!(address, error = %close, "closing half-open BLE link failed");
                }
                return Err(e);
            }
        };

        info!(address, "BLE link established");
        self.link = Some(Link {
            peripheral,
            write_char,
            notifications: Mutex::new(notifications),
        });
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        if let Some(link) = self.link.take() {
            link.peripheral.disconnect().await?;
            debug!("BLE link closed");
        }
        Ok(())
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let link = self.link_mut()?;
        for chunk in bytes.chunks(WRITE_CHUNK) {
            link.peripheral
                .write(&link.write_char, chunk, WriteType::WithoutResponse)
                .await?;
        }
        Ok(())
    }

    async fn receive(&mut self) -> Result<Bytes, Error> {
        let link = self.link_mut()?;
        match link.notifications.get_mut().next().await {
            Some(notification) => Ok(Bytes::from(notification.value)),
            None => Err(Error::Closed),
        }
    }

    fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    async fn flush_input(&mut self) -> Result<(), Error> {
        let Some(link) = self.link.as_mut() else {
            return Ok(());
        };
        match drain_ready(link.notifications.get_mut()) {
            Some(0) => Ok(()),
            Some(dropped) => {
                debug!(dropped, "discarded stale notifications");
                Ok(())
            }
            None => Err(Error::Closed),
        }
    }
}
