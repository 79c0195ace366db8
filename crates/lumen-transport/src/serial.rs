// Serial line transport (USB-UART bridges, RFCOMM-bound Bluetooth SPP).

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialPortType, SerialStream};
use tracing::debug;

use crate::error::Error;
use crate::transport::{DiscoveredPeer, TransportKind, TransportStrategy};

const READ_CHUNK: usize = 256;

/// 8N1 serial line with no flow control.
pub struct SerialTransport {
    baud_rate: u32,
    port: Option<SerialStream>,
}

impl SerialTransport {
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            port: None,
        }
    }

    fn port_mut(&mut self) -> Result<&mut SerialStream, Error> {
        self.port.as_mut().ok_or(Error::NotConnected)
    }
}

#[async_trait]
impl TransportStrategy for SerialTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    async fn discover(&self, _window: Duration) -> Result<Vec<DiscoveredPeer>, Error> {
        let ports = tokio_serial::available_ports()?;
        Ok(ports
            .into_iter()
            .map(|info| {
                let name = match info.port_type {
                    SerialPortType::UsbPort(usb) => usb.product,
                    SerialPortType::BluetoothPort => Some("Bluetooth serial".into()),
                    SerialPortType::PciPort | SerialPortType::Unknown => None,
                };
                DiscoveredPeer {
                    address: info.port_name,
                    name,
                    kind: TransportKind::Serial,
                    rssi: None,
                }
            })
            .collect())
    }

    async fn connect(&mut self, address: &str) -> Result<(), Error> {
        if address.is_empty() {
            return Err(Error::InvalidAddress {
                address: address.into(),
                reason: "empty serial port path".into(),
            });
        }

        let port = tokio_serial::new(address, self.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()?;

        debug!(port = address, baud = self.baud_rate, "serial port opened");
        self.port = Some(port);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        // Dropping the stream closes the descriptor.
        if self.port.take().is_some() {
            debug!("serial port closed");
        }
        Ok(())
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let port = self.port_mut()?;
        port.write_all(bytes).await?;
        port.flush().await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Bytes, Error> {
        let port = self.port_mut()?;
        let mut buf = [0u8; READ_CHUNK];
        let n = port.read(&mut buf).await?;
        if n == 0 {
            return Err(Error::Closed);
        }
        Ok(Bytes::copy_from_slice(&buf[..n]))
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    async fn flush_input(&mut self) -> Result<(), Error> {
        if let Some(port) = self.port.as_ref() {
            port.clear(tokio_serial::ClearBuffer::Input)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn io_before_connect_is_rejected() {
        let mut transport = SerialTransport::new(9600);
        assert!(matches!(transport.send(b"STATUS\n").await, Err(Error::NotConnected)));
        assert!(matches!(transport.receive().await, Err(Error::NotConnected)));
        transport.disconnect().await.unwrap();
        transport.flush_input().await.unwrap();
    }

    #[tokio::test]
    async fn empty_path_is_an_invalid_address() {
        let mut transport = SerialTransport::new(9600);
        let err = transport.connect("").await.unwrap_err();
        assert!(matches!(err, Error::InvalidAddress { .. }));
        assert!(!transport.is_connected());
    }
}
