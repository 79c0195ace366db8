// TCP transport for network-attached (Wi-Fi / Ethernet) LED controllers.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::Error;
use crate::transport::{DiscoveredPeer, TransportKind, TransportStrategy};

const READ_CHUNK: usize = 1024;

/// Plain TCP stream to `host:port`.
#[derive(Default)]
pub struct SocketTransport {
    stream: Option<TcpStream>,
}

impl SocketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn stream_mut(&mut self) -> Result<&mut TcpStream, Error> {
        self.stream.as_mut().ok_or(Error::NotConnected)
    }
}

fn validate_address(address: &str) -> Result<(), Error> {
    let Some((host, port)) = address.rsplit_once(':') else {
        return Err(Error::InvalidAddress {
            address: address.into(),
            reason: "expected host:port".into(),
        });
    };
    if host.is_empty() {
        return Err(Error::InvalidAddress {
            address: address.into(),
            reason: "missing host".into(),
        });
    }
    port.parse::<u16>().map_err(|_| Error::InvalidAddress {
        address: address.into(),
        reason: format!("invalid port '{port}'"),
    })?;
    Ok(())
}

#[async_trait]
impl TransportStrategy for SocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }

    async fn discover(&self, _window: Duration) -> Result<Vec<DiscoveredPeer>, Error> {
        // Network controllers are addressed explicitly; there is no broadcast discovery.
        debug!("socket transport has no enumeration, returning empty set");
        Ok(Vec::new())
    }

    async fn connect(&mut self, address: &str) -> Result<(), Error> {
        validate_address(address)?;
        let stream = TcpStream::connect(address)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::PermissionDenied => Error::Io(e),
                _ => Error::ConnectFailed {
                    address: address.into(),
                    reason: e.to_string(),
                },
            })?;
        stream.set_nodelay(true)?;
        debug!(address, "socket connected");
        self.stream = Some(stream);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
            debug!("socket closed");
        }
        Ok(())
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let stream = self.stream_mut()?;
        stream.write_all(bytes).await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Bytes, Error> {
        let stream = self.stream_mut()?;
        let mut buf = vec![0u8; READ_CHUNK];
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(Error::Closed);
        }
        buf.truncate(n);
        Ok(Bytes::from(buf))
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn flush_input(&mut self) -> Result<(), Error> {
        let Some(stream) = self.stream.as_ref() else {
            return Ok(());
        };
        let mut scratch = [0u8; READ_CHUNK];
        loop {
            match stream.try_read(&mut scratch) {
                Ok(0) => return Err(Error::Closed),
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
    }
}
