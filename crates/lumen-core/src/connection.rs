// ── Connection management ──
//
// Owns the device registry, the one live transport, and the connection
// state. Connects and sends race a timeout and retry with a constant
// delay; only one connect may be in flight, and the link mutex
// serializes sends so two writes never interleave on the channel.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use bytes::BytesMut;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use lumen_transport::{TransportFactory, TransportKind, TransportStrategy};

use crate::config::ControllerConfig;
use crate::error::CoreError;
use crate::event::ControllerEvent;
use crate::model::Device;
use crate::protocol::{self, Command, CommandResult, DeviceAdapter, WireCommand};

// ── ConnectionState ─────────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Error(reason) => write!(f, "error: {reason}"),
        }
    }
}

// ── Link ────────────────────────────────────────────────────────────

/// The live transport plus the adapter chosen for it at connect time.
struct Link {
    transport: Box<dyn TransportStrategy>,
    adapter: Arc<dyn DeviceAdapter>,
    device: Arc<Device>,
    rx_buf: BytesMut,
    /// Set after a failed or abandoned exchange; a late reply may still
    /// be in flight, so input is flushed before the next write.
    dirty: bool,
}

impl Link {
    async fn exchange(
        &mut self,
        wire: &WireCommand,
    ) -> Result<CommandResult, lumen_transport::Error> {
        self.transport.send(wire.as_bytes()).await?;
        loop {
            if let Some(frame) = self.adapter.next_frame(&mut self.rx_buf) {
                return Ok(self.adapter.decode(&frame));
            }
            let chunk = self.transport.receive().await?;
            self.rx_buf.extend_from_slice(&chunk);
        }
    }

    async fn resync(&mut self) {
        self.rx_buf.clear();
        if let Err(e) = self.transport.flush_input().await {
            debug!(error = %e, "flushing stale input failed");
        }
        self.dirty = false;
    }
}

/// Clears the in-flight flag on drop.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ── ConnectionManager ───────────────────────────────────────────────

pub struct ConnectionManager {
    config: ControllerConfig,
    factory: Arc<dyn TransportFactory>,
    link: Mutex<Option<Link>>,
    state: watch::Sender<ConnectionState>,
    connecting: AtomicBool,
    registry: DashMap<String, Arc<Device>>,
    /// Device of the current or most recent connection.
    active: ArcSwapOption<Device>,
    events: broadcast::Sender<Arc<ControllerEvent>>,
}

impl ConnectionManager {
    pub fn new(
        config: ControllerConfig,
        factory: Arc<dyn TransportFactory>,
        events: broadcast::Sender<Arc<ControllerEvent>>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            factory,
            link: Mutex::new(None),
            state,
            connecting: AtomicBool::new(false),
            registry: DashMap::new(),
            active: ArcSwapOption::empty(),
            events,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn current_state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn is_connecting(&self) -> bool {
        self.connecting.load(Ordering::Acquire)
    }

    pub fn active_device(&self) -> Option<Arc<Device>> {
        self.active.load_full()
    }

    fn set_state(&self, next: ConnectionState) {
        debug!(state = %next, "connection state");
        self.state.send_replace(next);
    }

    fn emit(&self, event: ControllerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(Arc::new(event));
    }

    // ── Connect / disconnect ────────────────────────────────────────

    /// Connect to `device`, retrying per the configured policy.
    ///
    /// Permission failures abort immediately and leave the manager
    /// `Disconnected`. Exhausting the retries leaves it in `Error` and
    /// emits `ConnectionError`. A second call while one is in flight is
    /// rejected with `Busy`.
    pub async fn connect(&self, device: Arc<Device>) -> Result<(), CoreError> {
        let _in_flight = InFlight::acquire(&self.connecting).ok_or(CoreError::Busy)?;

        if self.link.lock().await.is_some() {
            self.disconnect().await;
        }

        let kind = protocol::auto_select(&device);
        let mut transport = self.factory.create(kind)?;
        self.registry
            .entry(device.id.clone())
            .or_insert_with(|| device.clone());
        self.active.store(Some(device.clone()));
        self.set_state(ConnectionState::Connecting);

        if let Err(e) = transport.preflight().await {
            let err = match CoreError::from(e) {
                err @ CoreError::Permission { .. } => err,
                other => CoreError::Permission {
                    reason: other.to_string(),
                },
            };
            warn!(device = %device.name, error = %err, "preflight failed");
            return Err(self.abort_connect(err));
        }

        let attempts = self.config.retry.max_attempts.max(1);
        let mut last = CoreError::Internal("no connect attempt made".into());

        for attempt in 1..=attempts {
            debug!(attempt, attempts, address = %device.address, %kind, "connecting");
            let outcome = timeout(
                self.config.connect_timeout,
                transport.connect(&device.address),
            )
            .await;

            let err = match outcome {
                Ok(Ok(())) => {
                    self.install(transport, device).await;
                    return Ok(());
                }
                Ok(Err(e)) => CoreError::from(e),
                Err(_) => CoreError::Timeout {
                    operation: "connect".into(),
                    timeout_ms: millis(self.config.connect_timeout),
                },
            };

            if !err.is_retryable() {
                warn!(device = %device.name, error = %err, "connect aborted");
                return Err(self.abort_connect(err));
            }

            warn!(attempt, attempts, error = %err, "connect attempt failed");
            last = err;
            if attempt < attempts {
                sleep(self.config.retry.delay).await;
            }
        }

        self.set_state(ConnectionState::Error(last.to_string()));
        self.emit(ControllerEvent::ConnectionError {
            reason: last.to_string(),
        });
        Err(last)
    }

    fn abort_connect(&self, err: CoreError) -> CoreError {
        self.set_state(ConnectionState::Disconnected);
        self.emit(ControllerEvent::ConnectionError {
            reason: err.to_string(),
        });
        err
    }

    async fn install(&self, transport: Box<dyn TransportStrategy>, device: Arc<Device>) {
        let adapter = protocol::adapter_for(device.family);
        info!(
            device = %device.name,
            address = %device.address,
            adapter = adapter.name(),
            "connected"
        );
        *self.link.lock().await = Some(Link {
            transport,
            adapter,
            device: device.clone(),
            rx_buf: BytesMut::new(),
            dirty: false,
        });
        self.set_state(ConnectionState::Connected);
        self.emit(ControllerEvent::Connected { device });
    }

    /// Close the link. Always ends `Disconnected`; a transport error
    /// while closing is logged, not returned.
    pub async fn disconnect(&self) {
        let link = self.link.lock().await.take();
        let was = self.current_state();

        let device = match link {
            Some(mut link) => {
                if let Err(e) = link.transport.disconnect().await {
                    warn!(error = %e, "transport reported an error while disconnecting");
                }
                Some(link.device)
            }
            None => None,
        };

        if device.is_some() || was != ConnectionState::Disconnected {
            self.set_state(ConnectionState::Disconnected);
            info!("disconnected");
            self.emit(ControllerEvent::Disconnected {
                device: device.or_else(|| self.active_device()),
            });
        }
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Send one command and wait for its reply.
    ///
    /// Each attempt races `command_timeout`. Idempotent commands are
    /// retried; a persistent device error comes back as
    /// `CoreError::Command` with the link intact, while exhausted link
    /// failures move the manager to `Error` and drop the transport.
    pub async fn send(&self, command: &Command) -> Result<CommandResult, CoreError> {
        let mut guard = self.link.lock().await;
        if !self.state.borrow().is_connected() {
            return Err(CoreError::NotConnected);
        }
        let Some(link) = guard.as_mut() else {
            return Err(CoreError::NotConnected);
        };

        let wire = link.adapter.encode(command);
        let attempts = self.config.retry.attempts_for(command.is_idempotent());
        let mut last = CoreError::Internal("no send attempt made".into());

        for attempt in 1..=attempts {
            if link.dirty {
                link.resync().await;
            }
            debug!(%command, attempt, wire = %wire.to_text().trim_end(), "send");

            let err = match timeout(self.config.command_timeout, link.exchange(&wire)).await {
                Ok(Ok(result)) if result.success => return Ok(result),
                Ok(Ok(result)) => CoreError::Command {
                    command: command.to_string(),
                    code: result.error.unwrap_or_else(|| "unknown".into()),
                },
                // The link is installed, so the transport dropping out
                // underneath it is a link failure, not a caller error.
                Ok(Err(lumen_transport::Error::NotConnected)) => CoreError::Connection {
                    reason: "link lost".into(),
                },
                Ok(Err(e)) => CoreError::from(e),
                Err(_) => CoreError::Timeout {
                    operation: command.to_string(),
                    timeout_ms: millis(self.config.command_timeout),
                },
            };
            link.dirty = true;

            if !err.is_retryable() {
                return Err(err);
            }
            warn!(%command, attempt, attempts, error = %err, "command attempt failed");
            last = err;
            if attempt < attempts {
                sleep(self.config.retry.delay).await;
            }
        }

        if last.is_link_failure() {
            if let Some(mut link) = guard.take() {
                if let Err(e) = link.transport.disconnect().await {
                    debug!(error = %e, "closing failed link");
                }
            }
            self.set_state(ConnectionState::Error(last.to_string()));
            self.emit(ControllerEvent::ConnectionError {
                reason: last.to_string(),
            });
        }
        Err(last)
    }

    // ── Registry ────────────────────────────────────────────────────

    /// Enumerate devices on one transport and refresh the registry.
    ///
    /// Devices previously found on the same transport are replaced; the
    /// active device and devices on other transports are kept.
    pub async fn scan(&self, kind: TransportKind) -> Result<Vec<Arc<Device>>, CoreError> {
        let transport = self.factory.create(kind)?;
        transport.preflight().await.map_err(|e| match CoreError::from(e) {
            err @ CoreError::Permission { .. } => err,
            other => CoreError::Permission {
                reason: other.to_string(),
            },
        })?;

        let window = self.config.discovery_window;
        let peers = timeout(window + Duration::from_secs(1), transport.discover(window))
            .await
            .map_err(|_| CoreError::Timeout {
                operation: format!("{kind} scan"),
                timeout_ms: millis(window),
            })??;

        let active = self.active_device().map(|d| d.id.clone());
        self.registry.retain(|id, device| {
            Some(id) == active.as_ref() || protocol::auto_select(device) != kind
        });

        let found: Vec<Arc<Device>> = peers
            .iter()
            .map(|peer| Arc::new(Device::from_peer(peer)))
            .collect();
        for device in &found {
            self.registry.insert(device.id.clone(), device.clone());
        }
        info!(%kind, count = found.len(), "scan complete");
        Ok(found)
    }

    pub fn register(&self, device: Device) -> Arc<Device> {
        let device = Arc::new(device);
        self.registry.insert(device.id.clone(), device.clone());
        device
    }

    /// Registered devices, sorted by name.
    pub fn devices(&self) -> Vec<Arc<Device>> {
        let mut out: Vec<_> = self.registry.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        out
    }

    pub fn device(&self, id: &str) -> Option<Arc<Device>> {
        self.registry.get(id).map(|e| e.value().clone())
    }

    pub fn forget(&self, id: &str) -> Result<Arc<Device>, CoreError> {
        self.registry
            .remove(id)
            .map(|(_, device)| device)
            .ok_or_else(|| CoreError::NotFound {
                entity_type: "device".into(),
                identifier: id.into(),
            })
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &*self.state.borrow())
            .field("devices", &self.registry.len())
            .finish_non_exhaustive()
    }
}
