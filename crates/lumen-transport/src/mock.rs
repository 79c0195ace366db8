// ── In-memory transport ──
//
// Scriptable loopback used by tests and demos. A `MockHandle` is shared
// between the test and every `MockTransport` it spawns, so the test can
// script connect/send outcomes up front and inspect the wire afterwards.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Notify;
use tracing::debug;

use crate::error::Error;
use crate::transport::{DiscoveredPeer, TransportFactory, TransportKind, TransportStrategy};

/// Outcome of one scripted connect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockConnect {
    Succeed,
    Fail(String),
    /// Never resolves; the caller's timeout has to win.
    Hang,
    Deny(String),
}

/// Outcome of one scripted send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockSend {
    /// Write succeeds and the responder (if any) queues a reply.
    Reply,
    /// Write fails with a broken-pipe I/O error.
    Fail(String),
    /// Write succeeds but the device never answers.
    Silent,
}

type Responder = Arc<dyn Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync>;

struct MockState {
    connect_script: VecDeque<MockConnect>,
    connect_default: MockConnect,
    send_script: VecDeque<MockSend>,
    responder: Option<Responder>,
    preflight_denied: Option<String>,
    fail_disconnect: bool,
    peers: Vec<DiscoveredPeer>,
    connected: bool,
    connect_attempts: u32,
    send_attempts: u32,
    sent: Vec<Vec<u8>>,
    inbox: VecDeque<Bytes>,
    flushes: u32,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            connect_script: VecDeque::new(),
            connect_default: MockConnect::Succeed,
            send_script: VecDeque::new(),
            responder: None,
            preflight_denied: None,
            fail_disconnect: false,
            peers: Vec::new(),
            connected: false,
            connect_attempts: 0,
            send_attempts: 0,
            sent: Vec::new(),
            inbox: VecDeque::new(),
            flushes: 0,
        }
    }
}

// ── MockHandle ───────────────────────────────────────────────────────

/// Control and inspection side of the mock link.
#[derive(Clone, Default)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
    notify: Arc<Notify>,
}

impl MockHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Scripting ────────────────────────────────────────────────────

    /// Queue the outcome of the next connect attempt.
    pub fn on_connect(&self, outcome: MockConnect) -> &Self {
        self.lock().connect_script.push_back(outcome);
        self
    }

    /// Outcome used once the connect script is exhausted.
    pub fn connect_default(&self, outcome: MockConnect) -> &Self {
        self.lock().connect_default = outcome;
        self
    }

    /// Queue the outcome of the next send.
    pub fn on_send(&self, outcome: MockSend) -> &Self {
        self.lock().send_script.push_back(outcome);
        self
    }

    /// Install the device-side reply function. Returning `None` stays silent.
    pub fn respond_with<F>(&self, responder: F) -> &Self
    where
        F: Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        self.lock().responder = Some(Arc::new(responder));
        self
    }

    pub fn deny_preflight(&self, reason: impl Into<String>) -> &Self {
        self.lock().preflight_denied = Some(reason.into());
        self
    }

    /// Make the next disconnects report an error (the link still closes).
    pub fn fail_disconnect(&self) -> &Self {
        self.lock().fail_disconnect = true;
        self
    }

    pub fn add_peer(&self, peer: DiscoveredPeer) -> &Self {
        self.lock().peers.push(peer);
        self
    }

    /// Push unsolicited bytes onto the receive side.
    pub fn inject(&self, bytes: impl Into<Bytes>) {
        self.lock().inbox.push_back(bytes.into());
        self.notify.notify_one();
    }

    /// Simulate the device vanishing: pending and future reads fail.
    pub fn drop_link(&self) {
        self.lock().connected = false;
        self.notify.notify_one();
    }

    // ── Inspection ───────────────────────────────────────────────────

    pub fn connect_attempts(&self) -> u32 {
        self.lock().connect_attempts
    }

    pub fn send_attempts(&self) -> u32 {
        self.lock().send_attempts
    }

    /// Every successfully written buffer, in order.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.lock().sent.clone()
    }

    /// Written buffers as text with the trailing newline removed.
    pub fn sent_lines(&self) -> Vec<String> {
        self.lock()
            .sent
            .iter()
            .map(|b| String::from_utf8_lossy(b).trim_end().to_owned())
            .collect()
    }

    pub fn clear_sent(&self) {
        let mut state = self.lock();
        state.sent.clear();
        state.send_attempts = 0;
    }

    pub fn flush_count(&self) -> u32 {
        self.lock().flushes
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }
}

// ── MockTransport ────────────────────────────────────────────────────

pub struct MockTransport {
    handle: MockHandle,
}

impl MockTransport {
    pub fn new(handle: MockHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl TransportStrategy for MockTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Mock
    }

    async fn preflight(&self) -> Result<(), Error> {
        match self.handle.lock().preflight_denied.clone() {
            Some(reason) => Err(Error::PermissionDenied(reason)),
            None => Ok(()),
        }
    }

    async fn discover(&self, _window: Duration) -> Result<Vec<DiscoveredPeer>, Error> {
        Ok(self.handle.lock().peers.clone())
    }

    async fn connect(&mut self, address: &str) -> Result<(), Error> {
        let outcome = {
            let mut state = self.handle.lock();
            state.connect_attempts += 1;
            match state.connect_script.pop_front() {
                Some(outcome) => outcome,
                None => state.connect_default.clone(),
            }
        };
        debug!(address, ?outcome, "mock connect");

        match outcome {
            MockConnect::Succeed => {
                let mut state = self.handle.lock();
                state.connected = true;
                state.inbox.clear();
                Ok(())
            }
            MockConnect::Fail(reason) => Err(Error::ConnectFailed {
                address: address.into(),
                reason,
            }),
            MockConnect::Hang => std::future::pending().await,
            MockConnect::Deny(reason) => Err(Error::PermissionDenied(reason)),
        }
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        let mut state = self.handle.lock();
        state.connected = false;
        state.inbox.clear();
        if state.fail_disconnect {
            return Err(Error::Io(std::io::Error::other("mock disconnect failure")));
        }
        Ok(())
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let mut state = self.handle.lock();
        if !state.connected {
            return Err(Error::NotConnected);
        }
        state.send_attempts += 1;
        let outcome = state.send_script.pop_front().unwrap_or(MockSend::Reply);

        match outcome {
            MockSend::Fail(reason) => {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    reason,
                )));
            }
            MockSend::Silent => state.sent.push(bytes.to_vec()),
            MockSend::Reply => {
                state.sent.push(bytes.to_vec());
                let reply = state.responder.as_ref().and_then(|f| f(bytes));
                if let Some(reply) = reply {
                    state.inbox.push_back(Bytes::from(reply));
                    self.handle.notify.notify_one();
                }
            }
        }
        Ok(())
    }

    async fn receive(&mut self) -> Result<Bytes, Error> {
        loop {
            {
                let mut state = self.handle.lock();
                if let Some(chunk) = state.inbox.pop_front() {
                    return Ok(chunk);
                }
                if !state.connected {
                    return Err(Error::Closed);
                }
            }
            self.handle.notify.notified().await;
        }
    }

    fn is_connected(&self) -> bool {
        self.handle.lock().connected
    }

    async fn flush_input(&mut self) -> Result<(), Error> {
        let mut state = self.handle.lock();
        state.inbox.clear();
        state.flushes += 1;
        Ok(())
    }
}

// ── MockFactory ──────────────────────────────────────────────────────

/// Hands out mock transports bound to one shared handle, whatever kind
/// is requested.
#[derive(Clone, Default)]
pub struct MockFactory {
    handle: MockHandle,
}

impl MockFactory {
    pub fn new(handle: MockHandle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &MockHandle {
        &self.handle
    }
}

impl TransportFactory for MockFactory {
    fn create(&self, kind: TransportKind) -> Result<Box<dyn TransportStrategy>, Error> {
        debug!(%kind, "creating mock transport");
        Ok(Box::new(MockTransport::new(self.handle.clone())))
    }
}
