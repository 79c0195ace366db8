// ── Controller facade ──
//
// The single surface front ends consume. Validates input, rejects
// mutations unless the link is up, and forwards everything else to the
// per-connection session task.

use std::future::Future;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use lumen_transport::{DefaultTransportFactory, TransportFactory, TransportKind};

use crate::config::ControllerConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::CoreError;
use crate::event::ControllerEvent;
use crate::model::{Device, DeviceSnapshot, DeviceState, EffectOptions, EffectSpec, Rgb, Setting};
use crate::services::{Analytics, InMemoryRepository, PRESETS, Repository, TracingAnalytics};
use crate::session::{ControllerState, Envelope, Request, Session, SessionContext, status_for};
use crate::state_machine::TransitionHook;
use crate::stream::StateStream;

const REQUEST_CHANNEL_SIZE: usize = 32;
const EVENT_CHANNEL_SIZE: usize = 256;
const MAX_PRESET_NAME: usize = 32;

// ── Builder ─────────────────────────────────────────────────────────

/// Wires collaborators into a [`Controller`]. Anything not set falls
/// back to the real transports, an in-memory repository and
/// tracing-backed analytics.
pub struct ControllerBuilder {
    config: ControllerConfig,
    factory: Option<Arc<dyn TransportFactory>>,
    repository: Option<Arc<dyn Repository>>,
    analytics: Option<Arc<dyn Analytics>>,
    hooks: Vec<Arc<dyn TransitionHook>>,
}

impl ControllerBuilder {
    pub fn transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn analytics(mut self, analytics: Arc<dyn Analytics>) -> Self {
        self.analytics = Some(analytics);
        self
    }

    /// Observe device status transitions.
    pub fn transition_hook(mut self, hook: Arc<dyn TransitionHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn build(self) -> Controller {
        let factory = self.factory.unwrap_or_else(|| {
            Arc::new(DefaultTransportFactory::new(self.config.transport.clone()))
        });
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (view, _) = watch::channel(Arc::new(ControllerState::default()));
        let manager = Arc::new(ConnectionManager::new(
            self.config.clone(),
            factory,
            event_tx.clone(),
        ));
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Controller {
            inner: Arc::new(ControllerInner {
                config: self.config,
                manager,
                event_tx,
                view,
                requests: Mutex::new(None),
                cancel,
                cancel_child: Mutex::new(cancel_child),
                task_handles: Mutex::new(Vec::new()),
                repository: self
                    .repository
                    .unwrap_or_else(|| Arc::new(InMemoryRepository::new())),
                analytics: self.analytics.unwrap_or_else(|| Arc::new(TracingAnalytics)),
                hooks: self.hooks,
            }),
        }
    }
}

// ── Controller ──────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. One controller drives
/// at most one device at a time.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: ControllerConfig,
    manager: Arc<ConnectionManager>,
    event_tx: broadcast::Sender<Arc<ControllerEvent>>,
    view: watch::Sender<Arc<ControllerState>>,
    /// Request channel of the running session, if any.
    requests: Mutex<Option<mpsc::Sender<Envelope>>>,
    cancel: CancellationToken,
    /// Child token for the current session; replaced on every connect.
    cancel_child: Mutex<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    repository: Arc<dyn Repository>,
    analytics: Arc<dyn Analytics>,
    hooks: Vec<Arc<dyn TransitionHook>>,
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn validate_preset_name(name: &str) -> Result<(), CoreError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_PRESET_NAME
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(CoreError::Validation {
            field: "preset".into(),
            reason: format!(
                "'{name}' must be 1-{MAX_PRESET_NAME} letters, digits, '_' or '-'"
            ),
        })
    }
}

impl Controller {
    /// Controller with the default collaborators. Does not connect.
    pub fn new(config: ControllerConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: ControllerConfig) -> ControllerBuilder {
        ControllerBuilder {
            config,
            factory: None,
            repository: None,
            analytics: None,
            hooks: Vec::new(),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    // ── Connection lifecycle ────────────────────────────────────────

    /// Connect to `device` and start its session.
    ///
    /// Any previous session is stopped first. Returns once the device
    /// state has been seeded (status query included, when enabled).
    pub async fn connect(&self, device: Device) -> Result<(), CoreError> {
        self.connect_arc(Arc::new(device)).await
    }

    /// Connect to a device from the registry.
    pub async fn connect_by_id(&self, id: &str) -> Result<(), CoreError> {
        let device = self
            .inner
            .manager
            .device(id)
            .ok_or_else(|| CoreError::NotFound {
                entity_type: "device".into(),
                identifier: id.into(),
            })?;
        self.connect_arc(device).await
    }

    async fn connect_arc(&self, device: Arc<Device>) -> Result<(), CoreError> {
        self.stop_session().await;

        let result = self.inner.manager.connect(device.clone()).await;
        if let Err(e) = result {
            self.inner.analytics.track(
                "connection_error",
                json!({ "device": device.id, "error": e.to_string() }),
            );
            self.publish_detached();
            return Err(e);
        }
        self.inner.analytics.track(
            "connected",
            json!({ "device": device.id, "family": device.family.to_string() }),
        );

        let child = self.inner.cancel.child_token();
        *self.inner.cancel_child.lock().await = child.clone();

        let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_SIZE);
        let (ready_tx, ready_rx) = oneshot::channel();
        let session = Session::new(SessionContext {
            config: self.inner.config.clone(),
            manager: Arc::clone(&self.inner.manager),
            device,
            repository: Arc::clone(&self.inner.repository),
            analytics: Arc::clone(&self.inner.analytics),
            events: self.inner.event_tx.clone(),
            view: self.inner.view.clone(),
            hooks: self.inner.hooks.clone(),
        });
        self.inner
            .task_handles
            .lock()
            .await
            .push(tokio::spawn(session.run(rx, child, ready_tx)));
        *self.inner.requests.lock().await = Some(tx);

        ready_rx
            .await
            .map_err(|_| CoreError::Internal("session exited during startup".into()))
    }

    /// Disconnect and stop the session. Always ends `Disconnected`.
    pub async fn disconnect(&self) {
        self.stop_session().await;
        let device = self.inner.manager.active_device();
        self.inner.manager.disconnect().await;
        self.inner.analytics.track(
            "disconnected",
            json!({ "device": device.map(|d| d.id.clone()) }),
        );
        self.publish_detached();
    }

    async fn stop_session(&self) {
        *self.inner.requests.lock().await = None;
        // Cancel the child token (not the parent, which allows reconnect).
        self.inner.cancel_child.lock().await.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                debug!(error = %e, "session task ended abnormally");
            }
        }
    }

    /// Publish a view for when no session runs, keeping the last known
    /// device state and snapshots.
    fn publish_detached(&self) {
        let last = self.inner.view.borrow().clone();
        let view = ControllerState::detached(
            self.inner.manager.current_state(),
            self.inner.manager.active_device(),
            last.state.clone(),
            last.snapshots.clone(),
        );
        self.inner.view.send_replace(Arc::new(view));
    }

    // ── Request plumbing ────────────────────────────────────────────

    /// Mutations are only legal while connected; nothing is sent otherwise.
    fn ensure_connected(&self, operation: &str) -> Result<(), CoreError> {
        let connection = self.inner.manager.current_state();
        if connection.is_connected() {
            Ok(())
        } else {
            Err(CoreError::IllegalState {
                operation: operation.into(),
                status: status_for(&connection),
            })
        }
    }

    async fn request(&self, request: Request, operation: &str) -> Result<bool, CoreError> {
        self.ensure_connected(operation)?;
        let Some(tx) = self.inner.requests.lock().await.clone() else {
            return Err(CoreError::IllegalState {
                operation: operation.into(),
                status: status_for(&self.inner.manager.current_state()),
            });
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(Envelope {
            request,
            reply: reply_tx,
        })
        .await
        .map_err(|_| CoreError::Internal("session is not running".into()))?;

        reply_rx
            .await
            .map_err(|_| CoreError::Internal("session dropped the request".into()))?
    }

    async fn apply(&self, setting: Setting) -> Result<bool, CoreError> {
        let operation = setting.describe();
        self.request(Request::Apply(setting), &operation).await
    }

    // ── Device control ──────────────────────────────────────────────
    //
    // Each returns `Ok(true)` if the device state changed.

    /// Set a solid color from `#rrggbb`, `rrggbb` or `#rgb`.
    pub async fn set_color(&self, hex: &str) -> Result<bool, CoreError> {
        let color = Rgb::from_hex(hex)?;
        self.set_color_rgb(color).await
    }

    pub async fn set_color_rgb(&self, color: Rgb) -> Result<bool, CoreError> {
        self.apply(Setting::Color(color)).await
    }

    /// Set brightness in percent (0-100).
    pub async fn set_brightness(&self, level: u8) -> Result<bool, CoreError> {
        if level > 100 {
            return Err(CoreError::Validation {
                field: "brightness".into(),
                reason: format!("{level} is outside 0..=100"),
            });
        }
        self.apply(Setting::Brightness(level)).await
    }

    pub async fn set_power(&self, on: bool) -> Result<bool, CoreError> {
        self.apply(Setting::Power(on)).await
    }

    /// Flip power. Sent as an absolute on/off, so retries are safe.
    pub async fn toggle_power(&self) -> Result<bool, CoreError> {
        self.request(Request::TogglePower, "toggle power").await
    }

    pub async fn set_effect(&self, name: &str, options: EffectOptions) -> Result<bool, CoreError> {
        let spec = EffectSpec::new(name, options)?;
        self.apply(Setting::Effect(Some(spec))).await
    }

    pub async fn stop_effect(&self) -> Result<bool, CoreError> {
        self.apply(Setting::Effect(None)).await
    }

    /// `Ok(false)` when there is nothing to undo.
    pub async fn undo(&self) -> Result<bool, CoreError> {
        self.request(Request::Undo, "undo").await
    }

    /// `Ok(false)` when there is nothing to redo.
    pub async fn redo(&self) -> Result<bool, CoreError> {
        self.request(Request::Redo, "redo").await
    }

    /// Re-read the device's state.
    pub async fn refresh_status(&self) -> Result<bool, CoreError> {
        self.request(Request::RefreshStatus, "refresh status").await
    }

    /// Recall a preset stored in device firmware. Not undoable.
    pub async fn recall_device_preset(&self, name: &str) -> Result<(), CoreError> {
        validate_preset_name(name)?;
        self.request(Request::DevicePreset(name.into()), "recall preset")
            .await
            .map(|_| ())
    }

    // ── Saved presets ───────────────────────────────────────────────

    /// Store the current device state under `name`.
    pub async fn save_preset(&self, name: &str) -> Result<(), CoreError> {
        validate_preset_name(name)?;
        let state = self.state().state.clone();
        let value = serde_json::to_value(&state).map_err(|e| CoreError::Repository {
            message: e.to_string(),
        })?;
        self.inner.repository.save(PRESETS, name, value).await?;
        info!(preset = name, "preset saved");
        Ok(())
    }

    /// Apply a saved preset as one undoable operation.
    pub async fn apply_preset(&self, name: &str) -> Result<bool, CoreError> {
        validate_preset_name(name)?;
        let operation = format!("apply preset {name}");
        self.ensure_connected(&operation)?;
        let target = self.load_preset(name).await?;
        self.request(
            Request::ApplyState {
                label: operation.clone(),
                target,
            },
            &operation,
        )
        .await
    }

    pub async fn preset(&self, name: &str) -> Result<DeviceState, CoreError> {
        self.load_preset(name).await
    }

    async fn load_preset(&self, name: &str) -> Result<DeviceState, CoreError> {
        let value = self
            .inner
            .repository
            .find(PRESETS, name)
            .await?
            .ok_or_else(|| CoreError::NotFound {
                entity_type: "preset".into(),
                identifier: name.into(),
            })?;
        serde_json::from_value(value).map_err(|e| CoreError::Repository {
            message: format!("preset '{name}' is unreadable: {e}"),
        })
    }

    pub async fn delete_preset(&self, name: &str) -> Result<(), CoreError> {
        if self.inner.repository.delete(PRESETS, name).await? {
            Ok(())
        } else {
            Err(CoreError::NotFound {
                entity_type: "preset".into(),
                identifier: name.into(),
            })
        }
    }

    /// Saved preset names, sorted.
    pub async fn presets(&self) -> Result<Vec<String>, CoreError> {
        self.inner.repository.keys(PRESETS).await
    }

    // ── Snapshots ───────────────────────────────────────────────────

    /// Snapshot ring of the current device, newest first.
    pub fn snapshots(&self) -> Vec<Arc<DeviceSnapshot>> {
        self.state().snapshots.clone()
    }

    /// Take a snapshot now instead of waiting for the debounce.
    pub async fn capture_snapshot(&self) -> Result<bool, CoreError> {
        self.request(Request::CaptureSnapshot, "capture snapshot")
            .await
    }

    /// Jump back to a snapshot (0 is the newest). Bypasses the command
    /// history.
    pub async fn restore_snapshot(&self, index: usize) -> Result<bool, CoreError> {
        self.request(Request::RestoreSnapshot(index), "restore snapshot")
            .await
    }

    // ── Registry ────────────────────────────────────────────────────

    pub async fn scan(&self, kind: TransportKind) -> Result<Vec<Arc<Device>>, CoreError> {
        self.inner.manager.scan(kind).await
    }

    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.inner.manager.devices()
    }

    pub fn device(&self, id: &str) -> Option<Arc<Device>> {
        self.inner.manager.device(id)
    }

    pub fn register_device(&self, device: Device) -> Arc<Device> {
        self.inner.manager.register(device)
    }

    pub fn forget_device(&self, id: &str) -> Result<Arc<Device>, CoreError> {
        self.inner.manager.forget(id)
    }

    // ── State observation ───────────────────────────────────────────

    /// Current controller state.
    pub fn state(&self) -> Arc<ControllerState> {
        self.inner.view.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn state_stream(&self) -> StateStream {
        StateStream::new(self.inner.view.subscribe())
    }

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.manager.subscribe()
    }

    /// Subscribe to the event broadcast stream.
    pub fn events(&self) -> broadcast::Receiver<Arc<ControllerEvent>> {
        self.inner.event_tx.subscribe()
    }

    // ── One-shot convenience ────────────────────────────────────────

    /// Connect, run the closure, disconnect.
    pub async fn oneshot<F, Fut, T>(
        config: ControllerConfig,
        device: Device,
        f: F,
    ) -> Result<T, CoreError>
    where
        F: FnOnce(Controller) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        Self::new(config).run_once(device, f).await
    }

    /// [`oneshot`](Self::oneshot) on an already built controller.
    pub async fn run_once<F, Fut, T>(&self, device: Device, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Controller) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        self.connect(device).await?;
        let result = f(self.clone()).await;
        self.disconnect().await;
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn preset_names_are_validated() {
        assert!(validate_preset_name("sunset").is_ok());
        assert!(validate_preset_name("late-night_2").is_ok());
        assert!(validate_preset_name("").is_err());
        assert!(validate_preset_name("a b").is_err());
        assert!(validate_preset_name("PRESET:x\n").is_err());
    }

    #[tokio::test]
    async fn fresh_controller_is_disconnected_and_rejects_mutations() {
        let controller = Controller::new(ControllerConfig::default());
        assert_eq!(controller.state().connection, ConnectionState::Disconnected);

        let err = controller.set_color("#ff0000").await.unwrap_err();
        assert!(matches!(err, CoreError::IllegalState { .. }));
        let err = controller.set_color("#zz0000").await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }
}
