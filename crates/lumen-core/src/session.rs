// ── Device session ──
//
// One actor task per connection. It owns the state machine, the device
// state, the command history and the snapshot ring, so all of them are
// mutated from a single task. The facade sends requests over an mpsc
// channel (oneshot reply each) and observes the result through a watch
// channel of `ControllerState`.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::CoreError;
use crate::event::ControllerEvent;
use crate::history::{CommandHistory, OperationExecutor, SnapshotRing};
use crate::model::{Device, DeviceSnapshot, DeviceState, Setting};
use crate::protocol::Command;
use crate::services::{Analytics, Repository, SNAPSHOTS};
use crate::state_machine::{DeviceStateMachine, DeviceStatus, TransitionHook};

// ── Published state ─────────────────────────────────────────────────

/// Everything an observer needs to render the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerState {
    pub connection: ConnectionState,
    pub device: Option<Arc<Device>>,
    pub status: DeviceStatus,
    /// Human-readable status ("On", "Off", "Effect: rainbow", ...).
    pub label: String,
    pub state: DeviceState,
    pub can_undo: bool,
    pub can_redo: bool,
    pub history_len: usize,
    /// Newest first.
    pub snapshots: Vec<Arc<DeviceSnapshot>>,
}

impl ControllerState {
    /// View for when no session is running.
    pub(crate) fn detached(
        connection: ConnectionState,
        device: Option<Arc<Device>>,
        state: DeviceState,
        snapshots: Vec<Arc<DeviceSnapshot>>,
    ) -> Self {
        let status = status_for(&connection);
        Self {
            connection,
            device,
            status,
            label: status_label(status),
            state,
            can_undo: false,
            can_redo: false,
            history_len: 0,
            snapshots,
        }
    }
}

impl Default for ControllerState {
    fn default() -> Self {
        Self::detached(
            ConnectionState::Disconnected,
            None,
            DeviceState::default(),
            Vec::new(),
        )
    }
}

/// Device status implied by a connection state alone.
pub(crate) fn status_for(connection: &ConnectionState) -> DeviceStatus {
    match connection {
        ConnectionState::Disconnected => DeviceStatus::Disconnected,
        ConnectionState::Connecting => DeviceStatus::Connecting,
        ConnectionState::Connected => DeviceStatus::Idle,
        ConnectionState::Error(_) => DeviceStatus::Error,
    }
}

fn status_label(status: DeviceStatus) -> String {
    match status {
        DeviceStatus::Disconnected => "Disconnected".into(),
        DeviceStatus::Connecting => "Connecting".into(),
        DeviceStatus::Idle => "On".into(),
        DeviceStatus::Effect => "Effect".into(),
        DeviceStatus::Error => "Error".into(),
    }
}

// ── Requests ────────────────────────────────────────────────────────

pub(crate) enum Request {
    Apply(Setting),
    TogglePower,
    Undo,
    Redo,
    /// Move to a full target state as one history entry.
    ApplyState {
        label: String,
        target: DeviceState,
    },
    DevicePreset(String),
    RestoreSnapshot(usize),
    CaptureSnapshot,
    RefreshStatus,
}

pub(crate) struct Envelope {
    pub request: Request,
    pub reply: oneshot::Sender<Result<bool, CoreError>>,
}

// ── Executor ────────────────────────────────────────────────────────

/// Sends settings through the state machine and commits each
/// acknowledged step.
struct Executor {
    manager: Arc<ConnectionManager>,
    machine: DeviceStateMachine,
    state: DeviceState,
    events: broadcast::Sender<Arc<ControllerEvent>>,
}

impl Executor {
    fn emit(&self, event: ControllerEvent) {
        let _ = self.events.send(Arc::new(event));
    }

    fn commit(&mut self, next: DeviceState, status: DeviceStatus) {
        let before = std::mem::replace(&mut self.state, next);
        if before.power != self.state.power {
            self.emit(ControllerEvent::PowerChanged {
                on: self.state.power,
            });
        }
        if before.color != self.state.color {
            self.emit(ControllerEvent::ColorChanged {
                color: self.state.color,
            });
        }
        if before.brightness != self.state.brightness {
            self.emit(ControllerEvent::BrightnessChanged {
                level: self.state.brightness,
            });
        }
        if before.effect != self.state.effect {
            self.emit(ControllerEvent::EffectChanged {
                effect: self.state.effect.clone(),
            });
        }
        match self.machine.transition(status) {
            Ok(true) => self.emit_status(),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "acknowledged step left the state machine behind"),
        }
    }

    fn emit_status(&self) {
        self.emit(ControllerEvent::StatusChanged {
            status: self.machine.status(),
            label: self.machine.label(&self.state),
        });
    }

    /// Take over a state reported by the device. Returns `true` if
    /// anything changed.
    fn adopt(&mut self, reported: DeviceState) -> bool {
        if reported == self.state {
            return false;
        }
        let status = match (self.machine.status(), reported.effect.is_some()) {
            (DeviceStatus::Idle, true) => DeviceStatus::Effect,
            (DeviceStatus::Effect, false) => DeviceStatus::Idle,
            (status, _) => status,
        };
        self.commit(reported, status);
        true
    }
}

impl OperationExecutor for Executor {
    fn state(&self) -> &DeviceState {
        &self.state
    }

    async fn apply(&mut self, settings: &[Setting]) -> Result<(), CoreError> {
        for setting in settings {
            let plan = self.machine.plan(setting, &self.state)?;
            for step in plan.steps {
                self.manager.send(&step.command).await?;
                let mut next = self.state.clone();
                next.apply(&step.apply);
                self.commit(next, step.next);
            }
        }
        Ok(())
    }
}

// ── Session ─────────────────────────────────────────────────────────

/// Everything a session is built from.
pub(crate) struct SessionContext {
    pub config: ControllerConfig,
    pub manager: Arc<ConnectionManager>,
    pub device: Arc<Device>,
    pub repository: Arc<dyn Repository>,
    pub analytics: Arc<dyn Analytics>,
    pub events: broadcast::Sender<Arc<ControllerEvent>>,
    pub view: watch::Sender<Arc<ControllerState>>,
    pub hooks: Vec<Arc<dyn TransitionHook>>,
}

pub(crate) struct Session {
    exec: Executor,
    history: CommandHistory,
    snapshots: SnapshotRing,
    config: ControllerConfig,
    device: Arc<Device>,
    repository: Arc<dyn Repository>,
    analytics: Arc<dyn Analytics>,
    view: watch::Sender<Arc<ControllerState>>,
    /// When the debounced snapshot is due, if a mutation is pending.
    snapshot_due: Option<Instant>,
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl Session {
    pub(crate) fn new(ctx: SessionContext) -> Self {
        let machine = ctx
            .hooks
            .into_iter()
            .fold(DeviceStateMachine::new(), DeviceStateMachine::with_hook);
        Self {
            exec: Executor {
                manager: ctx.manager,
                machine,
                state: DeviceState::default(),
                events: ctx.events,
            },
            history: CommandHistory::new(ctx.config.max_history_size),
            snapshots: SnapshotRing::new(ctx.config.snapshot_capacity),
            config: ctx.config,
            device: ctx.device,
            repository: ctx.repository,
            analytics: ctx.analytics,
            view: ctx.view,
            snapshot_due: None,
        }
    }

    /// Session loop. `ready` fires once the initial sync (and status
    /// query, if enabled) is done and the first state is published.
    pub(crate) async fn run(
        mut self,
        mut requests: mpsc::Receiver<Envelope>,
        cancel: CancellationToken,
        ready: oneshot::Sender<()>,
    ) {
        self.load_snapshots().await;
        let mut connection = self.exec.manager.subscribe();
        let current = connection.borrow_and_update().clone();
        self.on_connection(&current).await;
        self.publish();
        let _ = ready.send(());
        info!(device = %self.device.name, "session started");

        loop {
            let due = self.snapshot_due;
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                changed = connection.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = connection.borrow_and_update().clone();
                    self.on_connection(&current).await;
                }
                envelope = requests.recv() => {
                    let Some(Envelope { request, reply }) = envelope else {
                        break;
                    };
                    let result = self.handle(request).await;
                    let _ = reply.send(result);
                }
                () = until(due) => {
                    self.take_snapshot().await;
                }
            }
            self.publish();
        }

        if self.snapshot_due.is_some() {
            self.take_snapshot().await;
        }
        debug!(device = %self.device.name, "session stopped");
    }

    fn publish(&self) {
        let view = ControllerState {
            connection: self.exec.manager.current_state(),
            device: Some(self.device.clone()),
            status: self.exec.machine.status(),
            label: self.exec.machine.label(&self.exec.state),
            state: self.exec.state.clone(),
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
            history_len: self.history.len(),
            snapshots: self.snapshots.to_vec(),
        };
        self.view.send_replace(Arc::new(view));
    }

    async fn on_connection(&mut self, connection: &ConnectionState) {
        let was_live = self.exec.machine.status().accepts_commands();
        if self.exec.machine.sync_connection(connection) {
            self.exec.emit_status();
        }
        if connection.is_connected() && !was_live && self.config.query_status_on_connect {
            if let Err(e) = self.refresh_status().await {
                warn!(error = %e, "status query after connect failed");
            }
        }
    }

    fn require_live(&self, operation: &str) -> Result<(), CoreError> {
        let status = self.exec.machine.status();
        if status.accepts_commands() {
            Ok(())
        } else {
            Err(CoreError::IllegalState {
                operation: operation.into(),
                status,
            })
        }
    }

    async fn handle(&mut self, request: Request) -> Result<bool, CoreError> {
        match request {
            Request::Apply(setting) => self.record(setting.describe(), &[setting]).await,
            Request::TogglePower => {
                let setting = Setting::Power(!self.exec.state.power);
                self.record(setting.describe(), &[setting]).await
            }
            Request::ApplyState { label, target } => {
                let settings = self.exec.state.diff(&target);
                if settings.is_empty() {
                    return Ok(false);
                }
                self.record(label, &settings).await
            }
            Request::Undo => {
                self.require_live("undo")?;
                let label = self.history.undo_label().map(str::to_owned);
                let undone = self.history.undo(&mut self.exec).await?;
                if undone {
                    self.analytics.track("undo", json!({ "operation": label }));
                    self.touch();
                }
                Ok(undone)
            }
            Request::Redo => {
                self.require_live("redo")?;
                let redone = self.history.redo(&mut self.exec).await?;
                if redone {
                    self.analytics.track("redo", json!({}));
                    self.touch();
                }
                Ok(redone)
            }
            Request::DevicePreset(name) => {
                self.require_live("recall preset")?;
                self.exec
                    .manager
                    .send(&Command::RecallPreset { name: name.clone() })
                    .await?;
                info!(preset = %name, "device preset recalled");
                if let Err(e) = self.refresh_status().await {
                    warn!(error = %e, "status query after preset failed");
                }
                self.touch();
                Ok(true)
            }
            Request::RestoreSnapshot(index) => {
                let snapshot = self
                    .snapshots
                    .get(index)
                    .ok_or_else(|| CoreError::NotFound {
                        entity_type: "snapshot".into(),
                        identifier: index.to_string(),
                    })?;
                let settings = self.exec.state.diff(&snapshot.state);
                if settings.is_empty() {
                    return Ok(false);
                }
                self.exec.apply(&settings).await?;
                info!(snapshot = %snapshot.id, "snapshot restored");
                Ok(true)
            }
            Request::CaptureSnapshot => Ok(self.take_snapshot().await),
            Request::RefreshStatus => {
                self.require_live("refresh status")?;
                self.refresh_status().await
            }
        }
    }

    async fn record(&mut self, label: String, settings: &[Setting]) -> Result<bool, CoreError> {
        let recorded = self
            .history
            .execute(&mut self.exec, label.clone(), settings)
            .await?;
        if recorded {
            self.analytics
                .track("command_executed", json!({ "operation": label }));
            self.touch();
        }
        Ok(recorded)
    }

    async fn refresh_status(&mut self) -> Result<bool, CoreError> {
        let reply = self.exec.manager.send(&Command::QueryStatus).await?;
        match reply.status() {
            Some(reported) => Ok(self.exec.adopt(reported.clone())),
            None => {
                debug!("device answered without a status report");
                Ok(false)
            }
        }
    }

    /// Restart the snapshot debounce window.
    fn touch(&mut self) {
        self.snapshot_due = Some(Instant::now() + self.config.snapshot_debounce);
    }

    async fn take_snapshot(&mut self) -> bool {
        self.snapshot_due = None;
        let Some(snapshot) = self.snapshots.capture(&self.exec.state) else {
            return false;
        };
        debug!(id = %snapshot.id, "snapshot taken");
        self.persist_snapshots().await;
        true
    }

    async fn persist_snapshots(&self) {
        let value = match serde_json::to_value(self.snapshots.persisted()) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "could not serialize snapshots");
                return;
            }
        };
        if let Err(e) = self.repository.save(SNAPSHOTS, &self.device.id, value).await {
            warn!(error = %e, "could not persist snapshots");
        }
    }

    async fn load_snapshots(&mut self) {
        match self.repository.find(SNAPSHOTS, &self.device.id).await {
            Ok(Some(value)) => match serde_json::from_value::<Vec<DeviceSnapshot>>(value) {
                Ok(saved) => {
                    self.snapshots = SnapshotRing::restore(saved, self.config.snapshot_capacity);
                    debug!(count = self.snapshots.len(), "snapshots loaded");
                }
                Err(e) => warn!(error = %e, "ignoring unreadable snapshots"),
            },
            Ok(None) => {}
            Err(e) => warn!(error = %e, "could not load snapshots"),
        }
    }
}
