//! Device communication and control core for addressable LED controllers.
//!
//! This crate owns everything between a byte channel and a front end:
//!
//! - **[`Controller`]**: the facade. [`connect()`](Controller::connect)
//!   opens the link with bounded retry, seeds the device state and spawns
//!   a session task that serializes every mutation.
//!   [`Controller::oneshot()`](Controller::oneshot) wraps connect, work
//!   and disconnect for single CLI invocations.
//!
//! - **[`ConnectionManager`]**: link lifecycle, per-attempt timeouts,
//!   retry of idempotent commands, discovery and the device registry.
//!
//! - **[`protocol`]**: [`DeviceAdapter`] implementations translating
//!   abstract [`Command`]s into the text, JSON and framed binary dialects.
//!
//! - **[`DeviceStateMachine`]**: the legal device statuses and the steps
//!   a setting expands into (stopping an effect before a solid color).
//!
//! - **[`CommandHistory`]** and [`SnapshotRing`]: linear undo/redo of
//!   acknowledged operations plus debounced point-in-time snapshots.
//!
//! - **[`StateStream`]** and [`ControllerEvent`]: the reactive surface.

pub mod config;
pub mod connection;
pub mod controller;
pub mod error;
pub mod event;
pub mod history;
pub mod model;
pub mod protocol;
pub mod services;
pub mod session;
pub mod simulator;
pub mod state_machine;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ControllerConfig, RetryPolicy};
pub use connection::{ConnectionManager, ConnectionState};
pub use controller::{Controller, ControllerBuilder};
pub use error::CoreError;
pub use event::ControllerEvent;
pub use history::{CommandHistory, Operation, OperationExecutor, SnapshotRing};
pub use protocol::{Command, CommandResult, DeviceAdapter, ReplyData, WireCommand};
pub use services::{Analytics, InMemoryRepository, NoopAnalytics, Repository, TracingAnalytics};
pub use session::ControllerState;
pub use simulator::SimulatedDevice;
pub use state_machine::{DeviceStateMachine, DeviceStatus, LoggingHook, TransitionHook};
pub use stream::StateStream;

pub use model::{
    Device, DeviceFamily, DeviceSnapshot, DeviceState, EffectId, EffectOptions, EffectSpec, Hsl,
    Rgb, Setting, SettingKind,
};

// Transport types front ends need to wire a controller.
pub use lumen_transport::{
    DefaultTransportFactory, DiscoveredPeer, MockFactory, MockHandle, TransportFactory,
    TransportKind, TransportSettings,
};
