// ── Controller events ──
//
// Fan-out notifications for observers. Delivered over a tokio broadcast
// channel; a slow subscriber lags (and skips) rather than blocking the
// controller.

use std::sync::Arc;

use serde::Serialize;

use crate::model::{Device, EffectSpec, Rgb};
use crate::state_machine::DeviceStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControllerEvent {
    Connected { device: Arc<Device> },
    Disconnected { device: Option<Arc<Device>> },
    ConnectionError { reason: String },
    ColorChanged { color: Rgb },
    BrightnessChanged { level: u8 },
    PowerChanged { on: bool },
    EffectChanged { effect: Option<EffectSpec> },
    StatusChanged { status: DeviceStatus, label: String },
}

impl ControllerEvent {
    /// Short event name, used for analytics and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Disconnected { .. } => "disconnected",
            Self::ConnectionError { .. } => "connection_error",
            Self::ColorChanged { .. } => "color_changed",
            Self::BrightnessChanged { .. } => "brightness_changed",
            Self::PowerChanged { .. } => "power_changed",
            Self::EffectChanged { .. } => "effect_changed",
            Self::StatusChanged { .. } => "status_changed",
        }
    }
}
