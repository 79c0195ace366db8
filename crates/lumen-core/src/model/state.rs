// ── Device state ──
//
// The controller's view of what the device is showing. `Setting` is the
// unit of change: every user intent, undo and redo is expressed as a
// list of settings applied in order.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::color::Rgb;
use super::effect::EffectSpec;

/// Everything the device is currently showing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    pub power: bool,
    pub color: Rgb,
    /// 0..=100
    pub brightness: u8,
    pub effect: Option<EffectSpec>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            power: true,
            color: Rgb::WHITE,
            brightness: 100,
            effect: None,
        }
    }
}

impl DeviceState {
    /// Current value of one field, as a setting.
    pub fn get(&self, kind: SettingKind) -> Setting {
        match kind {
            SettingKind::Power => Setting::Power(self.power),
            SettingKind::Color => Setting::Color(self.color),
            SettingKind::Brightness => Setting::Brightness(self.brightness),
            SettingKind::Effect => Setting::Effect(self.effect.clone()),
        }
    }

    pub fn apply(&mut self, setting: &Setting) {
        match setting {
            Setting::Power(on) => self.power = *on,
            Setting::Color(c) => self.color = *c,
            Setting::Brightness(b) => self.brightness = *b,
            Setting::Effect(e) => self.effect.clone_from(e),
        }
    }

    /// Settings that turn `self` into `target`.
    ///
    /// A running effect is stopped first and a new one started last, so
    /// solid color and brightness land while the device is idle.
    pub fn diff(&self, target: &DeviceState) -> Vec<Setting> {
        let mut out = Vec::new();
        let effect_changes = self.effect != target.effect;
        if effect_changes && self.effect.is_some() && target.effect.is_none() {
            out.push(Setting::Effect(None));
        }
        if self.power != target.power {
            out.push(Setting::Power(target.power));
        }
        if self.color != target.color {
            out.push(Setting::Color(target.color));
        }
        if self.brightness != target.brightness {
            out.push(Setting::Brightness(target.brightness));
        }
        if effect_changes && target.effect.is_some() {
            out.push(Setting::Effect(target.effect.clone()));
        }
        out
    }
}

// ── Setting ─────────────────────────────────────────────────────────

/// Which field of [`DeviceState`] a setting touches.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SettingKind {
    Power,
    Color,
    Brightness,
    Effect,
}

/// One absolute change to device state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Setting {
    Power(bool),
    Color(Rgb),
    Brightness(u8),
    /// `None` stops whatever effect is running.
    Effect(Option<EffectSpec>),
}

impl Setting {
    pub fn kind(&self) -> SettingKind {
        match self {
            Self::Power(_) => SettingKind::Power,
            Self::Color(_) => SettingKind::Color,
            Self::Brightness(_) => SettingKind::Brightness,
            Self::Effect(_) => SettingKind::Effect,
        }
    }

    /// Human-readable verb phrase, used in errors and logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Power(true) => "power on".into(),
            Self::Power(false) => "power off".into(),
            Self::Color(c) => format!("set color {c}"),
            Self::Brightness(b) => format!("set brightness {b}"),
            Self::Effect(Some(spec)) => format!("start effect {}", spec.id),
            Self::Effect(None) => "stop effect".into(),
        }
    }
}

// ── DeviceSnapshot ──────────────────────────────────────────────────

/// Immutable point-in-time copy of device state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub id: Uuid,
    pub state: DeviceState,
    pub captured_at: DateTime<Utc>,
}

impl DeviceSnapshot {
    pub fn capture(state: &DeviceState) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            state: state.clone(),
            captured_at: Utc::now(),
        })
    }
}
