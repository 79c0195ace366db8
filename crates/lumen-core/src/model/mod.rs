// ── Domain model ──
//
// Canonical types shared by every layer: devices, colors, effects and
// the device state that commands change.

pub mod color;
pub mod device;
pub mod effect;
pub mod state;

// ── Re-exports ──────────────────────────────────────────────────────

pub use color::{Hsl, Rgb};
pub use device::{Device, DeviceFamily};
pub use effect::{EffectId, EffectOptions, EffectSpec};
pub use state::{DeviceSnapshot, DeviceState, Setting, SettingKind};
