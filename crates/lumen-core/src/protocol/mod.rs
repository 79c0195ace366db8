// ── Device protocol ──
//
// Logical commands and the adapters that put them on the wire. Adapters
// are pure: they encode commands, split frames out of a receive buffer
// and decode replies. All I/O happens in the transport.

pub mod binary;
pub mod json;
pub mod text;

use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use lumen_transport::TransportKind;

use crate::model::{Device, DeviceFamily, DeviceState, EffectSpec, Rgb, Setting};

pub use binary::BinaryAdapter;
pub use json::JsonAdapter;
pub use text::TextAdapter;

// ── Command ─────────────────────────────────────────────────────────

/// A logical device command, independent of wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    SetPower { on: bool },
    SetColor { color: Rgb },
    SetBrightness { level: u8 },
    StartEffect { effect: EffectSpec },
    StopEffect,
    /// Recall a preset stored in device firmware.
    RecallPreset { name: String },
    QueryStatus,
    /// Escape hatch for firmware-specific commands the core does not model.
    /// The binary protocol carries at most [`binary::MAX_PAYLOAD`] bytes of
    /// `kind=value`; longer payloads are truncated.
    Raw { kind: String, value: String },
}

impl Command {
    /// The command that realises one setting on the device.
    pub fn for_setting(setting: &Setting) -> Self {
        match setting {
            Setting::Power(on) => Self::SetPower { on: *on },
            Setting::Color(color) => Self::SetColor { color: *color },
            Setting::Brightness(level) => Self::SetBrightness { level: *level },
            Setting::Effect(Some(effect)) => Self::StartEffect {
                effect: effect.clone(),
            },
            Setting::Effect(None) => Self::StopEffect,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::SetPower { .. } => "power",
            Self::SetColor { .. } => "color",
            Self::SetBrightness { .. } => "brightness",
            Self::StartEffect { .. } => "effect",
            Self::StopEffect => "stop_effect",
            Self::RecallPreset { .. } => "preset",
            Self::QueryStatus => "status",
            Self::Raw { kind, .. } => kind,
        }
    }

    /// Whether sending the command twice leaves the device in the same
    /// state as sending it once. Only idempotent commands are retried.
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, Self::Raw { .. })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetPower { on: true } => f.write_str("power on"),
            Self::SetPower { on: false } => f.write_str("power off"),
            Self::SetColor { color } => write!(f, "color {color}"),
            Self::SetBrightness { level } => write!(f, "brightness {level}"),
            Self::StartEffect { effect } => write!(f, "effect {}", effect.id),
            Self::StopEffect => f.write_str("stop effect"),
            Self::RecallPreset { name } => write!(f, "preset {name}"),
            Self::QueryStatus => f.write_str("status query"),
            Self::Raw { kind, value } => write!(f, "{kind} {value}"),
        }
    }
}

// ── WireCommand ─────────────────────────────────────────────────────

/// Encoded bytes for exactly one send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireCommand(Bytes);

impl WireCommand {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lossy text view, for logs and tests of line protocols.
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

// ── CommandResult ───────────────────────────────────────────────────

/// Payload carried by a successful reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ReplyData {
    Text(String),
    Status(DeviceState),
}

/// A decoded reply: success with optional data, or an error code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    pub data: Option<ReplyData>,
    pub error: Option<String>,
}

impl CommandResult {
    pub fn ok(data: Option<ReplyData>) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn err(code: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(code.into()),
        }
    }

    pub fn status(&self) -> Option<&DeviceState> {
        match &self.data {
            Some(ReplyData::Status(state)) => Some(state),
            _ => None,
        }
    }
}

// ── DeviceAdapter ───────────────────────────────────────────────────

/// Wire protocol of one device family.
pub trait DeviceAdapter: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn encode(&self, command: &Command) -> WireCommand;

    fn decode(&self, frame: &[u8]) -> CommandResult;

    /// Split the next complete reply frame off the front of `buf`, if
    /// one has fully arrived. Partial data stays in the buffer.
    fn next_frame(&self, buf: &mut BytesMut) -> Option<Bytes> {
        next_line(buf)
    }
}

/// Newline-delimited framing shared by the line protocols. Blank lines
/// and trailing `\r` are dropped.
pub(crate) fn next_line(buf: &mut BytesMut) -> Option<Bytes> {
    loop {
        let pos = buf.iter().position(|&b| b == b'\n')?;
        let mut line = buf.split_to(pos + 1);
        line.truncate(pos);
        if line.last() == Some(&b'\r') {
            line.truncate(pos - 1);
        }
        if !line.is_empty() {
            return Some(line.freeze());
        }
    }
}

// ── Family mapping ──────────────────────────────────────────────────

/// Adapter for a device family. Chosen once, at connect time.
pub fn adapter_for(family: DeviceFamily) -> Arc<dyn DeviceAdapter> {
    match family {
        DeviceFamily::SerialText | DeviceFamily::BleText | DeviceFamily::Mock => {
            Arc::new(TextAdapter)
        }
        DeviceFamily::WifiJson => Arc::new(JsonAdapter),
        DeviceFamily::SerialBinary => Arc::new(BinaryAdapter),
    }
}

/// Transport for a device. Pure mapping from the family tag.
pub fn auto_select(device: &Device) -> TransportKind {
    match device.family {
        DeviceFamily::SerialText | DeviceFamily::SerialBinary => TransportKind::Serial,
        DeviceFamily::BleText => TransportKind::Ble,
        DeviceFamily::WifiJson => TransportKind::Socket,
        DeviceFamily::Mock => TransportKind::Mock,
    }
}

/// Every value of the red channel against the edge values of green and
/// blue, for adapter color tests.
#[cfg(test)]
pub(crate) fn color_sweep() -> impl Iterator<Item = Rgb> {
    const EDGES: [u8; 4] = [0, 1, 254, 255];
    (0..=u8::MAX).flat_map(|r| {
        EDGES
            .into_iter()
            .flat_map(move |g| EDGES.into_iter().map(move |b| Rgb::new(r, g, b)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EffectOptions;

    #[test]
    fn line_framing_handles_partial_and_crlf_input() {
        let mut buf = BytesMut::from(&b"OK:COL"[..]);
        assert_eq!(next_line(&mut buf), None);
        buf.extend_from_slice(b"OR\r\n\nERR:E2\nOK");
        assert_eq!(next_line(&mut buf).as_deref(), Some(&b"OK:COLOR"[..]));
        assert_eq!(next_line(&mut buf).as_deref(), Some(&b"ERR:E2"[..]));
        assert_eq!(next_line(&mut buf), None);
        assert_eq!(&buf[..], b"OK");
    }

    #[test]
    fn only_raw_commands_are_non_idempotent() {
        assert!(Command::SetPower { on: true }.is_idempotent());
        assert!(Command::StopEffect.is_idempotent());
        assert!(
            !Command::Raw {
                kind: "pulse".into(),
                value: "1".into()
            }
            .is_idempotent()
        );
    }

    #[test]
    fn settings_map_to_commands() {
        assert_eq!(Command::for_setting(&Setting::Effect(None)), Command::StopEffect);
        let spec = EffectSpec::new("rainbow", EffectOptions::default()).ok();
        assert!(matches!(
            Command::for_setting(&Setting::Effect(spec)),
            Command::StartEffect { .. }
        ));
    }

    #[test]
    fn family_selects_transport_and_adapter() {
        let device = Device::new("d", "Desk", "10.0.0.7:5577", DeviceFamily::WifiJson);
        assert_eq!(auto_select(&device), TransportKind::Socket);
        assert_eq!(adapter_for(device.family).name(), "json");

        let strip = Device::new("s", "Strip", "/dev/rfcomm0", DeviceFamily::SerialText);
        assert_eq!(auto_select(&strip), TransportKind::Serial);
        assert_eq!(adapter_for(strip.family).name(), "text");
        assert_eq!(adapter_for(DeviceFamily::SerialBinary).name(), "binary");
    }
}
