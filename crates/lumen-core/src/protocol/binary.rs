// ── Framed binary protocol ──
//
// Frame layout: `0x7E <op> <len lo> <len hi> <payload...> 0xE7`.
// Requests use opcodes 0x01..=0x07 (0x7F for raw), replies use 0x80 ack,
// 0x81 nak with a one-byte code, 0x82 status report.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::model::{DeviceState, EffectOptions, EffectSpec, Rgb};

use super::{Command, CommandResult, DeviceAdapter, ReplyData, WireCommand};

const START: u8 = 0x7E;
const END: u8 = 0xE7;
const HEADER_LEN: usize = 4;
/// Largest payload the 16-bit length field can describe.
pub const MAX_PAYLOAD: usize = 0xFFFF;

pub mod op {
    pub const POWER: u8 = 0x01;
    pub const COLOR: u8 = 0x02;
    pub const BRIGHTNESS: u8 = 0x03;
    pub const EFFECT: u8 = 0x04;
    pub const STOP_EFFECT: u8 = 0x05;
    pub const PRESET: u8 = 0x06;
    pub const STATUS: u8 = 0x07;
    pub const RAW: u8 = 0x7F;

    pub const ACK: u8 = 0x80;
    pub const NAK: u8 = 0x81;
    pub const STATUS_REPORT: u8 = 0x82;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryAdapter;

/// Wrap a payload in start/length/end markers. Anything past
/// [`MAX_PAYLOAD`] bytes is cut off.
pub fn frame(opcode: u8, payload: &[u8]) -> Bytes {
    let len = u16::try_from(payload.len()).unwrap_or(u16::MAX);
    let mut out = BytesMut::with_capacity(HEADER_LEN + payload.len() + 1);
    out.put_u8(START);
    out.put_u8(opcode);
    out.put_u16_le(len);
    out.extend_from_slice(&payload[..usize::from(len)]);
    out.put_u8(END);
    out.freeze()
}

impl BinaryAdapter {
    /// Status report frame as firmware sends it.
    pub fn status_frame(state: &DeviceState) -> Bytes {
        let mut payload = vec![
            u8::from(state.power),
            state.color.r,
            state.color.g,
            state.color.b,
            state.brightness,
        ];
        if let Some(effect) = &state.effect {
            payload.extend_from_slice(&[effect.speed, effect.intensity]);
            payload.extend_from_slice(effect.id.as_str().as_bytes());
        }
        frame(op::STATUS_REPORT, &payload)
    }

    pub fn ack_frame() -> Bytes {
        frame(op::ACK, &[])
    }

    pub fn nak_frame(code: u8) -> Bytes {
        frame(op::NAK, &[code])
    }
}

fn decode_status(payload: &[u8]) -> Option<DeviceState> {
    let [power, r, g, b, brightness, rest @ ..] = payload else {
        return None;
    };
    let effect = match rest {
        [] => None,
        [speed, intensity, name @ ..] => Some(
            EffectSpec::new(
                std::str::from_utf8(name).ok()?,
                EffectOptions {
                    speed: Some(*speed),
                    intensity: Some(*intensity),
                },
            )
            .ok()?,
        ),
        _ => return None,
    };
    Some(DeviceState {
        power: *power != 0,
        color: Rgb::new(*r, *g, *b),
        brightness: (*brightness).min(100),
        effect,
    })
}

impl DeviceAdapter for BinaryAdapter {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn encode(&self, command: &Command) -> WireCommand {
        let bytes = match command {
            Command::SetPower { on } => frame(op::POWER, &[u8::from(*on)]),
            Command::SetColor { color } => frame(op::COLOR, &[color.r, color.g, color.b]),
            Command::SetBrightness { level } => frame(op::BRIGHTNESS, &[*level]),
            Command::StartEffect { effect } => {
                let mut payload = vec![effect.speed, effect.intensity];
                payload.extend_from_slice(effect.id.as_str().as_bytes());
                frame(op::EFFECT, &payload)
            }
            Command::StopEffect => frame(op::STOP_EFFECT, &[]),
            Command::RecallPreset { name } => frame(op::PRESET, name.as_bytes()),
            Command::QueryStatus => frame(op::STATUS, &[]),
            Command::Raw { kind, value } => {
                let payload = format!("{kind}={value}");
                if payload.len() > MAX_PAYLOAD {
                    warn!(
                        %kind,
                        len = payload.len(),
                        max = MAX_PAYLOAD,
                        "raw payload does not fit one frame, truncating"
                    );
                }
                frame(op::RAW, payload.as_bytes())
            }
        };
        WireCommand::new(bytes)
    }

    fn decode(&self, frame: &[u8]) -> CommandResult {
        let Some((&opcode, payload)) = frame
            .strip_prefix(&[START])
            .and_then(|f| f.strip_suffix(&[END]))
            .and_then(|f| f.split_first())
        else {
            return CommandResult::err("malformed frame");
        };
        let payload = payload.get(2..).unwrap_or_default();

        match opcode {
            op::ACK => CommandResult::ok(None),
            op::NAK => {
                let code = payload.first().copied().unwrap_or(0);
                CommandResult::err(format!("0x{code:02x}"))
            }
            op::STATUS_REPORT => match decode_status(payload) {
                Some(state) => CommandResult::ok(Some(ReplyData::Status(state))),
                None => CommandResult::err("malformed status report"),
            },
            other => CommandResult::err(format!("unexpected opcode 0x{other:02x}")),
        }
    }

    fn next_frame(&self, buf: &mut BytesMut) -> Option<Bytes> {
        loop {
            let Some(start) = buf.iter().position(|&b| b == START) else {
                buf.clear();
                return None;
            };
            buf.advance(start);
            if buf.len() < HEADER_LEN {
                return None;
            }
            let len = usize::from(u16::from_le_bytes([buf[2], buf[3]]));
            let total = HEADER_LEN + len + 1;
            if buf.len() < total {
                return None;
            }
            if buf[total - 1] != END {
                // Not a real frame start; resync on the next marker.
                buf.advance(1);
                continue;
            }
            return Some(buf.split_to(total).freeze());
        }
    }
}
