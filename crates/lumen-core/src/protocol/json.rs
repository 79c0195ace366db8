// ── JSON envelope protocol ──
//
// One JSON object per line. Requests are `{"cmd": <kind>, "value": ...}`,
// replies `{"ok": true, "data": ...}` or `{"ok": false, "error": "..."}`.
// Status data is `{"power", "color", "brightness", "effect"}`.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::model::{DeviceState, EffectOptions, EffectSpec, Rgb};

use super::{Command, CommandResult, DeviceAdapter, ReplyData, WireCommand};

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonAdapter;

#[derive(Debug, Deserialize)]
struct Reply {
    ok: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EffectPayload {
    name: String,
    speed: u8,
    intensity: u8,
}

#[derive(Debug, Serialize, Deserialize)]
struct StatusPayload {
    power: bool,
    color: Rgb,
    brightness: u8,
    #[serde(default)]
    effect: Option<EffectPayload>,
}

impl From<&DeviceState> for StatusPayload {
    fn from(state: &DeviceState) -> Self {
        Self {
            power: state.power,
            color: state.color,
            brightness: state.brightness,
            effect: state.effect.as_ref().map(|e| EffectPayload {
                name: e.id.to_string(),
                speed: e.speed,
                intensity: e.intensity,
            }),
        }
    }
}

impl StatusPayload {
    fn into_state(self) -> Option<DeviceState> {
        let effect = match self.effect {
            Some(e) => Some(
                EffectSpec::new(
                    &e.name,
                    EffectOptions {
                        speed: Some(e.speed),
                        intensity: Some(e.intensity),
                    },
                )
                .ok()?,
            ),
            None => None,
        };
        Some(DeviceState {
            power: self.power,
            color: self.color,
            brightness: self.brightness.min(100),
            effect,
        })
    }
}

impl JsonAdapter {
    /// Status reply as firmware sends it.
    pub fn status_reply(state: &DeviceState) -> String {
        json!({ "ok": true, "data": StatusPayload::from(state) }).to_string()
    }
}

impl DeviceAdapter for JsonAdapter {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, command: &Command) -> WireCommand {
        let body = match command {
            Command::SetPower { on } => json!({ "cmd": "power", "value": on }),
            Command::SetColor { color } => {
                json!({ "cmd": "color", "value": [color.r, color.g, color.b] })
            }
            Command::SetBrightness { level } => json!({ "cmd": "brightness", "value": level }),
            Command::StartEffect { effect } => json!({
                "cmd": "effect",
                "value": { "name": effect.id.as_str(), "speed": effect.speed, "intensity": effect.intensity },
            }),
            Command::StopEffect => json!({ "cmd": "stop_effect" }),
            Command::RecallPreset { name } => json!({ "cmd": "preset", "value": name }),
            Command::QueryStatus => json!({ "cmd": "status" }),
            Command::Raw { kind, value } => json!({ "cmd": kind, "value": value }),
        };
        WireCommand::new(format!("{body}\n"))
    }

    fn decode(&self, frame: &[u8]) -> CommandResult {
        let reply: Reply = match serde_json::from_slice(frame) {
            Ok(r) => r,
            Err(e) => return CommandResult::err(format!("malformed reply: {e}")),
        };

        if !reply.ok {
            return CommandResult::err(reply.error.unwrap_or_else(|| "unknown".into()));
        }

        let data = match reply.data {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(ReplyData::Text(s)),
            Some(value) => {
                match serde_json::from_value::<StatusPayload>(value.clone())
                    .ok()
                    .and_then(StatusPayload::into_state)
                {
                    Some(state) => Some(ReplyData::Status(state)),
                    None => Some(ReplyData::Text(value.to_string())),
                }
            }
        };
        CommandResult::ok(data)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn encode_value(cmd: &Command) -> Value {
        let wire = JsonAdapter.encode(cmd).to_text();
        assert!(wire.ends_with('\n'));
        serde_json::from_str(wire.trim_end()).unwrap()
    }

    #[test]
    fn encodes_envelopes() {
        assert_eq!(
            encode_value(&Command::SetColor {
                color: Rgb::new(1, 2, 3)
            }),
            json!({"cmd": "color", "value": [1, 2, 3]})
        );
        assert_eq!(
            encode_value(&Command::SetPower { on: false }),
            json!({"cmd": "power", "value": false})
        );
        assert_eq!(encode_value(&Command::StopEffect), json!({"cmd": "stop_effect"}));
        assert_eq!(
            encode_value(&Command::Raw {
                kind: "segments".into(),
                value: "4".into()
            }),
            json!({"cmd": "segments", "value": "4"})
        );
    }

    #[test]
    fn snapshot_of_effect_envelope() {
        let spec = EffectSpec::new(
            "comet",
            EffectOptions {
                speed: Some(70),
                intensity: Some(30),
            },
        )
        .unwrap();
        insta::assert_json_snapshot!(encode_value(&Command::StartEffect { effect: spec }), @r#"
        {
          "cmd": "effect",
          "value": {
            "intensity": 30,
            "name": "comet",
            "speed": 70
          }
        }
        "#);
    }

    #[test]
    fn decodes_replies() {
        assert_eq!(JsonAdapter.decode(br#"{"ok":true}"#), CommandResult::ok(None));
        assert_eq!(
            JsonAdapter.decode(br#"{"ok":true,"data":"applied"}"#),
            CommandResult::ok(Some(ReplyData::Text("applied".into())))
        );
        assert_eq!(
            JsonAdapter.decode(br#"{"ok":false,"error":"busy"}"#),
            CommandResult::err("busy")
        );
        assert!(!JsonAdapter.decode(b"not json").success);
    }

    #[test]
    fn status_round_trips() {
        let state = DeviceState {
            power: true,
            color: Rgb::new(0, 128, 255),
            brightness: 42,
            effect: None,
        };
        let reply = JsonAdapter.decode(JsonAdapter::status_reply(&state).as_bytes());
        assert_eq!(reply.status(), Some(&state));
    }

    #[test]
    fn every_color_survives_the_device_and_its_status_report() {
        for rgb in crate::protocol::color_sweep() {
            let sent = encode_value(&Command::SetColor { color: rgb });
            let applied: Vec<u8> = serde_json::from_value(sent["value"].clone()).unwrap();
            let state = DeviceState {
                color: Rgb::new(applied[0], applied[1], applied[2]),
                ..DeviceState::default()
            };

            let reply = JsonAdapter.decode(JsonAdapter::status_reply(&state).as_bytes());
            assert_eq!(reply.status().unwrap().color, rgb);
        }
    }
}
