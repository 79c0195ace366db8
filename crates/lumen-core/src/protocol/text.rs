// ── Line protocol ──
//
// `COLOR:<r>,<g>,<b>`, `BRIGHTNESS:<0-100>`, `POWER_ON` / `POWER_OFF`,
// `EFFECT:<name>:<speed>[:<intensity>]`, `STOP_EFFECT`, `PRESET:<name>`,
// `STATUS`. Every command ends in `\n`. Replies are `OK[:<value>]` or
// `ERR:<code>`; a status reply carries
// `power=1;color=ff0000;brightness=80;effect=rainbow:50:100`.
//
// Commands the core does not model go out as `<KIND>:<value>`.

use crate::model::{DeviceState, EffectOptions, EffectSpec, Rgb};

use super::{Command, CommandResult, DeviceAdapter, ReplyData, WireCommand};

#[derive(Debug, Clone, Copy, Default)]
pub struct TextAdapter;

impl TextAdapter {
    /// Render a status report the way firmware sends it (without `OK:`).
    pub fn status_line(state: &DeviceState) -> String {
        let effect = state.effect.as_ref().map_or_else(
            || "none".to_owned(),
            |e| format!("{}:{}:{}", e.id, e.speed, e.intensity),
        );
        format!(
            "power={};color={:02x}{:02x}{:02x};brightness={};effect={effect}",
            u8::from(state.power),
            state.color.r,
            state.color.g,
            state.color.b,
            state.brightness,
        )
    }
}

/// Strip line terminators so a value can never split a frame.
fn single_line(value: &str) -> String {
    value.chars().filter(|c| *c != '\n' && *c != '\r').collect()
}

fn parse_status(body: &str) -> Option<DeviceState> {
    let mut power = None;
    let mut color = None;
    let mut brightness = None;
    let mut effect = None;

    for pair in body.split(';') {
        let (key, value) = pair.split_once('=')?;
        match key.trim() {
            "power" => power = Some(value.trim() == "1"),
            "color" => color = Some(Rgb::from_hex(value).ok()?),
            "brightness" => brightness = Some(value.trim().parse::<u8>().ok()?.min(100)),
            "effect" => effect = parse_effect(value.trim()),
            _ => {}
        }
    }

    Some(DeviceState {
        power: power?,
        color: color?,
        brightness: brightness?,
        effect: effect.flatten(),
    })
}

/// `Some(None)` for an explicit "none", `None` for garbage.
fn parse_effect(value: &str) -> Option<Option<EffectSpec>> {
    if value.eq_ignore_ascii_case("none") || value.is_empty() {
        return Some(None);
    }
    let mut parts = value.split(':');
    let name = parts.next()?;
    let speed = parts.next().and_then(|s| s.parse().ok());
    let intensity = parts.next().and_then(|s| s.parse().ok());
    EffectSpec::new(name, EffectOptions { speed, intensity })
        .ok()
        .map(Some)
}

impl DeviceAdapter for TextAdapter {
    fn name(&self) -> &'static str {
        "text"
    }

    fn encode(&self, command: &Command) -> WireCommand {
        let line = match command {
            Command::SetPower { on: true } => "POWER_ON".to_owned(),
            Command::SetPower { on: false } => "POWER_OFF".to_owned(),
            Command::SetColor { color } => format!("COLOR:{},{},{}", color.r, color.g, color.b),
            Command::SetBrightness { level } => format!("BRIGHTNESS:{level}"),
            Command::StartEffect { effect } if effect.has_default_intensity() => {
                format!("EFFECT:{}:{}", effect.id, effect.speed)
            }
            Command::StartEffect { effect } => {
                format!("EFFECT:{}:{}:{}", effect.id, effect.speed, effect.intensity)
            }
            Command::StopEffect => "STOP_EFFECT".to_owned(),
            Command::RecallPreset { name } => format!("PRESET:{}", single_line(name)),
            Command::QueryStatus => "STATUS".to_owned(),
            Command::Raw { kind, value } => format!(
                "{}:{}",
                single_line(kind).to_ascii_uppercase(),
                single_line(value)
            ),
        };
        WireCommand::new(format!("{line}\n"))
    }

    fn decode(&self, frame: &[u8]) -> CommandResult {
        let text = String::from_utf8_lossy(frame);
        let text = text.trim();

        if text == "OK" {
            return CommandResult::ok(None);
        }
        if let Some(body) = text.strip_prefix("OK:") {
            let data = match parse_status(body) {
                Some(state) => ReplyData::Status(state),
                None => ReplyData::Text(body.to_owned()),
            };
            return CommandResult::ok(Some(data));
        }
        if let Some(code) = text.strip_prefix("ERR:") {
            return CommandResult::err(code.trim());
        }
        if text == "ERR" {
            return CommandResult::err("unknown");
        }
        CommandResult::err(format!("unrecognised reply '{text}'"))
    }
}
