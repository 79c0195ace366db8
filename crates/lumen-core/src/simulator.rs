// ── Simulated device ──
//
// A line-protocol device living behind the mock transport. It keeps its
// own state, answers `STATUS`, and rejects what real firmware rejects, so
// the whole stack can be exercised without hardware.

use std::sync::{Arc, Mutex, PoisonError};

use lumen_transport::MockHandle;
use tracing::trace;

use crate::model::{DeviceState, EffectOptions, EffectSpec, Rgb};
use crate::protocol::TextAdapter;

/// Firmware presets the simulator knows: name, color, brightness.
const PRESETS: &[(&str, Rgb, u8)] = &[
    ("warm", Rgb::new(0xFF, 0xB4, 0x6B), 60),
    ("night", Rgb::new(0xFF, 0x20, 0x00), 10),
    ("daylight", Rgb::WHITE, 100),
];

#[derive(Clone, Default)]
pub struct SimulatedDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl SimulatedDevice {
    /// Install the simulator as the responder of `handle`.
    pub fn attach(handle: &MockHandle) -> Self {
        let device = Self::default();
        let responder = device.clone();
        handle.respond_with(move |bytes| Some(responder.respond(bytes).into_bytes()));
        device
    }

    /// What the simulated LEDs currently show.
    pub fn state(&self) -> DeviceState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn respond(&self, bytes: &[u8]) -> String {
        let line = String::from_utf8_lossy(bytes);
        let line = line.trim();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let reply = match apply_line(&mut state, line) {
            Ok(None) => "OK".to_owned(),
            Ok(Some(value)) => format!("OK:{value}"),
            Err(code) => format!("ERR:{code}"),
        };
        trace!(request = line, reply = %reply, "simulator");
        format!("{reply}\n")
    }
}

fn apply_line(state: &mut DeviceState, line: &str) -> Result<Option<String>, &'static str> {
    let (verb, arg) = line.split_once(':').unwrap_or((line, ""));
    match verb {
        "POWER_ON" => state.power = true,
        "POWER_OFF" => state.power = false,
        "STATUS" => return Ok(Some(TextAdapter::status_line(state))),
        "STOP_EFFECT" => state.effect = None,
        "COLOR" => {
            let channels: Vec<u8> = arg
                .split(',')
                .map(|c| c.trim().parse().map_err(|_| "E_PARSE"))
                .collect::<Result<_, _>>()?;
            let [r, g, b] = channels.as_slice() else {
                return Err("E_PARSE");
            };
            state.color = Rgb::new(*r, *g, *b);
            return Ok(Some(arg.to_owned()));
        }
        "BRIGHTNESS" => {
            let level: u8 = arg.trim().parse().map_err(|_| "E_PARSE")?;
            if level > 100 {
                return Err("E_RANGE");
            }
            state.brightness = level;
            return Ok(Some(level.to_string()));
        }
        "EFFECT" => {
            let mut parts = arg.split(':');
            let name = parts.next().unwrap_or_default();
            let mut tuning = parts.map(|p| p.parse::<u8>().map_err(|_| "E_PARSE"));
            let speed = tuning.next().transpose()?;
            let intensity = tuning.next().transpose()?;
            let spec = EffectSpec::new(name, EffectOptions { speed, intensity })
                .map_err(|_| "E_EFFECT")?;
            state.effect = Some(spec);
        }
        "PRESET" => {
            let (_, color, brightness) = PRESETS
                .iter()
                .find(|(name, ..)| *name == arg)
                .ok_or("E_NO_PRESET")?;
            state.effect = None;
            state.color = *color;
            state.brightness = *brightness;
        }
        _ => return Err("E_UNKNOWN"),
    }
    Ok(None)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn run(state: &mut DeviceState, line: &str) -> Result<Option<String>, &'static str> {
        apply_line(state, line)
    }

    #[test]
    fn understands_the_line_protocol() {
        let mut s = DeviceState::default();
        assert_eq!(run(&mut s, "COLOR:255,0,0"), Ok(Some("255,0,0".into())));
        assert_eq!(s.color, Rgb::new(255, 0, 0));
        assert_eq!(run(&mut s, "BRIGHTNESS:101"), Err("E_RANGE"));
        assert_eq!(run(&mut s, "EFFECT:rainbow:30"), Ok(None));
        assert_eq!(s.effect.as_ref().unwrap().speed, 30);
        assert_eq!(run(&mut s, "STOP_EFFECT"), Ok(None));
        assert_eq!(run(&mut s, "PRESET:night"), Ok(None));
        assert_eq!(s.brightness, 10);
        assert_eq!(run(&mut s, "PRESET:disco"), Err("E_NO_PRESET"));
        assert_eq!(run(&mut s, "DANCE"), Err("E_UNKNOWN"));
    }

    #[test]
    fn answers_status_in_the_report_format() {
        let mut s = DeviceState::default();
        run(&mut s, "POWER_OFF").unwrap();
        let report = run(&mut s, "STATUS").unwrap().unwrap();
        assert_eq!(report, "power=0;color=ffffff;brightness=100;effect=none");
    }
}
