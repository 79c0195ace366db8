// ── Device state machine ──
//
// Tracks what the device is doing (idle, running an effect, ...) and
// decides which wire commands a requested setting needs in that state.
// Planning is pure; the session sends the steps and commits each one
// with `transition` only after the device acknowledged it.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connection::ConnectionState;
use crate::error::CoreError;
use crate::model::{DeviceState, Setting};
use crate::protocol::Command;

/// Coarse device status, derived from the connection and the last
/// acknowledged commands.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeviceStatus {
    #[default]
    Disconnected,
    Connecting,
    /// Connected, showing a solid color (or switched off).
    Idle,
    /// Connected, running a firmware effect.
    Effect,
    Error,
}

impl DeviceStatus {
    pub fn can_transition_to(self, next: Self) -> bool {
        use DeviceStatus::{Connecting, Disconnected, Effect, Error, Idle};
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Idle | Error | Disconnected)
                | (Idle, Effect | Disconnected | Error)
                | (Effect, Idle | Disconnected | Error)
                | (Error, Disconnected)
        )
    }

    /// Whether device commands may be sent in this status.
    pub fn accepts_commands(self) -> bool {
        matches!(self, Self::Idle | Self::Effect)
    }
}

// ── Hooks ───────────────────────────────────────────────────────────

/// Observer for status changes. Both methods default to no-ops.
pub trait TransitionHook: Send + Sync {
    fn on_exit(&self, _from: DeviceStatus, _to: DeviceStatus) {}

    fn on_enter(&self, _to: DeviceStatus, _from: DeviceStatus) {}
}

/// Logs every transition at debug level.
#[derive(Debug, Default)]
pub struct LoggingHook;

impl TransitionHook for LoggingHook {
    fn on_enter(&self, to: DeviceStatus, from: DeviceStatus) {
        debug!(%from, %to, "device status changed");
    }
}

// ── Plans ───────────────────────────────────────────────────────────

/// One wire command, the state change it realises, and the status the
/// device is in once it is acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub command: Command,
    pub apply: Setting,
    pub next: DeviceStatus,
}

/// Ordered steps that realise one setting from the current status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub steps: Vec<Step>,
}

impl Plan {
    fn single(setting: Setting, next: DeviceStatus) -> Self {
        Self {
            steps: vec![Step {
                command: Command::for_setting(&setting),
                apply: setting,
                next,
            }],
        }
    }

    fn stop_then(setting: Option<Setting>) -> Self {
        let mut steps = vec![Step {
            command: Command::StopEffect,
            apply: Setting::Effect(None),
            next: DeviceStatus::Idle,
        }];
        if let Some(setting) = setting {
            steps.push(Step {
                command: Command::for_setting(&setting),
                apply: setting,
                next: DeviceStatus::Idle,
            });
        }
        Self { steps }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Every setting the plan changes, in send order.
    pub fn settings(&self) -> impl Iterator<Item = &Setting> {
        self.steps.iter().map(|s| &s.apply)
    }
}

// ── DeviceStateMachine ──────────────────────────────────────────────

pub struct DeviceStateMachine {
    status: DeviceStatus,
    hooks: Vec<Arc<dyn TransitionHook>>,
}

impl fmt::Debug for DeviceStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceStateMachine")
            .field("status", &self.status)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl Default for DeviceStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceStateMachine {
    pub fn new() -> Self {
        Self {
            status: DeviceStatus::Disconnected,
            hooks: vec![Arc::new(LoggingHook)],
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn TransitionHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    /// Move to `next`. Returns `Ok(false)` when already there.
    pub fn transition(&mut self, next: DeviceStatus) -> Result<bool, CoreError> {
        let from = self.status;
        if from == next {
            return Ok(false);
        }
        if !from.can_transition_to(next) {
            return Err(CoreError::IllegalState {
                operation: format!("enter {next}"),
                status: from,
            });
        }
        for hook in &self.hooks {
            hook.on_exit(from, next);
        }
        self.status = next;
        for hook in &self.hooks {
            hook.on_enter(next, from);
        }
        Ok(true)
    }

    /// Follow a connection state change, walking through intermediate
    /// statuses so every hop is a legal transition. Returns `true` if the
    /// status changed.
    pub fn sync_connection(&mut self, connection: &ConnectionState) -> bool {
        use DeviceStatus::{Connecting, Disconnected, Effect, Error, Idle};

        let path: &[DeviceStatus] = match (connection, self.status) {
            (ConnectionState::Disconnected, Disconnected)
            | (ConnectionState::Connecting, Connecting)
            | (ConnectionState::Connected, Idle | Effect)
            | (ConnectionState::Error(_), Error) => &[],
            (ConnectionState::Disconnected, _) => &[Disconnected],
            (ConnectionState::Connecting, Disconnected) => &[Connecting],
            (ConnectionState::Connecting, _) => &[Disconnected, Connecting],
            (ConnectionState::Connected, Disconnected) => &[Connecting, Idle],
            (ConnectionState::Connected, Connecting) => &[Idle],
            (ConnectionState::Connected, Error) => &[Disconnected, Connecting, Idle],
            (ConnectionState::Error(_), Disconnected) => &[Connecting, Error],
            (ConnectionState::Error(_), _) => &[Error],
        };

        let mut changed = false;
        for next in path {
            match self.transition(*next) {
                Ok(moved) => changed |= moved,
                Err(e) => {
                    debug!(error = %e, "skipping connection sync step");
                    break;
                }
            }
        }
        changed
    }

    /// Display label for the current status.
    pub fn label(&self, state: &DeviceState) -> String {
        match self.status {
            DeviceStatus::Disconnected => "Disconnected".into(),
            DeviceStatus::Connecting => "Connecting".into(),
            DeviceStatus::Error => "Error".into(),
            DeviceStatus::Idle if state.power => "On".into(),
            DeviceStatus::Idle => "Off".into(),
            DeviceStatus::Effect => match &state.effect {
                Some(effect) => format!("Effect: {}", effect.id),
                None => "Effect".into(),
            },
        }
    }

    /// Steps needed to apply `setting` from the current status.
    ///
    /// In `Effect`, a solid color or power-off stops the effect first so
    /// the device lands in `Idle`; brightness and power-on keep it running.
    pub fn plan(&self, setting: &Setting, state: &DeviceState) -> Result<Plan, CoreError> {
        use DeviceStatus::{Effect, Idle};

        match (self.status, setting) {
            (Idle, Setting::Effect(None)) => Ok(Plan::default()),
            (Idle, Setting::Effect(Some(_))) => Ok(Plan::single(setting.clone(), Effect)),
            (Idle, _) => Ok(Plan::single(setting.clone(), Idle)),

            (Effect, Setting::Effect(None)) => Ok(Plan::stop_then(None)),
            (Effect, Setting::Color(_) | Setting::Power(false)) => {
                Ok(Plan::stop_then(Some(setting.clone())))
            }
            (Effect, Setting::Brightness(_) | Setting::Power(true) | Setting::Effect(Some(_))) => {
                if state.effect.is_none() {
                    debug!("effect status without an active effect in state");
                }
                Ok(Plan::single(setting.clone(), Effect))
            }
            (status, _) => Err(CoreError::IllegalState {
                operation: setting.describe(),
                status,
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{EffectOptions, EffectSpec, Rgb};

    fn connected() -> DeviceStateMachine {
        let mut sm = DeviceStateMachine::new();
        sm.sync_connection(&ConnectionState::Connected);
        sm
    }

    fn rainbow() -> EffectSpec {
        EffectSpec::new("rainbow", EffectOptions::default()).unwrap()
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(DeviceStatus, DeviceStatus)>>);

    impl TransitionHook for Recorder {
        fn on_enter(&self, to: DeviceStatus, from: DeviceStatus) {
            self.0.lock().unwrap().push((from, to));
        }
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let mut sm = DeviceStateMachine::new();
        let err = sm.transition(DeviceStatus::Effect).unwrap_err();
        assert!(matches!(
            err,
            CoreError::IllegalState {
                status: DeviceStatus::Disconnected,
                ..
            }
        ));
        assert!(!sm.transition(DeviceStatus::Disconnected).unwrap());
        assert!(sm.transition(DeviceStatus::Connecting).unwrap());
        assert!(!DeviceStatus::Error.can_transition_to(DeviceStatus::Idle));
    }

    #[test]
    fn connection_sync_walks_through_legal_hops() {
        let recorder = Arc::new(Recorder::default());
        let mut sm = DeviceStateMachine::new().with_hook(recorder.clone());

        assert!(sm.sync_connection(&ConnectionState::Connected));
        assert_eq!(sm.status(), DeviceStatus::Idle);
        assert!(sm.sync_connection(&ConnectionState::Error("lost".into())));
        assert!(sm.sync_connection(&ConnectionState::Connected));
        assert!(!sm.sync_connection(&ConnectionState::Connected));

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![
                (DeviceStatus::Disconnected, DeviceStatus::Connecting),
                (DeviceStatus::Connecting, DeviceStatus::Idle),
                (DeviceStatus::Idle, DeviceStatus::Error),
                (DeviceStatus::Error, DeviceStatus::Disconnected),
                (DeviceStatus::Disconnected, DeviceStatus::Connecting),
                (DeviceStatus::Connecting, DeviceStatus::Idle),
            ]
        );
    }

    #[test]
    fn mutations_need_a_connected_device() {
        let sm = DeviceStateMachine::new();
        let err = sm
            .plan(&Setting::Color(Rgb::WHITE), &DeviceState::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot set color #ffffff while device is disconnected");
    }

    #[test]
    fn color_during_effect_stops_the_effect_first() {
        let mut sm = connected();
        sm.transition(DeviceStatus::Effect).unwrap();
        let red = Setting::Color(Rgb::new(255, 0, 0));

        let plan = sm.plan(&red, &DeviceState::default()).unwrap();
        let commands: Vec<_> = plan.steps.iter().map(|s| s.command.clone()).collect();
        assert_eq!(
            commands,
            vec![
                Command::StopEffect,
                Command::SetColor {
                    color: Rgb::new(255, 0, 0)
                }
            ]
        );
        assert!(plan.steps.iter().all(|s| s.next == DeviceStatus::Idle));
    }

    #[test]
    fn brightness_keeps_the_effect_running() {
        let mut sm = connected();
        sm.transition(DeviceStatus::Effect).unwrap();
        let plan = sm
            .plan(&Setting::Brightness(10), &DeviceState::default())
            .unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].next, DeviceStatus::Effect);
    }

    #[test]
    fn stopping_without_an_effect_is_a_no_op() {
        let sm = connected();
        let plan = sm
            .plan(&Setting::Effect(None), &DeviceState::default())
            .unwrap();
        assert!(plan.is_empty());

        let start = sm
            .plan(&Setting::Effect(Some(rainbow())), &DeviceState::default())
            .unwrap();
        assert_eq!(start.steps[0].next, DeviceStatus::Effect);
    }

    #[test]
    fn labels_follow_status() {
        let mut sm = connected();
        let mut state = DeviceState::default();
        assert_eq!(sm.label(&state), "On");
        state.power = false;
        assert_eq!(sm.label(&state), "Off");
        state.effect = Some(rainbow());
        sm.transition(DeviceStatus::Effect).unwrap();
        assert_eq!(sm.label(&state), "Effect: rainbow");
    }
}
