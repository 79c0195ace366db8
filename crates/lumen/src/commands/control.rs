//! One-shot device control: connect, apply, print the resulting state,
//! disconnect.

use lumen_core::{Controller, Device, EffectOptions};

use crate::cli::{Command, GlobalOpts, PowerState};
use crate::error::CliError;
use crate::output;

/// What a one-shot invocation should do once connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Status,
    Color(String),
    Brightness(u8),
    Power(PowerState),
    Effect {
        name: String,
        options: EffectOptions,
    },
    StopEffect,
    DevicePreset(String),
}

impl Action {
    pub fn from_command(cmd: Command) -> Result<Self, CliError> {
        Ok(match cmd {
            Command::Status => Self::Status,
            Command::Color(args) => Self::Color(args.hex),
            Command::Brightness(args) => Self::Brightness(args.level),
            Command::Power(args) => Self::Power(args.state),
            Command::Effect(args) if args.stop => Self::StopEffect,
            Command::Effect(args) => Self::Effect {
                name: args.name.unwrap_or_default(),
                options: EffectOptions {
                    speed: args.speed,
                    intensity: args.intensity,
                },
            },
            Command::Preset(args) => Self::DevicePreset(args.name),
            other => {
                return Err(CliError::Internal {
                    message: format!("{other:?} is not a device action"),
                });
            }
        })
    }

    async fn apply(self, controller: &Controller) -> Result<(), lumen_core::CoreError> {
        match self {
            Self::Status => {}
            Self::Color(hex) => {
                controller.set_color(&hex).await?;
            }
            Self::Brightness(level) => {
                controller.set_brightness(level).await?;
            }
            Self::Power(PowerState::On) => {
                controller.set_power(true).await?;
            }
            Self::Power(PowerState::Off) => {
                controller.set_power(false).await?;
            }
            Self::Power(PowerState::Toggle) => {
                controller.toggle_power().await?;
            }
            Self::Effect { name, options } => {
                controller.set_effect(&name, options).await?;
            }
            Self::StopEffect => {
                controller.stop_effect().await?;
            }
            Self::DevicePreset(name) => controller.recall_device_preset(&name).await?,
        }
        Ok(())
    }
}

pub async fn handle(
    controller: &Controller,
    device: Device,
    action: Action,
    global: &GlobalOpts,
    colored: bool,
) -> Result<(), CliError> {
    tracing::debug!(?action, device = %device.id, "running one-shot action");
    let view = controller
        .run_once(device, |c| async move {
            action.apply(&c).await?;
            Ok(c.state())
        })
        .await?;

    let out = output::render_single(
        global.output,
        &*view,
        |v| output::state_detail(v, colored),
        |v| v.label.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::Cli;

    fn action(args: &[&str]) -> Action {
        let cli = Cli::try_parse_from(std::iter::once("lumen").chain(args.iter().copied())).unwrap();
        Action::from_command(cli.command).unwrap()
    }

    #[test]
    fn commands_map_to_actions() {
        assert_eq!(action(&["color", "#ff0000"]), Action::Color("#ff0000".into()));
        assert_eq!(action(&["bri", "40"]), Action::Brightness(40));
        assert_eq!(action(&["power", "toggle"]), Action::Power(PowerState::Toggle));
        assert_eq!(action(&["effect", "--stop"]), Action::StopEffect);
        assert_eq!(
            action(&["fx", "rainbow", "--speed", "20"]),
            Action::Effect {
                name: "rainbow".into(),
                options: EffectOptions {
                    speed: Some(20),
                    intensity: None
                }
            }
        );
    }

    #[test]
    fn out_of_range_brightness_is_a_usage_error() {
        assert!(Cli::try_parse_from(["lumen", "brightness", "101"]).is_err());
    }
}
