//! `lumen shell`: a line-oriented session over one connection.
//!
//! Reads commands from stdin until EOF or `quit`. Errors are printed and
//! the session carries on; only a failed connect ends it early.

use std::io::IsTerminal;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use lumen_core::{Controller, CoreError, Device, EffectOptions};

use crate::cli::{GlobalOpts, ShellArgs};
use crate::error::CliError;
use crate::output;

const HELP: &str = "\
color <hex>                 set a solid color
brightness <0-100>          set brightness
power on|off|toggle         switch power (also: on, off, toggle)
effect <name> [speed] [intensity]
stop                        stop the running effect
undo | redo                 walk the command history
status | refresh            show or re-read the device state
preset <name>               recall a preset stored on the device
save <name> | apply <name> | delete <name> | presets
snapshot | snapshots | restore <index>
help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
enum ShellCommand {
    Color(String),
    Brightness(u8),
    Power(Option<bool>),
    Effect { name: String, options: EffectOptions },
    Stop,
    Undo,
    Redo,
    Status,
    Refresh,
    DevicePreset(String),
    Save(String),
    Apply(String),
    Delete(String),
    Presets,
    Snapshot,
    Snapshots,
    Restore(usize),
    Help,
    Quit,
}

fn usage(reason: impl Into<String>) -> CliError {
    CliError::Validation {
        field: "command".into(),
        reason: reason.into(),
    }
}

fn number<T: std::str::FromStr>(word: Option<&str>, what: &str) -> Result<T, CliError> {
    let word = word.ok_or_else(|| usage(format!("missing {what}")))?;
    word.parse()
        .map_err(|_| usage(format!("'{word}' is not a valid {what}")))
}

fn word(word: Option<&str>, what: &str) -> Result<String, CliError> {
    word.map(str::to_owned)
        .ok_or_else(|| usage(format!("missing {what}")))
}

fn parse(line: &str) -> Result<ShellCommand, CliError> {
    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or_default().to_ascii_lowercase();
    let arg = words.next();

    let command = match verb.as_str() {
        "color" | "colour" => ShellCommand::Color(word(arg, "color")?),
        "brightness" | "bri" => ShellCommand::Brightness(number(arg, "brightness")?),
        "power" => match arg {
            Some("on") => ShellCommand::Power(Some(true)),
            Some("off") => ShellCommand::Power(Some(false)),
            Some("toggle") => ShellCommand::Power(None),
            _ => return Err(usage("power takes on, off or toggle")),
        },
        "on" => ShellCommand::Power(Some(true)),
        "off" => ShellCommand::Power(Some(false)),
        "toggle" => ShellCommand::Power(None),
        "effect" | "fx" => {
            let name = word(arg, "effect name")?;
            let speed = words.next().map(|w| number(Some(w), "speed")).transpose()?;
            let intensity = words
                .next()
                .map(|w| number(Some(w), "intensity"))
                .transpose()?;
            ShellCommand::Effect {
                name,
                options: EffectOptions { speed, intensity },
            }
        }
        "stop" => ShellCommand::Stop,
        "undo" | "u" => ShellCommand::Undo,
        "redo" | "r" => ShellCommand::Redo,
        "status" | "st" => ShellCommand::Status,
        "refresh" => ShellCommand::Refresh,
        "preset" => ShellCommand::DevicePreset(word(arg, "preset name")?),
        "save" => ShellCommand::Save(word(arg, "preset name")?),
        "apply" => ShellCommand::Apply(word(arg, "preset name")?),
        "delete" => ShellCommand::Delete(word(arg, "preset name")?),
        "presets" => ShellCommand::Presets,
        "snapshot" => ShellCommand::Snapshot,
        "snapshots" => ShellCommand::Snapshots,
        "restore" => ShellCommand::Restore(number(arg, "snapshot index")?),
        "help" | "?" => ShellCommand::Help,
        "quit" | "exit" | "q" => ShellCommand::Quit,
        other => return Err(usage(format!("unknown command '{other}' (try 'help')"))),
    };
    Ok(command)
}

/// Run one command; returns the text to print.
async fn execute(
    controller: &Controller,
    command: ShellCommand,
    colored: bool,
) -> Result<String, CoreError> {
    let changed = match command {
        ShellCommand::Color(hex) => controller.set_color(&hex).await?,
        ShellCommand::Brightness(level) => controller.set_brightness(level).await?,
        ShellCommand::Power(Some(on)) => controller.set_power(on).await?,
        ShellCommand::Power(None) => controller.toggle_power().await?,
        ShellCommand::Effect { name, options } => controller.set_effect(&name, options).await?,
        ShellCommand::Stop => controller.stop_effect().await?,
        ShellCommand::Undo => {
            if !controller.undo().await? {
                return Ok("nothing to undo".into());
            }
            true
        }
        ShellCommand::Redo => {
            if !controller.redo().await? {
                return Ok("nothing to redo".into());
            }
            true
        }
        ShellCommand::Status => true,
        ShellCommand::Refresh => controller.refresh_status().await?,
        ShellCommand::DevicePreset(name) => {
            controller.recall_device_preset(&name).await?;
            true
        }
        ShellCommand::Save(name) => {
            controller.save_preset(&name).await?;
            return Ok(format!("saved preset '{name}'"));
        }
        ShellCommand::Apply(name) => controller.apply_preset(&name).await?,
        ShellCommand::Delete(name) => {
            controller.delete_preset(&name).await?;
            return Ok(format!("deleted preset '{name}'"));
        }
        ShellCommand::Presets => {
            let names = controller.presets().await?;
            return Ok(if names.is_empty() {
                "no saved presets".into()
            } else {
                names.join("\n")
            });
        }
        ShellCommand::Snapshot => {
            let taken = controller.capture_snapshot().await?;
            return Ok(if taken {
                "snapshot taken".into()
            } else {
                "state unchanged since the last snapshot".into()
            });
        }
        ShellCommand::Snapshots => return Ok(list_snapshots(controller, colored)),
        ShellCommand::Restore(index) => controller.restore_snapshot(index).await?,
        ShellCommand::Help => return Ok(HELP.into()),
        ShellCommand::Quit => return Ok(String::new()),
    };

    let line = output::status_line(&controller.state(), colored);
    Ok(if changed {
        line
    } else {
        format!("{line} (unchanged)")
    })
}

fn list_snapshots(controller: &Controller, colored: bool) -> String {
    let snapshots = controller.snapshots();
    if snapshots.is_empty() {
        return "no snapshots".into();
    }
    snapshots
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "{i:>3}  {}  {} {:>3}%  {}",
                s.captured_at.format("%H:%M:%S"),
                output::swatch(s.state.color, colored),
                s.state.brightness,
                if s.state.power { "on" } else { "off" },
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn run(
    controller: &Controller,
    device: Device,
    args: &ShellArgs,
    global: &GlobalOpts,
    colored: bool,
) -> Result<(), CliError> {
    controller.connect(device).await?;
    output::print_output(&output::status_line(&controller.state(), colored), global.quiet);

    let watcher = args.events.then(|| {
        let mut events = controller.events();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => match serde_json::to_string(&*event) {
                        Ok(json) => eprintln!("event: {json}"),
                        Err(e) => tracing::warn!(error = %e, "unprintable event"),
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event printer fell behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    let interactive = std::io::stdin().is_terminal();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        if interactive {
            stdout.write_all(b"lumen> ").await?;
            stdout.flush().await?;
        }
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let result = match parse(line) {
            Ok(ShellCommand::Quit) => break,
            Ok(command) => execute(controller, command, colored)
                .await
                .map_err(CliError::from),
            Err(e) => Err(e),
        };
        match result {
            Ok(out) => output::print_output(&out, global.quiet),
            Err(e) => eprintln!("{:?}", miette::Report::new(e)),
        }
    }

    controller.disconnect().await;
    if let Some(watcher) = watcher {
        watcher.abort();
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_aliases() {
        assert_eq!(parse("color #ff0000").unwrap(), ShellCommand::Color("#ff0000".into()));
        assert_eq!(parse("BRI 40").unwrap(), ShellCommand::Brightness(40));
        assert_eq!(parse("toggle").unwrap(), ShellCommand::Power(None));
        assert_eq!(parse("power off").unwrap(), ShellCommand::Power(Some(false)));
        assert_eq!(
            parse("fx rainbow 30").unwrap(),
            ShellCommand::Effect {
                name: "rainbow".into(),
                options: EffectOptions {
                    speed: Some(30),
                    intensity: None
                }
            }
        );
        assert_eq!(parse("restore 2").unwrap(), ShellCommand::Restore(2));
        assert_eq!(parse("exit").unwrap(), ShellCommand::Quit);
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(parse("brightness lots").is_err());
        assert!(parse("color").is_err());
        assert!(parse("power sideways").is_err());
        assert!(parse("dance").is_err());
    }
}
