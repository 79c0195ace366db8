//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one identifier per line.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use lumen_core::{ControllerState, Rgb};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Hex code, preceded by a block in that color when color is on.
pub fn swatch(color: Rgb, colored: bool) -> String {
    if colored {
        format!("{} {color}", "  ".on_truecolor(color.r, color.g, color.b))
    } else {
        color.to_string()
    }
}

// ── Controller state ─────────────────────────────────────────────────

/// One-line summary used by the shell after every command.
pub fn status_line(view: &ControllerState, colored: bool) -> String {
    let effect = view
        .state
        .effect
        .as_ref()
        .map_or_else(|| "none".to_owned(), |e| e.id.to_string());
    let label = if colored {
        view.label.bold().to_string()
    } else {
        view.label.clone()
    };
    format!(
        "{label} | color {} | brightness {}% | effect {effect}",
        swatch(view.state.color, colored),
        view.state.brightness,
    )
}

/// Multi-line detail view for `status` and friends.
pub fn state_detail(view: &ControllerState, colored: bool) -> String {
    let device = view
        .device
        .as_ref()
        .map_or_else(|| "-".to_owned(), |d| format!("{} ({})", d.name, d.address));
    let effect = view.state.effect.as_ref().map_or_else(
        || "none".to_owned(),
        |e| format!("{} (speed {}, intensity {})", e.id, e.speed, e.intensity),
    );
    [
        format!("Device:     {device}"),
        format!("Status:     {}", view.label),
        format!("Power:      {}", if view.state.power { "on" } else { "off" }),
        format!("Color:      {}", swatch(view.state.color, colored)),
        format!("Brightness: {}%", view.state.brightness),
        format!("Effect:     {effect}"),
    ]
    .join("\n")
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Ok(render_table(&rows))
        }
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => Ok(data.iter().map(&id_fn).collect::<Vec<_>>().join("\n")),
    }
}

/// Render a single serde-serializable item in the chosen format.
///
/// Table rendering uses `detail_fn`, since single-item views don't use
/// `Tabled`.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    match format {
        OutputFormat::Table => Ok(detail_fn(data)),
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => Ok(id_fn(data)),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

pub(crate) fn render_json<T: serde::Serialize + ?Sized>(
    data: &T,
    compact: bool,
) -> Result<String, CliError> {
    let text = if compact {
        serde_json::to_string(data)?
    } else {
        serde_json::to_string_pretty(data)?
    };
    Ok(text)
}

fn render_yaml<T: serde::Serialize + ?Sized>(data: &T) -> Result<String, CliError> {
    Ok(serde_yaml::to_string(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_status_line_has_no_escape_codes() {
        let line = status_line(&ControllerState::default(), false);
        assert_eq!(
            line,
            "Disconnected | color #ffffff | brightness 100% | effect none"
        );
    }
}
