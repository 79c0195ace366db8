//! Device listing and discovery.

use std::sync::Arc;

use serde::Serialize;
use tabled::Tabled;

use lumen_config::Config;
use lumen_core::{Controller, Device, DeviceFamily, TransportKind};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Family")]
    family: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Default")]
    default: String,
}

#[derive(Serialize)]
struct ProfileView {
    name: String,
    label: Option<String>,
    family: DeviceFamily,
    address: String,
    default: bool,
}

impl From<&ProfileView> for ProfileRow {
    fn from(p: &ProfileView) -> Self {
        Self {
            name: p.name.clone(),
            label: p.label.clone().unwrap_or_default(),
            family: p.family.to_string(),
            address: p.address.clone(),
            default: if p.default { "*".into() } else { String::new() },
        }
    }
}

#[derive(Tabled)]
struct DiscoveredRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Family")]
    family: String,
    #[tabled(rename = "Address")]
    address: String,
}

impl From<&Arc<Device>> for DiscoveredRow {
    fn from(d: &Arc<Device>) -> Self {
        Self {
            id: d.id.clone(),
            name: d.name.clone(),
            family: d.family.to_string(),
            address: d.address.clone(),
        }
    }
}

// ── Handlers ────────────────────────────────────────────────────────

/// List the configured profiles. Needs no connection.
pub fn list(cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let profiles: Vec<ProfileView> = cfg
        .devices
        .iter()
        .map(|(name, p)| ProfileView {
            name: name.clone(),
            label: p.label.clone(),
            family: p.family,
            address: p.address.clone(),
            default: cfg.default_device.as_deref() == Some(name.as_str()),
        })
        .collect();

    let out = output::render_list(global.output, &profiles, |p| ProfileRow::from(p), |p| {
        p.name.clone()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn scan(
    controller: &Controller,
    kind: TransportKind,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let found = controller.scan(kind).await?;
    if found.is_empty() && !global.quiet {
        eprintln!("No {kind} devices found");
        return Ok(());
    }
    let out = output::render_list(global.output, &found, |d| DiscoveredRow::from(d), |d| {
        d.address.clone()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
