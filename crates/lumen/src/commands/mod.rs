//! Command dispatch: bridges CLI args -> controller operations -> output.

pub mod config_cmd;
pub mod control;
pub mod devices;
pub mod shell;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use lumen_config::Config;
use lumen_core::{
    Controller, Device, DeviceFamily, DiscoveredPeer, MockFactory, MockHandle, SimulatedDevice,
    TransportKind,
};

use crate::cli::{Command, FamilyArg, GlobalOpts, TransportArg};
use crate::error::CliError;
use crate::output;

/// A built controller and the device it should talk to, if one was named.
pub struct Target {
    pub controller: Controller,
    pub device: Option<Device>,
}

impl Target {
    fn require_device(&self, global: &GlobalOpts) -> Result<Device, CliError> {
        self.device.clone().ok_or_else(|| CliError::NoDevice {
            path: config_file(global.config.as_ref()).display().to_string(),
        })
    }
}

pub fn family(arg: FamilyArg) -> DeviceFamily {
    match arg {
        FamilyArg::SerialText => DeviceFamily::SerialText,
        FamilyArg::BleText => DeviceFamily::BleText,
        FamilyArg::WifiJson => DeviceFamily::WifiJson,
        FamilyArg::SerialBinary => DeviceFamily::SerialBinary,
        FamilyArg::Mock => DeviceFamily::Mock,
    }
}

fn transport(arg: TransportArg) -> TransportKind {
    match arg {
        TransportArg::Serial => TransportKind::Serial,
        TransportArg::Ble => TransportKind::Ble,
        TransportArg::Socket => TransportKind::Socket,
        TransportArg::Mock => TransportKind::Mock,
    }
}

// ── Config file ──────────────────────────────────────────────────────

/// `--config` if given, the platform location otherwise.
pub fn config_file(explicit: Option<&PathBuf>) -> PathBuf {
    explicit.cloned().unwrap_or_else(lumen_config::config_path)
}

pub fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(lumen_config::load_config_from(&config_file(
        global.config.as_ref(),
    ))?)
}

// ── Target resolution ────────────────────────────────────────────────

fn simulator_device() -> Device {
    Device::new("sim", "Simulated strip", "mock://sim", DeviceFamily::Mock)
}

/// Build the controller for a device-bound command.
///
/// Device precedence: `--address`/`--family`, then `--device` or the
/// config's `default_device`, then (with `--simulate`) a built-in
/// simulated strip.
pub fn build_target(
    global: &GlobalOpts,
    cfg: &Config,
    scan_window: Option<u64>,
) -> Result<Target, CliError> {
    let (device, profile) = match (&global.address, global.family) {
        (Some(address), Some(fam)) => (
            Some(Device::new(
                address.clone(),
                address.clone(),
                address.clone(),
                family(fam),
            )),
            None,
        ),
        _ if global.device.is_some() || cfg.default_device.is_some() => {
            let (name, profile) = cfg.resolve_device(global.device.as_deref())?;
            (
                Some(lumen_config::profile_to_device(&name, profile)),
                Some(profile),
            )
        }
        _ => (global.simulate.then(simulator_device), None),
    };

    let mut config = lumen_config::to_controller_config(cfg, profile);
    if let Some(secs) = global.timeout {
        config.connect_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = scan_window {
        config.discovery_window = Duration::from_secs(secs);
    }

    if !global.simulate {
        return Ok(Target {
            controller: Controller::new(config),
            device,
        });
    }

    // The simulator speaks the line protocol whatever the profile says.
    let handle = MockHandle::new();
    SimulatedDevice::attach(&handle);
    for (address, name) in [
        ("mock://desk", "Lumen Desk Lamp"),
        ("mock://shelf", "Lumen Shelf Strip"),
    ] {
        handle.add_peer(DiscoveredPeer {
            address: address.into(),
            name: Some(name.into()),
            kind: TransportKind::Mock,
            rssi: None,
        });
    }
    let device = device.map(|d| Device {
        family: DeviceFamily::Mock,
        ..d
    });
    Ok(Target {
        controller: Controller::builder(config)
            .transport_factory(Arc::new(MockFactory::new(handle)))
            .build(),
        device,
    })
}

/// Dispatch a device-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, target: &Target, global: &GlobalOpts) -> Result<(), CliError> {
    let colored = output::should_color(global.color);
    match cmd {
        Command::Scan(args) => {
            devices::scan(&target.controller, transport(args.transport), global).await
        }
        Command::Shell(args) => {
            let device = target.require_device(global)?;
            shell::run(&target.controller, device, &args, global, colored).await
        }
        other => {
            let action = control::Action::from_command(other)?;
            let device = target.require_device(global)?;
            control::handle(&target.controller, device, action, global, colored).await
        }
    }
}
