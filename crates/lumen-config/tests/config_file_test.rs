//! Loading and saving config files on disk.
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use lumen_config::{
    Config, DeviceProfile, load_config_from, save_config_to, to_controller_config,
};
use lumen_core::DeviceFamily;
use pretty_assertions::assert_eq;

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(cfg.defaults.retries, 3);
    assert_eq!(cfg.defaults.output, "table");
    assert!(cfg.devices.is_empty());
}

#[test]
fn partial_files_keep_unset_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
default_device = "strip"

[defaults]
retries = 5
command_timeout_ms = 750

[devices.strip]
address = "192.168.1.40:4210"
family = "wifi-json"
"#,
    )
    .unwrap();

    let cfg = load_config_from(&path).unwrap();
    assert_eq!(cfg.defaults.retries, 5);
    assert_eq!(cfg.defaults.baud_rate, 9600);
    let (name, profile) = cfg.resolve_device(None).unwrap();
    assert_eq!(name, "strip");
    assert_eq!(profile.family, DeviceFamily::WifiJson);

    let controller = to_controller_config(&cfg, Some(profile));
    assert_eq!(controller.retry.max_attempts, 5);
    assert_eq!(controller.command_timeout, Duration::from_millis(750));
}

#[test]
fn saved_config_loads_back_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut cfg = Config::default();
    cfg.upsert_device(
        "desk",
        DeviceProfile {
            address: "AA:BB:CC:DD:EE:FF".into(),
            family: DeviceFamily::BleText,
            label: None,
            baud_rate: None,
            connect_timeout: Some(20),
        },
    )
    .unwrap();
    save_config_to(&cfg, &path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("family = \"ble-text\""), "{text}");
    assert_eq!(load_config_from(&path).unwrap(), cfg);
}

#[test]
fn unknown_families_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[devices.desk]\naddress = \"/dev/ttyUSB0\"\nfamily = \"zigbee\"\n",
    )
    .unwrap();

    assert!(load_config_from(&path).is_err());
}
