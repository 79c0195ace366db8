//! End-to-end behaviour of the controller against a simulated device.
#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use lumen_core::{
    Controller, ControllerConfig, ControllerEvent, CoreError, Device, DeviceFamily, DeviceStatus,
    EffectOptions, InMemoryRepository, MockFactory, MockHandle, NoopAnalytics, Repository, Rgb,
    SimulatedDevice,
};
use lumen_transport::{MockConnect, MockSend};
use pretty_assertions::assert_eq;
use tokio::sync::broadcast;

fn lamp() -> Device {
    Device::new("lamp", "Desk lamp", "mock://lamp", DeviceFamily::Mock)
}

fn quiet_config() -> ControllerConfig {
    ControllerConfig {
        query_status_on_connect: false,
        ..ControllerConfig::default()
    }
}

fn controller_with(
    config: ControllerConfig,
    handle: &MockHandle,
    repository: Arc<dyn Repository>,
) -> Controller {
    Controller::builder(config)
        .transport_factory(Arc::new(MockFactory::new(handle.clone())))
        .repository(repository)
        .analytics(Arc::new(NoopAnalytics))
        .build()
}

fn simulated(config: ControllerConfig) -> (Controller, MockHandle, SimulatedDevice) {
    let handle = MockHandle::new();
    let device = SimulatedDevice::attach(&handle);
    let controller = controller_with(config, &handle, Arc::new(InMemoryRepository::new()));
    (controller, handle, device)
}

fn drain(events: &mut broadcast::Receiver<Arc<ControllerEvent>>) -> Vec<Arc<ControllerEvent>> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

// ── Connection ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn healthy_device_connects_in_one_attempt() {
    let (controller, handle, _device) = simulated(ControllerConfig::default());
    controller.connect(lamp()).await.unwrap();

    assert_eq!(handle.connect_attempts(), 1);
    let state = controller.state();
    assert!(state.connection.is_connected());
    assert_eq!(state.status, DeviceStatus::Idle);
    assert_eq!(state.label, "On");
    assert_eq!(state.device.as_ref().unwrap().id, "lamp");
    // The initial status query is the only traffic.
    assert_eq!(handle.sent_lines(), vec!["STATUS"]);
}

#[tokio::test(start_paused = true)]
async fn unreachable_device_is_tried_exactly_three_times() {
    let (controller, handle, _device) = simulated(quiet_config());
    handle.connect_default(MockConnect::Fail("no route to host".into()));
    let mut events = controller.events();

    let err = controller.connect(lamp()).await.unwrap_err();
    assert!(matches!(err, CoreError::Connection { .. }));
    assert_eq!(handle.connect_attempts(), 3);

    let state = controller.state();
    assert_eq!(state.status, DeviceStatus::Error);
    assert!(
        drain(&mut events)
            .iter()
            .any(|e| matches!(&**e, ControllerEvent::ConnectionError { .. }))
    );
}

#[tokio::test(start_paused = true)]
async fn permission_problems_abort_without_retrying() {
    let (controller, handle, _device) = simulated(quiet_config());
    handle.deny_preflight("bluetooth is switched off");

    let err = controller.connect(lamp()).await.unwrap_err();
    assert!(matches!(err, CoreError::Permission { .. }));
    assert_eq!(handle.connect_attempts(), 0);
    assert_eq!(controller.state().status, DeviceStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn disconnect_always_ends_disconnected() {
    let (controller, handle, _device) = simulated(quiet_config());
    controller.connect(lamp()).await.unwrap();
    handle.fail_disconnect();
    let mut events = controller.events();

    controller.disconnect().await;

    let state = controller.state();
    assert_eq!(state.status, DeviceStatus::Disconnected);
    assert!(!handle.is_connected());
    assert!(
        drain(&mut events)
            .iter()
            .any(|e| matches!(&**e, ControllerEvent::Disconnected { .. }))
    );
}

#[tokio::test(start_paused = true)]
async fn reconnecting_replaces_the_previous_session() {
    let (controller, handle, _device) = simulated(quiet_config());
    controller.connect(lamp()).await.unwrap();
    controller.set_brightness(40).await.unwrap();

    controller.connect(lamp()).await.unwrap();
    assert_eq!(handle.connect_attempts(), 2);
    let state = controller.state();
    assert!(state.connection.is_connected());
    assert!(!state.can_undo);
}

// ── Boundary checks ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn mutations_while_disconnected_are_rejected_without_io() {
    let (controller, handle, _device) = simulated(quiet_config());

    let results = [
        controller.set_color("#ff0000").await,
        controller.set_brightness(50).await,
        controller.toggle_power().await,
        controller
            .set_effect("rainbow", EffectOptions::default())
            .await,
        controller.undo().await,
    ];
    for result in results {
        let err = result.unwrap_err();
        assert!(
            matches!(
                err,
                CoreError::IllegalState {
                    status: DeviceStatus::Disconnected,
                    ..
                }
            ),
            "unexpected {err:?}"
        );
    }
    assert_eq!(handle.send_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn mutations_after_a_failed_connect_report_the_error_status() {
    let (controller, handle, _device) = simulated(quiet_config());
    handle.connect_default(MockConnect::Fail("refused".into()));
    controller.connect(lamp()).await.unwrap_err();

    let err = controller.set_color("#00ff00").await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::IllegalState {
            status: DeviceStatus::Error,
            ..
        }
    ));
    assert_eq!(handle.send_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn malformed_input_never_reaches_the_wire() {
    let (controller, handle, _device) = simulated(quiet_config());
    controller.connect(lamp()).await.unwrap();

    assert!(matches!(
        controller.set_color("red").await.unwrap_err(),
        CoreError::Validation { .. }
    ));
    assert!(matches!(
        controller.set_brightness(101).await.unwrap_err(),
        CoreError::Validation { .. }
    ));
    assert!(matches!(
        controller
            .set_effect(
                "rainbow",
                EffectOptions {
                    speed: Some(120),
                    intensity: None
                }
            )
            .await
            .unwrap_err(),
        CoreError::Validation { .. }
    ));
    assert_eq!(handle.send_attempts(), 0);
}

// ── Undo / redo ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn undoing_everything_restores_defaults_and_keeps_the_link() {
    let (controller, _handle, device) = simulated(ControllerConfig::default());
    controller.connect(lamp()).await.unwrap();

    assert!(controller.set_color("#ff0000").await.unwrap());
    assert!(controller.set_brightness(80).await.unwrap());
    assert!(controller.undo().await.unwrap());
    assert!(controller.undo().await.unwrap());

    let state = controller.state();
    assert_eq!(state.state.color, Rgb::WHITE);
    assert_eq!(state.state.brightness, 100);
    assert!(state.connection.is_connected());
    assert!(!state.can_undo);
    assert!(state.can_redo);
    assert_eq!(device.state().color, Rgb::WHITE);
    assert_eq!(device.state().brightness, 100);
}

#[tokio::test(start_paused = true)]
async fn redo_reapplies_and_a_new_command_drops_the_redo_branch() {
    let (controller, _handle, device) = simulated(quiet_config());
    controller.connect(lamp()).await.unwrap();

    controller.set_color("#0000ff").await.unwrap();
    controller.undo().await.unwrap();
    assert!(controller.redo().await.unwrap());
    assert_eq!(device.state().color, Rgb::new(0, 0, 255));

    controller.undo().await.unwrap();
    controller.set_brightness(30).await.unwrap();
    let state = controller.state();
    assert!(!state.can_redo);
    assert_eq!(state.history_len, 1);
    assert!(!controller.redo().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn toggling_power_is_undoable() {
    let (controller, handle, device) = simulated(quiet_config());
    controller.connect(lamp()).await.unwrap();

    controller.toggle_power().await.unwrap();
    assert!(!device.state().power);
    assert_eq!(controller.state().label, "Off");

    controller.undo().await.unwrap();
    assert!(device.state().power);
    assert_eq!(handle.sent_lines(), vec!["POWER_OFF", "POWER_ON"]);
}

#[tokio::test(start_paused = true)]
async fn rejected_commands_are_retried_and_never_recorded() {
    let handle = MockHandle::new();
    handle.respond_with(|frame| {
        let reply: &[u8] = if frame.starts_with(b"COLOR") {
            b"ERR:E_BUSY\n"
        } else {
            b"OK\n"
        };
        Some(reply.to_vec())
    });
    let controller = controller_with(quiet_config(), &handle, Arc::new(InMemoryRepository::new()));
    controller.connect(lamp()).await.unwrap();

    let err = controller.set_color("#123456").await.unwrap_err();
    assert!(matches!(err, CoreError::Command { ref code, .. } if code == "E_BUSY"));
    assert_eq!(handle.send_attempts(), 3);

    let state = controller.state();
    assert!(state.connection.is_connected());
    assert_eq!(state.state.color, Rgb::WHITE);
    assert!(!state.can_undo);
}

#[tokio::test(start_paused = true)]
async fn broken_link_moves_the_controller_to_error() {
    let (controller, handle, _device) = simulated(quiet_config());
    controller.connect(lamp()).await.unwrap();
    for _ in 0..3 {
        handle.on_send(MockSend::Fail("broken pipe".into()));
    }

    controller.set_brightness(10).await.unwrap_err();
    let state = controller.state();
    assert_eq!(state.status, DeviceStatus::Error);
    assert!(!state.can_undo);
    assert!(matches!(
        controller.set_brightness(20).await.unwrap_err(),
        CoreError::IllegalState { .. }
    ));
}

// ── Effects ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn solid_color_stops_a_running_effect_first() {
    let (controller, handle, device) = simulated(quiet_config());
    controller.connect(lamp()).await.unwrap();

    controller
        .set_effect("rainbow", EffectOptions::default())
        .await
        .unwrap();
    assert_eq!(controller.state().status, DeviceStatus::Effect);
    assert_eq!(controller.state().label, "Effect: rainbow");
    handle.clear_sent();

    controller.set_color("#00ff00").await.unwrap();
    assert_eq!(handle.sent_lines(), vec!["STOP_EFFECT", "COLOR:0,255,0"]);
    assert_eq!(controller.state().status, DeviceStatus::Idle);
    assert_eq!(device.state().effect, None);
    assert_eq!(device.state().color, Rgb::new(0, 255, 0));

    // Undo brings the effect back as well as the old color.
    controller.undo().await.unwrap();
    assert_eq!(controller.state().status, DeviceStatus::Effect);
    assert_eq!(device.state().color, Rgb::WHITE);
}

#[tokio::test(start_paused = true)]
async fn brightness_changes_keep_the_effect_running() {
    let (controller, handle, _device) = simulated(quiet_config());
    controller.connect(lamp()).await.unwrap();
    controller
        .set_effect("pulse", EffectOptions::default())
        .await
        .unwrap();
    handle.clear_sent();

    controller.set_brightness(25).await.unwrap();
    assert_eq!(handle.sent_lines(), vec!["BRIGHTNESS:25"]);
    assert_eq!(controller.state().status, DeviceStatus::Effect);

    controller.stop_effect().await.unwrap();
    assert_eq!(controller.state().status, DeviceStatus::Idle);
}

// ── Events and streams ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn every_change_is_broadcast() {
    let (controller, _handle, _device) = simulated(quiet_config());
    let mut events = controller.events();
    controller.connect(lamp()).await.unwrap();
    controller.set_brightness(80).await.unwrap();
    controller.set_color("#ff0000").await.unwrap();

    let names: Vec<&str> = drain(&mut events).iter().map(|e| e.name()).collect();
    let position = |name: &str| names.iter().position(|n| *n == name);
    assert!(position("connected").is_some(), "{names:?}");
    assert!(position("brightness_changed") < position("color_changed"));
    assert!(
        names.contains(&"status_changed"),
        "entering Idle is announced: {names:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn state_stream_sees_mutations() {
    let (controller, _handle, _device) = simulated(quiet_config());
    controller.connect(lamp()).await.unwrap();
    let mut stream = controller.state_stream();
    assert!(stream.current().connection.is_connected());

    controller.set_brightness(15).await.unwrap();
    let latest = stream.changed().await.unwrap();
    assert_eq!(latest.state.brightness, 15);
    assert_eq!(stream.current().state.brightness, 15);
}

// ── Presets and snapshots ───────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn presets_apply_as_a_single_undo_step() {
    let (controller, _handle, device) = simulated(quiet_config());
    controller.connect(lamp()).await.unwrap();

    controller.set_color("#ff8800").await.unwrap();
    controller.set_brightness(40).await.unwrap();
    controller.save_preset("sunset").await.unwrap();
    assert_eq!(controller.presets().await.unwrap(), vec!["sunset"]);

    controller.set_color("#0000ff").await.unwrap();
    controller.set_brightness(90).await.unwrap();
    assert!(controller.apply_preset("sunset").await.unwrap());
    assert_eq!(device.state().color, Rgb::new(0xFF, 0x88, 0x00));
    assert_eq!(device.state().brightness, 40);

    controller.undo().await.unwrap();
    assert_eq!(device.state().color, Rgb::new(0, 0, 255));
    assert_eq!(device.state().brightness, 90);

    controller.delete_preset("sunset").await.unwrap();
    assert!(matches!(
        controller.apply_preset("sunset").await.unwrap_err(),
        CoreError::NotFound { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn device_presets_refresh_the_reported_state() {
    let (controller, _handle, _device) = simulated(quiet_config());
    controller.connect(lamp()).await.unwrap();

    controller.recall_device_preset("night").await.unwrap();
    let state = controller.state();
    assert_eq!(state.state.brightness, 10);
    assert!(!state.can_undo);

    assert!(matches!(
        controller.recall_device_preset("disco").await.unwrap_err(),
        CoreError::Command { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn snapshots_restore_without_touching_history_and_survive_reconnects() {
    let handle = MockHandle::new();
    let device = SimulatedDevice::attach(&handle);
    let repository: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
    let controller = controller_with(quiet_config(), &handle, Arc::clone(&repository));
    controller.connect(lamp()).await.unwrap();

    controller.set_color("#ff0000").await.unwrap();
    assert!(controller.capture_snapshot().await.unwrap());
    controller.set_color("#00ff00").await.unwrap();
    let history_len = controller.state().history_len;

    assert!(controller.restore_snapshot(0).await.unwrap());
    assert_eq!(device.state().color, Rgb::new(255, 0, 0));
    assert_eq!(controller.state().history_len, history_len);
    assert!(matches!(
        controller.restore_snapshot(99).await.unwrap_err(),
        CoreError::NotFound { .. }
    ));

    controller.disconnect().await;
    assert!(!controller.snapshots().is_empty());

    let again = controller_with(quiet_config(), &handle, repository);
    again.connect(lamp()).await.unwrap();
    assert!(!again.snapshots().is_empty());
}

#[tokio::test(start_paused = true)]
async fn a_burst_of_changes_settles_into_one_snapshot() {
    let (controller, _handle, _device) = simulated(quiet_config());
    controller.connect(lamp()).await.unwrap();

    controller.set_color_rgb(Rgb::new(1, 2, 3)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    controller.set_color_rgb(Rgb::new(4, 5, 6)).await.unwrap();

    // The first change's quiet period has passed, the second's has not.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(controller.snapshots().is_empty());

    tokio::time::sleep(Duration::from_millis(200)).await;
    let snapshots = controller.snapshots();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].state.color, Rgb::new(4, 5, 6));
}

#[tokio::test(start_paused = true)]
async fn run_once_connects_and_disconnects_around_the_work() {
    let (controller, handle, _device) = simulated(quiet_config());

    let level = controller
        .run_once(lamp(), |c| async move {
            c.set_brightness(55).await?;
            Ok(c.state().state.brightness)
        })
        .await
        .unwrap();

    assert_eq!(level, 55);
    assert!(!handle.is_connected());
    assert_eq!(controller.state().status, DeviceStatus::Disconnected);
}
