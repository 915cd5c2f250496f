//! LocalBusDevice against the in-memory USB bus.
//!
//! Relay pulses use real time; durations are kept short.

use kiosk_core::config::UsbConfig;
use kiosk_core::constants::{RELAY_OFF_FRAME, RELAY_ON_FRAME};
use kiosk_hardware::mock::{BusCall, BusFailure, MockUsbBus, MockUsbBusHandle};
use kiosk_hardware::{HardwareError, LocalBusDevice, TriggerDevice};
use rstest::rstest;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn relay() -> (LocalBusDevice, MockUsbBusHandle) {
    let (bus, handle) = MockUsbBus::new();
    (LocalBusDevice::new(Arc::new(bus), UsbConfig::default()), handle)
}

#[tokio::test]
async fn test_trigger_sends_on_then_off_after_duration() {
    let (mut device, bus) = relay();
    device.connect().await.unwrap();
    bus.clear_calls();

    let started = Instant::now();
    let outcome = device.trigger(60).await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(60));
    assert!(outcome.ok);
    assert_eq!(outcome.duration_ms, Some(60));
    assert_eq!(
        bus.control_payloads(),
        vec![RELAY_ON_FRAME.to_vec(), RELAY_OFF_FRAME.to_vec()]
    );
}

#[tokio::test]
async fn test_control_transfer_shape() {
    let (mut device, bus) = relay();
    device.connect().await.unwrap();
    bus.clear_calls();

    device.trigger(1).await.unwrap();

    for call in bus.calls() {
        match call {
            BusCall::ControlOut {
                request,
                value,
                index,
                payload,
            } => {
                assert_eq!(request, 0x09);
                assert_eq!(value, 0x0300);
                assert_eq!(index, 0x00);
                assert_eq!(payload.len(), 8);
            }
            other => panic!("unexpected bus call {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_connect_fails_when_board_missing() {
    let (mut device, bus) = relay();
    bus.fail_at(BusFailure::Open);

    let err = device.connect().await.unwrap_err();

    assert!(matches!(err, HardwareError::Connection { .. }));
    assert!(!device.is_connected());
    assert_eq!(bus.calls().len(), 1);
}

#[rstest]
#[case::selection(BusFailure::SelectConfiguration, 3)]
#[case::claim(BusFailure::ClaimInterface, 4)]
#[tokio::test]
async fn test_connect_aborts_at_failed_step(#[case] failure: BusFailure, #[case] calls: usize) {
    let (mut device, bus) = relay();
    bus.fail_at(failure);

    let err = device.connect().await.unwrap_err();

    assert!(matches!(err, HardwareError::HardwareTransfer { .. }));
    assert!(!device.is_connected());
    assert_eq!(bus.calls().len(), calls);
}

#[rstest]
#[case::on_frame(0, 1)]
#[case::off_frame(1, 2)]
#[tokio::test]
async fn test_failed_frame_reports_transfer_error(#[case] frame: usize, #[case] sent: usize) {
    let (mut device, bus) = relay();
    device.connect().await.unwrap();
    bus.clear_calls();
    bus.fail_at(BusFailure::ControlOut(frame));

    let err = device.trigger(10).await.unwrap_err();

    assert!(matches!(err, HardwareError::HardwareTransfer { .. }));
    assert!(err.to_string().contains("Transfer failed"));
    assert_eq!(bus.control_payloads().len(), sent);
}

#[tokio::test]
async fn test_failed_frame_surfaces_in_outcome() {
    let (mut device, bus) = relay();
    device.connect().await.unwrap();
    bus.fail_at(BusFailure::ControlOut(0));

    let outcome = device.attempt(10).await;

    assert!(!outcome.ok);
    assert!(outcome.message.unwrap().contains("Transfer failed"));
}

#[tokio::test]
async fn test_unplug_while_idle_disconnects() {
    let (mut device, bus) = relay();
    device.connect().await.unwrap();
    assert!(device.is_connected());

    bus.unplug();

    assert!(!device.is_connected());
    let err = device.trigger(250).await.unwrap_err();
    assert!(matches!(err, HardwareError::DeviceNotReady { .. }));
}

#[tokio::test]
async fn test_notifier_forces_disconnect_without_bus() {
    let (mut device, _bus) = relay();
    device.connect().await.unwrap();

    let notifier = device.disconnect_notifier();
    std::thread::spawn(move || notifier.notify()).join().unwrap();

    assert!(!device.is_connected());
}

#[tokio::test]
async fn test_reconnect_after_replug() {
    let (mut device, bus) = relay();
    device.connect().await.unwrap();
    bus.unplug();
    assert!(device.connect().await.is_err());

    bus.plug_in();
    device.connect().await.unwrap();
    assert!(device.trigger(1).await.unwrap().ok);
}

#[tokio::test]
async fn test_release_ignores_failures_and_disconnects() {
    let (mut device, bus) = relay();
    device.connect().await.unwrap();
    bus.fail_at(BusFailure::ReleaseInterface);

    device.release().await;

    assert!(!device.is_connected());
    assert!(bus.calls().contains(&BusCall::ReleaseInterface(0)));

    // Second release is a no-op.
    bus.clear_calls();
    device.release().await;
    assert!(bus.calls().is_empty());
}
