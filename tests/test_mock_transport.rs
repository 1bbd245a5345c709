//! Integration tests for the mock transport

use kano_wand::transport::{Central, MockCentral, MockTransport, Notification, Transport, TransportError};
use kano_wand::wand::constants::*;
use std::time::Duration;

#[test]
fn test_mock_transport_logs() {
    // Initialize a simple logger for testing
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();

    // These should log at debug level (visible with RUST_LOG=debug)
    let mut transport = MockTransport::wand();
    assert!(transport.connect("AA:BB:CC:DD:EE:FF").is_ok());
    assert!(transport.write(29, &[1, 0xF8, 0x00], true).is_ok());
    assert!(transport.disconnect().is_ok());
}

#[test]
fn test_mock_transport_is_shared_between_clones() {
    let inspector = MockTransport::wand();
    let mut transport = inspector.clone();

    transport.connect("AA:BB:CC:DD:EE:FF").unwrap();
    transport.write(26, &[3], true).unwrap();

    assert!(inspector.is_connected());
    assert_eq!(inspector.writes_to(26), vec![vec![3]]);
    assert_eq!(inspector.call_count(), 2);
}

#[test]
fn test_mock_transport_reads_values() {
    let mut transport = MockTransport::wand();
    transport.set_value(BATTERY_NOTIFICATION_HANDLE, &[99]);
    transport.connect("AA:BB:CC:DD:EE:FF").unwrap();

    assert_eq!(transport.read(BATTERY_NOTIFICATION_HANDLE).unwrap(), vec![99]);
    assert_eq!(transport.read(3).unwrap(), Vec::<u8>::new());
    assert!(matches!(transport.read(1000), Err(TransportError::UnknownHandle(1000))));
}

#[test]
fn test_mock_transport_notifications_in_order() {
    let mut transport = MockTransport::wand();
    transport.push_notification(33, &[1]);
    transport.push_notification(33, &[0]);

    let timeout = Duration::from_millis(10);
    assert_eq!(
        transport.wait_for_notification(timeout).unwrap(),
        Some(Notification { handle: 33, value: vec![1] })
    );
    assert_eq!(
        transport.wait_for_notification(timeout).unwrap(),
        Some(Notification { handle: 33, value: vec![0] })
    );
    assert_eq!(transport.wait_for_notification(timeout).unwrap(), None);
}

#[test]
fn test_mock_transport_injected_failures() {
    let mut transport = MockTransport::wand();
    transport.fail_connect(true);
    assert!(transport.connect("AA:BB:CC:DD:EE:FF").is_err());

    transport.fail_next_waits(1);
    assert!(transport.wait_for_notification(Duration::from_millis(1)).is_err());
    assert!(transport.wait_for_notification(Duration::from_millis(1)).is_ok());
}

#[test]
fn test_mock_central_reports_every_advertisement() {
    let central = MockCentral::new(vec![
        MockCentral::advertisement("aa:bb:cc:dd:ee:01", Some("Kano-Wand-1"), None),
        MockCentral::advertisement("aa:bb:cc:dd:ee:01", Some("Kano-Wand-1"), None),
    ]);

    let devices = central.scan(Duration::from_millis(1)).unwrap();
    assert_eq!(devices.len(), 2);

    let mut transport = central.open(&devices[0]).unwrap();
    transport.connect(&devices[0].mac_address).unwrap();
    assert!(central.transport("AA:BB:CC:DD:EE:01").is_connected());
    assert_eq!(central.opened(), 1);
}
