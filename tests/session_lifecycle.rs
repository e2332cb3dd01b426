mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{fast_timings, wait_until, DeviceCall, FakeOpener, RecordingDevice};
use kaiser_pad_lib::config::{Mapping, MappingTable, Settings};
use kaiser_pad_lib::gamepad::XboxButton;
use kaiser_pad_lib::input::{ButtonState, EventRouter, LogicalInput};
use kaiser_pad_lib::serial::{SessionError, SessionManager, SessionState, SessionTimings, NO_PORTS_FOUND};

fn manager_with(opener: Arc<FakeOpener>, mapping: Mapping, device: RecordingDevice) -> (SessionManager, Arc<EventRouter>) {
    manager_with_timings(opener, mapping, device, fast_timings())
}

fn manager_with_timings(
    opener: Arc<FakeOpener>,
    mapping: Mapping,
    device: RecordingDevice,
    timings: SessionTimings,
) -> (SessionManager, Arc<EventRouter>) {
    let router = Arc::new(EventRouter::new(
        MappingTable::new(mapping),
        Arc::new(ButtonState::new()),
        Box::new(device),
    ));
    let manager = SessionManager::new(opener, router.clone(), timings);
    (manager, router)
}

#[tokio::test]
async fn test_press_release_bytes_drive_device_in_order() {
    let opener = FakeOpener::new();
    let device = RecordingDevice::default();
    let mut mapping = Mapping::default();
    mapping.assign(LogicalInput::A, XboxButton::X);
    let (mut manager, _router) = manager_with(opener.clone(), mapping, device.clone());

    manager.select_port("COM3").await.unwrap();
    opener.feed("COM3").push(b"PRESS_A\nRELEASE_A\n");

    assert!(wait_until(|| device.calls().len() >= 4).await, "device saw {:?}", device.calls());
    assert_eq!(
        device.calls(),
        vec![
            DeviceCall::Press(XboxButton::X),
            DeviceCall::Commit,
            DeviceCall::Release(XboxButton::X),
            DeviceCall::Commit,
        ]
    );

    assert!(wait_until(|| manager.stats().events_routed == 2).await);

    manager.teardown().await;
    assert_eq!(manager.live_readers(), 0);
    assert_eq!(opener.journal.entries(), vec!["open COM3", "close COM3"]);
}

#[tokio::test]
async fn test_reselect_closes_old_port_before_opening_new() {
    let opener = FakeOpener::new();
    let (mut manager, _router) = manager_with(opener.clone(), Mapping::default(), RecordingDevice::default());

    manager.select_port("COM3").await.unwrap();
    assert!(manager.is_open());
    assert_eq!(manager.live_readers(), 1);

    manager.select_port("COM4").await.unwrap();
    assert_eq!(opener.journal.entries(), vec!["open COM3", "close COM3", "open COM4"]);
    assert_eq!(manager.live_readers(), 1);
    assert_eq!(manager.current_port(), Some("COM4"));
    assert_eq!(manager.state(), SessionState::Open("COM4".to_string()));

    manager.teardown().await;
}

#[tokio::test]
async fn test_reader_on_new_port_routes_events() {
    let opener = FakeOpener::new();
    let device = RecordingDevice::default();
    let (mut manager, router) = manager_with(opener.clone(), Mapping::default(), device.clone());

    manager.select_port("COM3").await.unwrap();
    manager.select_port("COM4").await.unwrap();
    opener.feed("COM3").push(b"PRESS_K\n");
    opener.feed("COM4").push(b"PRESS_S\n");

    assert!(wait_until(|| router.is_pressed(LogicalInput::S)).await);
    assert!(!router.is_pressed(LogicalInput::K));
    manager.teardown().await;
}

#[tokio::test]
async fn test_teardown_is_idempotent() {
    let opener = FakeOpener::new();
    let (mut manager, _router) = manager_with(opener.clone(), Mapping::default(), RecordingDevice::default());

    manager.teardown().await;
    manager.select_port("COM3").await.unwrap();
    manager.teardown().await;
    manager.teardown().await;

    assert_eq!(manager.state(), SessionState::Closed);
    assert_eq!(manager.live_readers(), 0);
    assert!(!manager.is_open());
    assert_eq!(opener.journal.entries(), vec!["open COM3", "close COM3"]);
}

#[tokio::test]
async fn test_io_error_ends_session_and_releases_held_inputs() {
    let opener = FakeOpener::new();
    let device = RecordingDevice::default();
    let (mut manager, router) = manager_with(opener.clone(), Mapping::default(), device.clone());
    let mut state_rx = manager.subscribe_state();

    manager.select_port("COM3").await.unwrap();
    let feed = opener.feed("COM3");
    feed.push(b"PRESS_S\n");
    assert!(wait_until(|| router.is_pressed(LogicalInput::S)).await);

    feed.fail();
    assert!(wait_until(|| manager.live_readers() == 0).await);
    assert!(!router.is_pressed(LogicalInput::S));
    assert_eq!(device.calls().last(), Some(&DeviceCall::Commit));
    assert!(device.calls().contains(&DeviceCall::Release(XboxButton::B)));
    assert!(opener.journal.entries().contains(&"close COM3".to_string()));
    assert!(wait_until(|| !manager.is_open()).await);

    let state = state_rx.borrow_and_update().clone();
    assert!(matches!(state, SessionState::Failed { ref port, .. } if port == "COM3"), "state was {:?}", state);

    // No automatic reconnection; the user picks a port again
    manager.select_port("COM5").await.unwrap();
    assert_eq!(opener.journal.entries(), vec!["open COM3", "close COM3", "open COM5"]);
    assert_eq!(manager.state(), SessionState::Open("COM5".to_string()));
    manager.teardown().await;
}

#[tokio::test]
async fn test_open_failure_stays_closed() {
    let opener = FakeOpener::new();
    opener.refuse("COM9");
    let (mut manager, _router) = manager_with(opener.clone(), Mapping::default(), RecordingDevice::default());

    let err = manager.select_port("COM9").await.unwrap_err();
    assert!(matches!(err, SessionError::Open { ref port, .. } if port == "COM9"));
    assert_eq!(manager.state(), SessionState::Closed);
    assert_eq!(manager.live_readers(), 0);
    assert!(opener.journal.entries().is_empty());
}

#[tokio::test]
async fn test_placeholder_selection_is_ignored() {
    let opener = FakeOpener::new();
    let (mut manager, _router) = manager_with(opener.clone(), Mapping::default(), RecordingDevice::default());

    manager.select_port("COM3").await.unwrap();
    manager.select_port(NO_PORTS_FOUND).await.unwrap();
    manager.select_port("").await.unwrap();

    assert_eq!(manager.current_port(), Some("COM3"));
    assert_eq!(opener.journal.entries(), vec!["open COM3"]);
    manager.teardown().await;
}

#[tokio::test]
async fn test_noise_is_counted_not_routed() {
    let opener = FakeOpener::new();
    let device = RecordingDevice::default();
    let (mut manager, router) = manager_with(opener.clone(), Mapping::default(), device.clone());

    manager.select_port("COM3").await.unwrap();
    opener.feed("COM3").push(b"boot v1.2\r\nPRESS_Z\r\nHOLD_A\r\nPRESS_L\r\n");
    assert!(wait_until(|| manager.stats().events_routed == 1).await);
    assert!(router.is_pressed(LogicalInput::L));

    let stats = manager.stats();
    assert_eq!(stats.lines_read, 4);
    assert_eq!(stats.events_routed, 1);
    assert_eq!(stats.frames_dropped, 3);
    assert_eq!(device.calls(), vec![DeviceCall::Press(XboxButton::X), DeviceCall::Commit]);
    manager.teardown().await;
}

#[tokio::test]
async fn test_reader_outliving_join_keeps_next_port_closed() {
    let opener = FakeOpener::new();
    // Reader sleeps far longer per poll than teardown is willing to wait
    let timings = SessionTimings {
        poll_interval: Duration::from_millis(400),
        read_timeout: Duration::from_millis(10),
        settle_delay: Duration::from_millis(5),
        join_timeout: Duration::from_millis(20),
    };
    let (mut manager, _router) =
        manager_with_timings(opener.clone(), Mapping::default(), RecordingDevice::default(), timings);

    manager.select_port("COM3").await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let err = manager.select_port("COM4").await.unwrap_err();
    assert!(matches!(err, SessionError::ReaderStillRunning { ref port } if port == "COM4"));
    assert_eq!(manager.state(), SessionState::Closed);
    assert_eq!(manager.current_port(), None);
    assert_eq!(opener.journal.entries(), vec!["open COM3"]);

    // Once the straggler exits the port can be selected again
    assert!(wait_until(|| manager.live_readers() == 0).await);
    manager.select_port("COM4").await.unwrap();
    assert_eq!(opener.journal.entries(), vec!["open COM3", "close COM3", "open COM4"]);
    assert_eq!(manager.live_readers(), 1);
}

#[test]
fn test_timings_from_settings_cover_reader_latency() {
    let settings = Settings {
        poll_interval_ms: 400,
        read_timeout_ms: 100,
        join_timeout_ms: 20,
        ..Settings::default()
    };
    let timings = SessionTimings::from(&settings);
    assert!(timings.join_timeout > timings.poll_interval + timings.read_timeout);
}
