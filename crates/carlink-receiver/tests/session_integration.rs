//! Integration tests for the full receiver pipeline.
//!
//! # Purpose
//!
//! These tests drive `SessionSupervisor::spawn_all` through its public API
//! with the in-memory link and recording sinks, the same way `main` wires the
//! TCP link and file sinks.  They verify:
//!
//! - The happy path: discover, negotiate, `Open`, then A/V and input traffic.
//! - Recovery: a link error tears the session down, stops the sinks, and
//!   the next device gets a fresh session and fresh sinks.
//! - Shutdown: every task stops and the state ends at `Disconnected`.
//!
//! # Session lifecycle
//!
//! ```text
//! Disconnected ─► Discovering ─► Negotiating ─(Open)─► Connected
//!       ▲                                                  │
//!       └──────────────────── link error ◄─────────────────┘
//! ```
//!
//! All tests run on paused time so the startup and heartbeat timers advance
//! instantly while the runtime is idle.

use std::sync::Arc;
use std::time::Duration;

use carlink_core::protocol::{AudioFrame, AudioPayload, StartupMessage, VideoFrame};
use carlink_core::{InboundMessage, KeyCode, OutboundMessage, SessionParams, TouchAction};
use carlink_receiver::application::error::LinkError;
use carlink_receiver::application::key_forwarder::key_channel;
use carlink_receiver::application::session::SessionState;
use carlink_receiver::application::supervisor::{
    HandshakeProfile, SessionSupervisor, SupervisorConfig, SupervisorHandle,
};
use carlink_receiver::application::touch_forwarder::touch_channel;
use carlink_receiver::infrastructure::link::mock::MockLinkConnector;
use carlink_receiver::infrastructure::sinks::mock::{RecordingSinkFactory, SinkRecord};
use tokio::sync::watch;
use tokio::time;

// ── Helpers ───────────────────────────────────────────────────────────────────

fn is_open(msg: &OutboundMessage) -> bool {
    matches!(msg, OutboundMessage::Startup(StartupMessage::Open(_)))
}

fn is_key(msg: &OutboundMessage) -> bool {
    matches!(msg, OutboundMessage::KeyEvent(_))
}

fn is_touch(msg: &OutboundMessage) -> bool {
    matches!(msg, OutboundMessage::TouchBatch(_))
}

fn is_heartbeat(msg: &OutboundMessage) -> bool {
    matches!(msg, OutboundMessage::Heartbeat)
}

fn video(bytes: &[u8]) -> InboundMessage {
    InboundMessage::VideoData(VideoFrame {
        width: 800,
        height: 480,
        flags: 0,
        data: bytes.to_vec(),
    })
}

fn pcm(bytes: &[u8]) -> InboundMessage {
    InboundMessage::AudioData(AudioFrame {
        decode_type: 2,
        volume: 1.0,
        audio_type: 1,
        payload: AudioPayload::Pcm(bytes.to_vec()),
    })
}

async fn wait_state(rx: &mut watch::Receiver<SessionState>, want: SessionState) {
    let reached = time::timeout(Duration::from_secs(60), rx.wait_for(|s| *s == want)).await;
    assert!(matches!(reached, Ok(Ok(_))), "state never became {want}");
}

/// Polls `cond` on paused time until it holds.
async fn eventually(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if cond() {
            return;
        }
        time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held: {what}");
}

struct Harness {
    connector: Arc<MockLinkConnector>,
    sinks: Arc<RecordingSinkFactory>,
    handle: SupervisorHandle,
    keys: carlink_receiver::application::key_forwarder::KeyIngress,
    touches: carlink_receiver::application::touch_forwarder::TouchIngress,
}

fn start() -> Harness {
    let connector = Arc::new(MockLinkConnector::new());
    let sinks = Arc::new(RecordingSinkFactory::new());
    let supervisor = SessionSupervisor::new(
        connector.clone(),
        sinks.clone(),
        HandshakeProfile::default(),
        SupervisorConfig::default(),
    );
    let (keys, key_rx) = key_channel();
    let (touches, touch_rx) = touch_channel();
    let handle = supervisor.spawn_all(key_rx, touch_rx);
    Harness {
        connector,
        sinks,
        handle,
        keys,
        touches,
    }
}

// ── Lifecycle tests ───────────────────────────────────────────────────────────

/// Happy path: once the device opens the session, video and audio reach the
/// sinks in arrival order and console input reaches the device.
#[tokio::test(start_paused = true)]
async fn test_open_session_routes_media_and_forwards_input() {
    // Arrange
    let h = start();
    let mut state = h.handle.watch_state();
    let link = h.connector.wait_for_link(1).await;
    link.wait_for_matching(1, is_open).await;

    // Act – device opens the session, then streams
    link.deliver(InboundMessage::Open(SessionParams::default()));
    wait_state(&mut state, SessionState::Connected).await;
    link.deliver(video(&[0, 0, 0, 1]));
    link.deliver(pcm(&[7, 7]));
    link.deliver(video(&[0x65]));
    h.keys.push(KeyCode::HOME);
    h.touches.push(4_000_000.0, 3_000_000.0, "down");

    // Assert
    eventually("three media records", || h.sinks.records().len() == 3).await;
    assert_eq!(
        h.sinks.records(),
        vec![
            SinkRecord::Video { generation: 1, data: vec![0, 0, 0, 1] },
            SinkRecord::Audio { generation: 1, data: vec![7, 7] },
            SinkRecord::Video { generation: 1, data: vec![0x65] },
        ]
    );
    assert_eq!(h.sinks.opened_with(), vec![SessionParams::default()]);

    link.wait_for_matching(1, is_key).await;
    link.wait_for_matching(1, is_touch).await;
    let sent = link.sent();
    assert!(sent.contains(&OutboundMessage::KeyEvent(200)));
    let touch = sent
        .iter()
        .find_map(|m| match m {
            OutboundMessage::TouchBatch(t) => Some(t[0]),
            _ => None,
        })
        .expect("touch batch sent");
    assert_eq!(touch.action, TouchAction::Down);
    assert!((touch.x - 0.5).abs() < 1e-6);
    assert!((touch.y - 0.5).abs() < 1e-6);

    // Cleanup
    assert!(h.handle.shutdown().await);
}

/// Heartbeats keep flowing while connected, at the configured cadence.
#[tokio::test(start_paused = true)]
async fn test_connected_session_sends_heartbeats() {
    // Arrange
    let h = start();
    let mut state = h.handle.watch_state();
    let link = h.connector.wait_for_link(1).await;
    link.deliver(InboundMessage::Open(SessionParams::default()));
    wait_state(&mut state, SessionState::Connected).await;

    // Act
    let before = link.sent().iter().filter(|m| is_heartbeat(m)).count();
    link.wait_for_matching(before + 3, is_heartbeat).await;

    // Assert – still the same session
    assert_eq!(h.handle.state(), SessionState::Connected);
    assert!(h.connector.link(2).is_none());
    assert!(h.handle.shutdown().await);
}

/// A link error ends the session, stops its sinks, and the supervisor
/// brings up a new session with new sinks on the next device.
#[tokio::test(start_paused = true)]
async fn test_link_error_reconnects_with_fresh_sinks() {
    // Arrange
    let h = start();
    let mut state = h.handle.watch_state();
    let first = h.connector.wait_for_link(1).await;
    first.deliver(InboundMessage::Open(SessionParams::default()));
    wait_state(&mut state, SessionState::Connected).await;
    first.deliver(video(&[1]));
    eventually("first frame", || h.sinks.records().len() == 1).await;

    // Act
    first.fail_inbound(LinkError::Closed);
    let second = h.connector.wait_for_link(2).await;
    second.wait_for_matching(1, is_open).await;
    second.deliver(InboundMessage::Open(SessionParams::default()));
    wait_state(&mut state, SessionState::Connected).await;
    second.deliver(video(&[2]));
    eventually("second frame", || {
        h.sinks
            .records()
            .contains(&SinkRecord::Video { generation: 2, data: vec![2] })
    })
    .await;

    // Assert
    assert_eq!(h.sinks.created(), 2);
    assert_eq!(
        h.sinks.records(),
        vec![
            SinkRecord::Video { generation: 1, data: vec![1] },
            SinkRecord::VideoStopped { generation: 1 },
            SinkRecord::AudioStopped { generation: 1 },
            SinkRecord::Video { generation: 2, data: vec![2] },
        ]
    );

    // Input after the reconnect goes to the new link only.
    let keys_on_first = first.sent().iter().filter(|m| is_key(m)).count();
    h.keys.push(KeyCode::BACK);
    second.wait_for_matching(1, is_key).await;
    assert_eq!(first.sent().iter().filter(|m| is_key(m)).count(), keys_on_first);

    assert!(h.handle.shutdown().await);
}

/// Button presses reported by the video decoder reach the device through the
/// key queue, and a select press is followed by its release.
#[tokio::test(start_paused = true)]
async fn test_decoder_key_press_is_forwarded_with_release() {
    // Arrange
    let connector = Arc::new(MockLinkConnector::new());
    let (keys, key_rx) = key_channel();
    let sinks = Arc::new(RecordingSinkFactory::new().with_keys(keys.clone()));
    let supervisor = SessionSupervisor::new(
        connector.clone(),
        sinks.clone(),
        HandshakeProfile::default(),
        SupervisorConfig::default(),
    );
    let (_touches, touch_rx) = touch_channel();
    let handle = supervisor.spawn_all(key_rx, touch_rx);
    let mut state = handle.watch_state();
    let link = connector.wait_for_link(1).await;
    link.deliver(InboundMessage::Open(SessionParams::default()));
    wait_state(&mut state, SessionState::Connected).await;

    // Act
    assert!(sinks.press_key(KeyCode::SELECT_DOWN));
    link.wait_for_matching(2, is_key).await;

    // Assert
    let sent_keys: Vec<_> = link.sent().into_iter().filter(is_key).collect();
    assert_eq!(
        sent_keys,
        vec![OutboundMessage::KeyEvent(104), OutboundMessage::KeyEvent(105)]
    );
    assert!(handle.shutdown().await);
}

/// While the device is absent the supervisor keeps retrying; once it
/// appears the session comes up normally.
#[tokio::test(start_paused = true)]
async fn test_device_appearing_later_is_discovered() {
    // Arrange
    let connector = Arc::new(MockLinkConnector::new());
    connector.set_available(false);
    let sinks = Arc::new(RecordingSinkFactory::new());
    let supervisor = SessionSupervisor::new(
        connector.clone(),
        sinks.clone(),
        HandshakeProfile::default(),
        SupervisorConfig::default(),
    );
    let (_keys, key_rx) = key_channel();
    let (_touches, touch_rx) = touch_channel();
    let handle = supervisor.spawn_all(key_rx, touch_rx);
    let mut state = handle.watch_state();

    // Act
    eventually("several failed attempts", || connector.attempts() >= 3).await;
    assert_eq!(handle.state(), SessionState::Discovering);
    connector.set_available(true);
    let link = connector.wait_for_link(1).await;
    link.deliver(InboundMessage::Open(SessionParams::default()));

    // Assert
    wait_state(&mut state, SessionState::Connected).await;
    assert_eq!(sinks.created(), 1);
    assert!(handle.shutdown().await);
}

/// Shutdown while connected stops every task and stops the sinks.
#[tokio::test(start_paused = true)]
async fn test_shutdown_while_connected_stops_everything() {
    // Arrange
    let h = start();
    let mut state = h.handle.watch_state();
    let link = h.connector.wait_for_link(1).await;
    link.deliver(InboundMessage::Open(SessionParams::default()));
    wait_state(&mut state, SessionState::Connected).await;
    let slot = h.handle.slot();

    // Act
    let clean = h.handle.shutdown().await;

    // Assert
    assert!(clean, "tasks outlived shutdown");
    assert_eq!(slot.state(), SessionState::Disconnected);
    assert!(slot.current().is_none());
    assert_eq!(h.sinks.stops(), 1);
    assert!(!h.keys.push(KeyCode::HOME), "key forwarder must be gone");
}
