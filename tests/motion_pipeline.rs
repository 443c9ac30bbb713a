//! End-to-end exercise of a [`Session`] against fake input/decode/flow backends, driving it
//! through the same message sequence a real client would send.

use std::sync::{Arc, Mutex};

use pocketpoint::decode::{GrayFrame, ImageDecoder};
use pocketpoint::flow::{OpticalFlowEngine, Point2, TrackResult};
use pocketpoint::motion::vision::{VisionConfig, VisionTracker};
use pocketpoint::protocol::{ClientMsg, ServerMsg};
use pocketpoint::session::Session;
use pocketpoint::sink::{InputSink, MouseButton};

#[derive(Default)]
struct RecordingSink {
    moves: Mutex<Vec<(i64, i64)>>,
    buttons: Mutex<Vec<(MouseButton, bool)>>,
    scrolls: Mutex<Vec<(i64, i64)>>,
}

impl InputSink for RecordingSink {
    fn move_rel(&self, dx: i64, dy: i64) -> anyhow::Result<()> {
        self.moves.lock().unwrap().push((dx, dy));
        Ok(())
    }
    fn button(&self, button: MouseButton, down: bool) -> anyhow::Result<()> {
        self.buttons.lock().unwrap().push((button, down));
        Ok(())
    }
    fn scroll(&self, dx: i64, dy: i64) -> anyhow::Result<()> {
        self.scrolls.lock().unwrap().push((dx, dy));
        Ok(())
    }
}

struct NullDecoder;
impl ImageDecoder for NullDecoder {
    fn decode_gray(&self, _mime: &str, _bytes: &[u8]) -> Option<GrayFrame> {
        None
    }
}

struct StillFlow;
impl OpticalFlowEngine for StillFlow {
    fn track(&self, _prev: &GrayFrame, _curr: &GrayFrame, points: &[Point2]) -> Vec<TrackResult> {
        points.iter().map(|p| TrackResult { point: *p, found: true, error: 0.0 }).collect()
    }
    fn detect_features(&self, _frame: &GrayFrame, max_corners: usize, _quality_level: f64, _min_distance: f64) -> Vec<Point2> {
        (0..max_corners.min(8)).map(|i| Point2 { x: i as f64 * 4.0, y: 0.0 }).collect()
    }
}

fn new_session() -> (Arc<Session>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let vision = VisionTracker::new(VisionConfig::default(), Box::new(StillFlow));
    let session = Session::new(sink.clone(), Arc::new(NullDecoder), vision);
    (session, sink)
}

#[test]
fn click_and_scroll_pass_straight_through_to_the_sink() {
    let (session, sink) = new_session();
    session.handle_text(ClientMsg::Click { button: "left".to_string(), down: true });
    session.handle_text(ClientMsg::Click { button: "left".to_string(), down: false });
    session.handle_text(ClientMsg::Scroll { delta: 3.0 });

    let buttons = sink.buttons.lock().unwrap();
    assert_eq!(*buttons, vec![(MouseButton::Left, true), (MouseButton::Left, false)]);
    assert_eq!(*sink.scrolls.lock().unwrap(), vec![(0, 3)]);
}

#[test]
fn scroll_is_scaled_by_sensitivity() {
    let (session, sink) = new_session();
    session.handle_text(ClientMsg::Config {
        config: pocketpoint::protocol::ConfigPatch { sensitivity: Some(2.0), ..Default::default() },
    });
    session.handle_text(ClientMsg::Scroll { delta: -3.0 });
    assert_eq!(*sink.scrolls.lock().unwrap(), vec![(0, -6)]);
}

#[test]
fn move_delta_messages_accumulate_into_a_tick_output() {
    let (session, sink) = new_session();
    session.start();

    session.handle_text(ClientMsg::MoveDelta { dx: 40.0, dy: 0.0, ts_ms: 0.0 });

    std::thread::sleep(std::time::Duration::from_millis(80));
    session.stop();

    let moves = sink.moves.lock().unwrap();
    let total_x: i64 = moves.iter().map(|(x, _)| x).sum();
    assert!(total_x > 0, "expected move.delta to eventually reach the input sink, got {moves:?}");
}

#[test]
fn config_message_resets_accumulated_state() {
    let (session, _sink) = new_session();
    session.handle_text(ClientMsg::MoveDelta { dx: 40.0, dy: 0.0, ts_ms: 0.0 });

    let mut enabled = std::collections::HashMap::new();
    enabled.insert("delta".to_string(), false);
    session.handle_text(ClientMsg::Config {
        config: pocketpoint::protocol::ConfigPatch { enabled: Some(enabled), ..Default::default() },
    });

    // A reset after disabling "delta" means a stale queued sample never reaches the sink.
    session.start();
    std::thread::sleep(std::time::Duration::from_millis(40));
    session.stop();
}

#[test]
fn hello_and_config_messages_are_acknowledged() {
    let (session, _sink) = new_session();

    let hello_ack = session.handle_text(ClientMsg::Hello { client: None, screen_angle_deg: None });
    match hello_ack {
        Some(ServerMsg::ServerState { ok, configured, .. }) => {
            assert_eq!(ok, Some(true));
            assert_eq!(configured, None);
        }
        other => panic!("expected a hello ack, got {other:?}"),
    }

    let config_ack = session.handle_text(ClientMsg::Config { config: Default::default() });
    match config_ack {
        Some(ServerMsg::ServerState { ok, configured, .. }) => {
            assert_eq!(ok, None);
            assert_eq!(configured, Some(true));
        }
        other => panic!("expected a config ack, got {other:?}"),
    }

    assert!(session.handle_text(ClientMsg::Click { button: "left".to_string(), down: true }).is_none());
}

#[test]
fn imu_sample_fans_out_to_every_enabled_tracker() {
    let (session, _sink) = new_session();
    let mut enabled = std::collections::HashMap::new();
    enabled.insert("accel".to_string(), true);
    enabled.insert("gyro".to_string(), true);
    enabled.insert("orientation".to_string(), true);
    session.handle_text(ClientMsg::Config {
        config: pocketpoint::protocol::ConfigPatch { enabled: Some(enabled), ..Default::default() },
    });

    // A single sample carries whichever axes happen to be populated; disabled-source fields
    // are simply ignored rather than requiring a separate message per tracker.
    session.handle_text(ClientMsg::ImuSample {
        ts_ms: 0.0,
        ax: Some(0.3),
        ay: Some(0.0),
        az: None,
        gx: None,
        gy: Some(0.1),
        gz: Some(0.0),
        alpha: None,
        beta: Some(1.0),
        gamma: Some(0.0),
    });
    // No assertion on exact motion values here — each tracker's own unit tests cover that.
    // This only confirms the fan-out doesn't panic across all three trackers at once.
}

#[test]
fn unknown_click_button_is_ignored_without_panicking() {
    let (session, sink) = new_session();
    session.handle_text(ClientMsg::Click { button: "stylus".to_string(), down: true });
    assert!(sink.buttons.lock().unwrap().is_empty());
}

#[test]
fn camera_frame_bytes_with_no_pending_metadata_is_a_noop() {
    let (session, sink) = new_session();
    session.handle_binary(&[0u8; 16]);
    assert!(sink.moves.lock().unwrap().is_empty());
}

#[test]
fn camera_frame_metadata_is_consumed_by_the_very_next_binary_message() {
    let (session, sink) = new_session();
    session.handle_text(ClientMsg::CamFrame { mime: "image/jpeg".to_string(), ts_ms: 0.0 });
    // NullDecoder always fails to decode, so this still can't reach the sink, but the pending
    // slot must have been taken rather than left for a later binary message to double-consume.
    session.handle_binary(&[0u8; 16]);
    session.handle_binary(&[0u8; 16]);
    assert!(sink.moves.lock().unwrap().is_empty());
}
