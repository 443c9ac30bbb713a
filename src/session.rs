//! A single connected client: its tuning state, its per-source trackers, and the dedicated
//! motion-loop thread that drains accumulated samples and drives the input sink.
//!
//! The motion loop runs on a plain OS thread rather than a tokio task so its 240 Hz cadence
//! never competes with the async runtime's scheduler for websocket I/O.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, warn};

use crate::config::{SessionConfig, TICK_MS};
use crate::decode::ImageDecoder;
use crate::motion::{
    accel::{AccelSample, AccelTracker},
    gyro::{GyroSample, GyroTracker},
    orientation::{OrientationSample, OrientationTracker},
    remap, Accumulator, MotionDelta, MotionSmoother, VisionTracker,
};
use crate::protocol::{ClientMsg, ServerMsg};
use crate::sink::InputSink;

/// Bound on how long a disconnect waits for the motion-loop thread to notice and exit.
const STOP_JOIN_TIMEOUT: Duration = Duration::from_millis(1500);

struct PendingFrame {
    mime: String,
    ts_ms: f64,
}

pub struct Session {
    cfg: RwLock<SessionConfig>,
    accel: Mutex<AccelTracker>,
    gyro: Mutex<GyroTracker>,
    orientation: Mutex<OrientationTracker>,
    vision: Mutex<VisionTracker>,
    decoder: Arc<dyn ImageDecoder>,
    sink: Arc<dyn InputSink>,
    accumulator: Arc<Accumulator>,
    last_motion: Mutex<HashMap<String, MotionDelta>>,
    last_out: Mutex<(f64, f64)>,
    smoother: Mutex<MotionSmoother>,
    pending_frame: Mutex<Option<PendingFrame>>,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    pub fn new(sink: Arc<dyn InputSink>, decoder: Arc<dyn ImageDecoder>, vision: VisionTracker) -> Arc<Session> {
        let cfg = SessionConfig::default();
        let smoother = MotionSmoother::new(cfg.smoothing);
        Arc::new(Session {
            cfg: RwLock::new(cfg),
            accel: Mutex::new(AccelTracker::default()),
            gyro: Mutex::new(GyroTracker::default()),
            orientation: Mutex::new(OrientationTracker::default()),
            vision: Mutex::new(vision),
            decoder,
            sink,
            accumulator: Arc::new(Accumulator::new()),
            last_motion: Mutex::new(HashMap::new()),
            last_out: Mutex::new((0.0, 0.0)),
            smoother: Mutex::new(smoother),
            pending_frame: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
        })
    }

    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let session = Arc::clone(self);
        let running = Arc::clone(&self.running);
        let handle = std::thread::spawn(move || {
            let tick = Duration::from_secs_f64(TICK_MS / 1000.0);
            while running.load(Ordering::SeqCst) {
                let tick_started = std::time::Instant::now();
                session.tick();
                let elapsed = tick_started.elapsed();
                if elapsed < tick {
                    std::thread::sleep(tick - elapsed);
                }
            }
        });
        *self.thread.lock().expect("thread handle mutex poisoned") = Some(handle);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.thread.lock().expect("thread handle mutex poisoned").take();
        if let Some(handle) = handle {
            let (tx, rx) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let _ = handle.join();
                let _ = tx.send(());
            });
            if rx.recv_timeout(STOP_JOIN_TIMEOUT).is_err() {
                warn!("motion loop thread did not stop within {:?}", STOP_JOIN_TIMEOUT);
            }
        }
    }

    fn now_ms() -> f64 {
        static EPOCH: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
        let epoch = EPOCH.get_or_init(std::time::Instant::now);
        epoch.elapsed().as_secs_f64() * 1000.0
    }

    fn tick(&self) {
        let now_ms = Self::now_ms();
        let pending = self.accumulator.drain();
        let (enabled, fusion_cfg, smoothing_cfg) = {
            let cfg = self.cfg.read().expect("session config lock poisoned");
            (cfg.enabled.clone(), cfg.fusion, cfg.smoothing)
        };

        let last_out = *self.last_out.lock().expect("last_out lock poisoned");
        let (dx, dy) = {
            let last_motion = self.last_motion.lock().expect("last_motion lock poisoned");
            crate::motion::compute_raw_delta(&pending, &enabled, &*last_motion, last_out, now_ms, &fusion_cfg)
        };
        *self.last_out.lock().expect("last_out lock poisoned") = (dx, dy);

        let (step_x, step_y) = {
            let mut smoother = self.smoother.lock().expect("smoother lock poisoned");
            smoother.set_config(smoothing_cfg);
            smoother.smooth(dx, dy, TICK_MS)
        };

        if step_x != 0 || step_y != 0 {
            if let Err(err) = self.sink.move_rel(step_x, step_y) {
                warn!("input sink move_rel failed: {err:#}");
            }
        }
    }

    fn record_source(&self, source: &str, dx: f64, dy: f64, ts_ms: f64) {
        self.accumulator.add(source, dx, dy);
        self.last_motion
            .lock()
            .expect("last_motion lock poisoned")
            .insert(source.to_string(), MotionDelta::valid(dx, dy, ts_ms));
    }

    fn reset_filters(&self) {
        self.accel.lock().expect("accel lock poisoned").reset();
        self.gyro.lock().expect("gyro lock poisoned").reset();
        self.orientation.lock().expect("orientation lock poisoned").reset();
        self.vision.lock().expect("vision lock poisoned").reset();
        self.smoother.lock().expect("smoother lock poisoned").reset();
        self.accumulator.clear();
        self.last_motion.lock().expect("last_motion lock poisoned").clear();
        *self.last_out.lock().expect("last_out lock poisoned") = (0.0, 0.0);
    }

    fn server_state(&self, ok: Option<bool>, configured: Option<bool>) -> ServerMsg {
        let cfg = self.cfg.read().expect("session config lock poisoned");
        ServerMsg::ServerState {
            ok,
            configured,
            enabled: cfg.enabled.clone(),
            sensitivity: cfg.sensitivity,
            screen_angle_deg: cfg.screen_angle_deg,
        }
    }

    /// Handle one decoded text message, returning an acknowledgement to send back if any.
    pub fn handle_text(&self, msg: ClientMsg) -> Option<ServerMsg> {
        match msg {
            ClientMsg::Hello { screen_angle_deg, .. } => {
                if let Some(angle) = screen_angle_deg {
                    self.cfg.write().expect("session config lock poisoned").screen_angle_deg = angle;
                }
                debug!("client said hello");
                Some(self.server_state(Some(true), None))
            }
            ClientMsg::Config { config } => {
                self.cfg.write().expect("session config lock poisoned").apply_patch(&config);
                self.reset_filters();
                Some(self.server_state(None, Some(true)))
            }
            ClientMsg::Click { button, down } => {
                let button = match button.as_str() {
                    "left" => crate::sink::MouseButton::Left,
                    "right" => crate::sink::MouseButton::Right,
                    "middle" => crate::sink::MouseButton::Middle,
                    other => {
                        warn!("unknown click button {other:?}");
                        return None;
                    }
                };
                if let Err(err) = self.sink.button(button, down) {
                    warn!("input sink button failed: {err:#}");
                }
                None
            }
            ClientMsg::Scroll { delta } => {
                let sensitivity = self.cfg.read().expect("session config lock poisoned").sensitivity;
                if let Err(err) = self.sink.scroll(0, (delta * sensitivity) as i64) {
                    warn!("input sink scroll failed: {err:#}");
                }
                None
            }
            ClientMsg::MoveDelta { dx, dy, ts_ms } => {
                self.record_source("delta", dx, dy, ts_ms);
                None
            }
            ClientMsg::ImuSample { ts_ms, ax, ay, az, gx, gy, gz, alpha, beta, gamma } => {
                self.handle_imu_sample(ts_ms, ax, ay, az, gx, gy, gz, alpha, beta, gamma);
                None
            }
            ClientMsg::CamFrame { mime, ts_ms } => {
                *self.pending_frame.lock().expect("pending_frame lock poisoned") = Some(PendingFrame { mime, ts_ms });
                None
            }
        }
    }

    /// Fans one inertial reading out to every tracker that is both enabled and has a use for
    /// the axes the client happened to supply.
    #[allow(clippy::too_many_arguments)]
    fn handle_imu_sample(
        &self,
        ts_ms: f64,
        ax: Option<f64>,
        ay: Option<f64>,
        _az: Option<f64>,
        _gx: Option<f64>,
        gy: Option<f64>,
        gz: Option<f64>,
        _alpha: Option<f64>,
        beta: Option<f64>,
        gamma: Option<f64>,
    ) {
        let (screen_angle_deg, scales, sensitivity, enabled) = {
            let cfg = self.cfg.read().expect("session config lock poisoned");
            (cfg.screen_angle_deg, cfg.scales, cfg.sensitivity, cfg.enabled.clone())
        };

        if *enabled.get("accel").unwrap_or(&false) {
            let delta = self.accel.lock().expect("accel lock poisoned").process_sample(AccelSample {
                ts_ms: Some(ts_ms),
                ax,
                ay,
            });
            self.apply_tracker_delta("accel", delta, ts_ms, screen_angle_deg, scales.accel * sensitivity, true);
        }

        if *enabled.get("gyro").unwrap_or(&false) {
            let delta = self.gyro.lock().expect("gyro lock poisoned").process_sample(GyroSample {
                ts_ms: Some(ts_ms),
                gy,
                gz,
            });
            self.apply_tracker_delta("gyro", delta, ts_ms, screen_angle_deg, scales.gyro * sensitivity, false);
        }

        if *enabled.get("orientation").unwrap_or(&false) {
            let delta = self.orientation.lock().expect("orientation lock poisoned").process_sample(OrientationSample {
                ts_ms: Some(ts_ms),
                beta,
                gamma,
            });
            self.apply_tracker_delta(
                "orientation",
                delta,
                ts_ms,
                screen_angle_deg,
                scales.orientation * sensitivity,
                false,
            );
        }
    }

    fn apply_tracker_delta(
        &self,
        source: &str,
        delta: MotionDelta,
        ts_ms: f64,
        screen_angle_deg: f64,
        scale: f64,
        mirror_x: bool,
    ) {
        if !delta.valid {
            return;
        }
        let (mut rx, ry) = remap::rotate(delta.dx, delta.dy, screen_angle_deg);
        if mirror_x {
            // The device's x-axis convention is mirrored relative to the screen's after rotation.
            rx = -rx;
        }
        self.record_source(source, rx * scale, ry * scale, ts_ms);
    }

    pub fn handle_binary(&self, bytes: &[u8]) {
        let pending = self.pending_frame.lock().expect("pending_frame lock poisoned").take();
        let Some(pending) = pending else {
            warn!("camera frame bytes arrived with no pending cam.frame metadata");
            return;
        };

        let Some(frame) = self.decoder.decode_gray(&pending.mime, bytes) else {
            warn!("failed to decode camera frame ({})", pending.mime);
            return;
        };

        let delta = self.vision.lock().expect("vision lock poisoned").process_frame(frame, pending.ts_ms);
        if !delta.valid {
            return;
        }

        let screen_angle_deg = self.cfg.read().expect("session config lock poisoned").screen_angle_deg;
        let scale = {
            let cfg = self.cfg.read().expect("session config lock poisoned");
            cfg.scales.camera * cfg.sensitivity
        };
        let (rx, ry) = remap::rotate(delta.dx, delta.dy, screen_angle_deg);
        self.record_source("camera", rx * scale, ry * scale, pending.ts_ms);
    }
}
