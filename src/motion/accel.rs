//! High-pass filtered, damped integration of linear acceleration samples.
//!
//! Phones report `accelerationIncludingGravity` with a large DC gravity component and slow
//! tilt drift. Integrating that directly produces monotonic cursor runaway, so the tracker
//! high-passes the input before integrating velocity.

use log::trace;

use super::MotionDelta;

/// Clock-jump / pause gate: samples further apart than this reset all filter state.
const MAX_DT_S: f64 = 0.2;

#[derive(Debug, Clone, Copy)]
pub struct AccelConfig {
    pub gain: f64,
    pub friction: f64,
    pub hp_tau_s: f64,
    pub deadzone_mps2: f64,
    pub start_mps2: f64,
}

impl Default for AccelConfig {
    fn default() -> Self {
        AccelConfig {
            gain: 50.0,
            friction: 0.8,
            hp_tau_s: 0.35,
            deadzone_mps2: 0.08,
            start_mps2: 0.22,
        }
    }
}

/// One inertial sample as reported by the client; fields the session doesn't need are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccelSample {
    pub ts_ms: Option<f64>,
    pub ax: Option<f64>,
    pub ay: Option<f64>,
}

pub struct AccelTracker {
    cfg: AccelConfig,
    vx: f64,
    vy: f64,
    last_ts_ms: Option<f64>,
    prev_ax: Option<f64>,
    prev_ay: Option<f64>,
    hp_ax: f64,
    hp_ay: f64,
}

impl Default for AccelTracker {
    fn default() -> Self {
        Self::new(AccelConfig::default())
    }
}

impl AccelTracker {
    pub fn new(cfg: AccelConfig) -> Self {
        AccelTracker {
            cfg,
            vx: 0.0,
            vy: 0.0,
            last_ts_ms: None,
            prev_ax: None,
            prev_ay: None,
            hp_ax: 0.0,
            hp_ay: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.vx = 0.0;
        self.vy = 0.0;
        self.last_ts_ms = None;
        self.prev_ax = None;
        self.prev_ay = None;
        self.hp_ax = 0.0;
        self.hp_ay = 0.0;
    }

    fn hard_reset(&mut self, ts_ms: f64) -> MotionDelta {
        self.vx = 0.0;
        self.vy = 0.0;
        self.prev_ax = None;
        self.prev_ay = None;
        self.hp_ax = 0.0;
        self.hp_ay = 0.0;
        self.last_ts_ms = Some(ts_ms);
        MotionDelta::invalid(ts_ms)
    }

    pub fn process_sample(&mut self, sample: AccelSample) -> MotionDelta {
        let (ts_ms, ax, ay) = match (sample.ts_ms, sample.ax, sample.ay) {
            (Some(ts), Some(ax), Some(ay)) if ts.is_finite() && ax.is_finite() && ay.is_finite() => {
                (ts, ax, ay)
            }
            _ => return MotionDelta::invalid(0.0),
        };

        let last_ts_ms = match self.last_ts_ms {
            None => {
                self.last_ts_ms = Some(ts_ms);
                self.prev_ax = Some(ax);
                self.prev_ay = Some(ay);
                return MotionDelta::invalid(ts_ms);
            }
            Some(t) => t,
        };

        let dt = (ts_ms - last_ts_ms) / 1000.0;
        self.last_ts_ms = Some(ts_ms);
        if dt <= 0.0 || dt > MAX_DT_S {
            return self.hard_reset(ts_ms);
        }

        let (prev_ax, prev_ay) = match (self.prev_ax, self.prev_ay) {
            (Some(pax), Some(pay)) => (pax, pay),
            _ => {
                self.prev_ax = Some(ax);
                self.prev_ay = Some(ay);
                return MotionDelta::invalid(ts_ms);
            }
        };

        let (mut ax_in, mut ay_in) = (ax, ay);
        if self.cfg.hp_tau_s > 0.0 {
            let alpha = self.cfg.hp_tau_s / (self.cfg.hp_tau_s + dt);
            self.hp_ax = alpha * (self.hp_ax + ax - prev_ax);
            self.hp_ay = alpha * (self.hp_ay + ay - prev_ay);
            ax_in = self.hp_ax;
            ay_in = self.hp_ay;
        }
        self.prev_ax = Some(ax);
        self.prev_ay = Some(ay);

        if self.cfg.deadzone_mps2 > 0.0 && ax_in.hypot(ay_in) < self.cfg.deadzone_mps2 {
            ax_in = 0.0;
            ay_in = 0.0;
        }

        // At rest, require a real-motion threshold before restarting — otherwise the next
        // noise sample after a clamp-to-zero reignites a spurious bounce-back.
        if self.vx == 0.0 && self.vy == 0.0 && self.cfg.start_mps2 > 0.0 && ax_in.hypot(ay_in) < self.cfg.start_mps2 {
            ax_in = 0.0;
            ay_in = 0.0;
        }

        let (prev_vx, prev_vy) = (self.vx, self.vy);
        self.vx = self.vx * self.cfg.friction + ax_in * dt * self.cfg.gain;
        self.vy = self.vy * self.cfg.friction + ay_in * dt * self.cfg.gain;

        // Zero-crossing clamp: friction alone must never ring the velocity past zero.
        if prev_vx != 0.0 && (prev_vx > 0.0) != (self.vx > 0.0) {
            self.vx = 0.0;
        }
        if prev_vy != 0.0 && (prev_vy > 0.0) != (self.vy > 0.0) {
            self.vy = 0.0;
        }

        trace!("accel: dt={:.4} v=({:.3},{:.3})", dt, self.vx, self.vy);
        MotionDelta::valid(self.vx * dt, self.vy * dt, ts_ms)
    }
}
