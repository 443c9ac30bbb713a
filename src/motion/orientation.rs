//! Angle-wrapped differencing of absolute device orientation (`beta`, `gamma` Euler angles).
//!
//! Unlike the accel/gyro trackers, the emitted delta is not re-multiplied by `dt` — the
//! angular difference between samples already *is* the per-sample motion.

use super::MotionDelta;

const MAX_DT_S: f64 = 0.2;

#[derive(Debug, Clone, Copy)]
pub struct OrientationConfig {
    pub gain: f64,
    pub friction: f64,
}

impl Default for OrientationConfig {
    fn default() -> Self {
        OrientationConfig { gain: 0.9, friction: 0.9 }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OrientationSample {
    pub ts_ms: Option<f64>,
    pub beta: Option<f64>,
    pub gamma: Option<f64>,
}

pub struct OrientationTracker {
    cfg: OrientationConfig,
    vx: f64,
    vy: f64,
    last_ts_ms: Option<f64>,
    last_beta: Option<f64>,
    last_gamma: Option<f64>,
}

impl Default for OrientationTracker {
    fn default() -> Self {
        Self::new(OrientationConfig::default())
    }
}

impl OrientationTracker {
    pub fn new(cfg: OrientationConfig) -> Self {
        OrientationTracker {
            cfg,
            vx: 0.0,
            vy: 0.0,
            last_ts_ms: None,
            last_beta: None,
            last_gamma: None,
        }
    }

    pub fn reset(&mut self) {
        self.vx = 0.0;
        self.vy = 0.0;
        self.last_ts_ms = None;
        self.last_beta = None;
        self.last_gamma = None;
    }

    /// Wrap a signed angle difference (degrees) into `(-180, 180]`.
    fn wrap_deg(delta: f64) -> f64 {
        (delta + 180.0).rem_euclid(360.0) - 180.0
    }

    pub fn process_sample(&mut self, sample: OrientationSample) -> MotionDelta {
        let (ts_ms, beta, gamma) = match (sample.ts_ms, sample.beta, sample.gamma) {
            (Some(ts), Some(b), Some(g)) if ts.is_finite() && b.is_finite() && g.is_finite() => {
                (ts, b, g)
            }
            _ => return MotionDelta::invalid(0.0),
        };

        let (last_ts_ms, last_beta, last_gamma) =
            match (self.last_ts_ms, self.last_beta, self.last_gamma) {
                (Some(t), Some(b), Some(g)) => (t, b, g),
                _ => {
                    self.last_ts_ms = Some(ts_ms);
                    self.last_beta = Some(beta);
                    self.last_gamma = Some(gamma);
                    return MotionDelta::invalid(ts_ms);
                }
            };

        let dt = (ts_ms - last_ts_ms) / 1000.0;
        self.last_ts_ms = Some(ts_ms);
        if dt <= 0.0 || dt > MAX_DT_S {
            self.last_beta = Some(beta);
            self.last_gamma = Some(gamma);
            return MotionDelta::invalid(ts_ms);
        }

        let d_beta = Self::wrap_deg(beta - last_beta);
        let d_gamma = Self::wrap_deg(gamma - last_gamma);
        self.last_beta = Some(beta);
        self.last_gamma = Some(gamma);

        self.vx = self.vx * self.cfg.friction + d_gamma * self.cfg.gain;
        self.vy = self.vy * self.cfg.friction + d_beta * self.cfg.gain;
        MotionDelta::valid(self.vx, self.vy, ts_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts_ms: f64, beta: f64, gamma: f64) -> OrientationSample {
        OrientationSample { ts_ms: Some(ts_ms), beta: Some(beta), gamma: Some(gamma) }
    }

    #[test]
    fn wrap_handles_branch_cut() {
        // beta goes 179 -> -179, a true rotation of +2 degrees, not -358.
        assert!((OrientationTracker::wrap_deg(-179.0 - 179.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn s5_orientation_wrap_scenario() {
        let mut t = OrientationTracker::new(OrientationConfig { gain: 1.0, friction: 0.0 });
        t.process_sample(sample(0.0, 179.0, 0.0));
        let out = t.process_sample(sample(10.0, -179.0, 0.0));
        assert!(out.valid);
        assert!((out.dy - 2.0).abs() < 1e-9, "expected wrapped d_beta=+2, got {}", out.dy);
    }

    #[test]
    fn first_sample_invalid() {
        let mut t = OrientationTracker::default();
        assert!(!t.process_sample(sample(0.0, 10.0, 10.0)).valid);
    }
}
