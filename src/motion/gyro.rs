//! Damped integration of rotation-rate samples. Same skeleton as [`super::accel::AccelTracker`]
//! minus the high-pass/deadzone/start-threshold stages — rotation rate has no DC gravity term.

use super::MotionDelta;

const MAX_DT_S: f64 = 0.2;

#[derive(Debug, Clone, Copy)]
pub struct GyroConfig {
    pub gain: f64,
    pub friction: f64,
}

impl Default for GyroConfig {
    fn default() -> Self {
        GyroConfig { gain: 0.7, friction: 0.86 }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GyroSample {
    pub ts_ms: Option<f64>,
    pub gy: Option<f64>,
    pub gz: Option<f64>,
}

pub struct GyroTracker {
    cfg: GyroConfig,
    vx: f64,
    vy: f64,
    last_ts_ms: Option<f64>,
}

impl Default for GyroTracker {
    fn default() -> Self {
        Self::new(GyroConfig::default())
    }
}

impl GyroTracker {
    pub fn new(cfg: GyroConfig) -> Self {
        GyroTracker { cfg, vx: 0.0, vy: 0.0, last_ts_ms: None }
    }

    pub fn reset(&mut self) {
        self.vx = 0.0;
        self.vy = 0.0;
        self.last_ts_ms = None;
    }

    pub fn process_sample(&mut self, sample: GyroSample) -> MotionDelta {
        let (ts_ms, gy, gz) = match (sample.ts_ms, sample.gy, sample.gz) {
            (Some(ts), Some(gy), Some(gz)) if ts.is_finite() && gy.is_finite() && gz.is_finite() => {
                (ts, gy, gz)
            }
            _ => return MotionDelta::invalid(0.0),
        };

        let last_ts_ms = match self.last_ts_ms {
            None => {
                self.last_ts_ms = Some(ts_ms);
                return MotionDelta::invalid(ts_ms);
            }
            Some(t) => t,
        };

        let dt = (ts_ms - last_ts_ms) / 1000.0;
        self.last_ts_ms = Some(ts_ms);
        if dt <= 0.0 || dt > MAX_DT_S {
            return MotionDelta::invalid(ts_ms);
        }

        let (prev_vx, prev_vy) = (self.vx, self.vy);
        self.vx = self.vx * self.cfg.friction + gz * dt * self.cfg.gain;
        self.vy = self.vy * self.cfg.friction + gy * dt * self.cfg.gain;
        if prev_vx != 0.0 && (prev_vx > 0.0) != (self.vx > 0.0) {
            self.vx = 0.0;
        }
        if prev_vy != 0.0 && (prev_vy > 0.0) != (self.vy > 0.0) {
            self.vy = 0.0;
        }
        MotionDelta::valid(self.vx * dt, self.vy * dt, ts_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts_ms: f64, gy: f64, gz: f64) -> GyroSample {
        GyroSample { ts_ms: Some(ts_ms), gy: Some(gy), gz: Some(gz) }
    }

    #[test]
    fn first_sample_invalid() {
        let mut t = GyroTracker::default();
        assert!(!t.process_sample(sample(0.0, 1.0, 1.0)).valid);
    }

    #[test]
    fn dt_gate_rejects_pause() {
        let mut t = GyroTracker::default();
        t.process_sample(sample(0.0, 1.0, 1.0));
        assert!(!t.process_sample(sample(500.0, 1.0, 1.0)).valid);
    }

    #[test]
    fn dt_gate_rejects_non_monotonic() {
        let mut t = GyroTracker::default();
        t.process_sample(sample(100.0, 1.0, 1.0));
        assert!(!t.process_sample(sample(90.0, 1.0, 1.0)).valid);
    }

    #[test]
    fn steady_rotation_accumulates() {
        let mut t = GyroTracker::default();
        t.process_sample(sample(0.0, 0.0, 10.0));
        let mut last_valid = false;
        let mut dx = 0.0;
        for i in 1..20 {
            let out = t.process_sample(sample(i as f64 * 10.0, 0.0, 10.0));
            last_valid = out.valid;
            dx = out.dx;
        }
        assert!(last_valid);
        assert!(dx > 0.0);
    }
}
