//! Per-tick arbitration between sources: picks a primary, validates it against the rest,
//! and applies the camera-stillness veto that suppresses inertial bounce-back.

use std::collections::HashMap;

use super::{majority_validate_direction, MotionDelta};

const IMU_SOURCES: [&str; 3] = ["accel", "gyro", "orientation"];
const AUTHORITATIVE_SOURCES: [&str; 2] = ["camera", "delta"];
const PRIORITY: [&str; 5] = ["camera", "delta", "accel", "orientation", "gyro"];

#[derive(Debug, Clone, Copy)]
pub struct FusionConfig {
    pub camera_gate_enabled: bool,
    pub camera_max_age_ms: f64,
    pub camera_still_px: f64,
    pub camera_validator_min_px: f64,
    pub imu_min_px_when_camera_still: f64,
    pub imu_opposite_max_px_when_camera_still: f64,
    pub max_angle_deg: f64,
    pub min_mag: f64,
    pub weak_fallback_scale: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        FusionConfig {
            camera_gate_enabled: true,
            camera_max_age_ms: 250.0,
            camera_still_px: 0.35,
            camera_validator_min_px: 0.75,
            imu_min_px_when_camera_still: 2.5,
            imu_opposite_max_px_when_camera_still: 6.0,
            max_angle_deg: 40.0,
            min_mag: 0.01,
            weak_fallback_scale: 0.35,
        }
    }
}

/// Per-source accumulated `(dx, dy)` sum since the last tick.
pub type Pending<'a> = &'a HashMap<String, (f64, f64)>;
/// Per-source enabled flags.
pub type Enabled<'a> = &'a HashMap<String, bool>;
/// Per-source most recent scaled [`MotionDelta`], timestamped with server monotonic ms.
pub type LastMotion<'a> = &'a HashMap<String, MotionDelta>;

fn is_enabled(enabled: Enabled, source: &str) -> bool {
    enabled.get(source).copied().unwrap_or(false)
}

pub fn compute_raw_delta(
    pending: Pending,
    enabled: Enabled,
    last_motion: LastMotion,
    last_out: (f64, f64),
    now_ms: f64,
    cfg: &FusionConfig,
) -> (f64, f64) {
    let mut motions: HashMap<&str, MotionDelta> = HashMap::new();
    for (source, &(dx, dy)) in pending {
        if dx == 0.0 && dy == 0.0 {
            continue;
        }
        motions.insert(source.as_str(), MotionDelta::valid(dx, dy, now_ms));
    }

    if motions.is_empty() {
        return (0.0, 0.0);
    }

    let primary_source = PRIORITY
        .iter()
        .copied()
        .find(|s| motions.contains_key(s))
        .unwrap_or_else(|| motions.keys().next().copied().unwrap());
    let primary = motions[primary_source];

    if primary_source == "camera" && !is_enabled(enabled, "camera") {
        return (0.0, 0.0);
    }
    if IMU_SOURCES.contains(&primary_source) && !is_enabled(enabled, primary_source) {
        return (0.0, 0.0);
    }

    if AUTHORITATIVE_SOURCES.contains(&primary_source) {
        return (primary.dx, primary.dy);
    }

    let cam = if is_enabled(enabled, "camera") { last_motion.get("camera") } else { None };
    let cam_fresh = cfg.camera_gate_enabled
        && cam.map_or(false, |c| {
            c.valid && (now_ms - c.ts_ms) >= 0.0 && (now_ms - c.ts_ms) <= cfg.camera_max_age_ms
        });

    if cam_fresh && IMU_SOURCES.contains(&primary_source) {
        let cam = cam.unwrap();
        let cam_mag = cam.magnitude();
        if cam_mag <= cfg.camera_still_px {
            let imu_mag = primary.magnitude();
            let (prev_dx, prev_dy) = last_out;
            let opposite_prev =
                (prev_dx != 0.0 || prev_dy != 0.0) && (primary.dx * prev_dx + primary.dy * prev_dy) < 0.0;
            if imu_mag <= cfg.imu_min_px_when_camera_still {
                return (0.0, 0.0);
            }
            if opposite_prev && imu_mag <= cfg.imu_opposite_max_px_when_camera_still {
                return (0.0, 0.0);
            }
        }
    }

    let mut validators: Vec<MotionDelta> = motions
        .iter()
        .filter(|(s, _)| **s != primary_source)
        .map(|(_, v)| *v)
        .collect();

    let cam_is_validator = cam_fresh && !motions.contains_key("camera");
    if cam_is_validator {
        let cam = cam.unwrap();
        if cam.magnitude() >= cfg.camera_validator_min_px {
            validators.push(*cam);
        }
    }

    if validators.len() >= 2 {
        let vote = majority_validate_direction(primary, &validators, cfg.camera_max_age_ms, cfg.min_mag, cfg.max_angle_deg);
        return if vote.ok { (primary.dx, primary.dy) } else { (0.0, 0.0) };
    }

    if validators.len() == 1 {
        let v = validators[0];
        let vote = majority_validate_direction(primary, &validators, cfg.camera_max_age_ms, cfg.min_mag, cfg.max_angle_deg);
        if vote.ok {
            return (primary.dx, primary.dy);
        }

        let v_is_fresh_camera = cam_fresh && cam.map_or(false, |c| c.dx == v.dx && c.dy == v.dy && c.ts_ms == v.ts_ms);
        if v_is_fresh_camera {
            return (0.0, 0.0);
        }

        let (prev_dx, prev_dy) = last_out;
        if prev_dx == 0.0 && prev_dy == 0.0 {
            return (primary.dx * cfg.weak_fallback_scale, primary.dy * cfg.weak_fallback_scale);
        }

        let prev = MotionDelta::valid(prev_dx, prev_dy, now_ms);
        let tie = majority_validate_direction(primary, &[prev], 10_000.0, cfg.min_mag, cfg.max_angle_deg);
        return if tie.ok {
            (primary.dx, primary.dy)
        } else {
            (primary.dx * cfg.weak_fallback_scale, primary.dy * cfg.weak_fallback_scale)
        };
    }

    (primary.dx, primary.dy)
}
