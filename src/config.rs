//! Fixed tuning constants and the mutable per-session configuration patched over the wire.

use std::collections::HashMap;

use crate::motion::fusion::FusionConfig;
use crate::motion::smoother::SmoothingConfig;
use crate::protocol::ConfigPatch;

/// Motion-loop tick rate. Fixed: the client/server handshake never negotiates this.
pub const TICK_HZ: f64 = 240.0;
pub const TICK_MS: f64 = 1000.0 / TICK_HZ;

/// Default requested camera capture rate, reported back to the client but not otherwise
/// enforced server-side — the camera itself paces how often `cam.frame` arrives.
pub const DEFAULT_CAMERA_FPS: f64 = 15.0;

/// Per-source multiplier applied to a tracker's raw output before it enters fusion.
#[derive(Debug, Clone, Copy)]
pub struct MoveScales {
    pub camera: f64,
    pub accel: f64,
    pub gyro: f64,
    pub orientation: f64,
}

impl Default for MoveScales {
    fn default() -> Self {
        MoveScales { camera: 4.0, accel: 220.0, gyro: 18.0, orientation: 4.0 }
    }
}

impl MoveScales {
    pub fn for_source(&self, source: &str) -> f64 {
        match source {
            "camera" => self.camera,
            "accel" => self.accel,
            "gyro" => self.gyro,
            "orientation" => self.orientation,
            _ => 1.0,
        }
    }
}

fn default_enabled() -> HashMap<String, bool> {
    [("camera", false), ("accel", true), ("gyro", false), ("orientation", false)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// All per-session tuning state; a `config` message patches a subset of these fields.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub enabled: HashMap<String, bool>,
    pub sensitivity: f64,
    pub screen_angle_deg: f64,
    pub camera_fps: f64,
    pub scales: MoveScales,
    pub fusion: FusionConfig,
    pub smoothing: SmoothingConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            enabled: default_enabled(),
            sensitivity: 1.0,
            screen_angle_deg: 0.0,
            camera_fps: DEFAULT_CAMERA_FPS,
            scales: MoveScales::default(),
            fusion: FusionConfig::default(),
            smoothing: SmoothingConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Apply a wire-level patch in place. Unset fields are left untouched; an `enabled` patch
    /// merges into the existing map rather than replacing it wholesale, and a `fusion` patch
    /// merges field-by-field into the existing [`FusionConfig`].
    pub fn apply_patch(&mut self, patch: &ConfigPatch) {
        if let Some(enabled) = &patch.enabled {
            for (source, value) in enabled {
                self.enabled.insert(source.clone(), *value);
            }
        }
        if let Some(sensitivity) = patch.sensitivity {
            self.sensitivity = sensitivity;
        }
        if let Some(angle) = patch.screen_angle_deg {
            self.screen_angle_deg = angle;
        }
        if let Some(fps) = patch.camera_fps {
            self.camera_fps = fps;
        }
        if let Some(half_life) = patch.smoothing_half_life_ms {
            self.smoothing.half_life_ms = half_life;
        }
        if let Some(deadzone) = patch.deadzone_px {
            self.smoothing.deadzone_px = deadzone;
        }
        if let Some(fusion_patch) = &patch.fusion {
            apply_fusion_patch(&mut self.fusion, fusion_patch);
        }
    }
}

fn apply_fusion_patch(fusion: &mut FusionConfig, patch: &crate::protocol::FusionPatch) {
    if let Some(v) = patch.camera_gate_enabled {
        fusion.camera_gate_enabled = v;
    }
    if let Some(v) = patch.camera_max_age_ms {
        fusion.camera_max_age_ms = v;
    }
    if let Some(v) = patch.camera_still_px {
        fusion.camera_still_px = v;
    }
    if let Some(v) = patch.camera_validator_min_px {
        fusion.camera_validator_min_px = v;
    }
    if let Some(v) = patch.imu_min_px_when_camera_still {
        fusion.imu_min_px_when_camera_still = v;
    }
    if let Some(v) = patch.imu_opposite_max_px_when_camera_still {
        fusion.imu_opposite_max_px_when_camera_still = v;
    }
    if let Some(v) = patch.max_angle_deg {
        fusion.max_angle_deg = v;
    }
    if let Some(v) = patch.min_mag {
        fusion.min_mag = v;
    }
    if let Some(v) = patch.weak_fallback_scale {
        fusion.weak_fallback_scale = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FusionPatch;

    #[test]
    fn default_enabled_matches_documented_defaults() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.enabled.len(), 4);
        assert!(!cfg.enabled["camera"]);
        assert!(cfg.enabled["accel"]);
        assert!(!cfg.enabled["gyro"]);
        assert!(!cfg.enabled["orientation"]);
    }

    #[test]
    fn patch_merges_enabled_without_clobbering_other_sources() {
        let mut cfg = SessionConfig::default();
        let mut enabled = HashMap::new();
        enabled.insert("gyro".to_string(), true);
        cfg.apply_patch(&ConfigPatch { enabled: Some(enabled), ..Default::default() });
        assert!(cfg.enabled["gyro"]);
        assert!(cfg.enabled["accel"]);
    }

    #[test]
    fn patch_leaves_unset_fields_untouched() {
        let mut cfg = SessionConfig::default();
        cfg.sensitivity = 2.0;
        cfg.apply_patch(&ConfigPatch { screen_angle_deg: Some(90.0), ..Default::default() });
        assert_eq!(cfg.sensitivity, 2.0);
        assert_eq!(cfg.screen_angle_deg, 90.0);
    }

    #[test]
    fn patch_routes_smoothing_fields() {
        let mut cfg = SessionConfig::default();
        cfg.apply_patch(&ConfigPatch { smoothing_half_life_ms: Some(40.0), deadzone_px: Some(1.0), ..Default::default() });
        assert_eq!(cfg.smoothing.half_life_ms, 40.0);
        assert_eq!(cfg.smoothing.deadzone_px, 1.0);
    }

    #[test]
    fn patch_routes_fusion_subfields_without_resetting_the_rest() {
        let mut cfg = SessionConfig::default();
        let default_still_px = cfg.fusion.camera_still_px;
        cfg.apply_patch(&ConfigPatch {
            fusion: Some(FusionPatch { max_angle_deg: Some(10.0), ..Default::default() }),
            ..Default::default()
        });
        assert_eq!(cfg.fusion.max_angle_deg, 10.0);
        assert_eq!(cfg.fusion.camera_still_px, default_still_px);
    }

    #[test]
    fn move_scales_unknown_source_defaults_to_one() {
        let scales = MoveScales::default();
        assert_eq!(scales.for_source("unknown"), 1.0);
    }
}
