//! Wire protocol spoken over the websocket: a tagged JSON message for control/telemetry, plus
//! a companion binary channel for raw camera frame bytes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "t")]
pub enum ClientMsg {
    #[serde(rename = "hello")]
    Hello { client: Option<String>, screen_angle_deg: Option<f64> },

    #[serde(rename = "config")]
    Config { config: ConfigPatch },

    #[serde(rename = "input.click")]
    Click { button: String, down: bool },

    #[serde(rename = "input.scroll")]
    Scroll { delta: f64 },

    #[serde(rename = "move.delta")]
    MoveDelta { dx: f64, dy: f64, ts_ms: f64 },

    /// One inertial reading, fanned out to every enabled tracker that has a use for it — a
    /// client sends whichever axes its sensors provide; unused ones are simply absent.
    #[serde(rename = "imu.sample")]
    ImuSample {
        ts_ms: f64,
        #[serde(default)]
        ax: Option<f64>,
        #[serde(default)]
        ay: Option<f64>,
        #[serde(default)]
        az: Option<f64>,
        #[serde(default)]
        gx: Option<f64>,
        #[serde(default)]
        gy: Option<f64>,
        #[serde(default)]
        gz: Option<f64>,
        #[serde(default)]
        alpha: Option<f64>,
        #[serde(default)]
        beta: Option<f64>,
        #[serde(default)]
        gamma: Option<f64>,
    },

    #[serde(rename = "cam.frame")]
    CamFrame { mime: String, ts_ms: f64 },
}

/// Partial config update; `None`/absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigPatch {
    #[serde(default)]
    pub enabled: Option<HashMap<String, bool>>,
    #[serde(default)]
    pub sensitivity: Option<f64>,
    #[serde(default)]
    pub screen_angle_deg: Option<f64>,
    #[serde(default, rename = "cameraFps")]
    pub camera_fps: Option<f64>,
    #[serde(default, rename = "smoothingHalfLifeMs")]
    pub smoothing_half_life_ms: Option<f64>,
    #[serde(default, rename = "deadzonePx")]
    pub deadzone_px: Option<f64>,
    #[serde(default)]
    pub fusion: Option<FusionPatch>,
}

/// Partial patch over [`crate::motion::fusion::FusionConfig`]'s nine tunables. Field names on
/// the wire are camelCase, matching the rest of this nested object's spelling even though the
/// flat top-level message fields elsewhere in this protocol are snake_case.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FusionPatch {
    #[serde(default, rename = "cameraGateEnabled")]
    pub camera_gate_enabled: Option<bool>,
    #[serde(default, rename = "cameraMaxAgeMs")]
    pub camera_max_age_ms: Option<f64>,
    #[serde(default, rename = "cameraStillPx")]
    pub camera_still_px: Option<f64>,
    #[serde(default, rename = "cameraValidatorMinPx")]
    pub camera_validator_min_px: Option<f64>,
    #[serde(default, rename = "imuMinPxWhenCameraStill")]
    pub imu_min_px_when_camera_still: Option<f64>,
    #[serde(default, rename = "imuOppositeMaxPxWhenCameraStill")]
    pub imu_opposite_max_px_when_camera_still: Option<f64>,
    #[serde(default, rename = "maxAngleDeg")]
    pub max_angle_deg: Option<f64>,
    #[serde(default, rename = "minMag")]
    pub min_mag: Option<f64>,
    #[serde(default, rename = "weakFallbackScale")]
    pub weak_fallback_scale: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "t")]
pub enum ServerMsg {
    #[serde(rename = "server.state")]
    ServerState {
        #[serde(skip_serializing_if = "Option::is_none")]
        ok: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        configured: Option<bool>,
        enabled: HashMap<String, bool>,
        sensitivity: f64,
        screen_angle_deg: f64,
    },

    #[serde(rename = "error")]
    Error { message: String },
}

pub fn parse_client_msg(text: &str) -> Result<ClientMsg, ProtocolError> {
    serde_json::from_str(text).map_err(ProtocolError::InvalidJson)
}

pub fn encode_server_msg(msg: &ServerMsg) -> String {
    serde_json::to_string(msg).expect("ServerMsg serialization cannot fail")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hello() {
        let msg = parse_client_msg(r#"{"t":"hello","client":"android","screen_angle_deg":90}"#).unwrap();
        assert!(matches!(msg, ClientMsg::Hello { .. }));
    }

    #[test]
    fn parses_imu_sample_with_missing_optional_fields() {
        let msg = parse_client_msg(r#"{"t":"imu.sample","ts_ms":12.0,"ax":1.0,"ay":2.0}"#).unwrap();
        match msg {
            ClientMsg::ImuSample { ax, gy, .. } => {
                assert_eq!(ax, Some(1.0));
                assert_eq!(gy, None);
            }
            _ => panic!("expected ImuSample"),
        }
    }

    #[test]
    fn imu_sample_carries_the_full_axis_set() {
        let msg = parse_client_msg(
            r#"{"t":"imu.sample","ts_ms":0.0,"ax":1.0,"ay":2.0,"az":3.0,"gx":4.0,"gy":5.0,"gz":6.0,"alpha":7.0,"beta":8.0,"gamma":9.0}"#,
        )
        .unwrap();
        match msg {
            ClientMsg::ImuSample { az, gx, alpha, .. } => {
                assert_eq!(az, Some(3.0));
                assert_eq!(gx, Some(4.0));
                assert_eq!(alpha, Some(7.0));
            }
            _ => panic!("expected ImuSample"),
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = parse_client_msg(r#"{"t":"bogus"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidJson(_)));
    }

    #[test]
    fn scroll_is_a_single_signed_delta() {
        let msg = parse_client_msg(r#"{"t":"input.scroll","delta":-3.5}"#).unwrap();
        match msg {
            ClientMsg::Scroll { delta } => assert_eq!(delta, -3.5),
            _ => panic!("expected Scroll"),
        }
    }

    #[test]
    fn config_patch_partial_fields_default_to_none() {
        let msg = parse_client_msg(r#"{"t":"config","config":{"sensitivity":1.5}}"#).unwrap();
        match msg {
            ClientMsg::Config { config } => {
                assert_eq!(config.sensitivity, Some(1.5));
                assert!(config.enabled.is_none());
                assert!(config.fusion.is_none());
            }
            _ => panic!("expected Config"),
        }
    }

    #[test]
    fn config_patch_accepts_nested_fusion_patch() {
        let msg = parse_client_msg(r#"{"t":"config","config":{"fusion":{"max_angle_deg":30.0}}}"#);
        // Fusion sub-fields are camelCase on the wire; the snake_case spelling doesn't match.
        assert!(msg.is_err());
        let msg = parse_client_msg(r#"{"t":"config","config":{"fusion":{"maxAngleDeg":30.0}}}"#).unwrap();
        match msg {
            ClientMsg::Config { config } => {
                assert_eq!(config.fusion.unwrap().max_angle_deg, Some(30.0));
            }
            _ => panic!("expected Config"),
        }
    }

    #[test]
    fn config_patch_top_level_additions_are_camel_case() {
        let msg = parse_client_msg(r#"{"t":"config","config":{"cameraFps":30.0,"smoothingHalfLifeMs":40.0,"deadzonePx":1.0}}"#).unwrap();
        match msg {
            ClientMsg::Config { config } => {
                assert_eq!(config.camera_fps, Some(30.0));
                assert_eq!(config.smoothing_half_life_ms, Some(40.0));
                assert_eq!(config.deadzone_px, Some(1.0));
            }
            _ => panic!("expected Config"),
        }
    }

    #[test]
    fn server_state_round_trips_through_encode() {
        let mut enabled = HashMap::new();
        enabled.insert("accel".to_string(), true);
        let msg = ServerMsg::ServerState { ok: Some(true), configured: None, enabled, sensitivity: 1.0, screen_angle_deg: 0.0 };
        let text = encode_server_msg(&msg);
        assert!(text.contains("\"t\":\"server.state\""));
        assert!(text.contains("\"ok\":true"));
        assert!(!text.contains("configured"));
    }
}
