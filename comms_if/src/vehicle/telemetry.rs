//! # Telemetry and camera payloads

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Telemetry reported by the car.
///
/// Only the steering and throttle are interpreted, everything else the car sends is kept in
/// `extra` for diagnostics.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Telemetry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steering: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throttle: Option<f64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A camera frame as sent by the car.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CameraPayload {
    /// Base64 encoded image, in any format the car's camera part produces
    #[serde(default)]
    pub image: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_telemetry() {
        let t: Telemetry =
            serde_json::from_str(r#"{"throttle": 0.2, "angle": 0.1, "mode": "user"}"#).unwrap();

        assert_eq!(t.steering, None);
        assert_eq!(t.throttle, Some(0.2));
        assert_eq!(t.extra["mode"], "user");
        assert!(!t.extra.contains_key("throttle"));
    }

    #[test]
    fn test_camera_without_image() {
        let c: CameraPayload = serde_json::from_str("{}").unwrap();
        assert!(c.image.is_none());
    }
}
