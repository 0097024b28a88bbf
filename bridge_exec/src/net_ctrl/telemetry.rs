//! # Telemetry store
//!
//! Last-value cell holding what is known about the vehicle. Writes come from the command path
//! (the commanded echo) and from the ingestion path of the selected protocol: the HTTP poll thread
//! or the MQTT network loop. Ingestion writes tagged with the other protocol are rejected.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{trace, warn};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use comms_if::vehicle::{CamImage, CameraPayload, Protocol, Telemetry};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Snapshot of what is known about the vehicle.
#[derive(Debug, Clone, Default)]
pub struct TelemetrySample {
    /// Last known normalised steering
    pub steering: f64,

    /// Last known normalised throttle
    pub throttle: f64,

    /// Last successfully decoded camera frame
    pub camera: Option<Arc<CamImage>>,

    /// Last telemetry exactly as the car sent it
    pub raw_telemetry: Option<Value>,

    pub last_telemetry: Option<Instant>,
    pub last_camera: Option<Instant>,
}

pub struct TelemetryStore {
    protocol: Protocol,
    sample: Mutex<TelemetrySample>,
    target: String,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TelemetryStore {
    /// Create an empty store which accepts ingestion writes from `protocol` only.
    pub fn new(protocol: Protocol, log_target: &str) -> Self {
        Self {
            protocol,
            sample: Mutex::new(TelemetrySample::default()),
            target: log_target.to_string(),
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Copy of the current sample.
    pub fn snapshot(&self) -> TelemetrySample {
        self.lock().clone()
    }

    pub fn steering_throttle(&self) -> (f64, f64) {
        let sample = self.lock();
        (sample.steering, sample.throttle)
    }

    pub fn camera(&self) -> Option<Arc<CamImage>> {
        self.lock().camera.clone()
    }

    /// Record a command sent to the vehicle as the last known steering and throttle.
    pub fn record_command(&self, steering: f64, throttle: f64) {
        let mut sample = self.lock();
        sample.steering = steering;
        sample.throttle = throttle;
    }

    /// Apply telemetry received over `source`. Returns `true` if the telemetry was accepted.
    pub fn apply_telemetry(&self, source: Protocol, raw: Value) -> bool {
        if !self.accepts(source, "telemetry") {
            return false;
        }

        let telemetry: Telemetry = match serde_json::from_value(raw.clone()) {
            Ok(t) => t,
            Err(e) => {
                warn!(target: &self.target, "Invalid telemetry from the car: {}", e);
                return false;
            }
        };

        let mut sample = self.lock();
        if let Some(s) = telemetry.steering {
            sample.steering = s;
        }
        if let Some(t) = telemetry.throttle {
            sample.throttle = t;
        }
        sample.raw_telemetry = Some(raw);
        sample.last_telemetry = Some(Instant::now());

        true
    }

    /// Apply a camera frame received over `source`. Returns `true` if a new frame was stored, a
    /// payload which cannot be decoded leaves the previous frame in place.
    pub fn apply_camera(&self, source: Protocol, payload: &CameraPayload) -> bool {
        if !self.accepts(source, "camera") {
            return false;
        }

        let data = match payload.image {
            Some(ref d) if !d.is_empty() => d,
            _ => {
                trace!(target: &self.target, "Camera payload without an image");
                return false;
            }
        };

        match CamImage::from_base64(data) {
            Ok(image) => {
                let mut sample = self.lock();
                sample.camera = Some(Arc::new(image));
                sample.last_camera = Some(Instant::now());
                true
            }
            Err(e) => {
                warn!(target: &self.target, "Error processing camera data: {}", e);
                false
            }
        }
    }

    /// Route a pushed message to the telemetry or camera handler by its topic suffix.
    pub fn dispatch_message(&self, source: Protocol, topic: &str, payload: &[u8]) -> bool {
        if topic.ends_with("/telemetry") {
            match serde_json::from_slice(payload) {
                Ok(raw) => self.apply_telemetry(source, raw),
                Err(e) => {
                    warn!(target: &self.target, "Invalid JSON on {}: {}", topic, e);
                    false
                }
            }
        } else if topic.ends_with("/camera") {
            match serde_json::from_slice::<CameraPayload>(payload) {
                Ok(camera) => self.apply_camera(source, &camera),
                Err(e) => {
                    warn!(target: &self.target, "Invalid JSON on {}: {}", topic, e);
                    false
                }
            }
        } else {
            trace!(target: &self.target, "Ignoring message on {}", topic);
            false
        }
    }

    fn accepts(&self, source: Protocol, what: &str) -> bool {
        if source != self.protocol {
            warn!(
                target: &self.target,
                "Rejected {} from {} while the selected protocol is {}", what, source, self.protocol
            );
            return false;
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, TelemetrySample> {
        self.sample.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use image::DynamicImage;
    use serde_json::json;

    fn png_base64(width: u32, height: u32) -> String {
        let mut data = Vec::<u8>::new();
        DynamicImage::new_rgb8(width, height)
            .write_to(&mut data, image::ImageOutputFormat::Png)
            .unwrap();
        base64::encode(&data)
    }

    #[test]
    fn test_partial_telemetry_keeps_fields() {
        let store = TelemetryStore::new(Protocol::Http, "test");
        store.record_command(0.5, 0.25);

        assert!(store.apply_telemetry(Protocol::Http, json!({"throttle": -0.1, "mode": "user"})));
        assert_eq!(store.steering_throttle(), (0.5, -0.1));

        let sample = store.snapshot();
        assert_eq!(sample.raw_telemetry.unwrap()["mode"], "user");
        assert!(sample.last_telemetry.is_some());
    }

    #[test]
    fn test_other_protocol_rejected() {
        let store = TelemetryStore::new(Protocol::Http, "test");

        assert!(!store.apply_telemetry(Protocol::Mqtt, json!({"steering": 1.0})));
        assert!(!store.dispatch_message(
            Protocol::Mqtt,
            "donkeycar/car1/telemetry",
            br#"{"steering": 1.0}"#
        ));
        assert_eq!(store.steering_throttle(), (0.0, 0.0));
        assert!(store.snapshot().raw_telemetry.is_none());
    }

    #[test]
    fn test_camera_staleness() {
        let store = TelemetryStore::new(Protocol::Mqtt, "test");
        assert!(store.camera().is_none());

        let good = json!({ "image": png_base64(4, 3) }).to_string();
        assert!(store.dispatch_message(Protocol::Mqtt, "donkeycar/car1/camera", good.as_bytes()));
        let first = store.camera().unwrap();
        assert_eq!((first.width(), first.height()), (4, 3));

        // Undecodable payloads leave the last frame in place
        assert!(!store.dispatch_message(
            Protocol::Mqtt,
            "donkeycar/car1/camera",
            br#"{"image": "%%%"}"#
        ));
        assert!(!store.dispatch_message(Protocol::Mqtt, "donkeycar/car1/camera", b"not json"));
        assert!(!store.dispatch_message(Protocol::Mqtt, "donkeycar/car1/camera", b"{}"));

        let still = store.camera().unwrap();
        assert!(Arc::ptr_eq(&first, &still));
    }

    #[test]
    fn test_dispatch_by_suffix() {
        let store = TelemetryStore::new(Protocol::Mqtt, "test");

        assert!(store.dispatch_message(
            Protocol::Mqtt,
            "donkeycar/car1/telemetry",
            br#"{"steering": -0.3, "throttle": 0.4}"#
        ));
        assert_eq!(store.steering_throttle(), (-0.3, 0.4));

        assert!(!store.dispatch_message(Protocol::Mqtt, "donkeycar/car1/other", b"{}"));
    }
}
