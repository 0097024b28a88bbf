//! # Visualizer
//!
//! Publishes drawing commands for the lab's control center: the vehicle outline and heading, the
//! steering and throttle as text and gauges, and downscaled camera frames. Everything is fire and
//! forget, errors are logged and never returned. Drawings are limited to 20 Hz and camera frames to
//! 10 Hz by default.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use log::{debug, error};
use std::time::{Duration, Instant};

use comms_if::{
    bus::{self, Anchor, CameraMessage, Colour, Point2, Point3, Pose2D, VisCommand},
    vehicle::CamImage,
    VehicleId,
};
use util::{
    maths::{clamp_unit, lin_map},
    session::Session,
};

use crate::bus_client::{publish, SharedBus};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const VEHICLE_LENGTH_M: f64 = 0.3;
const VEHICLE_WIDTH_M: f64 = 0.15;
const VEHICLE_Z: f64 = 0.1;
const HEADING_Z: f64 = 0.11;

const VEHICLE_COLOUR: Colour = [0, 0, 255];
const HEADING_COLOUR: Colour = [255, 255, 0];
const STEERING_COLOUR: Colour = [0, 255, 0];
const THROTTLE_COLOUR: Colour = [255, 128, 0];

const CONTROLS_DURATION_S: f64 = 0.5;
const GAUGE_WIDTH_PX: f64 = 100.0;
const GAUGE_HEIGHT_PX: f64 = 10.0;
const FONT_SIZE: u32 = 12;

/// Largest side of a forwarded camera frame, in pixels.
const CAMERA_MAX_DIM: u32 = 320;
const CAMERA_JPEG_QUALITY: u8 = 80;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct Visualizer {
    vehicle_id: VehicleId,
    target: String,
    bus: SharedBus,
    session: Session,

    draw_period: Duration,
    camera_period: Duration,
    last_draw: Option<Instant>,
    last_camera: Option<Instant>,

    /// Receive time of the last forwarded frame, so the same frame is not sent twice
    last_frame: Option<DateTime<Utc>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Visualizer {
    pub fn new(
        session: &Session,
        vehicle_id: VehicleId,
        bus: SharedBus,
        draw_period: Duration,
        camera_period: Duration,
    ) -> Self {
        Self {
            vehicle_id,
            target: format!("vis_{}", vehicle_id),
            bus,
            session: session.clone(),
            draw_period,
            camera_period,
            last_draw: None,
            last_camera: None,
            last_frame: None,
        }
    }

    /// Draw the vehicle outline and its heading at `pose`. Returns `true` if anything was sent.
    pub fn visualize_vehicle(&mut self, pose: &Pose2D, duration: f64, now: Instant) -> bool {
        if !due(&mut self.last_draw, self.draw_period, now) {
            return false;
        }

        let (sin_h, cos_h) = pose.yaw.sin_cos();
        let half_l = VEHICLE_LENGTH_M / 2.0;
        let half_w = VEHICLE_WIDTH_M / 2.0;

        // Front left, front right, rear right, rear left
        let corners = [
            (half_l, half_w),
            (half_l, -half_w),
            (-half_l, -half_w),
            (-half_l, half_w),
        ];
        let outline = corners
            .iter()
            .map(|(l, w)| Point3 {
                x: pose.x + l * cos_h - w * sin_h,
                y: pose.y + l * sin_h + w * cos_h,
                z: VEHICLE_Z,
            })
            .collect();

        let heading = vec![
            Point3 {
                x: pose.x + half_l * cos_h,
                y: pose.y + half_l * sin_h,
                z: HEADING_Z,
            },
            Point3 {
                x: pose.x + VEHICLE_LENGTH_M * cos_h,
                y: pose.y + VEHICLE_LENGTH_M * sin_h,
                z: HEADING_Z,
            },
        ];

        self.send(&[
            VisCommand::DrawPolygon {
                layer: self.layer("donkeycar"),
                object_id: self.object_id("vehicle"),
                points: outline,
                color: VEHICLE_COLOUR,
                fill: true,
                duration,
                z_value: VEHICLE_Z,
            },
            VisCommand::DrawPolyline {
                layer: self.layer("donkeycar"),
                object_id: self.object_id("heading"),
                points: heading,
                color: HEADING_COLOUR,
                line_width: 2.0,
                duration,
                z_value: HEADING_Z,
            },
        ])
    }

    /// Show the steering (radians) and speed (meters/second) as text and as gauges scaled by the
    /// given maxima. Returns `true` if anything was sent.
    pub fn visualize_steering_throttle(
        &mut self,
        steering_rad: f64,
        speed_ms: f64,
        max_steering_rad: f64,
        max_speed_ms: f64,
        now: Instant,
    ) -> bool {
        if !due(&mut self.last_draw, self.draw_period, now) {
            return false;
        }

        let norm_steering = normalise(steering_rad, max_steering_rad);
        let norm_throttle = normalise(speed_ms, max_speed_ms);
        let layer = self.layer("donkeycar_controls");

        self.send(&[
            self.text(
                &layer,
                "steering_text",
                format!("Steering: {:.2} rad", steering_rad),
                30.0,
                STEERING_COLOUR,
            ),
            self.text(
                &layer,
                "throttle_text",
                format!("Throttle: {:.2} m/s", speed_ms),
                50.0,
                THROTTLE_COLOUR,
            ),
            self.gauge(&layer, "steering_gauge", norm_steering, 30.0, STEERING_COLOUR),
            self.gauge(&layer, "throttle_gauge", norm_throttle, 50.0, THROTTLE_COLOUR),
        ])
    }

    /// Forward a camera frame to the control center, downscaled and JPEG encoded. Returns `true` if
    /// the frame was sent.
    pub fn visualize_camera_image(&mut self, image: &CamImage, now: Instant) -> bool {
        if self.last_frame == Some(image.timestamp) {
            return false;
        }
        if !due(&mut self.last_camera, self.camera_period, now) {
            return false;
        }

        let frame = match image.to_jpeg_base64(CAMERA_MAX_DIM, CAMERA_JPEG_QUALITY) {
            Ok(f) => f,
            Err(e) => {
                error!(target: &self.target, "Error encoding camera image: {}", e);
                return false;
            }
        };

        let msg = CameraMessage {
            vehicle_id: self.vehicle_id,
            timestamp: self.session.time_ns(),
            image_data: frame.data,
            format: "jpeg".into(),
            width: frame.width,
            height: frame.height,
        };

        match publish(&self.bus, &bus::camera_topic(self.vehicle_id), &msg) {
            Ok(()) => {
                self.last_frame = Some(image.timestamp);
                true
            }
            Err(e) => {
                error!(target: &self.target, "Error sending camera image: {}", e);
                false
            }
        }
    }

    fn send(&self, cmds: &[VisCommand]) -> bool {
        for cmd in cmds {
            if let Err(e) = publish(&self.bus, bus::VIS_TOPIC, cmd) {
                error!(target: &self.target, "Error sending {}: {}", cmd.object_id(), e);
                return false;
            }
        }
        debug!(target: &self.target, "Sent {} drawing commands", cmds.len());
        true
    }

    fn text(&self, layer: &str, name: &str, text: String, y: f64, color: Colour) -> VisCommand {
        VisCommand::DrawText {
            layer: layer.to_string(),
            object_id: self.object_id(name),
            text,
            position: Point2 { x: 10.0, y },
            color,
            font_size: FONT_SIZE,
            duration: CONTROLS_DURATION_S,
            screen_coordinates: true,
        }
    }

    fn gauge(&self, layer: &str, name: &str, value: f64, y: f64, color: Colour) -> VisCommand {
        VisCommand::DrawRect {
            layer: layer.to_string(),
            object_id: self.object_id(name),
            position: Point2 { x: 150.0, y },
            width: lin_map((0.0, 1.0), (0.0, GAUGE_WIDTH_PX), value.abs()),
            height: GAUGE_HEIGHT_PX,
            color,
            fill: true,
            duration: CONTROLS_DURATION_S,
            screen_coordinates: true,
            anchor: if value >= 0.0 {
                Anchor::Left
            } else {
                Anchor::Right
            },
        }
    }

    fn layer(&self, name: &str) -> String {
        format!("donkeycar_{}_{}", self.vehicle_id, name)
    }

    fn object_id(&self, name: &str) -> String {
        format!("donkeycar_{}_{}", self.vehicle_id, name)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Check a rate limit, recording `now` as the last event if it is due.
fn due(last: &mut Option<Instant>, period: Duration, now: Instant) -> bool {
    match *last {
        Some(t) if now.saturating_duration_since(t) < period => false,
        _ => {
            *last = Some(now);
            true
        }
    }
}

fn normalise(value: f64, max: f64) -> f64 {
    if max == 0.0 {
        0.0
    } else {
        clamp_unit(value / max)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bus_client::{BusError, BusWriter};
    use image::DynamicImage;
    use std::sync::{Arc, Mutex};

    type Written = Arc<Mutex<Vec<(String, serde_json::Value)>>>;

    struct RecordingBus(Written);

    impl BusWriter for RecordingBus {
        fn write(&mut self, topic: &str, payload: &str) -> Result<(), BusError> {
            self.0
                .lock()
                .unwrap()
                .push((topic.to_string(), serde_json::from_str(payload).unwrap()));
            Ok(())
        }
    }

    fn visualizer() -> (Visualizer, Written) {
        let written = Written::default();
        let bus: SharedBus = Arc::new(Mutex::new(Box::new(RecordingBus(written.clone()))));
        let vis = Visualizer::new(
            &Session::detached("vis_test"),
            2,
            bus,
            Duration::from_millis(50),
            Duration::from_millis(100),
        );
        (vis, written)
    }

    #[test]
    fn test_vehicle_outline() {
        let (mut vis, written) = visualizer();
        let pose = Pose2D {
            x: 1.0,
            y: 2.0,
            yaw: 0.0,
        };

        assert!(vis.visualize_vehicle(&pose, 0.2, Instant::now()));

        let written = written.lock().unwrap();
        assert_eq!(written.len(), 2);
        let (topic, polygon) = &written[0];
        assert_eq!(topic, "visualization_commands");
        assert_eq!(polygon["command"], "draw_polygon");
        assert_eq!(polygon["layer"], "donkeycar_2_donkeycar");
        assert_eq!(polygon["object_id"], "donkeycar_2_vehicle");
        assert_eq!(polygon["points"][0]["x"], 1.15);
        assert_eq!(polygon["points"][0]["y"], 2.075);

        let (_, heading) = &written[1];
        assert_eq!(heading["command"], "draw_polyline");
        assert_eq!(heading["points"][1]["x"], 1.3);
        assert_eq!(heading["duration"], 0.2);
    }

    #[test]
    fn test_draw_rate_limit() {
        let (mut vis, written) = visualizer();
        let t0 = Instant::now();

        assert!(vis.visualize_steering_throttle(0.1, -0.5, 0.5, 1.0, t0));
        assert!(!vis.visualize_steering_throttle(0.1, -0.5, 0.5, 1.0, t0 + Duration::from_millis(10)));
        assert!(!vis.visualize_vehicle(&Pose2D::default(), 0.2, t0 + Duration::from_millis(20)));
        assert!(vis.visualize_vehicle(&Pose2D::default(), 0.2, t0 + Duration::from_millis(60)));

        let written = written.lock().unwrap();
        assert_eq!(written.len(), 6);

        let throttle_gauge = &written[3].1;
        assert_eq!(throttle_gauge["command"], "draw_rect");
        assert_eq!(throttle_gauge["anchor"], "right");
        assert_eq!(throttle_gauge["width"], 50.0);
        assert_eq!(written[0].1["text"], "Steering: 0.10 rad");
    }

    #[test]
    fn test_camera_forwarding() {
        let (mut vis, written) = visualizer();
        let t0 = Instant::now();

        let frame = CamImage {
            timestamp: Utc::now(),
            image: DynamicImage::new_rgb8(640, 480),
        };

        assert!(vis.visualize_camera_image(&frame, t0));

        // Same frame again is not re-sent, even once the rate limit allows it
        assert!(!vis.visualize_camera_image(&frame, t0 + Duration::from_millis(200)));

        let newer = CamImage {
            timestamp: frame.timestamp + chrono::Duration::milliseconds(1),
            image: DynamicImage::new_rgb8(64, 48),
        };
        assert!(vis.visualize_camera_image(&newer, t0 + Duration::from_millis(300)));

        let written = written.lock().unwrap();
        assert_eq!(written.len(), 2);
        let (topic, msg) = &written[0];
        assert_eq!(topic, "donkeycar_camera_2");
        assert_eq!(msg["format"], "jpeg");
        assert_eq!(msg["width"], 320);
        assert_eq!(msg["height"], 240);
        assert_eq!(written[1].1["width"], 64);
    }
}
