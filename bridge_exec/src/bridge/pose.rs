//! # Dead-reckoning pose estimate
//!
//! The donkeycar has no localisation of its own, so its pose is integrated from the last known
//! steering and speed with a simplified bicycle model. The estimate starts at the origin.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Instant;

use comms_if::bus::{Pose2D, Twist};
use util::maths::wrap_pi;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Yaw rate per unit of steering angle and speed.
const YAW_RATE_GAIN: f64 = 0.5;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct PoseEstimator {
    pose: Pose2D,
    speed_ms: f64,
    last_update: Option<Instant>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PoseEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Integrate the motion since the last update and return the new pose and twist.
    ///
    /// The first call only starts the clock, the pose is unchanged.
    pub fn update(&mut self, steering_rad: f64, speed_ms: f64, now: Instant) -> (Pose2D, Twist) {
        if let Some(last) = self.last_update {
            let dt = now.saturating_duration_since(last).as_secs_f64();

            if dt > 0.0 {
                let yaw = self.pose.yaw + steering_rad * dt * speed_ms * YAW_RATE_GAIN;
                self.pose.x += speed_ms * dt * yaw.cos();
                self.pose.y += speed_ms * dt * yaw.sin();
                self.pose.yaw = wrap_pi(yaw);
                self.speed_ms = speed_ms;
            }
        }
        self.last_update = Some(now);

        let twist = Twist {
            v_long: self.speed_ms,
            v_tran: 0.0,
            omega: steering_rad * speed_ms * YAW_RATE_GAIN,
        };

        (self.pose, twist)
    }
}
