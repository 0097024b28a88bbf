//! # Vehicle command and state messages

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::VehicleId;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A high level command addressed to one vehicle.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
pub struct VehicleCommand {
    /// Vehicle the command is addressed to
    pub vehicle_id: VehicleId,

    /// Target steering angle in radians, positive to the left
    pub steering_target: f64,

    /// Target longitudinal speed in meters/second
    pub velocity_target: f64,
}

/// The estimated state of a vehicle.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
pub struct VehicleState {
    pub vehicle_id: VehicleId,

    /// Time of the estimate in nanoseconds since the unix epoch
    pub timestamp_ns: u64,

    pub pose: Pose2D,

    pub twist: Twist,
}

/// Position and heading in the lab frame.
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Pose2D {
    /// Position in meters
    pub x: f64,

    /// Position in meters
    pub y: f64,

    /// Heading in radians
    pub yaw: f64,
}

/// Velocities in the vehicle frame.
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Twist {
    /// Longitudinal speed in meters/second
    pub v_long: f64,

    /// Transverse speed in meters/second
    pub v_tran: f64,

    /// Yaw rate in radians/second
    pub omega: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl VehicleState {
    /// A vehicle standing still at the origin.
    pub fn at_origin(vehicle_id: VehicleId, timestamp_ns: u64) -> Self {
        Self {
            vehicle_id,
            timestamp_ns,
            pose: Pose2D::default(),
            twist: Twist::default(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_state_json_shape() {
        let state = VehicleState::at_origin(4, 17);
        let json = serde_json::to_value(&state).unwrap();

        assert_eq!(json["vehicle_id"], 4);
        assert_eq!(json["timestamp_ns"], 17);
        assert_eq!(json["pose"]["yaw"], 0.0);
        assert_eq!(json["twist"]["v_tran"], 0.0);
    }

    #[test]
    fn test_command_from_json() {
        let cmd: VehicleCommand = serde_json::from_str(
            r#"{"vehicle_id": 2, "steering_target": 0.3, "velocity_target": 0.5}"#,
        )
        .unwrap();

        assert_eq!(cmd.vehicle_id, 2);
        assert_eq!(cmd.steering_target, 0.3);
        assert_eq!(cmd.velocity_target, 0.5);
    }
}
