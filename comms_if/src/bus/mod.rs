//! # Lab bus messages
//!
//! Every message on the bus is a two frame ZMQ message, `[topic, json]`. The topics are scoped by
//! vehicle id, apart from the visualization topic which is shared by every vehicle in the lab.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod camera;
mod vehicle;
mod vis;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use camera::CameraMessage;
pub use vehicle::{Pose2D, Twist, VehicleCommand, VehicleState};
pub use vis::{Anchor, Colour, Point2, Point3, VisCommand};

use crate::VehicleId;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Topic on which every vehicle publishes its drawing commands.
pub const VIS_TOPIC: &str = "visualization_commands";

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Topic of the high level commands for the given vehicle.
pub fn command_topic(id: VehicleId) -> String {
    format!("vehicle_command_{}", id)
}

/// Topic of the state published by the given vehicle.
pub fn state_topic(id: VehicleId) -> String {
    format!("vehicle_state_{}", id)
}

/// Topic of the camera frames forwarded for the given vehicle.
pub fn camera_topic(id: VehicleId) -> String {
    format!("donkeycar_camera_{}", id)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_topics() {
        assert_eq!(command_topic(3), "vehicle_command_3");
        assert_eq!(state_topic(3), "vehicle_state_3");
        assert_eq!(camera_topic(12), "donkeycar_camera_12");
    }
}
