//! # Camera frames forwarded to the control center

use serde::{Deserialize, Serialize};

use crate::VehicleId;

/// A single camera frame, encoded and ready for display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CameraMessage {
    pub vehicle_id: VehicleId,

    /// Time of forwarding in nanoseconds since the unix epoch
    pub timestamp: u64,

    /// Base64 encoded image
    pub image_data: String,

    /// Encoding of `image_data`, always `"jpeg"`
    pub format: String,

    pub width: u32,

    pub height: u32,
}
