//! # Vehicle API payloads
//!
//! The donkeycar exposes the same JSON payloads over HTTP and MQTT, only the way they are carried
//! differs. This module defines those payloads and the camera frame decoding.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod cam;
mod drive;
mod telemetry;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use cam::{CamDecodeError, CamImage, EncodedFrame};
pub use drive::{DriveCommand, ParseProtocolError, Protocol};
pub use telemetry::{CameraPayload, Telemetry};
