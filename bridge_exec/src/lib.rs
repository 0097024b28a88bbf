//! # Bridge library.
//!
//! This library allows other crates in the workspace, and the integration tests, to access items
//! defined inside the bridge crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Physical car bridge - connects one vehicle to the lab bus
pub mod bridge;

/// Bus client - publishes on and listens to the lab bus
pub mod bus_client;

/// Command line interface and connection resolution
pub mod cli;

/// Network controller - rate limits commands and collects telemetry from the vehicle
pub mod net_ctrl;

/// Parameters of the bridge executable
pub mod params;

/// Vehicle transports - HTTP and MQTT links to the car
pub mod transport;

/// Visualizer - draws the vehicle and forwards camera frames to the lab
pub mod visualizer;
