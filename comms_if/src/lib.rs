//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the bridge: the messages exchanged over the
//! lab bus, the vehicle (donkeycar) API payloads, and the ZMQ socket abstractions.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Messages published to and received from the lab bus
pub mod bus;

/// Payloads of the vehicle's HTTP/MQTT API
pub mod vehicle;

/// Network module
pub mod net;

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// Identifier of a vehicle in the lab.
pub type VehicleId = u32;
