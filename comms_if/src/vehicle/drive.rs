//! # Drive commands

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A normalised drive command as understood by the donkeycar web and MQTT controllers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriveCommand {
    /// Steering in `[-1, 1]`
    pub steering: f64,

    /// Throttle in `[-1, 1]`
    pub throttle: f64,

    /// Always `"user"`, so the car's own pilot does not override the command
    pub drive_mode: String,

    /// Always `false`, the bridge never asks the car to record a tub
    pub recording: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The protocol used to talk to the vehicle.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Mqtt,
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown protocol \"{0}\", expected \"http\" or \"mqtt\"")]
pub struct ParseProtocolError(String);

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl DriveCommand {
    /// A user mode command with the given normalised values.
    pub fn user(steering: f64, throttle: f64) -> Self {
        Self {
            steering,
            throttle,
            drive_mode: "user".into(),
            recording: false,
        }
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Protocol::Http
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => write!(f, "http"),
            Protocol::Mqtt => write!(f, "mqtt"),
        }
    }
}

impl FromStr for Protocol {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "mqtt" => Ok(Protocol::Mqtt),
            _ => Err(ParseProtocolError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_drive_json() {
        let json = serde_json::to_value(&DriveCommand::user(0.5, -0.25)).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "steering": 0.5,
                "throttle": -0.25,
                "drive_mode": "user",
                "recording": false
            })
        );
    }

    #[test]
    fn test_protocol_parse() {
        assert_eq!("http".parse::<Protocol>().unwrap(), Protocol::Http);
        assert_eq!("MQTT".parse::<Protocol>().unwrap(), Protocol::Mqtt);
        assert!("ros".parse::<Protocol>().is_err());
        assert_eq!(Protocol::Mqtt.to_string(), "mqtt");
    }
}
