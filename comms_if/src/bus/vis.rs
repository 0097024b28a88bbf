//! # Visualization drawing commands
//!
//! Drawing commands are fire and forget: each one carries a `duration` after which the control
//! center removes the drawn object, and a vehicle scoped `layer`/`object_id` pair so a new command
//! replaces the previous one with the same id.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// An RGB colour.
pub type Colour = [u8; 3];

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A point in the lab frame, in meters.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// A point on the screen or in the lab plane.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A drawing command, tagged on the wire by the `command` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum VisCommand {
    DrawPolyline {
        layer: String,
        object_id: String,
        points: Vec<Point3>,
        color: Colour,
        line_width: f64,
        duration: f64,
        z_value: f64,
    },

    DrawPolygon {
        layer: String,
        object_id: String,
        points: Vec<Point3>,
        color: Colour,
        fill: bool,
        duration: f64,
        z_value: f64,
    },

    DrawRect {
        layer: String,
        object_id: String,
        position: Point2,
        width: f64,
        height: f64,
        color: Colour,
        fill: bool,
        duration: f64,
        screen_coordinates: bool,
        anchor: Anchor,
    },

    DrawText {
        layer: String,
        object_id: String,
        text: String,
        position: Point2,
        color: Colour,
        font_size: u32,
        duration: f64,
        screen_coordinates: bool,
    },
}

/// Side of a rectangle which stays fixed at `position`.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Anchor {
    Left,
    Right,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl VisCommand {
    /// The object id of this command.
    pub fn object_id(&self) -> &str {
        match self {
            VisCommand::DrawPolyline { object_id, .. }
            | VisCommand::DrawPolygon { object_id, .. }
            | VisCommand::DrawRect { object_id, .. }
            | VisCommand::DrawText { object_id, .. } => object_id,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tagged_json() {
        let cmd = VisCommand::DrawRect {
            layer: "donkeycar_1_controls".into(),
            object_id: "donkeycar_1_throttle_gauge".into(),
            position: Point2 { x: 150.0, y: 50.0 },
            width: 40.0,
            height: 10.0,
            color: [255, 128, 0],
            fill: true,
            duration: 0.5,
            screen_coordinates: true,
            anchor: Anchor::Right,
        };

        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["command"], "draw_rect");
        assert_eq!(json["anchor"], "right");
        assert_eq!(json["color"], serde_json::json!([255, 128, 0]));
        assert_eq!(cmd.object_id(), "donkeycar_1_throttle_gauge");
    }
}
