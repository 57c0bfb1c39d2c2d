//! Motion commands emitted by the interpreter.
//!
//! One record per canonical move. Positions are absolute machine
//! coordinates; the start point of every move is the end point of the
//! previous one.
//!
//! # TOML Example
//!
//! ```toml
//! [[command]]
//! type = "line"
//! end = [10.0, 0.0, 0.0]
//! feed_rate = 50.0
//! blend_tolerance = 0.05
//!
//! [[command]]
//! type = "arc"
//! end = [20.0, 10.0, 0.0]
//! center = [10.0, 10.0, 0.0]
//! plane = "xy"
//! direction = "ccw"
//! feed_rate = 40.0
//!
//! [[command]]
//! type = "dwell"
//! seconds = 0.5
//! ```

use serde::{Deserialize, Serialize};

use crate::geometry::Cartesian;

/// Plane an arc is drawn in, selecting its rotation axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Plane {
    /// Rotation about +Z.
    #[default]
    Xy,
    /// Rotation about +Y.
    Xz,
    /// Rotation about +X.
    Yz,
}

impl Plane {
    /// Unit normal of the plane.
    pub const fn normal(self) -> Cartesian {
        match self {
            Self::Xy => Cartesian::Z,
            Self::Xz => Cartesian::Y,
            Self::Yz => Cartesian::X,
        }
    }
}

/// Rotation sense of an arc seen from the tip of the plane normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArcDirection {
    Cw,
    #[default]
    Ccw,
}

/// A single interpreter request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MotionCommand {
    /// Straight move to `end`.
    Line {
        end: Cartesian,
        /// Requested path velocity [units/s].
        feed_rate: f64,
        /// Corner deviation allowed at the end of this move; absent or
        /// non-positive means exact stop.
        #[serde(default)]
        blend_tolerance: Option<f64>,
    },

    /// Circular or helical move to `end` around `center`.
    Arc {
        end: Cartesian,
        center: Cartesian,
        #[serde(default)]
        plane: Plane,
        #[serde(default)]
        direction: ArcDirection,
        /// Additional full revolutions.
        #[serde(default)]
        turns: u32,
        feed_rate: f64,
        #[serde(default)]
        blend_tolerance: Option<f64>,
    },

    /// Feed to `bottom` and retract to the start point with an exact stop
    /// at the reversal.
    RigidTap { bottom: Cartesian, feed_rate: f64 },

    /// Hold position for a fixed time.
    Dwell { seconds: f64 },

    /// Set a digital output when the next motion segment starts.
    DigitalOutput { index: u8, on: bool },

    /// Set an analog output when the next motion segment starts.
    AnalogOutput { index: u8, value: f64 },
}

impl MotionCommand {
    /// Short name for logging.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Line { .. } => "line",
            Self::Arc { .. } => "arc",
            Self::RigidTap { .. } => "rigid_tap",
            Self::Dwell { .. } => "dwell",
            Self::DigitalOutput { .. } => "digital_output",
            Self::AnalogOutput { .. } => "analog_output",
        }
    }
}

/// A command program as read from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    #[serde(default, rename = "command")]
    pub commands: Vec<MotionCommand>,
}
