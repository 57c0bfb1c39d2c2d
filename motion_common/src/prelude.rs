//! Prelude module for common re-exports.
//!
//! ```rust
//! use motion_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    AxesConfig, AxisLimits, ConfigError, ConfigLoader, KinematicsConfig, KinematicsKind,
    LogLevel, MotionConfig, SharedConfig, TrajectoryConfig,
};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{DEFAULT_CYCLE_TIME_US, MAX_JOINTS, QUEUE_SLOTS};

// ─── Geometry & Records ─────────────────────────────────────────────
pub use crate::command::{ArcDirection, MotionCommand, Plane, Program};
pub use crate::geometry::Cartesian;
pub use crate::setpoint::{JointSetpoint, Setpoint, SyncEvent, SyncOutput};

// ─── Errors ─────────────────────────────────────────────────────────
pub use crate::error::{FaultFlags, Infeasible, KinematicsError, MotionError, Quantity};
