//! Error taxonomy of the motion core.
//!
//! Planning-time failures ([`Infeasible`], [`MotionError::QueueFull`]) are
//! returned synchronously to the producer. Runtime failures
//! ([`MotionError::LimitViolation`], [`MotionError::KinematicsSingularity`],
//! [`MotionError::QueueStarved`]) abort the queue and latch a [`FaultFlags`]
//! bit that the supervisory layer reads and clears.

use bitflags::bitflags;
use core::fmt;
use thiserror::Error;

/// Why a boundary, duration or geometry cannot be turned into a profile.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum Infeasible {
    /// Limits violate `v_min ≤ 0 ≤ v_max`, `a_min ≤ 0 ≤ a_max` or `j_max > 0`.
    #[error("invalid limits: {0}")]
    InvalidLimits(&'static str),

    /// A boundary velocity lies outside the velocity limits.
    #[error("boundary velocity {velocity} outside [{v_min}, {v_max}]")]
    BoundaryVelocity { velocity: f64, v_min: f64, v_max: f64 },

    /// A NaN or infinite input.
    #[error("non-finite input")]
    NonFinite,

    /// No profile variant reaches the target under the limits, e.g. the
    /// stopping distance from `v0` exceeds the available distance.
    #[error("no profile shape satisfies the boundary")]
    NoFeasibleShape,

    /// The requested duration is shorter than the minimum time.
    #[error("requested duration {requested}s is below the minimum {minimum}s")]
    DurationTooShort { requested: f64, minimum: f64 },

    /// The geometry has no usable extent or direction.
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(&'static str),

    /// Arc start and end are not equidistant from the center.
    #[error("arc radius mismatch: start {start_radius}, end {end_radius}")]
    ArcRadiusMismatch { start_radius: f64, end_radius: f64 },

    /// The path leaves the configured machine envelope.
    #[error("axis {axis} reaches {value}, outside [{min}, {max}]")]
    OutOfEnvelope {
        axis: char,
        value: f64,
        min: f64,
        max: f64,
    },

    /// More synchronised outputs than a segment can carry.
    #[error("too many synchronised outputs queued for one segment")]
    TooManyOutputs,
}

/// Failure reported by a kinematics adapter.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum KinematicsError {
    /// The pose has no (or no unique) joint solution.
    #[error("singular pose ({x}, {y}, {z}): {reason}")]
    Singularity {
        x: f64,
        y: f64,
        z: f64,
        reason: &'static str,
    },

    /// The caller supplied the wrong number of joint slots.
    #[error("expected {expected} joints, got {got}")]
    JointCount { expected: usize, got: usize },
}

/// The kinematic quantity a [`MotionError::LimitViolation`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Quantity {
    Position = 0,
    Velocity = 1,
    Acceleration = 2,
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Position => f.write_str("position"),
            Self::Velocity => f.write_str("velocity"),
            Self::Acceleration => f.write_str("acceleration"),
        }
    }
}

/// Errors surfaced by the planner, the queue and the executor.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum MotionError {
    /// The segment cannot be planned.
    #[error("infeasible: {0}")]
    Infeasible(#[from] Infeasible),

    /// Backpressure: the trajectory queue has no free slot.
    #[error("trajectory queue full")]
    QueueFull,

    /// An evaluated setpoint left the segment's limits during execution.
    #[error("limit violation on segment {segment}: {quantity} {value} outside [{min}, {max}]")]
    LimitViolation {
        segment: u64,
        quantity: Quantity,
        value: f64,
        min: f64,
        max: f64,
    },

    /// The kinematics adapter rejected a pose.
    #[error("kinematics: {0}")]
    KinematicsSingularity(#[from] KinematicsError),

    /// A blending segment finished without a published successor.
    #[error("segment {segment} ended at velocity {velocity} with no successor")]
    QueueStarved { segment: u64, velocity: f64 },
}

impl MotionError {
    /// Fault flag latched when this error occurs at runtime.
    pub const fn fault_flag(&self) -> FaultFlags {
        match self {
            Self::Infeasible(_) | Self::QueueFull => FaultFlags::empty(),
            Self::LimitViolation { .. } => FaultFlags::LIMIT_VIOLATION,
            Self::KinematicsSingularity(_) => FaultFlags::KINEMATICS_SINGULARITY,
            Self::QueueStarved { .. } => FaultFlags::QUEUE_STARVED,
        }
    }
}

bitflags! {
    /// Latched runtime faults.
    ///
    /// CRITICAL flags stop motion and require an explicit reset.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FaultFlags: u32 {
        /// Evaluated velocity/acceleration or pose outside limits. **CRITICAL**.
        const LIMIT_VIOLATION        = 0x0001;
        /// Kinematics adapter reported a singular pose. **CRITICAL**.
        const KINEMATICS_SINGULARITY = 0x0002;
        /// Blending segment ran out without a successor. **CRITICAL**.
        const QUEUE_STARVED          = 0x0004;
        /// Tick body exceeded its period.
        const CYCLE_OVERRUN          = 0x0008;
    }
}

impl FaultFlags {
    /// Mask of all CRITICAL flags.
    pub const CRITICAL_MASK: Self = Self::from_bits_truncate(
        Self::LIMIT_VIOLATION.bits()
            | Self::KINEMATICS_SINGULARITY.bits()
            | Self::QUEUE_STARVED.bits(),
    );

    /// Returns true if any CRITICAL flag is set.
    #[inline]
    pub const fn has_critical(&self) -> bool {
        self.intersects(Self::CRITICAL_MASK)
    }
}

impl Default for FaultFlags {
    fn default() -> Self {
        Self::empty()
    }
}
