//! Per-tick output records handed to the HAL.
//!
//! A [`Setpoint`] is pre-allocated once and rewritten in place every tick.
//! All storage is inline; no field allocates.

use heapless::Vec;

use crate::consts::{MAX_EVENTS_PER_TICK, MAX_JOINTS};
use crate::geometry::Cartesian;

/// Command for a single joint.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JointSetpoint {
    /// Target position [joint units].
    pub position: f64,
    /// Target velocity [joint units/s].
    pub velocity: f64,
    /// Target acceleration [joint units/s²].
    pub acceleration: f64,
}

/// An output change that fires when its segment starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncOutput {
    Digital { index: u8, on: bool },
    Analog { index: u8, value: f64 },
}

/// Something that happened during a tick, in the order it happened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncEvent {
    /// Segment became active.
    SegmentStarted { id: u64 },
    /// Segment reached the end of its profile.
    SegmentCompleted { id: u64 },
    /// Segment was dropped by an abort or a fault.
    SegmentCancelled { id: u64 },
    /// Digital output change attached to a starting segment.
    DigitalOutput { index: u8, on: bool },
    /// Analog output change attached to a starting segment.
    AnalogOutput { index: u8, value: f64 },
    /// Runtime fault latched; carries the `FaultFlags` bits.
    Fault { flags: u32 },
}

impl From<SyncOutput> for SyncEvent {
    fn from(output: SyncOutput) -> Self {
        match output {
            SyncOutput::Digital { index, on } => Self::DigitalOutput { index, on },
            SyncOutput::Analog { index, value } => Self::AnalogOutput { index, value },
        }
    }
}

/// Everything the HAL receives for one tick.
#[derive(Debug, Clone)]
pub struct Setpoint {
    /// Tick counter, starting at 1 for the first executed tick.
    pub tick: u64,
    /// Segment that produced this setpoint; `None` while holding.
    pub segment: Option<u64>,
    /// Commanded tool pose in world coordinates.
    pub pose: Cartesian,
    /// Arc-length position along the producing segment.
    pub path_position: f64,
    /// Path velocity including feed override [units/s].
    pub path_velocity: f64,
    /// Number of valid entries in `joints`.
    pub joint_count: u8,
    /// Per-joint command.
    pub joints: [JointSetpoint; MAX_JOINTS],
    /// Events raised during this tick.
    pub events: Vec<SyncEvent, MAX_EVENTS_PER_TICK>,
}

impl Setpoint {
    pub const fn new(joint_count: u8) -> Self {
        Self {
            tick: 0,
            segment: None,
            pose: Cartesian::ZERO,
            path_position: 0.0,
            path_velocity: 0.0,
            joint_count,
            joints: [JointSetpoint {
                position: 0.0,
                velocity: 0.0,
                acceleration: 0.0,
            }; MAX_JOINTS],
            events: Vec::new(),
        }
    }

    /// Valid joint commands.
    #[inline]
    pub fn joints(&self) -> &[JointSetpoint] {
        &self.joints[..self.joint_count as usize]
    }

    /// Reset per-tick fields before the executor writes the next tick.
    #[inline]
    pub fn begin_tick(&mut self, tick: u64) {
        self.tick = tick;
        self.segment = None;
        self.path_position = 0.0;
        self.path_velocity = 0.0;
        self.events.clear();
    }

    /// Record an event. Returns `false` if the event buffer is full.
    #[inline]
    pub fn push_event(&mut self, event: SyncEvent) -> bool {
        self.events.push(event).is_ok()
    }
}
