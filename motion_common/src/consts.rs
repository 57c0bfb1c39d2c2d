//! System-wide constants for the motion workspace.
//!
//! Single source of truth for capacity limits and defaults. Every
//! fixed-size container on the real-time path is sized from here.

use static_assertions::const_assert;

/// Number of Cartesian axes planned by the core (X, Y, Z).
pub const CARTESIAN_AXES: usize = 3;

/// Maximum number of joints a kinematics adapter may drive.
pub const MAX_JOINTS: usize = 9;

/// Default tick period in microseconds (1 kHz = 1000 µs).
pub const DEFAULT_CYCLE_TIME_US: u32 = 1000;

/// Ring storage slots of the trajectory queue (usable capacity is one less).
pub const QUEUE_SLOTS: usize = 64;

/// Upper bound of the producer-side lookahead window.
pub const MAX_LOOKAHEAD: usize = 32;

/// Default lookahead window depth.
pub const DEFAULT_LOOKAHEAD: usize = 8;

/// Synchronised outputs that can ride on a single segment.
pub const MAX_SYNC_OUTPUTS: usize = 4;

/// Sync events a single setpoint can carry.
pub const MAX_EVENTS_PER_TICK: usize = 40;

/// Segment hand-offs the executor performs within one tick.
pub const MAX_HANDOFFS_PER_TICK: usize = 4;

/// Extra full turns accepted on a single arc command.
pub const MAX_ARC_TURNS: u32 = 16;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config/motion.toml";

const_assert!(QUEUE_SLOTS >= 2);
const_assert!(DEFAULT_LOOKAHEAD <= MAX_LOOKAHEAD);
const_assert!(MAX_JOINTS >= CARTESIAN_AXES);
// Worst case per tick: the head activation plus every hand-off, each with a
// full set of outputs, one cancellation pair and a fault.
const_assert!(MAX_EVENTS_PER_TICK >= (MAX_HANDOFFS_PER_TICK + 1) * (2 + MAX_SYNC_OUTPUTS) + 3);
