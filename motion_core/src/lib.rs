//! # Motion Core
//!
//! Jerk-limited trajectory planning and deterministic execution for CNC
//! motion. Commands from the interpreter become segments with seven-phase
//! S-curve profiles, are blended at corners and handed through a bounded
//! lock-free queue to a tick-driven executor that emits one setpoint per
//! control period.
//!
//! ## Data Flow
//!
//! ```text
//! MotionCommand → SegmentPlanner → QueueProducer ══ring══ QueueConsumer → Executor → SetpointSink
//!                  (producer context)                    (real-time context)
//! ```
//!
//! ## Modules
//!
//! - [`profile`] - Seven-phase profile solver and evaluation
//! - [`planner`] - Geometry, limits, corner blending and lookahead
//! - [`queue`] - Segments and the SPSC trajectory queue
//! - [`executor`] - Per-tick evaluation, feed override, pause, abort
//! - [`kinematics`] - World pose ↔ joint adapters
//! - [`control`] - Supervisory control surface
//! - [`cycle`] - Tick pacing, setpoint sink, RT setup
//! - [`config`] - Configuration and program loading
//!
//! ## Zero-Allocation RT Path
//!
//! Every container reachable from [`Executor::tick`] is a fixed-capacity
//! `heapless` type sized from `motion_common::consts`.

#![deny(clippy::disallowed_types)]

pub mod config;
pub mod control;
pub mod cycle;
pub mod executor;
pub mod kinematics;
pub mod planner;
pub mod profile;
pub mod queue;

pub use control::{ControlError, MotionControl};
pub use cycle::{CycleError, CycleRunner, SetpointSink, SyntheticTicks, TickSource, TickStats};
pub use executor::{Executor, ExecutorState};
pub use kinematics::{AnyKinematics, CoreXyKinematics, Kinematics, TrivialKinematics};
pub use planner::SegmentPlanner;
pub use queue::{QueueConsumer, QueueProducer, TrajectoryQueue};
