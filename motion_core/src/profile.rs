//! Jerk-limited seven-phase motion profiles.
//!
//! - [`boundary`] - Solve inputs: start/end state and limits
//! - [`curve`] - The [`Profile`] itself and its closed-form evaluation
//! - [`solver`] - Minimum-time and fixed-duration solves
//! - [`roots`] - Bounded root finding used by the solver
//!
//! Solving runs in the producer context. Evaluation ([`Profile::state_at`])
//! is a phase lookup plus one cubic and is what the executor calls every
//! tick.

pub mod boundary;
pub mod curve;
pub mod roots;
pub mod solver;

pub use boundary::Boundary;
pub use curve::{JerkSigns, KinematicState, Profile, Shape, PHASES};
pub use solver::{
    max_reachable_velocity, min_reachable_velocity, solve_for_duration, solve_minimum_time,
    Block,
};
