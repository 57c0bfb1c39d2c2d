//! Motion Common Library
//!
//! Shared constants, configuration, geometry, error taxonomy and the record
//! types exchanged between the interpreter, the trajectory core and the HAL.
//!
//! # Module Structure
//!
//! - [`consts`] - Capacity limits and defaults
//! - [`config`] - Configuration loading traits and the motion config tree
//! - [`geometry`] - Cartesian vector math
//! - [`command`] - Interpreter → core motion commands
//! - [`setpoint`] - Core → HAL per-tick setpoints and sync events
//! - [`error`] - Planning and runtime error types, latched fault flags
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use motion_common::prelude::*;
//!
//! let pose = Cartesian::new(1.0, 2.0, 0.0);
//! assert_eq!(pose.norm(), 5.0_f64.sqrt());
//! ```

pub mod command;
pub mod config;
pub mod consts;
pub mod error;
pub mod geometry;
pub mod prelude;
pub mod setpoint;
