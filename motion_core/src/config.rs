//! Configuration bundle loader.
//!
//! Loads the [`MotionConfig`] and an optional command [`Program`] from TOML
//! and validates them before anything is constructed from them.

use std::path::Path;

use motion_common::command::Program;
use motion_common::config::{ConfigError, ConfigLoader, MotionConfig};
use tracing::{debug, info};

use crate::kinematics::AnyKinematics;

/// Validated configuration, ready for runtime use.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub motion: MotionConfig,
    pub kinematics: AnyKinematics,
}

impl LoadedConfig {
    fn from_config(motion: MotionConfig) -> Result<Self, ConfigError> {
        motion.validate()?;
        let kinematics = AnyKinematics::from(motion.kinematics.kind);
        Ok(Self { motion, kinematics })
    }
}

/// Load and validate the motion configuration at `path`.
pub fn load_config(path: &Path) -> Result<LoadedConfig, ConfigError> {
    let motion = MotionConfig::load(path)?;
    let loaded = LoadedConfig::from_config(motion)?;
    info!(
        "loaded {}: cycle {}µs, lookahead {}, kinematics {:?}",
        path.display(),
        loaded.motion.trajectory.cycle_time_us,
        loaded.motion.trajectory.lookahead_depth,
        loaded.motion.kinematics.kind
    );
    Ok(loaded)
}

/// Load config from a TOML string (for testing).
pub fn load_config_from_str(content: &str) -> Result<LoadedConfig, ConfigError> {
    LoadedConfig::from_config(MotionConfig::from_toml(content)?)
}

/// Load a command program.
pub fn load_program(path: &Path) -> Result<Program, ConfigError> {
    let program = Program::load(path)?;
    debug!("{} commands in {}", program.commands.len(), path.display());
    Ok(program)
}
