//! Configuration loading traits and the motion configuration tree.
//!
//! All config types use `serde::Deserialize` for TOML loading. Numeric
//! parameters have const `MIN`/`MAX` bounds checked by `validate()`.
//! Optional fields use `#[serde(default)]`.
//!
//! # TOML Example
//!
//! ```toml
//! [shared]
//! log_level = "info"
//! service_name = "motion-core"
//!
//! [trajectory]
//! cycle_time_us = 1000
//! lookahead_depth = 8
//! max_velocity = 200.0
//! max_feed_scale = 1.2
//!
//! [axes.x]
//! max_velocity = 100.0
//! max_acceleration = 500.0
//! max_jerk = 5000.0
//! min_position = 0.0
//! max_position = 400.0
//!
//! [axes.y]
//! max_velocity = 100.0
//! max_acceleration = 500.0
//! max_jerk = 5000.0
//!
//! [axes.z]
//! max_velocity = 50.0
//! max_acceleration = 250.0
//! max_jerk = 2500.0
//!
//! [kinematics]
//! kind = "trivial"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::consts::{CARTESIAN_AXES, DEFAULT_CYCLE_TIME_US, DEFAULT_LOOKAHEAD, MAX_LOOKAHEAD};
use crate::geometry::Cartesian;

// ─── Bounds ─────────────────────────────────────────────────────────

pub const CYCLE_TIME_US_MIN: u32 = 100;
pub const CYCLE_TIME_US_MAX: u32 = 10_000;
pub const FEED_SCALE_MAX_LIMIT: f64 = 10.0;
pub const DEFAULT_MAX_FEED_SCALE: f64 = 1.0;
/// Feed override ramp in scale units per second.
pub const DEFAULT_FEED_RAMP_RATE: f64 = 4.0;
pub const DEFAULT_ARC_RADIUS_TOLERANCE: f64 = 1e-4;
/// Relative slack when checking evaluated setpoints against limits.
pub const DEFAULT_LIMIT_TOLERANCE: f64 = 1e-6;

// ─── Errors ─────────────────────────────────────────────────────────

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields shared across applications.
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "motion-core-sim"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// Implemented for every `serde::de::DeserializeOwned` type.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

// ─── Motion Config ──────────────────────────────────────────────────

/// Top-level motion core configuration.
///
/// Loaded from TOML at startup and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionConfig {
    pub shared: SharedConfig,
    #[serde(default)]
    pub trajectory: TrajectoryConfig,
    pub axes: AxesConfig,
    #[serde(default)]
    pub kinematics: KinematicsConfig,
}

impl MotionConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.trajectory.validate()?;
        self.axes.validate()?;
        self.axes.check_start(&self.trajectory.start_position)?;
        Ok(())
    }
}

/// Planning and execution parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryConfig {
    /// Tick period in microseconds (default: 1000 = 1 ms).
    #[serde(default = "default_cycle_time_us")]
    pub cycle_time_us: u32,

    /// Segments held back for blending before publication (default: 8).
    #[serde(default = "default_lookahead")]
    pub lookahead_depth: usize,

    /// Global path velocity ceiling [units/s].
    #[serde(default = "default_max_velocity")]
    pub max_velocity: f64,

    /// Highest accepted feed override (default: 1.0). Planned limits keep
    /// headroom so the axis limits hold at this scale.
    #[serde(default = "default_max_feed_scale")]
    pub max_feed_scale: f64,

    /// Highest rate the time scale falls at on a feed decrease or pause
    /// [1/s]; 0 leaves it bounded by path acceleration and jerk alone.
    #[serde(default = "default_feed_ramp_rate")]
    pub feed_ramp_rate: f64,

    /// Accepted difference between arc start and end radius.
    #[serde(default = "default_arc_radius_tolerance")]
    pub arc_radius_tolerance: f64,

    /// Relative slack of the runtime limit check.
    #[serde(default = "default_limit_tolerance")]
    pub limit_tolerance: f64,

    /// Machine position at power-up.
    #[serde(default)]
    pub start_position: Cartesian,
}

fn default_cycle_time_us() -> u32 {
    DEFAULT_CYCLE_TIME_US
}
fn default_lookahead() -> usize {
    DEFAULT_LOOKAHEAD
}
fn default_max_velocity() -> f64 {
    f64::INFINITY
}
fn default_max_feed_scale() -> f64 {
    DEFAULT_MAX_FEED_SCALE
}
fn default_feed_ramp_rate() -> f64 {
    DEFAULT_FEED_RAMP_RATE
}
fn default_arc_radius_tolerance() -> f64 {
    DEFAULT_ARC_RADIUS_TOLERANCE
}
fn default_limit_tolerance() -> f64 {
    DEFAULT_LIMIT_TOLERANCE
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            cycle_time_us: default_cycle_time_us(),
            lookahead_depth: default_lookahead(),
            max_velocity: default_max_velocity(),
            max_feed_scale: default_max_feed_scale(),
            feed_ramp_rate: default_feed_ramp_rate(),
            arc_radius_tolerance: default_arc_radius_tolerance(),
            limit_tolerance: default_limit_tolerance(),
            start_position: Cartesian::ZERO,
        }
    }
}

impl TrajectoryConfig {
    /// Tick period in seconds.
    #[inline]
    pub fn cycle_time_s(&self) -> f64 {
        self.cycle_time_us as f64 * 1e-6
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cycle_time_us < CYCLE_TIME_US_MIN || self.cycle_time_us > CYCLE_TIME_US_MAX {
            return Err(ConfigError::ValidationError(format!(
                "cycle_time_us {} out of range [{}, {}]",
                self.cycle_time_us, CYCLE_TIME_US_MIN, CYCLE_TIME_US_MAX
            )));
        }
        if self.lookahead_depth == 0 || self.lookahead_depth > MAX_LOOKAHEAD {
            return Err(ConfigError::ValidationError(format!(
                "lookahead_depth {} out of range [1, {}]",
                self.lookahead_depth, MAX_LOOKAHEAD
            )));
        }
        if !(self.max_velocity > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "max_velocity {} must be positive",
                self.max_velocity
            )));
        }
        if !(self.max_feed_scale >= 1.0 && self.max_feed_scale <= FEED_SCALE_MAX_LIMIT) {
            return Err(ConfigError::ValidationError(format!(
                "max_feed_scale {} out of range [1, {}]",
                self.max_feed_scale, FEED_SCALE_MAX_LIMIT
            )));
        }
        if !(self.feed_ramp_rate >= 0.0 && self.feed_ramp_rate.is_finite()) {
            return Err(ConfigError::ValidationError(format!(
                "feed_ramp_rate {} must be finite and non-negative",
                self.feed_ramp_rate
            )));
        }
        if !(self.arc_radius_tolerance > 0.0 && self.arc_radius_tolerance.is_finite()) {
            return Err(ConfigError::ValidationError(format!(
                "arc_radius_tolerance {} must be finite and positive",
                self.arc_radius_tolerance
            )));
        }
        if !(self.limit_tolerance >= 0.0 && self.limit_tolerance < 0.1) {
            return Err(ConfigError::ValidationError(format!(
                "limit_tolerance {} out of range [0, 0.1)",
                self.limit_tolerance
            )));
        }
        if !self.start_position.is_finite() {
            return Err(ConfigError::ValidationError(
                "start_position must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Dynamic limits and travel range of one Cartesian axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisLimits {
    /// [units/s]
    pub max_velocity: f64,
    /// [units/s²]
    pub max_acceleration: f64,
    /// [units/s³]
    pub max_jerk: f64,
    /// Lower soft limit (default: unbounded).
    #[serde(default = "default_min_position")]
    pub min_position: f64,
    /// Upper soft limit (default: unbounded).
    #[serde(default = "default_max_position")]
    pub max_position: f64,
}

fn default_min_position() -> f64 {
    f64::NEG_INFINITY
}
fn default_max_position() -> f64 {
    f64::INFINITY
}

impl AxisLimits {
    pub const fn new(max_velocity: f64, max_acceleration: f64, max_jerk: f64) -> Self {
        Self {
            max_velocity,
            max_acceleration,
            max_jerk,
            min_position: f64::NEG_INFINITY,
            max_position: f64::INFINITY,
        }
    }

    /// Whether `value` lies inside the soft limits (with `slack`).
    #[inline]
    pub fn contains(&self, value: f64, slack: f64) -> bool {
        value >= self.min_position - slack && value <= self.max_position + slack
    }

    fn validate(&self, axis: char) -> Result<(), ConfigError> {
        let positive = |name: &str, v: f64| {
            if v > 0.0 && v.is_finite() {
                Ok(())
            } else {
                Err(ConfigError::ValidationError(format!(
                    "axes.{axis}.{name} {v} must be finite and positive"
                )))
            }
        };
        positive("max_velocity", self.max_velocity)?;
        positive("max_acceleration", self.max_acceleration)?;
        positive("max_jerk", self.max_jerk)?;
        if self.min_position.is_nan()
            || self.max_position.is_nan()
            || self.min_position >= self.max_position
        {
            return Err(ConfigError::ValidationError(format!(
                "axes.{axis}: min_position {} must be below max_position {}",
                self.min_position, self.max_position
            )));
        }
        Ok(())
    }
}

/// Limits of the three Cartesian axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxesConfig {
    pub x: AxisLimits,
    pub y: AxisLimits,
    pub z: AxisLimits,
}

impl AxesConfig {
    pub const NAMES: [char; CARTESIAN_AXES] = ['X', 'Y', 'Z'];

    /// Same limits on every axis.
    pub const fn uniform(limits: AxisLimits) -> Self {
        Self {
            x: limits,
            y: limits,
            z: limits,
        }
    }

    /// Axis by index (0 = X, 1 = Y, 2 = Z).
    #[inline]
    pub fn axis(&self, index: usize) -> &AxisLimits {
        match index {
            0 => &self.x,
            1 => &self.y,
            _ => &self.z,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.x.validate('x')?;
        self.y.validate('y')?;
        self.z.validate('z')?;
        Ok(())
    }

    fn check_start(&self, start: &Cartesian) -> Result<(), ConfigError> {
        for i in 0..CARTESIAN_AXES {
            let v = start.axis(i);
            if !self.axis(i).contains(v, 0.0) {
                return Err(ConfigError::ValidationError(format!(
                    "start_position {} = {v} outside soft limits",
                    Self::NAMES[i]
                )));
            }
        }
        Ok(())
    }
}

/// Kinematics adapter selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KinematicsKind {
    /// X, Y, Z map one-to-one onto joints 0..2.
    #[default]
    Trivial,
    /// Belt-coupled XY gantry: A = X + Y, B = X − Y, Z direct.
    CoreXy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct KinematicsConfig {
    #[serde(default)]
    pub kind: KinematicsKind,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const VALID: &str = r#"
        [shared]
        service_name = "motion-test"

        [trajectory]
        cycle_time_us = 500
        max_feed_scale = 1.5

        [axes.x]
        max_velocity = 100.0
        max_acceleration = 500.0
        max_jerk = 5000.0
        min_position = -10.0
        max_position = 300.0

        [axes.y]
        max_velocity = 100.0
        max_acceleration = 500.0
        max_jerk = 5000.0

        [axes.z]
        max_velocity = 50.0
        max_acceleration = 250.0
        max_jerk = 2500.0
    "#;

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
        assert_eq!(LogLevel::Warn.as_directive(), "warn");
    }

    #[test]
    fn test_shared_config_validation_failure() {
        let config = SharedConfig {
            log_level: LogLevel::Info,
            service_name: String::new(),
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_motion_config_defaults_applied() {
        let config = MotionConfig::from_toml(VALID).unwrap();
        config.validate().unwrap();
        assert_eq!(config.trajectory.cycle_time_us, 500);
        assert_eq!(config.trajectory.lookahead_depth, DEFAULT_LOOKAHEAD);
        assert!(config.trajectory.max_velocity.is_infinite());
        assert_eq!(config.axes.y.min_position, f64::NEG_INFINITY);
        assert_eq!(config.kinematics.kind, KinematicsKind::Trivial);
        assert!((config.trajectory.cycle_time_s() - 0.0005).abs() < 1e-15);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(VALID.as_bytes()).unwrap();
        let config = MotionConfig::load(file.path()).unwrap();
        assert_eq!(config.shared.service_name, "motion-test");
    }

    #[test]
    fn test_load_missing_file() {
        let result = MotionConfig::load(Path::new("/nonexistent/motion.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let result = MotionConfig::from_toml("[shared\nservice_name=");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_rejects_bad_bounds() {
        let mut config = MotionConfig::from_toml(VALID).unwrap();
        config.trajectory.cycle_time_us = 50;
        assert!(config.validate().is_err());

        let mut config = MotionConfig::from_toml(VALID).unwrap();
        config.trajectory.max_feed_scale = 0.5;
        assert!(config.validate().is_err());

        let mut config = MotionConfig::from_toml(VALID).unwrap();
        config.axes.z.max_jerk = 0.0;
        assert!(config.validate().is_err());

        let mut config = MotionConfig::from_toml(VALID).unwrap();
        config.trajectory.lookahead_depth = MAX_LOOKAHEAD + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_start_must_be_inside_envelope() {
        let mut config = MotionConfig::from_toml(VALID).unwrap();
        config.trajectory.start_position = Cartesian::new(-20.0, 0.0, 0.0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("start_position X"));
    }
}
