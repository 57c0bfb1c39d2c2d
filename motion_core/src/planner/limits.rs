//! Path limits derived from per-axis machine limits.
//!
//! The path variable is arc length, so a line inherits the axis limits
//! projected on its direction while an arc, whose direction sweeps, uses
//! the inscribed limit of every axis it moves.

use motion_common::config::{AxesConfig, AxisLimits};
use motion_common::consts::CARTESIAN_AXES;
use motion_common::error::Infeasible;
use motion_common::geometry::Cartesian;

use super::geometry::{Arc, MIN_SEGMENT_LENGTH};

/// Share of the acceleration budget given to the path direction on arcs.
pub const TANGENTIAL_ACCEL_RATIO: f64 = 0.5;

/// Share of the acceleration budget available for centripetal acceleration
/// (√3/2, the complement of [`TANGENTIAL_ACCEL_RATIO`] on the unit circle).
pub const NORMAL_ACCEL_RATIO: f64 = 0.866_025_403_784_438_6;

/// Unit-direction components below this do not constrain the path.
const MIN_COMPONENT: f64 = 1e-12;

/// Axis components of the arc normal above this mean the axis does not
/// move within the arc plane.
const OUT_OF_PLANE: f64 = 1.0 - 1e-9;

/// Limits along the path parameter of one segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathLimits {
    /// Velocity cap [mm/s].
    pub velocity: f64,
    /// Tangential acceleration [mm/s²].
    pub acceleration: f64,
    /// Jerk [mm/s³].
    pub jerk: f64,
    /// Normal (centripetal) acceleration available at corners [mm/s²].
    pub normal_acceleration: f64,
}

impl PathLimits {
    /// Limits of a segment that does not move (dwell).
    pub const STILL: Self = Self {
        velocity: 0.0,
        acceleration: 0.0,
        jerk: 0.0,
        normal_acceleration: 0.0,
    };

    /// Limits for straight travel along unit vector `direction`.
    pub fn for_direction(axes: &AxesConfig, direction: &Cartesian) -> Self {
        let mut limits = Self::unbounded();
        let mut normal = f64::INFINITY;
        for i in 0..CARTESIAN_AXES {
            let component = direction.axis(i).abs();
            let axis = axes.axis(i);
            normal = normal.min(axis.max_acceleration);
            if component < MIN_COMPONENT {
                continue;
            }
            limits.velocity = limits.velocity.min(axis.max_velocity / component);
            limits.acceleration = limits.acceleration.min(axis.max_acceleration / component);
            limits.jerk = limits.jerk.min(axis.max_jerk / component);
        }
        limits.normal_acceleration = normal * NORMAL_ACCEL_RATIO;
        limits
    }

    /// Limits for an arc: inscribed over the axes the arc moves, with the
    /// velocity capped so centripetal acceleration stays in budget.
    pub fn for_arc(axes: &AxesConfig, arc: &Arc) -> Self {
        let normal = arc.normal();
        let helical = arc.rise().abs() > MIN_SEGMENT_LENGTH;
        let mut inscribed = AxisLimits::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
        for i in 0..CARTESIAN_AXES {
            let n = normal.axis(i).abs();
            let in_plane = n < OUT_OF_PLANE;
            let axial = helical && n > MIN_COMPONENT;
            if !(in_plane || axial) {
                continue;
            }
            let axis = axes.axis(i);
            inscribed.max_velocity = inscribed.max_velocity.min(axis.max_velocity);
            inscribed.max_acceleration = inscribed.max_acceleration.min(axis.max_acceleration);
            inscribed.max_jerk = inscribed.max_jerk.min(axis.max_jerk);
        }
        let normal_acceleration = inscribed.max_acceleration * NORMAL_ACCEL_RATIO;
        Self {
            velocity: inscribed
                .max_velocity
                .min((normal_acceleration * arc.radius()).sqrt()),
            acceleration: inscribed.max_acceleration * TANGENTIAL_ACCEL_RATIO,
            jerk: inscribed.max_jerk,
            normal_acceleration,
        }
    }

    /// Reserve headroom so that a feed override up to `k` keeps the scaled
    /// profile inside the machine limits.
    pub fn with_feed_headroom(self, k: f64) -> Self {
        let k = k.max(1.0);
        Self {
            velocity: self.velocity / k,
            acceleration: self.acceleration / (k * k),
            jerk: self.jerk / (k * k * k),
            normal_acceleration: self.normal_acceleration / (k * k),
        }
    }

    /// Apply the programmed feed rate and the global velocity cap.
    ///
    /// # Errors
    ///
    /// [`Infeasible::InvalidLimits`] for a non-positive or NaN feed rate,
    /// [`Infeasible::NonFinite`] when no finite limit remains.
    pub fn capped(self, feed_rate: f64, max_velocity: f64) -> Result<Self, Infeasible> {
        if !(feed_rate > 0.0) {
            return Err(Infeasible::InvalidLimits("feed rate must be positive"));
        }
        let limits = Self {
            velocity: self.velocity.min(feed_rate).min(max_velocity),
            ..self
        };
        if !(limits.velocity.is_finite()
            && limits.acceleration.is_finite()
            && limits.jerk.is_finite())
        {
            return Err(Infeasible::NonFinite);
        }
        Ok(limits)
    }

    const fn unbounded() -> Self {
        Self {
            velocity: f64::INFINITY,
            acceleration: f64::INFINITY,
            jerk: f64::INFINITY,
            normal_acceleration: f64::INFINITY,
        }
    }
}
