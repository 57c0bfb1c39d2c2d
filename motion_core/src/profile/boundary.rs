//! Boundary conditions of a single profile solve.

use motion_common::error::Infeasible;

/// Relative tolerance used for root acceptance.
pub const ROOT_TOLERANCE: f64 = 1e-9;

/// Relative tolerance used when verifying a finished profile.
pub const VERIFY_TOLERANCE: f64 = 1e-8;

/// Start and end state plus the kinematic limits of one solve.
///
/// Boundary acceleration is zero at both ends. Limits must satisfy
/// `v_min ≤ 0 ≤ v_max`, `a_min ≤ 0 ≤ a_max` and `j_max > 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Boundary {
    pub p0: f64,
    pub pf: f64,
    pub v0: f64,
    pub vf: f64,
    pub v_max: f64,
    pub v_min: f64,
    pub a_max: f64,
    pub a_min: f64,
    pub j_max: f64,
}

impl Boundary {
    /// Rest-to-rest move with symmetric limits.
    pub const fn rest_to_rest(p0: f64, pf: f64, v_max: f64, a_max: f64, j_max: f64) -> Self {
        Self {
            p0,
            pf,
            v0: 0.0,
            vf: 0.0,
            v_max,
            v_min: -v_max,
            a_max,
            a_min: -a_max,
            j_max,
        }
    }

    /// Forward-only move along a path of `length`, as used for segments:
    /// the path parameter never runs backwards.
    pub const fn path(length: f64, v0: f64, vf: f64, v_max: f64, accel: f64, jerk: f64) -> Self {
        Self {
            p0: 0.0,
            pf: length,
            v0,
            vf,
            v_max,
            v_min: 0.0,
            a_max: accel,
            a_min: -accel,
            j_max: jerk,
        }
    }

    /// Same limits and positions, different boundary velocities.
    #[inline]
    pub const fn with_velocities(mut self, v0: f64, vf: f64) -> Self {
        self.v0 = v0;
        self.vf = vf;
        self
    }

    /// Signed distance to travel.
    #[inline]
    pub fn distance(&self) -> f64 {
        self.pf - self.p0
    }

    /// Check limit ordering and boundary velocities.
    pub fn validate(&self) -> Result<(), Infeasible> {
        let values = [
            self.p0, self.pf, self.v0, self.vf, self.v_max, self.v_min, self.a_max, self.a_min,
            self.j_max,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Infeasible::NonFinite);
        }
        if self.v_min > 0.0 || self.v_max < 0.0 {
            return Err(Infeasible::InvalidLimits("velocity limits must bracket zero"));
        }
        if self.a_min > 0.0 || self.a_max < 0.0 {
            return Err(Infeasible::InvalidLimits(
                "acceleration limits must bracket zero",
            ));
        }
        if self.j_max <= 0.0 {
            return Err(Infeasible::InvalidLimits("jerk limit must be positive"));
        }
        let tol = self.velocity_tolerance();
        for velocity in [self.v0, self.vf] {
            if velocity > self.v_max + tol || velocity < self.v_min - tol {
                return Err(Infeasible::BoundaryVelocity {
                    velocity,
                    v_min: self.v_min,
                    v_max: self.v_max,
                });
            }
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn position_scale(&self) -> f64 {
        1.0_f64.max(self.p0.abs()).max(self.pf.abs())
    }

    #[inline]
    pub(crate) fn velocity_scale(&self) -> f64 {
        1.0_f64.max(self.v_max.abs()).max(self.v_min.abs())
    }

    #[inline]
    pub(crate) fn acceleration_scale(&self) -> f64 {
        1.0_f64.max(self.a_max.abs()).max(self.a_min.abs())
    }

    #[inline]
    pub(crate) fn velocity_tolerance(&self) -> f64 {
        VERIFY_TOLERANCE * self.velocity_scale()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rest_to_rest_is_valid() {
        let b = Boundary::rest_to_rest(0.0, 100.0, 50.0, 200.0, 2000.0);
        assert!(b.validate().is_ok());
        assert_eq!(b.distance(), 100.0);
        assert_eq!(b.v_min, -50.0);
    }

    #[test]
    fn rejects_misordered_limits() {
        let mut b = Boundary::rest_to_rest(0.0, 1.0, 1.0, 1.0, 1.0);
        b.v_min = 0.5;
        assert!(matches!(b.validate(), Err(Infeasible::InvalidLimits(_))));

        let mut b = Boundary::rest_to_rest(0.0, 1.0, 1.0, 1.0, 1.0);
        b.j_max = 0.0;
        assert!(matches!(b.validate(), Err(Infeasible::InvalidLimits(_))));
    }

    #[test]
    fn rejects_boundary_velocity_outside_limits() {
        let b = Boundary::path(10.0, 12.0, 0.0, 10.0, 100.0, 1000.0);
        assert!(matches!(
            b.validate(),
            Err(Infeasible::BoundaryVelocity { velocity, .. }) if velocity == 12.0
        ));
    }

    #[test]
    fn rejects_non_finite() {
        let b = Boundary::path(f64::NAN, 0.0, 0.0, 10.0, 100.0, 1000.0);
        assert_eq!(b.validate(), Err(Infeasible::NonFinite));
    }
}
