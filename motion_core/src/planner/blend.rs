//! Corner blending between consecutive segments.
//!
//! A corner is passed on a virtual circular arc that stays within the blend
//! tolerance of the programmed corner point. The speed through the corner
//! is the speed at which that arc's centripetal acceleration equals the
//! normal acceleration budget.

use core::f64::consts::FRAC_PI_2;

use motion_common::geometry::Cartesian;

/// Half-angles this close to π/2 are treated as a tangent continuation.
pub const TANGENT_ANGLE_TOLERANCE: f64 = 1e-6;

/// Half-angles below this are a full reversal.
pub const REVERSAL_ANGLE_TOLERANCE: f64 = 1e-6;

/// Blend tolerance never exceeds this share of the shorter segment.
pub const MAX_TOLERANCE_SHARE: f64 = 0.25;

/// One side of a corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CornerSide {
    /// Unit tangent at the corner (end tangent of the leading segment or
    /// start tangent of the trailing one).
    pub tangent: Cartesian,
    pub length: f64,
    pub normal_acceleration: f64,
}

/// Half of the angle between the reversed incoming and the outgoing
/// tangent: π/2 for a straight continuation, 0 for a full reversal.
#[inline]
pub fn half_angle(u_in: &Cartesian, u_out: &Cartesian) -> f64 {
    0.5 * (-u_in.dot(u_out)).clamp(-1.0, 1.0).acos()
}

/// Effective blend tolerance at a junction.
///
/// An exact stop on the leading segment (`None`) forces 0. The trailing
/// segment's own tolerance, if it blends, tightens the result.
pub fn junction_tolerance(
    leading: Option<f64>,
    trailing: Option<f64>,
    leading_length: f64,
    trailing_length: f64,
) -> f64 {
    let Some(tolerance) = leading else {
        return 0.0;
    };
    tolerance
        .min(trailing.unwrap_or(f64::INFINITY))
        .min(MAX_TOLERANCE_SHARE * leading_length.min(trailing_length))
        .max(0.0)
}

/// Maximum speed through the corner between `leading` and `trailing`.
///
/// Returns `f64::INFINITY` for a tangent junction (no corner constraint)
/// and 0 for a reversal or a zero tolerance.
pub fn corner_velocity(leading: &CornerSide, trailing: &CornerSide, tolerance: f64) -> f64 {
    let theta = half_angle(&leading.tangent, &trailing.tangent);
    if theta >= FRAC_PI_2 - TANGENT_ANGLE_TOLERANCE {
        return f64::INFINITY;
    }
    if theta <= REVERSAL_ANGLE_TOLERANCE || !(tolerance > 0.0) {
        return 0.0;
    }
    let (sin, cos) = theta.sin_cos();
    let h = tolerance / (1.0 - sin);
    let d = (cos * h)
        .min(0.5 * leading.length)
        .min(0.5 * trailing.length);
    let radius = theta.tan() * d;
    let a_n = leading
        .normal_acceleration
        .min(trailing.normal_acceleration);
    (a_n * radius).max(0.0).sqrt()
}
