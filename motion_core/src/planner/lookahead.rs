//! Lookahead velocity planning over the unpublished window.
//!
//! Junction velocities `v[0..=n]` of an `n`-segment window are bounded by
//! the corner limits, then a backward pass keeps every junction stoppable
//! before the window end and a forward pass keeps it reachable from the
//! fixed entry velocity. Changed segments are re-solved; the result is
//! committed only when every solve succeeds.

use heapless::Vec;
use motion_common::consts::MAX_LOOKAHEAD;
use motion_common::error::Infeasible;

use crate::planner::geometry::SegmentKind;
use crate::profile::{
    max_reachable_velocity, min_reachable_velocity, solve_minimum_time, Boundary, Profile,
};
use crate::queue::segment::{Segment, Termination};

/// Window capacity: the configured depth plus the segment being added.
pub const WINDOW_SLOTS: usize = MAX_LOOKAHEAD + 1;

/// Velocity cap of `segment` under the planning feed scale.
///
/// Rigid-tap moves keep their programmed feed, dwells do not move.
#[inline]
pub fn velocity_cap(segment: &Segment, feed_cap: f64) -> f64 {
    match segment.kind() {
        SegmentKind::Line | SegmentKind::Arc => segment.limits().velocity * feed_cap,
        SegmentKind::RigidTap => segment.limits().velocity,
        SegmentKind::Dwell => 0.0,
    }
}

/// Corner limit at the junction between `leading` and `trailing`.
#[inline]
fn junction_limit(leading: &Segment, trailing: &Segment, feed_cap: f64) -> f64 {
    if leading.termination() == Termination::ExactStop {
        return 0.0;
    }
    trailing
        .blend_in()
        .min(velocity_cap(leading, feed_cap))
        .min(velocity_cap(trailing, feed_cap))
}

/// Re-plan `window` starting at the fixed velocity `v_entry`.
///
/// The last junction is always 0 so the window stays stoppable if no more
/// segments arrive. On error the window is left untouched.
///
/// # Errors
///
/// [`Infeasible::NoFeasibleShape`] when the window cannot stop in time from
/// `v_entry`, or any solver error of a segment.
pub fn replan(window: &mut [Segment], v_entry: f64, feed_cap: f64) -> Result<usize, Infeasible> {
    let n = window.len();
    if n == 0 {
        return Ok(0);
    }
    if n > WINDOW_SLOTS {
        return Err(Infeasible::InvalidLimits("lookahead window too deep"));
    }

    let mut v: Vec<f64, { WINDOW_SLOTS + 1 }> = Vec::new();
    let _ = v.push(v_entry.max(0.0));
    for k in 1..n {
        let _ = v.push(junction_limit(&window[k - 1], &window[k], feed_cap));
    }
    let _ = v.push(0.0);

    // Backward: stoppable. The entry velocity is fixed.
    for k in (1..n).rev() {
        let seg = &window[k];
        let limits = seg.limits();
        v[k] = v[k].min(max_reachable_velocity(
            seg.geometry().length(),
            v[k + 1],
            limits.acceleration,
            limits.jerk,
        ));
    }

    // Forward: reachable, and never lower than braking allows.
    for k in 0..n {
        let seg = &window[k];
        let limits = seg.limits();
        let length = seg.geometry().length();
        let reach = max_reachable_velocity(length, v[k], limits.acceleration, limits.jerk);
        let brake = min_reachable_velocity(length, v[k], limits.acceleration, limits.jerk);
        v[k + 1] = v[k + 1].min(reach).max(brake);
    }
    if v[n] > 0.0 {
        return Err(Infeasible::NoFeasibleShape);
    }

    let mut solved: Vec<(usize, Boundary, Profile), WINDOW_SLOTS> = Vec::new();
    for (k, seg) in window.iter().enumerate() {
        if seg.kind() == SegmentKind::Dwell {
            continue;
        }
        let limits = seg.limits();
        let cap = velocity_cap(seg, feed_cap).max(v[k]).max(v[k + 1]);
        let boundary = Boundary::path(
            seg.geometry().length(),
            v[k],
            v[k + 1],
            cap,
            limits.acceleration,
            limits.jerk,
        );
        if seg.boundary() == Some(&boundary) {
            continue;
        }
        let block = solve_minimum_time(&boundary)?;
        let _ = solved.push((k, boundary, block.profile));
    }

    let changed = solved.len();
    for (k, boundary, profile) in solved {
        window[k].set_plan(boundary, profile);
    }
    for seg in window.iter_mut() {
        seg.set_feed_cap(feed_cap);
    }
    Ok(changed)
}
