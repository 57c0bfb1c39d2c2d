//! Minimum-time and fixed-duration solves.
//!
//! A profile with zero boundary acceleration is fully described by its
//! peak (cruise) velocity: one velocity change from `v0` to the peak, a
//! cruise, and one change from the peak to `vf`. Each change is either
//! jerk-limited (triangular acceleration) or acceleration-limited
//! (trapezoidal acceleration) depending on its size.
//!
//! The minimum-time solve enumerates the closed set of candidates:
//! cruising at a velocity limit or at a boundary velocity, and every root
//! of `distance(peak) = pf − p0` inside the regime intervals delimited by
//! the breakpoints where a velocity change saturates the acceleration.
//! Candidates are verified by integration and the fastest one wins.

use heapless::Vec;
use motion_common::error::Infeasible;

use super::boundary::{Boundary, ROOT_TOLERANCE};
use super::curve::{JerkSigns, Profile, Shape};
use super::roots::{bisect_last, newton_bracketed};

/// Grid points per regime interval used to bracket roots.
const GRID_SUBDIVISIONS: usize = 8;

/// Distinct regime breakpoints on the peak-velocity axis.
const MAX_BREAKPOINTS: usize = 9;

/// Peak halvings tried when stretching a profile to a longer duration.
const MAX_STRETCH_HALVINGS: usize = 60;

/// Grid points inside each halving interval of the stretch scan.
const STRETCH_SUBDIVISIONS: usize = 4;

/// Duration mismatch a stretched profile may carry, in multiples of the
/// root tolerance.
const STRETCH_SLACK: f64 = 1e3;

/// Relative margin kept below the exact reachable velocity so that the
/// follow-up solve is never marginally infeasible.
const REACH_MARGIN: f64 = 1e-9;

/// Result of a minimum-time solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block {
    pub profile: Profile,
    pub t_min: f64,
}

// ─── Velocity Changes ───────────────────────────────────────────────

/// Time to change velocity by `magnitude` with peak acceleration `accel`.
#[inline]
fn change_time(magnitude: f64, accel: f64, jerk: f64) -> f64 {
    if magnitude * jerk >= accel * accel {
        magnitude / accel + accel / jerk
    } else {
        2.0 * (magnitude / jerk).sqrt()
    }
}

/// Distance covered while changing velocity from `from` to `to`.
///
/// A jerk-limited change is point-symmetric in time, so the mean velocity
/// is the midpoint of the two ends.
#[inline]
pub fn change_distance(from: f64, to: f64, accel: f64, jerk: f64) -> f64 {
    0.5 * (from + to) * change_time((to - from).abs(), accel, jerk)
}

/// One velocity change: jerk ramp, acceleration hold, jerk ramp.
#[derive(Debug, Clone, Copy, Default)]
struct Ramp {
    ramp: f64,
    hold: f64,
    /// Signed jerk of the first ramp.
    jerk: f64,
    accel: f64,
    saturated: bool,
}

impl Ramp {
    fn between(from: f64, to: f64, b: &Boundary) -> Option<Self> {
        let dv = to - from;
        if dv == 0.0 {
            return Some(Self::default());
        }
        let accel = if dv > 0.0 { b.a_max } else { -b.a_min };
        if !(accel > 0.0) {
            return None;
        }
        let magnitude = dv.abs();
        let saturated = magnitude * b.j_max >= accel * accel;
        let (ramp, hold) = if saturated {
            let ramp = accel / b.j_max;
            (ramp, (magnitude / accel - ramp).max(0.0))
        } else {
            ((magnitude / b.j_max).sqrt(), 0.0)
        };
        Some(Self {
            ramp,
            hold,
            jerk: b.j_max.copysign(dv),
            accel,
            saturated,
        })
    }

    #[inline]
    fn duration(&self) -> f64 {
        2.0 * self.ramp + self.hold
    }

    /// d(duration)/d(|Δv|).
    #[inline]
    fn duration_slope(&self, magnitude: f64) -> f64 {
        if self.saturated {
            1.0 / self.accel
        } else if magnitude > 0.0 {
            1.0 / (self.jerk.abs() * magnitude).sqrt()
        } else {
            f64::INFINITY
        }
    }
}

/// Entry change, peak, exit change.
#[derive(Debug, Clone, Copy)]
struct Passage {
    peak: f64,
    up: Ramp,
    down: Ramp,
}

impl Passage {
    fn through(b: &Boundary, peak: f64) -> Option<Self> {
        Some(Self {
            peak,
            up: Ramp::between(b.v0, peak, b)?,
            down: Ramp::between(peak, b.vf, b)?,
        })
    }

    /// Distance without cruise.
    #[inline]
    fn distance(&self, b: &Boundary) -> f64 {
        0.5 * (b.v0 + self.peak) * self.up.duration()
            + 0.5 * (self.peak + b.vf) * self.down.duration()
    }

    #[inline]
    fn duration(&self) -> f64 {
        self.up.duration() + self.down.duration()
    }

    /// d(distance)/d(peak), used by the Newton refinement.
    fn distance_slope(&self, b: &Boundary) -> f64 {
        let m_up = (self.peak - b.v0).abs();
        let m_down = (self.peak - b.vf).abs();
        0.5 * self.up.duration()
            + 0.5 * (b.v0 + self.peak) * self.up.duration_slope(m_up) * (self.peak - b.v0).signum()
            + 0.5 * self.down.duration()
            + 0.5 * (self.peak + b.vf) * self.down.duration_slope(m_down) * (self.peak - b.vf).signum()
    }

    /// Cruise time needed to cover the rest of the distance, if any.
    fn cruise_for(&self, b: &Boundary) -> Option<f64> {
        let rest = b.distance() - self.distance(b);
        if self.peak != 0.0 && rest / self.peak >= 0.0 {
            Some(rest / self.peak)
        } else if rest.abs() <= ROOT_TOLERANCE * b.position_scale() {
            Some(0.0)
        } else {
            None
        }
    }

    fn assemble(&self, b: &Boundary, cruise: f64) -> Profile {
        let (up, down) = (&self.up, &self.down);
        let t = [
            up.ramp, up.hold, up.ramp, cruise, down.ramp, down.hold, down.ramp,
        ];
        let j = [up.jerk, 0.0, -up.jerk, 0.0, down.jerk, 0.0, -down.jerk];
        let signs = if up.jerk * down.jerk > 0.0 {
            JerkSigns::Udud
        } else {
            JerkSigns::Uddu
        };
        let shape = if cruise > 0.0 {
            Shape::VelocityLimited
        } else if up.hold > 0.0 || down.hold > 0.0 {
            Shape::AccelerationLimited
        } else {
            Shape::JerkLimited
        };
        Profile::from_phases(b.p0, b.v0, t, j, shape, signs)
    }
}

// ─── Candidate Selection ────────────────────────────────────────────

struct Candidate {
    profile: Profile,
    duration: f64,
}

fn consider(best: &mut Option<Candidate>, profile: Profile, b: &Boundary) {
    if !profile.satisfies(b) {
        return;
    }
    let duration = profile.duration();
    let replace = match best {
        None => true,
        Some(current) => {
            let tie = 1e-12 * duration.max(1.0);
            duration < current.duration - tie
                || ((duration - current.duration).abs() <= tie
                    && profile.shape() < current.profile.shape())
        }
    };
    if replace {
        *best = Some(Candidate { profile, duration });
    }
}

fn try_peak(b: &Boundary, peak: f64, best: &mut Option<Candidate>) {
    let Some(passage) = Passage::through(b, peak) else {
        return;
    };
    if let Some(cruise) = passage.cruise_for(b) {
        consider(best, passage.assemble(b, cruise), b);
    }
}

/// Peak velocities where a velocity change switches between the
/// jerk-limited and the acceleration-limited regime, plus the limits.
fn breakpoints(b: &Boundary) -> Vec<f64, MAX_BREAKPOINTS> {
    let up = b.a_max * b.a_max / b.j_max;
    let down = b.a_min * b.a_min / b.j_max;
    let raw = [
        b.v_min,
        b.v_max,
        0.0,
        b.v0,
        b.vf,
        b.v0 + up,
        b.v0 - down,
        b.vf + down,
        b.vf - up,
    ];
    let mut points: Vec<f64, MAX_BREAKPOINTS> = Vec::new();
    for v in raw {
        if v >= b.v_min && v <= b.v_max && !points.contains(&v) {
            // Capacity equals the raw count.
            let _ = points.push(v);
        }
    }
    points.sort_unstable_by(f64::total_cmp);
    points
}

/// Find roots of `distance(peak) = D` in `[lo, hi]` on a fixed grid.
fn scan_interval(b: &Boundary, lo: f64, hi: f64, best: &mut Option<Candidate>) {
    let target = b.distance();
    let tol_f = ROOT_TOLERANCE * b.position_scale();
    let tol_x = 1e-15 * b.velocity_scale();
    let residual = |peak: f64| Passage::through(b, peak).map(|p| p.distance(b) - target);

    let mut previous: Option<(f64, f64)> = None;
    for k in 0..=GRID_SUBDIVISIONS {
        let x = lo + (hi - lo) * k as f64 / GRID_SUBDIVISIONS as f64;
        let Some(fx) = residual(x) else {
            previous = None;
            continue;
        };
        if fx.abs() <= tol_f {
            try_peak(b, x, best);
        } else if let Some((px, pfx)) = previous {
            if pfx.abs() > tol_f && (pfx < 0.0) != (fx < 0.0) {
                let root = newton_bracketed(
                    px,
                    x,
                    |peak| match Passage::through(b, peak) {
                        Some(p) => (p.distance(b) - target, p.distance_slope(b)),
                        None => (f64::NAN, f64::NAN),
                    },
                    tol_x,
                    tol_f,
                );
                try_peak(b, root, best);
            }
        }
        previous = Some((x, fx));
    }
}

// ─── Public API ─────────────────────────────────────────────────────

/// Fastest profile satisfying `b`.
///
/// # Errors
///
/// - [`Infeasible::InvalidLimits`], [`Infeasible::BoundaryVelocity`],
///   [`Infeasible::NonFinite`] for malformed boundaries.
/// - [`Infeasible::NoFeasibleShape`] when no candidate lands on the target
///   within the limits (e.g. the stopping distance from `v0` exceeds
///   `pf − p0` and the velocity may not reverse).
pub fn solve_minimum_time(b: &Boundary) -> Result<Block, Infeasible> {
    b.validate()?;

    let mut best = None;
    for peak in [b.v_max, b.v_min, b.v0, b.vf] {
        try_peak(b, peak, &mut best);
    }

    let points = breakpoints(b);
    if points.len() == 1 {
        try_peak(b, points[0], &mut best);
    }
    for window in points.windows(2) {
        scan_interval(b, window[0], window[1], &mut best);
    }

    best.map(|c| Block {
        t_min: c.duration,
        profile: c.profile,
    })
    .ok_or(Infeasible::NoFeasibleShape)
}

/// Profile satisfying `b` that takes exactly `duration` seconds.
///
/// The peak velocity is the free parameter: it is lowered from the
/// time-optimal value until the total time matches, with the cruise phase
/// absorbing the remaining distance so the final position is exact.
///
/// # Errors
///
/// - [`Infeasible::DurationTooShort`] when `duration < t_min`.
/// - [`Infeasible::NoFeasibleShape`] when no slower profile exists (e.g.
///   nonzero boundary velocities that cannot be slowed further).
/// - Any error of [`solve_minimum_time`].
pub fn solve_for_duration(b: &Boundary, duration: f64) -> Result<Profile, Infeasible> {
    if !duration.is_finite() {
        return Err(Infeasible::NonFinite);
    }
    let block = solve_minimum_time(b)?;
    let t_tol = ROOT_TOLERANCE * duration.abs().max(1.0);
    if duration < block.t_min - t_tol {
        return Err(Infeasible::DurationTooShort {
            requested: duration,
            minimum: block.t_min,
        });
    }
    if duration <= block.t_min + t_tol {
        return Ok(block.profile);
    }

    let time_at = |peak: f64| -> Option<f64> {
        let passage = Passage::through(b, peak)?;
        passage.cruise_for(b).map(|cruise| passage.duration() + cruise)
    };

    // time_at is not continuous in the peak: some peaks admit no passage
    // at all. Walk down from the fastest peak on a geometric grid and
    // bisect every crossing of the requested duration.
    let top = block.profile.peak_velocity();
    if top != 0.0 {
        let mut previous = Some((top, block.t_min - duration));
        let mut upper = top;
        for _ in 0..MAX_STRETCH_HALVINGS {
            let lower = 0.5 * upper;
            for step in 1..=STRETCH_SUBDIVISIONS {
                let peak = upper - (upper - lower) * step as f64 / STRETCH_SUBDIVISIONS as f64;
                let Some(t) = time_at(peak) else {
                    previous = None;
                    continue;
                };
                let excess = t - duration;
                if let Some((from, from_excess)) = previous {
                    if (from_excess < 0.0) != (excess < 0.0) {
                        let short = from_excess < 0.0;
                        let found = bisect_last(from, peak, |x| {
                            time_at(x).is_some_and(|t| (t < duration) == short)
                        });
                        if let Some(profile) = stretched(b, found, duration, t_tol) {
                            return Ok(profile);
                        }
                    }
                }
                previous = Some((peak, excess));
            }
            upper = lower;
        }
    }

    // The peak cannot absorb the extra time: wait at zero velocity.
    if let Some(passage) = Passage::through(b, 0.0) {
        let rest = b.distance() - passage.distance(b);
        if rest.abs() <= ROOT_TOLERANCE * b.position_scale() && passage.duration() <= duration {
            let profile = passage.assemble(b, duration - passage.duration());
            if profile.satisfies(b) {
                return Ok(profile);
            }
        }
    }
    Err(Infeasible::NoFeasibleShape)
}

fn stretched(b: &Boundary, peak: f64, duration: f64, t_tol: f64) -> Option<Profile> {
    let passage = Passage::through(b, peak)?;
    let cruise = passage.cruise_for(b)?;
    let profile = passage.assemble(b, cruise);
    (profile.satisfies(b) && (profile.duration() - duration).abs() <= STRETCH_SLACK * t_tol)
        .then_some(profile)
}

/// Highest velocity that can be reached from `v_from` (or, by symmetry,
/// from which `v_from` can be reached) with a single velocity change over
/// at most `distance`.
pub fn max_reachable_velocity(distance: f64, v_from: f64, accel: f64, jerk: f64) -> f64 {
    if !(distance > 0.0 && accel > 0.0 && jerk > 0.0) {
        return v_from;
    }
    let reach = (2.0 * accel * distance)
        .sqrt()
        .max((distance * distance * jerk).cbrt());
    let v = bisect_last(v_from, v_from + reach, |v| {
        change_distance(v_from, v, accel, jerk) <= distance
    });
    v_from + (v - v_from) * (1.0 - REACH_MARGIN)
}

/// Lowest non-negative velocity that decelerating from `v_from` can reach
/// within `distance`.
pub fn min_reachable_velocity(distance: f64, v_from: f64, accel: f64, jerk: f64) -> f64 {
    if v_from <= 0.0 {
        return 0.0;
    }
    if !(distance > 0.0 && accel > 0.0 && jerk > 0.0) {
        return v_from;
    }
    if change_distance(v_from, 0.0, accel, jerk) <= distance {
        return 0.0;
    }
    let v = bisect_last(v_from, 0.0, |v| {
        change_distance(v_from, v, accel, jerk) <= distance
    });
    v + (v_from - v) * REACH_MARGIN
}
