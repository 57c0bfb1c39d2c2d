//! Time scaling for feed override, pause and starvation holds.
//!
//! The executor advances parametric time by `s · dt`, so a profile state
//! `(v, a)` reaches the output as velocity `V = v·s` and acceleration
//! `A = a·s² + v·ṡ`. Changing the scale adds the `v·ṡ` term, which a
//! fixed-rate ramp leaves unbounded. [`TimeScale::step`] picks every tick's
//! scale from the output it would produce instead, so that lowering the
//! scale never pushes the output acceleration or jerk past the limits.
//!
//! The scale only falls here. Raising it while the path moves would have
//! to speed up along a profile that was never planned for it, so the
//! executor re-plans the rest of the segment from the current output
//! velocity and then [`rebase`](TimeScale::rebase)s.

use crate::profile::solver::change_distance;

/// Profile velocity treated as standing still; the scale may jump there.
pub const AT_REST: f64 = 1e-9;

/// Relative rounding allowance when checking whether the output may
/// follow the profile unchanged.
const STEP_SLACK: f64 = 1e-9;

/// Safety factor on the estimated stopping distance of [`TimeScale::step`].
const STOP_MARGIN: f64 = 1.5;

/// Ticks of travel added to the stopping distance for sampling delay.
const STOP_DELAY_TICKS: f64 = 3.0;

/// Output limits for one segment, in path units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputLimits {
    pub acceleration: f64,
    pub jerk: f64,
    /// Highest rate the scale itself may fall at [1/s]; 0 for none.
    pub slew: f64,
}

impl OutputLimits {
    /// The tighter of two limit sets.
    #[inline]
    pub fn min(&self, other: &Self) -> Self {
        Self {
            acceleration: self.acceleration.min(other.acceleration),
            jerk: self.jerk.min(other.jerk),
            slew: self.slew,
        }
    }
}

/// Current time scale plus the output velocity and acceleration it
/// produced on the last tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeScale {
    scale: f64,
    velocity: f64,
    acceleration: f64,
}

impl TimeScale {
    pub const fn new() -> Self {
        Self {
            scale: 1.0,
            velocity: 0.0,
            acceleration: 0.0,
        }
    }

    #[inline]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Output path velocity of the last tick.
    #[inline]
    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    /// Output path acceleration of the last tick.
    #[inline]
    pub fn acceleration(&self) -> f64 {
        self.acceleration
    }

    /// Scale for the next tick on a profile at velocity `v` and
    /// acceleration `a`, moving toward `target` but never above the
    /// current scale.
    ///
    /// The output follows the profile exactly when the step to `target`
    /// fits the limits. Otherwise the output acceleration heads for the
    /// profile's own at half the jerk limit, clipped to the acceleration
    /// limit and to what the jerk allows from last tick's acceleration.
    pub fn step(&mut self, target: f64, v: f64, a: f64, limits: &OutputLimits, dt: f64) -> f64 {
        let s = self.scale;
        let goal = target.max(0.0).min(s);
        let next = if v <= AT_REST {
            goal
        } else {
            let jerk_step = limits.jerk * dt;
            let lo = (-limits.acceleration).max(self.acceleration - jerk_step);
            let hi = limits.acceleration.min(self.acceleration + jerk_step);
            let along = a * s * goal;
            let gap = v * goal - self.velocity;
            let direct = gap / dt;
            let slack = STEP_SLACK * (limits.acceleration + jerk_step);
            if direct >= lo - slack
                && direct <= hi + slack
                && (direct - along).abs() <= jerk_step + slack
            {
                goal
            } else {
                let jerk = 0.5 * limits.jerk;
                let rest = gap - along * dt;
                let approach = jerk * ((dt * dt + 2.0 * rest.abs() / jerk).sqrt() - dt);
                let mut accel = along + approach.copysign(rest);
                if limits.slew > 0.0 {
                    let natural = a * s * s;
                    accel = accel
                        .max(natural - limits.slew * v)
                        .min(natural + limits.slew * v);
                }
                // The acceleration limit wins over the jerk limit.
                let accel = accel.max(lo).min(hi);
                ((self.velocity + accel * dt) / v).max(0.0).min(s)
            }
        };
        self.record(next, v * next, dt);
        next
    }

    /// Record a tick whose scale is fixed by the segment kind (taps,
    /// dwells) or that holds position.
    #[inline]
    pub fn follow(&mut self, scale: f64, velocity: f64, dt: f64) {
        self.record(scale, velocity, dt);
    }

    /// Switch to `scale` without touching the output. Only valid at rest or
    /// right after the segment was re-planned for the current output.
    #[inline]
    pub fn rebase(&mut self, scale: f64) {
        self.scale = scale.max(0.0);
    }

    /// Forget the output history (abort, fault). The scale is kept.
    #[inline]
    pub fn reset(&mut self) {
        self.velocity = 0.0;
        self.acceleration = 0.0;
    }

    fn record(&mut self, scale: f64, velocity: f64, dt: f64) {
        self.acceleration = (velocity - self.velocity) / dt;
        self.velocity = velocity;
        self.scale = scale;
    }
}

impl Default for TimeScale {
    fn default() -> Self {
        Self::new()
    }
}

/// Path length [`TimeScale::step`] needs at most to bring an output moving
/// at `velocity` with `acceleration` to rest under `limits`.
pub fn stopping_distance(velocity: f64, acceleration: f64, limits: &OutputLimits, dt: f64) -> f64 {
    if !(velocity > 0.0) {
        return 0.0;
    }
    let accel = limits.acceleration;
    let jerk = 0.5 * limits.jerk;
    if !(accel > 0.0 && jerk > 0.0) {
        return f64::INFINITY;
    }
    let brake = if acceleration > 0.0 {
        // Still speeding up: ramp the acceleration down first.
        let t = acceleration / jerk;
        let rising = velocity * t + 0.5 * acceleration * t * t - jerk * t * t * t / 6.0;
        let peak = velocity + 0.5 * acceleration * acceleration / jerk;
        rising + change_distance(peak, 0.0, accel, jerk)
    } else {
        change_distance(velocity, 0.0, accel, jerk)
    };
    STOP_MARGIN * brake + STOP_DELAY_TICKS * velocity * dt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{Boundary, Profile, solve_minimum_time};

    const DT: f64 = 1e-3;

    const LIMITS: OutputLimits = OutputLimits {
        acceleration: 200.0,
        jerk: 2000.0,
        slew: 0.0,
    };

    fn line_profile() -> Profile {
        solve_minimum_time(&Boundary::rest_to_rest(0.0, 100.0, 50.0, 200.0, 2000.0))
            .unwrap()
            .profile
    }

    /// Run `profile` at full scale, drop the target to zero at `stop_tick`
    /// and return the output velocities plus the distance covered after it.
    fn stop_at(profile: &Profile, stop_tick: usize, limits: &OutputLimits) -> (Vec<f64>, f64) {
        let mut scale = TimeScale::new();
        let mut tau = 0.0;
        let mut velocities = vec![0.0];
        let mut stopped_at = 0.0;
        for tick in 0..20_000 {
            if tau >= profile.duration() {
                break;
            }
            let state = profile.state_at(tau);
            if tick == stop_tick {
                stopped_at = state.position;
            }
            let target = if tick >= stop_tick { 0.0 } else { 1.0 };
            let s = scale.step(target, state.velocity, state.acceleration, limits, DT);
            velocities.push(scale.velocity());
            tau += s * DT;
            if tick > stop_tick && s == 0.0 {
                break;
            }
        }
        let travelled = profile.state_at(tau).position - stopped_at;
        (velocities, travelled)
    }

    fn worst_accel_and_jerk(velocities: &[f64]) -> (f64, f64) {
        let accel: Vec<f64> = velocities.windows(2).map(|w| (w[1] - w[0]) / DT).collect();
        let worst_accel = accel.iter().fold(0.0_f64, |m, a| m.max(a.abs()));
        let worst_jerk = accel
            .windows(2)
            .fold(0.0_f64, |m, w| m.max(((w[1] - w[0]) / DT).abs()));
        (worst_accel, worst_jerk)
    }

    #[test]
    fn full_scale_follows_the_profile() {
        let profile = line_profile();
        let mut scale = TimeScale::new();
        let mut tau = 0.0;
        while tau < profile.duration() {
            let state = profile.state_at(tau);
            assert_eq!(scale.step(1.0, state.velocity, state.acceleration, &LIMITS, DT), 1.0);
            assert_eq!(scale.velocity(), state.velocity);
            tau += DT;
        }
    }

    #[test]
    fn stopping_keeps_output_within_limits() {
        let profile = line_profile();
        for stop_tick in [50, 120, 300, 1000, 2000, 2060, 2200] {
            let (velocities, _) = stop_at(&profile, stop_tick, &LIMITS);
            let (accel, jerk) = worst_accel_and_jerk(&velocities);
            assert!(accel <= 200.0 * (1.0 + 1e-9), "stop at {stop_tick}: accel {accel}");
            assert!(jerk <= 2000.0 * (1.0 + 1e-6), "stop at {stop_tick}: jerk {jerk}");
            assert!(velocities.iter().all(|v| *v >= 0.0));
        }
    }

    #[test]
    fn slew_limit_only_slows_the_stop() {
        let profile = line_profile();
        let slewed = OutputLimits { slew: 1.0, ..LIMITS };
        let (fast, _) = stop_at(&profile, 1000, &LIMITS);
        let (slow, _) = stop_at(&profile, 1000, &slewed);
        assert!(slow.len() > fast.len());
        let (accel, _) = worst_accel_and_jerk(&slow);
        assert!(accel <= 200.0 * (1.0 + 1e-9));
    }

    #[test]
    fn stopping_distance_bounds_the_stop() {
        let profile = line_profile();
        for stop_tick in (10..2300).step_by(41) {
            let mut lead = TimeScale::new();
            let mut tau = 0.0;
            for _ in 0..stop_tick {
                let state = profile.state_at(tau);
                tau += lead.step(1.0, state.velocity, state.acceleration, &LIMITS, DT) * DT;
            }
            let bound = stopping_distance(lead.velocity(), lead.acceleration(), &LIMITS, DT);
            let (_, travelled) = stop_at(&profile, stop_tick, &LIMITS);
            assert!(travelled <= bound, "stop at {stop_tick}: {travelled} > {bound}");
        }
    }

    #[test]
    fn scale_jumps_at_rest() {
        let mut scale = TimeScale::new();
        assert_eq!(scale.step(0.0, 0.0, 0.0, &LIMITS, DT), 0.0);
        // step never raises the scale by itself.
        assert_eq!(scale.step(1.0, 0.0, 0.0, &LIMITS, DT), 0.0);
        scale.rebase(0.8);
        assert_eq!(scale.step(1.0, 0.0, 0.0, &LIMITS, DT), 0.8);
    }

    #[test]
    fn follow_tracks_output_acceleration() {
        let mut scale = TimeScale::new();
        scale.follow(1.0, 0.1, DT);
        assert!((scale.acceleration() - 100.0).abs() < 1e-9);
        scale.reset();
        assert_eq!(scale.velocity(), 0.0);
        assert_eq!(scale.acceleration(), 0.0);
        assert_eq!(scale.scale(), 1.0);
    }

    #[test]
    fn stopping_distance_is_zero_at_rest() {
        assert_eq!(stopping_distance(0.0, 0.0, &LIMITS, DT), 0.0);
        let cruise = stopping_distance(50.0, 0.0, &LIMITS, DT);
        assert!(cruise > change_distance(50.0, 0.0, 200.0, 2000.0));
        assert!(stopping_distance(50.0, 100.0, &LIMITS, DT) > cruise);
    }
}
