//! Seven-phase piecewise-constant-jerk profile and its evaluation.

use super::boundary::{Boundary, VERIFY_TOLERANCE};

/// Number of constant-jerk phases.
pub const PHASES: usize = 7;

/// Canonical jerk sign pattern of a profile.
///
/// `Uddu`: the entry and exit velocity changes have opposite sense (a
/// peak above or a valley below both boundary velocities). `Udud`: the
/// velocity changes monotonically through both pulses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum JerkSigns {
    #[default]
    Uddu = 0,
    Udud = 1,
}

/// Which limits a profile reaches.
///
/// Ordered by the number of limits reached, fewest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum Shape {
    /// Neither acceleration nor velocity limit reached.
    #[default]
    JerkLimited = 0,
    /// An acceleration limit is held for a while.
    AccelerationLimited = 1,
    /// The profile cruises at constant velocity.
    VelocityLimited = 2,
}

/// Instantaneous kinematic state on a profile.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct KinematicState {
    pub position: f64,
    pub velocity: f64,
    pub acceleration: f64,
    pub jerk: f64,
}

/// Seven phase durations with constant jerk each.
///
/// Phases 0..=2 change the velocity from `v0` to the peak, phase 3 cruises,
/// phases 4..=6 change it to `vf`. The state at every phase boundary is
/// integrated once at construction so evaluation is a lookup plus one
/// cubic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Profile {
    t: [f64; PHASES],
    j: [f64; PHASES],
    /// Cumulative end time of each phase.
    t_end: [f64; PHASES],
    p: [f64; PHASES + 1],
    v: [f64; PHASES + 1],
    a: [f64; PHASES + 1],
    shape: Shape,
    signs: JerkSigns,
}

impl Profile {
    /// Integrate phases starting at rest acceleration.
    pub fn from_phases(
        p0: f64,
        v0: f64,
        t: [f64; PHASES],
        j: [f64; PHASES],
        shape: Shape,
        signs: JerkSigns,
    ) -> Self {
        let mut profile = Self {
            t,
            j,
            t_end: [0.0; PHASES],
            p: [0.0; PHASES + 1],
            v: [0.0; PHASES + 1],
            a: [0.0; PHASES + 1],
            shape,
            signs,
        };
        profile.p[0] = p0;
        profile.v[0] = v0;
        let mut elapsed = 0.0;
        for i in 0..PHASES {
            let dt = t[i];
            let (p, v, a) = integrate(profile.p[i], profile.v[i], profile.a[i], j[i], dt);
            profile.p[i + 1] = p;
            profile.v[i + 1] = v;
            profile.a[i + 1] = a;
            elapsed += dt;
            profile.t_end[i] = elapsed;
        }
        profile
    }

    /// Stand still at `position` for `duration` seconds.
    pub fn hold(position: f64, duration: f64) -> Self {
        let mut t = [0.0; PHASES];
        t[3] = duration.max(0.0);
        Self::from_phases(
            position,
            0.0,
            t,
            [0.0; PHASES],
            Shape::JerkLimited,
            JerkSigns::Uddu,
        )
    }

    /// Total duration `T`.
    #[inline]
    pub fn duration(&self) -> f64 {
        self.t_end[PHASES - 1]
    }

    #[inline]
    pub fn phase_durations(&self) -> &[f64; PHASES] {
        &self.t
    }

    #[inline]
    pub fn phase_jerks(&self) -> &[f64; PHASES] {
        &self.j
    }

    #[inline]
    pub fn shape(&self) -> Shape {
        self.shape
    }

    #[inline]
    pub fn signs(&self) -> JerkSigns {
        self.signs
    }

    /// Velocity during the cruise phase.
    #[inline]
    pub fn peak_velocity(&self) -> f64 {
        self.v[3]
    }

    #[inline]
    pub fn start(&self) -> KinematicState {
        KinematicState {
            position: self.p[0],
            velocity: self.v[0],
            acceleration: self.a[0],
            jerk: self.j[0],
        }
    }

    #[inline]
    pub fn end(&self) -> KinematicState {
        KinematicState {
            position: self.p[PHASES],
            velocity: self.v[PHASES],
            acceleration: self.a[PHASES],
            jerk: 0.0,
        }
    }

    /// State at time `tau`, clamped to `[0, T]`. Closed form, bounded time.
    pub fn state_at(&self, tau: f64) -> KinematicState {
        if !(tau > 0.0) {
            return self.start();
        }
        if tau >= self.duration() {
            return self.end();
        }
        let mut phase = PHASES - 1;
        for i in 0..PHASES {
            if tau < self.t_end[i] {
                phase = i;
                break;
            }
        }
        let phase_start = if phase == 0 { 0.0 } else { self.t_end[phase - 1] };
        let dt = tau - phase_start;
        let (position, velocity, acceleration) =
            integrate(self.p[phase], self.v[phase], self.a[phase], self.j[phase], dt);
        KinematicState {
            position,
            velocity,
            acceleration,
            jerk: self.j[phase],
        }
    }

    /// Smallest and largest velocity reached anywhere on the profile.
    pub fn velocity_range(&self) -> (f64, f64) {
        let mut lo = self.v[0];
        let mut hi = self.v[0];
        for i in 0..PHASES {
            lo = lo.min(self.v[i + 1]);
            hi = hi.max(self.v[i + 1]);
            // Interior extremum where the acceleration crosses zero.
            if self.j[i] != 0.0 {
                let t_star = -self.a[i] / self.j[i];
                if t_star > 0.0 && t_star < self.t[i] {
                    let (_, v, _) = integrate(self.p[i], self.v[i], self.a[i], self.j[i], t_star);
                    lo = lo.min(v);
                    hi = hi.max(v);
                }
            }
        }
        (lo, hi)
    }

    /// Smallest and largest acceleration (extremes sit on phase edges).
    pub fn acceleration_range(&self) -> (f64, f64) {
        self.a
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &a| {
                (lo.min(a), hi.max(a))
            })
    }

    /// Whether the profile lands on the boundary and stays within its limits.
    pub fn satisfies(&self, b: &Boundary) -> bool {
        if self.t.iter().any(|&t| !(t >= 0.0) || !t.is_finite()) {
            return false;
        }
        let p_tol = VERIFY_TOLERANCE * b.position_scale();
        let v_tol = VERIFY_TOLERANCE * b.velocity_scale();
        let a_tol = VERIFY_TOLERANCE * b.acceleration_scale();

        let end = self.end();
        if (end.position - b.pf).abs() > p_tol
            || (end.velocity - b.vf).abs() > v_tol
            || end.acceleration.abs() > a_tol
            || (self.p[0] - b.p0).abs() > p_tol
            || (self.v[0] - b.v0).abs() > v_tol
        {
            return false;
        }
        let (v_lo, v_hi) = self.velocity_range();
        let (a_lo, a_hi) = self.acceleration_range();
        v_lo >= b.v_min - v_tol
            && v_hi <= b.v_max + v_tol
            && a_lo >= b.a_min - a_tol
            && a_hi <= b.a_max + a_tol
    }
}

/// One constant-jerk step.
#[inline]
fn integrate(p: f64, v: f64, a: f64, j: f64, dt: f64) -> (f64, f64, f64) {
    let dt2 = dt * dt;
    (
        p + v * dt + 0.5 * a * dt2 + j * dt2 * dt / 6.0,
        v + a * dt + 0.5 * j * dt2,
        a + j * dt,
    )
}
