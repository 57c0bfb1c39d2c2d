//! Queued unit of motion and its lifecycle.
//!
//! Lifecycle: Pending → Active → (Blending) → Done, with Cancelled
//! reachable from every non-terminal state.

use heapless::Vec;
use motion_common::consts::MAX_SYNC_OUTPUTS;
use motion_common::error::Infeasible;
use motion_common::geometry::Cartesian;
use motion_common::setpoint::SyncOutput;

use crate::planner::geometry::{Geometry, SegmentKind};
use crate::planner::limits::PathLimits;
use crate::planner::lookahead::velocity_cap;
use crate::profile::boundary::ROOT_TOLERANCE;
use crate::profile::{
    max_reachable_velocity, min_reachable_velocity, solve_minimum_time, Boundary, KinematicState,
    Profile,
};

/// Monotonic segment identifier, starting at 1. 0 means "none".
pub type SegmentId = u64;

/// Execution state of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum SegmentState {
    /// Queued, not yet started.
    #[default]
    Pending = 0,
    /// Being executed.
    Active = 1,
    /// Active, with the successor staged for a non-stop hand-off.
    Blending = 2,
    Done = 3,
    Cancelled = 4,
}

impl SegmentState {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Pending),
            1 => Some(Self::Active),
            2 => Some(Self::Blending),
            3 => Some(Self::Done),
            4 => Some(Self::Cancelled),
            _ => None,
        }
    }

    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }
}

/// Events that drive the segment lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentEvent {
    /// The executor starts the segment.
    Activate,
    /// The successor is staged and the segment ends at speed.
    OpenBlend,
    /// Parametric time reached the profile duration.
    Complete,
    /// Abort or fault.
    Cancel,
}

/// Result of a lifecycle transition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentTransition {
    Ok(SegmentState),
    Rejected(&'static str),
}

/// How a segment ends.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Termination {
    /// Come to rest at the end point.
    #[default]
    ExactStop,
    /// May pass the end point at speed, deviating at most `tolerance`.
    Blend { tolerance: f64 },
}

impl Termination {
    /// Blend when a positive tolerance is programmed, otherwise stop.
    pub fn from_tolerance(tolerance: Option<f64>) -> Self {
        match tolerance {
            Some(tolerance) if tolerance > 0.0 && tolerance.is_finite() => {
                Self::Blend { tolerance }
            }
            _ => Self::ExactStop,
        }
    }

    #[inline]
    pub fn tolerance(&self) -> Option<f64> {
        match self {
            Self::ExactStop => None,
            Self::Blend { tolerance } => Some(*tolerance),
        }
    }
}

/// Kinematic state on a segment mapped into world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentSample {
    /// Path-parameter state (position is arc length).
    pub path: KinematicState,
    pub pose: Cartesian,
}

/// A queued segment: geometry, limits, plan and execution progress.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    id: SegmentId,
    geometry: Geometry,
    limits: PathLimits,
    termination: Termination,
    /// Highest velocity allowed at the junction with the predecessor.
    blend_in: f64,
    outputs: Vec<SyncOutput, MAX_SYNC_OUTPUTS>,
    boundary: Option<Boundary>,
    profile: Profile,
    /// Planning feed scale the profile was solved under.
    feed_cap: f64,
    state: SegmentState,
    /// Parametric time τ into the profile [s].
    elapsed: f64,
    epoch: u32,
}

impl Segment {
    /// New pending segment. Motion segments carry a zero-duration
    /// placeholder profile until the lookahead solves them.
    pub fn new(
        id: SegmentId,
        geometry: Geometry,
        limits: PathLimits,
        termination: Termination,
        blend_in: f64,
    ) -> Self {
        let profile = match geometry {
            Geometry::Dwell { seconds, .. } => Profile::hold(0.0, seconds),
            _ => Profile::hold(0.0, 0.0),
        };
        let termination = if geometry.kind().is_blendable() {
            termination
        } else {
            Termination::ExactStop
        };
        Self {
            id,
            geometry,
            limits,
            termination,
            blend_in: blend_in.max(0.0),
            outputs: Vec::new(),
            boundary: None,
            profile,
            feed_cap: 1.0,
            state: SegmentState::Pending,
            elapsed: 0.0,
            epoch: 0,
        }
    }

    #[inline]
    pub fn id(&self) -> SegmentId {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> SegmentKind {
        self.geometry.kind()
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[inline]
    pub fn limits(&self) -> &PathLimits {
        &self.limits
    }

    #[inline]
    pub fn termination(&self) -> Termination {
        self.termination
    }

    #[inline]
    pub fn blend_in(&self) -> f64 {
        self.blend_in
    }

    #[inline]
    pub fn outputs(&self) -> &[SyncOutput] {
        &self.outputs
    }

    /// Boundary the profile was solved for; `None` for dwells and for
    /// segments the lookahead has not solved yet.
    #[inline]
    pub fn boundary(&self) -> Option<&Boundary> {
        self.boundary.as_ref()
    }

    #[inline]
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    #[inline]
    pub fn feed_cap(&self) -> f64 {
        self.feed_cap
    }

    #[inline]
    pub fn state(&self) -> SegmentState {
        self.state
    }

    #[inline]
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    #[inline]
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    #[inline]
    pub fn duration(&self) -> f64 {
        self.profile.duration()
    }

    #[inline]
    pub fn start_velocity(&self) -> f64 {
        self.profile.start().velocity
    }

    #[inline]
    pub fn end_velocity(&self) -> f64 {
        self.profile.end().velocity
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.elapsed >= self.profile.duration()
    }

    /// Time past the profile end, carried into the successor.
    #[inline]
    pub fn overshoot(&self) -> f64 {
        (self.elapsed - self.profile.duration()).max(0.0)
    }

    /// Sample at the current parametric time.
    #[inline]
    pub fn evaluate(&self) -> SegmentSample {
        self.sample_at(self.elapsed)
    }

    /// Sample at parametric time `tau` (clamped to the profile).
    pub fn sample_at(&self, tau: f64) -> SegmentSample {
        let path = self.profile.state_at(tau);
        SegmentSample {
            path,
            pose: self.geometry.point_at(path.position),
        }
    }

    /// Handle a lifecycle event.
    pub fn handle_event(&mut self, event: SegmentEvent) -> SegmentTransition {
        use SegmentEvent as E;
        use SegmentState as S;

        let next = match (self.state, event) {
            (S::Pending, E::Activate) => S::Active,
            (S::Active, E::OpenBlend) => S::Blending,
            (S::Active | S::Blending, E::Complete) => S::Done,
            (S::Pending | S::Active | S::Blending, E::Cancel) => S::Cancelled,
            _ => return SegmentTransition::Rejected("invalid segment transition"),
        };
        self.state = next;
        SegmentTransition::Ok(next)
    }

    // ─── Producer-side mutation ─────────────────────────────────────

    /// Attach a synchronised output fired when the segment starts.
    pub(crate) fn attach(&mut self, output: SyncOutput) -> Result<(), Infeasible> {
        self.outputs
            .push(output)
            .map_err(|_| Infeasible::TooManyOutputs)
    }

    pub(crate) fn set_plan(&mut self, boundary: Boundary, profile: Profile) {
        self.boundary = Some(boundary);
        self.profile = profile;
    }

    #[inline]
    pub(crate) fn set_feed_cap(&mut self, feed_cap: f64) {
        self.feed_cap = feed_cap;
    }

    pub(crate) fn stamp(&mut self, epoch: u32) {
        self.epoch = epoch;
    }

    // ─── Consumer-side mutation ─────────────────────────────────────

    /// Advance parametric time by `dt`.
    #[inline]
    pub(crate) fn advance(&mut self, dt: f64) {
        self.elapsed += dt;
    }

    /// Start at parametric time `tau` (overshoot of the predecessor).
    #[inline]
    pub(crate) fn seek(&mut self, tau: f64) {
        self.elapsed = tau.max(0.0);
    }

    /// Re-plan the rest of the segment from the current position, entering
    /// at `v0` under the planning scale `feed_cap`. Parametric time
    /// restarts at 0.
    ///
    /// The exit velocity is never raised above the planned one, so the
    /// successor can always be entered. A rest shorter than the solver can
    /// resolve finishes the segment instead.
    ///
    /// # Errors
    ///
    /// [`Infeasible::NoFeasibleShape`] for dwells and when the exit cannot
    /// be reached from `v0`; any solver error. The plan is unchanged then.
    pub(crate) fn replan_rest(&mut self, v0: f64, feed_cap: f64) -> Result<(), Infeasible> {
        let Some(planned) = self.boundary else {
            return Err(Infeasible::NoFeasibleShape);
        };
        let here = self.profile.state_at(self.elapsed).position;
        let rest = planned.pf - here;
        if rest <= ROOT_TOLERANCE * planned.position_scale() {
            self.elapsed = self.elapsed.max(self.profile.duration());
            return Ok(());
        }
        let v0 = v0.max(0.0);
        let (accel, jerk) = (planned.a_max, planned.j_max);
        let cap = velocity_cap(self, feed_cap);
        let vf = planned
            .vf
            .min(cap)
            .min(max_reachable_velocity(rest, v0, accel, jerk));
        if min_reachable_velocity(rest, v0, accel, jerk) > vf {
            return Err(Infeasible::NoFeasibleShape);
        }
        let boundary = Boundary {
            p0: here,
            v0,
            vf,
            v_max: cap.max(v0).max(vf),
            ..planned
        };
        let block = solve_minimum_time(&boundary)?;
        self.boundary = Some(boundary);
        self.profile = block.profile;
        self.feed_cap = feed_cap;
        self.elapsed = 0.0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::geometry::Line;
    use crate::profile::solve_minimum_time;

    fn limits() -> PathLimits {
        PathLimits {
            velocity: 50.0,
            acceleration: 200.0,
            jerk: 2000.0,
            normal_acceleration: 170.0,
        }
    }

    fn line_segment() -> Segment {
        let line = Line::new(Cartesian::ZERO, Cartesian::new(100.0, 0.0, 0.0)).unwrap();
        Segment::new(
            1,
            Geometry::Line(line),
            limits(),
            Termination::ExactStop,
            0.0,
        )
    }

    #[test]
    fn lifecycle_happy_path() {
        let mut s = line_segment();
        assert_eq!(s.state(), SegmentState::Pending);
        assert_eq!(
            s.handle_event(SegmentEvent::Activate),
            SegmentTransition::Ok(SegmentState::Active)
        );
        assert_eq!(
            s.handle_event(SegmentEvent::OpenBlend),
            SegmentTransition::Ok(SegmentState::Blending)
        );
        assert_eq!(
            s.handle_event(SegmentEvent::Complete),
            SegmentTransition::Ok(SegmentState::Done)
        );
        assert!(s.state().is_terminal());
    }

    #[test]
    fn terminal_states_reject_events() {
        let mut s = line_segment();
        s.handle_event(SegmentEvent::Cancel);
        assert_eq!(s.state(), SegmentState::Cancelled);
        for event in [
            SegmentEvent::Activate,
            SegmentEvent::OpenBlend,
            SegmentEvent::Complete,
            SegmentEvent::Cancel,
        ] {
            assert!(matches!(
                s.handle_event(event),
                SegmentTransition::Rejected(_)
            ));
        }
    }

    #[test]
    fn pending_cannot_complete() {
        let mut s = line_segment();
        assert!(matches!(
            s.handle_event(SegmentEvent::Complete),
            SegmentTransition::Rejected(_)
        ));
        assert_eq!(s.state(), SegmentState::Pending);
    }

    #[test]
    fn evaluate_maps_path_to_pose() {
        let mut s = line_segment();
        let b = Boundary::path(100.0, 0.0, 0.0, 50.0, 200.0, 2000.0);
        let block = solve_minimum_time(&b).unwrap();
        s.set_plan(b, block.profile);
        s.seek(block.t_min / 2.0);
        let sample = s.evaluate();
        assert!((sample.pose.x - 50.0).abs() < 1e-6);
        assert!((sample.path.velocity - 50.0).abs() < 1e-9);

        s.advance(block.t_min);
        assert!(s.is_finished());
        assert!((s.overshoot() - block.t_min / 2.0).abs() < 1e-12);
        assert_eq!(s.evaluate().pose, Cartesian::new(100.0, 0.0, 0.0));
    }

    #[test]
    fn replan_rest_continues_from_the_current_position() {
        let mut s = line_segment();
        let b = Boundary::path(100.0, 0.0, 0.0, 50.0, 200.0, 2000.0);
        let block = solve_minimum_time(&b).unwrap();
        s.set_plan(b, block.profile);
        s.seek(1.0);
        let here = s.evaluate().path.position;

        // Restart from rest at half the planning scale.
        s.replan_rest(0.0, 0.5).unwrap();
        assert_eq!(s.elapsed(), 0.0);
        assert_eq!(s.feed_cap(), 0.5);
        assert!((s.evaluate().path.position - here).abs() < 1e-9);
        assert_eq!(s.start_velocity(), 0.0);
        assert!((s.profile().peak_velocity() - 25.0).abs() < 1e-9);
        let end = s.sample_at(s.duration());
        assert!((end.path.position - 100.0).abs() < 1e-6);
        assert!((end.pose.x - 100.0).abs() < 1e-6);
    }

    #[test]
    fn replan_rest_never_raises_the_exit() {
        let mut s = line_segment();
        let b = Boundary::path(100.0, 0.0, 10.0, 50.0, 200.0, 2000.0);
        s.set_plan(b, solve_minimum_time(&b).unwrap().profile);
        s.seek(0.5);
        s.replan_rest(20.0, 1.0).unwrap();
        assert!((s.end_velocity() - 10.0).abs() < 1e-9);

        // Too fast to reach the exit in what is left.
        let before = s.clone();
        s.seek(s.duration() - 0.01);
        let fast = s.clone();
        assert_eq!(s.replan_rest(50.0, 1.0), Err(Infeasible::NoFeasibleShape));
        assert_eq!(s, fast);
        assert_ne!(s, before);
    }

    #[test]
    fn dwell_is_always_exact_stop() {
        let dwell = Geometry::Dwell {
            position: Cartesian::ZERO,
            seconds: 0.5,
        };
        let s = Segment::new(
            2,
            dwell,
            limits(),
            Termination::Blend { tolerance: 1.0 },
            0.0,
        );
        assert_eq!(s.termination(), Termination::ExactStop);
        assert_eq!(s.duration(), 0.5);
    }

    #[test]
    fn too_many_outputs() {
        let mut s = line_segment();
        for i in 0..MAX_SYNC_OUTPUTS {
            s.attach(SyncOutput::Digital {
                index: i as u8,
                on: true,
            })
            .unwrap();
        }
        assert_eq!(
            s.attach(SyncOutput::Digital { index: 9, on: true }),
            Err(Infeasible::TooManyOutputs)
        );
    }

    #[test]
    fn termination_from_tolerance() {
        assert_eq!(Termination::from_tolerance(None), Termination::ExactStop);
        assert_eq!(Termination::from_tolerance(Some(0.0)), Termination::ExactStop);
        assert_eq!(
            Termination::from_tolerance(Some(0.05)),
            Termination::Blend { tolerance: 0.05 }
        );
    }
}
