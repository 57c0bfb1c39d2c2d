//! Tick-driven trajectory executor.
//!
//! Once per control tick the executor reads the control snapshot, evaluates
//! the active segment's profile at its parametric time τ, maps the result
//! through geometry and kinematics into joint setpoints, advances τ by the
//! time-scaled tick period and hands off to the staged successor when the
//! profile runs out.
//!
//! Feed override and pause act on the time scale through
//! [`feed::TimeScale`], which keeps the scaled output inside the machine's
//! path acceleration and jerk. When the published trajectory ends at speed
//! and its successor has not arrived, the executor stops along the path
//! before the end and waits ([`ExecutorState::Waiting`]).
//!
//! Everything in [`Executor::tick`] is bounded: at most
//! [`MAX_HANDOFFS_PER_TICK`] hand-offs, one ring drain of at most the ring
//! size, and closed-form profile evaluation. Nothing allocates or blocks.
//!
//! Runtime faults (limit violation, kinematics singularity, queue
//! starvation) abort the queue, latch a [`FaultFlags`] bit in the control
//! block and hold the last good pose until `reset_fault()`.

pub mod feed;
pub mod output;
pub mod state;

use motion_common::config::{AxesConfig, TrajectoryConfig};
use motion_common::consts::{CARTESIAN_AXES, MAX_HANDOFFS_PER_TICK, MAX_JOINTS};
use motion_common::error::{FaultFlags, KinematicsError, MotionError, Quantity};
use motion_common::geometry::Cartesian;
use motion_common::setpoint::{Setpoint, SyncEvent};
use tracing::{debug, error, info, warn};

use crate::control::MotionControl;
use crate::kinematics::Kinematics;
use crate::planner::geometry::SegmentKind;
use crate::queue::segment::{Segment, SegmentEvent, SegmentSample, SegmentState};
use crate::queue::{Flushed, QueueConsumer};
use feed::{AT_REST, OutputLimits, TimeScale, stopping_distance};
use output::JointStage;

pub use state::ExecutorState;

/// Path velocity below which a segment counts as ending at rest.
pub const STOPPED_VELOCITY: f64 = 1e-6;

/// Relative difference between a segment's planned and actual entry
/// velocity that triggers a re-solve at activation.
const ENTRY_TOLERANCE: f64 = 1e-9;

pub struct Executor<K: Kinematics> {
    kinematics: K,
    control: MotionControl,
    axes: AxesConfig,
    dt: f64,
    max_feed_scale: f64,
    limit_tolerance: f64,
    /// Slew bound of the time scale when the override falls [1/s].
    feed_slew: f64,
    scale: TimeScale,
    /// Path velocity the next segment is entered with, in profile units.
    entry_velocity: f64,
    /// Path length of the segments completed since the last abort.
    consumed: f64,
    /// Runway end the executor stopped for, until the producer extends it.
    starved_at: Option<f64>,
    joints: JointStage,
    joint_buf: [f64; MAX_JOINTS],
    state: ExecutorState,
    epoch: u32,
    faults: FaultFlags,
    tick: u64,
    /// Last commanded pose that passed every check.
    hold_pose: Cartesian,
}

impl<K: Kinematics> Executor<K> {
    /// Executor holding at the control block's current hold pose.
    ///
    /// # Errors
    ///
    /// [`MotionError::KinematicsSingularity`] if the adapter has more than
    /// `MAX_JOINTS` joints or rejects the start pose.
    pub fn new(
        trajectory: &TrajectoryConfig,
        axes: &AxesConfig,
        kinematics: K,
        control: MotionControl,
    ) -> Result<Self, MotionError> {
        let count = kinematics.joint_count();
        if count > MAX_JOINTS {
            return Err(KinematicsError::JointCount {
                expected: MAX_JOINTS,
                got: count,
            }
            .into());
        }
        let start = control.hold_pose();
        let mut joint_buf = [0.0; MAX_JOINTS];
        kinematics.inverse(&start, &mut joint_buf[..count])?;
        let dt = trajectory.cycle_time_s();
        control.publish_state(ExecutorState::Idle);
        control.publish_executing(None);
        control.acknowledge_epoch(control.epoch());
        Ok(Self {
            joints: JointStage::new(&joint_buf[..count], dt),
            joint_buf,
            kinematics,
            epoch: control.epoch(),
            control,
            axes: *axes,
            dt,
            max_feed_scale: trajectory.max_feed_scale,
            limit_tolerance: trajectory.limit_tolerance,
            feed_slew: trajectory.feed_ramp_rate,
            scale: TimeScale::new(),
            entry_velocity: 0.0,
            consumed: 0.0,
            starved_at: None,
            state: ExecutorState::Idle,
            faults: FaultFlags::empty(),
            tick: 0,
            hold_pose: start,
        })
    }

    #[inline]
    pub fn state(&self) -> ExecutorState {
        self.state
    }

    #[inline]
    pub fn faults(&self) -> FaultFlags {
        self.faults
    }

    #[inline]
    pub fn hold_pose(&self) -> Cartesian {
        self.hold_pose
    }

    /// Time scale applied on the last tick.
    #[inline]
    pub fn time_scale(&self) -> f64 {
        self.scale.scale()
    }

    /// Output path velocity of the last tick.
    #[inline]
    pub fn path_velocity(&self) -> f64 {
        self.scale.velocity()
    }

    #[inline]
    pub fn ticks(&self) -> u64 {
        self.tick
    }

    #[inline]
    pub fn joint_count(&self) -> usize {
        self.kinematics.joint_count()
    }

    #[inline]
    pub fn control(&self) -> &MotionControl {
        &self.control
    }

    /// Run one control tick and write its setpoint into `out`.
    ///
    /// Returns the executor state after the tick.
    ///
    /// # Errors
    ///
    /// The runtime fault raised during this tick. The fault is already
    /// handled (queue aborted, flag latched, `out` holds position); the
    /// error is informational and later ticks keep holding.
    pub fn tick<const N: usize>(
        &mut self,
        queue: &mut QueueConsumer<'_, N>,
        out: &mut Setpoint,
    ) -> Result<ExecutorState, MotionError> {
        self.tick += 1;
        out.begin_tick(self.tick);
        let snapshot = self.control.snapshot();

        if snapshot.epoch != self.epoch {
            self.epoch = snapshot.epoch;
            let flushed = queue.flush(snapshot.epoch);
            push_cancelled(&flushed, out);
            self.forget_path();
            debug!(
                "abort (epoch {}): cancelled {:?}/{:?}, dropped {}",
                snapshot.epoch, flushed.active, flushed.staged, flushed.dropped
            );
        }

        if snapshot.fault_reset && self.state == ExecutorState::Faulted {
            self.faults = FaultFlags::empty();
            self.control.clear_faults();
            self.set_state(ExecutorState::Idle);
        }

        if self.state == ExecutorState::Faulted {
            // Nothing published while faulted is executed.
            let flushed = queue.flush(self.epoch);
            push_cancelled(&flushed, out);
            self.write_frozen(out);
            self.publish(out);
            return Ok(self.state);
        }

        let requested = if snapshot.paused {
            0.0
        } else {
            snapshot.feed_scale.min(self.max_feed_scale)
        };
        queue.refill();

        if let Err(e) = self.run(queue, out, requested) {
            self.fault(queue, out, e);
            self.publish(out);
            return Err(e);
        }

        let state = match queue.peek_active() {
            None if snapshot.paused => ExecutorState::Paused,
            None => ExecutorState::Idle,
            Some(_) if self.starved_at.is_some() => {
                if self.scale.velocity() > STOPPED_VELOCITY {
                    ExecutorState::Pausing
                } else {
                    ExecutorState::Waiting
                }
            }
            Some(_) if requested > 0.0 => ExecutorState::Running,
            Some(seg) if self.scale.scale() > 0.0 || seg.kind() == SegmentKind::RigidTap => {
                ExecutorState::Pausing
            }
            Some(_) => ExecutorState::Paused,
        };
        self.set_state(state);
        self.publish(out);
        Ok(state)
    }

    // ─── Tick Body ──────────────────────────────────────────────────

    fn run<const N: usize>(
        &mut self,
        queue: &mut QueueConsumer<'_, N>,
        out: &mut Setpoint,
        requested: f64,
    ) -> Result<(), MotionError> {
        let next_limits = queue
            .peek_next()
            .filter(|next| next.kind() != SegmentKind::Dwell)
            .map(|next| self.output_limits(next));
        let has_next = queue.peek_next().is_some();
        let Some(seg) = queue.active_mut() else {
            self.scale.follow(self.scale.scale(), 0.0, self.dt);
            return self.write_hold(out);
        };

        if seg.state() == SegmentState::Pending {
            self.start(seg, out);
        }
        if seg.state() == SegmentState::Active
            && has_next
            && seg.end_velocity() > STOPPED_VELOCITY
        {
            let _ = seg.handle_event(SegmentEvent::OpenBlend);
        }

        let mut limits = self.output_limits(seg);
        let mut sample = seg.evaluate();
        let target =
            self.runway_target(seg.id(), &sample, &limits, next_limits.as_ref(), requested);
        if self.starved_at.is_some() {
            limits.slew = 0.0;
        }

        let scale = match seg.kind() {
            SegmentKind::Line | SegmentKind::Arc => {
                if target > self.scale.scale() && self.raise(seg, &sample, target, &limits) {
                    sample = seg.evaluate();
                }
                let path = sample.path;
                self.scale
                    .step(target, path.velocity, path.acceleration, &limits, self.dt)
            }
            SegmentKind::RigidTap => {
                self.scale.follow(1.0, sample.path.velocity, self.dt);
                1.0
            }
            SegmentKind::Dwell => {
                let scale = if target > 0.0 { 1.0 } else { 0.0 };
                self.scale.follow(scale, 0.0, self.dt);
                scale
            }
        };
        self.check_limits(seg, &limits)?;
        self.check_envelope(seg.id(), &sample.pose)?;

        out.segment = Some(seg.id());
        out.path_position = sample.path.position;
        out.path_velocity = self.scale.velocity();
        seg.advance(self.dt * scale);

        // The last segment of a run lands exactly on its end point.
        let pose = self.hand_off(queue, out)?.unwrap_or(sample.pose);
        self.write_joints(&pose, out)?;
        out.pose = pose;
        self.hold_pose = pose;
        Ok(())
    }

    /// Requested scale, or 0 once the published path ends at speed closer
    /// than the output can stop in.
    fn runway_target(
        &mut self,
        id: u64,
        sample: &SegmentSample,
        limits: &OutputLimits,
        next: Option<&OutputLimits>,
        requested: f64,
    ) -> f64 {
        let runway_end = self.control.runway_end();
        if self.starved_at.is_some_and(|end| end != runway_end) {
            info!("trajectory extended to {runway_end:.3}, releasing hold");
            self.starved_at = None;
        }
        if self.starved_at.is_none() && runway_end.is_finite() {
            let brake = next.map_or(*limits, |next| limits.min(next));
            let runway = runway_end - (self.consumed + sample.path.position);
            let needed = stopping_distance(
                self.scale.velocity(),
                self.scale.acceleration(),
                &brake,
                self.dt,
            );
            if runway <= needed {
                warn!("segment {id}: published path ends {runway:.3} ahead at speed, holding");
                self.starved_at = Some(runway_end);
            }
        }
        if self.starved_at.is_some() {
            0.0
        } else {
            requested
        }
    }

    /// Bring the time scale up to `target`. Away from rest the rest of the
    /// segment is re-planned from the current output velocity first, once
    /// the output acceleration has settled enough to drop to zero within
    /// one tick. Returns whether the segment was re-planned.
    fn raise(
        &mut self,
        seg: &mut Segment,
        sample: &SegmentSample,
        target: f64,
        limits: &OutputLimits,
    ) -> bool {
        if sample.path.velocity <= AT_REST {
            self.scale.rebase(target);
            return false;
        }
        if self.scale.acceleration().abs() > limits.jerk * self.dt {
            return false;
        }
        let v0 = self.scale.velocity() / target;
        if seg.replan_rest(v0, self.control.planning_scale()).is_err() {
            return false;
        }
        self.scale.rebase(target);
        true
    }

    /// Complete finished segments and start their successors. Returns the
    /// end pose when the queue ran dry.
    fn hand_off<const N: usize>(
        &mut self,
        queue: &mut QueueConsumer<'_, N>,
        out: &mut Setpoint,
    ) -> Result<Option<Cartesian>, MotionError> {
        for _ in 0..MAX_HANDOFFS_PER_TICK {
            let Some(done) = queue.advance_if_done() else {
                return Ok(None);
            };
            out.push_event(SyncEvent::SegmentCompleted { id: done.id });
            self.consumed += done.length;
            self.entry_velocity = done.end_velocity;
            match queue.active_mut() {
                Some(next) => {
                    if next.state() == SegmentState::Pending {
                        self.start(next, out);
                    }
                    next.seek(done.overshoot);
                }
                None => {
                    self.entry_velocity = 0.0;
                    if done.end_velocity > STOPPED_VELOCITY {
                        return Err(MotionError::QueueStarved {
                            segment: done.id,
                            velocity: done.end_velocity,
                        });
                    }
                    return Ok(Some(done.end_pose));
                }
            }
        }
        Ok(None)
    }

    /// Activate `seg`. A plan made for a different entry velocity or
    /// planning scale is re-solved first; if that fails the old plan runs
    /// and the time scale absorbs the mismatch.
    fn start(&self, seg: &mut Segment, out: &mut Setpoint) {
        let scale = self.control.planning_scale();
        let entry = self.entry_velocity;
        let drifted = (seg.start_velocity() - entry).abs()
            > ENTRY_TOLERANCE * seg.start_velocity().max(1.0);
        let rescaled = matches!(seg.kind(), SegmentKind::Line | SegmentKind::Arc)
            && seg.feed_cap() != scale;
        if seg.boundary().is_some() && (drifted || rescaled) {
            match seg.replan_rest(entry, scale) {
                Ok(()) => debug!(
                    "segment {}: re-solved at start (entry {entry:.3}, scale {scale})",
                    seg.id()
                ),
                Err(e) => warn!("segment {}: keeping planned profile: {e}", seg.id()),
            }
        }
        let _ = seg.handle_event(SegmentEvent::Activate);
        out.push_event(SyncEvent::SegmentStarted { id: seg.id() });
        for output in seg.outputs() {
            out.push_event((*output).into());
        }
    }

    // ─── Checks ─────────────────────────────────────────────────────

    /// Machine limits of the scaled output on `seg`. Lines and arcs are
    /// planned with feed headroom, so their limits scale back up by it.
    fn output_limits(&self, seg: &Segment) -> OutputLimits {
        let headroom = self.headroom(seg);
        let limits = seg.limits();
        OutputLimits {
            acceleration: limits.acceleration * headroom * headroom,
            jerk: limits.jerk * headroom * headroom * headroom,
            slew: self.feed_slew,
        }
    }

    #[inline]
    fn headroom(&self, seg: &Segment) -> f64 {
        match seg.kind() {
            SegmentKind::Line | SegmentKind::Arc => self.max_feed_scale,
            SegmentKind::RigidTap | SegmentKind::Dwell => 1.0,
        }
    }

    /// Check the scaled output of this tick.
    fn check_limits(&self, seg: &Segment, limits: &OutputLimits) -> Result<(), MotionError> {
        let Some(b) = seg.boundary() else {
            return Ok(());
        };
        let v = self.scale.velocity();
        let v_max = b.v_max * self.headroom(seg);
        let tol = self.limit_tolerance * v_max.max(1.0);
        if v > v_max + tol || v < -tol {
            return Err(MotionError::LimitViolation {
                segment: seg.id(),
                quantity: Quantity::Velocity,
                value: v,
                min: 0.0,
                max: v_max,
            });
        }
        let a = self.scale.acceleration();
        let a_max = limits.acceleration;
        let tol = self.limit_tolerance * a_max.max(1.0);
        if a.abs() > a_max + tol {
            return Err(MotionError::LimitViolation {
                segment: seg.id(),
                quantity: Quantity::Acceleration,
                value: a,
                min: -a_max,
                max: a_max,
            });
        }
        Ok(())
    }

    fn check_envelope(&self, segment: u64, pose: &Cartesian) -> Result<(), MotionError> {
        for i in 0..CARTESIAN_AXES {
            let axis = self.axes.axis(i);
            let value = pose.axis(i);
            if !axis.contains(value, self.limit_tolerance * value.abs().max(1.0)) {
                return Err(MotionError::LimitViolation {
                    segment,
                    quantity: Quantity::Position,
                    value,
                    min: axis.min_position,
                    max: axis.max_position,
                });
            }
        }
        Ok(())
    }

    // ─── Output ─────────────────────────────────────────────────────

    fn write_joints(&mut self, pose: &Cartesian, out: &mut Setpoint) -> Result<(), MotionError> {
        let count = self.kinematics.joint_count();
        self.kinematics
            .inverse(pose, &mut self.joint_buf[..count])?;
        self.joints
            .update(&self.joint_buf[..count], &mut out.joints[..count]);
        Ok(())
    }

    fn write_hold(&mut self, out: &mut Setpoint) -> Result<(), MotionError> {
        let pose = self.hold_pose;
        self.write_joints(&pose, out)?;
        out.pose = pose;
        Ok(())
    }

    fn write_frozen(&mut self, out: &mut Setpoint) {
        let count = self.kinematics.joint_count();
        self.joints.freeze(&mut out.joints[..count]);
        out.pose = self.hold_pose;
    }

    fn fault<const N: usize>(
        &mut self,
        queue: &mut QueueConsumer<'_, N>,
        out: &mut Setpoint,
        cause: MotionError,
    ) {
        let flag = cause.fault_flag();
        self.faults |= flag;
        self.control.latch_fault(flag);
        self.epoch = self.control.abort();
        let flushed = queue.flush(self.epoch);
        push_cancelled(&flushed, out);
        out.push_event(SyncEvent::Fault {
            flags: self.faults.bits(),
        });
        out.segment = None;
        out.path_velocity = 0.0;
        self.write_frozen(out);
        self.forget_path();
        self.scale.rebase(0.0);
        error!("motion fault: {cause}");
        self.set_state(ExecutorState::Faulted);
    }

    /// Drop everything tied to the flushed trajectory.
    fn forget_path(&mut self) {
        self.scale.reset();
        self.entry_velocity = 0.0;
        self.consumed = 0.0;
        self.starved_at = None;
    }

    fn set_state(&mut self, state: ExecutorState) {
        if state != self.state {
            info!("executor {:?} -> {:?}", self.state, state);
            self.state = state;
            self.control.publish_state(state);
        }
    }

    fn publish(&self, out: &Setpoint) {
        self.control.publish_executing(out.segment);
        self.control.publish_hold_pose(&self.hold_pose);
        self.control.acknowledge_epoch(self.epoch);
    }
}

fn push_cancelled(flushed: &Flushed, out: &mut Setpoint) {
    for id in [flushed.active, flushed.staged].into_iter().flatten() {
        out.push_event(SyncEvent::SegmentCancelled { id });
    }
}
