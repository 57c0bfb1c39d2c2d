//! Segment planner: interpreter commands → queued segments.
//!
//! - [`geometry`] - Lines, arcs, rigid-tap moves and dwells
//! - [`limits`] - Per-axis limits projected onto the path
//! - [`blend`] - Corner velocity from the blend tolerance
//! - [`lookahead`] - Velocity passes over the unpublished window
//!
//! The planner runs in the producer context. It tracks the programmed
//! position, builds one segment per motion command (two for a rigid tap),
//! checks it against the machine envelope and the kinematics, computes the
//! corner velocity with its predecessor and hands it to the queue's
//! producer half.

pub mod blend;
pub mod geometry;
pub mod limits;
pub mod lookahead;

use heapless::Vec;
use motion_common::command::{ArcDirection, MotionCommand};
use motion_common::config::{AxesConfig, TrajectoryConfig};
use motion_common::consts::{CARTESIAN_AXES, MAX_ARC_TURNS, MAX_JOINTS, MAX_SYNC_OUTPUTS};
use motion_common::error::{Infeasible, MotionError};
use motion_common::geometry::Cartesian;
use motion_common::setpoint::SyncOutput;
use tracing::{debug, info, warn};

use crate::kinematics::Kinematics;
use crate::queue::QueueProducer;
use crate::queue::segment::{Segment, SegmentId, Termination};
use blend::{CornerSide, corner_velocity, junction_tolerance};
use geometry::{Arc, Geometry, Line, MIN_SEGMENT_LENGTH, TapPhase};
use limits::PathLimits;

/// End of the most recently planned segment, for the next corner.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Tail {
    side: CornerSide,
    tolerance: Option<f64>,
    velocity_cap: f64,
}

/// Turns [`MotionCommand`]s into planned segments on the producer half of
/// a trajectory queue.
pub struct SegmentPlanner<'q, K: Kinematics, const N: usize> {
    trajectory: TrajectoryConfig,
    axes: AxesConfig,
    kinematics: K,
    producer: QueueProducer<'q, N>,
    position: Cartesian,
    tail: Option<Tail>,
    next_id: SegmentId,
    pending_outputs: Vec<SyncOutput, MAX_SYNC_OUTPUTS>,
    epoch: u32,
}

impl<'q, K: Kinematics, const N: usize> SegmentPlanner<'q, K, N> {
    /// Planner starting at the control block's hold pose.
    pub fn new(
        trajectory: &TrajectoryConfig,
        axes: &AxesConfig,
        kinematics: K,
        producer: QueueProducer<'q, N>,
    ) -> Self {
        let control = producer.control();
        let position = control.hold_pose();
        let epoch = control.epoch();
        Self {
            trajectory: trajectory.clone(),
            axes: *axes,
            kinematics,
            producer,
            position,
            tail: None,
            next_id: 1,
            pending_outputs: Vec::new(),
            epoch,
        }
    }

    /// Programmed position after the last planned command.
    #[inline]
    pub fn position(&self) -> Cartesian {
        self.position
    }

    #[inline]
    pub fn producer(&self) -> &QueueProducer<'q, N> {
        &self.producer
    }

    /// Plan one command.
    ///
    /// Returns the id of the (first) queued segment, or `None` for commands
    /// that queue nothing (outputs, zero-length moves).
    ///
    /// # Errors
    ///
    /// - [`MotionError::QueueFull`] on backpressure, or while an abort has
    ///   not yet taken effect in the executor. Retry later.
    /// - [`MotionError::Infeasible`] for commands that cannot be executed.
    /// - [`MotionError::KinematicsSingularity`] if the kinematics reject a
    ///   point on the move.
    ///
    /// On error the planner state is unchanged.
    pub fn plan(&mut self, command: &MotionCommand) -> Result<Option<SegmentId>, MotionError> {
        self.resync()?;
        match *command {
            MotionCommand::Line {
                end,
                feed_rate,
                blend_tolerance,
            } => {
                if self.position.distance(&end) < MIN_SEGMENT_LENGTH {
                    debug!("zero-length line to {end:?} skipped");
                    return Ok(None);
                }
                let line = Line::new(self.position, end)?;
                let limits = self.line_limits(&line, feed_rate, self.trajectory.max_feed_scale)?;
                let termination = Termination::from_tolerance(blend_tolerance);
                self.push_motion(Geometry::Line(line), limits, termination)
                    .map(Some)
            }

            MotionCommand::Arc {
                end,
                center,
                plane,
                direction,
                turns,
                feed_rate,
                blend_tolerance,
            } => {
                if turns > MAX_ARC_TURNS {
                    return Err(Infeasible::DegenerateGeometry("too many arc turns").into());
                }
                let normal = match direction {
                    ArcDirection::Ccw => plane.normal(),
                    ArcDirection::Cw => -plane.normal(),
                };
                let arc = Arc::new(
                    self.position,
                    end,
                    center,
                    normal,
                    turns,
                    self.trajectory.arc_radius_tolerance,
                )?;
                let limits = PathLimits::for_arc(&self.axes, &arc)
                    .with_feed_headroom(self.trajectory.max_feed_scale)
                    .capped(feed_rate, self.trajectory.max_velocity)?;
                let termination = Termination::from_tolerance(blend_tolerance);
                self.push_motion(Geometry::Arc(arc), limits, termination)
                    .map(Some)
            }

            MotionCommand::RigidTap { bottom, feed_rate } => self.push_tap(bottom, feed_rate),

            MotionCommand::Dwell { seconds } => {
                if !seconds.is_finite() {
                    return Err(Infeasible::NonFinite.into());
                }
                if seconds < 0.0 {
                    return Err(Infeasible::InvalidLimits("dwell time must not be negative").into());
                }
                self.push_dwell(seconds).map(Some)
            }

            MotionCommand::DigitalOutput { index, on } => {
                self.queue_output(SyncOutput::Digital { index, on })?;
                Ok(None)
            }

            MotionCommand::AnalogOutput { index, value } => {
                if !value.is_finite() {
                    return Err(Infeasible::NonFinite.into());
                }
                self.queue_output(SyncOutput::Analog { index, value })?;
                Ok(None)
            }
        }
    }

    /// Publish everything planned so far (program end or interpreter idle).
    ///
    /// Outputs still waiting for a motion segment are carried by a
    /// zero-length dwell so they fire in order.
    pub fn drain(&mut self) -> Result<usize, MotionError> {
        self.resync()?;
        if !self.pending_outputs.is_empty() {
            self.push_dwell(0.0)?;
        }
        self.producer.drain()
    }

    /// Scale the velocity cap of every unpublished segment.
    pub fn apply_feed_scale(&mut self, scale: f64) -> Result<(), MotionError> {
        self.resync()?;
        self.producer.apply_feed_scale(scale)?;
        info!("planning feed scale set to {scale}");
        Ok(())
    }

    // ─── Segment Construction ───────────────────────────────────────

    fn line_limits(&self, line: &Line, feed_rate: f64, headroom: f64) -> Result<PathLimits, Infeasible> {
        PathLimits::for_direction(&self.axes, &line.direction())
            .with_feed_headroom(headroom)
            .capped(feed_rate, self.trajectory.max_velocity)
    }

    fn push_motion(
        &mut self,
        geometry: Geometry,
        limits: PathLimits,
        termination: Termination,
    ) -> Result<SegmentId, MotionError> {
        self.check_envelope(&geometry)?;
        self.check_kinematics(&geometry)?;
        if !self.producer.can_accept() {
            return Err(MotionError::QueueFull);
        }

        let length = geometry.length();
        let side = CornerSide {
            tangent: geometry.start_tangent(),
            length,
            normal_acceleration: limits.normal_acceleration,
        };
        let blend_in = match (&self.tail, geometry.kind().is_blendable()) {
            (Some(tail), true) => {
                let tolerance =
                    junction_tolerance(tail.tolerance, termination.tolerance(), tail.side.length, length);
                corner_velocity(&tail.side, &side, tolerance)
                    .min(tail.velocity_cap)
                    .min(limits.velocity)
            }
            _ => 0.0,
        };

        let id = self.enqueue(geometry, limits, termination, blend_in)?;
        self.tail = match termination {
            Termination::Blend { tolerance } => Some(Tail {
                side: CornerSide {
                    tangent: geometry.end_tangent(),
                    length,
                    normal_acceleration: limits.normal_acceleration,
                },
                tolerance: Some(tolerance),
                velocity_cap: limits.velocity,
            }),
            Termination::ExactStop => None,
        };
        debug!(
            "segment {id}: {:?} length {length:.4}, cap {:.3}, blend-in {blend_in:.3}",
            geometry.kind(),
            limits.velocity
        );
        Ok(id)
    }

    fn push_tap(&mut self, bottom: Cartesian, feed_rate: f64) -> Result<Option<SegmentId>, MotionError> {
        let start = self.position;
        let feed = Line::new(start, bottom)?;
        let retract = Line::new(bottom, start)?;
        let feed_limits = self.line_limits(&feed, feed_rate, 1.0)?;
        let retract_limits = self.line_limits(&retract, feed_rate, 1.0)?;
        let feed = Geometry::RigidTap {
            line: feed,
            phase: TapPhase::Feed,
        };
        let retract = Geometry::RigidTap {
            line: retract,
            phase: TapPhase::Retract,
        };
        self.check_envelope(&feed)?;
        self.check_kinematics(&feed)?;
        let id = self.next_id;
        let feed = self.segment(id, feed, feed_limits, Termination::ExactStop, 0.0)?;
        let retract = Segment::new(id + 1, retract, retract_limits, Termination::ExactStop, 0.0);
        self.producer.enqueue_all([feed, retract])?;
        self.next_id += 2;
        self.pending_outputs.clear();
        self.tail = None;
        debug!("rigid tap {id}: {:.4} deep", self.position.distance(&bottom));
        Ok(Some(id))
    }

    fn push_dwell(&mut self, seconds: f64) -> Result<SegmentId, MotionError> {
        if !self.producer.can_accept() {
            return Err(MotionError::QueueFull);
        }
        let geometry = Geometry::Dwell {
            position: self.position,
            seconds,
        };
        let id = self.enqueue(geometry, PathLimits::STILL, Termination::ExactStop, 0.0)?;
        self.tail = None;
        Ok(id)
    }

    /// Queue a segment carrying the pending outputs. Planner state changes
    /// only on success.
    fn enqueue(
        &mut self,
        geometry: Geometry,
        limits: PathLimits,
        termination: Termination,
        blend_in: f64,
    ) -> Result<SegmentId, MotionError> {
        let id = self.next_id;
        let segment = self.segment(id, geometry, limits, termination, blend_in)?;
        self.producer.enqueue(segment)?;
        self.next_id += 1;
        self.pending_outputs.clear();
        self.position = geometry.end_point();
        Ok(id)
    }

    /// New segment carrying the pending outputs.
    fn segment(
        &self,
        id: SegmentId,
        geometry: Geometry,
        limits: PathLimits,
        termination: Termination,
        blend_in: f64,
    ) -> Result<Segment, Infeasible> {
        let mut segment = Segment::new(id, geometry, limits, termination, blend_in);
        for output in &self.pending_outputs {
            segment.attach(*output)?;
        }
        Ok(segment)
    }

    fn queue_output(&mut self, output: SyncOutput) -> Result<(), Infeasible> {
        self.pending_outputs
            .push(output)
            .map_err(|_| Infeasible::TooManyOutputs)
    }

    // ─── Checks ─────────────────────────────────────────────────────

    fn check_envelope(&self, geometry: &Geometry) -> Result<(), Infeasible> {
        let (lo, hi) = geometry.bounds();
        for i in 0..CARTESIAN_AXES {
            let axis = self.axes.axis(i);
            for value in [lo.axis(i), hi.axis(i)] {
                if !axis.contains(value, 0.0) {
                    return Err(Infeasible::OutOfEnvelope {
                        axis: AxesConfig::NAMES[i],
                        value,
                        min: axis.min_position,
                        max: axis.max_position,
                    });
                }
            }
        }
        Ok(())
    }

    fn check_kinematics(&self, geometry: &Geometry) -> Result<(), MotionError> {
        let count = self.kinematics.joint_count().min(MAX_JOINTS);
        let mut joints = [0.0; MAX_JOINTS];
        self.kinematics
            .inverse(&geometry.end_point(), &mut joints[..count])?;
        if let Geometry::Arc(arc) = geometry {
            for point in arc.extrema() {
                self.kinematics.inverse(&point, &mut joints[..count])?;
            }
        }
        Ok(())
    }

    /// Restart from the executor's hold pose after an abort.
    fn resync(&mut self) -> Result<(), MotionError> {
        let control = self.producer.control();
        let epoch = control.epoch();
        if epoch == self.epoch {
            return Ok(());
        }
        if control.acknowledged_epoch() != epoch {
            return Err(MotionError::QueueFull);
        }
        let position = control.hold_pose();
        self.producer.sync_epoch();
        if !self.pending_outputs.is_empty() {
            warn!("abort dropped {} pending output(s)", self.pending_outputs.len());
        }
        self.pending_outputs.clear();
        self.tail = None;
        self.position = position;
        self.epoch = epoch;
        info!("planner resynced to epoch {epoch} at {position:?}");
        Ok(())
    }
}
