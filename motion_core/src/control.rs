//! Supervisory control surface shared between the supervisor, the
//! producer and the real-time executor.
//!
//! Every field is a single atomic word except the hold pose, which is
//! published through an even/odd version counter: the writer bumps the
//! version to odd, writes, and bumps it back to even; readers retry a
//! bounded number of times until they see the same even version before and
//! after the copy.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering, fence};

use motion_common::error::FaultFlags;
use motion_common::geometry::Cartesian;
use thiserror::Error;

use crate::executor::state::ExecutorState;
use crate::queue::segment::SegmentId;

/// Reader retries before a torn pose read gives up and returns the last
/// consistent copy it could not confirm.
pub const MAX_READ_RETRIES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ControlError {
    #[error("feed scale {0} must be finite and non-negative")]
    InvalidFeedScale(f64),
}

// ─── Pose Cell ──────────────────────────────────────────────────────

/// Single-writer pose published with an even/odd version counter.
#[derive(Debug)]
struct PoseCell {
    version: AtomicU64,
    x: AtomicU64,
    y: AtomicU64,
    z: AtomicU64,
}

impl PoseCell {
    fn new(pose: Cartesian) -> Self {
        Self {
            version: AtomicU64::new(0),
            x: AtomicU64::new(pose.x.to_bits()),
            y: AtomicU64::new(pose.y.to_bits()),
            z: AtomicU64::new(pose.z.to_bits()),
        }
    }

    #[inline]
    fn is_stable(version: u64) -> bool {
        version % 2 == 0
    }

    /// Writer side. Only the executor calls this.
    fn write(&self, pose: &Cartesian) {
        let current = self.version.load(Ordering::Relaxed);
        self.version.store(current.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        self.x.store(pose.x.to_bits(), Ordering::Relaxed);
        self.y.store(pose.y.to_bits(), Ordering::Relaxed);
        self.z.store(pose.z.to_bits(), Ordering::Relaxed);
        self.version.store(current.wrapping_add(2), Ordering::Release);
    }

    fn read(&self) -> Cartesian {
        let mut pose = self.load_fields();
        for _ in 0..MAX_READ_RETRIES {
            let before = self.version.load(Ordering::Acquire);
            if !Self::is_stable(before) {
                core::hint::spin_loop();
                continue;
            }
            pose = self.load_fields();
            fence(Ordering::Acquire);
            if self.version.load(Ordering::Relaxed) == before {
                return pose;
            }
        }
        pose
    }

    #[inline]
    fn load_fields(&self) -> Cartesian {
        Cartesian::new(
            f64::from_bits(self.x.load(Ordering::Relaxed)),
            f64::from_bits(self.y.load(Ordering::Relaxed)),
            f64::from_bits(self.z.load(Ordering::Relaxed)),
        )
    }
}

// ─── Control Block ──────────────────────────────────────────────────

#[derive(Debug)]
struct ControlBlock {
    epoch: AtomicU32,
    /// Last epoch the executor has flushed for.
    acknowledged: AtomicU32,
    paused: AtomicBool,
    feed_scale: AtomicU64,
    fault_reset: AtomicBool,
    faults: AtomicU32,
    executor_state: AtomicU8,
    executing_id: AtomicU64,
    /// Planning feed scale of the producer, f64 bits.
    planning_scale: AtomicU64,
    /// Path length at which the published trajectory runs out at speed,
    /// f64 bits; infinite while it ends at rest.
    runway_end: AtomicU64,
    hold_pose: PoseCell,
}

/// What the executor reads at the start of a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlSnapshot {
    pub epoch: u32,
    pub paused: bool,
    pub feed_scale: f64,
    /// A reset was requested since the last snapshot.
    pub fault_reset: bool,
}

/// Cloneable handle over the shared control block.
#[derive(Debug, Clone)]
pub struct MotionControl {
    block: Arc<ControlBlock>,
}

impl MotionControl {
    /// New control block: epoch 0, running at 100 % feed, no faults.
    pub fn new(start: Cartesian) -> Self {
        Self {
            block: Arc::new(ControlBlock {
                epoch: AtomicU32::new(0),
                acknowledged: AtomicU32::new(0),
                paused: AtomicBool::new(false),
                feed_scale: AtomicU64::new(1.0_f64.to_bits()),
                fault_reset: AtomicBool::new(false),
                faults: AtomicU32::new(0),
                executor_state: AtomicU8::new(ExecutorState::Idle as u8),
                executing_id: AtomicU64::new(0),
                planning_scale: AtomicU64::new(1.0_f64.to_bits()),
                runway_end: AtomicU64::new(f64::INFINITY.to_bits()),
                hold_pose: PoseCell::new(start),
            }),
        }
    }

    // ─── Commands ───────────────────────────────────────────────────

    /// Set the feed override. Values above the configured maximum are
    /// clamped by the executor; 0 decelerates to a stop like a pause.
    pub fn set_feed_scale(&self, scale: f64) -> Result<(), ControlError> {
        if !(scale >= 0.0) || !scale.is_finite() {
            return Err(ControlError::InvalidFeedScale(scale));
        }
        self.block
            .feed_scale
            .store(scale.to_bits(), Ordering::Release);
        Ok(())
    }

    /// Decelerate along the path and hold.
    pub fn pause(&self) {
        self.block.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.block.paused.store(false, Ordering::Release);
    }

    /// Cancel everything queued or executing. Returns the new epoch.
    ///
    /// Takes effect at the start of the next executor tick.
    pub fn abort(&self) -> u32 {
        self.block
            .epoch
            .fetch_add(1, Ordering::AcqRel)
            .wrapping_add(1)
    }

    /// Request clearing of latched faults.
    pub fn reset_fault(&self) {
        self.block.fault_reset.store(true, Ordering::Release);
    }

    // ─── Status ─────────────────────────────────────────────────────

    #[inline]
    pub fn epoch(&self) -> u32 {
        self.block.epoch.load(Ordering::Acquire)
    }

    /// Epoch the executor has completed its flush for. Differs from
    /// [`epoch`](Self::epoch) between an abort and the next executor tick.
    #[inline]
    pub fn acknowledged_epoch(&self) -> u32 {
        self.block.acknowledged.load(Ordering::Acquire)
    }

    /// Whether the last abort has taken effect.
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.acknowledged_epoch() == self.epoch()
    }

    #[inline]
    pub fn feed_scale(&self) -> f64 {
        f64::from_bits(self.block.feed_scale.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.block.paused.load(Ordering::Acquire)
    }

    #[inline]
    pub fn faults(&self) -> FaultFlags {
        FaultFlags::from_bits_truncate(self.block.faults.load(Ordering::Acquire))
    }

    #[inline]
    pub fn executor_state(&self) -> ExecutorState {
        ExecutorState::from_u8(self.block.executor_state.load(Ordering::Acquire))
            .unwrap_or_default()
    }

    /// Id of the segment producing setpoints, if any.
    #[inline]
    pub fn executing_id(&self) -> Option<SegmentId> {
        match self.block.executing_id.load(Ordering::Acquire) {
            0 => None,
            id => Some(id),
        }
    }

    /// Velocity scale the producer plans with; segments not yet started
    /// are re-solved under it.
    #[inline]
    pub fn planning_scale(&self) -> f64 {
        f64::from_bits(self.block.planning_scale.load(Ordering::Acquire))
    }

    /// Cumulative path length (since the last abort) at the end of the
    /// last published segment if that segment hands over at speed;
    /// infinite when the published trajectory comes to rest by itself.
    #[inline]
    pub fn runway_end(&self) -> f64 {
        f64::from_bits(self.block.runway_end.load(Ordering::Acquire))
    }

    /// Pose the executor holds (or last commanded).
    #[inline]
    pub fn hold_pose(&self) -> Cartesian {
        self.block.hold_pose.read()
    }

    // ─── Producer side ──────────────────────────────────────────────

    pub(crate) fn publish_planning_scale(&self, scale: f64) {
        self.block
            .planning_scale
            .store(scale.to_bits(), Ordering::Release);
    }

    pub(crate) fn publish_runway_end(&self, length: f64) {
        self.block
            .runway_end
            .store(length.to_bits(), Ordering::Release);
    }

    // ─── Executor side ──────────────────────────────────────────────

    pub(crate) fn snapshot(&self) -> ControlSnapshot {
        ControlSnapshot {
            epoch: self.epoch(),
            paused: self.is_paused(),
            feed_scale: self.feed_scale(),
            fault_reset: self.block.fault_reset.swap(false, Ordering::AcqRel),
        }
    }

    pub(crate) fn latch_fault(&self, flags: FaultFlags) {
        self.block.faults.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    pub(crate) fn clear_faults(&self) {
        self.block.faults.store(0, Ordering::Release);
    }

    pub(crate) fn publish_state(&self, state: ExecutorState) {
        self.block
            .executor_state
            .store(state as u8, Ordering::Release);
    }

    pub(crate) fn publish_executing(&self, id: Option<SegmentId>) {
        self.block
            .executing_id
            .store(id.unwrap_or(0), Ordering::Release);
    }

    pub(crate) fn acknowledge_epoch(&self, epoch: u32) {
        self.block.acknowledged.store(epoch, Ordering::Release);
    }

    pub(crate) fn publish_hold_pose(&self, pose: &Cartesian) {
        self.block.hold_pose.write(pose);
    }
}
