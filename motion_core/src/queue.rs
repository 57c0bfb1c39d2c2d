//! Bounded trajectory queue between the planner and the executor.
//!
//! The queue is a pre-allocated [`heapless::spsc::Queue`] split into a
//! producer half ([`QueueProducer`], non-RT) and a consumer half
//! ([`QueueConsumer`], RT). The producer keeps a lookahead window of
//! unpublished segments whose velocities it may still change; once a
//! segment is published it is immutable to the producer.
//!
//! Aborts are epoch based: every published segment is stamped with the
//! epoch it was published in and the consumer discards anything stamped
//! with an older epoch.

pub mod segment;

use heapless::Vec;
use heapless::spsc::{Consumer, Producer, Queue};
use motion_common::error::{Infeasible, MotionError};
use motion_common::geometry::Cartesian;
use tracing::{debug, warn};

use crate::control::MotionControl;
use crate::executor::STOPPED_VELOCITY;
use crate::planner::lookahead::{WINDOW_SLOTS, replan};
use segment::{Segment, SegmentEvent, SegmentId};

pub use segment::{SegmentSample, SegmentState, Termination};

/// Owner of the ring storage. Split it once into its two halves.
pub struct TrajectoryQueue<const N: usize> {
    ring: Queue<Segment, N>,
    control: MotionControl,
}

impl<const N: usize> TrajectoryQueue<N> {
    pub fn new(control: MotionControl) -> Self {
        Self {
            ring: Queue::new(),
            control,
        }
    }

    /// Number of segments the ring can hold.
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    pub fn control(&self) -> &MotionControl {
        &self.control
    }

    /// Split into producer and consumer halves.
    ///
    /// `lookahead_depth` is clamped to `1..=MAX_LOOKAHEAD`.
    pub fn split(&mut self, lookahead_depth: usize) -> (QueueProducer<'_, N>, QueueConsumer<'_, N>) {
        let epoch = self.control.epoch();
        self.control.publish_planning_scale(1.0);
        self.control.publish_runway_end(f64::INFINITY);
        let (tx, rx) = self.ring.split();
        let producer = QueueProducer {
            ring: tx,
            window: Vec::new(),
            depth: lookahead_depth.clamp(1, WINDOW_SLOTS - 1),
            tail_velocity: 0.0,
            published_length: 0.0,
            feed_cap: 1.0,
            epoch,
            control: self.control.clone(),
        };
        let consumer = QueueConsumer {
            ring: rx,
            active: None,
            next: None,
            epoch,
            discarded: 0,
        };
        (producer, consumer)
    }
}

// ─── Producer ───────────────────────────────────────────────────────

/// Producer half: lookahead window plus the ring's write end.
pub struct QueueProducer<'q, const N: usize> {
    ring: Producer<'q, Segment, N>,
    window: Vec<Segment, WINDOW_SLOTS>,
    depth: usize,
    /// End velocity of the last published segment.
    tail_velocity: f64,
    /// Path length published in this epoch.
    published_length: f64,
    /// Planning velocity scale in (0, 1].
    feed_cap: f64,
    epoch: u32,
    control: MotionControl,
}

impl<const N: usize> QueueProducer<'_, N> {
    /// Append `segment` to the lookahead window and re-plan.
    ///
    /// Publishes the oldest window entry once the window exceeds its depth.
    ///
    /// # Errors
    ///
    /// - [`MotionError::QueueFull`] when the window is full and the ring has
    ///   no free slot. Nothing is modified.
    /// - [`MotionError::Infeasible`] when the window cannot be re-planned
    ///   with the new segment. The segment is not queued.
    pub fn enqueue(&mut self, segment: Segment) -> Result<(), MotionError> {
        self.enqueue_all([segment])
    }

    /// Queue several segments as one unit: either all of them enter the
    /// window or none does.
    ///
    /// # Errors
    ///
    /// As [`enqueue`](Self::enqueue). On [`MotionError::QueueFull`] the
    /// window is untouched; on a re-plan failure none of `segments` stays
    /// queued.
    pub fn enqueue_all<const M: usize>(&mut self, segments: [Segment; M]) -> Result<(), MotionError> {
        self.sync_epoch();
        if M == 0 {
            return Ok(());
        }
        if M > WINDOW_SLOTS || self.room() < M {
            return Err(MotionError::QueueFull);
        }
        // Make space for the whole group before touching the plan.
        while self.window.len() + M > WINDOW_SLOTS {
            self.publish_front()?;
        }
        let kept = self.window.len();
        let first = segments[0].id();
        for segment in segments {
            if self.window.push(segment).is_err() {
                self.window.truncate(kept);
                return Err(MotionError::QueueFull);
            }
        }
        // replan leaves the window untouched on error, so truncating drops
        // exactly the new group.
        if let Err(e) = replan(&mut self.window, self.tail_velocity, self.feed_cap) {
            self.window.truncate(kept);
            warn!("segment {first} rejected by lookahead: {e}");
            return Err(e.into());
        }
        while self.window.len() > self.depth {
            self.publish_front()?;
        }
        Ok(())
    }

    /// Publish every window segment (program end or interpreter idle).
    ///
    /// Returns the number of segments published. On
    /// [`MotionError::QueueFull`] the unpublished rest stays in the window
    /// and the call may be repeated.
    pub fn drain(&mut self) -> Result<usize, MotionError> {
        self.sync_epoch();
        let mut published = 0;
        while !self.window.is_empty() {
            self.publish_front()?;
            published += 1;
        }
        Ok(published)
    }

    /// Scale the velocity cap of every unpublished segment by `scale`.
    ///
    /// The scale is absolute (it replaces the previous one) and also
    /// applies to segments enqueued later. Published segments keep their
    /// plan here, so the window entry velocity stays fixed; the executor
    /// re-solves them under the new scale when it starts them.
    ///
    /// # Errors
    ///
    /// [`Infeasible::InvalidLimits`] unless `0 < scale ≤ 1`; any re-plan
    /// failure, in which case the previous scale stays in effect.
    pub fn apply_feed_scale(&mut self, scale: f64) -> Result<(), Infeasible> {
        if !(scale > 0.0 && scale <= 1.0) {
            return Err(Infeasible::InvalidLimits("planning feed scale must be in (0, 1]"));
        }
        self.sync_epoch();
        let previous = self.feed_cap;
        self.feed_cap = scale;
        match replan(&mut self.window, self.tail_velocity, scale) {
            Ok(changed) => {
                self.control.publish_planning_scale(scale);
                debug!("feed scale {scale}: {changed} segment(s) re-planned");
                Ok(())
            }
            Err(e) => {
                self.feed_cap = previous;
                Err(e)
            }
        }
    }

    /// Drop the window if an abort happened since the last call.
    ///
    /// Returns `true` when the epoch changed.
    pub fn sync_epoch(&mut self) -> bool {
        let epoch = self.control.epoch();
        if epoch == self.epoch {
            return false;
        }
        if !self.window.is_empty() {
            debug!(
                "epoch {epoch}: dropping {} unpublished segment(s)",
                self.window.len()
            );
        }
        self.window.clear();
        self.tail_velocity = 0.0;
        self.published_length = 0.0;
        self.control.publish_runway_end(f64::INFINITY);
        self.epoch = epoch;
        true
    }

    /// Whether [`enqueue`](Self::enqueue) has room for one more segment.
    #[inline]
    pub fn can_accept(&self) -> bool {
        self.window.len() < self.depth || self.ring.ready()
    }

    /// Segments that can be enqueued before the next [`MotionError::QueueFull`].
    #[inline]
    pub fn room(&self) -> usize {
        self.depth.saturating_sub(self.window.len()) + (N - 1).saturating_sub(self.ring.len())
    }

    /// Unpublished segments in the window.
    #[inline]
    pub fn pending(&self) -> &[Segment] {
        &self.window
    }

    /// Segments in the ring (published, not yet taken by the consumer).
    #[inline]
    pub fn published(&self) -> usize {
        self.ring.len()
    }

    #[inline]
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    #[inline]
    pub fn control(&self) -> &MotionControl {
        &self.control
    }

    fn publish_front(&mut self) -> Result<(), MotionError> {
        if self.window.is_empty() {
            return Ok(());
        }
        if !self.ring.ready() {
            return Err(MotionError::QueueFull);
        }
        let mut segment = self.window.remove(0);
        segment.stamp(self.epoch);
        let id = segment.id();
        let end_velocity = segment.end_velocity();
        let length = segment.geometry().length();
        match self.ring.enqueue(segment) {
            Ok(()) => {
                self.tail_velocity = end_velocity;
                self.published_length += length;
                // A tail that does not stop by itself needs its successor in
                // time; tell the executor how far the published path goes.
                let runway_end = if end_velocity > STOPPED_VELOCITY {
                    self.published_length
                } else {
                    f64::INFINITY
                };
                self.control.publish_runway_end(runway_end);
                debug!("published segment {id} (vf = {end_velocity:.3})");
                Ok(())
            }
            Err(segment) => {
                let _ = self.window.insert(0, segment);
                Err(MotionError::QueueFull)
            }
        }
    }
}

// ─── Consumer ───────────────────────────────────────────────────────

/// A segment that finished and left the queue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Completed {
    pub id: SegmentId,
    /// Path length of the segment.
    pub length: f64,
    pub end_velocity: f64,
    pub end_pose: Cartesian,
    /// Parametric time past the profile end, carried into the successor.
    pub overshoot: f64,
}

/// What a [`QueueConsumer::flush`] removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flushed {
    pub active: Option<SegmentId>,
    pub staged: Option<SegmentId>,
    /// Ring entries dropped without being started.
    pub dropped: usize,
}

/// Consumer half: the active segment, its staged successor and the ring's
/// read end. Every method runs in bounded time and never allocates.
pub struct QueueConsumer<'q, const N: usize> {
    ring: Consumer<'q, Segment, N>,
    active: Option<Segment>,
    next: Option<Segment>,
    epoch: u32,
    discarded: u64,
}

impl<const N: usize> QueueConsumer<'_, N> {
    /// Take published segments into the active and staged slots,
    /// discarding entries stamped with a stale epoch.
    pub fn refill(&mut self) {
        for _ in 0..N {
            if self.active.is_some() && self.next.is_some() {
                return;
            }
            let Some(segment) = self.ring.dequeue() else {
                return;
            };
            if segment.epoch() != self.epoch {
                self.discarded += 1;
                continue;
            }
            if self.active.is_none() {
                self.active = Some(segment);
            } else {
                self.next = Some(segment);
            }
        }
    }

    #[inline]
    pub fn peek_active(&self) -> Option<&Segment> {
        self.active.as_ref()
    }

    #[inline]
    pub fn peek_next(&self) -> Option<&Segment> {
        self.next.as_ref()
    }

    #[inline]
    pub(crate) fn active_mut(&mut self) -> Option<&mut Segment> {
        self.active.as_mut()
    }

    /// Remove the active segment if its profile has run out and promote
    /// the staged successor.
    pub fn advance_if_done(&mut self) -> Option<Completed> {
        if !self.active.as_ref().is_some_and(Segment::is_finished) {
            return None;
        }
        let mut done = self.active.take()?;
        let _ = done.handle_event(SegmentEvent::Complete);
        self.active = self.next.take();
        self.refill();
        Some(Completed {
            id: done.id(),
            length: done.geometry().length(),
            end_velocity: done.end_velocity(),
            end_pose: done.geometry().end_point(),
            overshoot: done.overshoot(),
        })
    }

    /// Cancel the active and staged segments and empty the ring.
    ///
    /// Later refills accept only segments stamped with `epoch`.
    pub fn flush(&mut self, epoch: u32) -> Flushed {
        let mut flushed = Flushed::default();
        if let Some(mut segment) = self.active.take() {
            let _ = segment.handle_event(SegmentEvent::Cancel);
            flushed.active = Some(segment.id());
        }
        if let Some(mut segment) = self.next.take() {
            let _ = segment.handle_event(SegmentEvent::Cancel);
            flushed.staged = Some(segment.id());
        }
        for _ in 0..N {
            if self.ring.dequeue().is_none() {
                break;
            }
            flushed.dropped += 1;
        }
        self.epoch = epoch;
        flushed
    }

    /// Segments held by the consumer plus those waiting in the ring.
    pub fn len(&self) -> usize {
        self.active.is_some() as usize + self.next.is_some() as usize + self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Stale segments dropped by refills since creation.
    #[inline]
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}
