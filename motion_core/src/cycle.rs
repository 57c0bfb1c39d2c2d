//! Deterministic tick loop: wait → execute → emit.
//!
//! ## RT Setup
//! Under the `rt` feature [`rt_setup`] locks memory, prefaults the stack,
//! pins the thread to one core and switches it to `SCHED_FIFO`. Without
//! the feature it only logs that it is skipped.
//!
//! ## Tick Pacing
//! [`MonotonicTicks`] sleeps to absolute deadlines on `CLOCK_MONOTONIC`
//! (`clock_nanosleep(TIMER_ABSTIME)` under `rt`, `thread::sleep` otherwise).
//! [`SyntheticTicks`] never sleeps and is what tests and offline runs use.
//!
//! A tick that runs longer than its period is an overrun: fatal under `rt`,
//! counted in [`TickStats`] otherwise.

use std::sync::atomic::{AtomicBool, Ordering};

use motion_common::error::MotionError;
use motion_common::setpoint::Setpoint;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::executor::{Executor, ExecutorState};
use crate::kinematics::Kinematics;
use crate::queue::QueueConsumer;

/// Bytes of stack touched by [`rt_setup`].
#[cfg(feature = "rt")]
const STACK_PREFAULT_BYTES: usize = 512 * 1024;

/// Worst-case timing of the ticks run so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub ticks: u64,
    pub overruns: u64,
    /// Longest tick [ns].
    pub worst_tick_ns: i64,
    /// Latest wake-up relative to the deadline [ns].
    pub worst_latency_ns: i64,
}

// ─── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CycleError {
    /// RT system call failed.
    #[error("RT setup error: {0}")]
    RtSetup(String),

    /// Tick exceeded its budget.
    #[error("cycle overrun: {actual_ns}ns > {budget_ns}ns budget")]
    CycleOverrun { actual_ns: i64, budget_ns: i64 },

    /// The executor faulted. The output holds until `reset_fault()`.
    #[error("motion fault: {0}")]
    Fault(#[from] MotionError),
}

// ─── RT Setup ───────────────────────────────────────────────────────

/// Prepare the calling thread for the tick loop.
///
/// Call on the thread that will run [`CycleRunner::run`], before the first
/// tick.
#[cfg(feature = "rt")]
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), CycleError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::sys::mman::{MlockallFlags, mlockall};
    use nix::unistd::Pid;

    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| CycleError::RtSetup(format!("mlockall failed: {e}")))?;

    let mut stack = [0u8; STACK_PREFAULT_BYTES];
    for byte in stack.iter_mut() {
        // SAFETY: `byte` is a valid, exclusive reference into `stack`.
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&stack);

    let mut cpus = CpuSet::new();
    cpus.set(cpu_core)
        .and_then(|()| sched_setaffinity(Pid::from_raw(0), &cpus))
        .map_err(|e| CycleError::RtSetup(format!("pinning to core {cpu_core} failed: {e}")))?;

    let param = libc::sched_param {
        sched_priority: rt_priority,
    };
    // SAFETY: `param` outlives the call; pid 0 is the calling thread.
    if unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) } != 0 {
        let err = std::io::Error::last_os_error();
        return Err(CycleError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {rt_priority}) failed: {err}"
        )));
    }
    debug!("memory locked, pinned to core {cpu_core}, SCHED_FIFO {rt_priority}");
    Ok(())
}

/// Prepare the calling thread for the tick loop. Nothing to do without
/// the `rt` feature.
#[cfg(not(feature = "rt"))]
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), CycleError> {
    debug!("rt feature off: core {cpu_core} and priority {rt_priority} ignored");
    Ok(())
}

// ─── Tick Sources ───────────────────────────────────────────────────

/// Paces the tick loop.
pub trait TickSource {
    /// Tick period [ns].
    fn period_ns(&self) -> i64;

    /// Block until the next tick boundary. Returns the wake latency [ns].
    fn wait(&mut self) -> Result<i64, CycleError>;

    /// Time since the last wake [ns].
    fn elapsed_ns(&self) -> i64;

    /// Whether an overrun stops the loop.
    fn overrun_is_fatal(&self) -> bool {
        false
    }
}

/// Zero-latency ticks that never sleep. Deterministic.
#[derive(Debug, Clone)]
pub struct SyntheticTicks {
    period_ns: i64,
}

impl SyntheticTicks {
    pub const fn new(period_ns: i64) -> Self {
        Self { period_ns }
    }
}

impl TickSource for SyntheticTicks {
    fn period_ns(&self) -> i64 {
        self.period_ns
    }

    fn wait(&mut self) -> Result<i64, CycleError> {
        Ok(0)
    }

    fn elapsed_ns(&self) -> i64 {
        0
    }
}

/// Wall-clock ticks on absolute deadlines.
#[cfg(not(feature = "rt"))]
#[derive(Debug)]
pub struct MonotonicTicks {
    period: std::time::Duration,
    next_wake: Option<std::time::Instant>,
    woke: std::time::Instant,
}

#[cfg(not(feature = "rt"))]
impl MonotonicTicks {
    pub fn new(period_ns: i64) -> Self {
        Self {
            period: std::time::Duration::from_nanos(period_ns.max(0) as u64),
            next_wake: None,
            woke: std::time::Instant::now(),
        }
    }
}

#[cfg(not(feature = "rt"))]
impl TickSource for MonotonicTicks {
    fn period_ns(&self) -> i64 {
        self.period.as_nanos() as i64
    }

    fn wait(&mut self) -> Result<i64, CycleError> {
        let now = std::time::Instant::now();
        let next = self.next_wake.map_or(now, |t| t + self.period);
        if let Some(remaining) = next.checked_duration_since(now) {
            std::thread::sleep(remaining);
        }
        self.woke = std::time::Instant::now();
        self.next_wake = Some(next);
        Ok(self.woke.saturating_duration_since(next).as_nanos() as i64)
    }

    fn elapsed_ns(&self) -> i64 {
        self.woke.elapsed().as_nanos() as i64
    }
}

/// Wall-clock ticks on absolute deadlines (`clock_nanosleep`).
#[cfg(feature = "rt")]
#[derive(Debug)]
pub struct MonotonicTicks {
    period_ns: i64,
    next_wake: Option<nix::sys::time::TimeSpec>,
    woke: nix::sys::time::TimeSpec,
}

#[cfg(feature = "rt")]
impl MonotonicTicks {
    pub fn new(period_ns: i64) -> Self {
        Self {
            period_ns,
            next_wake: None,
            woke: nix::sys::time::TimeSpec::new(0, 0),
        }
    }

    fn now() -> Result<nix::sys::time::TimeSpec, CycleError> {
        nix::time::clock_gettime(nix::time::ClockId::CLOCK_MONOTONIC)
            .map_err(|e| CycleError::RtSetup(format!("clock_gettime: {e}")))
    }
}

#[cfg(feature = "rt")]
impl TickSource for MonotonicTicks {
    fn period_ns(&self) -> i64 {
        self.period_ns
    }

    fn wait(&mut self) -> Result<i64, CycleError> {
        use nix::time::{ClockId, ClockNanosleepFlags, clock_nanosleep};

        let next = match self.next_wake {
            Some(t) => timespec_add_ns(t, self.period_ns),
            None => Self::now()?,
        };
        let _ = clock_nanosleep(
            ClockId::CLOCK_MONOTONIC,
            ClockNanosleepFlags::TIMER_ABSTIME,
            &next,
        );
        self.woke = Self::now()?;
        self.next_wake = Some(next);
        Ok(timespec_diff_ns(&self.woke, &next).abs())
    }

    fn elapsed_ns(&self) -> i64 {
        Self::now().map_or(0, |now| timespec_diff_ns(&now, &self.woke))
    }

    fn overrun_is_fatal(&self) -> bool {
        true
    }
}

// ─── Setpoint Sink ──────────────────────────────────────────────────

/// Receives one setpoint per tick (the HAL side).
pub trait SetpointSink {
    fn write(&mut self, setpoint: &Setpoint);
}

impl<F: FnMut(&Setpoint)> SetpointSink for F {
    fn write(&mut self, setpoint: &Setpoint) {
        self(setpoint)
    }
}

// ─── Cycle Runner ───────────────────────────────────────────────────

/// Owns the executor, the consumer half of the queue and a pre-allocated
/// setpoint, and drives them from a [`TickSource`].
pub struct CycleRunner<'q, K: Kinematics, T: TickSource, S: SetpointSink, const N: usize> {
    executor: Executor<K>,
    consumer: QueueConsumer<'q, N>,
    setpoint: Setpoint,
    ticks: T,
    sink: S,
    stats: TickStats,
}

impl<'q, K: Kinematics, T: TickSource, S: SetpointSink, const N: usize> CycleRunner<'q, K, T, S, N> {
    pub fn new(executor: Executor<K>, consumer: QueueConsumer<'q, N>, ticks: T, sink: S) -> Self {
        let mut setpoint = Setpoint::new(executor.joint_count() as u8);
        setpoint.pose = executor.hold_pose();
        Self {
            executor,
            consumer,
            setpoint,
            ticks,
            sink,
            stats: TickStats::default(),
        }
    }

    /// Run one tick: wait for the boundary, execute, emit.
    ///
    /// The setpoint is emitted even when the executor faults; the fault is
    /// returned afterwards.
    pub fn step(&mut self) -> Result<ExecutorState, CycleError> {
        let latency_ns = self.ticks.wait()?;
        let result = self.executor.tick(&mut self.consumer, &mut self.setpoint);
        self.sink.write(&self.setpoint);

        let duration_ns = self.ticks.elapsed_ns();
        self.stats.ticks += 1;
        self.stats.worst_tick_ns = self.stats.worst_tick_ns.max(duration_ns);
        self.stats.worst_latency_ns = self.stats.worst_latency_ns.max(latency_ns);
        let budget_ns = self.ticks.period_ns();
        if duration_ns > budget_ns {
            self.stats.overruns += 1;
            if self.ticks.overrun_is_fatal() {
                error!("cycle overrun: {duration_ns}ns > {budget_ns}ns");
                return Err(CycleError::CycleOverrun {
                    actual_ns: duration_ns,
                    budget_ns,
                });
            }
        }
        Ok(result?)
    }

    /// Tick until `stop` is set or a tick fails.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<(), CycleError> {
        while !stop.load(Ordering::Acquire) {
            self.step()?;
        }
        Ok(())
    }

    /// Tick until `done` returns true, a tick fails or `max_ticks` ticks
    /// have run. Returns the number of ticks executed.
    pub fn run_until<F>(&mut self, max_ticks: Option<u64>, mut done: F) -> Result<u64, CycleError>
    where
        F: FnMut(&Self) -> bool,
    {
        let mut count = 0;
        while !done(self) {
            if max_ticks.is_some_and(|max| count >= max) {
                warn!("tick limit {count} reached");
                break;
            }
            self.step()?;
            count += 1;
        }
        Ok(count)
    }

    /// No active segment and nothing left in the ring.
    pub fn is_idle(&self) -> bool {
        self.executor.state() == ExecutorState::Idle && self.consumer.is_empty()
    }

    #[inline]
    pub fn executor(&self) -> &Executor<K> {
        &self.executor
    }

    #[inline]
    pub fn consumer(&self) -> &QueueConsumer<'q, N> {
        &self.consumer
    }

    /// Setpoint of the last tick.
    #[inline]
    pub fn setpoint(&self) -> &Setpoint {
        &self.setpoint
    }

    #[inline]
    pub fn stats(&self) -> &TickStats {
        &self.stats
    }

    #[inline]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

// ─── Time Helpers ───────────────────────────────────────────────────

#[cfg(feature = "rt")]
fn timespec_add_ns(ts: nix::sys::time::TimeSpec, ns: i64) -> nix::sys::time::TimeSpec {
    let total = ts.tv_nsec() + ns;
    let secs = ts.tv_sec() + total.div_euclid(1_000_000_000);
    nix::sys::time::TimeSpec::new(secs, total.rem_euclid(1_000_000_000))
}

#[cfg(feature = "rt")]
fn timespec_diff_ns(a: &nix::sys::time::TimeSpec, b: &nix::sys::time::TimeSpec) -> i64 {
    (a.tv_sec() - b.tv_sec()) * 1_000_000_000 + (a.tv_nsec() - b.tv_nsec())
}
