//! Shared harness: plan a command list, then tick the executor until it
//! goes idle, recording every setpoint.

mod abort;
mod blending;
mod feed;
mod program_run;

use motion_common::command::MotionCommand;
use motion_common::config::{AxesConfig, AxisLimits, TrajectoryConfig};
use motion_common::consts::QUEUE_SLOTS;
use motion_common::error::MotionError;
use motion_common::geometry::Cartesian;
use motion_common::setpoint::{Setpoint, SyncEvent};
use motion_core::{Executor, ExecutorState, MotionControl, SegmentPlanner, TrajectoryQueue, TrivialKinematics};

/// Tick period of the default configuration [s].
pub const DT: f64 = 0.001;

/// No ramp bound on feed decreases beyond the path limits.
pub fn trajectory() -> TrajectoryConfig {
    TrajectoryConfig {
        feed_ramp_rate: 0.0,
        ..TrajectoryConfig::default()
    }
}

/// Every axis: 50 mm/s, 200 mm/s², 2000 mm/s³, ±1000 mm travel.
pub fn axes() -> AxesConfig {
    let mut limits = AxisLimits::new(50.0, 200.0, 2000.0);
    limits.min_position = -1000.0;
    limits.max_position = 1000.0;
    AxesConfig::uniform(limits)
}

pub fn line(x: f64, y: f64, z: f64, tolerance: Option<f64>) -> MotionCommand {
    MotionCommand::Line {
        end: Cartesian::new(x, y, z),
        feed_rate: 50.0,
        blend_tolerance: tolerance,
    }
}

/// Everything one run produced, one entry per tick.
pub struct Run {
    pub setpoints: Vec<Setpoint>,
    pub states: Vec<ExecutorState>,
    pub errors: Vec<MotionError>,
    pub control: MotionControl,
}

impl Run {
    pub fn last(&self) -> &Setpoint {
        &self.setpoints[self.setpoints.len() - 1]
    }

    /// Index of the first tick whose events contain `event`.
    pub fn tick_of(&self, event: &SyncEvent) -> Option<usize> {
        self.setpoints.iter().position(|sp| sp.events.contains(event))
    }

    /// Ticks that produced a setpoint for segment `id`.
    pub fn ticks_on(&self, id: u64) -> usize {
        self.setpoints
            .iter()
            .filter(|sp| sp.segment == Some(id))
            .count()
    }

    pub fn events(&self) -> impl Iterator<Item = &SyncEvent> {
        self.setpoints.iter().flat_map(|sp| sp.events.iter())
    }
}

/// Plan `commands` up front, then tick until idle or `max_ticks`.
///
/// `hook` runs before every tick with the 1-based tick number and may drive
/// the control surface.
pub fn run<F>(trajectory: &TrajectoryConfig, commands: &[MotionCommand], max_ticks: u64, mut hook: F) -> Run
where
    F: FnMut(u64, &MotionControl),
{
    let axes = axes();
    let control = MotionControl::new(trajectory.start_position);
    let mut queue: TrajectoryQueue<QUEUE_SLOTS> = TrajectoryQueue::new(control.clone());
    let (tx, mut rx) = queue.split(trajectory.lookahead_depth);
    let mut planner = SegmentPlanner::new(trajectory, &axes, TrivialKinematics, tx);
    for command in commands {
        planner.plan(command).unwrap();
    }
    planner.drain().unwrap();

    let mut executor = Executor::new(trajectory, &axes, TrivialKinematics, control.clone()).unwrap();
    let mut setpoint = Setpoint::new(3);
    let mut out = Run {
        setpoints: Vec::new(),
        states: Vec::new(),
        errors: Vec::new(),
        control: control.clone(),
    };
    for tick in 1..=max_ticks {
        hook(tick, &control);
        let result = executor.tick(&mut rx, &mut setpoint);
        out.setpoints.push(setpoint.clone());
        out.states.push(executor.state());
        if let Err(e) = result {
            out.errors.push(e);
        }
        if executor.state() == ExecutorState::Idle && rx.is_empty() {
            break;
        }
    }
    out
}

pub fn assert_close(a: f64, b: f64, tol: f64) {
    assert!((a - b).abs() <= tol, "{a} != {b} (±{tol})");
}
