//! # Motion Core
//!
//! Simulation driver: loads the motion configuration and a command program,
//! plans the program on a producer thread and executes it on the calling
//! thread at the configured tick rate. Setpoint events are logged.
//!
//! Ctrl-C aborts the motion and shuts down.

use std::error::Error;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use motion_common::command::Program;
use motion_common::consts::{DEFAULT_CONFIG_PATH, QUEUE_SLOTS};
use motion_common::error::MotionError;
use motion_common::setpoint::Setpoint;
use motion_common::config::LogLevel;
use motion_core::config::{LoadedConfig, load_config, load_program};
use motion_core::cycle::{CycleRunner, MonotonicTicks, SetpointSink, rt_setup};
use motion_core::{Executor, Kinematics, MotionControl, SegmentPlanner, TrajectoryQueue};
use tracing::{Level, debug, error, info, trace, warn};
use tracing_subscriber::EnvFilter;

/// Producer back-off while the queue is full.
const RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// Motion Core: jerk-limited trajectory planning and execution
#[derive(Parser, Debug)]
#[command(name = "motion_core")]
#[command(version)]
#[command(about = "Plan and execute a motion program in real time")]
struct Args {
    /// Motion configuration TOML.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Command program TOML.
    #[arg(long, default_value = "config/program.toml")]
    program: PathBuf,

    /// CPU core to pin the tick thread to (default: 1).
    #[arg(long, default_value_t = 1)]
    cpu_core: usize,

    /// SCHED_FIFO priority (default: 80).
    #[arg(long, default_value_t = 80)]
    rt_priority: i32,

    /// Stop after this many ticks.
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    // The log level comes from the config, so it is read before tracing is up.
    let loaded = match load_config(&args.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("FATAL: {}: {e}", args.config.display());
            process::exit(1);
        }
    };
    setup_tracing(&args, loaded.motion.shared.log_level);

    info!("Motion Core v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args, loaded) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("Motion Core shutdown complete");
}

fn run(args: &Args, loaded: LoadedConfig) -> Result<(), Box<dyn Error>> {
    let program = load_program(&args.program)?;
    let trajectory = &loaded.motion.trajectory;
    info!(
        "service '{}': {} commands from {}",
        loaded.motion.shared.service_name,
        program.commands.len(),
        args.program.display()
    );

    let control = MotionControl::new(trajectory.start_position);
    let mut queue: TrajectoryQueue<QUEUE_SLOTS> = TrajectoryQueue::new(control.clone());
    let (producer, consumer) = queue.split(trajectory.lookahead_depth);
    let mut planner = SegmentPlanner::new(trajectory, &loaded.motion.axes, loaded.kinematics, producer);
    let executor = Executor::new(trajectory, &loaded.motion.axes, loaded.kinematics, control.clone())?;

    let stop = AtomicBool::new(false);
    let program_done = AtomicBool::new(false);
    let handler_control = control.clone();
    // The handler outlives this frame, so it gets its own flag.
    let interrupted = std::sync::Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal, aborting motion");
        handler_control.abort();
        flag.store(true, Ordering::SeqCst);
    })?;

    let ticks = MonotonicTicks::new(trajectory.cycle_time_us as i64 * 1000);
    let mut runner = CycleRunner::new(executor, consumer, ticks, TraceSink::default());

    let outcome = std::thread::scope(|s| {
        let feeder = s.spawn(|| {
            let result = feed_program(&mut planner, &program, &stop);
            program_done.store(true, Ordering::Release);
            result
        });

        // After the spawn, so the feeder keeps normal scheduling.
        let result = rt_setup(args.cpu_core, args.rt_priority).and_then(|()| {
            info!(
                "RT setup complete (cpu_core={}, priority={})",
                args.cpu_core, args.rt_priority
            );
            runner.run_until(args.max_ticks, |r| {
                if interrupted.load(Ordering::SeqCst) {
                    stop.store(true, Ordering::Release);
                }
                stop.load(Ordering::Acquire)
                    || (program_done.load(Ordering::Acquire) && r.is_idle())
            })
        });
        stop.store(true, Ordering::Release);

        let fed = feeder.join();
        (result, fed)
    });

    let stats = runner.stats();
    info!(
        "{} ticks: worst {}ns, worst latency {}ns, {} overruns",
        stats.ticks, stats.worst_tick_ns, stats.worst_latency_ns, stats.overruns
    );
    info!(
        "final pose {:?}, {} sync events",
        runner.executor().hold_pose(),
        runner.sink().events
    );

    match outcome {
        (Err(e), _) => Err(e.into()),
        (Ok(_), Ok(Err(e))) => Err(e.into()),
        (Ok(_), Err(_)) => Err("program feeder panicked".into()),
        (Ok(_), Ok(Ok(planned))) => {
            info!("{planned}/{} commands planned", program.commands.len());
            Ok(())
        }
    }
}

/// Plan every command, retrying on backpressure, then publish the rest of
/// the window. Returns the number of commands planned.
fn feed_program<K: Kinematics, const N: usize>(
    planner: &mut SegmentPlanner<'_, K, N>,
    program: &Program,
    stop: &AtomicBool,
) -> Result<usize, MotionError> {
    let mut planned = 0;
    let mut failure = None;
    'commands: for (index, command) in program.commands.iter().enumerate() {
        loop {
            if stop.load(Ordering::Acquire) {
                return Ok(planned);
            }
            match planner.plan(command) {
                Ok(id) => {
                    debug!("command {index} ({}) → segment {id:?}", command.kind());
                    planned += 1;
                    break;
                }
                Err(MotionError::QueueFull) => std::thread::sleep(RETRY_INTERVAL),
                Err(e) => {
                    error!("command {index} ({}) rejected: {e}", command.kind());
                    failure = Some(e);
                    break 'commands;
                }
            }
        }
    }

    // Execute what was planned before any rejection.
    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }
        match planner.drain() {
            Ok(published) => {
                debug!("program end: published {published} segment(s)");
                break;
            }
            Err(MotionError::QueueFull) => std::thread::sleep(RETRY_INTERVAL),
            Err(e) => {
                warn!("drain failed: {e}");
                failure.get_or_insert(e);
                break;
            }
        }
    }
    match failure {
        Some(e) => Err(e),
        None => Ok(planned),
    }
}

/// Logs sync events and traces the commanded pose.
#[derive(Debug, Default)]
struct TraceSink {
    events: u64,
}

impl SetpointSink for TraceSink {
    fn write(&mut self, setpoint: &Setpoint) {
        for event in &setpoint.events {
            self.events += 1;
            info!("tick {}: {event:?}", setpoint.tick);
        }
        trace!(
            "tick {}: segment {:?} pose {:?} v {:.3}",
            setpoint.tick, setpoint.segment, setpoint.pose, setpoint.path_velocity
        );
    }
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let filter = if args.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(configured.as_directive()))
    };

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
