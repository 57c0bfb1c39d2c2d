//! Feed override and pause.

use super::*;

fn peak_velocity(run: &Run) -> f64 {
    run.setpoints.iter().map(|sp| sp.path_velocity).fold(0.0, f64::max)
}

#[test]
fn half_feed_doubles_duration() {
    let run = run(&trajectory(), &[line(100.0, 0.0, 0.0, None)], 10_000, |tick, control| {
        if tick == 1 {
            control.set_feed_scale(0.5).unwrap();
        }
    });
    assert!(run.errors.is_empty());
    assert_close(run.ticks_on(1) as f64 * DT, 4.7, 3.0 * DT);
    assert!(peak_velocity(&run) <= 25.0 + 1e-6);
    assert_eq!(run.last().pose, Cartesian::new(100.0, 0.0, 0.0));
}

#[test]
fn override_above_maximum_is_clamped() {
    let run = run(&trajectory(), &[line(100.0, 0.0, 0.0, None)], 10_000, |tick, control| {
        if tick == 1 {
            control.set_feed_scale(1.5).unwrap();
        }
    });
    assert_close(run.ticks_on(1) as f64 * DT, 2.35, 2.0 * DT);
    assert!(peak_velocity(&run) <= 50.0 + 1e-6);
}

#[test]
fn feed_headroom_keeps_overridden_motion_in_limits() {
    let trajectory = TrajectoryConfig {
        max_feed_scale: 2.0,
        ..trajectory()
    };
    let run = run(&trajectory, &[line(100.0, 0.0, 0.0, None)], 10_000, |tick, control| {
        if tick == 1 {
            control.set_feed_scale(2.0).unwrap();
        }
    });
    assert!(run.errors.is_empty());
    let peak = peak_velocity(&run);
    assert!(peak <= 50.0 + 1e-6);
    assert!(peak > 49.9);
}

#[test]
fn pause_decelerates_holds_and_resumes() {
    let trajectory = TrajectoryConfig {
        feed_ramp_rate: 4.0,
        ..trajectory()
    };
    let run = run(&trajectory, &[line(100.0, 0.0, 0.0, None)], 10_000, |tick, control| {
        match tick {
            1_000 => control.pause(),
            2_000 => control.resume(),
            _ => {}
        }
    });
    assert!(run.errors.is_empty());
    assert_eq!(run.states[1_100], ExecutorState::Pausing);
    assert_eq!(run.states[1_500], ExecutorState::Paused);
    assert_eq!(run.states[2_500], ExecutorState::Running);

    // Braking and restarting stay inside the path acceleration limit.
    let worst = run
        .setpoints
        .windows(2)
        .map(|w| ((w[1].path_velocity - w[0].path_velocity) / DT).abs())
        .fold(0.0, f64::max);
    assert!(worst <= 200.0 * (1.0 + 1e-9), "{worst}");

    let held = run.setpoints[1_450].path_position;
    assert!(run.setpoints[1_450..1_990]
        .iter()
        .all(|sp| sp.path_position == held && sp.path_velocity == 0.0));
    assert!(run.setpoints.len() > 2_350 + 1_000);
    assert_eq!(run.last().pose, Cartesian::new(100.0, 0.0, 0.0));
}

#[test]
fn rigid_tap_ignores_override() {
    let tap = [MotionCommand::RigidTap {
        bottom: Cartesian::new(0.0, 0.0, -5.0),
        feed_rate: 5.0,
    }];
    let nominal = run(&trajectory(), &tap, 10_000, |_, _| {});
    let slowed = run(&trajectory(), &tap, 10_000, |tick, control| {
        if tick == 1 {
            control.set_feed_scale(0.5).unwrap();
        }
    });
    assert_eq!(nominal.ticks_on(1), slowed.ticks_on(1));
    assert_eq!(nominal.ticks_on(2), slowed.ticks_on(2));
}
