//! Whole programs from commands to setpoints.

use super::*;
use motion_common::command::{ArcDirection, Plane};

#[test]
fn rest_to_rest_line_matches_closed_form() {
    let run = run(&trajectory(), &[line(100.0, 0.0, 0.0, None)], 5_000, |_, _| {});
    assert!(run.errors.is_empty());
    // T = pf/v + v/a + a/j = 2 + 0.25 + 0.1.
    let ticks = run.ticks_on(1) as f64 * DT;
    assert_close(ticks, 2.35, 2.0 * DT);
    assert_eq!(run.last().pose, Cartesian::new(100.0, 0.0, 0.0));

    let peak = run
        .setpoints
        .iter()
        .map(|sp| sp.path_velocity)
        .fold(0.0, f64::max);
    assert!(peak <= 50.0 + 1e-6);
    assert!(peak > 49.99);
    for pair in run.setpoints.windows(2) {
        let dv = pair[1].path_velocity - pair[0].path_velocity;
        assert!(dv.abs() <= 200.0 * DT * (1.0 + 1e-6) + 1e-9);
    }
}

#[test]
fn square_with_exact_stops_returns_home() {
    let commands = [
        line(50.0, 0.0, 0.0, None),
        line(50.0, 50.0, 0.0, None),
        line(0.0, 50.0, 0.0, None),
        line(0.0, 0.0, 0.0, None),
    ];
    let run = run(&trajectory(), &commands, 20_000, |_, _| {});
    assert!(run.errors.is_empty());
    assert_eq!(run.last().pose, Cartesian::ZERO);

    let lifecycle: Vec<&SyncEvent> = run.events().collect();
    let expected: Vec<SyncEvent> = (1..=4)
        .flat_map(|id| [SyncEvent::SegmentStarted { id }, SyncEvent::SegmentCompleted { id }])
        .collect();
    assert_eq!(lifecycle.len(), expected.len());
    for (seen, want) in lifecycle.iter().zip(&expected) {
        assert_eq!(*seen, want);
    }
    for id in 1..=4 {
        let done = run.tick_of(&SyncEvent::SegmentCompleted { id }).unwrap();
        assert!(run.setpoints[done].path_velocity < 0.1);
    }
}

#[test]
fn outputs_fire_when_next_motion_starts() {
    let commands = [
        line(10.0, 0.0, 0.0, None),
        MotionCommand::DigitalOutput { index: 3, on: true },
        MotionCommand::AnalogOutput { index: 0, value: 2.5 },
        line(20.0, 0.0, 0.0, None),
    ];
    let run = run(&trajectory(), &commands, 10_000, |_, _| {});
    let start = run.tick_of(&SyncEvent::SegmentStarted { id: 2 }).unwrap();
    assert_eq!(
        run.tick_of(&SyncEvent::DigitalOutput { index: 3, on: true }),
        Some(start)
    );
    let events = &run.setpoints[start].events;
    let started = events
        .iter()
        .position(|e| *e == SyncEvent::SegmentStarted { id: 2 })
        .unwrap();
    assert_eq!(events[started + 1], SyncEvent::DigitalOutput { index: 3, on: true });
    assert_eq!(events[started + 2], SyncEvent::AnalogOutput { index: 0, value: 2.5 });
    assert!(start >= run.tick_of(&SyncEvent::SegmentCompleted { id: 1 }).unwrap());
}

#[test]
fn trailing_output_fires_at_program_end() {
    let commands = [
        line(10.0, 0.0, 0.0, None),
        MotionCommand::DigitalOutput { index: 1, on: false },
    ];
    let run = run(&trajectory(), &commands, 10_000, |_, _| {});
    let completed = run.tick_of(&SyncEvent::SegmentCompleted { id: 1 }).unwrap();
    let fired = run
        .tick_of(&SyncEvent::DigitalOutput { index: 1, on: false })
        .unwrap();
    assert!(fired >= completed);
    assert_eq!(run.last().pose, Cartesian::new(10.0, 0.0, 0.0));
}

#[test]
fn dwell_holds_position() {
    let commands = [
        line(10.0, 0.0, 0.0, None),
        MotionCommand::Dwell { seconds: 0.5 },
        line(20.0, 0.0, 0.0, None),
    ];
    let run = run(&trajectory(), &commands, 10_000, |_, _| {});
    assert!(run.errors.is_empty());
    assert_close(run.ticks_on(2) as f64 * DT, 0.5, 2.0 * DT);
    for sp in run.setpoints.iter().filter(|sp| sp.segment == Some(2)) {
        assert_eq!(sp.pose, Cartesian::new(10.0, 0.0, 0.0));
        assert_eq!(sp.path_velocity, 0.0);
    }
    assert_eq!(run.last().pose, Cartesian::new(20.0, 0.0, 0.0));
}

#[test]
fn arc_stays_on_its_circle() {
    let arc = MotionCommand::Arc {
        end: Cartesian::new(20.0, 0.0, 0.0),
        center: Cartesian::new(10.0, 0.0, 0.0),
        plane: Plane::Xy,
        direction: ArcDirection::Ccw,
        turns: 0,
        feed_rate: 50.0,
        blend_tolerance: None,
    };
    let run = run(&trajectory(), &[arc], 10_000, |_, _| {});
    assert!(run.errors.is_empty());
    let center = Cartesian::new(10.0, 0.0, 0.0);
    let mut lowest: f64 = 0.0;
    for sp in run.setpoints.iter().filter(|sp| sp.segment == Some(1)) {
        assert_close(sp.pose.distance(&center), 10.0, 1e-9);
        lowest = lowest.min(sp.pose.y);
    }
    // Counter-clockwise from 180° passes through 270°.
    assert_close(lowest, -10.0, 1e-3);
    let end = run.last().pose;
    assert_close(end.x, 20.0, 1e-9);
    assert_close(end.y, 0.0, 1e-9);
}

#[test]
fn rigid_tap_reaches_bottom_and_returns() {
    let tap = MotionCommand::RigidTap {
        bottom: Cartesian::new(0.0, 0.0, -5.0),
        feed_rate: 5.0,
    };
    let run = run(&trajectory(), &[tap], 10_000, |_, _| {});
    assert!(run.errors.is_empty());
    let deepest = run.setpoints.iter().map(|sp| sp.pose.z).fold(0.0, f64::min);
    // The reversal tick may already sample the retract.
    assert_close(deepest, -5.0, 1e-6);
    assert_eq!(run.last().pose, Cartesian::ZERO);
    for id in 1..=2 {
        assert!(run.tick_of(&SyncEvent::SegmentCompleted { id }).is_some());
    }
    let peak = run.setpoints.iter().map(|sp| sp.path_velocity).fold(0.0, f64::max);
    assert!(peak <= 5.0 + 1e-6);
}

#[test]
fn zero_length_move_is_a_no_op() {
    let commands = [line(0.0, 0.0, 0.0, None), line(5.0, 0.0, 0.0, None)];
    let run = run(&trajectory(), &commands, 10_000, |_, _| {});
    assert!(run.errors.is_empty());
    // The skipped move never got an id.
    assert!(run.tick_of(&SyncEvent::SegmentStarted { id: 1 }).is_some());
    assert!(run.tick_of(&SyncEvent::SegmentStarted { id: 2 }).is_none());
    assert_eq!(run.last().pose, Cartesian::new(5.0, 0.0, 0.0));
}
