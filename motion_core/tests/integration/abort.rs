//! Abort semantics: hold within one tick and restart from the hold pose.

use super::*;

#[test]
fn abort_holds_on_the_tick_it_is_seen() {
    let run = run(&trajectory(), &[line(100.0, 0.0, 0.0, None)], 5_000, |tick, control| {
        if tick == 1_000 {
            control.abort();
        }
    });
    let aborted = 999;
    let before = &run.setpoints[aborted - 1];
    let after = &run.setpoints[aborted];
    assert_eq!(before.segment, Some(1));
    assert_eq!(after.segment, None);
    assert_eq!(after.pose, before.pose);
    assert!(after.events.contains(&SyncEvent::SegmentCancelled { id: 1 }));
    assert!(run.setpoints[aborted..].iter().all(|sp| sp.segment.is_none()));
    assert!(run.tick_of(&SyncEvent::SegmentCompleted { id: 1 }).is_none());
    assert!(run.control.is_settled());
    assert_eq!(run.control.executing_id(), None);
    assert_eq!(run.control.hold_pose(), before.pose);
}

#[test]
fn abort_cancels_queued_segments_too() {
    let commands = [
        line(30.0, 0.0, 0.0, Some(0.5)),
        line(30.0, 30.0, 0.0, Some(0.5)),
        line(0.0, 30.0, 0.0, None),
    ];
    let run = run(&trajectory(), &commands, 10_000, |tick, control| {
        if tick == 300 {
            control.abort();
        }
    });
    assert!(run.tick_of(&SyncEvent::SegmentCancelled { id: 1 }).is_some());
    assert!(run.tick_of(&SyncEvent::SegmentStarted { id: 2 }).is_none());
    assert!(run.tick_of(&SyncEvent::SegmentStarted { id: 3 }).is_none());
    assert_eq!(run.last().pose, run.setpoints[298].pose);
}

#[test]
fn planner_restarts_from_hold_pose_after_abort() {
    let trajectory = trajectory();
    let axes = axes();
    let control = MotionControl::new(Cartesian::ZERO);
    let mut queue: TrajectoryQueue<QUEUE_SLOTS> = TrajectoryQueue::new(control.clone());
    let (tx, mut rx) = queue.split(4);
    let mut planner = SegmentPlanner::new(&trajectory, &axes, TrivialKinematics, tx);
    let mut executor = Executor::new(&trajectory, &axes, TrivialKinematics, control.clone()).unwrap();
    let mut setpoint = Setpoint::new(3);

    planner.plan(&line(100.0, 0.0, 0.0, None)).unwrap();
    planner.drain().unwrap();
    for _ in 0..800 {
        executor.tick(&mut rx, &mut setpoint).unwrap();
    }

    control.abort();
    assert_eq!(
        planner.plan(&line(0.0, 50.0, 0.0, None)),
        Err(MotionError::QueueFull)
    );
    executor.tick(&mut rx, &mut setpoint).unwrap();
    let hold = control.hold_pose();
    assert!(hold.x > 0.0 && hold.x < 100.0);

    planner.plan(&line(0.0, 50.0, 0.0, None)).unwrap();
    planner.drain().unwrap();
    let mut started = false;
    for _ in 0..10_000 {
        executor.tick(&mut rx, &mut setpoint).unwrap();
        started |= setpoint.events.contains(&SyncEvent::SegmentStarted { id: 2 });
        if started && executor.state() == ExecutorState::Idle {
            break;
        }
    }
    assert!(started);
    assert_eq!(setpoint.pose, Cartesian::new(0.0, 50.0, 0.0));
}

#[test]
fn abort_while_paused_stays_put() {
    let run = run(&trajectory(), &[line(100.0, 0.0, 0.0, None)], 5_000, |tick, control| {
        match tick {
            500 => control.pause(),
            1_100 => {
                control.abort();
            }
            1_200 => control.resume(),
            _ => {}
        }
    });
    // Stopped by tick 1000; the abort must not move it.
    let held = run.setpoints[1_000].pose;
    assert!(run.setpoints[1_000..].iter().all(|sp| sp.pose == held));
    assert_eq!(run.states[1_150], ExecutorState::Paused);
    assert_eq!(*run.states.last().unwrap(), ExecutorState::Idle);
}
