//! Corner blending through the whole pipeline.

use super::*;

fn path_velocity_at(run: &Run, event: SyncEvent) -> f64 {
    run.setpoints[run.tick_of(&event).unwrap()].path_velocity
}

#[test]
fn right_angle_corner_is_passed_without_stopping() {
    let blended = run(
        &trajectory(),
        &[line(100.0, 0.0, 0.0, Some(0.5)), line(100.0, 100.0, 0.0, None)],
        20_000,
        |_, _| {},
    );
    let exact = run(
        &trajectory(),
        &[line(100.0, 0.0, 0.0, None), line(100.0, 100.0, 0.0, None)],
        20_000,
        |_, _| {},
    );
    assert!(blended.errors.is_empty());
    assert!(path_velocity_at(&blended, SyncEvent::SegmentCompleted { id: 1 }) > 1.0);
    assert!(path_velocity_at(&exact, SyncEvent::SegmentCompleted { id: 1 }) < 0.1);
    assert!(blended.setpoints.len() < exact.setpoints.len());
    assert_eq!(blended.last().pose, Cartesian::new(100.0, 100.0, 0.0));
}

#[test]
fn velocity_is_continuous_across_hand_offs() {
    let commands = [
        line(30.0, 0.0, 0.0, Some(0.2)),
        line(60.0, 10.0, 0.0, Some(0.2)),
        line(90.0, 0.0, 0.0, Some(0.2)),
        line(120.0, 10.0, 0.0, None),
    ];
    let run = run(&trajectory(), &commands, 20_000, |_, _| {});
    assert!(run.errors.is_empty());
    // Diagonal moves get slightly more path acceleration than one axis.
    let bound = 200.0 * std::f64::consts::SQRT_2 * DT;
    for pair in run.setpoints.windows(2) {
        let dv = pair[1].path_velocity - pair[0].path_velocity;
        assert!(dv.abs() <= bound, "jump of {dv}");
    }
    assert_eq!(run.last().pose, Cartesian::new(120.0, 10.0, 0.0));
}

#[test]
fn reversal_comes_to_rest() {
    let run = run(
        &trajectory(),
        &[line(50.0, 0.0, 0.0, Some(1.0)), line(0.0, 0.0, 0.0, Some(1.0))],
        20_000,
        |_, _| {},
    );
    assert!(run.errors.is_empty());
    assert!(path_velocity_at(&run, SyncEvent::SegmentCompleted { id: 1 }) < 0.1);
    assert_eq!(run.last().pose, Cartesian::ZERO);
}

#[test]
fn collinear_segments_cruise_through() {
    let run = run(
        &trajectory(),
        &[line(100.0, 0.0, 0.0, Some(0.1)), line(200.0, 0.0, 0.0, None)],
        20_000,
        |_, _| {},
    );
    assert!(run.errors.is_empty());
    assert!(path_velocity_at(&run, SyncEvent::SegmentCompleted { id: 1 }) > 49.9);
    // One 200 mm move: 4 + 0.25 + 0.1 s.
    let total = (run.ticks_on(1) + run.ticks_on(2)) as f64 * DT;
    assert_close(total, 4.35, 3.0 * DT);
    let peak = run.setpoints.iter().map(|sp| sp.path_velocity).fold(0.0, f64::max);
    assert!(peak <= 50.0 + 1e-6);
}
