//! Property tests for the profile solver.

use motion_common::error::Infeasible;
use motion_core::profile::solver::{change_distance, solve_for_duration, solve_minimum_time};
use motion_core::profile::Boundary;
use proptest::prelude::*;

fn distance() -> impl Strategy<Value = f64> {
    prop_oneof![0.1..500.0_f64, -500.0..-0.1_f64]
}

fn limits() -> impl Strategy<Value = (f64, f64, f64)> {
    (1.0..200.0_f64, 10.0..2000.0_f64, 100.0..50_000.0_f64)
}

/// Moving start and end, uneven limits, and room to stop in between.
fn moving() -> impl Strategy<Value = Boundary> {
    (
        limits(),
        -100.0..100.0_f64,
        0.05..0.95_f64,
        0.05..0.95_f64,
        0.0..1.0_f64,
        0.2..5.0_f64,
        1.05..10.0_f64,
    )
        .prop_map(|((v, a, j), p0, entry, exit, reverse, braking, slack)| {
            let (v0, vf) = (entry * v, exit * v);
            let softer = a.min(a * braking);
            let room = change_distance(v0, 0.0, softer, j) + change_distance(0.0, vf, softer, j);
            Boundary {
                p0,
                pf: p0 + room * slack + 1e-3,
                v0,
                vf,
                v_max: v,
                v_min: -reverse * v,
                a_max: a,
                a_min: -braking * a,
                j_max: j,
            }
        })
}

fn boundary() -> impl Strategy<Value = Boundary> {
    prop_oneof![
        (distance(), limits()).prop_map(|(d, (v, a, j))| Boundary::rest_to_rest(0.0, d, v, a, j)),
        moving(),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn rest_to_rest_lands_within_limits(d in distance(), (v, a, j) in limits()) {
        let b = Boundary::rest_to_rest(0.0, d, v, a, j);
        let block = solve_minimum_time(&b).unwrap();
        let profile = block.profile;
        prop_assert!(profile.satisfies(&b));
        prop_assert!((profile.end().position - d).abs() <= 1e-8 * d.abs().max(1.0));
        prop_assert!(profile.end().velocity.abs() <= 1e-8 * v.max(1.0));
        let (lo, hi) = profile.velocity_range();
        prop_assert!(hi <= v * (1.0 + 1e-8) && lo >= -v * (1.0 + 1e-8));
        prop_assert!((block.t_min - profile.duration()).abs() <= 1e-9 * block.t_min.max(1.0));
    }

    #[test]
    fn stretched_profiles_take_the_requested_time(b in boundary(), k in 1.0..5.0_f64) {
        let t_min = solve_minimum_time(&b).unwrap().t_min;
        let profile = solve_for_duration(&b, t_min * k).unwrap();
        prop_assert!(profile.satisfies(&b));
        prop_assert!((profile.duration() - t_min * k).abs() <= 1e-6 * (t_min * k).max(1.0));
        let end = profile.end();
        prop_assert!((end.position - b.pf).abs() <= 1e-6 * b.pf.abs().max(1.0));
        prop_assert!((end.velocity - b.vf).abs() <= 1e-6 * b.v_max.max(1.0));
    }

    #[test]
    fn longer_durations_stay_feasible(b in boundary(), k in 1.0..3.0_f64, extra in 0.01..2.0_f64) {
        let t_min = solve_minimum_time(&b).unwrap().t_min;
        prop_assert!(solve_for_duration(&b, t_min * k).is_ok());
        let t = t_min * (k + extra);
        let longer = solve_for_duration(&b, t).unwrap();
        prop_assert!((longer.duration() - t).abs() <= 1e-6 * t.max(1.0));
        prop_assert!(longer.satisfies(&b));
    }

    #[test]
    fn minimum_duration_reproduces_the_fastest_profile(b in boundary()) {
        let block = solve_minimum_time(&b).unwrap();
        let profile = solve_for_duration(&b, block.t_min).unwrap();
        prop_assert!((profile.duration() - block.t_min).abs() <= 1e-9 * block.t_min.max(1.0));
    }

    #[test]
    fn duration_below_minimum_is_rejected(b in boundary()) {
        let t_min = solve_minimum_time(&b).unwrap().t_min;
        let err = solve_for_duration(&b, 0.9 * t_min).unwrap_err();
        let too_short = matches!(err, Infeasible::DurationTooShort { .. });
        prop_assert!(too_short);
    }

    #[test]
    fn path_with_room_to_stop_is_feasible(
        (v, a, j) in limits(),
        entry in 0.0..1.0_f64,
        slack in 1.01..10.0_f64,
    ) {
        let v0 = entry * v;
        let stop = change_distance(v0, 0.0, a, j);
        let length = stop * slack + 1e-3;
        let b = Boundary::path(length, v0, 0.0, v, a, j);
        let block = solve_minimum_time(&b).unwrap();
        prop_assert!(block.profile.satisfies(&b));
        prop_assert!(block.profile.velocity_range().0 >= -1e-8 * v.max(1.0));
    }

    #[test]
    fn path_too_short_to_stop_is_infeasible(
        (v, a, j) in limits(),
        entry in 0.2..1.0_f64,
        fraction in 0.05..0.5_f64,
    ) {
        let v0 = entry * v;
        let length = change_distance(v0, 0.0, a, j) * fraction;
        let b = Boundary::path(length, v0, 0.0, v, a, j);
        prop_assert_eq!(solve_minimum_time(&b).map(|block| block.t_min), Err(Infeasible::NoFeasibleShape));
    }
}
