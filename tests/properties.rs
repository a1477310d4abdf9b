//! Property-based tests for the stepper, solver and collision pass.
//!
//! Tracks are generated from a seed with `Pcg32` so failing cases shrink to a
//! single reproducible number.
//!
//! Run with: cargo test --test properties

use glam::DVec2;
use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use trackrider::sim::collision::{ContactScratch, collide, penetration};
use trackrider::sim::{BindingMask, Point, Topology, simulate, solve};
use trackrider::{EngineVersion, Line, LineKind, RiderState, RuleSet, Track, TrackIndex};

// =============================================================================
// Generators
// =============================================================================

/// A downhill polyline with a few flipped, extended and acceleration segments
fn random_track(seed: u64) -> Vec<Line> {
    let mut rng = Pcg32::seed_from_u64(seed);
    let mut lines = Vec::new();
    let mut at = DVec2::new(-40.0, 25.0);

    for id in 0..rng.random_range(3..12u32) {
        let next = at + DVec2::new(rng.random_range(20.0..90.0), rng.random_range(-15.0..45.0));
        let kind = match rng.random_range(0..10) {
            0 => LineKind::Acceleration {
                multiplier: rng.random_range(1..4),
            },
            1 => LineKind::Scenery,
            _ => LineKind::Normal,
        };
        let line = Line::builder()
            .id(id)
            .kind(kind)
            .point_vec(at)
            .point_vec(next)
            .extended(rng.random_bool(0.5))
            .flipped(rng.random_bool(0.1))
            .build()
            .expect("segments have positive length");
        lines.push(line);
        at = next;
    }
    lines
}

fn arb_version() -> impl Strategy<Value = EngineVersion> {
    prop::sample::select(EngineVersion::ALL.to_vec())
}

fn ride(seed: u64, version: EngineVersion, frames: usize) -> Vec<RiderState> {
    let rules = RuleSet::from_version(version);
    let topology = Topology::sled_rider(&rules).unwrap();
    let index = TrackIndex::from_lines(random_track(seed), 14.0).unwrap();
    let initial = RiderState::spawn(&topology, DVec2::ZERO, rules.start_velocity, version).unwrap();
    let mut states = vec![initial.clone()];
    states.extend(simulate(&initial, &index, &topology, &rules, frames));
    states
}

// =============================================================================
// Stepper
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_stepping_is_deterministic(seed in any::<u64>(), version in arb_version()) {
        let a = ride(seed, version, 120);
        let b = ride(seed, version, 120);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn prop_cell_size_does_not_change_frames(seed in any::<u64>(), cell in 4.0..64.0f64) {
        let rules = RuleSet::default();
        let topology = Topology::sled_rider(&rules).unwrap();
        let initial = RiderState::spawn(&topology, DVec2::ZERO, rules.start_velocity, rules.version).unwrap();

        let coarse = TrackIndex::from_lines(random_track(seed), cell).unwrap();
        let fine = TrackIndex::from_lines(random_track(seed), 14.0).unwrap();
        let a = simulate(&initial, &coarse, &topology, &rules, 80);
        let b = simulate(&initial, &fine, &topology, &rules, 80);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn prop_severing_and_crashing_are_monotonic(seed in any::<u64>(), version in arb_version()) {
        let states = ride(seed, version, 200);
        let topology = Topology::sled_rider(&RuleSet::from_version(version)).unwrap();
        for pair in states.windows(2) {
            prop_assert!(pair[1].severed.covers(pair[0].severed));
            prop_assert!(!pair[0].crashed || pair[1].crashed);
            if pair[1].crashed {
                prop_assert!(pair[1].severed.covers(topology.critical()));
            }
            prop_assert_eq!(pair[1].frame, pair[0].frame + 1);
        }
    }

    #[test]
    fn prop_states_stay_finite(seed in any::<u64>(), version in arb_version()) {
        for state in ride(seed, version, 200) {
            prop_assert!(state.is_finite());
        }
    }

    #[test]
    fn prop_run_matches_direct_stepping(seed in any::<u64>(), k in 1u64..150) {
        let rules = RuleSet::default();
        let run = trackrider::Run::sled_rider(
            Track::from_lines(random_track(seed)).unwrap(),
            rules.clone(),
            DVec2::ZERO,
        )
        .unwrap();
        let direct = ride(seed, rules.version, k as usize);
        prop_assert_eq!(run.frame(k), direct[k as usize].clone());
    }
}

// =============================================================================
// Solver and collision
// =============================================================================

fn at(pos: DVec2, vel: DVec2) -> Point {
    Point {
        pos,
        prev: pos - vel,
        vel,
        friction: 0.5,
    }
}

proptest! {
    #[test]
    fn prop_stick_error_never_grows(
        ax in -50.0..50.0f64, ay in -50.0..50.0f64,
        bx in -50.0..50.0f64, by in -50.0..50.0f64,
        rest in 0.5..30.0f64,
    ) {
        let mut builder = Topology::builder();
        let a = builder.point(DVec2::ZERO, 0.0);
        let b = builder.point(DVec2::new(rest, 0.0), 0.0);
        builder.stick(a, b);
        let topology = builder.build().unwrap();

        let mut points = vec![at(DVec2::new(ax, ay), DVec2::ZERO), at(DVec2::new(bx, by), DVec2::ZERO)];
        prop_assume!(points[0].pos.distance(points[1].pos) > 1e-6);

        let mut severed = BindingMask::EMPTY;
        let mut error = (points[0].pos.distance(points[1].pos) - rest).abs();
        for _ in 0..8 {
            solve(&mut points, &topology, &mut severed);
            let next = (points[0].pos.distance(points[1].pos) - rest).abs();
            prop_assert!(next <= error + 1e-9);
            error = next;
        }
    }

    #[test]
    fn prop_collision_leaves_no_penetration(
        angle in -1.2..1.2f64,
        flipped in any::<bool>(),
        along in 0.0..1.0f64,
        depth in 0.01..9.9f64,
        speed in 0.1..9.0f64,
        drift in -3.0..3.0f64,
    ) {
        let rules = RuleSet::default();
        let dir = DVec2::new(angle.cos(), angle.sin());
        let line = Line::builder()
            .id(7)
            .point(0.0, 0.0)
            .point_vec(dir * 100.0)
            .flipped(flipped)
            .build()
            .unwrap();
        let index = TrackIndex::from_lines([line], 14.0).unwrap();

        // Start inside the solid side, moving further in
        let normal = line.normal();
        let pos = dir * (along * 100.0) - normal * depth;
        let vel = -normal * speed + dir * drift;
        let mut points = vec![at(pos, vel)];

        let contacts = collide(&mut points, &index, &rules, &mut ContactScratch::new());
        prop_assert_eq!(contacts, 1);
        prop_assert!(penetration(&line, points[0].pos) <= 1e-9);
        prop_assert!((points[0].pos - line.start).dot(dir) >= -1e-9);
    }

    #[test]
    fn prop_points_outside_thickness_are_untouched(
        depth in 10.5..40.0f64,
        x in -30.0..30.0f64,
    ) {
        let rules = RuleSet::default();
        let line = Line::builder().point(-100.0, 0.0).point(100.0, 0.0).build().unwrap();
        let index = TrackIndex::from_lines([line], 14.0).unwrap();
        let original = at(DVec2::new(x, depth), DVec2::new(0.0, 1.0));
        let mut points = vec![original];
        collide(&mut points, &index, &rules, &mut ContactScratch::new());
        prop_assert_eq!(points[0], original);
    }
}
