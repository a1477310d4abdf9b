//! Fixed-step frame advance
//!
//! Advances a rider state by exactly one frame. Stepping never fails: invalid
//! input is rejected when states, lines and rule-sets are constructed.

use glam::DVec2;

use super::collision::{self, ContactScratch};
use super::solver;
use super::state::{Point, RiderState};
use super::topology::Topology;
use crate::math;
use crate::rules::{Pass, RuleSet};
use crate::track::TrackIndex;

/// Compute the frame after `state`
///
/// The state must have been validated against `topology`.
///
/// 1. Momentum: `vel = (pos - prev) * damping + gravity`, clamped, then moved
/// 2. `rules.iterations` rounds of `rules.passes`
/// 3. Crash check against critical bindings and joints
/// 4. Non-finite coordinates fall back to the previous frame's
pub fn step(
    state: &RiderState,
    index: &TrackIndex,
    topology: &Topology,
    rules: &RuleSet,
    scratch: &mut ContactScratch,
) -> RiderState {
    let mut next = state.clone();
    next.frame = state.frame.saturating_add(1);

    for point in &mut next.points {
        momentum(point, rules);
    }

    for _ in 0..rules.iterations {
        for pass in &rules.passes {
            match pass {
                Pass::Solve => {
                    solver::solve(&mut next.points, topology, &mut next.severed);
                }
                Pass::Collide => {
                    collision::collide(&mut next.points, index, rules, scratch);
                }
            }
        }
    }

    if !next.crashed
        && (next.severed.intersects(topology.critical()) || any_joint_inverted(&next.points, topology))
    {
        next.severed = next.severed.union(topology.critical());
        next.crashed = true;
        log::debug!("Rider crashed at frame {}", next.frame);
    }

    for (point, before) in next.points.iter_mut().zip(&state.points) {
        point.pos = math::sanitize(point.pos, before.pos);
        point.prev = math::sanitize(point.prev, before.pos);
        point.vel = math::sanitize(point.vel, DVec2::ZERO);
    }

    next
}

fn momentum(point: &mut Point, rules: &RuleSet) {
    let vel = (point.pos - point.prev) * rules.damping + rules.gravity;
    let vel = math::sanitize(math::clamp_length(vel, rules.max_velocity), DVec2::ZERO);
    point.vel = vel;
    point.prev = point.pos;
    point.pos += vel;
}

/// A joint is inverted when its second segment turns clockwise onto its first
pub fn any_joint_inverted(points: &[Point], topology: &Topology) -> bool {
    topology.joints().iter().any(|joint| {
        let a = points[joint.a.1.index()].pos - points[joint.a.0.index()].pos;
        let b = points[joint.b.1.index()].pos - points[joint.b.0.index()].pos;
        math::cross(a, b) < 0.0
    })
}

/// Step `frames` times from `state`, returning every state after the first
pub fn simulate(
    state: &RiderState,
    index: &TrackIndex,
    topology: &Topology,
    rules: &RuleSet,
    frames: usize,
) -> Vec<RiderState> {
    let mut scratch = ContactScratch::new();
    let mut out: Vec<RiderState> = Vec::with_capacity(frames);
    for _ in 0..frames {
        let next = step(out.last().unwrap_or(state), index, topology, rules, &mut scratch);
        out.push(next);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::EngineVersion;
    use crate::sim::topology::points;
    use crate::track::Line;

    fn single_point() -> Topology {
        let mut builder = Topology::builder();
        builder.point(DVec2::ZERO, 0.0);
        builder.build().unwrap()
    }

    #[test]
    fn test_free_fall_closed_form() {
        let topology = single_point();
        let rules = RuleSet::default().with_gravity(DVec2::new(0.0, 1.0));
        let state = RiderState::spawn(&topology, DVec2::ZERO, DVec2::ZERO, EngineVersion::Modern).unwrap();
        let frames = simulate(&state, &TrackIndex::new(), &topology, &rules, 10);

        for (i, frame) in frames.iter().enumerate() {
            let n = (i + 1) as f64;
            assert_eq!(frame.frame, (i + 1) as u64);
            assert_eq!(frame.points[0].pos, DVec2::new(0.0, n * (n + 1.0) / 2.0));
        }
    }

    #[test]
    fn test_step_is_deterministic() {
        let rules = RuleSet::default();
        let topology = Topology::sled_rider(&rules).unwrap();
        let index = TrackIndex::from_lines(
            [
                Line::builder().id(1).point(-50.0, 20.0).point(100.0, 60.0).build().unwrap(),
                Line::builder().id(2).point(100.0, 60.0).point(300.0, 40.0).build().unwrap(),
            ],
            14.0,
        )
        .unwrap();
        let state = RiderState::spawn(&topology, DVec2::ZERO, rules.start_velocity, rules.version).unwrap();

        let a = simulate(&state, &index, &topology, &rules, 120);
        let b = simulate(&state, &index, &topology, &rules, 120);
        assert_eq!(a, b);
    }

    #[test]
    fn test_joint_inversion_crashes() {
        let rules = RuleSet::default().with_gravity(DVec2::ZERO);
        let topology = Topology::sled_rider(&rules).unwrap();
        let mut pose = topology.rest_pose(DVec2::ZERO);
        // Mirror the upper body below the sled
        for id in [points::SHOULDER, points::LEFT_HAND, points::RIGHT_HAND] {
            pose[id.index()].y = -pose[id.index()].y;
        }
        let state = RiderState::new(&topology, &pose, DVec2::ZERO, EngineVersion::Modern).unwrap();
        assert!(any_joint_inverted(&state.points, &topology));

        let next = step(&state, &TrackIndex::new(), &topology, &rules, &mut ContactScratch::new());
        assert!(next.crashed);
        assert!(next.severed.covers(topology.critical()));
    }

    #[test]
    fn test_crash_is_absorbing() {
        let rules = RuleSet::default().with_gravity(DVec2::ZERO);
        let topology = Topology::sled_rider(&rules).unwrap();
        let mut state = RiderState::spawn(&topology, DVec2::ZERO, DVec2::ZERO, EngineVersion::Modern).unwrap();
        state.crashed = true;
        state.severed = topology.critical();

        for next in simulate(&state, &TrackIndex::new(), &topology, &rules, 20) {
            assert!(next.crashed);
            assert!(next.severed.covers(topology.critical()));
        }
    }

    #[test]
    fn test_upright_rider_does_not_crash_in_flight() {
        let rules = RuleSet::default();
        let topology = Topology::sled_rider(&rules).unwrap();
        let state = RiderState::spawn(&topology, DVec2::ZERO, rules.start_velocity, rules.version).unwrap();
        let last = simulate(&state, &TrackIndex::new(), &topology, &rules, 40).pop().unwrap();
        assert!(!last.crashed);
        assert!(last.severed.is_empty());
    }

    #[test]
    fn test_velocity_is_clamped() {
        let topology = single_point();
        let mut rules = RuleSet::default().with_gravity(DVec2::ZERO);
        rules.max_velocity = 5.0;
        let state = RiderState::spawn(&topology, DVec2::ZERO, DVec2::new(300.0, 400.0), EngineVersion::Modern).unwrap();
        let next = step(&state, &TrackIndex::new(), &topology, &rules, &mut ContactScratch::new());
        assert!((next.points[0].vel.length() - 5.0).abs() < 1e-9);
        assert!((next.points[0].pos - DVec2::new(3.0, 4.0)).length() < 1e-9);
    }

    #[test]
    fn test_overflow_stays_finite() {
        let topology = single_point();
        let rules = RuleSet::default();
        let pos = DVec2::new(1.0e308, 0.0);
        let point = Point {
            pos,
            prev: DVec2::new(-1.0e308, 0.0),
            vel: DVec2::ZERO,
            friction: 0.0,
        };
        let state = RiderState::from_points(&topology, vec![point], EngineVersion::Modern).unwrap();
        let next = step(&state, &TrackIndex::new(), &topology, &rules, &mut ContactScratch::new());
        assert!(next.is_finite());
        assert!(next.points[0].pos.x <= math::WORLD_LIMIT);
    }
}
