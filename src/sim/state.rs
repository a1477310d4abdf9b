//! Per-frame rider state
//!
//! A `RiderState` is a plain value: frame N+1 is computed from a copy of
//! frame N, never by mutating shared state.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::topology::{BindingMask, PointId, Topology};
use crate::error::{Result, SimError};
use crate::math;
use crate::rules::EngineVersion;

/// One simulated point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub pos: DVec2,
    /// Position at the end of the previous frame (implicit velocity)
    pub prev: DVec2,
    /// Velocity computed by the last momentum tick
    pub vel: DVec2,
    pub friction: f64,
}

impl Point {
    /// Velocity implied by `pos - prev`
    #[inline]
    pub fn implicit_velocity(&self) -> DVec2 {
        self.pos - self.prev
    }
}

/// Stepper state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiderStatus {
    /// Rider on the sled
    Running,
    /// Rider thrown off; absorbing
    Crashed,
}

/// Everything about the rider at one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiderState {
    pub frame: u64,
    pub points: Vec<Point>,
    /// Bindings that have broken so far
    pub severed: BindingMask,
    pub crashed: bool,
    /// Engine version this state was built for
    pub version: EngineVersion,
}

impl RiderState {
    /// Frame-0 state from explicit positions and a shared launch velocity
    pub fn new(
        topology: &Topology,
        positions: &[DVec2],
        velocity: DVec2,
        version: EngineVersion,
    ) -> Result<Self> {
        if positions.len() != topology.point_count() {
            return Err(SimError::invalid_topology(format!(
                "expected {} positions, got {}",
                topology.point_count(),
                positions.len()
            )));
        }

        let points = positions
            .iter()
            .zip(topology.points())
            .map(|(&pos, def)| Point {
                pos,
                prev: pos - velocity,
                vel: velocity,
                friction: def.friction,
            })
            .collect();

        let state = Self {
            frame: 0,
            points,
            severed: BindingMask::EMPTY,
            crashed: false,
            version,
        };
        state.validate(topology)?;
        Ok(state)
    }

    /// Rest pose placed at `origin`
    pub fn spawn(
        topology: &Topology,
        origin: DVec2,
        velocity: DVec2,
        version: EngineVersion,
    ) -> Result<Self> {
        Self::new(topology, &topology.rest_pose(origin), velocity, version)
    }

    /// Frame-0 state from fully specified points
    pub fn from_points(topology: &Topology, points: Vec<Point>, version: EngineVersion) -> Result<Self> {
        let state = Self {
            frame: 0,
            points,
            severed: BindingMask::EMPTY,
            crashed: false,
            version,
        };
        state.validate(topology)?;
        Ok(state)
    }

    /// Check the state fits `topology` and holds finite numbers
    pub fn validate(&self, topology: &Topology) -> Result<()> {
        if self.points.len() != topology.point_count() {
            return Err(SimError::invalid_topology(format!(
                "state has {} points, topology has {}",
                self.points.len(),
                topology.point_count()
            )));
        }
        if self.severed.iter().any(|i| i >= topology.bindings().len()) {
            return Err(SimError::invalid_topology("severed mask names a missing binding"));
        }
        for (i, p) in self.points.iter().enumerate() {
            let finite = math::is_finite(p.pos) && math::is_finite(p.prev) && math::is_finite(p.vel);
            if !finite {
                return Err(SimError::degenerate_point(format!("point {i} is not finite")));
            }
            if !p.friction.is_finite() || p.friction < 0.0 {
                return Err(SimError::degenerate_point(format!(
                    "point {i} has friction {}",
                    p.friction
                )));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn point(&self, id: PointId) -> &Point {
        &self.points[id.index()]
    }

    /// Binding `index` has not been severed
    #[inline]
    pub fn is_active(&self, index: usize) -> bool {
        !self.severed.contains(index)
    }

    pub fn status(&self) -> RiderStatus {
        if self.crashed {
            RiderStatus::Crashed
        } else {
            RiderStatus::Running
        }
    }

    /// Mean point position
    pub fn centroid(&self) -> DVec2 {
        if self.points.is_empty() {
            return DVec2::ZERO;
        }
        let sum = self.points.iter().fold(DVec2::ZERO, |acc, p| acc + p.pos);
        sum / self.points.len() as f64
    }

    /// Mean implicit velocity
    pub fn mean_velocity(&self) -> DVec2 {
        if self.points.is_empty() {
            return DVec2::ZERO;
        }
        let sum = self
            .points
            .iter()
            .fold(DVec2::ZERO, |acc, p| acc + p.implicit_velocity());
        sum / self.points.len() as f64
    }

    /// Axis-aligned bounds of all points as (min, max)
    pub fn bounds(&self) -> (DVec2, DVec2) {
        self.points.iter().fold(
            (DVec2::splat(f64::INFINITY), DVec2::splat(f64::NEG_INFINITY)),
            |(min, max), p| (min.min(p.pos), max.max(p.pos)),
        )
    }

    pub fn is_finite(&self) -> bool {
        self.points
            .iter()
            .all(|p| math::is_finite(p.pos) && math::is_finite(p.prev))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleSet;
    use crate::sim::topology::points;

    fn topology() -> Topology {
        Topology::sled_rider(&RuleSet::default()).unwrap()
    }

    #[test]
    fn test_spawn_uses_rest_pose() {
        let topology = topology();
        let origin = DVec2::new(100.0, -20.0);
        let state =
            RiderState::spawn(&topology, origin, DVec2::new(0.4, 0.0), EngineVersion::Modern).unwrap();

        assert_eq!(state.frame, 0);
        assert_eq!(state.status(), RiderStatus::Running);
        assert_eq!(state.point(points::PEG).pos, origin);
        assert_eq!(state.point(points::NOSE).pos, origin + DVec2::new(15.0, 5.0));
        assert_eq!(state.point(points::BUTT).friction, 0.8);
        // prev = pos - velocity does not round-trip exactly away from the origin
        let velocity = state.point(points::TAIL).implicit_velocity();
        assert!(velocity.abs_diff_eq(DVec2::new(0.4, 0.0), 1e-9), "velocity {velocity}");
    }

    #[test]
    fn test_point_count_mismatch() {
        let err = RiderState::new(&topology(), &[DVec2::ZERO; 3], DVec2::ZERO, EngineVersion::Modern);
        assert!(matches!(err, Err(SimError::InvalidTopology(_))));
    }

    #[test]
    fn test_non_finite_rejected() {
        let topology = topology();
        let mut pose = topology.rest_pose(DVec2::ZERO);
        pose[4].y = f64::INFINITY;
        let err = RiderState::new(&topology, &pose, DVec2::ZERO, EngineVersion::Modern);
        assert!(matches!(err, Err(SimError::DegenerateGeometry { id: None, .. })));

        let err = RiderState::spawn(&topology, DVec2::ZERO, DVec2::new(f64::NAN, 0.0), EngineVersion::Modern);
        assert!(err.is_err());
    }

    #[test]
    fn test_centroid_and_bounds() {
        let topology = topology();
        let state = RiderState::spawn(&topology, DVec2::ZERO, DVec2::ZERO, EngineVersion::Modern).unwrap();
        let (min, max) = state.bounds();
        assert_eq!(min, DVec2::new(0.0, -5.5));
        assert_eq!(max, DVec2::new(17.5, 5.0));
        let c = state.centroid();
        assert!(c.x > min.x && c.x < max.x);
        assert_eq!(state.mean_velocity(), DVec2::ZERO);
    }
}
