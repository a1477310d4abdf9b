//! Rider skeleton: points, bindings and joints
//!
//! The skeleton is an arena of points addressed by [`PointId`] plus a flat
//! binding list. Bindings are solved in list order every sweep, so that order
//! is part of the physics.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::math;
use crate::rules::RuleSet;

/// Bindings are tracked in a `u64` mask
pub const MAX_BINDINGS: usize = 64;
/// Point ids are `u8`
pub const MAX_POINTS: usize = 256;

/// Index of a point within a topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointId(pub u8);

impl PointId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Point ids of the built-in sled rider
pub mod points {
    use super::PointId;

    pub const PEG: PointId = PointId(0);
    pub const TAIL: PointId = PointId(1);
    pub const NOSE: PointId = PointId(2);
    pub const ROPE: PointId = PointId(3);
    pub const BUTT: PointId = PointId(4);
    pub const SHOULDER: PointId = PointId(5);
    pub const LEFT_HAND: PointId = PointId(6);
    pub const RIGHT_HAND: PointId = PointId(7);
    pub const LEFT_FOOT: PointId = PointId(8);
    pub const RIGHT_FOOT: PointId = PointId(9);

    pub const COUNT: usize = 10;

    /// Points that touch the ground while riding
    pub const CONTACT: [PointId; 4] = [TAIL, NOSE, LEFT_FOOT, RIGHT_FOOT];
}

/// Set of binding indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BindingMask(pub u64);

impl BindingMask {
    pub const EMPTY: BindingMask = BindingMask(0);

    #[inline]
    pub fn single(index: usize) -> Self {
        debug_assert!(index < MAX_BINDINGS);
        BindingMask(1 << index)
    }

    #[inline]
    pub fn contains(self, index: usize) -> bool {
        index < MAX_BINDINGS && self.0 & (1 << index) != 0
    }

    #[inline]
    pub fn insert(&mut self, index: usize) {
        self.0 |= Self::single(index).0;
    }

    #[inline]
    pub fn union(self, other: BindingMask) -> BindingMask {
        BindingMask(self.0 | other.0)
    }

    #[inline]
    pub fn intersects(self, other: BindingMask) -> bool {
        self.0 & other.0 != 0
    }

    /// Every bit of `other` is set in `self`
    #[inline]
    pub fn covers(self, other: BindingMask) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Set indices in ascending order
    pub fn iter(self) -> impl Iterator<Item = usize> {
        (0..MAX_BINDINGS).filter(move |&i| self.contains(i))
    }
}

/// Point template: where it sits in the rest pose and how it grips
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointDef {
    /// Position in the rest pose, relative to the rider origin
    pub rest: DVec2,
    /// Friction coefficient applied on line contact
    pub friction: f64,
}

/// How a binding reacts to its length
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BindingKind {
    /// Rigid distance, never breaks
    Stick,
    /// Distance that severs past `rest_length * break_factor`
    Scarf { break_factor: f64 },
    /// Only pushes apart when closer than `rest_length`
    Repel,
}

/// Constraint between two points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub a: PointId,
    pub b: PointId,
    pub kind: BindingKind,
    pub rest_length: f64,
}

impl Binding {
    /// Distance past which a scarf severs
    #[inline]
    pub fn break_length(&self) -> Option<f64> {
        match self.kind {
            BindingKind::Scarf { break_factor } => Some(self.rest_length * break_factor),
            _ => None,
        }
    }
}

/// Orientation check between two point pairs
///
/// The rider is thrown off once `cross(a.1 - a.0, b.1 - b.0)` turns negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Joint {
    pub a: (PointId, PointId),
    pub b: (PointId, PointId),
}

/// Fixed skeleton shared by every frame of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    points: Vec<PointDef>,
    bindings: Vec<Binding>,
    joints: Vec<Joint>,
    /// Bindings that hold the rider on the sled
    critical: BindingMask,
}

impl Topology {
    pub fn builder() -> TopologyBuilder {
        TopologyBuilder::default()
    }

    /// The built-in sled and rider, with mount strength from `rules`
    pub fn sled_rider(rules: &RuleSet) -> Result<Self> {
        use points::*;

        let mut builder = Self::builder();
        let rest = [
            (DVec2::new(0.0, 0.0), 0.8),
            (DVec2::new(0.0, 5.0), 0.0),
            (DVec2::new(15.0, 5.0), 0.0),
            (DVec2::new(17.5, 0.0), 0.0),
            (DVec2::new(5.0, 0.0), 0.8),
            (DVec2::new(5.0, -5.5), 0.8),
            (DVec2::new(11.5, -5.0), 0.1),
            (DVec2::new(11.5, -5.0), 0.1),
            (DVec2::new(10.0, 5.0), 0.0),
            (DVec2::new(10.0, 5.0), 0.0),
        ];
        for (pos, friction) in rest {
            builder.point(pos, friction);
        }

        let mount = rules.mount_break_factor;

        // Sled frame
        builder.stick(PEG, TAIL);
        builder.stick(TAIL, NOSE);
        builder.stick(NOSE, ROPE);
        builder.stick(ROPE, PEG);
        builder.stick(PEG, NOSE);
        builder.stick(ROPE, TAIL);
        // Seat
        builder.mount(PEG, BUTT, mount);
        builder.mount(TAIL, BUTT, mount);
        builder.mount(NOSE, BUTT, mount);
        // Body
        builder.stick(SHOULDER, BUTT);
        builder.stick(SHOULDER, LEFT_HAND);
        builder.stick(SHOULDER, RIGHT_HAND);
        builder.stick(BUTT, LEFT_FOOT);
        builder.stick(BUTT, RIGHT_FOOT);
        // Right arm is solved twice per sweep
        builder.stick(SHOULDER, RIGHT_HAND);
        // Hands on the rope, feet on the nose
        builder.mount(SHOULDER, PEG, mount);
        builder.mount(ROPE, LEFT_HAND, mount);
        builder.mount(ROPE, RIGHT_HAND, mount);
        builder.mount(LEFT_FOOT, NOSE, mount);
        builder.mount(RIGHT_FOOT, NOSE, mount);
        // Keep the legs away from the chest
        builder.repel(SHOULDER, LEFT_FOOT, 0.5);
        builder.repel(SHOULDER, RIGHT_FOOT, 0.5);

        // Rider upright relative to the sled, and the sled not folded
        builder.joint((BUTT, SHOULDER), (PEG, ROPE));
        builder.joint((TAIL, PEG), (PEG, ROPE));

        builder.build()
    }

    pub fn points(&self) -> &[PointDef] {
        &self.points
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn critical(&self) -> BindingMask {
        self.critical
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Rest pose translated to `origin`
    pub fn rest_pose(&self, origin: DVec2) -> Vec<DVec2> {
        self.points.iter().map(|p| origin + p.rest).collect()
    }
}

/// Incremental topology construction
#[derive(Debug, Default)]
pub struct TopologyBuilder {
    points: Vec<PointDef>,
    bindings: Vec<Binding>,
    joints: Vec<Joint>,
    critical: BindingMask,
    errors: Vec<String>,
}

impl TopologyBuilder {
    /// Add a point; returns its id
    pub fn point(&mut self, rest: DVec2, friction: f64) -> PointId {
        let id = PointId(self.points.len().min(MAX_POINTS - 1) as u8);
        if self.points.len() >= MAX_POINTS {
            self.errors.push(format!("more than {MAX_POINTS} points"));
        }
        self.points.push(PointDef { rest, friction });
        id
    }

    /// Rigid binding at the rest-pose distance
    pub fn stick(&mut self, a: PointId, b: PointId) -> usize {
        let rest = self.rest_distance(a, b);
        self.binding(a, b, BindingKind::Stick, rest)
    }

    /// Breakable binding at the rest-pose distance
    pub fn scarf(&mut self, a: PointId, b: PointId, break_factor: f64) -> usize {
        let rest = self.rest_distance(a, b);
        self.binding(a, b, BindingKind::Scarf { break_factor }, rest)
    }

    /// Breakable binding that also counts as holding the rider on
    pub fn mount(&mut self, a: PointId, b: PointId, break_factor: f64) -> usize {
        let index = self.scarf(a, b, break_factor);
        if index < MAX_BINDINGS {
            self.critical.insert(index);
        }
        index
    }

    /// Minimum-distance binding at `scale` times the rest-pose distance
    pub fn repel(&mut self, a: PointId, b: PointId, scale: f64) -> usize {
        let rest = self.rest_distance(a, b) * scale;
        self.binding(a, b, BindingKind::Repel, rest)
    }

    /// Binding with an explicit rest length
    pub fn binding(&mut self, a: PointId, b: PointId, kind: BindingKind, rest_length: f64) -> usize {
        self.bindings.push(Binding {
            a,
            b,
            kind,
            rest_length,
        });
        self.bindings.len() - 1
    }

    /// Mark an existing scarf binding as critical
    pub fn critical(&mut self, index: usize) {
        if index < MAX_BINDINGS {
            self.critical.insert(index);
        } else {
            self.errors.push(format!("critical binding {index} out of range"));
        }
    }

    pub fn joint(&mut self, a: (PointId, PointId), b: (PointId, PointId)) {
        self.joints.push(Joint { a, b });
    }

    fn rest_distance(&self, a: PointId, b: PointId) -> f64 {
        match (self.points.get(a.index()), self.points.get(b.index())) {
            (Some(pa), Some(pb)) => pa.rest.distance(pb.rest),
            // Reported by `build`
            _ => f64::NAN,
        }
    }

    /// Validate and freeze
    pub fn build(self) -> Result<Topology> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(SimError::invalid_topology(err));
        }
        if self.points.is_empty() {
            return Err(SimError::invalid_topology("topology has no points"));
        }
        if self.bindings.len() > MAX_BINDINGS {
            return Err(SimError::invalid_topology(format!(
                "{} bindings exceed the limit of {MAX_BINDINGS}",
                self.bindings.len()
            )));
        }

        let n = self.points.len();
        for (i, point) in self.points.iter().enumerate() {
            if !math::is_finite(point.rest) || !point.friction.is_finite() || point.friction < 0.0 {
                return Err(SimError::invalid_topology(format!(
                    "point {i} has a non-finite position or invalid friction"
                )));
            }
        }

        for (i, binding) in self.bindings.iter().enumerate() {
            if binding.a.index() >= n || binding.b.index() >= n {
                return Err(SimError::invalid_topology(format!(
                    "binding {i} references a missing point"
                )));
            }
            if binding.a == binding.b {
                return Err(SimError::invalid_topology(format!("binding {i} binds a point to itself")));
            }
            if !binding.rest_length.is_finite() || binding.rest_length <= 0.0 {
                return Err(SimError::invalid_topology(format!(
                    "binding {i} has rest length {}",
                    binding.rest_length
                )));
            }
            if let BindingKind::Scarf { break_factor } = binding.kind {
                if !break_factor.is_finite() || break_factor <= 1.0 {
                    return Err(SimError::invalid_topology(format!(
                        "binding {i} has break factor {break_factor}"
                    )));
                }
            }
        }

        for i in self.critical.iter() {
            match self.bindings.get(i) {
                Some(Binding {
                    kind: BindingKind::Scarf { .. },
                    ..
                }) => {}
                _ => {
                    return Err(SimError::invalid_topology(format!(
                        "critical binding {i} is not a breakable binding"
                    )));
                }
            }
        }

        for (i, joint) in self.joints.iter().enumerate() {
            let ids = [joint.a.0, joint.a.1, joint.b.0, joint.b.1];
            if ids.iter().any(|id| id.index() >= n) {
                return Err(SimError::invalid_topology(format!(
                    "joint {i} references a missing point"
                )));
            }
        }

        Ok(Topology {
            points: self.points,
            bindings: self.bindings,
            joints: self.joints,
            critical: self.critical,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::cross;

    #[test]
    fn test_sled_rider_shape() {
        let topology = Topology::sled_rider(&RuleSet::default()).unwrap();
        assert_eq!(topology.point_count(), points::COUNT);
        assert_eq!(topology.bindings().len(), 22);
        assert_eq!(topology.critical().count(), 8);
        assert_eq!(topology.joints().len(), 2);

        // Repel bindings sit at half the rest-pose distance
        let repel = topology.bindings()[20];
        assert_eq!(repel.kind, BindingKind::Repel);
        assert!((repel.rest_length - 0.5 * DVec2::new(5.0, 10.5).length()).abs() < 1e-12);
    }

    #[test]
    fn test_mount_factor_follows_rules() {
        let rules = RuleSet {
            mount_break_factor: 3.0,
            ..RuleSet::default()
        };
        let topology = Topology::sled_rider(&rules).unwrap();
        for i in topology.critical().iter() {
            assert_eq!(topology.bindings()[i].kind, BindingKind::Scarf { break_factor: 3.0 });
        }
    }

    #[test]
    fn test_rest_pose_joints_are_upright() {
        let topology = Topology::sled_rider(&RuleSet::default()).unwrap();
        let pose = topology.rest_pose(DVec2::ZERO);
        for joint in topology.joints() {
            let a = pose[joint.a.1.index()] - pose[joint.a.0.index()];
            let b = pose[joint.b.1.index()] - pose[joint.b.0.index()];
            assert!(cross(a, b) > 0.0);
        }
    }

    #[test]
    fn test_builder_validation() {
        let mut builder = Topology::builder();
        let a = builder.point(DVec2::ZERO, 0.0);
        builder.stick(a, PointId(3));
        assert!(matches!(builder.build(), Err(SimError::InvalidTopology(_))));

        let mut builder = Topology::builder();
        let a = builder.point(DVec2::ZERO, 0.0);
        let b = builder.point(DVec2::ZERO, 0.0);
        builder.stick(a, b);
        // Zero rest length
        assert!(builder.build().is_err());

        let mut builder = Topology::builder();
        let a = builder.point(DVec2::ZERO, 0.0);
        let b = builder.point(DVec2::X, 0.0);
        let stick = builder.stick(a, b);
        builder.critical(stick);
        assert!(builder.build().is_err());

        assert!(Topology::builder().build().is_err());
    }

    #[test]
    fn test_binding_mask() {
        let mut mask = BindingMask::EMPTY;
        assert!(mask.is_empty());
        mask.insert(3);
        mask.insert(63);
        assert!(mask.contains(3));
        assert!(mask.contains(63));
        assert!(!mask.contains(64));
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![3, 63]);
        assert!(mask.covers(BindingMask::single(3)));
        assert!(!BindingMask::single(3).covers(mask));
        assert!(mask.intersects(BindingMask::single(63)));
    }
}
