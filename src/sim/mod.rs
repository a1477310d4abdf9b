//! Deterministic rider simulation
//!
//! Everything here is pure with respect to its inputs:
//! - One fixed step per frame, no wall-clock time
//! - Bindings, passes and contacts visited in a stable order
//! - No hash-ordered iteration inside a step

pub mod cache;
pub mod collision;
pub mod solver;
pub mod state;
pub mod tick;
pub mod topology;

pub use cache::{CacheStats, CancelToken, DEFAULT_CAPACITY, FrameCache};
pub use collision::{ContactScratch, collide, contact_depth};
pub use solver::{Sweep, solve};
pub use state::{Point, RiderState, RiderStatus};
pub use tick::{any_joint_inverted, simulate, step};
pub use topology::{
    Binding, BindingKind, BindingMask, Joint, PointDef, PointId, Topology, TopologyBuilder, points,
};
