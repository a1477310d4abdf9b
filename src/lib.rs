//! Trackrider - deterministic sled-rider physics over line tracks
//!
//! Core modules:
//! - `track`: line segments and the uniform grid that indexes them
//! - `sim`: rider topology, constraint solver, collision and the frame stepper
//! - `rules`: engine versions as data (constants plus sub-pass order)
//! - `run`: a track, a rider and a rule-set with cached, lazily computed frames
//! - `math`: small vector helpers on top of `glam::DVec2`
//!
//! Frames are a pure function of the track, the rule-set and frame 0: the same
//! inputs produce bit-identical states on every call and every thread.

pub mod error;
pub mod math;
pub mod rules;
pub mod run;
pub mod sim;
pub mod track;

pub use error::{Result, SimError};
pub use rules::{EngineVersion, Pass, RuleSet};
pub use run::{Frames, Run};
pub use sim::{CancelToken, RiderState, RiderStatus, Topology};
pub use track::{Line, LineId, LineKind, Track, TrackIndex};
