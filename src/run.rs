//! A run: one track, one rider, one rule-set, and the frames between them
//!
//! Several riders share a track by spawning further runs from the first one.
//! Riders never touch each other, so each keeps its own frame cache; an edit
//! made through any of them reaches every cache on its next read.

use std::sync::Arc;

use glam::DVec2;

use crate::error::{Result, SimError};
use crate::rules::RuleSet;
use crate::sim::{CacheStats, CancelToken, DEFAULT_CAPACITY, FrameCache, RiderState, Topology};
use crate::track::{Line, LineId, Track};

/// Owns everything needed to answer "where is the rider at frame k"
///
/// `Run` is `Sync`: frames may be requested from several threads while
/// another thread edits the track.
#[derive(Debug)]
pub struct Run {
    track: Arc<Track>,
    topology: Topology,
    rules: RuleSet,
    cache: FrameCache,
}

impl Run {
    /// Validate the pieces and start with only frame 0 cached
    pub fn new(
        track: impl Into<Arc<Track>>,
        topology: Topology,
        rules: RuleSet,
        initial: RiderState,
    ) -> Result<Self> {
        Self::with_capacity(track, topology, rules, initial, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(
        track: impl Into<Arc<Track>>,
        topology: Topology,
        rules: RuleSet,
        initial: RiderState,
        capacity: usize,
    ) -> Result<Self> {
        rules.validate()?;
        if initial.version != rules.version {
            return Err(SimError::RuleSetMismatch {
                expected: rules.version,
                found: initial.version,
            });
        }
        initial.validate(&topology)?;
        let track = track.into();

        log::info!(
            "Created run: engine {}, {} lines, {} points, {} bindings",
            rules.version,
            track.read().len(),
            topology.point_count(),
            topology.bindings().len()
        );

        Ok(Self {
            track,
            topology,
            rules,
            cache: FrameCache::with_capacity(initial, capacity),
        })
    }

    /// The built-in sled rider at `origin`, launched with the rule-set's start velocity
    pub fn sled_rider(track: impl Into<Arc<Track>>, rules: RuleSet, origin: DVec2) -> Result<Self> {
        let topology = Topology::sled_rider(&rules)?;
        let initial = RiderState::spawn(&topology, origin, rules.start_velocity, rules.version)?;
        Self::new(track, topology, rules, initial)
    }

    /// Another rider on the same track under the same rule-set
    pub fn spawn_rider(&self, topology: Topology, initial: RiderState) -> Result<Run> {
        Self::with_capacity(
            Arc::clone(&self.track),
            topology,
            self.rules.clone(),
            initial,
            self.cache.capacity(),
        )
    }

    /// Another built-in sled rider on the same track, starting at `origin`
    pub fn spawn_sled_rider(&self, origin: DVec2) -> Result<Run> {
        let topology = Topology::sled_rider(&self.rules)?;
        let initial =
            RiderState::spawn(&topology, origin, self.rules.start_velocity, self.rules.version)?;
        self.spawn_rider(topology, initial)
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    /// Shared handle to the track, for spawning or inspecting elsewhere
    pub fn shared_track(&self) -> Arc<Track> {
        Arc::clone(&self.track)
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn cache(&self) -> &FrameCache {
        &self.cache
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Add a line and drop every frame after the first
    pub fn add_line(&self, line: Line) -> Result<()> {
        self.track.add_line(line)?;
        self.cache.sync(&self.track);
        Ok(())
    }

    /// Remove a line; frames are only dropped if it existed
    pub fn remove_line(&self, id: LineId) -> Option<Line> {
        let removed = self.track.remove_line(id);
        self.cache.sync(&self.track);
        removed
    }

    /// Rider state at frame `k`
    pub fn frame(&self, k: u64) -> RiderState {
        self.cache.get(k, &self.track, &self.topology, &self.rules)
    }

    /// Rider state at frame `k`, giving up between frames once `cancel` is set
    pub fn frame_cancellable(&self, k: u64, cancel: &CancelToken) -> Result<RiderState> {
        self.cache
            .get_cancellable(k, &self.track, &self.topology, &self.rules, cancel)
    }

    /// Lazy iterator over every frame from 0
    pub fn frames(&self) -> Frames<'_> {
        self.frames_from(0)
    }

    /// Lazy iterator over every frame from `k`
    pub fn frames_from(&self, k: u64) -> Frames<'_> {
        Frames { run: self, next: k }
    }
}

/// Unbounded frame iterator; pair with `take` or `take_while`
#[derive(Debug, Clone)]
pub struct Frames<'a> {
    run: &'a Run,
    next: u64,
}

impl Iterator for Frames<'_> {
    type Item = RiderState;

    fn next(&mut self) -> Option<RiderState> {
        let state = self.run.frame(self.next);
        self.next = self.next.checked_add(1)?;
        Some(state)
    }
}
