//! Memoized frames of one run
//!
//! Frame 0 is supplied up front; every later frame is derived by stepping
//! forward from the latest cached frame before it. Only one thread steps at a
//! time: other readers wait on a condition variable and pick up frames as they
//! land.
//!
//! The cache remembers which [`Track`] revision its frames were computed
//! against. Every read compares it with the track's current revision and drops
//! everything after frame 0 when the track was edited in between, so an edit
//! made through any handle to the track is picked up. Each invalidation bumps
//! a generation number, and a walk that started under an older generation
//! throws its work away and restarts from what is left.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use super::collision::ContactScratch;
use super::state::RiderState;
use super::tick::step;
use super::topology::Topology;
use crate::error::{Result, SimError};
use crate::rules::RuleSet;
use crate::track::Track;

/// Frames kept before eviction starts
pub const DEFAULT_CAPACITY: usize = 1 << 16;

/// Smallest usable capacity: frame 0 plus the newest frame
pub const MIN_CAPACITY: usize = 2;

/// Shared flag for abandoning a long forward walk
///
/// Checked between frames, never in the middle of one.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Counters for observing cache behavior
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Requests answered straight from the cache
    pub hits: u64,
    /// Requests that had to step forward
    pub misses: u64,
    /// Frames produced by stepping
    pub frames_simulated: u64,
    /// Frames dropped to stay within capacity
    pub evictions: u64,
    /// Explicit `invalidate_from` calls plus track edits noticed on read
    pub invalidations: u64,
}

#[derive(Debug)]
struct Inner {
    frames: BTreeMap<u64, RiderState>,
    pinned: BTreeSet<u64>,
    /// Track revision the cached frames belong to, unknown until the first read
    revision: Option<u64>,
    generation: u64,
    computing: bool,
    stats: CacheStats,
}

/// Thread-safe frame store
#[derive(Debug)]
pub struct FrameCache {
    initial: RiderState,
    inner: Mutex<Inner>,
    ready: Condvar,
    capacity: usize,
}

/// How far a forward walk got
struct Walk {
    state: RiderState,
    complete: bool,
}

/// Releases the stepping slot even if a step panics
struct ComputeSlot<'a>(&'a FrameCache);

impl Drop for ComputeSlot<'_> {
    fn drop(&mut self) {
        self.0.lock().computing = false;
        self.0.ready.notify_all();
    }
}

impl FrameCache {
    pub fn new(initial: RiderState) -> Self {
        Self::with_capacity(initial, DEFAULT_CAPACITY)
    }

    /// Cache holding at most `capacity` frames (at least [`MIN_CAPACITY`])
    pub fn with_capacity(mut initial: RiderState, capacity: usize) -> Self {
        initial.frame = 0;
        let mut frames = BTreeMap::new();
        frames.insert(0, initial.clone());
        Self {
            initial,
            inner: Mutex::new(Inner {
                frames,
                pinned: BTreeSet::new(),
                revision: None,
                generation: 0,
                computing: false,
                stats: CacheStats::default(),
            }),
            ready: Condvar::new(),
            capacity: capacity.max(MIN_CAPACITY),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every critical section leaves `Inner` consistent
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frame `k`, stepping forward as needed
    pub fn get(&self, k: u64, track: &Track, topology: &Topology, rules: &RuleSet) -> RiderState {
        self.walk(k, track, topology, rules, None).state
    }

    /// Like [`FrameCache::get`], but stops between frames once `cancel` is set
    pub fn get_cancellable(
        &self,
        k: u64,
        track: &Track,
        topology: &Topology,
        rules: &RuleSet,
        cancel: &CancelToken,
    ) -> Result<RiderState> {
        let walk = self.walk(k, track, topology, rules, Some(cancel));
        if walk.complete {
            Ok(walk.state)
        } else {
            Err(SimError::Cancelled {
                reached: walk.state.frame,
            })
        }
    }

    fn walk(
        &self,
        k: u64,
        track: &Track,
        topology: &Topology,
        rules: &RuleSet,
        cancel: Option<&CancelToken>,
    ) -> Walk {
        let mut inner = self.lock();
        loop {
            Self::sync_revision(&mut inner, track.revision());
            if let Some(state) = inner.frames.get(&k) {
                let state = state.clone();
                inner.stats.hits += 1;
                return Walk {
                    state,
                    complete: true,
                };
            }
            if !inner.computing {
                break;
            }
            inner = self.ready.wait(inner).unwrap_or_else(PoisonError::into_inner);
        }

        inner.stats.misses += 1;
        inner.computing = true;
        let _slot = ComputeSlot(self);
        let mut generation = inner.generation;
        let mut current = self.latest_at_or_before(&inner, k);
        drop(inner);

        let mut scratch = ContactScratch::new();
        while current.frame < k {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                log::debug!("Walk to frame {k} cancelled at frame {}", current.frame);
                return Walk {
                    state: current,
                    complete: false,
                };
            }

            // The read lock spans both the step and the insert, so no edit
            // can land between them
            let index = track.read();
            let next = step(&current, &index, topology, rules, &mut scratch);

            let mut inner = self.lock();
            Self::sync_revision(&mut inner, track.revision());
            if inner.generation != generation {
                generation = inner.generation;
                current = self.latest_at_or_before(&inner, k);
                continue;
            }
            inner.frames.insert(next.frame, next.clone());
            inner.stats.frames_simulated += 1;
            self.evict(&mut inner);
            drop(inner);
            drop(index);
            self.ready.notify_all();

            current = next;
        }

        Walk {
            state: current,
            complete: true,
        }
    }

    /// Drop frames until within capacity, oldest first, keeping frame 0,
    /// pinned frames and the newest frame
    fn evict(&self, inner: &mut Inner) {
        while inner.frames.len() > self.capacity {
            let newest = inner.frames.keys().next_back().copied().unwrap_or(0);
            let victim = inner
                .frames
                .keys()
                .copied()
                .find(|&f| f != 0 && f != newest && !inner.pinned.contains(&f));
            let Some(victim) = victim else {
                break;
            };
            inner.frames.remove(&victim);
            inner.stats.evictions += 1;
        }
    }

    /// Drop every cached frame at or after `k` (frame 0 always stays)
    pub fn invalidate_from(&self, k: u64) {
        let mut inner = self.lock();
        Self::drop_from(&mut inner, k);
    }

    /// Drop stale frames now if `track` was edited since the last read
    pub fn sync(&self, track: &Track) {
        let mut inner = self.lock();
        Self::sync_revision(&mut inner, track.revision());
    }

    fn sync_revision(inner: &mut Inner, revision: u64) {
        match inner.revision {
            Some(seen) if seen == revision => {}
            Some(seen) => {
                log::debug!("Track moved from revision {seen} to {revision}");
                inner.revision = Some(revision);
                Self::drop_from(inner, 1);
            }
            None => inner.revision = Some(revision),
        }
    }

    fn drop_from(inner: &mut Inner, k: u64) {
        let k = k.max(1);
        let dropped = inner.frames.split_off(&k).len();
        inner.generation += 1;
        inner.stats.invalidations += 1;
        log::debug!("Invalidated {dropped} cached frames from frame {k}");
    }

    /// Keep frame `k` through eviction once it has been computed
    pub fn pin(&self, k: u64) {
        self.lock().pinned.insert(k);
    }

    pub fn unpin(&self, k: u64) {
        let mut inner = self.lock();
        inner.pinned.remove(&k);
        self.evict(&mut inner);
    }

    pub fn is_pinned(&self, k: u64) -> bool {
        self.lock().pinned.contains(&k)
    }

    /// Frame `k` if it is cached, without stepping
    pub fn peek(&self, k: u64) -> Option<RiderState> {
        self.lock().frames.get(&k).cloned()
    }

    pub fn contains(&self, k: u64) -> bool {
        self.lock().frames.contains_key(&k)
    }

    /// Highest cached frame index
    pub fn latest(&self) -> u64 {
        self.lock().frames.keys().next_back().copied().unwrap_or(0)
    }

    /// Number of cached frames
    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().frames.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    /// Frame 0
    pub fn initial(&self) -> &RiderState {
        &self.initial
    }

    fn latest_at_or_before(&self, inner: &Inner, k: u64) -> RiderState {
        inner
            .frames
            .range(..=k)
            .next_back()
            .map_or_else(|| self.initial.clone(), |(_, state)| state.clone())
    }
}
