//! Track storage shared between simulation readers and editors
//!
//! - `line`: immutable segments and their builder
//! - `grid`: the spatial index the collision pass queries
//!
//! [`Track`] puts the index behind a readers-writer lock: any number of frame
//! steps may query it at once, edits are exclusive. Every successful edit
//! bumps the revision while the write lock is still held, so a reader holding
//! the read lock always sees the revision that matches the lines it queries.

pub mod grid;
pub mod line;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use grid::{CellKey, DEFAULT_CELL_SIZE, MAX_LINE_CELLS, MIN_CELL_SIZE, TrackIndex};
pub use line::{Line, LineBuilder, LineId, LineKind, MIN_LINE_LENGTH};

use crate::error::Result;

/// A track that can be read during simulation and edited in between
#[derive(Debug, Default)]
pub struct Track {
    index: RwLock<TrackIndex>,
    revision: AtomicU64,
}

impl Track {
    pub fn new(index: TrackIndex) -> Self {
        Self {
            index: RwLock::new(index),
            revision: AtomicU64::new(0),
        }
    }

    /// Build a track with the default cell size
    pub fn from_lines(lines: impl IntoIterator<Item = Line>) -> Result<Self> {
        Ok(Self::new(TrackIndex::from_lines(lines, DEFAULT_CELL_SIZE)?))
    }

    /// Shared access for queries
    pub fn read(&self) -> RwLockReadGuard<'_, TrackIndex> {
        // Index updates cannot leave it half-written, so a poisoned lock is still usable
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TrackIndex> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of successful edits so far
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Add a line; frame caches reading this track drop stale frames on their next read
    pub fn add_line(&self, line: Line) -> Result<()> {
        let id = line.id;
        let mut index = self.write();
        index.insert(line)?;
        self.revision.fetch_add(1, Ordering::AcqRel);
        drop(index);
        log::debug!("Added line {id}");
        Ok(())
    }

    /// Remove a line; the revision only moves if it existed
    pub fn remove_line(&self, id: LineId) -> Option<Line> {
        let mut index = self.write();
        let removed = index.remove(id);
        if removed.is_some() {
            self.revision.fetch_add(1, Ordering::AcqRel);
            drop(index);
            log::debug!("Removed line {id}");
        }
        removed
    }

    /// Copy of every line in id order
    pub fn lines(&self) -> Vec<Line> {
        self.read().lines().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimError;
    use glam::DVec2;

    #[test]
    fn test_edit_bumps_revision() {
        let track = Track::default();
        assert_eq!(track.revision(), 0);

        let line = Line::builder().id(1).point(0.0, 0.0).point(10.0, 0.0).build().unwrap();
        track.add_line(line).unwrap();
        assert_eq!(track.revision(), 1);
        assert_eq!(track.read().query(DVec2::new(5.0, 0.0), 1.0), vec![1]);

        assert!(track.remove_line(1).is_some());
        assert!(track.remove_line(1).is_none());
        assert!(track.read().is_empty());
        assert_eq!(track.revision(), 2);
    }

    #[test]
    fn test_failed_edit_keeps_revision() {
        let line = Line::builder().id(1).point(0.0, 0.0).point(10.0, 0.0).build().unwrap();
        let track = Track::from_lines([line]).unwrap();

        assert!(matches!(track.add_line(line), Err(SimError::DuplicateLine(1))));
        assert!(track.remove_line(9).is_none());
        assert_eq!(track.revision(), 0);
        assert_eq!(track.lines(), vec![line]);
    }

    #[test]
    fn test_concurrent_readers() {
        let line = Line::builder().id(1).point(0.0, 0.0).point(100.0, 0.0).build().unwrap();
        let track = Track::from_lines([line]).unwrap();

        std::thread::scope(|scope| {
            for i in 0..4 {
                let track = &track;
                scope.spawn(move || {
                    let p = DVec2::new(10.0 * i as f64, 0.0);
                    assert_eq!(track.read().query(p, 1.0), vec![1]);
                });
            }
        });
    }
}
