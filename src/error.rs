//! Error types for track and run construction.
//!
//! Every error here is raised while building inputs (lines, rider states,
//! rule-sets). Stepping a validated run never fails.

use thiserror::Error;

use crate::rules::EngineVersion;
use crate::track::LineId;

/// Errors surfaced while constructing tracks, riders and runs.
#[derive(Debug, Error)]
pub enum SimError {
    /// Rider state or topology does not match the expected shape.
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    /// Zero-length segment or non-finite coordinate.
    #[error("degenerate geometry (line {id:?}): {reason}")]
    DegenerateGeometry {
        /// Offending line, `None` for rider coordinates.
        id: Option<LineId>,
        /// What was wrong with it.
        reason: String,
    },

    /// Grid cell size that is not a finite number in range.
    #[error("invalid grid cell size {0}")]
    InvalidCellSize(f64),

    /// Engine version identifier not recognised.
    #[error("unknown rule-set: {0:?}")]
    UnknownRuleSet(String),

    /// Rule-set constants out of range.
    #[error("invalid rule-set: {0}")]
    InvalidRuleSet(String),

    /// State belongs to a run with another engine version.
    #[error("rule-set mismatch: run uses {expected}, state was built for {found}")]
    RuleSetMismatch {
        /// Version of the run.
        expected: EngineVersion,
        /// Version recorded in the state.
        found: EngineVersion,
    },

    /// A line with this id is already on the track.
    #[error("duplicate line id {0}")]
    DuplicateLine(LineId),

    /// Malformed rule-set JSON.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    /// Forward simulation abandoned by the caller.
    #[error("simulation cancelled after frame {reached}")]
    Cancelled {
        /// Newest frame that was completed and cached.
        reached: u64,
    },
}

impl SimError {
    /// Creates an invalid topology error.
    #[must_use]
    pub fn invalid_topology(reason: impl Into<String>) -> Self {
        Self::InvalidTopology(reason.into())
    }

    /// Creates a degenerate geometry error for a line.
    #[must_use]
    pub fn degenerate_line(id: LineId, reason: impl Into<String>) -> Self {
        Self::DegenerateGeometry {
            id: Some(id),
            reason: reason.into(),
        }
    }

    /// Creates a degenerate geometry error for rider coordinates.
    #[must_use]
    pub fn degenerate_point(reason: impl Into<String>) -> Self {
        Self::DegenerateGeometry {
            id: None,
            reason: reason.into(),
        }
    }

    /// Creates an invalid rule-set error.
    #[must_use]
    pub fn invalid_rules(reason: impl Into<String>) -> Self {
        Self::InvalidRuleSet(reason.into())
    }
}

/// Result type for fallible construction.
pub type Result<T> = std::result::Result<T, SimError>;
