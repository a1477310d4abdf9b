//! Track line segments
//!
//! A line is immutable once built. Its solid side is the one its normal points
//! away from: with y pointing down, an unflipped line drawn left to right is
//! solid from above.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::math;
use crate::rules::RuleSet;

/// Identity of a line within a track
pub type LineId = u32;

/// Lines shorter than this are rejected as degenerate
pub const MIN_LINE_LENGTH: f64 = 1.0e-9;

/// Line behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LineKind {
    /// Solid, one-sided
    #[default]
    Normal,
    /// Solid, and pushes riders along the line direction
    Acceleration { multiplier: u32 },
    /// Drawn only, never collides
    Scenery,
}

/// A track segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub id: LineId,
    pub start: DVec2,
    pub end: DVec2,
    pub kind: LineKind,
    /// Swap the solid side
    #[serde(default)]
    pub flipped: bool,
    /// Contact reaches past `start`
    #[serde(default)]
    pub extend_start: bool,
    /// Contact reaches past `end`
    #[serde(default)]
    pub extend_end: bool,
}

impl Line {
    pub fn builder() -> LineBuilder {
        LineBuilder {
            points_set: 0,
            line: Line {
                id: 0,
                start: DVec2::ZERO,
                end: DVec2::ZERO,
                kind: LineKind::Normal,
                flipped: false,
                extend_start: false,
                extend_end: false,
            },
        }
    }

    /// Reject zero-length, non-finite and out-of-world segments
    pub fn validate(&self) -> Result<()> {
        if !math::is_finite(self.start) || !math::is_finite(self.end) {
            return Err(SimError::degenerate_line(self.id, "non-finite endpoint"));
        }
        let reach = self.start.abs().max(self.end.abs()).max_element();
        if reach > math::WORLD_LIMIT {
            return Err(SimError::degenerate_line(
                self.id,
                format!("endpoint beyond the world limit of {}", math::WORLD_LIMIT),
            ));
        }
        let length = self.length();
        if !length.is_finite() || length < MIN_LINE_LENGTH {
            return Err(SimError::degenerate_line(
                self.id,
                format!("length {length} is too short"),
            ));
        }
        Ok(())
    }

    /// Whether the physics should see this line at all
    #[inline]
    pub fn is_collidable(&self) -> bool {
        self.kind != LineKind::Scenery
    }

    /// `end - start`
    #[inline]
    pub fn vector(&self) -> DVec2 {
        self.end - self.start
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.vector().length()
    }

    /// Unit vector from `start` to `end`
    #[inline]
    pub fn tangent(&self) -> DVec2 {
        self.vector() / self.length()
    }

    /// Unit normal pointing out of the solid side (the push-out direction)
    pub fn normal(&self) -> DVec2 {
        let t = self.tangent();
        if self.flipped {
            DVec2::new(-t.y, t.x)
        } else {
            DVec2::new(t.y, -t.x)
        }
    }

    /// Contact reach past (`start`, `end`) under the given rules
    pub fn hitbox_extensions(&self, rules: &RuleSet) -> (f64, f64) {
        let reach = (self.length() * rules.extension_ratio).clamp(0.0, rules.max_extension);
        (
            if self.extend_start { reach } else { 0.0 },
            if self.extend_end { reach } else { 0.0 },
        )
    }

    /// Axis-aligned bounds as (min, max)
    pub fn bounds(&self) -> (DVec2, DVec2) {
        (self.start.min(self.end), self.start.max(self.end))
    }

    /// Distance from `p` to the segment
    #[inline]
    pub fn distance_to(&self, p: DVec2) -> f64 {
        math::distance_to_segment(p, self.start, self.end)
    }
}

/// Builds a [`Line`]; the first `point` call sets `start`, the second sets `end`
pub struct LineBuilder {
    points_set: u8,
    line: Line,
}

impl LineBuilder {
    pub fn id(mut self, id: LineId) -> Self {
        self.line.id = id;
        self
    }

    pub fn kind(mut self, kind: LineKind) -> Self {
        self.line.kind = kind;
        self
    }

    pub fn flipped(mut self, flipped: bool) -> Self {
        self.line.flipped = flipped;
        self
    }

    pub fn point(self, x: f64, y: f64) -> Self {
        self.point_vec(DVec2::new(x, y))
    }

    pub fn point_vec(mut self, point: DVec2) -> Self {
        match self.points_set {
            0 => self.line.start = point,
            _ => self.line.end = point,
        }
        self.points_set = self.points_set.saturating_add(1).min(2);
        self
    }

    /// Extend both ends
    pub fn extended(mut self, extended: bool) -> Self {
        self.line.extend_start = extended;
        self.line.extend_end = extended;
        self
    }

    pub fn extend_start(mut self, extended: bool) -> Self {
        self.line.extend_start = extended;
        self
    }

    pub fn extend_end(mut self, extended: bool) -> Self {
        self.line.extend_end = extended;
        self
    }

    /// Finish and validate the line
    pub fn build(self) -> Result<Line> {
        if self.points_set < 2 {
            return Err(SimError::degenerate_line(self.line.id, "line needs two points"));
        }
        self.line.validate()?;
        Ok(self.line)
    }
}
