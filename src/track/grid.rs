//! Uniform-grid line index
//!
//! Collidable lines are registered in every cell their segment crosses.
//! Queries walk cells x-major then y-minor and return ids in cell order, then
//! insertion order within a cell, so results are stable across runs.
//! Scenery lives in a separate set of cells that only endpoint snapping reads.

use std::collections::{BTreeMap, HashMap, HashSet};

use glam::DVec2;

use super::line::{Line, LineId};
use crate::error::{Result, SimError};

/// Default grid cell edge length in world units
pub const DEFAULT_CELL_SIZE: f64 = 14.0;

/// Smallest accepted cell edge length
pub const MIN_CELL_SIZE: f64 = 1.0;

/// Most cells a single line may cross
pub const MAX_LINE_CELLS: u64 = 1 << 18;

/// Integer cell coordinates
pub type CellKey = (i64, i64);

/// Spatial index over a track's lines
#[derive(Debug, Clone)]
pub struct TrackIndex {
    cell_size: f64,
    /// Every line, scenery included, by id
    lines: BTreeMap<LineId, Line>,
    /// Collidable line ids per cell, in insertion order
    cells: HashMap<CellKey, Vec<LineId>>,
    /// Scenery line ids per cell
    scenery: HashMap<CellKey, Vec<LineId>>,
}

impl Default for TrackIndex {
    fn default() -> Self {
        Self {
            cell_size: DEFAULT_CELL_SIZE,
            lines: BTreeMap::new(),
            cells: HashMap::new(),
            scenery: HashMap::new(),
        }
    }
}

impl TrackIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty index with a custom cell size
    pub fn with_cell_size(cell_size: f64) -> Result<Self> {
        if !cell_size.is_finite() || cell_size < MIN_CELL_SIZE {
            return Err(SimError::InvalidCellSize(cell_size));
        }
        Ok(Self {
            cell_size,
            ..Self::default()
        })
    }

    /// Build from a set of lines, in order
    pub fn from_lines(lines: impl IntoIterator<Item = Line>, cell_size: f64) -> Result<Self> {
        let mut index = Self::with_cell_size(cell_size)?;
        for line in lines {
            index.insert(line)?;
        }
        Ok(index)
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn get(&self, id: LineId) -> Option<&Line> {
        self.lines.get(&id)
    }

    pub fn contains(&self, id: LineId) -> bool {
        self.lines.contains_key(&id)
    }

    /// All lines (scenery included) in id order
    pub fn lines(&self) -> impl Iterator<Item = &Line> {
        self.lines.values()
    }

    /// Add a line; scenery is stored but kept out of the collision cells
    pub fn insert(&mut self, line: Line) -> Result<()> {
        line.validate()?;
        if self.lines.contains_key(&line.id) {
            return Err(SimError::DuplicateLine(line.id));
        }

        let keys = self.cells_on_segment(line.start, line.end).ok_or_else(|| {
            SimError::degenerate_line(
                line.id,
                format!("crosses more than {MAX_LINE_CELLS} grid cells"),
            )
        })?;
        let cells = if line.is_collidable() {
            &mut self.cells
        } else {
            &mut self.scenery
        };
        for key in keys {
            cells.entry(key).or_default().push(line.id);
        }
        self.lines.insert(line.id, line);
        Ok(())
    }

    /// Remove a line by id, returning it if it was present
    pub fn remove(&mut self, id: LineId) -> Option<Line> {
        let line = self.lines.remove(&id)?;
        let keys = self.cells_on_segment(line.start, line.end).unwrap_or_default();
        let cells = if line.is_collidable() {
            &mut self.cells
        } else {
            &mut self.scenery
        };
        for key in keys {
            if let Some(ids) = cells.get_mut(&key) {
                ids.retain(|&other| other != id);
                if ids.is_empty() {
                    cells.remove(&key);
                }
            }
        }
        Some(line)
    }

    /// Collidable line ids registered in cells overlapping the box `[p - r, p + r]`
    pub fn query(&self, point: DVec2, radius: f64) -> Vec<LineId> {
        let mut out = Vec::new();
        self.query_into(point, radius, &mut out);
        out
    }

    /// Like [`query`](Self::query), writing into a reusable buffer (cleared first)
    pub fn query_into(&self, point: DVec2, radius: f64, out: &mut Vec<LineId>) {
        self.query_with(point, radius, out, &mut HashSet::new());
    }

    /// Like [`query_into`](Self::query_into), also reusing the set that
    /// removes duplicates (cleared first)
    pub fn query_with(
        &self,
        point: DVec2,
        radius: f64,
        out: &mut Vec<LineId>,
        seen: &mut HashSet<LineId>,
    ) {
        out.clear();
        seen.clear();
        Self::collect_cells(&self.cells, self.cell_range(point, radius), out, seen);
    }

    /// Cell bounds of the box `[p - r, p + r]`
    fn cell_range(&self, point: DVec2, radius: f64) -> (CellKey, CellKey) {
        let radius = radius.max(0.0);
        (
            self.cell_of(point - DVec2::splat(radius)),
            self.cell_of(point + DVec2::splat(radius)),
        )
    }

    fn collect_cells(
        cells: &HashMap<CellKey, Vec<LineId>>,
        ((min_x, min_y), (max_x, max_y)): (CellKey, CellKey),
        out: &mut Vec<LineId>,
        seen: &mut HashSet<LineId>,
    ) {
        for cx in min_x..=max_x {
            for cy in min_y..=max_y {
                if let Some(ids) = cells.get(&(cx, cy)) {
                    out.extend(ids.iter().copied().filter(|&id| seen.insert(id)));
                }
            }
        }
    }

    /// Collidable lines crossing the rectangle spanned by `a` and `b`, in id order
    pub fn lines_in_box(&self, a: DVec2, b: DVec2) -> Vec<&Line> {
        let min = a.min(b);
        let max = a.max(b);
        let (min_x, min_y) = self.cell_of(min);
        let (max_x, max_y) = self.cell_of(max);
        let span_x = max_x.saturating_sub(min_x).saturating_add(1);
        let span_y = max_y.saturating_sub(min_y).saturating_add(1);
        let cell_count = span_x.saturating_mul(span_y);

        let mut ids: Vec<LineId> = if cell_count as usize > self.cells.len() {
            // Box is larger than the populated grid, scanning lines is cheaper
            self.lines
                .values()
                .filter(|line| line.is_collidable())
                .map(|line| line.id)
                .collect()
        } else {
            let mut ids = Vec::new();
            for cx in min_x..=max_x {
                for cy in min_y..=max_y {
                    if let Some(cell) = self.cells.get(&(cx, cy)) {
                        ids.extend_from_slice(cell);
                    }
                }
            }
            ids.sort_unstable();
            ids.dedup();
            ids
        };

        ids.retain(|id| {
            self.lines
                .get(id)
                .is_some_and(|line| segment_intersects_box(line.start, line.end, min, max))
        });
        ids.iter().filter_map(|id| self.lines.get(id)).collect()
    }

    /// Nearest line endpoint within `max_dist` of `to_snap`, or `to_snap` itself
    ///
    /// Scenery endpoints count. Only cells around `to_snap` are searched.
    pub fn snap_point(&self, max_dist: f64, to_snap: DVec2) -> DVec2 {
        if max_dist.is_nan() || max_dist <= 0.0 {
            return to_snap;
        }
        let range = self.cell_range(to_snap, max_dist);
        let ((min_x, min_y), (max_x, max_y)) = range;
        let cell_count = max_x
            .saturating_sub(min_x)
            .saturating_add(1)
            .saturating_mul(max_y.saturating_sub(min_y).saturating_add(1));

        let mut near = Vec::new();
        if cell_count as usize > self.cells.len() + self.scenery.len() {
            near.extend(self.lines.keys().copied());
        } else {
            let mut seen = HashSet::new();
            Self::collect_cells(&self.cells, range, &mut near, &mut seen);
            Self::collect_cells(&self.scenery, range, &mut near, &mut seen);
        }

        let max_dist_sq = max_dist * max_dist;
        near.iter()
            .filter_map(|id| self.lines.get(id))
            .flat_map(|line| [line.start, line.end])
            .map(|p| (p, p.distance_squared(to_snap)))
            .filter(|(_, dist)| dist.total_cmp(&max_dist_sq).is_lt())
            .min_by(|(_, d1), (_, d2)| d1.total_cmp(d2))
            .map_or(to_snap, |(p, _)| p)
    }

    /// Cell containing a point
    #[inline]
    pub fn cell_of(&self, p: DVec2) -> CellKey {
        (
            (p.x / self.cell_size).floor() as i64,
            (p.y / self.cell_size).floor() as i64,
        )
    }

    /// Cells crossed by the segment `a`-`b`, walked from `a` to `b`;
    /// `None` past [`MAX_LINE_CELLS`]
    fn cells_on_segment(&self, a: DVec2, b: DVec2) -> Option<Vec<CellKey>> {
        let cs = self.cell_size;
        let (mut cx, mut cy) = self.cell_of(a);
        let (ex, ey) = self.cell_of(b);
        let d = b - a;

        // Each step moves one cell closer to the end cell, so this count is exact
        let steps = (i128::from(ex) - i128::from(cx)).unsigned_abs()
            + (i128::from(ey) - i128::from(cy)).unsigned_abs();
        if steps >= u128::from(MAX_LINE_CELLS) {
            return None;
        }
        let steps = steps as usize;

        let step_x: i64 = if d.x > 0.0 { 1 } else { -1 };
        let step_y: i64 = if d.y > 0.0 { 1 } else { -1 };

        let mut t_max_x = if d.x > 0.0 {
            ((cx as f64 + 1.0) * cs - a.x) / d.x
        } else if d.x < 0.0 {
            (cx as f64 * cs - a.x) / d.x
        } else {
            f64::INFINITY
        };
        let mut t_max_y = if d.y > 0.0 {
            ((cy as f64 + 1.0) * cs - a.y) / d.y
        } else if d.y < 0.0 {
            (cy as f64 * cs - a.y) / d.y
        } else {
            f64::INFINITY
        };
        let t_delta_x = if d.x != 0.0 { cs / d.x.abs() } else { f64::INFINITY };
        let t_delta_y = if d.y != 0.0 { cs / d.y.abs() } else { f64::INFINITY };

        let mut cells = Vec::with_capacity(steps + 1);
        cells.push((cx, cy));

        for _ in 0..steps {
            let step_along_x = if cx == ex {
                false
            } else if cy == ey {
                true
            } else {
                t_max_x < t_max_y
            };

            if step_along_x {
                cx += step_x;
                t_max_x += t_delta_x;
            } else {
                cy += step_y;
                t_max_y += t_delta_y;
            }
            cells.push((cx, cy));
        }
        Some(cells)
    }
}

/// Liang-Barsky clip test of a segment against an axis-aligned box
fn segment_intersects_box(a: DVec2, b: DVec2, min: DVec2, max: DVec2) -> bool {
    let d = b - a;
    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;

    for (p, q) in [
        (-d.x, a.x - min.x),
        (d.x, max.x - a.x),
        (-d.y, a.y - min.y),
        (d.y, max.y - a.y),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return false;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return false;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return false;
            }
            t1 = t1.min(r);
        }
    }
    t0 <= t1
}
