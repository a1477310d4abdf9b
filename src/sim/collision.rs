//! Point-versus-line collision detection and response
//!
//! Lines are one-sided: a point only collides when it is below the surface
//! (within `contact_thickness`) and moving into it. When several lines apply
//! to one point, the shallowest contact is resolved first, then the grid is
//! queried again around the moved point. Each line resolves a point at most
//! once per pass.

use std::collections::HashSet;

use glam::DVec2;

use super::state::Point;
use crate::rules::RuleSet;
use crate::track::{Line, LineId, LineKind, TrackIndex};

/// Reusable per-pass buffers
#[derive(Debug, Clone, Default)]
pub struct ContactScratch {
    candidates: Vec<LineId>,
    seen: HashSet<LineId>,
    resolved: Vec<LineId>,
}

impl ContactScratch {
    pub fn new() -> Self {
        Self::default()
    }
}

/// How far `point` sits below `line`, if it is in contact
///
/// Returns `None` when:
///  * the point is moving away from or along the surface
///  * the point projects outside the line, extensions included
///  * the point is above the surface or deeper than the contact thickness
pub fn contact_depth(line: &Line, point: &Point, rules: &RuleSet) -> Option<f64> {
    let normal = line.normal();
    if normal.dot(point.vel) >= 0.0 {
        return None;
    }

    let length = line.length();
    let tangent = line.vector() / length;
    let from_start = point.pos - line.start;

    let (ext_start, ext_end) = line.hitbox_extensions(rules);
    let along = from_start.dot(tangent);
    if along < -ext_start || length + ext_end < along {
        return None;
    }

    let depth = -normal.dot(from_start);
    if 0.0 < depth && depth < rules.contact_thickness {
        Some(depth)
    } else {
        None
    }
}

/// Move `point` out of `line` by `depth`, then apply friction and acceleration
///
/// Friction slides `prev` toward the corrected position along the line, so it
/// can stop tangential motion but never reverse it.
pub fn resolve_contact(line: &Line, point: &mut Point, depth: f64, rules: &RuleSet) {
    let normal = line.normal();
    let tangent = line.tangent();
    let pos = point.pos + normal * depth;

    let along = (pos - point.prev).dot(tangent);
    let grip = (point.friction * rules.friction_scale * depth).min(along.abs());
    let mut prev = point.prev + tangent * (grip * along.signum());

    if let LineKind::Acceleration { multiplier } = line.kind {
        prev -= tangent * (rules.acceleration * f64::from(multiplier));
    }

    point.pos = pos;
    point.prev = prev;
}

/// One collision pass over every point; returns the number of contacts resolved
pub fn collide(
    points: &mut [Point],
    index: &TrackIndex,
    rules: &RuleSet,
    scratch: &mut ContactScratch,
) -> usize {
    let mut contacts = 0;
    let reach = rules.contact_reach();

    for point in points.iter_mut() {
        scratch.resolved.clear();

        loop {
            // Any contact lies within `reach`, so the choice below never
            // depends on cell size or candidate order
            index.query_with(point.pos, reach, &mut scratch.candidates, &mut scratch.seen);

            // (depth, line id); equal depths go to the lower id
            let mut best: Option<(f64, &Line)> = None;
            for &id in &scratch.candidates {
                if scratch.resolved.contains(&id) {
                    continue;
                }
                let Some(line) = index.get(id) else {
                    continue;
                };
                let Some(depth) = contact_depth(line, point, rules) else {
                    continue;
                };
                let closer = match best {
                    None => true,
                    Some((best_depth, best_line)) => {
                        depth < best_depth || (depth == best_depth && id < best_line.id)
                    }
                };
                if closer {
                    best = Some((depth, line));
                }
            }

            let Some((depth, line)) = best else {
                break;
            };
            resolve_contact(line, point, depth, rules);
            scratch.resolved.push(line.id);
            contacts += 1;
        }
    }

    contacts
}

/// Signed depth below `line` ignoring motion and thickness (positive = inside)
pub fn penetration(line: &Line, pos: DVec2) -> f64 {
    -line.normal().dot(pos - line.start)
}
