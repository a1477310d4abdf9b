//! 2D vector helpers on top of `glam::DVec2`
//!
//! Everything runs in f64 with a fixed operation order so that every machine
//! produces the same bits for the same inputs.

use glam::DVec2;

/// Largest coordinate magnitude the stepper will hold
pub const WORLD_LIMIT: f64 = 1.0e12;

/// 2D cross product (z component of the 3D cross)
#[inline]
pub fn cross(a: DVec2, b: DVec2) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Projection of `v` onto `onto` (zero when `onto` is zero)
#[inline]
pub fn project_onto(v: DVec2, onto: DVec2) -> DVec2 {
    let len_sq = onto.length_squared();
    if len_sq == 0.0 {
        return DVec2::ZERO;
    }
    onto * (v.dot(onto) / len_sq)
}

/// Closest point to `p` on the segment `a`-`b`
pub fn closest_point_on_segment(p: DVec2, a: DVec2, b: DVec2) -> DVec2 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq == 0.0 {
        return a;
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

/// Euclidean distance from `p` to the segment `a`-`b`
#[inline]
pub fn distance_to_segment(p: DVec2, a: DVec2, b: DVec2) -> f64 {
    p.distance(closest_point_on_segment(p, a, b))
}

/// Scale `v` down so its length does not exceed `max`
#[inline]
pub fn clamp_length(v: DVec2, max: f64) -> DVec2 {
    let len_sq = v.length_squared();
    if len_sq > max * max {
        v * (max / len_sq.sqrt())
    } else {
        v
    }
}

/// Replace non-finite components with `fallback` and clamp to the world bounds
#[inline]
pub fn sanitize(v: DVec2, fallback: DVec2) -> DVec2 {
    let x = if v.x.is_finite() { v.x } else { fallback.x };
    let y = if v.y.is_finite() { v.y } else { fallback.y };
    DVec2::new(
        x.clamp(-WORLD_LIMIT, WORLD_LIMIT),
        y.clamp(-WORLD_LIMIT, WORLD_LIMIT),
    )
}

/// Both components finite
#[inline]
pub fn is_finite(v: DVec2) -> bool {
    v.x.is_finite() && v.y.is_finite()
}
