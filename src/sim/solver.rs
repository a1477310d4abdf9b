//! Constraint solver
//!
//! One sweep visits every binding once, in topology order, and splits each
//! length error evenly between the two points. The visiting order changes the
//! result, so it must never be reordered.

use super::state::Point;
use super::topology::{BindingKind, BindingMask, Topology};

/// Result of one sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sweep {
    /// Bindings still active after the sweep
    pub active: BindingMask,
    /// Bindings that broke during the sweep
    pub newly_severed: BindingMask,
}

/// Run one solver sweep over `points`
///
/// Severed bindings are skipped. A scarf stretched past its break length is
/// severed before any correction is applied; if it is critical, every critical
/// binding goes with it. Coincident points have no direction to correct along
/// and are left alone.
pub fn solve(points: &mut [Point], topology: &Topology, severed: &mut BindingMask) -> Sweep {
    let mut newly_severed = BindingMask::EMPTY;

    for (i, binding) in topology.bindings().iter().enumerate() {
        if severed.contains(i) {
            continue;
        }

        let a = binding.a.index();
        let b = binding.b.index();
        let delta = points[a].pos - points[b].pos;
        let length = delta.length();
        let rest = binding.rest_length;

        match binding.kind {
            BindingKind::Repel if length >= rest => continue,
            BindingKind::Scarf { break_factor } if length > rest * break_factor => {
                let lost = if topology.critical().contains(i) {
                    topology.critical()
                } else {
                    BindingMask::single(i)
                };
                let lost = BindingMask(lost.0 & !severed.0);
                log::trace!("Binding {i} broke at length {length} (rest {rest}), severing {lost:?}");
                *severed = severed.union(lost);
                newly_severed = newly_severed.union(lost);
                continue;
            }
            _ => {}
        }

        if length < f64::EPSILON {
            continue;
        }

        let correction = delta * ((length - rest) / length * 0.5);
        points[a].pos -= correction;
        points[b].pos += correction;
    }

    Sweep {
        active: active_mask(topology, *severed),
        newly_severed,
    }
}

/// Bindings of `topology` not in `severed`
pub fn active_mask(topology: &Topology, severed: BindingMask) -> BindingMask {
    let count = topology.bindings().len();
    let all = if count >= 64 { u64::MAX } else { (1u64 << count) - 1 };
    BindingMask(all & !severed.0)
}
