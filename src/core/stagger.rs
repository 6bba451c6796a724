//! Spreading first runs of one job type's recurring definitions.
//!
//! An interval is cut into one-minute slots. Each definition owns a slot, and
//! its runs land on the interval boundary plus the slot offset, so a batch of
//! definitions created together does not fire in the same tick.

use std::collections::BTreeMap;
use std::time::Duration;

/// Width of one stagger slot.
pub const STAGGER_STEP: Duration = Duration::from_secs(60);

/// Number of slots in `interval`, at least one.
#[must_use]
pub fn slot_count(interval: Duration) -> u32 {
    let slots = interval.as_millis() / STAGGER_STEP.as_millis();
    u32::try_from(slots).unwrap_or(u32::MAX).max(1)
}

/// Pick a slot for a new definition given the slots of its siblings.
///
/// A free slot is preferred: the first one of the longest run of free slots.
/// When every slot is taken the least shared one wins, lowest first.
#[must_use]
pub fn least_used_slot(used: &[u32], slots: u32) -> u32 {
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for &slot in used.iter().filter(|&&slot| slot < slots) {
        *counts.entry(slot).or_insert(0) += 1;
    }

    if usize::try_from(slots).is_ok_and(|n| n == counts.len()) {
        return counts
            .iter()
            .min_by_key(|&(slot, count)| (*count, *slot))
            .map_or(0, |(slot, _)| *slot);
    }

    let mut best: Option<(u32, u32)> = None;
    let mut start = 0_u32;
    for &bound in counts.keys().chain(std::iter::once(&slots)) {
        let run = bound - start;
        if run > 0 && best.is_none_or(|(_, longest)| run > longest) {
            best = Some((start, run));
        }
        start = bound.saturating_add(1);
    }
    best.map_or(0, |(slot, _)| slot)
}

/// Run time of `slot` in the interval period around `now_ms`.
///
/// With `run_now` the result is at or before now, so the definition is due
/// on the next recurring tick. Otherwise it is the first slot occurrence
/// strictly after now.
#[must_use]
pub fn staggered_run(now_ms: u128, interval: Duration, slot: u32, run_now: bool) -> u128 {
    let step = interval.as_millis();
    if step == 0 {
        return now_ms;
    }
    let offset = u128::from(slot % slot_count(interval)) * STAGGER_STEP.as_millis();
    let at = now_ms - now_ms % step + offset;
    if run_now && at > now_ms {
        at.saturating_sub(step)
    } else if !run_now && at <= now_ms {
        at.saturating_add(step)
    } else {
        at
    }
}
