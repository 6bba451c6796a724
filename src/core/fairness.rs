//! Fair selection of waiting jobs for one dispatch tick.
//!
//! Higher priority tiers are fully considered before lower ones. Inside a tier
//! each group key is capped by its remaining allowance and the groups are
//! interleaved round-robin, so one group with a large backlog cannot starve
//! its siblings. Jobs picked in a higher tier count against their group's
//! allowance in the lower tiers.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::core::job::JobInstance;
use crate::util::serde::Priority;

/// Remaining concurrency for `group` given the running counts.
#[must_use]
pub fn group_allowance(
    running_by_group: &HashMap<String, usize>,
    group: &str,
    max_per_group: usize,
) -> usize {
    running_by_group
        .get(group)
        .map_or(max_per_group, |running| max_per_group.saturating_sub(*running))
}

/// Choose and order the candidates to dispatch this tick.
///
/// `candidates` must already be eligible (Waiting, scheduled at or before
/// now). `running_by_group` counts Running jobs across **all** queues. The
/// result never exceeds `available_slots`.
#[must_use]
pub fn select_fair(
    candidates: Vec<JobInstance>,
    running_by_group: &HashMap<String, usize>,
    max_per_group: usize,
    available_slots: usize,
) -> Vec<JobInstance> {
    if available_slots == 0 || candidates.is_empty() {
        return Vec::new();
    }

    let mut tiers: BTreeMap<Reverse<Priority>, Vec<JobInstance>> = BTreeMap::new();
    for job in candidates {
        tiers.entry(Reverse(job.priority)).or_default().push(job);
    }

    let mut selected = Vec::with_capacity(available_slots);
    let mut taken: HashMap<String, usize> = HashMap::new();
    for (_, tier) in tiers {
        let remaining = available_slots - selected.len();
        selected.extend(select_tier(
            tier,
            running_by_group,
            max_per_group,
            remaining,
            &mut taken,
        ));
        if selected.len() >= available_slots {
            break;
        }
    }
    selected
}

/// Round-robin over the capped groups of a single priority tier.
fn select_tier(
    mut tier: Vec<JobInstance>,
    running_by_group: &HashMap<String, usize>,
    max_per_group: usize,
    limit: usize,
    taken: &mut HashMap<String, usize>,
) -> Vec<JobInstance> {
    tier.sort_by(|a, b| {
        a.scheduled_at_ms
            .cmp(&b.scheduled_at_ms)
            .then_with(|| a.id.cmp(&b.id))
    });

    // Groups keep the order of their earliest candidate.
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<VecDeque<JobInstance>> = Vec::new();
    for job in tier {
        let slot = *index.entry(job.group_key.clone()).or_insert_with(|| {
            groups.push(VecDeque::new());
            groups.len() - 1
        });
        let allowance = group_allowance(running_by_group, &job.group_key, max_per_group)
            .saturating_sub(taken.get(&job.group_key).copied().unwrap_or(0));
        if groups[slot].len() < allowance {
            groups[slot].push_back(job);
        }
    }

    let mut out = Vec::new();
    while out.len() < limit && groups.iter().any(|g| !g.is_empty()) {
        for group in &mut groups {
            if out.len() >= limit {
                break;
            }
            if let Some(job) = group.pop_front() {
                *taken.entry(job.group_key.clone()).or_insert(0) += 1;
                out.push(job);
            }
        }
    }
    out
}
