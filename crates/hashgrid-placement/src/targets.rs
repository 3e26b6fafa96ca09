//! Per-node target counts.
//!
//! Routees are dealt to eligible nodes one per node per round, in
//! ascending address order, until the budget is spent or every node is
//! at its cap. Because every node shares the same cap the rounds can be
//! computed in closed form.

use std::collections::BTreeMap;

use hashgrid_core::NodeAddress;

/// Target routee count for each node in `eligible`.
///
/// `eligible` must be sorted ascending and free of duplicates. Nodes that
/// receive nothing are still present with a target of zero. The round
/// starts at the first (lowest) address.
pub fn compute_targets(
    eligible: &[NodeAddress],
    budget: u32,
    max_per_node: u32,
) -> BTreeMap<NodeAddress, u32> {
    let mut targets: BTreeMap<NodeAddress, u32> =
        eligible.iter().map(|n| (n.clone(), 0)).collect();
    if eligible.is_empty() || budget == 0 || max_per_node == 0 {
        return targets;
    }

    let n = eligible.len() as u64;
    let budget = u64::from(budget);
    let full_rounds = (budget / n).min(u64::from(max_per_node));
    let mut remaining = budget - full_rounds * n;

    for node in eligible {
        let mut target = full_rounds;
        if remaining > 0 && target < u64::from(max_per_node) {
            target += 1;
            remaining -= 1;
        }
        // target <= max_per_node, so the narrowing is lossless.
        targets.insert(node.clone(), target as u32);
    }

    targets
}
