//! Routee pool — the live routee set and its reconciliation.
//!
//! `reconcile` compares the current routees against the target placement
//! for a membership view and returns the minimal set of routees to create
//! and destroy. Existing routees are kept whenever they fit their node's
//! target, so a stable membership never churns.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use hashgrid_core::{ClusterNode, NodeAddress, RouteeId, RoutingPolicy};

use crate::targets::compute_targets;

/// A member of the membership view handed to [`RouteePool::reconcile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementCandidate {
    pub node: ClusterNode,
    /// `true` for `Up` nodes. `false` nodes (unreachable, within grace)
    /// keep the routees they host but receive no new ones.
    pub accepts_new: bool,
}

impl PlacementCandidate {
    pub fn up(node: ClusterNode) -> Self {
        Self {
            node,
            accepts_new: true,
        }
    }

    pub fn retained(node: ClusterNode) -> Self {
        Self {
            node,
            accepts_new: false,
        }
    }
}

/// Routees to create and destroy, both in ascending id order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlacementDiff {
    pub created: Vec<RouteeId>,
    pub destroyed: Vec<RouteeId>,
}

impl PlacementDiff {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.destroyed.is_empty()
    }
}

/// The set of live routees plus the policy that shapes it.
#[derive(Debug, Clone)]
pub struct RouteePool {
    policy: RoutingPolicy,
    /// Address of the node running this router (for `allow_local_routees`).
    self_address: NodeAddress,
    routees: BTreeSet<RouteeId>,
}

impl RouteePool {
    pub fn new(policy: RoutingPolicy, self_address: NodeAddress) -> Self {
        Self {
            policy,
            self_address,
            routees: BTreeSet::new(),
        }
    }

    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    /// Bring the pool in line with a membership view.
    ///
    /// 1. Routees on nodes absent from `candidates`, or on nodes that fail
    ///    the policy, are destroyed.
    /// 2. Retained-only nodes keep their routees; these count against
    ///    `total_instances`.
    /// 3. The rest of the budget is dealt round-robin over eligible `Up`
    ///    nodes in address order, capped per node.
    /// 4. Each eligible node keeps its lowest slots up to its target and
    ///    creates the missing ones at the lowest free slots.
    pub fn reconcile(&mut self, candidates: &[PlacementCandidate]) -> PlacementDiff {
        let mut diff = PlacementDiff::default();

        let mut eligible: Vec<NodeAddress> = Vec::new();
        let mut retained: BTreeSet<&NodeAddress> = BTreeSet::new();
        for candidate in candidates {
            let address = &candidate.node.address;
            if !self.policy.is_eligible(&candidate.node, &self.self_address) {
                continue;
            }
            if candidate.accepts_new {
                eligible.push(address.clone());
            } else {
                retained.insert(address);
            }
        }
        eligible.sort();
        eligible.dedup();
        retained.retain(|a| eligible.binary_search(*a).is_err());

        let mut slots_by_node: BTreeMap<NodeAddress, Vec<u32>> = BTreeMap::new();
        for id in &self.routees {
            let keep = eligible.binary_search(&id.node).is_ok() || retained.contains(&id.node);
            if keep {
                slots_by_node.entry(id.node.clone()).or_default().push(id.slot);
            } else {
                diff.destroyed.push(id.clone());
            }
        }

        let retained_count: u32 = slots_by_node
            .iter()
            .filter(|(node, _)| retained.contains(node))
            .map(|(_, slots)| slots.len() as u32)
            .sum();
        let budget = self.policy.total_instances.saturating_sub(retained_count);
        let targets = compute_targets(&eligible, budget, self.policy.max_instances_per_node);

        for (node, target) in &targets {
            let target = *target as usize;
            let slots = slots_by_node.remove(node).unwrap_or_default();

            // Slots come out of a BTreeSet of ids grouped by node, so they are ascending.
            for slot in slots.iter().skip(target) {
                diff.destroyed.push(RouteeId::new(node.clone(), *slot));
            }

            let kept: BTreeSet<u32> = slots.iter().take(target).copied().collect();
            let mut missing = target.saturating_sub(kept.len());
            let mut slot = 0u32;
            while missing > 0 {
                if !kept.contains(&slot) {
                    diff.created.push(RouteeId::new(node.clone(), slot));
                    missing -= 1;
                }
                slot += 1;
            }
        }

        for id in &diff.destroyed {
            self.routees.remove(id);
        }
        for id in &diff.created {
            self.routees.insert(id.clone());
        }
        diff.destroyed.sort();
        diff.created.sort();

        if !diff.is_empty() {
            info!(
                created = diff.created.len(),
                destroyed = diff.destroyed.len(),
                live = self.routees.len(),
                "routee pool reconciled"
            );
        } else {
            debug!(live = self.routees.len(), "routee pool already at target");
        }

        let shortfall = self.shortfall();
        if shortfall > 0 {
            warn!(
                target = self.policy.total_instances,
                live = self.routees.len(),
                shortfall,
                "capacity shortfall, not enough eligible nodes for all routees"
            );
        }

        diff
    }

    /// Forget a routee whose worker could not be created.
    ///
    /// The slot stays free until the next reconcile, which will try again.
    pub fn discard(&mut self, id: &RouteeId) -> bool {
        let removed = self.routees.remove(id);
        if removed {
            debug!(routee = %id, "discarded routee");
        }
        removed
    }

    /// Remove every routee, returning them in ascending order.
    pub fn drain(&mut self) -> Vec<RouteeId> {
        std::mem::take(&mut self.routees).into_iter().collect()
    }

    /// Live routees in ascending id order.
    pub fn current_routees(&self) -> Vec<RouteeId> {
        self.routees.iter().cloned().collect()
    }

    pub fn contains(&self, id: &RouteeId) -> bool {
        self.routees.contains(id)
    }

    /// Routee count per hosting node.
    pub fn node_counts(&self) -> BTreeMap<NodeAddress, u32> {
        let mut counts = BTreeMap::new();
        for id in &self.routees {
            *counts.entry(id.node.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// How far the pool is below `total_instances`.
    pub fn shortfall(&self) -> u32 {
        self.policy
            .total_instances
            .saturating_sub(self.routees.len() as u32)
    }

    pub fn len(&self) -> usize {
        self.routees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routees.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(i: u8) -> NodeAddress {
        NodeAddress::new("hashgrid", &format!("10.0.0.{i}"), 2552)
    }

    fn up(i: u8) -> PlacementCandidate {
        PlacementCandidate::up(ClusterNode::new(addr(i)))
    }

    fn pool(total: u32, per_node: u32) -> RouteePool {
        RouteePool::new(RoutingPolicy::new(total, per_node), NodeAddress::local("hashgrid"))
    }

    fn counts(pool: &RouteePool) -> Vec<u32> {
        pool.node_counts().values().copied().collect()
    }

    #[test]
    fn two_nodes_fill_to_cap_with_shortfall() {
        let mut pool = pool(10, 2);
        let diff = pool.reconcile(&[up(1), up(2)]);

        assert_eq!(diff.created.len(), 4);
        assert!(diff.destroyed.is_empty());
        assert_eq!(pool.len(), 4);
        assert_eq!(counts(&pool), vec![2, 2]);
        assert_eq!(pool.shortfall(), 6);
    }

    #[test]
    fn third_node_grows_pool() {
        let mut pool = pool(10, 2);
        pool.reconcile(&[up(1), up(2)]);
        let diff = pool.reconcile(&[up(1), up(2), up(3)]);

        assert_eq!(diff.created, vec![RouteeId::new(addr(3), 0), RouteeId::new(addr(3), 1)]);
        assert!(diff.destroyed.is_empty());
        assert_eq!(pool.len(), 6);
    }

    #[test]
    fn removed_node_keeps_survivors() {
        let mut pool = pool(10, 2);
        pool.reconcile(&[up(1), up(2), up(3)]);
        let survivors: Vec<RouteeId> = pool
            .current_routees()
            .into_iter()
            .filter(|id| id.node != addr(2))
            .collect();

        let diff = pool.reconcile(&[up(1), up(3)]);

        assert_eq!(diff.destroyed.len(), 2);
        assert!(diff.destroyed.iter().all(|id| id.node == addr(2)));
        assert!(diff.created.is_empty());
        for id in &survivors {
            assert!(pool.contains(id));
        }
        assert_eq!(pool.len(), 4);
    }

    #[test]
    fn lower_address_join_rebalances_full_pool() {
        // Placement follows the view, so a newcomer sorting first takes
        // its round-robin share even when the total is already met.
        let mut pool = pool(4, 3);
        pool.reconcile(&[up(2), up(3)]);
        assert_eq!(
            pool.current_routees(),
            vec![
                RouteeId::new(addr(2), 0),
                RouteeId::new(addr(2), 1),
                RouteeId::new(addr(3), 0),
                RouteeId::new(addr(3), 1),
            ]
        );

        let diff = pool.reconcile(&[up(1), up(2), up(3)]);
        assert_eq!(diff.created, vec![RouteeId::new(addr(1), 0), RouteeId::new(addr(1), 1)]);
        assert_eq!(diff.destroyed, vec![RouteeId::new(addr(2), 1), RouteeId::new(addr(3), 1)]);
        assert_eq!(pool.len(), 4);

        let mut fresh = self::pool(4, 3);
        fresh.reconcile(&[up(1), up(2), up(3)]);
        assert_eq!(pool.current_routees(), fresh.current_routees());
    }

    #[test]
    fn removal_redistributes_deficit() {
        let mut pool = pool(4, 3);
        pool.reconcile(&[up(1), up(2), up(3)]);
        assert_eq!(counts(&pool), vec![2, 1, 1]);

        let diff = pool.reconcile(&[up(2), up(3)]);
        assert_eq!(diff.destroyed.len(), 2);
        assert_eq!(diff.created.len(), 2);
        assert_eq!(counts(&pool), vec![2, 2]);
        assert_eq!(pool.len(), 4);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut pool = pool(5, 2);
        let view = [up(1), up(2), up(3)];
        assert!(!pool.reconcile(&view).is_empty());
        assert!(pool.reconcile(&view).is_empty());
    }

    #[test]
    fn zero_total_places_nothing() {
        let mut pool = pool(0, 2);
        assert!(pool.reconcile(&[up(1)]).is_empty());
        assert!(pool.is_empty());
        assert_eq!(pool.shortfall(), 0);
    }

    #[test]
    fn retained_nodes_keep_routees_but_get_none_new() {
        let mut pool = pool(6, 2);
        pool.reconcile(&[up(1), up(2)]);
        assert_eq!(pool.len(), 4);

        let unreachable = PlacementCandidate::retained(ClusterNode::new(addr(1)));
        let diff = pool.reconcile(&[unreachable.clone(), up(2), up(3)]);

        assert!(diff.destroyed.is_empty());
        assert_eq!(diff.created, vec![RouteeId::new(addr(3), 0), RouteeId::new(addr(3), 1)]);
        assert_eq!(pool.node_counts().get(&addr(1)), Some(&2));

        // Retained routees count against the total.
        let mut small = super::tests::pool(3, 2);
        small.reconcile(&[up(1), up(2)]);
        assert_eq!(counts(&small), vec![2, 1]);
        let diff = small.reconcile(&[unreachable, up(2), up(3)]);
        assert!(diff.is_empty());
        assert_eq!(small.len(), 3);
    }

    #[test]
    fn role_filter_excludes_nodes() {
        let policy = RoutingPolicy::new(4, 2).with_role_filter("backend");
        let mut pool = RouteePool::new(policy, NodeAddress::local("hashgrid"));
        let backend = PlacementCandidate::up(ClusterNode::with_roles(addr(1), ["backend"]));
        let frontend = PlacementCandidate::up(ClusterNode::with_roles(addr(2), ["frontend"]));

        pool.reconcile(&[backend, frontend]);
        assert_eq!(pool.node_counts().keys().cloned().collect::<Vec<_>>(), vec![addr(1)]);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn local_routees_can_be_disallowed() {
        let policy = RoutingPolicy::new(4, 2).with_allow_local_routees(false);
        let mut pool = RouteePool::new(policy, addr(1));

        pool.reconcile(&[up(1), up(2)]);
        assert!(pool.current_routees().iter().all(|id| id.node == addr(2)));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn discarded_routee_is_recreated_on_next_reconcile() {
        let mut pool = pool(2, 2);
        let view = [up(1)];
        pool.reconcile(&view);
        let failed = RouteeId::new(addr(1), 0);

        assert!(pool.discard(&failed));
        assert!(!pool.discard(&failed));
        assert_eq!(pool.len(), 1);

        let diff = pool.reconcile(&view);
        assert_eq!(diff.created, vec![failed]);
    }

    #[test]
    fn independent_pools_agree() {
        let mut a = pool(7, 3);
        let mut b = pool(7, 3);
        a.reconcile(&[up(3), up(1), up(2)]);
        b.reconcile(&[up(1), up(2), up(3)]);
        assert_eq!(a.current_routees(), b.current_routees());
    }

    #[test]
    fn converges_regardless_of_join_order() {
        let orders: [[u8; 3]; 3] = [[1, 2, 3], [3, 2, 1], [2, 3, 1]];
        let mut results = Vec::new();
        for order in orders {
            let mut pool = pool(5, 2);
            let mut view = Vec::new();
            for i in order {
                view.push(up(i));
                pool.reconcile(&view);
            }
            results.push(pool.current_routees());
        }
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(results[0].len(), 5);
    }

    #[test]
    fn cap_holds_across_random_views() {
        // Deterministic LCG so the sequence is reproducible.
        let mut seed: u64 = 0x9e3779b97f4a7c15;
        let mut next = move || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) as u32
        };

        let mut pool = pool(9, 2);
        for _ in 0..200 {
            let mut view = Vec::new();
            for i in 0..6u8 {
                if next() % 2 == 0 {
                    continue;
                }
                let node = ClusterNode::new(addr(i));
                if next() % 4 == 0 {
                    view.push(PlacementCandidate::retained(node));
                } else {
                    view.push(PlacementCandidate::up(node));
                }
            }
            pool.reconcile(&view);

            assert!(pool.node_counts().values().all(|&c| c <= 2));
            assert!(pool.len() <= 9);
            assert!(pool.reconcile(&view).is_empty());
        }
    }

    #[test]
    fn drain_empties_pool() {
        let mut pool = pool(4, 2);
        pool.reconcile(&[up(1), up(2)]);
        let drained = pool.drain();
        assert_eq!(drained.len(), 4);
        assert!(pool.is_empty());
    }
}
