//! Immutable routing snapshot published by the owner task.

use std::collections::BTreeMap;

use hashgrid_core::RouteeId;
use hashgrid_ring::HashRing;

use crate::envelope::{RouteeInfo, RouteesSnapshot};
use crate::routee::RouteeRef;

/// What readers see: the ring and the handles it points at.
///
/// Every ring member has a handle in `routees` and vice versa.
pub(crate) struct RoutingTable<M> {
    pub(crate) ring: HashRing<RouteeId>,
    pub(crate) routees: BTreeMap<RouteeId, RouteeRef<M>>,
    pub(crate) target_total: u32,
    /// Set once the router has shut down.
    pub(crate) closed: bool,
}

impl<M> RoutingTable<M> {
    pub(crate) fn empty(virtual_nodes_factor: u32, target_total: u32) -> Self {
        Self {
            ring: HashRing::new(virtual_nodes_factor),
            routees: BTreeMap::new(),
            target_total,
            closed: false,
        }
    }

    pub(crate) fn closed(virtual_nodes_factor: u32, target_total: u32) -> Self {
        Self {
            closed: true,
            ..Self::empty(virtual_nodes_factor, target_total)
        }
    }

    pub(crate) fn snapshot(&self) -> RouteesSnapshot {
        let routees: Vec<RouteeInfo> = self
            .routees
            .keys()
            .map(|id| RouteeInfo {
                routee_id: id.clone(),
                node_address: id.node.clone(),
            })
            .collect();
        let shortfall = self.target_total.saturating_sub(routees.len() as u32);
        RouteesSnapshot {
            routees,
            target_total: self.target_total,
            shortfall,
        }
    }
}
