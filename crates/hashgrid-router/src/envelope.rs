//! Messages exchanged at the router boundary.

use serde::Serialize;

use hashgrid_core::{HashKey, NodeAddress, RouteeId};

/// Inbound routing request.
#[derive(Debug, Clone)]
pub struct RouteEnvelope<M> {
    pub payload: M,
    /// Overrides the configured extractor when present.
    pub explicit_hash_key: Option<HashKey>,
}

impl<M> RouteEnvelope<M> {
    /// Route by the configured extractor.
    pub fn new(payload: M) -> Self {
        Self {
            payload,
            explicit_hash_key: None,
        }
    }

    /// Route by an explicit key.
    pub fn with_key(payload: M, key: impl Into<HashKey>) -> Self {
        Self {
            payload,
            explicit_hash_key: Some(key.into()),
        }
    }
}

/// One routee in a [`RouteesSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteeInfo {
    pub routee_id: RouteeId,
    pub node_address: NodeAddress,
}

/// Answer to a list-routees query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteesSnapshot {
    /// Routees in ascending id order.
    pub routees: Vec<RouteeInfo>,
    /// Configured `total_instances`.
    pub target_total: u32,
    /// Routees missing because too few eligible nodes exist.
    pub shortfall: u32,
}

impl RouteesSnapshot {
    pub fn len(&self) -> usize {
        self.routees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routees.is_empty()
    }

    /// Distinct node addresses hosting routees, ascending.
    pub fn node_addresses(&self) -> Vec<NodeAddress> {
        let mut nodes: Vec<NodeAddress> =
            self.routees.iter().map(|r| r.node_address.clone()).collect();
        nodes.dedup();
        nodes
    }

    /// Number of routees hosted on `node`.
    pub fn count_on(&self, node: &NodeAddress) -> usize {
        self.routees.iter().filter(|r| &r.node_address == node).count()
    }
}
