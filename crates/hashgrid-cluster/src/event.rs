//! Membership events as delivered by the cluster membership service.

use serde::{Deserialize, Serialize};

use hashgrid_core::{ClusterNode, NodeAddress};

/// Kind of membership transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Joining,
    Up,
    Unreachable,
    Removed,
}

/// A single membership notification.
///
/// `version` is the cluster view version the event belongs to. Versions
/// never decrease across the feed; one view may carry several events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipEvent {
    pub kind: EventKind,
    pub node: ClusterNode,
    pub version: u64,
}

impl MembershipEvent {
    pub fn new(kind: EventKind, node: ClusterNode, version: u64) -> Self {
        Self { kind, node, version }
    }

    pub fn joining(node: ClusterNode, version: u64) -> Self {
        Self::new(EventKind::Joining, node, version)
    }

    pub fn up(node: ClusterNode, version: u64) -> Self {
        Self::new(EventKind::Up, node, version)
    }

    pub fn unreachable(node: ClusterNode, version: u64) -> Self {
        Self::new(EventKind::Unreachable, node, version)
    }

    pub fn removed(node: ClusterNode, version: u64) -> Self {
        Self::new(EventKind::Removed, node, version)
    }

    pub fn address(&self) -> &NodeAddress {
        &self.node.address
    }
}
