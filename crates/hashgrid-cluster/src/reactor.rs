//! Membership reactor — per-node state machine over membership events.
//!
//! Tracks the status of every known node, rejects out-of-order events,
//! and decides when a routee reconcile is needed. Only `Up` nodes receive
//! new routees; `Unreachable` nodes keep theirs until they come back or
//! their grace period runs out.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use hashgrid_core::{ClusterNode, NodeAddress};
use hashgrid_placement::PlacementCandidate;

use crate::event::{EventKind, MembershipEvent};

/// Errors from applying membership events.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReactorError {
    #[error("stale membership event: version {version} < last applied {last_applied}")]
    StaleMembershipEvent { version: u64, last_applied: u64 },
}

pub type ReactorResult<T> = Result<T, ReactorError>;

/// Status of a tracked node. Removed nodes are forgotten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Joining,
    Up,
    Unreachable,
}

/// A node as tracked by the reactor.
#[derive(Debug, Clone)]
struct Member {
    node: ClusterNode,
    status: MemberStatus,
    unreachable_since: Option<Instant>,
}

/// Introspection view of a tracked node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberView {
    pub address: NodeAddress,
    pub status: MemberStatus,
}

/// Applies membership events one at a time, in version order.
pub struct MembershipReactor {
    members: BTreeMap<NodeAddress, Member>,
    /// How long an unreachable node keeps its routees.
    unreachable_grace: Duration,
    last_version: Option<u64>,
}

impl MembershipReactor {
    pub fn new(unreachable_grace: Duration) -> Self {
        Self {
            members: BTreeMap::new(),
            unreachable_grace,
            last_version: None,
        }
    }

    /// Apply one event. Returns `true` when the routee pool must be reconciled.
    ///
    /// Events older than the last applied version are rejected and leave
    /// the state untouched. Several events may share one version.
    pub fn apply(&mut self, event: &MembershipEvent, now: Instant) -> ReactorResult<bool> {
        if let Some(last_applied) = self.last_version {
            if event.version < last_applied {
                warn!(
                    version = event.version,
                    last_applied,
                    node = %event.address(),
                    "discarding stale membership event"
                );
                return Err(ReactorError::StaleMembershipEvent {
                    version: event.version,
                    last_applied,
                });
            }
        }
        self.last_version = Some(event.version);

        let address = event.address().clone();
        let previous = self.members.get(&address).map(|m| m.status);

        let reconcile = match event.kind {
            EventKind::Joining => {
                if previous.is_none() {
                    self.members.insert(
                        address.clone(),
                        Member {
                            node: event.node.clone(),
                            status: MemberStatus::Joining,
                            unreachable_since: None,
                        },
                    );
                    debug!(node = %address, "node joining");
                } else {
                    debug!(node = %address, ?previous, "ignoring joining event for known node");
                }
                false
            }
            EventKind::Up => {
                self.members.insert(
                    address.clone(),
                    Member {
                        node: event.node.clone(),
                        status: MemberStatus::Up,
                        unreachable_since: None,
                    },
                );
                if previous == Some(MemberStatus::Up) {
                    false
                } else {
                    info!(node = %address, ?previous, "node up");
                    true
                }
            }
            EventKind::Unreachable => match self.members.get_mut(&address) {
                Some(member) if member.status != MemberStatus::Unreachable => {
                    member.status = MemberStatus::Unreachable;
                    member.unreachable_since = Some(now);
                    warn!(
                        node = %address,
                        grace_ms = self.unreachable_grace.as_millis() as u64,
                        "node unreachable"
                    );
                    false
                }
                Some(_) => false,
                None => {
                    debug!(node = %address, "ignoring unreachable event for unknown node");
                    false
                }
            },
            EventKind::Removed => match self.members.remove(&address) {
                Some(member) => {
                    info!(node = %address, previous = ?member.status, "node removed");
                    member.status != MemberStatus::Joining
                }
                None => {
                    debug!(node = %address, "ignoring removed event for unknown node");
                    false
                }
            },
        };

        Ok(reconcile)
    }

    /// Forget unreachable nodes whose grace period has run out.
    ///
    /// Returns the expired addresses; a non-empty result means the pool
    /// must be reconciled.
    pub fn expire_unreachable(&mut self, now: Instant) -> Vec<NodeAddress> {
        let grace = self.unreachable_grace;
        let expired: Vec<NodeAddress> = self
            .members
            .iter()
            .filter(|(_, m)| is_expired(m, grace, now))
            .map(|(addr, _)| addr.clone())
            .collect();

        for address in &expired {
            self.members.remove(address);
            warn!(node = %address, "unreachable grace expired, treating node as removed");
        }
        expired
    }

    /// Earliest instant at which an unreachable node's grace runs out.
    ///
    /// A deadline past the range of [`Instant`] never fires.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.members
            .values()
            .filter_map(|m| m.unreachable_since)
            .filter_map(|since| since.checked_add(self.unreachable_grace))
            .min()
    }

    /// The membership view for placement at `now`.
    ///
    /// `Up` nodes accept new routees; unreachable nodes still within
    /// their grace period only keep what they have.
    pub fn placement_candidates(&self, now: Instant) -> Vec<PlacementCandidate> {
        self.members
            .values()
            .filter_map(|m| match m.status {
                MemberStatus::Up => Some(PlacementCandidate::up(m.node.clone())),
                MemberStatus::Unreachable if !is_expired(m, self.unreachable_grace, now) => {
                    Some(PlacementCandidate::retained(m.node.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Tracked nodes in address order.
    pub fn members(&self) -> Vec<MemberView> {
        self.members
            .iter()
            .map(|(address, m)| MemberView {
                address: address.clone(),
                status: m.status,
            })
            .collect()
    }

    pub fn status(&self, address: &NodeAddress) -> Option<MemberStatus> {
        self.members.get(address).map(|m| m.status)
    }

    pub fn last_version(&self) -> Option<u64> {
        self.last_version
    }

    pub fn unreachable_grace(&self) -> Duration {
        self.unreachable_grace
    }
}

fn is_expired(member: &Member, grace: Duration, now: Instant) -> bool {
    member.status == MemberStatus::Unreachable
        && member
            .unreachable_since
            .is_some_and(|since| now.saturating_duration_since(since) >= grace)
}
