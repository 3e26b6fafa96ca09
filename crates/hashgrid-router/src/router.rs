//! Router — the message-facing entry point.
//!
//! Callers route against the most recently published [`RoutingTable`];
//! the read path takes no lock and never waits on the owner task.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use hashgrid_cluster::MembershipReactor;
use hashgrid_core::{HashKey, NodeAddress, RouteeId, RoutingPolicy};
use hashgrid_placement::RouteePool;
use hashgrid_ring::HashRing;

use crate::envelope::{RouteEnvelope, RouteesSnapshot};
use crate::error::{RouterError, RouterResult};
use crate::extractor::HashKeyExtractor;
use crate::owner::{Command, Owner};
use crate::routee::RouteeFactory;
use crate::stats::{RouterStats, StatsSnapshot};
use crate::table::RoutingTable;

/// Builds a [`Router`] from a policy and the local node's address.
pub struct RouterBuilder<M> {
    policy: RoutingPolicy,
    self_address: NodeAddress,
    extractor: Option<Arc<dyn HashKeyExtractor<M>>>,
}

impl<M: Send + 'static> RouterBuilder<M> {
    pub fn new(policy: RoutingPolicy, self_address: NodeAddress) -> Self {
        Self {
            policy,
            self_address,
            extractor: None,
        }
    }

    /// Strategy for messages routed without an explicit key.
    pub fn with_extractor<E>(mut self, extractor: E) -> Self
    where
        E: HashKeyExtractor<M> + 'static,
    {
        self.extractor = Some(Arc::new(extractor));
        self
    }

    /// Validate the policy and spawn the owner task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F>(self, factory: F) -> RouterResult<Router<M>>
    where
        F: RouteeFactory<M> + 'static,
    {
        self.policy.validate()?;

        let table = Arc::new(ArcSwap::from_pointee(RoutingTable::empty(
            self.policy.virtual_nodes_factor,
            self.policy.total_instances,
        )));
        let stats = Arc::new(RouterStats::default());
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let owner = Owner {
            reactor: MembershipReactor::new(self.policy.unreachable_grace),
            ring: HashRing::new(self.policy.virtual_nodes_factor),
            pool: RouteePool::new(self.policy.clone(), self.self_address.clone()),
            routees: BTreeMap::new(),
            factory: Box::new(factory),
            table: table.clone(),
            stats: stats.clone(),
            commands: commands_rx,
        };
        tokio::spawn(owner.run());

        info!(
            node = %self.self_address,
            total_instances = self.policy.total_instances,
            max_instances_per_node = self.policy.max_instances_per_node,
            virtual_nodes_factor = self.policy.virtual_nodes_factor,
            "router started"
        );

        Ok(Router {
            shared: Arc::new(Shared {
                table,
                commands: commands_tx,
                extractor: self.extractor,
                stats,
                policy: self.policy,
            }),
        })
    }
}

struct Shared<M> {
    table: Arc<ArcSwap<RoutingTable<M>>>,
    commands: mpsc::UnboundedSender<Command>,
    extractor: Option<Arc<dyn HashKeyExtractor<M>>>,
    stats: Arc<RouterStats>,
    policy: RoutingPolicy,
}

/// A cluster-aware consistent-hashing router.
///
/// Cheap to clone; all clones share one owner task. When the last clone
/// (and every [`MembershipFeed`]) is dropped the router shuts down.
pub struct Router<M> {
    shared: Arc<Shared<M>>,
}

impl<M> Clone for Router<M> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<M: Send + 'static> Router<M> {
    pub fn builder(policy: RoutingPolicy, self_address: NodeAddress) -> RouterBuilder<M> {
        RouterBuilder::new(policy, self_address)
    }

    /// Resolve the target routee and hand it the payload.
    ///
    /// Returns once the message has been handed over, not once it has been
    /// processed.
    pub fn route(&self, envelope: RouteEnvelope<M>) -> RouterResult<RouteeId> {
        let RouteEnvelope {
            payload,
            explicit_hash_key,
        } = envelope;

        let key = match explicit_hash_key {
            Some(key) => key,
            None => match self.extract_key(&payload) {
                Some(key) => key,
                None => {
                    self.shared.stats.record_dropped();
                    return Err(RouterError::NoHashKey);
                }
            },
        };

        let table = self.shared.table.load_full();
        if table.closed {
            self.shared.stats.record_dropped();
            return Err(RouterError::ShutDown);
        }

        let Some((routee, handle)) = table
            .ring
            .lookup_key(key.as_bytes())
            .ok()
            .and_then(|id| table.routees.get_key_value(id))
        else {
            self.shared.stats.record_dropped();
            return Err(RouterError::NoRouteesAvailable);
        };

        if let Err(source) = handle.tell(payload) {
            self.shared.stats.record_dropped();
            return Err(RouterError::Delivery {
                routee: routee.clone(),
                source,
            });
        }

        self.shared.stats.record_routed();
        trace!(%routee, "message routed");
        Ok(routee.clone())
    }

    /// Route `payload` by an explicit key.
    pub fn route_with_key(&self, key: impl Into<HashKey>, payload: M) -> RouterResult<RouteeId> {
        self.route(RouteEnvelope::with_key(payload, key))
    }

    /// Which routee `key` currently maps to, without sending anything.
    pub fn resolve(&self, key: impl Into<HashKey>) -> RouterResult<RouteeId> {
        let key = key.into();
        let table = self.shared.table.load();
        if table.closed {
            return Err(RouterError::ShutDown);
        }
        table
            .ring
            .lookup_key(key.as_bytes())
            .cloned()
            .map_err(|_| RouterError::NoRouteesAvailable)
    }

    /// Deliver a copy of `payload` to every routee in the current snapshot.
    ///
    /// Returns how many routees accepted it.
    pub fn broadcast(&self, payload: M) -> RouterResult<usize>
    where
        M: Clone,
    {
        let table = self.shared.table.load_full();
        if table.closed {
            return Err(RouterError::ShutDown);
        }
        if table.routees.is_empty() {
            self.shared.stats.record_dropped();
            return Err(RouterError::NoRouteesAvailable);
        }

        let mut delivered = 0;
        for (routee, handle) in &table.routees {
            match handle.tell(payload.clone()) {
                Ok(()) => {
                    delivered += 1;
                    self.shared.stats.record_routed();
                }
                Err(e) => {
                    self.shared.stats.record_dropped();
                    debug!(%routee, error = %e, "broadcast delivery failed");
                }
            }
        }
        Ok(delivered)
    }

    /// Current routees and the hosting node of each.
    pub fn list_routees(&self) -> RouteesSnapshot {
        self.shared.table.load().snapshot()
    }

    /// Queue a membership event for the owner task.
    pub fn notify(&self, event: hashgrid_cluster::MembershipEvent) -> RouterResult<()> {
        self.shared
            .commands
            .send(Command::Membership(event))
            .map_err(|_| RouterError::ShutDown)
    }

    /// A handle the membership service can push events through.
    pub fn membership_feed(&self) -> MembershipFeed {
        MembershipFeed {
            commands: self.shared.commands.clone(),
        }
    }

    /// Wait until every command queued before this call has been handled.
    pub async fn flush(&self) -> RouterResult<()> {
        let (tx, rx) = oneshot::channel();
        self.shared
            .commands
            .send(Command::Flush(tx))
            .map_err(|_| RouterError::ShutDown)?;
        rx.await.map_err(|_| RouterError::ShutDown)
    }

    /// Stop accepting traffic, drain in-flight routes, and release all routees.
    ///
    /// Calling it again after the router has stopped is a no-op. If the
    /// owner task died without closing the table, the routees it published
    /// are released here instead.
    pub async fn shutdown(&self) -> RouterResult<()> {
        let (tx, rx) = oneshot::channel();
        if self.shared.commands.send(Command::Shutdown(tx)).is_ok() && rx.await.is_ok() {
            return Ok(());
        }
        self.release_orphaned_table();
        Ok(())
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn policy(&self) -> &RoutingPolicy {
        &self.shared.policy
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.table.load().closed
    }

    /// Close the table left behind by an owner task that is gone.
    fn release_orphaned_table(&self) {
        if self.shared.table.load().closed {
            return;
        }
        let policy = &self.shared.policy;
        let previous = self.shared.table.swap(Arc::new(RoutingTable::closed(
            policy.virtual_nodes_factor,
            policy.total_instances,
        )));
        if previous.closed {
            return;
        }
        warn!(
            routees = previous.routees.len(),
            "router owner task exited abnormally, releasing routees"
        );
        for handle in previous.routees.values() {
            handle.stop();
        }
    }

    fn extract_key(&self, payload: &M) -> Option<HashKey> {
        self.shared
            .extractor
            .as_ref()
            .and_then(|extractor| extractor.extract_key(payload))
    }
}

/// Push side of the membership feed.
#[derive(Clone)]
pub struct MembershipFeed {
    commands: mpsc::UnboundedSender<Command>,
}

impl MembershipFeed {
    pub fn send(&self, event: hashgrid_cluster::MembershipEvent) -> RouterResult<()> {
        self.commands
            .send(Command::Membership(event))
            .map_err(|_| RouterError::ShutDown)
    }
}
