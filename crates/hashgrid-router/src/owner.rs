//! Owner task — the single writer of a router's pool and ring.
//!
//! Membership events, flush barriers, and shutdown requests are queued on
//! one channel and handled strictly in order. After every pool change the
//! owner publishes a fresh [`RoutingTable`] with a single atomic swap.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use hashgrid_cluster::{MembershipEvent, MembershipReactor};
use hashgrid_core::{ClusterNode, NodeAddress, RouteeId};
use hashgrid_placement::RouteePool;
use hashgrid_ring::HashRing;

use crate::routee::{RouteeFactory, RouteeRef};
use crate::stats::RouterStats;
use crate::table::RoutingTable;

/// How long shutdown waits for in-flight routes to let go of the table.
pub(crate) const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Requests queued for the owner task.
pub(crate) enum Command {
    Membership(MembershipEvent),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

pub(crate) struct Owner<M> {
    pub(crate) pool: RouteePool,
    pub(crate) reactor: MembershipReactor,
    pub(crate) ring: HashRing<RouteeId>,
    pub(crate) routees: BTreeMap<RouteeId, RouteeRef<M>>,
    pub(crate) factory: Box<dyn RouteeFactory<M>>,
    pub(crate) table: Arc<ArcSwap<RoutingTable<M>>>,
    pub(crate) stats: Arc<RouterStats>,
    pub(crate) commands: mpsc::UnboundedReceiver<Command>,
}

impl<M: Send + 'static> Owner<M> {
    /// Run until shutdown is requested or every sender is dropped.
    pub(crate) async fn run(mut self) {
        debug!("router owner task started");
        loop {
            let deadline = self.reactor.next_expiry().map(Instant::from_std);

            tokio::select! {
                biased;

                _ = sleep_until(deadline) => {
                    self.expire_unreachable();
                }

                command = self.commands.recv() => {
                    // A grace deadline may have passed while the queue was busy.
                    self.expire_unreachable();
                    match command {
                        Some(Command::Membership(event)) => self.on_membership(event),
                        Some(Command::Flush(ack)) => {
                            let _ = ack.send(());
                        }
                        Some(Command::Shutdown(ack)) => {
                            self.shutdown().await;
                            let _ = ack.send(());
                            break;
                        }
                        None => {
                            self.shutdown().await;
                            break;
                        }
                    }
                }
            }
        }
        debug!("router owner task finished");
    }

    fn on_membership(&mut self, event: MembershipEvent) {
        match self.reactor.apply(&event, now()) {
            Ok(true) => self.reconcile(),
            Ok(false) => {}
            // Already logged by the reactor; stale events are dropped.
            Err(e) => debug!(error = %e, "membership event discarded"),
        }
    }

    fn expire_unreachable(&mut self) {
        if !self.reactor.expire_unreachable(now()).is_empty() {
            self.reconcile();
        }
    }

    /// Apply the placement diff for the current membership view.
    fn reconcile(&mut self) {
        self.stats.record_reconcile();

        let candidates = self.reactor.placement_candidates(now());
        let diff = self.pool.reconcile(&candidates);
        if diff.is_empty() {
            return;
        }

        let nodes: BTreeMap<&NodeAddress, &ClusterNode> = candidates
            .iter()
            .map(|c| (&c.node.address, &c.node))
            .collect();

        let mut stopped = Vec::with_capacity(diff.destroyed.len());
        for id in &diff.destroyed {
            self.ring.remove(id);
            if let Some(handle) = self.routees.remove(id) {
                stopped.push((id.clone(), handle));
            }
        }

        for id in &diff.created {
            let Some(node) = nodes.get(&id.node) else {
                // Created routees always come from the candidate list.
                self.pool.discard(id);
                continue;
            };
            match self.factory.spawn(id, node) {
                Ok(handle) => {
                    self.ring.add(id.clone());
                    self.routees.insert(id.clone(), handle);
                    debug!(routee = %id, "routee created");
                }
                Err(e) => {
                    // Retried on the next membership-driven reconcile.
                    self.stats.record_spawn_failure();
                    self.pool.discard(id);
                    warn!(routee = %id, error = %e, "routee creation failed");
                }
            }
        }

        self.publish();

        // Readers of the previous table may still hold these; stop them
        // only once the new table is visible.
        for (id, handle) in stopped {
            handle.stop();
            debug!(routee = %id, "routee stopped");
        }
    }

    fn publish(&self) {
        let policy = self.pool.policy();
        self.table.store(Arc::new(RoutingTable {
            ring: self.ring.clone(),
            routees: self.routees.clone(),
            target_total: policy.total_instances,
            closed: false,
        }));
        debug!(routees = self.routees.len(), "routing table published");
    }

    /// Close the table, wait for in-flight routes, then release every routee.
    async fn shutdown(&mut self) {
        self.commands.close();
        let policy = self.pool.policy();
        let previous = self.table.swap(Arc::new(RoutingTable::closed(
            policy.virtual_nodes_factor,
            policy.total_instances,
        )));

        // Readers only hold a table for the length of one route call, so
        // the count drops to one quickly. A clone still held after the
        // deadline is reported and shutdown goes ahead regardless.
        let deadline = Instant::now() + SHUTDOWN_DRAIN_TIMEOUT;
        while Arc::strong_count(&previous) > 1 {
            if Instant::now() >= deadline {
                warn!(
                    holders = Arc::strong_count(&previous) - 1,
                    timeout_ms = SHUTDOWN_DRAIN_TIMEOUT.as_millis() as u64,
                    "routing table still referenced after drain timeout"
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        drop(previous);

        let released = self.routees.len();
        for (_, handle) in std::mem::take(&mut self.routees) {
            handle.stop();
        }
        self.pool.drain();
        self.ring = HashRing::new(self.ring.virtual_nodes_factor());

        info!(released, "router shut down");
    }
}

fn now() -> std::time::Instant {
    Instant::now().into_std()
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
