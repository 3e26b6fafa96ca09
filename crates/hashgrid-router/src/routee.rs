//! Routee handles and the factories that create them.
//!
//! A routee handle is the router's only view of a worker: it can be told
//! a message (fire-and-forget) and stopped. How the worker is actually
//! hosted on its node is up to the [`RouteeFactory`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use hashgrid_core::{ClusterNode, RouteeId};

use crate::error::{DeliveryError, SpawnError};

/// A placed worker that accepts messages of type `M`.
pub trait RouteeHandle<M>: Send + Sync {
    /// Hand a message to the worker without waiting for it to be processed.
    fn tell(&self, message: M) -> Result<(), DeliveryError>;

    /// Release the worker. Messages told afterwards are rejected.
    fn stop(&self);
}

/// Shared reference to a routee handle.
pub type RouteeRef<M> = Arc<dyn RouteeHandle<M>>;

/// Creates the worker behind a routee on its hosting node.
pub trait RouteeFactory<M>: Send + Sync {
    fn spawn(&self, id: &RouteeId, node: &ClusterNode) -> Result<RouteeRef<M>, SpawnError>;
}

impl<M, F> RouteeFactory<M> for F
where
    F: Fn(&RouteeId, &ClusterNode) -> Result<RouteeRef<M>, SpawnError> + Send + Sync,
{
    fn spawn(&self, id: &RouteeId, node: &ClusterNode) -> Result<RouteeRef<M>, SpawnError> {
        self(id, node)
    }
}

/// Message handler run by [`ChannelRouteeFactory`] workers.
pub type MessageHandler<M> = Arc<dyn Fn(&RouteeId, M) + Send + Sync>;

/// Backs every routee with an in-process tokio task fed by an mpsc channel.
///
/// Must be used from within a tokio runtime.
pub struct ChannelRouteeFactory<M> {
    handler: MessageHandler<M>,
}

impl<M: Send + 'static> ChannelRouteeFactory<M> {
    pub fn new<H>(handler: H) -> Self
    where
        H: Fn(&RouteeId, M) + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
        }
    }
}

impl<M: Send + 'static> RouteeFactory<M> for ChannelRouteeFactory<M> {
    fn spawn(&self, id: &RouteeId, _node: &ClusterNode) -> Result<RouteeRef<M>, SpawnError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<M>();
        let cancel = CancellationToken::new();

        let task_cancel = cancel.clone();
        let handler = self.handler.clone();
        let routee = id.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    message = rx.recv() => match message {
                        Some(message) => handler(&routee, message),
                        None => break,
                    },
                }
            }
            debug!(%routee, "routee worker stopped");
        });

        Ok(Arc::new(ChannelRoutee { tx, cancel }))
    }
}

struct ChannelRoutee<M> {
    tx: mpsc::UnboundedSender<M>,
    cancel: CancellationToken,
}

impl<M: Send> RouteeHandle<M> for ChannelRoutee<M> {
    fn tell(&self, message: M) -> Result<(), DeliveryError> {
        if self.cancel.is_cancelled() {
            return Err(DeliveryError::Stopped);
        }
        self.tx.send(message).map_err(|_| DeliveryError::Stopped)
    }

    fn stop(&self) {
        self.cancel.cancel();
    }
}
