//! Router error types.

use thiserror::Error;

use hashgrid_core::{PolicyError, RouteeId};

/// Errors returned to callers of the router.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("no routees available")]
    NoRouteesAvailable,

    #[error("message carries no hash key and the extractor produced none")]
    NoHashKey,

    #[error("router is shut down")]
    ShutDown,

    #[error("delivery to routee {routee} failed: {source}")]
    Delivery {
        routee: RouteeId,
        #[source]
        source: DeliveryError,
    },

    #[error("invalid routing policy: {0}")]
    Policy(#[from] PolicyError),
}

pub type RouterResult<T> = Result<T, RouterError>;

/// A routee refused a message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("routee is stopped")]
    Stopped,

    #[error("routee mailbox is full")]
    MailboxFull,
}

/// The worker behind a routee could not be created on its node.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("failed to create routee {routee}: {reason}")]
pub struct SpawnError {
    pub routee: RouteeId,
    pub reason: String,
}

impl SpawnError {
    pub fn new(routee: &RouteeId, reason: impl Into<String>) -> Self {
        Self {
            routee: routee.clone(),
            reason: reason.into(),
        }
    }
}
