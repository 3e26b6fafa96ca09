//! Hash key extraction for messages sent without an explicit key.

use std::marker::PhantomData;

use hashgrid_core::HashKey;

/// Derives the hash key of a message.
///
/// Configured once at router construction. Returning `None` means the
/// message cannot be routed.
pub trait HashKeyExtractor<M>: Send + Sync {
    fn extract_key(&self, message: &M) -> Option<HashKey>;
}

impl<M, F> HashKeyExtractor<M> for F
where
    F: Fn(&M) -> Option<HashKey> + Send + Sync,
{
    fn extract_key(&self, message: &M) -> Option<HashKey> {
        self(message)
    }
}

/// Messages that carry their own hash key.
pub trait ConsistentHashable {
    fn consistent_hash_key(&self) -> HashKey;
}

/// Extractor for message types implementing [`ConsistentHashable`].
pub struct HashableExtractor<M>(PhantomData<fn(&M)>);

impl<M> HashableExtractor<M> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<M> Default for HashableExtractor<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: ConsistentHashable> HashKeyExtractor<M> for HashableExtractor<M> {
    fn extract_key(&self, message: &M) -> Option<HashKey> {
        Some(message.consistent_hash_key())
    }
}
