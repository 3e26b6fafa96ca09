//! hashgrid-ring — consistent-hash ring for routee selection.
//!
//! Each member contributes `virtual_nodes_factor` entries to a ring of
//! `u64` positions. A key is owned by the first entry at or after its
//! hash, wrapping around at the end of the ring.
//!
//! # Properties
//!
//! - **Deterministic**: the same member set and factor produce the same
//!   ring in every process, so independent routers agree on ownership.
//! - **Minimal remapping**: removing a member only moves the keys that
//!   member owned; adding one only takes keys from its neighbours.
//!
//! The hash function is fixed (see [`hash`]) and never seeded per process.

pub mod hash;
mod ring;

pub use hash::hash_bytes;
pub use ring::{HashRing, RingEntry, RingError, RingResult};
