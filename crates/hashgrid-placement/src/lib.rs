//! HashGrid routee placement.
//!
//! Decides which cluster nodes host routees and how many. Placement is a
//! pure function of the membership view and the [`RoutingPolicy`], so
//! every router instance that sees the same members computes the same
//! routee set. The pool does NOT create workers itself; it returns a
//! [`PlacementDiff`] that the router applies.
//!
//! # Components
//!
//! - **`pool`** — `RouteePool`: live routee set, reconcile, diffs
//! - **`targets`** — per-node target counts (round-robin water-filling)
//!
//! [`RoutingPolicy`]: hashgrid_core::RoutingPolicy

pub mod pool;
pub mod targets;

pub use pool::{PlacementCandidate, PlacementDiff, RouteePool};
pub use targets::compute_targets;
