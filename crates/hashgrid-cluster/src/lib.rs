//! hashgrid-cluster — membership handling for HashGrid routers.
//!
//! Membership detection (gossip, failure detection) is done elsewhere;
//! this crate consumes the resulting event feed and turns it into the
//! placement view the routee pool works from.
//!
//! # Architecture
//!
//! ```text
//! membership feed ──► MembershipReactor
//!                       ├── rejects stale versions
//!                       ├── Joining → Up → Unreachable → (grace) → removed
//!                       └── placement_candidates() ──► RouteePool::reconcile
//! ```

pub mod event;
pub mod reactor;

pub use event::{EventKind, MembershipEvent};
pub use reactor::{MemberStatus, MemberView, MembershipReactor, ReactorError, ReactorResult};
