//! hashgrid-router — cluster-aware consistent-hashing router.
//!
//! Keeps a pool of routees spread over the live cluster members and sends
//! each message to exactly one of them, chosen by consistent hashing of
//! the message's key.
//!
//! # Architecture
//!
//! ```text
//! membership feed ─► Owner task (single writer)
//!                      ├── MembershipReactor  (event order, grace expiry)
//!                      ├── RouteePool         (placement diff)
//!                      ├── RouteeFactory      (create / stop workers)
//!                      └── ArcSwap<RoutingTable>  ◄── one atomic store per change
//!
//! callers ─► Router::route()  ── load table ─► HashRing lookup ─► RouteeHandle::tell
//! ```
//!
//! Readers never take a lock. Different router instances observing the
//! same membership build identical tables, so they agree on routing once
//! membership stops changing.

pub mod envelope;
pub mod error;
pub mod extractor;
mod owner;
pub mod routee;
pub mod router;
pub mod stats;
mod table;

pub use envelope::{RouteEnvelope, RouteeInfo, RouteesSnapshot};
pub use error::{DeliveryError, RouterError, RouterResult, SpawnError};
pub use extractor::{ConsistentHashable, HashKeyExtractor, HashableExtractor};
pub use routee::{ChannelRouteeFactory, MessageHandler, RouteeFactory, RouteeHandle, RouteeRef};
pub use router::{MembershipFeed, Router, RouterBuilder};
pub use stats::StatsSnapshot;
