pub mod config;
pub mod error;
pub mod types;

pub use config::{HashGridConfig, RouterConfig, RoutingPolicy};
pub use error::{AddressError, PolicyError, PolicyResult};
pub use types::*;
