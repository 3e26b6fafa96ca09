//! Error types for HashGrid configuration and addressing.

use thiserror::Error;

/// Result type alias for policy validation.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Errors parsing a node address string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address has no actor system name: {0}")]
    MissingSystem(String),

    #[error("address has an empty host: {0}")]
    MissingHost(String),

    #[error("address has an invalid port: {0}")]
    InvalidPort(String),
}

/// Malformed routing configuration. Fatal at router startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("total_instances must not be negative, got {0}")]
    NegativeTotalInstances(i64),

    #[error("max_instances_per_node must be positive, got {0}")]
    NonPositiveMaxPerNode(i64),

    #[error("virtual_nodes_factor must be positive, got {0}")]
    NonPositiveVirtualNodes(i64),

    #[error("{field} is out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },

    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("role_filter must not be empty")]
    EmptyRole,
}
