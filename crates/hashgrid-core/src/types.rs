//! Shared types used across HashGrid crates.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AddressError;

/// Address of a cluster member.
///
/// Written as `system@host:port`, or just `system` for the local node
/// (no host and no port). The derived ordering is the stable total order
/// used for placement tie-breaks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeAddress {
    pub system: String,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl NodeAddress {
    /// A remote address `system@host:port`.
    pub fn new(system: &str, host: &str, port: u16) -> Self {
        Self {
            system: system.to_string(),
            host: Some(host.to_string()),
            port: Some(port),
        }
    }

    /// The local address of an actor system (no host, no port).
    pub fn local(system: &str) -> Self {
        Self {
            system: system.to_string(),
            host: None,
            port: None,
        }
    }

    pub fn is_local(&self) -> bool {
        self.host.is_none()
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.host, self.port) {
            (Some(host), Some(port)) => write!(f, "{}@{}:{}", self.system, host, port),
            (Some(host), None) => write!(f, "{}@{}", self.system, host),
            _ => f.write_str(&self.system),
        }
    }
}

impl FromStr for NodeAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (system, authority) = match s.split_once('@') {
            Some((system, authority)) => (system, Some(authority)),
            None => (s, None),
        };
        if system.is_empty() {
            return Err(AddressError::MissingSystem(s.to_string()));
        }

        let Some(authority) = authority else {
            return Ok(Self::local(system));
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| AddressError::InvalidPort(s.to_string()))?;
                (host, Some(port))
            }
            None => (authority, None),
        };
        if host.is_empty() {
            return Err(AddressError::MissingHost(s.to_string()));
        }

        Ok(Self {
            system: system.to_string(),
            host: Some(host.to_string()),
            port,
        })
    }
}

impl TryFrom<String> for NodeAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeAddress> for String {
    fn from(value: NodeAddress) -> Self {
        value.to_string()
    }
}

/// A cluster member as seen by the router. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterNode {
    pub address: NodeAddress,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl ClusterNode {
    pub fn new(address: NodeAddress) -> Self {
        Self {
            address,
            roles: BTreeSet::new(),
        }
    }

    pub fn with_roles<I, S>(address: NodeAddress, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            address,
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Identity of a routee: the hosting node plus a slot index on that node.
///
/// Slots are allocated lowest-free-first, so two routers observing the
/// same membership derive the same ids.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RouteeId {
    pub node: NodeAddress,
    pub slot: u32,
}

impl RouteeId {
    pub fn new(node: NodeAddress, slot: u32) -> Self {
        Self { node, slot }
    }
}

impl fmt::Display for RouteeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.node, self.slot)
    }
}

/// Bytes a message is hashed on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HashKey(Vec<u8>);

impl HashKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for HashKey {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<String> for HashKey {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

impl From<Vec<u8>> for HashKey {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&[u8]> for HashKey {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl From<u64> for HashKey {
    fn from(value: u64) -> Self {
        Self(value.to_be_bytes().to_vec())
    }
}
