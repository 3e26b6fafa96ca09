//! Routing policy and `hashgrid.toml` configuration parser.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PolicyError, PolicyResult};
use crate::types::{ClusterNode, NodeAddress};

/// Default number of ring entries per routee.
pub const DEFAULT_VIRTUAL_NODES_FACTOR: u32 = 10;

/// Default delay before an unreachable node's routees are released.
pub const DEFAULT_UNREACHABLE_GRACE: Duration = Duration::from_secs(10);

/// Longest accepted unreachable grace.
pub const MAX_UNREACHABLE_GRACE: Duration = Duration::from_secs(24 * 60 * 60);

/// Validated placement and routing policy. Immutable for a router's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingPolicy {
    /// Target routee count across the whole cluster.
    pub total_instances: u32,
    /// Cap on routees hosted by a single node.
    pub max_instances_per_node: u32,
    /// Whether the router's own node may host routees.
    pub allow_local_routees: bool,
    /// Only nodes advertising this role are eligible.
    pub role_filter: Option<String>,
    /// Ring entries per routee.
    pub virtual_nodes_factor: u32,
    /// How long an unreachable node keeps its routees.
    pub unreachable_grace: Duration,
}

impl RoutingPolicy {
    pub fn new(total_instances: u32, max_instances_per_node: u32) -> Self {
        Self {
            total_instances,
            max_instances_per_node,
            allow_local_routees: true,
            role_filter: None,
            virtual_nodes_factor: DEFAULT_VIRTUAL_NODES_FACTOR,
            unreachable_grace: DEFAULT_UNREACHABLE_GRACE,
        }
    }

    pub fn with_allow_local_routees(mut self, allow: bool) -> Self {
        self.allow_local_routees = allow;
        self
    }

    pub fn with_role_filter(mut self, role: &str) -> Self {
        self.role_filter = Some(role.to_string());
        self
    }

    pub fn with_virtual_nodes_factor(mut self, factor: u32) -> Self {
        self.virtual_nodes_factor = factor;
        self
    }

    pub fn with_unreachable_grace(mut self, grace: Duration) -> Self {
        self.unreachable_grace = grace;
        self
    }

    /// Reject configurations a router cannot start with.
    pub fn validate(&self) -> PolicyResult<()> {
        if self.max_instances_per_node == 0 {
            return Err(PolicyError::NonPositiveMaxPerNode(0));
        }
        if self.virtual_nodes_factor == 0 {
            return Err(PolicyError::NonPositiveVirtualNodes(0));
        }
        if self.role_filter.as_deref().is_some_and(|r| r.trim().is_empty()) {
            return Err(PolicyError::EmptyRole);
        }
        if self.unreachable_grace > MAX_UNREACHABLE_GRACE {
            return Err(PolicyError::OutOfRange {
                field: "unreachable_grace",
                value: i64::try_from(self.unreachable_grace.as_secs()).unwrap_or(i64::MAX),
            });
        }
        Ok(())
    }

    /// Whether `node` may host routees under this policy.
    ///
    /// `self_address` is the address of the node running the router.
    pub fn is_eligible(&self, node: &ClusterNode, self_address: &NodeAddress) -> bool {
        if !self.allow_local_routees && &node.address == self_address {
            return false;
        }
        match &self.role_filter {
            Some(role) => node.has_role(role),
            None => true,
        }
    }
}

/// Top-level `hashgrid.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashGridConfig {
    pub node: NodeConfig,
    pub router: RouterConfig,
}

/// The local node's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub address: NodeAddress,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// The `[router]` section as written on disk.
///
/// Counts are signed so negative values are reported as policy errors
/// instead of opaque parse failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub total_instances: i64,
    pub max_instances_per_node: Option<i64>,
    pub allow_local_routees: Option<bool>,
    pub role_filter: Option<String>,
    pub virtual_nodes_factor: Option<i64>,
    pub unreachable_grace: Option<String>,
}

impl RouterConfig {
    /// Convert into a validated [`RoutingPolicy`].
    pub fn to_policy(&self) -> PolicyResult<RoutingPolicy> {
        if self.total_instances < 0 {
            return Err(PolicyError::NegativeTotalInstances(self.total_instances));
        }
        let total_instances = to_u32("total_instances", self.total_instances)?;

        let max_per_node = self.max_instances_per_node.unwrap_or(1);
        if max_per_node <= 0 {
            return Err(PolicyError::NonPositiveMaxPerNode(max_per_node));
        }
        let max_instances_per_node = to_u32("max_instances_per_node", max_per_node)?;

        let factor = self
            .virtual_nodes_factor
            .unwrap_or(i64::from(DEFAULT_VIRTUAL_NODES_FACTOR));
        if factor <= 0 {
            return Err(PolicyError::NonPositiveVirtualNodes(factor));
        }
        let virtual_nodes_factor = to_u32("virtual_nodes_factor", factor)?;

        let unreachable_grace = match &self.unreachable_grace {
            Some(raw) => parse_duration(raw).ok_or_else(|| PolicyError::InvalidDuration {
                field: "unreachable_grace",
                value: raw.clone(),
            })?,
            None => DEFAULT_UNREACHABLE_GRACE,
        };

        let policy = RoutingPolicy {
            total_instances,
            max_instances_per_node,
            allow_local_routees: self.allow_local_routees.unwrap_or(true),
            role_filter: self.role_filter.clone(),
            virtual_nodes_factor,
            unreachable_grace,
        };
        policy.validate()?;
        Ok(policy)
    }
}

impl HashGridConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: HashGridConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// The local node as a cluster member.
    pub fn local_node(&self) -> ClusterNode {
        ClusterNode::with_roles(self.node.address.clone(), self.node.roles.iter().cloned())
    }

    /// Scaffold a minimal config for a node at `address`.
    pub fn scaffold(address: NodeAddress) -> Self {
        HashGridConfig {
            node: NodeConfig {
                address,
                roles: Vec::new(),
            },
            router: RouterConfig {
                total_instances: 10,
                max_instances_per_node: Some(2),
                allow_local_routees: Some(true),
                role_filter: None,
                virtual_nodes_factor: Some(i64::from(DEFAULT_VIRTUAL_NODES_FACTOR)),
                unreachable_grace: Some("10s".to_string()),
            },
        }
    }
}

fn to_u32(field: &'static str, value: i64) -> PolicyResult<u32> {
    u32::try_from(value).map_err(|_| PolicyError::OutOfRange { field, value })
}

/// Parse a duration string like "5s", "500ms", "1m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router_config(total: i64, per_node: i64) -> RouterConfig {
        RouterConfig {
            total_instances: total,
            max_instances_per_node: Some(per_node),
            allow_local_routees: None,
            role_filter: None,
            virtual_nodes_factor: None,
            unreachable_grace: None,
        }
    }

    #[test]
    fn test_parse_minimal() {
        let toml_str = r#"
[node]
address = "hashgrid@127.0.0.1:2552"

[router]
total_instances = 10
"#;
        let config: HashGridConfig = toml::from_str(toml_str).unwrap();
        let policy = config.router.to_policy().unwrap();
        assert_eq!(policy.total_instances, 10);
        assert_eq!(policy.max_instances_per_node, 1);
        assert!(policy.allow_local_routees);
        assert_eq!(policy.virtual_nodes_factor, DEFAULT_VIRTUAL_NODES_FACTOR);
        assert_eq!(policy.unreachable_grace, DEFAULT_UNREACHABLE_GRACE);
    }

    #[test]
    fn test_parse_full() {
        let toml_str = r#"
[node]
address = "hashgrid@10.0.0.1:2552"
roles = ["backend"]

[router]
total_instances = 10
max_instances_per_node = 2
allow_local_routees = false
role_filter = "backend"
virtual_nodes_factor = 64
unreachable_grace = "500ms"
"#;
        let config: HashGridConfig = toml::from_str(toml_str).unwrap();
        let policy = config.router.to_policy().unwrap();
        assert_eq!(policy.max_instances_per_node, 2);
        assert!(!policy.allow_local_routees);
        assert_eq!(policy.role_filter.as_deref(), Some("backend"));
        assert_eq!(policy.virtual_nodes_factor, 64);
        assert_eq!(policy.unreachable_grace, Duration::from_millis(500));
        assert!(config.local_node().has_role("backend"));
    }

    #[test]
    fn test_scaffold_round_trips() {
        let config = HashGridConfig::scaffold(NodeAddress::new("hashgrid", "10.0.0.1", 2552));
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("hashgrid@10.0.0.1:2552"));
        let parsed: HashGridConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.router.to_policy().unwrap().total_instances, 10);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hashgrid.toml");
        let config = HashGridConfig::scaffold(NodeAddress::local("hashgrid"));
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        let loaded = HashGridConfig::from_file(&path).unwrap();
        assert!(loaded.node.address.is_local());
    }

    #[test]
    fn rejects_non_positive_per_node_cap() {
        assert_eq!(
            router_config(10, 0).to_policy(),
            Err(PolicyError::NonPositiveMaxPerNode(0))
        );
        assert_eq!(
            router_config(10, -3).to_policy(),
            Err(PolicyError::NonPositiveMaxPerNode(-3))
        );
    }

    #[test]
    fn rejects_negative_total() {
        assert_eq!(
            router_config(-1, 2).to_policy(),
            Err(PolicyError::NegativeTotalInstances(-1))
        );
    }

    #[test]
    fn zero_total_is_allowed() {
        assert_eq!(router_config(0, 2).to_policy().unwrap().total_instances, 0);
    }

    #[test]
    fn rejects_bad_grace() {
        let mut cfg = router_config(4, 2);
        cfg.unreachable_grace = Some("soon".to_string());
        assert!(matches!(
            cfg.to_policy(),
            Err(PolicyError::InvalidDuration { .. })
        ));
    }

    #[test]
    fn eligibility_respects_role_and_local() {
        let me = NodeAddress::new("hashgrid", "10.0.0.1", 2552);
        let other = NodeAddress::new("hashgrid", "10.0.0.2", 2552);
        let policy = RoutingPolicy::new(4, 2)
            .with_allow_local_routees(false)
            .with_role_filter("backend");

        let local_backend = ClusterNode::with_roles(me.clone(), ["backend"]);
        let remote_backend = ClusterNode::with_roles(other.clone(), ["backend"]);
        let remote_frontend = ClusterNode::with_roles(other, ["frontend"]);

        assert!(!policy.is_eligible(&local_backend, &me));
        assert!(policy.is_eligible(&remote_backend, &me));
        assert!(!policy.is_eligible(&remote_frontend, &me));
    }

    #[test]
    fn parse_duration_values() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("7"), Some(Duration::from_secs(7)));
        assert_eq!(parse_duration("abc"), None);
        assert_eq!(parse_duration("307445734561825861m"), None);
    }

    #[test]
    fn test_overflowing_minutes_are_invalid() {
        let mut config = router_config(4, 2);
        config.unreachable_grace = Some("307445734561825861m".to_string());
        assert_eq!(
            config.to_policy(),
            Err(PolicyError::InvalidDuration {
                field: "unreachable_grace",
                value: "307445734561825861m".to_string(),
            })
        );
    }

    #[test]
    fn test_grace_is_bounded() {
        let mut config = router_config(4, 2);
        config.unreachable_grace = Some("18446744073709551615s".to_string());
        assert!(matches!(
            config.to_policy(),
            Err(PolicyError::OutOfRange {
                field: "unreachable_grace",
                ..
            })
        ));

        config.unreachable_grace = Some("1441m".to_string());
        assert!(config.to_policy().is_err());
        config.unreachable_grace = Some("1440m".to_string());
        assert_eq!(
            config.to_policy().unwrap().unreachable_grace,
            MAX_UNREACHABLE_GRACE
        );

        let policy = RoutingPolicy::new(4, 2).with_unreachable_grace(Duration::MAX);
        assert!(policy.validate().is_err());
    }
}
