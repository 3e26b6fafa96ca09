//! Membership replay.
//!
//! A feed file holds one JSON [`MembershipEvent`] per line. Blank lines
//! and lines starting with `#` are skipped.

use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use tracing::{debug, info, warn};

use hashgrid_cluster::MembershipEvent;
use hashgrid_core::{HashGridConfig, RouteeId};
use hashgrid_router::{ChannelRouteeFactory, Router, RouteesSnapshot, StatsSnapshot};

/// Where one key ended up.
#[derive(Debug, Serialize)]
pub struct KeyRoute {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routee: Option<RouteeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub routees: RouteesSnapshot,
    pub routes: Vec<KeyRoute>,
    pub stats: StatsSnapshot,
}

pub fn parse_script(content: &str) -> anyhow::Result<Vec<MembershipEvent>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(idx, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("invalid membership event on line {}", idx + 1))
        })
        .collect()
}

/// Apply `events` to a fresh router built from `config`, then route `keys`.
///
/// With `settle` set, the router keeps running that long after the feed so
/// unreachable nodes can run out their grace period.
pub async fn run(
    config: &HashGridConfig,
    events: Vec<MembershipEvent>,
    keys: &[String],
    settle: Option<Duration>,
) -> anyhow::Result<SimulationReport> {
    let policy = config.router.to_policy()?;
    let factory = ChannelRouteeFactory::new(|routee: &RouteeId, message: String| {
        debug!(%routee, %message, "message handled");
    });
    let router: Router<String> =
        Router::builder(policy, config.node.address.clone()).start(factory)?;

    info!(events = events.len(), "replaying membership feed");
    for event in events {
        router.notify(event)?;
    }
    router.flush().await?;

    if let Some(settle) = settle {
        tokio::time::sleep(settle).await;
        router.flush().await?;
    }

    let routes = keys
        .iter()
        .map(|key| match router.route_with_key(key.as_str(), key.clone()) {
            Ok(routee) => KeyRoute {
                key: key.clone(),
                routee: Some(routee),
                error: None,
            },
            Err(e) => {
                warn!(%key, error = %e, "key not routed");
                KeyRoute {
                    key: key.clone(),
                    routee: None,
                    error: Some(e.to_string()),
                }
            }
        })
        .collect();

    let report = SimulationReport {
        routees: router.list_routees(),
        routes,
        stats: router.stats(),
    };
    router.shutdown().await?;
    Ok(report)
}
