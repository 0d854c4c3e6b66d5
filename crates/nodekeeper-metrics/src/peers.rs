//! Background peers: curated community peers counted apart from the total

use nodekeeper_core::{BackgroundPeerConfig, Result};
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{instrument, warn};

/// Strip the `enode://` scheme, any `@host:port` suffix and a `0x` prefix
pub fn normalize_peer_id(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_scheme = trimmed.strip_prefix("enode://").unwrap_or(trimmed);
    let id = without_scheme
        .split_once('@')
        .map(|(id, _)| id)
        .unwrap_or(without_scheme);
    id.strip_prefix("0x").unwrap_or(id).to_lowercase()
}

/// Node id of an `enode://<id>@host:port` URL
pub fn enode_id(enode: &str) -> Option<String> {
    let rest = enode.trim().strip_prefix("enode://")?;
    let (id, _) = rest.split_once('@')?;
    if id.is_empty() {
        return None;
    }
    Some(normalize_peer_id(id))
}

#[derive(Debug, Deserialize)]
pub struct BeaconPeersResponse {
    pub data: Vec<BeaconPeer>,
}

#[derive(Debug, Deserialize)]
pub struct BeaconPeer {
    pub peer_id: String,
    pub state: String,
}

/// Curated peer sets, resolved once from configuration
#[derive(Debug, Clone, Default)]
pub struct BackgroundPeers {
    execution_ids: HashSet<String>,
    consensus_ids: HashSet<String>,
}

impl BackgroundPeers {
    pub fn from_config(config: &BackgroundPeerConfig) -> Self {
        let execution_ids = config
            .execution_enodes
            .iter()
            .filter_map(|enode| {
                let id = enode_id(enode);
                if id.is_none() {
                    warn!(enode = %enode, "Ignoring malformed background enode");
                }
                id
            })
            .collect();

        let consensus_ids = config
            .consensus_peer_ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();

        Self {
            execution_ids,
            consensus_ids,
        }
    }

    pub fn execution_len(&self) -> usize {
        self.execution_ids.len()
    }

    pub fn consensus_len(&self) -> usize {
        self.consensus_ids.len()
    }

    /// How many of the execution client's peers are curated
    pub fn count_execution<S: AsRef<str>>(&self, peer_ids: &[S]) -> u32 {
        let connected: HashSet<String> = peer_ids
            .iter()
            .map(|id| normalize_peer_id(id.as_ref()))
            .collect();
        connected.intersection(&self.execution_ids).count() as u32
    }

    /// How many distinct connected beacon peers are curated
    pub fn count_consensus(&self, peers: &[BeaconPeer]) -> u32 {
        let connected: HashSet<&str> = peers
            .iter()
            .filter(|peer| peer.state == "connected")
            .map(|peer| peer.peer_id.as_str())
            .collect();
        connected
            .iter()
            .filter(|id| self.consensus_ids.contains(**id))
            .count() as u32
    }
}

/// Fetch the beacon node peer list
#[instrument(skip(http))]
pub async fn fetch_beacon_peers(http: &reqwest::Client, url: &str) -> Result<Vec<BeaconPeer>> {
    let response: BeaconPeersResponse = http
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(response.data)
}
