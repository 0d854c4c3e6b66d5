//! Core types for nodekeeper
//!
//! These types are shared by the supervisor, the metrics adapters and the
//! dashboard. Client behaviour is looked up through [`ClientKind`] instead of
//! comparing client names as strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::NodeError;

/// Which half of the node pair a client belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientRole {
    /// Execution layer client (geth, reth, nethermind)
    Execution,
    /// Consensus layer client (prysm, lighthouse)
    Consensus,
}

impl fmt::Display for ClientRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Execution => write!(f, "execution"),
            Self::Consensus => write!(f, "consensus"),
        }
    }
}

/// Supported client implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    Geth,
    Reth,
    Nethermind,
    Prysm,
    Lighthouse,
}

/// A named sample exposed on a plaintext metrics endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSample {
    /// Scrape URL
    pub url: &'static str,
    /// Full sample name including labels, e.g. `libp2p_peers`
    pub name: &'static str,
}

/// How a client's background-peer count is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundPeerStrategy {
    /// Intersect `admin_peers` with the curated enode list
    AdminPeers,
    /// The client has no peer-list method; reuse the total peer count
    PeerCountFallback,
    /// Intersect the beacon node peer list with the curated peer ids
    BeaconPeerList,
}

/// Where sync-stage percentages come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSource {
    /// Structured progress file written from log markers
    ProgressFile,
    /// Parsed directly from streamed log lines
    LogMarkers,
    /// Client does not report sync stages
    None,
}

impl ClientKind {
    pub const ALL: [ClientKind; 5] = [
        Self::Geth,
        Self::Reth,
        Self::Nethermind,
        Self::Prysm,
        Self::Lighthouse,
    ];

    /// Name used on the command line, in file names and in log prefixes
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Geth => "geth",
            Self::Reth => "reth",
            Self::Nethermind => "nethermind",
            Self::Prysm => "prysm",
            Self::Lighthouse => "lighthouse",
        }
    }

    /// Human-readable label for panel titles
    pub fn label(&self) -> &'static str {
        match self {
            Self::Geth => "Geth",
            Self::Reth => "Reth",
            Self::Nethermind => "Nethermind",
            Self::Prysm => "Prysm",
            Self::Lighthouse => "Lighthouse",
        }
    }

    pub fn role(&self) -> ClientRole {
        match self {
            Self::Geth | Self::Reth | Self::Nethermind => ClientRole::Execution,
            Self::Prysm | Self::Lighthouse => ClientRole::Consensus,
        }
    }

    /// Log files are named `<kind>_<formattedDateTime>.log`
    pub fn log_prefix(&self) -> String {
        format!("{}_", self.as_str())
    }

    /// Whether a file name follows this client's log naming convention
    pub fn matches_log_file(&self, file_name: &str) -> bool {
        file_name.starts_with(&self.log_prefix()) && file_name.ends_with(".log")
    }

    /// Plaintext metrics sample carrying the connected peer count
    pub fn metrics_sample(&self) -> Option<MetricsSample> {
        match self {
            Self::Prysm => Some(MetricsSample {
                url: "http://localhost:5054/metrics",
                name: "p2p_peer_count{state=\"Connected\"}",
            }),
            Self::Lighthouse => Some(MetricsSample {
                url: "http://localhost:5054/metrics",
                name: "libp2p_peers",
            }),
            Self::Nethermind => Some(MetricsSample {
                url: "http://localhost:6060/metrics",
                name: "net_peerCount",
            }),
            Self::Geth | Self::Reth => None,
        }
    }

    pub fn background_strategy(&self) -> BackgroundPeerStrategy {
        match self {
            Self::Geth | Self::Reth => BackgroundPeerStrategy::AdminPeers,
            Self::Nethermind => BackgroundPeerStrategy::PeerCountFallback,
            Self::Prysm | Self::Lighthouse => BackgroundPeerStrategy::BeaconPeerList,
        }
    }

    pub fn sync_source(&self) -> SyncSource {
        match self {
            Self::Geth => SyncSource::ProgressFile,
            Self::Reth | Self::Nethermind => SyncSource::LogMarkers,
            Self::Prysm | Self::Lighthouse => SyncSource::None,
        }
    }

    /// Ordered sync stage names shown in the stage gauge
    pub fn stage_names(&self) -> &'static [&'static str] {
        match self {
            Self::Geth | Self::Nethermind => &["HEADERS", "CHAIN", "STATE"],
            Self::Reth => &[
                "HEADERS",
                "BODIES",
                "SENDER RECOVERY",
                "EXECUTION",
                "MERKLE",
                "TX LOOKUP",
                "HISTORY",
            ],
            Self::Prysm | Self::Lighthouse => &[],
        }
    }
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientKind {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "geth" => Ok(Self::Geth),
            "reth" => Ok(Self::Reth),
            "nethermind" => Ok(Self::Nethermind),
            "prysm" => Ok(Self::Prysm),
            "lighthouse" => Ok(Self::Lighthouse),
            other => Err(NodeError::Config(format!(
                "Unknown client '{}'. Must be one of geth, reth, nethermind, prysm, lighthouse",
                other
            ))),
        }
    }
}

/// The execution/consensus pair chosen for this installation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientPair {
    pub execution: ClientKind,
    pub consensus: ClientKind,
}

impl ClientPair {
    /// Build a pair, rejecting kinds used in the wrong slot
    pub fn new(execution: ClientKind, consensus: ClientKind) -> crate::Result<Self> {
        if execution.role() != ClientRole::Execution {
            return Err(NodeError::Config(format!(
                "{} is not an execution client",
                execution
            )));
        }
        if consensus.role() != ClientRole::Consensus {
            return Err(NodeError::Config(format!(
                "{} is not a consensus client",
                consensus
            )));
        }
        Ok(Self {
            execution,
            consensus,
        })
    }

    pub fn kind_for(&self, role: ClientRole) -> ClientKind {
        match role {
            ClientRole::Execution => self.execution,
            ClientRole::Consensus => self.consensus,
        }
    }
}

/// Role of this process relative to the installation's instance lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceRole {
    /// Owns the lock and supervises the clients
    Primary,
    /// Another live primary exists; dashboard-only view
    Secondary,
}

impl InstanceRole {
    pub fn runs_clients(&self) -> bool {
        matches!(self, Self::Primary)
    }
}

/// Asks the supervisor (possibly in another component) to run its shutdown
///
/// The dashboard holds one of these so its quit key can reach the supervisor
/// without owning it.
pub trait ShutdownRequester: Send + Sync {
    fn request_shutdown(&self, reason: &str) -> crate::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_kind_parsing() {
        assert_eq!("geth".parse::<ClientKind>().unwrap(), ClientKind::Geth);
        assert_eq!(
            " Lighthouse ".parse::<ClientKind>().unwrap(),
            ClientKind::Lighthouse
        );
        assert!("besu".parse::<ClientKind>().is_err());
    }

    #[test]
    fn test_client_roles() {
        assert_eq!(ClientKind::Geth.role(), ClientRole::Execution);
        assert_eq!(ClientKind::Nethermind.role(), ClientRole::Execution);
        assert_eq!(ClientKind::Prysm.role(), ClientRole::Consensus);
    }

    #[test]
    fn test_log_file_matching() {
        assert!(ClientKind::Geth.matches_log_file("geth_2024-01-01_10-00-00.log"));
        assert!(!ClientKind::Geth.matches_log_file("geth_2024.txt"));
        assert!(!ClientKind::Geth.matches_log_file("reth_2024.log"));
        assert!(!ClientKind::Reth.matches_log_file("prereth_2024.log"));
    }

    #[test]
    fn test_metrics_samples() {
        let prysm = ClientKind::Prysm.metrics_sample().unwrap();
        assert_eq!(prysm.name, "p2p_peer_count{state=\"Connected\"}");
        assert!(prysm.url.ends_with(":5054/metrics"));

        let nethermind = ClientKind::Nethermind.metrics_sample().unwrap();
        assert!(nethermind.url.contains("6060"));

        assert!(ClientKind::Geth.metrics_sample().is_none());
    }

    #[test]
    fn test_client_pair_validation() {
        assert!(ClientPair::new(ClientKind::Geth, ClientKind::Lighthouse).is_ok());
        assert!(ClientPair::new(ClientKind::Prysm, ClientKind::Lighthouse).is_err());
        assert!(ClientPair::new(ClientKind::Reth, ClientKind::Nethermind).is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&ClientKind::Nethermind).unwrap();
        assert_eq!(json, "\"nethermind\"");
    }
}
