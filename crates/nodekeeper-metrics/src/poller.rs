//! One metrics poll cycle

use nodekeeper_core::fail_open::fail_open;
use nodekeeper_core::{ClientPair, NodeConfig, NodePaths, Result};
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument, warn};

use crate::adapter::{reporter_for, PeerReporter};
use crate::peers::BackgroundPeers;
use crate::sync::SyncTracker;

/// Sync tracker shared between the log tail, which feeds it, and the poller
pub type SharedSyncTracker = Arc<Mutex<SyncTracker>>;

/// Result of one poll; `None` marks a metric that could not be collected
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub execution_peers_total: Option<u32>,
    pub execution_peers_background: Option<u32>,
    pub consensus_peers_total: Option<u32>,
    pub consensus_peers_background: Option<u32>,
    /// Fractions in `[0, 1]`, ordered like the client's stage names
    pub sync_stages: Vec<f64>,
}

impl MetricsSnapshot {
    /// Execution all/background, consensus all/background
    pub fn peer_counts(&self) -> [Option<u32>; 4] {
        [
            self.execution_peers_total,
            self.execution_peers_background,
            self.consensus_peers_total,
            self.consensus_peers_background,
        ]
    }
}

pub struct MetricsPoller {
    execution: Box<dyn PeerReporter>,
    consensus: Box<dyn PeerReporter>,
    sync: Option<SharedSyncTracker>,
}

impl MetricsPoller {
    pub fn new(
        execution: Box<dyn PeerReporter>,
        consensus: Box<dyn PeerReporter>,
        sync: Option<SharedSyncTracker>,
    ) -> Self {
        Self {
            execution,
            consensus,
            sync,
        }
    }

    /// Adapters and sync tracker for `clients` using configured endpoints
    pub fn from_config(clients: ClientPair, config: &NodeConfig, paths: &NodePaths) -> Result<Self> {
        let http = reqwest::Client::new();
        let background = Arc::new(BackgroundPeers::from_config(&config.background_peers));
        debug!(
            execution = background.execution_len(),
            consensus = background.consensus_len(),
            "Loaded background peers"
        );

        let execution = reporter_for(
            clients.execution,
            http.clone(),
            &config.endpoints,
            background.clone(),
        )?;
        let consensus = reporter_for(clients.consensus, http, &config.endpoints, background)?;
        let tracker = SyncTracker::new(clients.execution, Some(paths.progress_file()))?;

        Ok(Self::new(
            execution,
            consensus,
            Some(Arc::new(Mutex::new(tracker))),
        ))
    }

    pub fn sync_tracker(&self) -> Option<SharedSyncTracker> {
        self.sync.clone()
    }

    /// Collect every metric concurrently
    ///
    /// Each metric fails on its own: an unreachable endpoint or malformed
    /// response leaves that field `None` and the others unaffected.
    #[instrument(skip(self), fields(execution = %self.execution.kind(), consensus = %self.consensus.kind()))]
    pub async fn poll(&self) -> MetricsSnapshot {
        let (execution_total, execution_background, consensus_total, consensus_background) = tokio::join!(
            fail_open("execution_peers", || self.execution.total_peers()),
            fail_open("execution_background_peers", || self
                .execution
                .background_peers()),
            fail_open("consensus_peers", || self.consensus.total_peers()),
            fail_open("consensus_background_peers", || self
                .consensus
                .background_peers()),
        );

        MetricsSnapshot {
            execution_peers_total: execution_total,
            execution_peers_background: execution_background,
            consensus_peers_total: consensus_total,
            consensus_peers_background: consensus_background,
            sync_stages: self.current_stages(),
        }
    }

    fn current_stages(&self) -> Vec<f64> {
        let Some(tracker) = &self.sync else {
            return Vec::new();
        };
        match tracker.lock() {
            Ok(tracker) => tracker.stages(),
            Err(poisoned) => {
                warn!("Sync tracker lock poisoned; reading last known stages");
                poisoned.into_inner().stages()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nodekeeper_core::{ClientKind, NodeError};

    struct Fixed {
        kind: ClientKind,
        total: Option<u32>,
        background: Option<u32>,
    }

    #[async_trait]
    impl PeerReporter for Fixed {
        fn kind(&self) -> ClientKind {
            self.kind
        }

        async fn total_peers(&self) -> Result<u32> {
            self.total
                .ok_or_else(|| NodeError::Rpc("connection refused".into()))
        }

        async fn background_peers(&self) -> Result<u32> {
            self.background
                .ok_or_else(|| NodeError::Metrics("malformed".into()))
        }
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let poller = MetricsPoller::new(
            Box::new(Fixed {
                kind: ClientKind::Geth,
                total: Some(10),
                background: None,
            }),
            Box::new(Fixed {
                kind: ClientKind::Lighthouse,
                total: None,
                background: Some(1),
            }),
            None,
        );

        let snapshot = poller.poll().await;
        assert_eq!(snapshot.peer_counts(), [Some(10), None, None, Some(1)]);
        assert!(snapshot.sync_stages.is_empty());
    }

    #[tokio::test]
    async fn test_stages_come_from_shared_tracker() {
        let tracker = Arc::new(Mutex::new(SyncTracker::new(ClientKind::Geth, None).unwrap()));
        let poller = MetricsPoller::new(
            Box::new(Fixed {
                kind: ClientKind::Geth,
                total: Some(1),
                background: Some(0),
            }),
            Box::new(Fixed {
                kind: ClientKind::Prysm,
                total: Some(2),
                background: Some(0),
            }),
            Some(tracker.clone()),
        );

        tracker
            .lock()
            .unwrap()
            .observe("Syncing: chain download in progress synced=20.00%");

        let snapshot = poller.poll().await;
        assert_eq!(snapshot.sync_stages, vec![0.0, 0.2, 0.0]);
    }
}
