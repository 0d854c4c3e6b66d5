//! Per-client peer count adapters
//!
//! One [`PeerReporter`] is built for each side of the pair, selected from
//! [`ClientKind`] once at startup.

use async_trait::async_trait;
use nodekeeper_core::{
    BackgroundPeerStrategy, ClientKind, ClientRole, EndpointConfig, NodeError, Result,
};
use std::sync::Arc;

use crate::peers::{fetch_beacon_peers, BackgroundPeers};
use crate::rpc::RpcClient;
use crate::scrape::scrape_sample;

/// Capability to report a client's peer counts
#[async_trait]
pub trait PeerReporter: Send + Sync {
    fn kind(&self) -> ClientKind;

    /// All connected peers
    async fn total_peers(&self) -> Result<u32>;

    /// Connected peers drawn from the curated community list
    async fn background_peers(&self) -> Result<u32>;
}

/// Execution client over JSON-RPC
pub struct ExecutionPeers {
    kind: ClientKind,
    rpc: RpcClient,
    background: Arc<BackgroundPeers>,
}

impl ExecutionPeers {
    pub fn new(kind: ClientKind, rpc: RpcClient, background: Arc<BackgroundPeers>) -> Self {
        Self {
            kind,
            rpc,
            background,
        }
    }
}

#[async_trait]
impl PeerReporter for ExecutionPeers {
    fn kind(&self) -> ClientKind {
        self.kind
    }

    async fn total_peers(&self) -> Result<u32> {
        self.rpc.net_peer_count().await
    }

    async fn background_peers(&self) -> Result<u32> {
        match self.kind.background_strategy() {
            BackgroundPeerStrategy::AdminPeers => {
                let ids = self.rpc.admin_peer_ids().await?;
                Ok(self.background.count_execution(&ids))
            }
            // No admin_peers; the total is the best available figure
            BackgroundPeerStrategy::PeerCountFallback => self.rpc.net_peer_count().await,
            BackgroundPeerStrategy::BeaconPeerList => Err(NodeError::Metrics(format!(
                "{} is not an execution client",
                self.kind
            ))),
        }
    }
}

/// Consensus client over its metrics and beacon API endpoints
pub struct ConsensusPeers {
    kind: ClientKind,
    http: reqwest::Client,
    metrics_url: String,
    sample: &'static str,
    beacon_peers_url: String,
    background: Arc<BackgroundPeers>,
}

impl ConsensusPeers {
    pub fn new(
        kind: ClientKind,
        http: reqwest::Client,
        endpoints: &EndpointConfig,
        background: Arc<BackgroundPeers>,
    ) -> Result<Self> {
        let sample = kind.metrics_sample().ok_or_else(|| {
            NodeError::Metrics(format!("{} exposes no peer count sample", kind))
        })?;
        let metrics_url = endpoints
            .consensus_metrics
            .clone()
            .unwrap_or_else(|| sample.url.to_string());

        Ok(Self {
            kind,
            http,
            metrics_url,
            sample: sample.name,
            beacon_peers_url: endpoints.beacon_peers.clone(),
            background,
        })
    }
}

#[async_trait]
impl PeerReporter for ConsensusPeers {
    fn kind(&self) -> ClientKind {
        self.kind
    }

    async fn total_peers(&self) -> Result<u32> {
        scrape_sample(&self.http, &self.metrics_url, self.sample).await
    }

    async fn background_peers(&self) -> Result<u32> {
        let peers = fetch_beacon_peers(&self.http, &self.beacon_peers_url).await?;
        Ok(self.background.count_consensus(&peers))
    }
}

/// Build the adapter matching `kind`
pub fn reporter_for(
    kind: ClientKind,
    http: reqwest::Client,
    endpoints: &EndpointConfig,
    background: Arc<BackgroundPeers>,
) -> Result<Box<dyn PeerReporter>> {
    match kind.role() {
        ClientRole::Execution => Ok(Box::new(ExecutionPeers::new(
            kind,
            RpcClient::new(http, endpoints.execution_rpc.clone()),
            background,
        ))),
        ClientRole::Consensus => Ok(Box::new(ConsensusPeers::new(
            kind, http, endpoints, background,
        )?)),
    }
}
