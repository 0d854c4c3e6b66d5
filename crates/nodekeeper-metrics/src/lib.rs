//! # nodekeeper-metrics
//!
//! Peer counts and sync progress for the running client pair.
//!
//! - [`PeerReporter`] adapters per client kind (JSON-RPC, metrics scrape,
//!   beacon peer list)
//! - [`BackgroundPeers`] for counting curated community peers
//! - [`SyncTracker`] turning execution client log lines into stage fractions
//! - [`Progress`] for the persisted geth download progress
//! - [`MetricsPoller`] collecting everything into a [`MetricsSnapshot`]

mod adapter;
mod peers;
mod poller;
mod progress;
mod rpc;
mod scrape;
mod sync;

pub use adapter::{reporter_for, ConsensusPeers, ExecutionPeers, PeerReporter};
pub use peers::{enode_id, normalize_peer_id, BackgroundPeers, BeaconPeer};
pub use poller::{MetricsPoller, MetricsSnapshot, SharedSyncTracker};
pub use progress::{clamp_fraction, Progress};
pub use rpc::{parse_hex_quantity, RpcClient};
pub use scrape::{parse_sample, scrape_sample};
pub use sync::SyncTracker;
