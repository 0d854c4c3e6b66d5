//! Configuration management for nodekeeper
//!
//! This module provides the installation-level settings: polling intervals,
//! local client endpoints, curated background peers and launcher overrides.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{ClientKind, NodeError, Result};

/// Installation-level nodekeeper configuration
///
/// Loaded from `<installDir>/ethereum_clients/nodekeeper.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NodeConfig {
    /// Polling and shutdown timing
    #[serde(default)]
    pub intervals: IntervalConfig,

    /// Local client endpoints
    #[serde(default)]
    pub endpoints: EndpointConfig,

    /// Curated community peers tracked separately from the total
    #[serde(default)]
    pub background_peers: BackgroundPeerConfig,

    /// Launcher overrides keyed by client name
    #[serde(default)]
    pub launch: HashMap<ClientKind, LaunchSpec>,

    /// Dashboard display settings
    #[serde(default)]
    pub dashboard: DashboardSettings,
}

/// Polling and shutdown timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalConfig {
    /// Metrics poll interval
    #[serde(default = "default_metrics_poll_ms")]
    pub metrics_poll_ms: u64,

    /// How often tailed log files are read for new lines
    #[serde(default = "default_log_poll_ms")]
    pub log_poll_ms: u64,

    /// Delay between attempts when no log file exists yet
    #[serde(default = "default_log_locate_retry_ms")]
    pub log_locate_retry_ms: u64,

    /// How often the newest log file is re-resolved (rotation)
    #[serde(default = "default_log_relocate_ms")]
    pub log_relocate_ms: u64,

    /// Shutdown completion check interval
    #[serde(default = "default_shutdown_poll_ms")]
    pub shutdown_poll_ms: u64,

    /// Delay before interrupting each child during shutdown
    #[serde(default = "default_interrupt_delay_ms")]
    pub interrupt_delay_ms: u64,

    /// Upper bound on waiting for children to exit
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

/// Local client endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Execution client JSON-RPC endpoint
    #[serde(default = "default_execution_rpc")]
    pub execution_rpc: String,

    /// Beacon node peer-list endpoint
    #[serde(default = "default_beacon_peers")]
    pub beacon_peers: String,

    /// Overrides the per-client consensus metrics scrape URL
    #[serde(default)]
    pub consensus_metrics: Option<String>,
}

/// Curated community peers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundPeerConfig {
    /// Execution peers as enode URLs
    #[serde(default = "default_execution_enodes")]
    pub execution_enodes: Vec<String>,

    /// Consensus peer ids
    #[serde(default)]
    pub consensus_peer_ids: Vec<String>,
}

/// How to launch one client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Dashboard display settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSettings {
    /// Lines retained per log panel
    #[serde(default = "default_max_log_lines")]
    pub max_log_lines: usize,

    /// Delay before the consensus log starts streaming
    #[serde(default = "default_consensus_log_delay_ms")]
    pub consensus_log_delay_ms: u64,
}

// Default value providers
fn default_metrics_poll_ms() -> u64 {
    5_000
}

fn default_log_poll_ms() -> u64 {
    250
}

fn default_log_locate_retry_ms() -> u64 {
    1_000
}

fn default_log_relocate_ms() -> u64 {
    5_000
}

fn default_shutdown_poll_ms() -> u64 {
    1_000
}

fn default_interrupt_delay_ms() -> u64 {
    750
}

fn default_shutdown_timeout_secs() -> u64 {
    180
}

fn default_execution_rpc() -> String {
    "http://localhost:8545".to_string()
}

fn default_beacon_peers() -> String {
    "http://localhost:5052/eth/v1/node/peers".to_string()
}

fn default_max_log_lines() -> usize {
    500
}

fn default_consensus_log_delay_ms() -> u64 {
    3_000
}

fn default_execution_enodes() -> Vec<String> {
    [
        "enode://fb14d72321ee823fcf21e163091849ee42e0f6ac0cddc737d79e324b0a734c4fc51823ef0a96b749c954483c25e8d2e534d1d5fc2619ea22d58671aff96f5188@65.109.103.148:30303",
        "enode://40f40acd78004650cce57aa302de9acbf54becf91b609da93596a18979bb203ba79fcbee5c2e637407b91be23ce72f0cc13dfa38d13e657005ce842eafb6b172@65.109.103.149:30303",
        "enode://9e50857aa48a7a31bc7b46957e8ced0ef69a7165d3199bea924cb6d02b81f1f35bd8e29d21a54f4a331316bf09bb92716772ea76d3ef75ce027699eccfa14fad@141.94.97.22:30303",
        "enode://96dc133ce3aeb5d9430f1dce1d77a36418c8789b443ae0445f06f73c6b363f5b35c019086700a098c3e6e54974d64f37e97d72a5c711d1eae34dc06e3e00eed5@141.94.97.74:30303",
        "enode://516cbfbe9bbf26b6395ed68b24e383401fc33e7fe96b9d235ebca86c9f812fde8d33a7dbebc0fb5595459d2c5cc6381595d96507af89e6b48b5bdd0ebf8af0c0@141.94.97.84:30303",
        "enode://fc86a93545c56322dd861180b76632b9baeb65af8f304269b489b4623ae060847569c3c3c10c4b39baf221a2cdefea66efabce061a542cdcda374cbba45aa3d4@51.68.39.206:30303",
        "enode://0e6dd3815a627893515465130c1e95aa73b18fe2f723b2467f3abf94df9be036f27595f301b5e78750ad128e59265f980c92033ae903330c0460c40ae088c04a@35.210.37.245:30303",
        "enode://b72d6233d50bef7b31c09f3ea39459257520178f985a872bbaa4e371ed619455b7671053ffe985af1b5fb3270606e2a49e4e67084debd75e6c9b93e227c5b01c@35.210.156.59:30303",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl NodeConfig {
    /// Load configuration from an explicit file, or from the default
    /// location under `paths`, falling back to defaults when absent
    pub fn load_or_default(paths: &NodePaths, explicit: Option<&Path>) -> Result<Self> {
        let config_path = match explicit {
            Some(path) => path.to_path_buf(),
            None => paths.config_file(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content).map_err(|e| {
                NodeError::Config(format!(
                    "Failed to parse {}: {}",
                    config_path.display(),
                    e
                ))
            })
        } else if explicit.is_some() {
            Err(NodeError::Config(format!(
                "Config file {} does not exist",
                config_path.display()
            )))
        } else {
            Ok(Self::default())
        }
    }

    /// Write the default configuration next to the lock file
    pub fn write_default(paths: &NodePaths) -> Result<()> {
        std::fs::create_dir_all(paths.clients_root())?;
        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| NodeError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Launcher for a client: explicit override, or the installed binary
    /// with `--directory <installDir>`
    pub fn launch_spec(&self, kind: ClientKind, paths: &NodePaths) -> LaunchSpec {
        if let Some(spec) = self.launch.get(&kind) {
            return spec.clone();
        }
        LaunchSpec {
            program: paths.client_dir(kind).join(kind.as_str()),
            args: vec![
                "--directory".to_string(),
                paths.install_dir().display().to_string(),
            ],
        }
    }
}

impl IntervalConfig {
    pub fn metrics_poll(&self) -> Duration {
        Duration::from_millis(self.metrics_poll_ms)
    }

    pub fn log_poll(&self) -> Duration {
        Duration::from_millis(self.log_poll_ms)
    }

    pub fn log_locate_retry(&self) -> Duration {
        Duration::from_millis(self.log_locate_retry_ms)
    }

    pub fn log_relocate(&self) -> Duration {
        Duration::from_millis(self.log_relocate_ms)
    }

    pub fn shutdown_poll(&self) -> Duration {
        Duration::from_millis(self.shutdown_poll_ms)
    }

    pub fn interrupt_delay(&self) -> Duration {
        Duration::from_millis(self.interrupt_delay_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            metrics_poll_ms: default_metrics_poll_ms(),
            log_poll_ms: default_log_poll_ms(),
            log_locate_retry_ms: default_log_locate_retry_ms(),
            log_relocate_ms: default_log_relocate_ms(),
            shutdown_poll_ms: default_shutdown_poll_ms(),
            interrupt_delay_ms: default_interrupt_delay_ms(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            execution_rpc: default_execution_rpc(),
            beacon_peers: default_beacon_peers(),
            consensus_metrics: None,
        }
    }
}

impl Default for BackgroundPeerConfig {
    fn default() -> Self {
        Self {
            execution_enodes: default_execution_enodes(),
            consensus_peer_ids: Vec::new(),
        }
    }
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            max_log_lines: default_max_log_lines(),
            consensus_log_delay_ms: default_consensus_log_delay_ms(),
        }
    }
}

/// Filesystem layout of one installation
///
/// Everything nodekeeper touches lives under `<installDir>/ethereum_clients`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePaths {
    install_dir: PathBuf,
}

impl NodePaths {
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
        }
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    pub fn clients_root(&self) -> PathBuf {
        self.install_dir.join("ethereum_clients")
    }

    /// Instance lock holding the primary's process id
    pub fn lock_file(&self) -> PathBuf {
        self.clients_root().join("script.lock")
    }

    /// Options the primary was started with
    pub fn options_file(&self) -> PathBuf {
        self.clients_root().join("options.json")
    }

    /// Geth download progress written from log markers
    pub fn progress_file(&self) -> PathBuf {
        self.clients_root().join("progressMonitor.json")
    }

    /// Debug sink for tracing output while the dashboard owns the terminal
    pub fn debug_log(&self) -> PathBuf {
        self.clients_root().join("debug.log")
    }

    pub fn config_file(&self) -> PathBuf {
        self.clients_root().join("nodekeeper.toml")
    }

    pub fn client_dir(&self, kind: ClientKind) -> PathBuf {
        self.clients_root().join(kind.as_str())
    }

    pub fn log_dir(&self, kind: ClientKind) -> PathBuf {
        self.client_dir(kind).join("logs")
    }
}
