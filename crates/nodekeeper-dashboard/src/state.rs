//! Dashboard state
//!
//! Mutated only by the run loop, read by the widgets.

use chrono::{DateTime, Utc};
use nodekeeper_core::{ClientKind, ClientPair, ClientRole, InstanceRole};
use nodekeeper_metrics::MetricsSnapshot;
use std::collections::VecDeque;

/// Header text on a dashboard-only instance
pub const SECONDARY_HEADER: &str = "Dashboard View (client already running)";
/// Header text on the instance that runs the clients
pub const PRIMARY_HEADER: &str = "Clients running";

/// Everything the widgets draw
#[derive(Debug, Clone)]
pub struct DashboardState {
    pub header_message: String,
    pub clients: ClientPair,
    pub role: InstanceRole,
    /// Latest poll; replaced wholesale, never merged
    pub snapshot: MetricsSnapshot,
    pub execution_log: VecDeque<String>,
    pub consensus_log: VecDeque<String>,
    pub max_log_lines: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

impl DashboardState {
    pub fn new(clients: ClientPair, role: InstanceRole, max_log_lines: usize) -> Self {
        let header_message = match role {
            InstanceRole::Primary => PRIMARY_HEADER,
            InstanceRole::Secondary => SECONDARY_HEADER,
        };
        Self {
            header_message: header_message.to_string(),
            clients,
            role,
            snapshot: MetricsSnapshot::default(),
            execution_log: VecDeque::new(),
            consensus_log: VecDeque::new(),
            max_log_lines: max_log_lines.max(1),
            last_updated: None,
        }
    }

    /// Replace the previous snapshot
    pub fn apply_snapshot(&mut self, snapshot: MetricsSnapshot) {
        self.snapshot = snapshot;
        self.last_updated = Some(Utc::now());
    }

    /// Append a streamed log line, dropping the oldest beyond the limit
    pub fn push_log_line(&mut self, role: ClientRole, line: String) {
        let max = self.max_log_lines;
        let log = self.log_mut(role);
        log.push_back(line);
        while log.len() > max {
            log.pop_front();
        }
    }

    pub fn log(&self, role: ClientRole) -> &VecDeque<String> {
        match role {
            ClientRole::Execution => &self.execution_log,
            ClientRole::Consensus => &self.consensus_log,
        }
    }

    fn log_mut(&mut self, role: ClientRole) -> &mut VecDeque<String> {
        match role {
            ClientRole::Execution => &mut self.execution_log,
            ClientRole::Consensus => &mut self.consensus_log,
        }
    }

    pub fn kind(&self, role: ClientRole) -> ClientKind {
        self.clients.kind_for(role)
    }

    /// Stage names of the execution client's sync gauge
    pub fn stage_names(&self) -> &'static [&'static str] {
        self.clients.execution.stage_names()
    }
}
