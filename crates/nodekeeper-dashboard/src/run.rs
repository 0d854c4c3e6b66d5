//! Dashboard run loop
//!
//! One task owns the terminal and the [`DashboardState`]. Timers drive
//! metrics polls, log tailing and log file relocation; polls and log file
//! discovery run in spawned tasks that report back over channels so a slow
//! endpoint or a missing log never blocks input handling or redraws.

use crate::{
    app::{App, QuitAction},
    event::{is_quit_event, AppEvent, EventSource},
    log_source::{LogCursor, LogLocator},
    terminal, ui, DashboardState,
};
use nodekeeper_core::fail_open::fail_open_sync;
use nodekeeper_core::{ClientRole, NodeConfig, NodePaths, Result, ShutdownRequester};
use nodekeeper_metrics::{MetricsPoller, MetricsSnapshot, SharedSyncTracker};
use ratatui::layout::Rect;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Bytes of existing log shown when a panel first attaches to a file
pub const LOG_BACKLOG_BYTES: u64 = 64 * 1024;

/// Timer settings for the run loop
#[derive(Debug, Clone, Copy)]
pub struct RunIntervals {
    pub metrics_poll: Duration,
    pub log_poll: Duration,
    pub log_locate_retry: Duration,
    pub log_relocate: Duration,
    pub consensus_log_delay: Duration,
}

impl RunIntervals {
    pub fn from_config(config: &NodeConfig) -> Self {
        Self {
            metrics_poll: config.intervals.metrics_poll(),
            log_poll: config.intervals.log_poll(),
            log_locate_retry: config.intervals.log_locate_retry(),
            log_relocate: config.intervals.log_relocate(),
            consensus_log_delay: Duration::from_millis(config.dashboard.consensus_log_delay_ms),
        }
    }
}

/// Everything the dashboard needs, built by the composition root
pub struct DashboardContext {
    pub state: DashboardState,
    pub poller: Arc<MetricsPoller>,
    pub execution_log_dir: PathBuf,
    pub consensus_log_dir: PathBuf,
    pub intervals: RunIntervals,
    /// Present on a primary; the quit key goes through it
    pub requester: Option<Arc<dyn ShutdownRequester>>,
}

impl DashboardContext {
    pub fn from_config(
        state: DashboardState,
        poller: Arc<MetricsPoller>,
        config: &NodeConfig,
        paths: &NodePaths,
        requester: Option<Arc<dyn ShutdownRequester>>,
    ) -> Self {
        Self {
            execution_log_dir: paths.log_dir(state.clients.execution),
            consensus_log_dir: paths.log_dir(state.clients.consensus),
            state,
            poller,
            intervals: RunIntervals::from_config(config),
            requester,
        }
    }
}

/// Dashboard data flow without the terminal
///
/// The run loop calls these on its timers; tests drive them directly.
pub struct Dashboard {
    pub app: App,
    execution: LogCursor,
    consensus: LogCursor,
    sync: Option<SharedSyncTracker>,
}

impl Dashboard {
    pub fn new(app: App, execution: LogCursor, consensus: LogCursor, sync: Option<SharedSyncTracker>) -> Self {
        Self {
            app,
            execution,
            consensus,
            sync,
        }
    }

    fn cursor_mut(&mut self, role: ClientRole) -> &mut LogCursor {
        match role {
            ClientRole::Execution => &mut self.execution,
            ClientRole::Consensus => &mut self.consensus,
        }
    }

    pub fn cursor(&self, role: ClientRole) -> &LogCursor {
        match role {
            ClientRole::Execution => &self.execution,
            ClientRole::Consensus => &self.consensus,
        }
    }

    /// Start tailing the file found by the locator
    pub fn attach(&mut self, role: ClientRole, path: PathBuf) {
        let cursor = self.cursor_mut(role);
        if cursor.current_file().is_some() {
            return;
        }
        fail_open_sync("attach_log", || cursor.attach_at_tail(path, LOG_BACKLOG_BYTES));
    }

    /// Read new lines from every attached log into the panels
    pub fn pump_logs(&mut self) {
        for role in [ClientRole::Execution, ClientRole::Consensus] {
            let cursor = self.cursor_mut(role);
            if cursor.current_file().is_none() {
                continue;
            }
            let Some(lines) = fail_open_sync("read_log", || cursor.read_new_lines()) else {
                continue;
            };
            if lines.is_empty() {
                continue;
            }

            if role == ClientRole::Execution {
                self.observe_sync(&lines);
            }
            for line in lines {
                self.app.state.push_log_line(role, line);
            }
        }
    }

    fn observe_sync(&self, lines: &[String]) {
        let Some(tracker) = &self.sync else {
            return;
        };
        let mut tracker = match tracker.lock() {
            Ok(tracker) => tracker,
            Err(poisoned) => poisoned.into_inner(),
        };
        for line in lines {
            tracker.observe(line);
        }
    }

    /// Follow clients that started a newer log file
    pub fn relocate_logs(&mut self) {
        for role in [ClientRole::Execution, ClientRole::Consensus] {
            let cursor = self.cursor_mut(role);
            if cursor.current_file().is_none() {
                continue;
            }
            fail_open_sync("relocate_log", || cursor.relocate());
        }
    }

    pub fn apply_snapshot(&mut self, snapshot: MetricsSnapshot) {
        debug!(peers = ?snapshot.peer_counts(), stages = ?snapshot.sync_stages, "Metrics snapshot");
        self.app.state.apply_snapshot(snapshot);
    }
}

fn spawn_locator(
    role: ClientRole,
    cursor: &LogCursor,
    retry: Duration,
    delay: Duration,
    tx: mpsc::UnboundedSender<(ClientRole, PathBuf)>,
) {
    let dir = cursor.dir().to_path_buf();
    let kind = cursor.kind();
    tokio::spawn(async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let path = LogLocator::new(retry).find_latest(&dir, kind).await;
        let _ = tx.send((role, path));
    });
}

/// Run the dashboard until the quit key (or closed input)
///
/// Returns what quitting means for this instance; on a primary the
/// shutdown request has already been sent when this returns.
pub async fn run(ctx: DashboardContext) -> Result<QuitAction> {
    let mut terminal = terminal::init()?;
    let mut guard = terminal::TerminalGuard::new();

    let size = terminal.size()?;
    let clients = ctx.state.clients;
    let app = App::new(
        ctx.state,
        Rect::new(0, 0, size.width, size.height),
        ctx.requester,
    )?;
    let mut dashboard = Dashboard::new(
        app,
        LogCursor::new(clients.execution, ctx.execution_log_dir),
        LogCursor::new(clients.consensus, ctx.consensus_log_dir),
        ctx.poller.sync_tracker(),
    );
    info!(execution = %clients.execution, consensus = %clients.consensus, "Dashboard started");

    let intervals = ctx.intervals;
    let (locate_tx, mut locate_rx) = mpsc::unbounded_channel();
    spawn_locator(
        ClientRole::Execution,
        dashboard.cursor(ClientRole::Execution),
        intervals.log_locate_retry,
        Duration::ZERO,
        locate_tx.clone(),
    );
    spawn_locator(
        ClientRole::Consensus,
        dashboard.cursor(ClientRole::Consensus),
        intervals.log_locate_retry,
        intervals.consensus_log_delay,
        locate_tx,
    );

    let (snapshot_tx, mut snapshot_rx) = mpsc::unbounded_channel();
    let mut poll_in_flight = false;

    let mut metrics_tick = interval(intervals.metrics_poll);
    metrics_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut log_tick = interval(intervals.log_poll);
    log_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut relocate_tick = interval(intervals.log_relocate);
    relocate_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut events = EventSource::new();

    let action = loop {
        terminal.draw(|frame| ui::draw(frame, &mut dashboard.app))?;

        tokio::select! {
            event = events.next() => match event {
                Some(Ok(AppEvent::Key(key))) if is_quit_event(key) => {
                    break dashboard.app.on_quit();
                }
                Some(Ok(AppEvent::Resize(width, height))) => {
                    dashboard.app.on_resize(Rect::new(0, 0, width, height));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => warn!("{}", e),
                None => {
                    warn!("Terminal input closed, leaving dashboard");
                    break dashboard.app.on_quit();
                }
            },
            _ = metrics_tick.tick() => {
                // A hung endpoint delays the next snapshot, never the loop
                if !poll_in_flight {
                    poll_in_flight = true;
                    let poller = ctx.poller.clone();
                    let tx = snapshot_tx.clone();
                    tokio::spawn(async move {
                        let _ = tx.send(poller.poll().await);
                    });
                }
            }
            Some(snapshot) = snapshot_rx.recv() => {
                poll_in_flight = false;
                dashboard.apply_snapshot(snapshot);
            }
            _ = log_tick.tick() => dashboard.pump_logs(),
            _ = relocate_tick.tick() => dashboard.relocate_logs(),
            Some((role, path)) = locate_rx.recv() => dashboard.attach(role, path),
        }
    };

    guard.restore()?;
    info!(?action, "Dashboard closed");
    Ok(action)
}
