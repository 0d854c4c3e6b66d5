//! nodekeeper - supervise an execution/consensus client pair
//!
//! Usage:
//!   nodekeeper                                  geth + lighthouse under $HOME
//!   nodekeeper --execution reth --consensus prysm
//!   nodekeeper --directory /data --config node.toml
//!   nodekeeper --write-config                   write the default config and exit
//!
//! The first instance for an install directory becomes the primary: it
//! starts both clients and shows the dashboard. Any later instance finds the
//! live lock and only shows the dashboard.

use anyhow::{Context, Result};
use clap::Parser;
use nodekeeper_core::{ClientKind, ClientPair, InstanceRole, NodeConfig, NodePaths};
use futures::FutureExt;
use nodekeeper_dashboard::{DashboardContext, DashboardState, QuitAction};
use nodekeeper_metrics::MetricsPoller;
use nodekeeper_supervisor::signals::{install_panic_hook, install_signal_listeners};
use nodekeeper_supervisor::{
    panic_message, InstanceLock, ProcessSupervisor, SessionOptions, ShutdownOutcome,
    ShutdownReason, ShutdownRequest, SignalShutdownRequester, SupervisorConfig, EXIT_CLEAN,
    EXIT_FATAL,
};
use std::any::Any;
use std::fs::OpenOptions;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "nodekeeper")]
#[command(author, version, about = "Supervise an Ethereum execution/consensus client pair")]
struct Cli {
    /// Execution client: geth, reth or nethermind
    #[arg(short, long, default_value = "geth")]
    execution: ClientKind,

    /// Consensus client: prysm or lighthouse
    #[arg(short, long, default_value = "lighthouse")]
    consensus: ClientKind,

    /// Install directory (defaults to the home directory)
    #[arg(short, long, value_name = "DIR")]
    directory: Option<PathBuf>,

    /// Configuration file (defaults to <DIR>/ethereum_clients/nodekeeper.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Execution client mode passed through to the session, e.g. full or archive
    #[arg(long, value_name = "TYPE")]
    execution_type: Option<String>,

    /// Write the default configuration file and exit
    #[arg(long)]
    write_config: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let install_dir = match &cli.directory {
        Some(dir) => dir.clone(),
        None => dirs::home_dir().context("Cannot determine home directory; pass --directory")?,
    };
    let paths = NodePaths::new(install_dir);
    std::fs::create_dir_all(paths.clients_root()).with_context(|| {
        format!("Failed to create {}", paths.clients_root().display())
    })?;

    if cli.write_config {
        NodeConfig::write_default(&paths)?;
        println!("Wrote {}", paths.config_file().display());
        return Ok(());
    }

    init_logging(&paths, cli.verbose)?;

    let clients = ClientPair::new(cli.execution, cli.consensus)?;
    let config = NodeConfig::load_or_default(&paths, cli.config.as_deref())?;

    let lock = InstanceLock::new(paths.lock_file());
    let role = lock
        .acquire_or_detect()
        .context("Cannot determine whether another instance is running")?;
    info!(?role, pid = lock.pid(), "Instance role decided");

    let code = match role {
        InstanceRole::Primary => {
            run_primary(clients, cli.execution_type, &config, &paths, lock).await?
        }
        InstanceRole::Secondary => run_secondary(clients, &config, &paths, lock).await?,
    };

    info!(code, "Exiting");
    std::process::exit(code);
}

/// Tracing goes to the debug log; the terminal belongs to the dashboard
fn init_logging(paths: &NodePaths, verbose: bool) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(paths.debug_log())
        .with_context(|| format!("Failed to open {}", paths.debug_log().display()))?;

    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Start both clients, show the dashboard, and supervise until shutdown
async fn run_primary(
    clients: ClientPair,
    execution_type: Option<String>,
    config: &NodeConfig,
    paths: &NodePaths,
    lock: InstanceLock,
) -> Result<i32> {
    // Listeners go in first so a signal during startup still reaches shutdown
    let (tx, mut requests) = mpsc::unbounded_channel();
    let _signals = install_signal_listeners(tx.clone())?;
    install_panic_hook(tx.clone());

    let supervisor_config = SupervisorConfig {
        working_dir: dirs::home_dir(),
        ..SupervisorConfig::from_config(config, paths)
    };
    let mut supervisor = ProcessSupervisor::new(supervisor_config, lock);

    for kind in [clients.execution, clients.consensus] {
        let launch = config.launch_spec(kind, paths);
        match supervisor.start(kind, &launch) {
            Ok(pid) => info!(client = %kind, pid, "Client started"),
            Err(e) => error!(client = %kind, "Client failed to start: {}", e),
        }
    }

    let options = SessionOptions::new(clients, paths.install_dir(), execution_type);
    if let Err(e) = options.save(&paths.options_file()) {
        warn!("Failed to save session options: {}", e);
    }

    let poller = Arc::new(MetricsPoller::from_config(clients, config, paths)?);
    let state = DashboardState::new(clients, InstanceRole::Primary, config.dashboard.max_log_lines);
    let ctx = DashboardContext::from_config(
        state,
        poller,
        config,
        paths,
        Some(Arc::new(SignalShutdownRequester)),
    );

    let outcome = supervise(
        &mut supervisor,
        &mut requests,
        &tx,
        nodekeeper_dashboard::run(ctx),
    )
    .await?;

    report(&outcome);
    Ok(outcome.exit_code().unwrap_or(EXIT_FATAL))
}

/// Race the supervisor against the dashboard, then always finish supervising
///
/// When the dashboard ends first, the supervisor's `run` future is dropped,
/// possibly mid-sequence; the second `run` resumes from where it stopped. A
/// dashboard error or panic becomes a shutdown request of its own.
async fn supervise<D>(
    supervisor: &mut ProcessSupervisor,
    requests: &mut UnboundedReceiver<ShutdownRequest>,
    tx: &UnboundedSender<ShutdownRequest>,
    dashboard: D,
) -> Result<ShutdownOutcome>
where
    D: Future<Output = nodekeeper_core::Result<QuitAction>>,
{
    let dashboard = AssertUnwindSafe(dashboard).catch_unwind();
    tokio::select! {
        outcome = supervisor.run(requests) => Ok(outcome?),
        ended = dashboard => {
            if let Some(reason) = dashboard_shutdown_reason(ended) {
                if tx.send(ShutdownRequest::new(reason)).is_err() {
                    warn!("Shutdown channel closed; dashboard exit not forwarded");
                }
            }
            Ok(supervisor.run(requests).await?)
        }
    }
}

/// What the supervisor should be told once the primary's dashboard is gone
///
/// The quit key already raised SIGUSR2; the request is repeated here in case
/// raising it failed, and the supervisor ignores the duplicate.
fn dashboard_shutdown_reason(
    ended: std::result::Result<nodekeeper_core::Result<QuitAction>, Box<dyn Any + Send>>,
) -> Option<ShutdownReason> {
    match ended {
        Ok(Ok(QuitAction::RequestSupervisedShutdown)) => {
            debug!("Dashboard closed, waiting for supervisor");
            Some(ShutdownReason::UserRequest)
        }
        Ok(Ok(QuitAction::ExitLocal)) => {
            warn!("Primary dashboard closed without requesting shutdown");
            None
        }
        Ok(Err(e)) => {
            error!("Dashboard failed: {}", e);
            Some(ShutdownReason::Fatal(e.to_string()))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("Dashboard panicked: {}", message);
            Some(ShutdownReason::Panic(message))
        }
    }
}

/// Dashboard-only view of clients run by another instance
async fn run_secondary(
    flag_clients: ClientPair,
    config: &NodeConfig,
    paths: &NodePaths,
    lock: InstanceLock,
) -> Result<i32> {
    let clients = match SessionOptions::load(&paths.options_file()) {
        Ok(Some(options)) => match options.clients() {
            Ok(clients) => clients,
            Err(e) => {
                warn!("Ignoring session options: {}", e);
                flag_clients
            }
        },
        Ok(None) => flag_clients,
        Err(e) => {
            warn!("Failed to read session options: {}", e);
            flag_clients
        }
    };
    info!(execution = %clients.execution, consensus = %clients.consensus, "Dashboard-only instance");

    // Signals still funnel through the supervisor, which refuses to act
    // without the lock and leaves the primary's clients alone
    let (tx, mut requests) = mpsc::unbounded_channel();
    let _signals = install_signal_listeners(tx.clone())?;
    install_panic_hook(tx);

    let supervisor_config = SupervisorConfig {
        options_file: None,
        ..SupervisorConfig::from_config(config, paths)
    };
    let mut supervisor = ProcessSupervisor::new(supervisor_config, lock);

    let poller = Arc::new(MetricsPoller::from_config(clients, config, paths)?);
    let state = DashboardState::new(clients, InstanceRole::Secondary, config.dashboard.max_log_lines);
    let ctx = DashboardContext::from_config(state, poller, config, paths, None);

    tokio::select! {
        outcome = supervisor.run(&mut requests) => {
            let outcome = outcome?;
            report(&outcome);
            Ok(outcome.exit_code().unwrap_or(EXIT_FATAL))
        }
        ended = AssertUnwindSafe(nodekeeper_dashboard::run(ctx)).catch_unwind() => {
            match ended {
                Ok(dashboard) => {
                    let action = dashboard?;
                    debug!(?action, "Dashboard closed, leaving clients running");
                    Ok(EXIT_CLEAN)
                }
                Err(payload) => {
                    error!("Dashboard panicked: {}", panic_message(payload.as_ref()));
                    Ok(EXIT_FATAL)
                }
            }
        }
    }
}

/// Human-facing summary once the terminal is back to normal
fn report(outcome: &ShutdownOutcome) {
    match outcome {
        ShutdownOutcome::Completed { exit_code } if *exit_code == EXIT_CLEAN => {
            println!("Both clients exited");
        }
        ShutdownOutcome::Completed { exit_code } => {
            println!("Shutdown finished with exit code {}", exit_code);
        }
        ShutdownOutcome::NotOwner => {
            println!("Not the lock owner; clients left running");
        }
        ShutdownOutcome::AlreadyInProgress => {}
    }
}
