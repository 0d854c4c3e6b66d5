//! Child process lifecycle and the shutdown sequence

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use nodekeeper_core::fail_open::fail_open_sync;
use nodekeeper_core::{
    ClientKind, ClientRole, LaunchSpec, NodeConfig, NodeError, NodePaths, Result,
};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::lock::InstanceLock;
use crate::options::SessionOptions;
use crate::process::{ExitEvent, SupervisedProcess};
use crate::signals::{ShutdownReason, ShutdownRequest};
use crate::{EXIT_CLEAN, EXIT_FATAL};

/// Timing and filesystem inputs for the supervisor
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Interval of the recurring exit check
    pub shutdown_poll: Duration,
    /// Pause between marking children and interrupting them
    pub interrupt_delay: Duration,
    /// Upper bound before remaining children are killed
    pub shutdown_timeout: Duration,
    /// Exported to children as `INSTALL_DIR`
    pub install_dir: PathBuf,
    /// Working directory for children
    pub working_dir: Option<PathBuf>,
    /// Session options removed when shutdown starts
    pub options_file: Option<PathBuf>,
}

impl SupervisorConfig {
    pub fn from_config(config: &NodeConfig, paths: &NodePaths) -> Self {
        Self {
            shutdown_poll: config.intervals.shutdown_poll(),
            interrupt_delay: config.intervals.interrupt_delay(),
            shutdown_timeout: config.intervals.shutdown_timeout(),
            install_dir: paths.install_dir().to_path_buf(),
            working_dir: None,
            options_file: Some(paths.options_file()),
        }
    }
}

/// Delivers signals to supervised children
///
/// A child that is already gone is not an error.
pub trait ProcessSignaller: Send + Sync {
    fn interrupt(&self, pid: u32) -> Result<()>;
    fn kill(&self, pid: u32) -> Result<()>;
}

/// Real signal delivery through `kill(2)`
#[derive(Debug, Clone, Copy, Default)]
pub struct NixSignaller;

impl NixSignaller {
    fn send(pid: u32, signal: Signal) -> Result<()> {
        let raw = i32::try_from(pid)
            .map_err(|_| NodeError::Signal(format!("pid {} out of range", pid)))?;
        match kill(Pid::from_raw(raw), signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(NodeError::Signal(format!(
                "Failed to send {} to {}: {}",
                signal, pid, e
            ))),
        }
    }
}

impl ProcessSignaller for NixSignaller {
    fn interrupt(&self, pid: u32) -> Result<()> {
        Self::send(pid, Signal::SIGINT)
    }

    fn kill(&self, pid: u32) -> Result<()> {
        Self::send(pid, Signal::SIGKILL)
    }
}

/// What a shutdown request resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The sequence ran to the end; the process should exit with this code
    Completed { exit_code: i32 },
    /// This instance does not own the lock; nothing was touched
    NotOwner,
    /// A previous request already ran the sequence to its end
    AlreadyInProgress,
}

impl ShutdownOutcome {
    /// Process exit status, if this outcome should end the process
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Completed { exit_code } => Some(*exit_code),
            Self::NotOwner => Some(crate::EXIT_NOT_OWNER),
            Self::AlreadyInProgress => None,
        }
    }
}

/// How far the shutdown sequence got
///
/// Kept on the supervisor rather than in the `shutdown` future, so a caller
/// that drops the future mid-sequence can resume it with the next call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShutdownPhase {
    Idle,
    /// Ownership verified; children not yet interrupted
    Interrupting,
    /// Interrupts delivered; waiting for exits until `deadline`
    Waiting { deadline: Instant },
    /// Lock released, or this instance turned out not to own it
    Finished,
}

/// Owns the execution and consensus client processes
///
/// Exit notifications arrive on a channel fed by one waiter task per
/// child. The waiter is spawned inside [`start`](Self::start), so it is
/// always in place before [`shutdown`](Self::shutdown) can signal anything.
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    lock: InstanceLock,
    signaller: Box<dyn ProcessSignaller>,
    processes: Vec<SupervisedProcess>,
    exit_tx: UnboundedSender<ExitEvent>,
    exit_rx: UnboundedReceiver<ExitEvent>,
    phase: ShutdownPhase,
    /// Reason of the request that started the sequence
    reason: Option<ShutdownReason>,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig, lock: InstanceLock) -> Self {
        Self::with_signaller(config, lock, Box::new(NixSignaller))
    }

    pub fn with_signaller(
        config: SupervisorConfig,
        lock: InstanceLock,
        signaller: Box<dyn ProcessSignaller>,
    ) -> Self {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        Self {
            config,
            lock,
            signaller,
            processes: Vec::new(),
            exit_tx,
            exit_rx,
            phase: ShutdownPhase::Idle,
            reason: None,
        }
    }

    pub fn processes(&self) -> &[SupervisedProcess] {
        &self.processes
    }

    pub fn process(&self, role: ClientRole) -> Option<&SupervisedProcess> {
        self.processes.iter().find(|p| p.role == role)
    }

    /// True from the first shutdown request on
    pub fn is_exiting(&self) -> bool {
        self.phase != ShutdownPhase::Idle
    }

    /// Reason of a sequence that started but never finished
    fn unfinished_reason(&self) -> Option<ShutdownReason> {
        match self.phase {
            ShutdownPhase::Interrupting | ShutdownPhase::Waiting { .. } => self.reason.clone(),
            ShutdownPhase::Idle | ShutdownPhase::Finished => None,
        }
    }

    /// Spawn one client and start watching for its exit
    ///
    /// On spawn failure the client is recorded as exited, so a later
    /// shutdown does not wait for it, and the error is returned.
    #[instrument(skip(self, launch), fields(program = %launch.program.display()))]
    pub fn start(&mut self, kind: ClientKind, launch: &LaunchSpec) -> Result<u32> {
        let role = kind.role();
        if self.process(role).is_some() {
            return Err(NodeError::Process(format!(
                "{} client already started for this run",
                role
            )));
        }
        if self.is_exiting() {
            return Err(NodeError::Process(
                "Cannot start clients during shutdown".to_string(),
            ));
        }

        let mut process = SupervisedProcess::new(kind);

        let mut cmd = Command::new(&launch.program);
        cmd.args(&launch.args)
            .env("INSTALL_DIR", &self.config.install_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(client = %kind, "Failed to spawn: {}", e);
                process.mark_exited(None);
                self.processes.push(process);
                return Err(NodeError::Spawn {
                    client: kind.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let pid = child.id();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(kind, "stdout", stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(kind, "stderr", stderr));
        }

        let exit_tx = self.exit_tx.clone();
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(client = %kind, "Error waiting for client: {}", e);
                    None
                }
            };
            let _ = exit_tx.send(ExitEvent { role, pid, code });
        });

        process.mark_running(pid);
        self.processes.push(process);
        info!(client = %kind, pid = ?pid, "Client started");

        pid.ok_or_else(|| NodeError::Process(format!("{} exited before reporting a pid", kind)))
    }

    /// Apply pending exit notifications; true once every client has exited
    ///
    /// Safe to call any number of times.
    pub fn check_exit(&mut self) -> bool {
        while let Ok(event) = self.exit_rx.try_recv() {
            self.record_exit(event);
        }
        self.processes.iter().all(SupervisedProcess::is_exited)
    }

    /// Run the shutdown sequence
    ///
    /// Returns `Err` only when lock ownership cannot be verified; the caller
    /// must treat that as fatal. If an earlier call was dropped before it
    /// finished, this call continues from the step it reached: children are
    /// interrupted at most once, the original deadline still applies, and the
    /// lock is released at most once.
    #[instrument(skip(self, reason), fields(reason = %reason))]
    pub async fn shutdown(&mut self, reason: &ShutdownReason) -> Result<ShutdownOutcome> {
        match self.phase {
            ShutdownPhase::Finished => {
                debug!("Shutdown already handled");
                return Ok(ShutdownOutcome::AlreadyInProgress);
            }
            ShutdownPhase::Idle => {
                info!("Shutdown requested");
                self.reason = Some(reason.clone());
                // Nothing may be signalled until ownership is confirmed
                self.phase = ShutdownPhase::Finished;
                if !self.lock.is_owned_by_me()? {
                    info!(
                        pid = self.lock.pid(),
                        "Not the lock owner; closing dashboard view without touching clients"
                    );
                    return Ok(ShutdownOutcome::NotOwner);
                }
                self.phase = ShutdownPhase::Interrupting;

                if let Some(path) = self.config.options_file.clone() {
                    fail_open_sync("delete session options", || SessionOptions::delete(&path));
                }
            }
            ShutdownPhase::Interrupting | ShutdownPhase::Waiting { .. } => {
                info!(started_by = ?self.reason, "Resuming shutdown");
            }
        }

        let deadline = match self.phase {
            ShutdownPhase::Waiting { deadline } => deadline,
            _ => {
                self.interrupt_running().await;
                let deadline = Instant::now() + self.config.shutdown_timeout;
                self.phase = ShutdownPhase::Waiting { deadline };
                deadline
            }
        };

        let clean = self.wait_for_exit(deadline).await;
        let mut exit_code = if clean { EXIT_CLEAN } else { EXIT_FATAL };

        if !clean {
            self.kill_remaining().await;
        }

        self.phase = ShutdownPhase::Finished;
        if let Err(e) = self.lock.release() {
            error!("Failed to release instance lock: {}", e);
            exit_code = EXIT_FATAL;
        }

        if clean {
            info!("Both clients exited");
        } else {
            warn!("Shutdown timed out; remaining clients were killed");
        }
        Ok(ShutdownOutcome::Completed { exit_code })
    }

    /// Supervise until a shutdown request has been fully handled
    ///
    /// Client exits seen while waiting are recorded but never restarted.
    /// A sequence left unfinished by a dropped `run` is resumed at once,
    /// without waiting for another request. Requests queued while the
    /// sequence runs are acknowledged as no-ops.
    pub async fn run(
        &mut self,
        requests: &mut UnboundedReceiver<ShutdownRequest>,
    ) -> Result<ShutdownOutcome> {
        let reason = match self.unfinished_reason() {
            Some(reason) => reason,
            None => self.next_request(requests).await,
        };

        let outcome = self.shutdown(&reason).await?;
        while let Ok(extra) = requests.try_recv() {
            let repeat = self.shutdown(&extra.reason).await?;
            debug!(reason = %extra.reason, ?repeat, "Ignoring repeated shutdown request");
        }
        Ok(outcome)
    }

    async fn next_request(
        &mut self,
        requests: &mut UnboundedReceiver<ShutdownRequest>,
    ) -> ShutdownReason {
        loop {
            tokio::select! {
                Some(event) = self.exit_rx.recv() => self.record_exit(event),
                request = requests.recv() => {
                    return match request {
                        Some(request) => request.reason,
                        None => ShutdownReason::Fatal("shutdown channel closed".to_string()),
                    };
                }
            }
        }
    }

    fn record_exit(&mut self, event: ExitEvent) {
        let Some(process) = self
            .processes
            .iter_mut()
            .find(|p| p.role == event.role && p.pid == event.pid)
        else {
            warn!(?event, "Exit event for an unknown process");
            return;
        };

        if process.is_exited() {
            return;
        }
        process.mark_exited(event.code);
        match event.code {
            Some(code) => info!(client = %process.kind, code, "Client process exited"),
            None => info!(client = %process.kind, "Client process terminated by signal"),
        }
    }

    async fn interrupt_running(&mut self) {
        self.check_exit();

        for process in &mut self.processes {
            process.request_exit();
        }
        // Marked by an earlier, dropped call counts too
        if !self.processes.iter().any(SupervisedProcess::is_live) {
            debug!("No running clients to interrupt");
            return;
        }

        tokio::time::sleep(self.config.interrupt_delay).await;
        self.check_exit();

        for process in self.processes.iter().filter(|p| p.is_live()) {
            let Some(pid) = process.pid else { continue };
            info!(client = %process.kind, pid, "Sending SIGINT");
            if let Err(e) = self.signaller.interrupt(pid) {
                warn!(client = %process.kind, "{}", e);
            }
        }
    }

    async fn wait_for_exit(&mut self, deadline: Instant) -> bool {
        let mut ticker = tokio::time::interval(self.config.shutdown_poll);

        loop {
            if self.check_exit() {
                return true;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                Some(event) = self.exit_rx.recv() => self.record_exit(event),
                _ = tokio::time::sleep_until(deadline) => {
                    return self.check_exit();
                }
            }
        }
    }

    async fn kill_remaining(&mut self) {
        for process in self.processes.iter().filter(|p| p.is_live()) {
            let Some(pid) = process.pid else { continue };
            warn!(client = %process.kind, pid, "Sending SIGKILL");
            if let Err(e) = self.signaller.kill(pid) {
                error!(client = %process.kind, "{}", e);
            }
        }

        let grace = Instant::now() + self.config.shutdown_poll;
        while !self.check_exit() {
            tokio::select! {
                Some(event) = self.exit_rx.recv() => self.record_exit(event),
                _ = tokio::time::sleep_until(grace) => break,
            }
        }
    }
}

async fn forward_output<R>(kind: ClientKind, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(client = %kind, stream, "{}", line),
            Ok(None) => break,
            Err(e) => {
                warn!(client = %kind, stream, "Error reading client output: {}", e);
                break;
            }
        }
    }
}
