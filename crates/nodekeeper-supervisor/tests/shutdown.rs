//! Shutdown sequence against real child processes.
//!
//! Children are plain `sleep`/`sh` processes; signals are delivered for real
//! and also recorded so tests can assert what was sent.

use nodekeeper_core::{ClientKind, ClientRole, InstanceRole, LaunchSpec, Result};
use nodekeeper_supervisor::{
    InstanceLock, NixSignaller, ProcessSignaller, ProcessState, ProcessSupervisor,
    SessionOptions, ShutdownOutcome, ShutdownReason, ShutdownRequest, SupervisorConfig,
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Clone, Default)]
struct RecordingSignaller {
    sent: Arc<Mutex<Vec<(&'static str, u32)>>>,
}

impl RecordingSignaller {
    fn sent(&self) -> Vec<(&'static str, u32)> {
        self.sent.lock().unwrap().clone()
    }
}

impl ProcessSignaller for RecordingSignaller {
    fn interrupt(&self, pid: u32) -> Result<()> {
        self.sent.lock().unwrap().push(("INT", pid));
        NixSignaller.interrupt(pid)
    }

    fn kill(&self, pid: u32) -> Result<()> {
        self.sent.lock().unwrap().push(("KILL", pid));
        NixSignaller.kill(pid)
    }
}

fn test_config(dir: &Path, timeout: Duration) -> SupervisorConfig {
    SupervisorConfig {
        shutdown_poll: Duration::from_millis(100),
        interrupt_delay: Duration::from_millis(20),
        shutdown_timeout: timeout,
        install_dir: dir.to_path_buf(),
        working_dir: None,
        options_file: Some(dir.join("options.json")),
    }
}

fn sh(script: &str) -> LaunchSpec {
    LaunchSpec {
        program: "sh".into(),
        args: vec!["-c".to_string(), script.to_string()],
    }
}

fn primary(dir: &Path, timeout: Duration) -> (ProcessSupervisor, RecordingSignaller) {
    let lock = InstanceLock::new(dir.join("script.lock"));
    assert_eq!(lock.acquire_or_detect().unwrap(), InstanceRole::Primary);

    let signaller = RecordingSignaller::default();
    let supervisor = ProcessSupervisor::with_signaller(
        test_config(dir, timeout),
        lock,
        Box::new(signaller.clone()),
    );
    (supervisor, signaller)
}

#[tokio::test]
async fn test_interrupts_both_children_and_releases_lock() {
    let dir = tempfile::tempdir().unwrap();
    let (mut supervisor, signaller) = primary(dir.path(), Duration::from_secs(10));

    let exec_pid = supervisor
        .start(ClientKind::Geth, &sh("exec sleep 30"))
        .unwrap();
    let cons_pid = supervisor
        .start(ClientKind::Lighthouse, &sh("exec sleep 30"))
        .unwrap();
    std::fs::write(dir.path().join("options.json"), "{}").unwrap();

    let outcome = supervisor
        .shutdown(&ShutdownReason::Interrupt)
        .await
        .unwrap();

    assert_eq!(outcome, ShutdownOutcome::Completed { exit_code: 0 });
    let mut sent = signaller.sent();
    sent.sort();
    let mut expected = vec![("INT", exec_pid), ("INT", cons_pid)];
    expected.sort();
    assert_eq!(sent, expected);

    for role in [ClientRole::Execution, ClientRole::Consensus] {
        assert_eq!(supervisor.process(role).unwrap().state, ProcessState::Exited);
    }
    assert!(!dir.path().join("script.lock").exists());
    assert!(!dir.path().join("options.json").exists());
}

#[tokio::test]
async fn test_already_exited_children_get_no_signal() {
    let dir = tempfile::tempdir().unwrap();
    let (mut supervisor, signaller) = primary(dir.path(), Duration::from_secs(10));

    supervisor.start(ClientKind::Reth, &sh("exit 0")).unwrap();
    supervisor.start(ClientKind::Prysm, &sh("exit 3")).unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while !supervisor.check_exit() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();

    let outcome = supervisor
        .shutdown(&ShutdownReason::Terminate)
        .await
        .unwrap();

    assert_eq!(outcome, ShutdownOutcome::Completed { exit_code: 0 });
    assert!(signaller.sent().is_empty());
    assert_eq!(
        supervisor.process(ClientRole::Consensus).unwrap().last_exit_code,
        Some(3)
    );
}

#[tokio::test]
async fn test_repeated_requests_run_sequence_once() {
    let dir = tempfile::tempdir().unwrap();
    let (mut supervisor, signaller) = primary(dir.path(), Duration::from_secs(10));

    supervisor
        .start(ClientKind::Nethermind, &sh("exec sleep 30"))
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    tx.send(ShutdownRequest::new(ShutdownReason::Interrupt)).unwrap();
    tx.send(ShutdownRequest::new(ShutdownReason::HangUp)).unwrap();
    tx.send(ShutdownRequest::new(ShutdownReason::UserRequest))
        .unwrap();

    let outcome = supervisor.run(&mut rx).await.unwrap();
    assert_eq!(outcome, ShutdownOutcome::Completed { exit_code: 0 });
    assert_eq!(signaller.sent().len(), 1);

    let again = supervisor
        .shutdown(&ShutdownReason::Interrupt)
        .await
        .unwrap();
    assert_eq!(again, ShutdownOutcome::AlreadyInProgress);
    assert_eq!(signaller.sent().len(), 1);
}

#[tokio::test]
async fn test_non_owner_leaves_lock_and_children_alone() {
    let dir = tempfile::tempdir().unwrap();
    let lock_path = dir.path().join("script.lock");

    // A live primary: this test process, recorded under its real pid
    let owner = InstanceLock::new(&lock_path);
    assert_eq!(owner.acquire_or_detect().unwrap(), InstanceRole::Primary);

    // A second instance with a different identity sharing the directory
    let secondary_lock =
        InstanceLock::with_probe(&lock_path, owner.pid() + 1, Box::new(nodekeeper_supervisor::SignalProbe));
    assert_eq!(
        secondary_lock.acquire_or_detect().unwrap(),
        InstanceRole::Secondary
    );

    let signaller = RecordingSignaller::default();
    let mut secondary = ProcessSupervisor::with_signaller(
        test_config(dir.path(), Duration::from_secs(1)),
        secondary_lock,
        Box::new(signaller.clone()),
    );

    let options_path = dir.path().join("options.json");
    std::fs::write(&options_path, "{}").unwrap();

    let outcome = secondary
        .shutdown(&ShutdownReason::UserRequest)
        .await
        .unwrap();

    assert_eq!(outcome, ShutdownOutcome::NotOwner);
    assert_eq!(outcome.exit_code(), Some(2));
    assert!(signaller.sent().is_empty());
    assert_eq!(owner.owner().unwrap(), Some(owner.pid()));
    assert!(options_path.exists());
}

#[tokio::test]
async fn test_timeout_escalates_to_kill() {
    let dir = tempfile::tempdir().unwrap();
    let (mut supervisor, signaller) = primary(dir.path(), Duration::from_millis(500));

    let pid = supervisor
        .start(ClientKind::Geth, &sh("trap '' INT; exec sleep 30"))
        .unwrap();
    // Give the shell time to install the trap before it is interrupted
    tokio::time::sleep(Duration::from_millis(200)).await;

    let outcome = supervisor
        .shutdown(&ShutdownReason::Interrupt)
        .await
        .unwrap();

    assert_eq!(outcome, ShutdownOutcome::Completed { exit_code: 1 });
    assert_eq!(signaller.sent(), vec![("INT", pid), ("KILL", pid)]);
    assert!(!dir.path().join("script.lock").exists());
}

#[tokio::test]
async fn test_lost_lock_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let (mut supervisor, signaller) = primary(dir.path(), Duration::from_secs(1));
    std::fs::remove_file(dir.path().join("script.lock")).unwrap();

    let result = supervisor.shutdown(&ShutdownReason::Terminate).await;
    assert!(result.is_err());
    assert!(signaller.sent().is_empty());
}

#[tokio::test]
async fn test_session_options_visible_to_secondary() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("options.json");
    let pair = nodekeeper_core::ClientPair::new(ClientKind::Geth, ClientKind::Prysm).unwrap();

    SessionOptions::new(pair, dir.path(), None).save(&path).unwrap();

    let seen = SessionOptions::load(&path).unwrap().unwrap();
    assert_eq!(seen.clients().unwrap(), pair);
    assert_eq!(seen.owner_pid, std::process::id());
}

#[tokio::test]
async fn test_dropped_run_is_resumed_by_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let lock = InstanceLock::new(dir.path().join("script.lock"));
    assert_eq!(lock.acquire_or_detect().unwrap(), InstanceRole::Primary);
    let signaller = RecordingSignaller::default();
    let config = SupervisorConfig {
        interrupt_delay: Duration::from_millis(750),
        ..test_config(dir.path(), Duration::from_secs(10))
    };
    let mut supervisor =
        ProcessSupervisor::with_signaller(config, lock, Box::new(signaller.clone()));

    let exec_pid = supervisor
        .start(ClientKind::Geth, &sh("exec sleep 30"))
        .unwrap();
    let cons_pid = supervisor
        .start(ClientKind::Lighthouse, &sh("exec sleep 30"))
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    tx.send(ShutdownRequest::new(ShutdownReason::Terminate)).unwrap();

    // Dropped while still in the interrupt delay, as when the dashboard
    // wins the race in the composition root
    let first = tokio::time::timeout(Duration::from_millis(100), supervisor.run(&mut rx)).await;
    assert!(first.is_err());
    assert!(supervisor.is_exiting());
    assert!(signaller.sent().is_empty());
    assert!(dir.path().join("script.lock").exists());

    tx.send(ShutdownRequest::new(ShutdownReason::UserRequest))
        .unwrap();
    let outcome = supervisor.run(&mut rx).await.unwrap();

    assert_eq!(outcome, ShutdownOutcome::Completed { exit_code: 0 });
    let mut sent = signaller.sent();
    sent.sort();
    let mut expected = vec![("INT", exec_pid), ("INT", cons_pid)];
    expected.sort();
    assert_eq!(sent, expected);
    for role in [ClientRole::Execution, ClientRole::Consensus] {
        assert_eq!(supervisor.process(role).unwrap().state, ProcessState::Exited);
    }
    assert!(!dir.path().join("script.lock").exists());
}

#[tokio::test]
async fn test_resumed_wait_does_not_interrupt_twice() {
    let dir = tempfile::tempdir().unwrap();
    let (mut supervisor, signaller) = primary(dir.path(), Duration::from_millis(800));

    let pid = supervisor
        .start(ClientKind::Geth, &sh("trap '' INT; exec sleep 30"))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Dropped after the interrupt went out, while waiting for the exit
    let first = tokio::time::timeout(
        Duration::from_millis(300),
        supervisor.shutdown(&ShutdownReason::HangUp),
    )
    .await;
    assert!(first.is_err());
    assert_eq!(signaller.sent(), vec![("INT", pid)]);

    let (_tx, mut rx) = mpsc::unbounded_channel();
    let outcome = tokio::time::timeout(Duration::from_secs(5), supervisor.run(&mut rx))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome, ShutdownOutcome::Completed { exit_code: 1 });
    assert_eq!(signaller.sent(), vec![("INT", pid), ("KILL", pid)]);
    assert!(!dir.path().join("script.lock").exists());
}
