//! Singleton instance lock
//!
//! A single text file under the installation directory holds the decimal
//! process id of the primary instance. Creation uses `create_new`, so two
//! instances racing on an empty directory cannot both win. A lock whose
//! owner no longer exists is removed and acquisition is retried once.
//!
//! Two instances that observe the same stale lock at the same moment can
//! still both delete it; only one of the following `create_new` calls
//! succeeds, and the loser re-reads the file and becomes a secondary.

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use nodekeeper_core::{InstanceRole, NodeError, Result};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Result of probing a process id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessLiveness {
    Alive,
    Dead,
}

/// Capability to test whether a process id refers to a running process
///
/// Implementations must not deliver a real signal.
pub trait LivenessProbe: Send + Sync {
    fn probe(&self, pid: u32) -> Result<ProcessLiveness>;
}

/// Probe using the null signal (`kill(pid, 0)`)
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalProbe;

impl LivenessProbe for SignalProbe {
    fn probe(&self, pid: u32) -> Result<ProcessLiveness> {
        let raw = i32::try_from(pid)
            .map_err(|_| NodeError::LockVerification(format!("pid {} out of range", pid)))?;

        match kill(Pid::from_raw(raw), None) {
            Ok(()) => Ok(ProcessLiveness::Alive),
            Err(Errno::ESRCH) => Ok(ProcessLiveness::Dead),
            // Exists but belongs to another user
            Err(Errno::EPERM) => Ok(ProcessLiveness::Alive),
            Err(e) => Err(NodeError::LockVerification(format!(
                "liveness probe for pid {} failed: {}",
                pid, e
            ))),
        }
    }
}

/// Parsed lock file content
#[derive(Debug, PartialEq, Eq)]
enum LockContent {
    Owner(u32),
    Corrupt(String),
}

/// File-based mutual exclusion between nodekeeper instances
pub struct InstanceLock {
    path: PathBuf,
    pid: u32,
    probe: Box<dyn LivenessProbe>,
}

impl InstanceLock {
    /// Lock at `path` held on behalf of the current process
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_probe(path, std::process::id(), Box::new(SignalProbe))
    }

    /// Lock with an explicit owner id and liveness probe
    pub fn with_probe(path: impl Into<PathBuf>, pid: u32, probe: Box<dyn LivenessProbe>) -> Self {
        Self {
            path: path.into(),
            pid,
            probe,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Process id this lock is held for
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Become the primary, or detect a live primary and become a secondary
    ///
    /// A stale lock (dead owner or unreadable content) is deleted and
    /// creation retried once. A failed liveness probe is fatal: guessing
    /// would risk two instances supervising the same clients.
    pub fn acquire_or_detect(&self) -> Result<InstanceRole> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        for attempt in 0..2 {
            match self.try_create() {
                Ok(()) => {
                    info!(pid = self.pid, lock = %self.path.display(), "Acquired instance lock");
                    return Ok(InstanceRole::Primary);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(NodeError::Lock(format!(
                        "Failed to create {}: {}",
                        self.path.display(),
                        e
                    )))
                }
            }

            match self.read_content()? {
                // Removed between our create attempt and the read
                None => continue,
                Some(LockContent::Owner(owner)) if owner == self.pid => {
                    info!(pid = owner, "Lock already records this process");
                    return Ok(InstanceRole::Primary);
                }
                Some(LockContent::Owner(owner)) => match self.probe.probe(owner)? {
                    ProcessLiveness::Alive => {
                        info!(owner, "Another instance is running; dashboard-only mode");
                        return Ok(InstanceRole::Secondary);
                    }
                    ProcessLiveness::Dead => {
                        warn!(owner, attempt, "Removing stale instance lock");
                        self.remove_if_present()?;
                    }
                },
                Some(LockContent::Corrupt(raw)) => {
                    warn!(content = %raw, "Removing unreadable instance lock");
                    self.remove_if_present()?;
                }
            }
        }

        Err(NodeError::Lock(format!(
            "Could not acquire {} after removing a stale lock",
            self.path.display()
        )))
    }

    /// Current owner recorded in the lock file, if any
    pub fn owner(&self) -> Result<Option<u32>> {
        Ok(match self.read_content()? {
            Some(LockContent::Owner(pid)) => Some(pid),
            _ => None,
        })
    }

    /// Whether the lock file names this process
    ///
    /// Any read failure, including a missing file, is reported as
    /// [`NodeError::LockVerification`].
    pub fn is_owned_by_me(&self) -> Result<bool> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            NodeError::LockVerification(format!("Error reading {}: {}", self.path.display(), e))
        })?;
        Ok(parse_content(&raw) == LockContent::Owner(self.pid))
    }

    /// Delete the lock file if, and only if, it names this process
    ///
    /// Returns whether the file was removed.
    pub fn release(&self) -> Result<bool> {
        match self.read_content()? {
            Some(LockContent::Owner(owner)) if owner == self.pid => {
                self.remove_if_present()?;
                info!(pid = self.pid, "Released instance lock");
                Ok(true)
            }
            Some(other) => {
                warn!(?other, pid = self.pid, "Not releasing a lock owned by another instance");
                Ok(false)
            }
            None => {
                debug!("Instance lock already gone");
                Ok(false)
            }
        }
    }

    fn try_create(&self) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)?;
        file.write_all(self.pid.to_string().as_bytes())?;
        file.sync_all()
    }

    fn read_content(&self) -> Result<Option<LockContent>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(parse_content(&raw))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(NodeError::LockVerification(format!(
                "Error reading {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn remove_if_present(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn parse_content(raw: &str) -> LockContent {
    match raw.trim().parse::<u32>() {
        // pid 0 would address our own process group
        Ok(pid) if pid > 0 => LockContent::Owner(pid),
        _ => LockContent::Corrupt(raw.trim().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct FixedProbe(HashMap<u32, ProcessLiveness>);

    impl LivenessProbe for FixedProbe {
        fn probe(&self, pid: u32) -> Result<ProcessLiveness> {
            self.0
                .get(&pid)
                .copied()
                .ok_or_else(|| NodeError::LockVerification(format!("no answer for {}", pid)))
        }
    }

    fn lock_with(dir: &TempDir, pid: u32, answers: &[(u32, ProcessLiveness)]) -> InstanceLock {
        InstanceLock::with_probe(
            dir.path().join("ethereum_clients").join("script.lock"),
            pid,
            Box::new(FixedProbe(answers.iter().copied().collect())),
        )
    }

    #[test]
    fn test_acquire_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let lock = lock_with(&dir, 100, &[]);

        assert_eq!(lock.acquire_or_detect().unwrap(), InstanceRole::Primary);
        assert_eq!(std::fs::read_to_string(lock.path()).unwrap(), "100");
    }

    #[test]
    fn test_live_owner_makes_secondary() {
        let dir = tempfile::tempdir().unwrap();
        let lock = lock_with(&dir, 100, &[(42, ProcessLiveness::Alive)]);
        std::fs::create_dir_all(lock.path().parent().unwrap()).unwrap();
        std::fs::write(lock.path(), "42").unwrap();

        assert_eq!(lock.acquire_or_detect().unwrap(), InstanceRole::Secondary);
        assert_eq!(std::fs::read_to_string(lock.path()).unwrap(), "42");
    }

    #[test]
    fn test_dead_owner_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let lock = lock_with(&dir, 100, &[(42, ProcessLiveness::Dead)]);
        std::fs::create_dir_all(lock.path().parent().unwrap()).unwrap();
        std::fs::write(lock.path(), "42\n").unwrap();

        assert_eq!(lock.acquire_or_detect().unwrap(), InstanceRole::Primary);
        assert_eq!(lock.owner().unwrap(), Some(100));
    }

    #[test]
    fn test_corrupt_lock_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let lock = lock_with(&dir, 100, &[]);
        std::fs::create_dir_all(lock.path().parent().unwrap()).unwrap();
        std::fs::write(lock.path(), "not-a-pid").unwrap();

        assert_eq!(lock.acquire_or_detect().unwrap(), InstanceRole::Primary);
        assert_eq!(lock.owner().unwrap(), Some(100));
    }

    #[test]
    fn test_probe_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let lock = lock_with(&dir, 100, &[]);
        std::fs::create_dir_all(lock.path().parent().unwrap()).unwrap();
        std::fs::write(lock.path(), "42").unwrap();

        let err = lock.acquire_or_detect().unwrap_err();
        assert!(matches!(err, NodeError::LockVerification(_)));
        assert!(lock.path().exists());
    }

    #[test]
    fn test_own_pid_in_lock_is_primary() {
        let dir = tempfile::tempdir().unwrap();
        let lock = lock_with(&dir, 100, &[]);
        std::fs::create_dir_all(lock.path().parent().unwrap()).unwrap();
        std::fs::write(lock.path(), "100").unwrap();

        assert_eq!(lock.acquire_or_detect().unwrap(), InstanceRole::Primary);
    }

    #[test]
    fn test_release_only_by_owner() {
        let dir = tempfile::tempdir().unwrap();
        let primary = lock_with(&dir, 100, &[]);
        let secondary = lock_with(&dir, 200, &[(100, ProcessLiveness::Alive)]);

        assert_eq!(primary.acquire_or_detect().unwrap(), InstanceRole::Primary);
        assert_eq!(secondary.acquire_or_detect().unwrap(), InstanceRole::Secondary);

        assert!(!secondary.release().unwrap());
        assert!(primary.path().exists());

        assert!(primary.release().unwrap());
        assert!(!primary.path().exists());
        assert!(!primary.release().unwrap());
    }

    #[test]
    fn test_is_owned_by_me() {
        let dir = tempfile::tempdir().unwrap();
        let lock = lock_with(&dir, 100, &[]);

        assert!(matches!(
            lock.is_owned_by_me(),
            Err(NodeError::LockVerification(_))
        ));

        lock.acquire_or_detect().unwrap();
        assert!(lock.is_owned_by_me().unwrap());

        std::fs::write(lock.path(), "7").unwrap();
        assert!(!lock.is_owned_by_me().unwrap());
    }

    #[test]
    fn test_parse_content() {
        assert_eq!(parse_content(" 123\n"), LockContent::Owner(123));
        assert!(matches!(parse_content("0"), LockContent::Corrupt(_)));
        assert!(matches!(parse_content("-5"), LockContent::Corrupt(_)));
    }

    #[test]
    fn test_signal_probe_sees_self() {
        let probe = SignalProbe;
        assert_eq!(
            probe.probe(std::process::id()).unwrap(),
            ProcessLiveness::Alive
        );
    }
}
