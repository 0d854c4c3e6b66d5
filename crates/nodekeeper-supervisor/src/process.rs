//! Per-client bookkeeping

use nodekeeper_core::{ClientKind, ClientRole};
use serde::{Deserialize, Serialize};

/// Lifecycle of one supervised client
///
/// `NotStarted → Running → ExitRequested → Exited`. A process may also jump
/// straight from `Running` (or `NotStarted`, on spawn failure) to `Exited`.
/// There is no way back: an exited client is never restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    NotStarted,
    Running,
    ExitRequested,
    Exited,
}

/// Exit notification delivered by a child's waiter task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitEvent {
    pub role: ClientRole,
    pub pid: Option<u32>,
    /// `None` when the child was terminated by a signal
    pub code: Option<i32>,
}

/// One of the two clients owned by the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisedProcess {
    pub role: ClientRole,
    pub kind: ClientKind,
    pub pid: Option<u32>,
    pub state: ProcessState,
    pub last_exit_code: Option<i32>,
}

impl SupervisedProcess {
    pub fn new(kind: ClientKind) -> Self {
        Self {
            role: kind.role(),
            kind,
            pid: None,
            state: ProcessState::NotStarted,
            last_exit_code: None,
        }
    }

    pub fn is_exited(&self) -> bool {
        self.state == ProcessState::Exited
    }

    /// Still alive from the supervisor's point of view
    pub fn is_live(&self) -> bool {
        matches!(
            self.state,
            ProcessState::Running | ProcessState::ExitRequested
        )
    }

    pub(crate) fn mark_running(&mut self, pid: Option<u32>) {
        self.pid = pid;
        self.state = ProcessState::Running;
    }

    /// Only a running process can be asked to exit
    pub(crate) fn request_exit(&mut self) -> bool {
        if self.state == ProcessState::Running {
            self.state = ProcessState::ExitRequested;
            true
        } else {
            false
        }
    }

    pub(crate) fn mark_exited(&mut self, code: Option<i32>) {
        self.state = ProcessState::Exited;
        self.last_exit_code = code;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        let mut process = SupervisedProcess::new(ClientKind::Geth);
        assert_eq!(process.role, ClientRole::Execution);
        assert_eq!(process.state, ProcessState::NotStarted);
        assert!(!process.request_exit());

        process.mark_running(Some(1234));
        assert!(process.is_live());
        assert!(process.request_exit());
        assert_eq!(process.state, ProcessState::ExitRequested);
        assert!(!process.request_exit());

        process.mark_exited(Some(0));
        assert!(process.is_exited());
        assert!(!process.is_live());
        assert_eq!(process.last_exit_code, Some(0));
        assert!(!process.request_exit());
    }
}
