//! # nodekeeper-supervisor
//!
//! Owns the two supervised client processes of a primary instance.
//!
//! - [`InstanceLock`] decides whether this process is the primary
//! - [`ProcessSupervisor`] spawns the clients and runs the shutdown sequence
//! - [`signals`] funnels OS signals and panics into one shutdown channel
//! - [`SessionOptions`] records what the primary was started with
//!
//! ## Shutdown sequence
//!
//! ```text
//!  SIGINT / SIGTERM / SIGHUP / SIGUSR2 / panic
//!                    │
//!                    ▼
//!        ShutdownRequest channel ──▶ ProcessSupervisor::run
//!                                        │
//!          ownership check ──(not owner)──▶ exit 2
//!                    │
//!          interrupt running children (after 750ms)
//!                    │
//!          check_exit every 1s until both Exited or timeout
//!                    │
//!          release lock ──▶ exit 0 (clean) / 1 (timeout)
//! ```

mod lock;
mod options;
mod process;
pub mod signals;
mod supervisor;

pub use lock::{InstanceLock, LivenessProbe, ProcessLiveness, SignalProbe};
pub use options::SessionOptions;
pub use process::{ExitEvent, ProcessState, SupervisedProcess};
pub use signals::{panic_message, ShutdownReason, ShutdownRequest, SignalShutdownRequester};
pub use supervisor::{
    NixSignaller, ProcessSignaller, ProcessSupervisor, ShutdownOutcome, SupervisorConfig,
};

/// Exit status after both clients exited cleanly
pub const EXIT_CLEAN: i32 = 0;
/// Exit status for fatal errors and shutdown timeouts
pub const EXIT_FATAL: i32 = 1;
/// Exit status when a shutdown request reaches a non-owner instance
pub const EXIT_NOT_OWNER: i32 = 2;
