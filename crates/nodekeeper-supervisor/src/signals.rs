//! Shutdown triggers
//!
//! Every way the primary can be asked to stop ends up as a
//! [`ShutdownRequest`] on one unbounded channel consumed by
//! [`ProcessSupervisor::run`](crate::ProcessSupervisor::run):
//!
//! - SIGINT, SIGTERM and SIGHUP from the terminal or the service manager
//! - SIGUSR2, raised by the dashboard's quit key through
//!   [`SignalShutdownRequester`]
//! - panics anywhere in the process, including spawned tasks
//! - fatal errors reported by the composition root

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use nodekeeper_core::{NodeError, Result, ShutdownRequester};
use std::any::Any;
use std::fmt;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Why a shutdown was requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    Interrupt,
    Terminate,
    HangUp,
    /// Quit key on the primary's dashboard
    UserRequest,
    Panic(String),
    Fatal(String),
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => write!(f, "SIGINT"),
            Self::Terminate => write!(f, "SIGTERM"),
            Self::HangUp => write!(f, "SIGHUP"),
            Self::UserRequest => write!(f, "SIGUSR2"),
            Self::Panic(msg) => write!(f, "panic: {}", msg),
            Self::Fatal(msg) => write!(f, "fatal: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownRequest {
    pub reason: ShutdownReason,
}

impl ShutdownRequest {
    pub fn new(reason: ShutdownReason) -> Self {
        Self { reason }
    }
}

/// Register handlers for the four shutdown signals and forward each
/// delivery as a request
///
/// Handlers are registered before this returns, so a signal raised
/// afterwards is never lost. Repeated signals produce repeated requests;
/// the supervisor ignores all but the first.
pub fn install_signal_listeners(tx: UnboundedSender<ShutdownRequest>) -> Result<JoinHandle<()>> {
    let register = |kind: SignalKind, name: &str| {
        signal(kind).map_err(|e| NodeError::Signal(format!("Failed to register {}: {}", name, e)))
    };

    let mut interrupt = register(SignalKind::interrupt(), "SIGINT")?;
    let mut terminate = register(SignalKind::terminate(), "SIGTERM")?;
    let mut hangup = register(SignalKind::hangup(), "SIGHUP")?;
    let mut user = register(SignalKind::user_defined2(), "SIGUSR2")?;

    debug!("Shutdown signal listeners installed");

    Ok(tokio::spawn(async move {
        loop {
            let reason = tokio::select! {
                Some(()) = interrupt.recv() => ShutdownReason::Interrupt,
                Some(()) = terminate.recv() => ShutdownReason::Terminate,
                Some(()) = hangup.recv() => ShutdownReason::HangUp,
                Some(()) = user.recv() => ShutdownReason::UserRequest,
                else => break,
            };

            info!(%reason, "Received shutdown signal");
            if tx.send(ShutdownRequest::new(reason)).is_err() {
                debug!("Shutdown channel closed; signal listener exiting");
                break;
            }
        }
    }))
}

/// Text of a panic payload, for logs and [`ShutdownReason::Panic`]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Route panics into the shutdown channel, then run the previous hook
pub fn install_panic_hook(tx: UnboundedSender<ShutdownRequest>) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let message = panic_message(panic_info.payload());
        let location = panic_info
            .location()
            .map(|l| format!(" at {}:{}", l.file(), l.line()))
            .unwrap_or_default();

        warn!("Panic{}: {}", location, message);
        if tx.send(ShutdownRequest::new(ShutdownReason::Panic(message))).is_err() {
            debug!("Shutdown channel closed; panic not forwarded");
        }
        previous(panic_info);
    }));
}

/// Requests a supervised shutdown by raising SIGUSR2 on this process
///
/// The dashboard does not own the supervisor; going through the signal
/// path makes its quit key indistinguishable from an external request.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalShutdownRequester;

impl ShutdownRequester for SignalShutdownRequester {
    fn request_shutdown(&self, reason: &str) -> Result<()> {
        info!(reason, "Requesting supervised shutdown");
        kill(Pid::this(), Signal::SIGUSR2)
            .map_err(|e| NodeError::Signal(format!("Failed to raise SIGUSR2: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[test]
    fn test_reason_display() {
        assert_eq!(ShutdownReason::Interrupt.to_string(), "SIGINT");
        assert_eq!(ShutdownReason::UserRequest.to_string(), "SIGUSR2");
        assert_eq!(
            ShutdownReason::Fatal("lock".into()).to_string(),
            "fatal: lock"
        );
    }

    #[test]
    fn test_panic_message_from_payload() {
        let literal = std::panic::catch_unwind(|| panic!("layout overflow")).unwrap_err();
        assert_eq!(panic_message(literal.as_ref()), "layout overflow");

        let formatted = std::panic::catch_unwind(|| panic!("row {}", 7)).unwrap_err();
        assert_eq!(panic_message(formatted.as_ref()), "row 7");

        let opaque = std::panic::catch_unwind(|| std::panic::panic_any(42u8)).unwrap_err();
        assert_eq!(panic_message(opaque.as_ref()), "unknown panic");
    }

    #[tokio::test]
    async fn test_requester_reaches_listener() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = install_signal_listeners(tx).unwrap();

        SignalShutdownRequester.request_shutdown("quit key").unwrap();

        let request = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.reason, ShutdownReason::UserRequest);

        handle.abort();
    }
}
