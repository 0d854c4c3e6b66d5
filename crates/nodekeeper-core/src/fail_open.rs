//! Transient-failure absorption
//!
//! Peer counts, sync progress and log reads are retried on the next tick
//! anyway, so their errors stop here: the error is logged and the value
//! becomes `None`, which the dashboard draws as a placeholder.
//!
//! Lock ownership checks and child process bookkeeping must propagate
//! their errors instead.

use std::future::Future;
use tracing::warn;

use crate::Result;

fn absorb<T>(operation: &str, outcome: Result<T>) -> Option<T> {
    outcome
        .map_err(|error| warn!(operation, %error, "Unavailable until next attempt"))
        .ok()
}

/// Await `f`, turning an error into a logged `None`
///
/// ```no_run
/// use nodekeeper_core::fail_open::fail_open;
/// use nodekeeper_core::Result;
///
/// async fn net_peer_count() -> Result<u32> {
///     Ok(12)
/// }
///
/// async fn poll() -> Option<u32> {
///     fail_open("execution_peers", || net_peer_count()).await
/// }
/// ```
pub async fn fail_open<F, Fut, T>(operation: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    absorb(operation, f().await)
}

/// Blocking counterpart of [`fail_open`] for file reads and writes
pub fn fail_open_sync<T>(operation: &str, f: impl FnOnce() -> Result<T>) -> Option<T> {
    absorb(operation, f())
}
