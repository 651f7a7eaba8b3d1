//! Waiting on published session snapshots.

use std::time::Duration;

use broadcast_controller::actors::SessionSnapshot;
use tokio::sync::watch;

/// Default timeout for waits in tests.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(2);

/// Wait until a published snapshot satisfies `predicate`.
///
/// Checks the current value first, then every update.
///
/// # Panics
///
/// Panics on timeout (printing the last snapshot) or if the session is gone.
pub async fn wait_for_snapshot(
    rx: &mut watch::Receiver<SessionSnapshot>,
    mut predicate: impl FnMut(&SessionSnapshot) -> bool,
    timeout: Duration,
) -> SessionSnapshot {
    let waited = tokio::time::timeout(timeout, rx.wait_for(|s| predicate(s)))
        .await
        .map(|r| r.map(|snapshot| snapshot.clone()));

    match waited {
        Ok(Ok(snapshot)) => snapshot,
        Ok(Err(_)) => panic!("session closed while waiting for snapshot"),
        Err(_) => panic!(
            "timed out after {timeout:?} waiting for snapshot; last: {:?}",
            *rx.borrow()
        ),
    }
}
