//! Mock peer transport for session testing.
//!
//! Each dial resolves according to a per-viewer script, falling back to a
//! default outcome. Held dials stay outstanding until the test releases them,
//! which is how tests put a viewer in `Connecting` and then interleave leaves,
//! rejoins and stream stops before the outcome arrives.
//!
//! # Example
//!
//! ```rust,ignore
//! use bc_test_utils::{DialOutcome, MockPeerTransport};
//!
//! let transport = MockPeerTransport::builder()
//!     .fail_viewer("v3")
//!     .script("v4", vec![DialOutcome::Fail(unreachable("v4")), DialOutcome::Succeed])
//!     .hold_viewer("v5")
//!     .build();
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use broadcast_controller::capture::MediaHandle;
use broadcast_controller::registry::ViewerId;
use broadcast_controller::transport::{DialError, PeerTransport};
use tokio::sync::{oneshot, Notify};

/// How a single dial resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialOutcome {
    /// Resolve successfully right away.
    Succeed,
    /// Resolve with this error right away.
    Fail(DialError),
    /// Stay outstanding until [`MockPeerTransport::release`] is called.
    Hold,
}

/// Error returned to a held dial whose mock was dropped.
pub fn abandoned() -> DialError {
    DialError::Transport("held dial abandoned".to_string())
}

/// Convenience `Unreachable` error for scripts.
pub fn unreachable(viewer_id: &str) -> DialError {
    DialError::Unreachable(format!("peer {viewer_id} not found"))
}

/// A dial the mock received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialCall {
    /// Viewer dialed.
    pub viewer_id: ViewerId,
    /// Media handle ID passed.
    pub media_id: u64,
}

#[derive(Default)]
struct Inner {
    scripts: HashMap<ViewerId, VecDeque<DialOutcome>>,
    calls: Vec<DialCall>,
    held: Vec<(ViewerId, oneshot::Sender<Result<(), DialError>>)>,
    in_flight: HashMap<ViewerId, usize>,
    max_in_flight: HashMap<ViewerId, usize>,
}

/// Mock peer transport.
pub struct MockPeerTransport {
    default_outcome: DialOutcome,
    inner: Mutex<Inner>,
    changed: Notify,
}

impl Default for MockPeerTransport {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl MockPeerTransport {
    /// Create a new builder. Dials succeed unless configured otherwise.
    #[must_use]
    pub fn builder() -> MockPeerTransportBuilder {
        MockPeerTransportBuilder::default()
    }

    /// Create a mock where every dial succeeds.
    #[must_use]
    pub fn succeeding() -> Self {
        Self::builder().build()
    }

    /// Create a mock where every dial is held.
    #[must_use]
    pub fn holding() -> Self {
        Self::builder().default_outcome(DialOutcome::Hold).build()
    }

    /// Append outcomes to a viewer's script (usable after the session started).
    pub fn script(&self, viewer_id: impl Into<ViewerId>, outcomes: Vec<DialOutcome>) {
        self.inner
            .lock()
            .unwrap()
            .scripts
            .entry(viewer_id.into())
            .or_default()
            .extend(outcomes);
    }

    /// Total number of dials received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.inner.lock().unwrap().calls.len()
    }

    /// Number of dials received for one viewer.
    #[must_use]
    pub fn calls_for(&self, viewer_id: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.viewer_id.as_str() == viewer_id)
            .count()
    }

    /// Every dial received, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<DialCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Highest number of simultaneously outstanding dials seen for a viewer.
    #[must_use]
    pub fn max_in_flight(&self, viewer_id: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .max_in_flight
            .get(&ViewerId::from(viewer_id))
            .copied()
            .unwrap_or(0)
    }

    /// Number of held dials waiting for a viewer.
    #[must_use]
    pub fn held_for(&self, viewer_id: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .held
            .iter()
            .filter(|(v, _)| v.as_str() == viewer_id)
            .count()
    }

    /// Resolve the oldest held dial for a viewer.
    ///
    /// Returns `false` if no dial was held for that viewer.
    pub fn release(&self, viewer_id: &str, result: Result<(), DialError>) -> bool {
        let sender = {
            let mut inner = self.inner.lock().unwrap();
            let position = inner.held.iter().position(|(v, _)| v.as_str() == viewer_id);
            position.map(|i| inner.held.remove(i).1)
        };

        match sender {
            Some(tx) => {
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    /// Wait until `count` dials are held for a viewer.
    ///
    /// # Panics
    ///
    /// Panics if the dials are not held within [`crate::DEFAULT_WAIT`].
    pub async fn wait_for_held(&self, viewer_id: &str, count: usize) {
        if !self
            .wait_until(crate::DEFAULT_WAIT, || self.held_for(viewer_id) >= count)
            .await
        {
            panic!(
                "expected {count} held dial(s) for {viewer_id}, saw {}",
                self.held_for(viewer_id)
            );
        }
    }

    /// Wait until at least `count` dials were received for a viewer.
    ///
    /// # Panics
    ///
    /// Panics if the dials do not arrive within [`crate::DEFAULT_WAIT`].
    pub async fn wait_for_calls(&self, viewer_id: &str, count: usize) {
        if !self
            .wait_until(crate::DEFAULT_WAIT, || self.calls_for(viewer_id) >= count)
            .await
        {
            panic!(
                "expected {count} dial(s) for {viewer_id}, saw {}",
                self.calls_for(viewer_id)
            );
        }
    }

    async fn wait_until(&self, timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let changed = self.changed.notified();
            if condition() {
                return true;
            }
            if tokio::time::timeout_at(deadline, changed).await.is_err() {
                return condition();
            }
        }
    }

    fn next_outcome(&self, viewer_id: &ViewerId) -> DialOutcome {
        self.inner
            .lock()
            .unwrap()
            .scripts
            .get_mut(viewer_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.default_outcome.clone())
    }
}

#[async_trait]
impl PeerTransport for MockPeerTransport {
    async fn dial(&self, viewer_id: &ViewerId, media: &MediaHandle) -> Result<(), DialError> {
        let outcome = self.next_outcome(viewer_id);

        {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(DialCall {
                viewer_id: viewer_id.clone(),
                media_id: media.id(),
            });
            let in_flight = inner.in_flight.entry(viewer_id.clone()).or_insert(0);
            *in_flight += 1;
            let current = *in_flight;
            let max = inner.max_in_flight.entry(viewer_id.clone()).or_insert(0);
            *max = (*max).max(current);
        }

        let result = match outcome {
            DialOutcome::Succeed => Ok(()),
            DialOutcome::Fail(err) => Err(err),
            DialOutcome::Hold => {
                let (tx, rx) = oneshot::channel();
                self.inner.lock().unwrap().held.push((viewer_id.clone(), tx));
                self.changed.notify_waiters();
                rx.await.unwrap_or_else(|_| Err(abandoned()))
            }
        };

        if let Some(in_flight) = self.inner.lock().unwrap().in_flight.get_mut(viewer_id) {
            *in_flight = in_flight.saturating_sub(1);
        }
        self.changed.notify_waiters();

        result
    }
}

/// Builder for `MockPeerTransport`.
#[derive(Debug)]
pub struct MockPeerTransportBuilder {
    default_outcome: DialOutcome,
    scripts: HashMap<ViewerId, VecDeque<DialOutcome>>,
}

impl Default for MockPeerTransportBuilder {
    fn default() -> Self {
        Self {
            default_outcome: DialOutcome::Succeed,
            scripts: HashMap::new(),
        }
    }
}

impl MockPeerTransportBuilder {
    /// Outcome for dials with no scripted outcome left.
    #[must_use]
    pub fn default_outcome(mut self, outcome: DialOutcome) -> Self {
        self.default_outcome = outcome;
        self
    }

    /// Queue outcomes for a viewer's successive dials.
    #[must_use]
    pub fn script(mut self, viewer_id: impl Into<ViewerId>, outcomes: Vec<DialOutcome>) -> Self {
        self.scripts
            .entry(viewer_id.into())
            .or_default()
            .extend(outcomes);
        self
    }

    /// Fail the next dial to a viewer.
    #[must_use]
    pub fn fail_viewer(self, viewer_id: &str) -> Self {
        self.script(viewer_id, vec![DialOutcome::Fail(unreachable(viewer_id))])
    }

    /// Hold the next dial to a viewer.
    #[must_use]
    pub fn hold_viewer(self, viewer_id: &str) -> Self {
        self.script(viewer_id, vec![DialOutcome::Hold])
    }

    /// Build the mock.
    #[must_use]
    pub fn build(self) -> MockPeerTransport {
        MockPeerTransport {
            default_outcome: self.default_outcome,
            inner: Mutex::new(Inner {
                scripts: self.scripts,
                ..Inner::default()
            }),
            changed: Notify::new(),
        }
    }
}
