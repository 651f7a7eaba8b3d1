//! Pre-configured test data and a spawned test session.

use std::collections::HashMap;
use std::sync::Arc;

use broadcast_controller::actors::{
    SessionActor, SessionActorHandle, SessionCollaborators, SessionSnapshot,
};
use broadcast_controller::config::Config;
use broadcast_controller::registry::ViewerId;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::mock_capture::MockCaptureDevice;
use crate::mock_signaling::MockSignalingSink;
use crate::mock_transport::MockPeerTransport;
use crate::snapshots::{wait_for_snapshot, DEFAULT_WAIT};

/// Broadcaster ID used by [`test_config`].
pub const TEST_BROADCASTER_ID: &str = "caster-test";

/// Shorthand for a viewer ID.
#[must_use]
pub fn viewer(id: &str) -> ViewerId {
    ViewerId::from(id)
}

/// Viewer IDs `prefix-0` .. `prefix-{count-1}`.
#[must_use]
pub fn viewers(prefix: &str, count: usize) -> Vec<ViewerId> {
    (0..count)
        .map(|i| ViewerId::new(format!("{prefix}-{i}")))
        .collect()
}

/// Configuration with a fixed broadcaster ID and defaults otherwise.
#[must_use]
pub fn test_config() -> Config {
    test_config_with(&[])
}

/// Configuration with a fixed broadcaster ID plus the given variables.
#[must_use]
pub fn test_config_with(vars: &[(&str, &str)]) -> Config {
    let mut map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    map.entry("BC_BROADCASTER_ID".to_string())
        .or_insert_with(|| TEST_BROADCASTER_ID.to_string());
    Config::from_vars(&map).expect("test configuration should be valid")
}

/// A running session with its mock collaborators.
pub struct TestSession {
    /// Session handle.
    pub handle: SessionActorHandle,
    /// Actor task.
    pub task: JoinHandle<()>,
    /// Peer transport mock.
    pub transport: Arc<MockPeerTransport>,
    /// Capture device mock.
    pub capture: Arc<MockCaptureDevice>,
    /// Signaling sink mock.
    pub signaling: Arc<MockSignalingSink>,
}

impl TestSession {
    /// Create a new builder.
    #[must_use]
    pub fn builder() -> TestSessionBuilder {
        TestSessionBuilder::default()
    }

    /// Spawn a session where every dial and capture succeeds.
    #[must_use]
    pub fn spawn() -> Self {
        Self::builder().spawn()
    }

    /// Wait until a published snapshot satisfies `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> SessionSnapshot {
        let mut rx = self.handle.subscribe();
        wait_for_snapshot(&mut rx, predicate, DEFAULT_WAIT).await
    }

    /// Snapshot after every previously sent message was processed.
    pub async fn snapshot(&self) -> SessionSnapshot {
        self.handle
            .get_snapshot()
            .await
            .expect("session should answer snapshot requests")
    }
}

/// Builder for `TestSession`.
#[derive(Default)]
pub struct TestSessionBuilder {
    transport: Option<MockPeerTransport>,
    capture: Option<MockCaptureDevice>,
    signaling: Option<MockSignalingSink>,
    config: Option<Config>,
}

impl TestSessionBuilder {
    /// Use this peer transport.
    #[must_use]
    pub fn transport(mut self, transport: MockPeerTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use this capture device.
    #[must_use]
    pub fn capture(mut self, capture: MockCaptureDevice) -> Self {
        self.capture = Some(capture);
        self
    }

    /// Use this signaling sink.
    #[must_use]
    pub fn signaling(mut self, signaling: MockSignalingSink) -> Self {
        self.signaling = Some(signaling);
        self
    }

    /// Use this configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Spawn the session. Must be called inside a Tokio runtime.
    #[must_use]
    pub fn spawn(self) -> TestSession {
        let transport = Arc::new(self.transport.unwrap_or_default());
        let capture = Arc::new(self.capture.unwrap_or_default());
        let signaling = Arc::new(self.signaling.unwrap_or_default());
        let config = self.config.unwrap_or_else(test_config);

        let (handle, task) = SessionActor::spawn(
            &config,
            SessionCollaborators {
                transport: transport.clone(),
                capture: capture.clone(),
                signaling: signaling.clone(),
            },
            CancellationToken::new(),
        );

        TestSession {
            handle,
            task,
            transport,
            capture,
            signaling,
        }
    }
}
