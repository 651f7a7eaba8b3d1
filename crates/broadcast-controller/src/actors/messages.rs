//! Message types for the session actor.
//!
//! Every input to the session (signaling notifications, capture toggles,
//! dial and capture completions, snapshot requests) is one of these messages,
//! delivered through a single `tokio::sync::mpsc` mailbox. Request/reply
//! messages carry a `tokio::sync::oneshot` sender.

use serde::Serialize;
use tokio::sync::oneshot;

use crate::capture::{CaptureError, MediaHandle, StopReason};
use crate::errors::BcError;
use crate::registry::{ConnectionState, DialAttemptId, ViewerId, ViewerStates};
use crate::signaling::ConnectivityState;
use crate::transport::DialError;

/// Messages sent to `SessionActor`.
#[derive(Debug)]
pub enum SessionMessage {
    /// A viewer joined (from signaling).
    ViewerJoined { viewer_id: ViewerId },

    /// A viewer left (from signaling).
    ViewerLeft { viewer_id: ViewerId },

    /// Signaling connectivity changed.
    ConnectivityChanged { state: ConnectivityState },

    /// A media source became available.
    StreamStarted { handle: MediaHandle },

    /// The media source went away.
    StreamStopped { reason: StopReason },

    /// Acquire a media source through the capture device.
    StartCapture {
        /// Response channel, answered once the capture completes or is refused.
        respond_to: oneshot::Sender<Result<(), BcError>>,
    },

    /// Release the media source (or abandon a pending acquisition).
    StopCapture {
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), BcError>>,
    },

    /// A capture acquisition finished (posted by the capture task).
    CaptureCompleted {
        generation: u64,
        result: Result<MediaHandle, CaptureError>,
        respond_to: oneshot::Sender<Result<(), BcError>>,
    },

    /// A dial finished (posted by the dial task).
    DialCompleted {
        viewer_id: ViewerId,
        attempt: DialAttemptId,
        result: Result<(), DialError>,
    },

    /// Get the current session snapshot.
    GetSnapshot {
        /// Response channel for the snapshot.
        respond_to: oneshot::Sender<SessionSnapshot>,
    },
}

impl SessionMessage {
    /// Bounded name of the message kind, for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            SessionMessage::ViewerJoined { .. } => "viewer_joined",
            SessionMessage::ViewerLeft { .. } => "viewer_left",
            SessionMessage::ConnectivityChanged { .. } => "connectivity_changed",
            SessionMessage::StreamStarted { .. } => "stream_started",
            SessionMessage::StreamStopped { .. } => "stream_stopped",
            SessionMessage::StartCapture { .. } => "start_capture",
            SessionMessage::StopCapture { .. } => "stop_capture",
            SessionMessage::CaptureCompleted { .. } => "capture_completed",
            SessionMessage::DialCompleted { .. } => "dial_completed",
            SessionMessage::GetSnapshot { .. } => "get_snapshot",
        }
    }
}

// ----------------------------------------------------------------------------
// Supporting Types
// ----------------------------------------------------------------------------

/// Read-only view of a session, published after every processed message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// This broadcaster's ID.
    pub broadcaster_id: String,
    /// Connection state per viewer.
    pub viewers: ViewerStates,
    /// Whether a media source is present.
    pub media_present: bool,
    /// Whether a capture acquisition is pending.
    pub capture_pending: bool,
    /// Signaling connectivity.
    pub connectivity: ConnectivityState,
}

impl SessionSnapshot {
    /// Whether the stream is live.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.media_present
    }

    /// Whether the signaling channel is connected.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.connectivity == ConnectivityState::Connected
    }

    /// State of one viewer, if present.
    #[must_use]
    pub fn state_of(&self, viewer_id: &ViewerId) -> Option<ConnectionState> {
        self.viewers.get(viewer_id).copied()
    }

    /// Viewers currently receiving the stream.
    #[must_use]
    pub fn active_viewers(&self) -> Vec<ViewerId> {
        self.viewers_in(ConnectionState::Active)
    }

    /// Viewers in the given state.
    #[must_use]
    pub fn viewers_in(&self, state: ConnectionState) -> Vec<ViewerId> {
        self.viewers
            .iter()
            .filter(|(_, s)| **s == state)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_helpers() {
        let mut snapshot = SessionSnapshot {
            broadcaster_id: "caster".to_string(),
            media_present: true,
            connectivity: ConnectivityState::Connected,
            ..Default::default()
        };
        snapshot
            .viewers
            .insert(ViewerId::from("b"), ConnectionState::Active);
        snapshot
            .viewers
            .insert(ViewerId::from("a"), ConnectionState::Active);
        snapshot
            .viewers
            .insert(ViewerId::from("c"), ConnectionState::Failed);

        assert!(snapshot.is_live());
        assert!(snapshot.is_online());
        assert_eq!(
            snapshot.active_viewers(),
            vec![ViewerId::from("a"), ViewerId::from("b")]
        );
        assert_eq!(
            snapshot.state_of(&ViewerId::from("c")),
            Some(ConnectionState::Failed)
        );
        assert_eq!(snapshot.state_of(&ViewerId::from("z")), None);
    }

    #[test]
    fn test_default_snapshot_is_offline_and_inactive() {
        let snapshot = SessionSnapshot::default();

        assert!(!snapshot.is_live());
        assert!(!snapshot.is_online());
        assert!(snapshot.viewers.is_empty());
    }

    #[test]
    fn test_message_kind() {
        let message = SessionMessage::ViewerLeft {
            viewer_id: ViewerId::from("v1"),
        };
        assert_eq!(message.kind(), "viewer_left");
    }
}
