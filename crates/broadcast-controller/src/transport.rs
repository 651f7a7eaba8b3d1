//! Peer transport boundary.
//!
//! The peer transport carries the media stream to one viewer over a direct
//! connection. The session treats it as a black box with a single operation:
//! dial a viewer with a media handle and get one outcome back. There is no
//! cancel primitive; a dial whose viewer has left is allowed to finish and its
//! outcome is discarded by the session.

use async_trait::async_trait;
use thiserror::Error;

use crate::capture::MediaHandle;
use crate::registry::ViewerId;

/// Reasons a dial can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DialError {
    /// The viewer could not be reached (peer unknown to the peer server, ICE failure).
    #[error("Viewer unreachable: {0}")]
    Unreachable(String),

    /// The viewer refused the call.
    #[error("Call rejected: {0}")]
    Rejected(String),

    /// Media negotiation failed.
    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    /// Any other transport-level failure.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl DialError {
    /// Bounded label for metrics.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            DialError::Unreachable(_) => "unreachable",
            DialError::Rejected(_) => "rejected",
            DialError::Negotiation(_) => "negotiation",
            DialError::Transport(_) => "transport",
        }
    }
}

/// Direct peer connection to viewers.
///
/// Implementations must deliver exactly one result per call. The returned
/// future runs on its own task, never on the session's event loop, so it may
/// take as long as the underlying negotiation takes.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Call `viewer_id` with the media behind `media`.
    async fn dial(&self, viewer_id: &ViewerId, media: &MediaHandle) -> Result<(), DialError>;
}
