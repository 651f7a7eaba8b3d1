//! Signaling channel boundary.
//!
//! The signaling channel is the rendezvous service that announces viewers
//! joining and leaving. It never carries media. This module defines:
//!
//! - [`SignalingEvent`] - inbound notifications (viewer joined/left, connectivity)
//! - [`SignalingCommand`] - outbound messages (one-time registration)
//! - [`SignalingSink`] - the fire-and-forget outbound half of the channel
//! - [`spawn_signaling_bridge`] - task forwarding inbound events into a session
//!
//! The channel implementation (socket, reconnection policy) lives outside this
//! crate. The serde representation below is JSON, internally tagged by
//! `type`, for adapters that want it.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::actors::SessionActorHandle;
use crate::registry::ViewerId;

/// Connectivity of the signaling channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    /// Connection attempt in progress.
    #[default]
    Connecting,
    /// Connected to the signaling server.
    Connected,
    /// Disconnected. Reconnection is the channel's concern.
    Disconnected,
}

impl ConnectivityState {
    /// Returns the state as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConnectivityState::Connecting => "connecting",
            ConnectivityState::Connected => "connected",
            ConnectivityState::Disconnected => "disconnected",
        }
    }
}

/// Inbound signaling notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SignalingEvent {
    /// A viewer registered to watch this broadcaster.
    ViewerJoined { viewer_id: ViewerId },
    /// A viewer went away.
    ViewerLeft { viewer_id: ViewerId },
    /// The channel's connectivity changed.
    ConnectivityChanged { state: ConnectivityState },
}

impl SignalingEvent {
    /// Decode an event from its JSON wire form.
    pub fn from_json(text: &str) -> Result<Self, SignalingError> {
        serde_json::from_str(text).map_err(|e| SignalingError::Decode(e.to_string()))
    }
}

/// Outbound signaling messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SignalingCommand {
    /// Announce this broadcaster so the server can route viewers to it.
    Register { broadcaster_id: String },
}

impl SignalingCommand {
    /// Encode the command to its JSON wire form.
    pub fn to_json(&self) -> Result<String, SignalingError> {
        serde_json::to_string(self).map_err(|e| SignalingError::Encode(e.to_string()))
    }
}

/// Signaling failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalingError {
    /// The channel is not connected.
    #[error("Signaling channel disconnected")]
    Disconnected,

    /// The channel refused the message.
    #[error("Send failed: {0}")]
    Send(String),

    /// A message could not be encoded.
    #[error("Encode failed: {0}")]
    Encode(String),

    /// An inbound message could not be decoded.
    #[error("Decode failed: {0}")]
    Decode(String),
}

/// Outbound half of the signaling channel.
///
/// `send` hands the message to the channel and returns immediately; no
/// acknowledgment is expected.
pub trait SignalingSink: Send + Sync {
    /// Queue a command for delivery.
    fn send(&self, command: SignalingCommand) -> Result<(), SignalingError>;
}

/// Forward inbound signaling events into a session.
///
/// Runs until the event source closes, the session's mailbox closes, or the
/// session is cancelled. When the event source closes first, the session is
/// told the channel is `Disconnected`.
pub fn spawn_signaling_bridge(
    mut events: mpsc::Receiver<SignalingEvent>,
    handle: SessionActorHandle,
) -> JoinHandle<()> {
    let cancel_token = handle.child_token();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    debug!(target: "bc.signaling", "Signaling bridge cancelled");
                    break;
                }

                event = events.recv() => {
                    let Some(event) = event else {
                        info!(target: "bc.signaling", "Signaling event source closed");
                        let _ = handle
                            .connectivity_changed(ConnectivityState::Disconnected)
                            .await;
                        break;
                    };

                    if let Err(e) = handle.signaling_event(event).await {
                        warn!(
                            target: "bc.signaling",
                            error = %e,
                            "Session mailbox closed, stopping signaling bridge"
                        );
                        break;
                    }
                }
            }
        }
    })
}
