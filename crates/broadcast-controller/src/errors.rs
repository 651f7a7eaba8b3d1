//! Broadcast Controller error types.
//!
//! None of these errors terminate a session. Per-viewer dial failures never
//! surface here at all: they are recorded as `Failed` in the registry. The
//! variants below are returned to the caller of a session handle operation.

use thiserror::Error;

use crate::capture::CaptureError;
use crate::signaling::SignalingError;

/// Broadcast Controller error type.
#[derive(Debug, Error)]
pub enum BcError {
    /// The capture device could not produce a media source.
    #[error("Capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// A capture acquisition is already pending.
    #[error("Capture already in progress")]
    CaptureInProgress,

    /// A media source is already present.
    #[error("Stream is already live")]
    AlreadyLive,

    /// The capture was abandoned by a stop request before it completed.
    #[error("Capture cancelled")]
    CaptureCancelled,

    /// Outbound signaling message could not be handed to the channel.
    #[error("Signaling error: {0}")]
    Signaling(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The session is shutting down.
    #[error("Session is shutting down")]
    ShuttingDown,

    /// Internal error (mailbox or reply channel failure).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BcError {
    /// Returns a message suitable for a user-facing alert (no internal details).
    pub fn client_message(&self) -> String {
        match self {
            BcError::CaptureUnavailable(_) => "Screen capture is unavailable".to_string(),
            BcError::CaptureInProgress => "Screen capture is already starting".to_string(),
            BcError::AlreadyLive => "Stream is already live".to_string(),
            BcError::CaptureCancelled => "Screen capture was cancelled".to_string(),
            BcError::Signaling(_) => "Disconnected from server".to_string(),
            BcError::ShuttingDown => "Stream session has ended".to_string(),
            BcError::Config(_) | BcError::Internal(_) => "An internal error occurred".to_string(),
        }
    }

    /// Whether the user can reasonably retry the operation that failed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BcError::CaptureUnavailable(_) | BcError::CaptureCancelled | BcError::Signaling(_)
        )
    }
}

impl From<CaptureError> for BcError {
    fn from(err: CaptureError) -> Self {
        BcError::CaptureUnavailable(err.to_string())
    }
}

impl From<SignalingError> for BcError {
    fn from(err: SignalingError) -> Self {
        BcError::Signaling(err.to_string())
    }
}
