//! Mock signaling sink.
//!
//! Records every outbound command. Can be configured to refuse sends, which
//! the session must tolerate (registration failure is logged, not fatal).

use std::sync::Mutex;

use broadcast_controller::signaling::{SignalingCommand, SignalingError, SignalingSink};

/// Mock outbound signaling channel.
#[derive(Debug, Default)]
pub struct MockSignalingSink {
    sent: Mutex<Vec<SignalingCommand>>,
    fail_with: Option<SignalingError>,
}

impl MockSignalingSink {
    /// Create a sink that accepts every command.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink that refuses every command with `Disconnected`.
    #[must_use]
    pub fn disconnected() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_with: Some(SignalingError::Disconnected),
        }
    }

    /// Commands accepted so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<SignalingCommand> {
        self.sent.lock().unwrap().clone()
    }

    /// Number of `Register` commands accepted for a broadcaster.
    #[must_use]
    pub fn registrations_for(&self, broadcaster_id: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|c| {
                matches!(c, SignalingCommand::Register { broadcaster_id: id } if id == broadcaster_id)
            })
            .count()
    }
}

impl SignalingSink for MockSignalingSink {
    fn send(&self, command: SignalingCommand) -> Result<(), SignalingError> {
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        self.sent.lock().unwrap().push(command);
        Ok(())
    }
}
