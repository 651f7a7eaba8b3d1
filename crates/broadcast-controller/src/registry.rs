//! Viewer registry.
//!
//! Mapping from viewer ID to connection state. The registry is a plain data
//! structure owned by the session actor; it never dials, never talks to the
//! signaling channel, and is never shared. Readers get copies via
//! [`ViewerRegistry::snapshot`].
//!
//! Every dial issued by the actor is tagged with a [`DialAttemptId`]. An
//! outcome is only applied when the viewer is still present and its current
//! attempt matches, so outcomes that arrive after a leave, a rejoin or a stream
//! stop are discarded instead of resurrecting or re-activating the viewer.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Opaque viewer identifier assigned by the signaling server.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewerId(String);

impl ViewerId {
    /// Create a viewer ID from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ViewerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ViewerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Per-viewer connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Known to signaling, no dial outstanding.
    NotConnected,
    /// A dial is outstanding.
    Connecting,
    /// The last dial succeeded and the stream is still live.
    Active,
    /// The last dial failed. Retried on the next stream start or rejoin.
    Failed,
}

impl ConnectionState {
    /// Returns the state as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::NotConnected => "not_connected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Active => "active",
            ConnectionState::Failed => "failed",
        }
    }

    /// Whether a stream start should dial a viewer in this state.
    #[must_use]
    pub const fn is_dialable(&self) -> bool {
        matches!(self, ConnectionState::NotConnected | ConnectionState::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a single dial issued by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DialAttemptId(pub u64);

impl fmt::Display for DialAttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registry entry for one viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerEntry {
    /// Viewer ID.
    pub viewer_id: ViewerId,
    /// Current connection state.
    pub state: ConnectionState,
    /// Attempt whose outcome is still awaited, if any.
    pub attempt: Option<DialAttemptId>,
}

impl ViewerEntry {
    fn new(viewer_id: ViewerId) -> Self {
        Self {
            viewer_id,
            state: ConnectionState::NotConnected,
            attempt: None,
        }
    }
}

/// What happened to a dial outcome handed to [`ViewerRegistry::complete_dial`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialResolution {
    /// The outcome was applied; carries the new state.
    Applied(ConnectionState),
    /// The viewer has left; the outcome was discarded.
    UnknownViewer,
    /// The viewer no longer awaits this attempt (stream stopped, or rejoined
    /// and redialed); the outcome was discarded.
    Superseded,
}

/// Immutable copy of the registry, ordered by viewer ID.
pub type ViewerStates = BTreeMap<ViewerId, ConnectionState>;

/// Viewer registry.
#[derive(Debug, Default)]
pub struct ViewerRegistry {
    viewers: HashMap<ViewerId, ViewerEntry>,
}

impl ViewerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a `NotConnected` entry if the viewer is absent.
    ///
    /// Returns `true` if a new entry was inserted. An existing entry keeps its
    /// state.
    pub fn upsert(&mut self, viewer_id: &ViewerId) -> bool {
        if self.viewers.contains_key(viewer_id) {
            return false;
        }
        self.viewers
            .insert(viewer_id.clone(), ViewerEntry::new(viewer_id.clone()));
        true
    }

    /// Remove a viewer. Returns `true` if it was present.
    pub fn remove(&mut self, viewer_id: &ViewerId) -> bool {
        self.viewers.remove(viewer_id).is_some()
    }

    /// Set a viewer's state directly.
    ///
    /// Logs and returns `false` if the viewer is absent; never inserts.
    /// Any awaited attempt is forgotten unless the new state is `Connecting`.
    pub fn set_state(&mut self, viewer_id: &ViewerId, state: ConnectionState) -> bool {
        let Some(entry) = self.viewers.get_mut(viewer_id) else {
            warn!(
                target: "bc.registry",
                viewer_id = %viewer_id,
                state = state.as_str(),
                "State update for unknown viewer ignored"
            );
            return false;
        };

        entry.state = state;
        if state != ConnectionState::Connecting {
            entry.attempt = None;
        }
        true
    }

    /// Mark a viewer as `Connecting` under the given attempt.
    ///
    /// Only succeeds for a present viewer in a dialable state, which keeps at
    /// most one dial outstanding per viewer.
    pub fn begin_dial(&mut self, viewer_id: &ViewerId, attempt: DialAttemptId) -> bool {
        match self.viewers.get_mut(viewer_id) {
            Some(entry) if entry.state.is_dialable() => {
                entry.state = ConnectionState::Connecting;
                entry.attempt = Some(attempt);
                true
            }
            Some(entry) => {
                debug!(
                    target: "bc.registry",
                    viewer_id = %viewer_id,
                    state = entry.state.as_str(),
                    "Dial skipped, viewer not dialable"
                );
                false
            }
            None => false,
        }
    }

    /// Apply the outcome of a dial.
    pub fn complete_dial(
        &mut self,
        viewer_id: &ViewerId,
        attempt: DialAttemptId,
        succeeded: bool,
    ) -> DialResolution {
        let Some(entry) = self.viewers.get_mut(viewer_id) else {
            return DialResolution::UnknownViewer;
        };

        if entry.attempt != Some(attempt) || entry.state != ConnectionState::Connecting {
            return DialResolution::Superseded;
        }

        entry.attempt = None;
        entry.state = if succeeded {
            ConnectionState::Active
        } else {
            ConnectionState::Failed
        };
        DialResolution::Applied(entry.state)
    }

    /// Viewers a stream start should dial (`NotConnected` or `Failed`),
    /// in viewer ID order.
    #[must_use]
    pub fn dial_candidates(&self) -> Vec<ViewerId> {
        let mut candidates: Vec<ViewerId> = self
            .viewers
            .values()
            .filter(|entry| entry.state.is_dialable())
            .map(|entry| entry.viewer_id.clone())
            .collect();
        candidates.sort();
        candidates
    }

    /// Reset every entry to `NotConnected` and forget awaited attempts.
    ///
    /// Applied as one step while the actor holds exclusive ownership. Returns
    /// the number of entries whose state changed.
    pub fn reset_all(&mut self) -> usize {
        let mut changed = 0;
        for entry in self.viewers.values_mut() {
            if entry.state != ConnectionState::NotConnected {
                changed += 1;
            }
            entry.state = ConnectionState::NotConnected;
            entry.attempt = None;
        }
        changed
    }

    /// Copy of the current viewer states.
    #[must_use]
    pub fn snapshot(&self) -> ViewerStates {
        self.viewers
            .iter()
            .map(|(id, entry)| (id.clone(), entry.state))
            .collect()
    }

    /// Look up a viewer's entry.
    #[must_use]
    pub fn get(&self, viewer_id: &ViewerId) -> Option<&ViewerEntry> {
        self.viewers.get(viewer_id)
    }

    /// Whether the viewer is present.
    #[must_use]
    pub fn contains(&self, viewer_id: &ViewerId) -> bool {
        self.viewers.contains_key(viewer_id)
    }

    /// Number of viewers in the given state.
    #[must_use]
    pub fn count_in(&self, state: ConnectionState) -> usize {
        self.viewers.values().filter(|e| e.state == state).count()
    }

    /// Number of viewers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.viewers.len()
    }

    /// Whether there are no viewers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn viewer(id: &str) -> ViewerId {
        ViewerId::from(id)
    }

    #[test]
    fn test_upsert_is_idempotent_and_never_resets() {
        let mut registry = ViewerRegistry::new();

        assert!(registry.upsert(&viewer("v1")));
        assert!(registry.begin_dial(&viewer("v1"), DialAttemptId(1)));

        assert!(!registry.upsert(&viewer("v1")));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get(&viewer("v1")).unwrap().state,
            ConnectionState::Connecting
        );
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = ViewerRegistry::new();
        registry.upsert(&viewer("v1"));

        assert!(registry.remove(&viewer("v1")));
        assert!(!registry.remove(&viewer("v1")));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_set_state_does_not_resurrect() {
        let mut registry = ViewerRegistry::new();

        assert!(!registry.set_state(&viewer("ghost"), ConnectionState::Active));
        assert!(!registry.contains(&viewer("ghost")));
    }

    #[test]
    fn test_set_state_clears_attempt() {
        let mut registry = ViewerRegistry::new();
        registry.upsert(&viewer("v1"));
        registry.begin_dial(&viewer("v1"), DialAttemptId(7));

        assert!(registry.set_state(&viewer("v1"), ConnectionState::Failed));
        assert_eq!(registry.get(&viewer("v1")).unwrap().attempt, None);
    }

    #[test]
    fn test_begin_dial_only_from_dialable_states() {
        let mut registry = ViewerRegistry::new();
        registry.upsert(&viewer("v1"));

        assert!(registry.begin_dial(&viewer("v1"), DialAttemptId(1)));
        // Already connecting: no second dial
        assert!(!registry.begin_dial(&viewer("v1"), DialAttemptId(2)));

        registry.complete_dial(&viewer("v1"), DialAttemptId(1), true);
        // Active: no redial
        assert!(!registry.begin_dial(&viewer("v1"), DialAttemptId(3)));

        // Unknown viewer
        assert!(!registry.begin_dial(&viewer("nobody"), DialAttemptId(4)));
    }

    #[test]
    fn test_complete_dial_outcomes() {
        let mut registry = ViewerRegistry::new();
        registry.upsert(&viewer("ok"));
        registry.upsert(&viewer("bad"));
        registry.begin_dial(&viewer("ok"), DialAttemptId(1));
        registry.begin_dial(&viewer("bad"), DialAttemptId(2));

        assert_eq!(
            registry.complete_dial(&viewer("ok"), DialAttemptId(1), true),
            DialResolution::Applied(ConnectionState::Active)
        );
        assert_eq!(
            registry.complete_dial(&viewer("bad"), DialAttemptId(2), false),
            DialResolution::Applied(ConnectionState::Failed)
        );
    }

    #[test]
    fn test_complete_dial_after_remove_is_discarded() {
        let mut registry = ViewerRegistry::new();
        registry.upsert(&viewer("v1"));
        registry.begin_dial(&viewer("v1"), DialAttemptId(1));
        registry.remove(&viewer("v1"));

        assert_eq!(
            registry.complete_dial(&viewer("v1"), DialAttemptId(1), true),
            DialResolution::UnknownViewer
        );
        assert!(!registry.contains(&viewer("v1")));
    }

    #[test]
    fn test_complete_dial_after_rejoin_is_superseded() {
        let mut registry = ViewerRegistry::new();
        registry.upsert(&viewer("v1"));
        registry.begin_dial(&viewer("v1"), DialAttemptId(1));
        registry.remove(&viewer("v1"));
        registry.upsert(&viewer("v1"));
        registry.begin_dial(&viewer("v1"), DialAttemptId(2));

        assert_eq!(
            registry.complete_dial(&viewer("v1"), DialAttemptId(1), false),
            DialResolution::Superseded
        );
        assert_eq!(
            registry.get(&viewer("v1")).unwrap().state,
            ConnectionState::Connecting
        );
    }

    #[test]
    fn test_complete_dial_after_reset_is_superseded() {
        let mut registry = ViewerRegistry::new();
        registry.upsert(&viewer("v1"));
        registry.begin_dial(&viewer("v1"), DialAttemptId(1));
        registry.reset_all();

        assert_eq!(
            registry.complete_dial(&viewer("v1"), DialAttemptId(1), true),
            DialResolution::Superseded
        );
        assert_eq!(
            registry.get(&viewer("v1")).unwrap().state,
            ConnectionState::NotConnected
        );
    }

    #[test]
    fn test_reset_all_keeps_viewers() {
        let mut registry = ViewerRegistry::new();
        for id in ["a", "b", "c", "d"] {
            registry.upsert(&viewer(id));
        }
        registry.begin_dial(&viewer("a"), DialAttemptId(1));
        registry.begin_dial(&viewer("b"), DialAttemptId(2));
        registry.begin_dial(&viewer("c"), DialAttemptId(3));
        registry.complete_dial(&viewer("b"), DialAttemptId(2), true);
        registry.complete_dial(&viewer("c"), DialAttemptId(3), false);

        assert_eq!(registry.reset_all(), 3);
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.count_in(ConnectionState::NotConnected), 4);
    }

    #[test]
    fn test_dial_candidates() {
        let mut registry = ViewerRegistry::new();
        for id in ["c", "a", "b", "d"] {
            registry.upsert(&viewer(id));
        }
        registry.begin_dial(&viewer("a"), DialAttemptId(1));
        registry.begin_dial(&viewer("b"), DialAttemptId(2));
        registry.complete_dial(&viewer("b"), DialAttemptId(2), false);
        registry.begin_dial(&viewer("d"), DialAttemptId(3));
        registry.complete_dial(&viewer("d"), DialAttemptId(3), true);

        // a is connecting, d is active; b failed and c never dialed
        assert_eq!(registry.dial_candidates(), vec![viewer("b"), viewer("c")]);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut registry = ViewerRegistry::new();
        registry.upsert(&viewer("v1"));

        let snapshot = registry.snapshot();
        registry.remove(&viewer("v1"));

        assert_eq!(
            snapshot.get(&viewer("v1")),
            Some(&ConnectionState::NotConnected)
        );
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_viewer_id_serde_is_transparent() {
        let id = viewer("peer-42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"peer-42\"");
        assert_eq!(
            serde_json::to_string(&ConnectionState::NotConnected).unwrap(),
            "\"not_connected\""
        );
    }
}
