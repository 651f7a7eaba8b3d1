//! Reconciliation behavior of the session actor.
//!
//! Drives a real `SessionActor` with mock collaborators and checks viewer
//! states through published snapshots:
//! - registry key set tracks joins and leaves
//! - dial outcomes that arrive late are discarded
//! - no `Connecting`/`Active` viewer without a media source
//! - stopping the stream resets but keeps viewers
//! - at most one outstanding dial per viewer

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeSet;
use std::time::Duration;

use bc_test_utils::mock_transport::unreachable;
use bc_test_utils::{
    init_test_tracing, viewer, viewers, DialOutcome, MockPeerTransport, MockSignalingSink,
    TestSession, TEST_BROADCASTER_ID,
};
use broadcast_controller::capture::{MediaHandle, StopReason};
use broadcast_controller::registry::{ConnectionState, ViewerId};
use broadcast_controller::signaling::{ConnectivityState, SignalingCommand};

/// Give spawned dial tasks time to post their (discarded) outcomes.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

fn state(snapshot: &broadcast_controller::actors::SessionSnapshot, id: &str) -> Option<ConnectionState> {
    snapshot.state_of(&viewer(id))
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_join_then_start_then_stop_then_leave() {
    init_test_tracing();
    let session = TestSession::builder()
        .transport(MockPeerTransport::builder().hold_viewer("v1").build())
        .spawn();

    session.handle.viewer_joined(viewer("v1")).await.unwrap();
    let snapshot = session.snapshot().await;
    assert_eq!(state(&snapshot, "v1"), Some(ConnectionState::NotConnected));

    session.handle.start_capture().await.unwrap();
    session
        .wait_for(|s| state(s, "v1") == Some(ConnectionState::Connecting))
        .await;

    session.transport.wait_for_held("v1", 1).await;
    assert!(session.transport.release("v1", Ok(())));
    session
        .wait_for(|s| state(s, "v1") == Some(ConnectionState::Active))
        .await;

    session.handle.stop_capture().await.unwrap();
    let snapshot = session.snapshot().await;
    assert!(!snapshot.is_live());
    assert_eq!(state(&snapshot, "v1"), Some(ConnectionState::NotConnected));

    session.handle.viewer_left(viewer("v1")).await.unwrap();
    let snapshot = session.snapshot().await;
    assert!(snapshot.viewers.is_empty());
}

#[tokio::test]
async fn test_join_while_live_dials_immediately() {
    let session = TestSession::spawn();

    session.handle.start_capture().await.unwrap();
    assert!(session.snapshot().await.viewers.is_empty());

    session.handle.viewer_joined(viewer("v2")).await.unwrap();

    session
        .wait_for(|s| state(s, "v2") == Some(ConnectionState::Active))
        .await;
    assert_eq!(session.transport.calls_for("v2"), 1);
}

#[tokio::test]
async fn test_join_while_live_records_failure() {
    let session = TestSession::builder()
        .transport(MockPeerTransport::builder().fail_viewer("v2").build())
        .spawn();

    session.handle.start_capture().await.unwrap();
    session.handle.viewer_joined(viewer("v2")).await.unwrap();

    session
        .wait_for(|s| state(s, "v2") == Some(ConnectionState::Failed))
        .await;
}

#[tokio::test]
async fn test_failed_viewer_retried_on_next_stream_start() {
    let session = TestSession::builder()
        .transport(
            MockPeerTransport::builder()
                .script(
                    "v3",
                    vec![DialOutcome::Fail(unreachable("v3")), DialOutcome::Succeed],
                )
                .build(),
        )
        .spawn();

    session.handle.viewer_joined(viewer("v3")).await.unwrap();
    session.handle.start_capture().await.unwrap();
    session
        .wait_for(|s| state(s, "v3") == Some(ConnectionState::Failed))
        .await;

    session.handle.stop_capture().await.unwrap();
    session.handle.start_capture().await.unwrap();

    session
        .wait_for(|s| state(s, "v3") == Some(ConnectionState::Active))
        .await;
    assert_eq!(session.transport.calls_for("v3"), 2);
}

#[tokio::test]
async fn test_restart_with_live_handle_retries_failed_only() {
    let session = TestSession::builder()
        .transport(
            MockPeerTransport::builder()
                .script(
                    "v3",
                    vec![DialOutcome::Fail(unreachable("v3")), DialOutcome::Succeed],
                )
                .build(),
        )
        .spawn();
    let media = MediaHandle::new("display");

    session.handle.viewer_joined(viewer("v1")).await.unwrap();
    session.handle.viewer_joined(viewer("v3")).await.unwrap();
    session.handle.stream_started(media.clone()).await.unwrap();
    session
        .wait_for(|s| {
            state(s, "v1") == Some(ConnectionState::Active)
                && state(s, "v3") == Some(ConnectionState::Failed)
        })
        .await;

    session.handle.stream_started(media).await.unwrap();

    session
        .wait_for(|s| state(s, "v3") == Some(ConnectionState::Active))
        .await;
    assert_eq!(session.transport.calls_for("v1"), 1);
    assert_eq!(session.transport.calls_for("v3"), 2);
    assert!(session.capture.released().is_empty());
}

#[tokio::test]
async fn test_rejoin_of_failed_viewer_redials_while_live() {
    let session = TestSession::builder()
        .transport(MockPeerTransport::builder().fail_viewer("v3").build())
        .spawn();

    session.handle.start_capture().await.unwrap();
    session.handle.viewer_joined(viewer("v3")).await.unwrap();
    session
        .wait_for(|s| state(s, "v3") == Some(ConnectionState::Failed))
        .await;

    session.handle.viewer_joined(viewer("v3")).await.unwrap();

    session
        .wait_for(|s| state(s, "v3") == Some(ConnectionState::Active))
        .await;
}

#[tokio::test]
async fn test_one_failing_viewer_does_not_affect_others() {
    let session = TestSession::builder()
        .transport(
            MockPeerTransport::builder()
                .script("bad", vec![DialOutcome::Fail(unreachable("bad"))])
                .build(),
        )
        .spawn();

    for id in ["a", "bad", "c"] {
        session.handle.viewer_joined(viewer(id)).await.unwrap();
    }
    session.handle.start_capture().await.unwrap();

    let snapshot = session
        .wait_for(|s| {
            state(s, "a") == Some(ConnectionState::Active)
                && state(s, "c") == Some(ConnectionState::Active)
                && state(s, "bad") == Some(ConnectionState::Failed)
        })
        .await;
    assert_eq!(snapshot.active_viewers(), vec![viewer("a"), viewer("c")]);
}

// ============================================================================
// Late and stale outcomes
// ============================================================================

#[tokio::test]
async fn test_outcome_after_leave_does_not_reinsert_viewer() {
    let session = TestSession::builder()
        .transport(MockPeerTransport::holding())
        .spawn();

    session.handle.start_capture().await.unwrap();
    session.handle.viewer_joined(viewer("v1")).await.unwrap();
    session.transport.wait_for_held("v1", 1).await;

    session.handle.viewer_left(viewer("v1")).await.unwrap();
    assert!(session.transport.release("v1", Ok(())));
    settle().await;

    let snapshot = session.snapshot().await;
    assert_eq!(state(&snapshot, "v1"), None);
    assert!(snapshot.viewers.is_empty());
}

#[tokio::test]
async fn test_outcome_after_stop_does_not_activate_viewer() {
    let session = TestSession::builder()
        .transport(MockPeerTransport::holding())
        .spawn();

    session.handle.viewer_joined(viewer("v1")).await.unwrap();
    session.handle.start_capture().await.unwrap();
    session.transport.wait_for_held("v1", 1).await;

    session.handle.stop_capture().await.unwrap();
    assert!(session.transport.release("v1", Ok(())));
    settle().await;

    let snapshot = session.snapshot().await;
    assert_eq!(state(&snapshot, "v1"), Some(ConnectionState::NotConnected));
    assert!(snapshot.active_viewers().is_empty());
}

#[tokio::test]
async fn test_outcome_of_superseded_attempt_is_ignored_after_rejoin() {
    let session = TestSession::builder()
        .transport(MockPeerTransport::holding())
        .spawn();

    session.handle.start_capture().await.unwrap();
    session.handle.viewer_joined(viewer("v1")).await.unwrap();
    session.transport.wait_for_held("v1", 1).await;

    // Leave and rejoin while the first dial is still outstanding
    session.handle.viewer_left(viewer("v1")).await.unwrap();
    session.handle.viewer_joined(viewer("v1")).await.unwrap();
    session.transport.wait_for_held("v1", 2).await;

    // The first attempt fails late; the second is still in charge
    assert!(session
        .transport
        .release("v1", Err(unreachable("v1"))));
    settle().await;
    assert_eq!(
        state(&session.snapshot().await, "v1"),
        Some(ConnectionState::Connecting)
    );

    assert!(session.transport.release("v1", Ok(())));
    session
        .wait_for(|s| state(s, "v1") == Some(ConnectionState::Active))
        .await;
}

// ============================================================================
// Invariants
// ============================================================================

#[tokio::test]
async fn test_no_dials_without_media() {
    let session = TestSession::spawn();

    for id in viewers("idle", 5) {
        session.handle.viewer_joined(id).await.unwrap();
    }
    session
        .handle
        .connectivity_changed(ConnectivityState::Connected)
        .await
        .unwrap();
    session.handle.viewer_left(viewer("idle-2")).await.unwrap();
    session.handle.viewer_joined(viewer("idle-0")).await.unwrap();

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.viewers.len(), 4);
    assert!(snapshot
        .viewers
        .values()
        .all(|s| *s == ConnectionState::NotConnected));
    assert_eq!(session.transport.call_count(), 0);
}

#[tokio::test]
async fn test_stream_stop_resets_every_viewer_without_removing() {
    let session = TestSession::builder()
        .transport(
            MockPeerTransport::builder()
                .fail_viewer("v-fail")
                .hold_viewer("v-hold")
                .build(),
        )
        .spawn();

    for id in ["v-ok", "v-fail", "v-hold"] {
        session.handle.viewer_joined(viewer(id)).await.unwrap();
    }
    session.handle.start_capture().await.unwrap();
    session
        .wait_for(|s| {
            state(s, "v-ok") == Some(ConnectionState::Active)
                && state(s, "v-fail") == Some(ConnectionState::Failed)
                && state(s, "v-hold") == Some(ConnectionState::Connecting)
        })
        .await;

    session
        .handle
        .stream_stopped(StopReason::UserRequested)
        .await
        .unwrap();

    let snapshot = session.snapshot().await;
    assert!(!snapshot.is_live());
    assert_eq!(snapshot.viewers.len(), 3);
    assert!(snapshot
        .viewers
        .values()
        .all(|s| *s == ConnectionState::NotConnected));
}

#[tokio::test]
async fn test_overlapping_start_and_join_dial_once() {
    let session = TestSession::builder()
        .transport(MockPeerTransport::holding())
        .spawn();
    let media = MediaHandle::new("display");

    session.handle.viewer_joined(viewer("v1")).await.unwrap();
    session.handle.stream_started(media.clone()).await.unwrap();
    session.handle.viewer_joined(viewer("v1")).await.unwrap();
    session.handle.stream_started(media).await.unwrap();
    session.handle.viewer_joined(viewer("v1")).await.unwrap();

    session.transport.wait_for_held("v1", 1).await;
    settle().await;
    assert_eq!(session.transport.calls_for("v1"), 1);
    assert_eq!(session.transport.max_in_flight("v1"), 1);

    assert!(session.transport.release("v1", Ok(())));
    session
        .wait_for(|s| state(s, "v1") == Some(ConnectionState::Active))
        .await;

    // Active viewers are not redialed either
    session.handle.viewer_joined(viewer("v1")).await.unwrap();
    settle().await;
    assert_eq!(session.transport.calls_for("v1"), 1);
}

/// Small deterministic generator for interleavings.
struct XorShift(u64);

impl XorShift {
    fn next(&mut self, bound: u64) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0 % bound
    }
}

#[tokio::test]
async fn test_registry_keys_track_joins_and_leaves_under_interleaving() {
    let session = TestSession::spawn();
    let pool = viewers("p", 6);
    let media = MediaHandle::new("display");
    let mut rng = XorShift(0x9E37_79B9_7F4A_7C15);
    let mut joined: BTreeSet<ViewerId> = BTreeSet::new();
    let mut live = false;

    for step in 0..300 {
        let id = pool
            .get(usize::try_from(rng.next(6)).unwrap())
            .unwrap()
            .clone();
        match rng.next(10) {
            0..=3 => {
                session.handle.viewer_joined(id.clone()).await.unwrap();
                joined.insert(id);
            }
            4..=7 => {
                session.handle.viewer_left(id.clone()).await.unwrap();
                joined.remove(&id);
            }
            8 => {
                session.handle.stream_started(media.clone()).await.unwrap();
                live = true;
            }
            _ => {
                session
                    .handle
                    .stream_stopped(StopReason::UserRequested)
                    .await
                    .unwrap();
                live = false;
            }
        }

        if step % 10 == 0 {
            let snapshot = session.snapshot().await;
            let keys: BTreeSet<ViewerId> = snapshot.viewers.keys().cloned().collect();
            assert_eq!(keys, joined, "key set diverged at step {step}");
            if !live {
                assert!(snapshot
                    .viewers
                    .values()
                    .all(|s| *s == ConnectionState::NotConnected));
            }
        }
    }

    settle().await;
    let snapshot = session.snapshot().await;
    let keys: BTreeSet<ViewerId> = snapshot.viewers.keys().cloned().collect();
    assert_eq!(keys, joined);
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_registration_sent_exactly_once() {
    let session = TestSession::spawn();

    session.handle.viewer_joined(viewer("v1")).await.unwrap();
    session
        .handle
        .connectivity_changed(ConnectivityState::Disconnected)
        .await
        .unwrap();
    session
        .handle
        .connectivity_changed(ConnectivityState::Connected)
        .await
        .unwrap();
    session.handle.start_capture().await.unwrap();
    session.snapshot().await;

    assert_eq!(session.signaling.registrations_for(TEST_BROADCASTER_ID), 1);
    assert_eq!(
        session.signaling.sent(),
        vec![SignalingCommand::Register {
            broadcaster_id: TEST_BROADCASTER_ID.to_string()
        }]
    );
}

#[tokio::test]
async fn test_registration_failure_is_not_fatal() {
    let session = TestSession::builder()
        .signaling(MockSignalingSink::disconnected())
        .spawn();

    session.handle.viewer_joined(viewer("v1")).await.unwrap();
    session.handle.start_capture().await.unwrap();

    session
        .wait_for(|s| state(s, "v1") == Some(ConnectionState::Active))
        .await;
    assert!(session.signaling.sent().is_empty());
}
