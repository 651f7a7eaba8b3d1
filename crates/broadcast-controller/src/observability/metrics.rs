//! Metric recording functions.
//!
//! All metrics use the `bc_` prefix and `_total` for counters.

use metrics::{counter, gauge};

// ============================================================================
// Viewer Gauges
// ============================================================================

/// Set the number of viewers known to the session.
///
/// Metric: `bc_viewers_joined`
pub fn set_viewers_joined(count: usize) {
    // usize to f64 conversion is safe for realistic viewer counts
    #[allow(clippy::cast_precision_loss)]
    gauge!("bc_viewers_joined").set(count as f64);
}

/// Set the number of viewers in the `Active` state.
///
/// Metric: `bc_viewers_active`
pub fn set_viewers_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("bc_viewers_active").set(count as f64);
}

/// Set the session mailbox depth.
///
/// Metric: `bc_actor_mailbox_depth`
pub fn set_mailbox_depth(depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("bc_actor_mailbox_depth").set(depth as f64);
}

// ============================================================================
// Dial Counters
// ============================================================================

/// Record a dial issued to the peer transport.
///
/// Metric: `bc_dial_attempts_total`
pub fn record_dial_attempt() {
    counter!("bc_dial_attempts_total").increment(1);
}

/// Record an applied dial outcome.
///
/// Metric: `bc_dial_outcomes_total`
/// Labels: `outcome` (success, unreachable, rejected, negotiation, transport)
pub fn record_dial_outcome(outcome: &'static str) {
    counter!("bc_dial_outcomes_total", "outcome" => outcome).increment(1);
}

/// Record a dial outcome that was discarded.
///
/// Metric: `bc_stale_dial_outcomes_total`
/// Labels: `resolution` (unknown_viewer, superseded)
///
/// Non-zero values are expected: viewers leave mid-dial and streams stop.
pub fn record_stale_dial_outcome(resolution: &'static str) {
    counter!("bc_stale_dial_outcomes_total", "resolution" => resolution).increment(1);
}

// ============================================================================
// Stream and Signaling Counters
// ============================================================================

/// Record a stream start or stop.
///
/// Metric: `bc_stream_transitions_total`
/// Labels: `transition` (started, stopped), `reason` (bounded by `StopReason`,
/// `new` or `restart` for starts)
pub fn record_stream_transition(transition: &'static str, reason: &'static str) {
    counter!(
        "bc_stream_transitions_total",
        "transition" => transition,
        "reason" => reason
    )
    .increment(1);
}

/// Record the result of a capture acquisition.
///
/// Metric: `bc_capture_requests_total`
/// Labels: `result` (success, unavailable, cancelled)
pub fn record_capture_result(result: &'static str) {
    counter!("bc_capture_requests_total", "result" => result).increment(1);
}

/// Record a signaling connectivity change.
///
/// Metric: `bc_signaling_connectivity_changes_total`
/// Labels: `state` (connecting, connected, disconnected)
pub fn record_signaling_connectivity(state: &'static str) {
    counter!("bc_signaling_connectivity_changes_total", "state" => state).increment(1);
}
