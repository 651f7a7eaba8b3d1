//! Observability for the Broadcast Controller.
//!
//! Metrics are recorded through the `metrics` facade; installing a recorder
//! (and exporting) is the embedding process's job. Without a recorder every
//! call is a no-op.
//!
//! Labels are bounded: viewer IDs and broadcaster IDs never appear as labels.
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `bc_viewers_joined` | Gauge | none | Viewers known to the session |
//! | `bc_viewers_active` | Gauge | none | Viewers receiving the stream |
//! | `bc_actor_mailbox_depth` | Gauge | none | Backpressure indicator |
//! | `bc_dial_attempts_total` | Counter | none | Dials issued |
//! | `bc_dial_outcomes_total` | Counter | `outcome` | Applied dial outcomes |
//! | `bc_stale_dial_outcomes_total` | Counter | `resolution` | Discarded dial outcomes |
//! | `bc_stream_transitions_total` | Counter | `transition`, `reason` | Stream start/stop |
//! | `bc_capture_requests_total` | Counter | `result` | Capture acquisitions |
//! | `bc_signaling_connectivity_changes_total` | Counter | `state` | Connectivity changes |

pub mod metrics;

pub use metrics::{
    record_capture_result, record_dial_attempt, record_dial_outcome,
    record_signaling_connectivity, record_stale_dial_outcome, record_stream_transition,
    set_mailbox_depth, set_viewers_active, set_viewers_joined,
};
