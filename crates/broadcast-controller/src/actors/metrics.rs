//! Mailbox monitoring for the session actor.
//!
//! Thresholds scale with the configured mailbox capacity:
//!
//! | Level    | Depth                       |
//! |----------|-----------------------------|
//! | Normal   | <= capacity / 4             |
//! | Warning  | capacity / 4 .. capacity * 3/4 |
//! | Critical | > capacity * 3/4            |
//!
//! Depth is sampled from the receiver's queue length each time the actor
//! dequeues, so it counts every pending message including dial and capture
//! completions.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, warn};

use crate::observability::metrics::set_mailbox_depth;

/// Mailbox depth level for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    /// Below normal threshold.
    Normal,
    /// Between normal and warning thresholds.
    Warning,
    /// Above warning threshold.
    Critical,
}

/// Mailbox monitor for tracking queue depth and emitting metrics.
#[derive(Debug)]
pub struct MailboxMonitor {
    /// Actor identifier (broadcaster ID).
    actor_id: String,
    /// Depth above which the mailbox is elevated.
    normal_threshold: usize,
    /// Depth above which the mailbox is critical.
    warning_threshold: usize,
    /// Last sampled depth.
    depth: AtomicUsize,
    /// Peak depth since last reset.
    peak_depth: AtomicUsize,
    /// Total messages processed.
    messages_processed: AtomicU64,
}

impl MailboxMonitor {
    /// Create a monitor for a mailbox of the given capacity.
    #[must_use]
    pub fn new(actor_id: impl Into<String>, capacity: usize) -> Self {
        let normal_threshold = (capacity / 4).max(1);
        let warning_threshold = (capacity.saturating_mul(3) / 4).max(normal_threshold + 1);

        Self {
            actor_id: actor_id.into(),
            normal_threshold,
            warning_threshold,
            depth: AtomicUsize::new(0),
            peak_depth: AtomicUsize::new(0),
            messages_processed: AtomicU64::new(0),
        }
    }

    /// Record the depth observed when a message was dequeued.
    pub fn observe_depth(&self, depth: usize) {
        let previous = self.depth.swap(depth, Ordering::Relaxed);
        self.peak_depth.fetch_max(depth, Ordering::Relaxed);
        set_mailbox_depth(depth);

        match self.level_for_depth(depth) {
            MailboxLevel::Critical => {
                warn!(
                    target: "bc.actor.mailbox",
                    actor_id = %self.actor_id,
                    depth = depth,
                    threshold = self.warning_threshold,
                    "Mailbox depth critical"
                );
            }
            // Log once when crossing into the warning band
            MailboxLevel::Warning if previous <= self.normal_threshold => {
                debug!(
                    target: "bc.actor.mailbox",
                    actor_id = %self.actor_id,
                    depth = depth,
                    "Mailbox depth elevated"
                );
            }
            _ => {}
        }
    }

    /// Record a message as processed.
    pub fn record_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Last sampled depth.
    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Peak sampled depth.
    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    /// Total messages processed.
    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    /// Level of the last sampled depth.
    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        self.level_for_depth(self.current_depth())
    }

    /// Reset peak depth to the current depth.
    pub fn reset_peak(&self) {
        self.peak_depth
            .store(self.current_depth(), Ordering::Relaxed);
    }

    fn level_for_depth(&self, depth: usize) -> MailboxLevel {
        if depth > self.warning_threshold {
            MailboxLevel::Critical
        } else if depth > self.normal_threshold {
            MailboxLevel::Warning
        } else {
            MailboxLevel::Normal
        }
    }
}
