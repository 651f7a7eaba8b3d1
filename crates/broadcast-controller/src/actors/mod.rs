//! Actor model for the broadcast session.
//!
//! ```text
//! SessionActor (one per broadcaster)
//! ├── owns ViewerRegistry and the MediaSource
//! ├── spawns one task per dial (PeerTransport::dial)
//! └── spawns one task per capture acquisition (CaptureDevice::start_capture)
//! ```
//!
//! # Key Design Decisions
//!
//! - **Single writer**: every registry mutation happens inside the actor's message loop
//! - **Completions are messages**: dial and capture results re-enter through the mailbox
//! - **Attempt tags**: each dial carries a `DialAttemptId`; stale outcomes are discarded
//! - **Snapshots for readers**: state is published on a `watch` channel after each message
//! - **CancellationToken**: cancelling the session releases the media source
//!
//! # Modules
//!
//! - [`session`] - `SessionActor` and its handle
//! - [`messages`] - Message and snapshot types
//! - [`metrics`] - Mailbox monitoring

pub mod messages;
pub mod metrics;
pub mod session;

// Re-export primary types
pub use messages::*;
pub use metrics::{MailboxLevel, MailboxMonitor};
pub use session::{SessionActor, SessionActorHandle, SessionCollaborators};
