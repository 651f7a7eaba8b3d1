//! Broadcast Controller Library
//!
//! Broadcaster-side session coordination for a one-to-many live screen share.
//! Given one local media stream and a changing set of remote viewers announced
//! over a signaling channel, the controller dials every viewer directly and
//! keeps each viewer's connection state consistent with the stream lifecycle.
//!
//! # Architecture
//!
//! All state changes go through a single actor, so signaling notifications,
//! capture toggles and dial outcomes are applied one at a time in arrival
//! order:
//!
//! ```text
//! SignalingChannel ──┐
//!                    │   SessionMessage      ┌──────────────────────┐
//! UI (start/stop) ───┼──────────────────────►│ SessionActor         │
//!                    │                       │  ├── ViewerRegistry  │
//! dial completions ──┘                       │  └── MediaSource?    │
//!        ▲                                   └─────────┬────────────┘
//!        │              PeerTransport::dial            │
//!        └─────────────────────────────────────────────┘
//! ```
//!
//! Readers (a UI layer, status badges) never touch the registry directly;
//! they receive [`actors::SessionSnapshot`] values through a `watch` channel.
//!
//! # Modules
//!
//! - [`actors`] - The session actor (reconciler), its messages and mailbox monitoring
//! - [`registry`] - Viewer registry and connection states
//! - [`transport`] - Peer transport boundary (`dial`)
//! - [`signaling`] - Signaling channel boundary (events, registration, bridge task)
//! - [`capture`] - Capture device boundary and display-media options
//! - [`config`] - Configuration from environment
//! - [`errors`] - Error types
//! - [`observability`] - Metrics emitted through the `metrics` facade

pub mod actors;
pub mod capture;
pub mod config;
pub mod errors;
pub mod observability;
pub mod registry;
pub mod signaling;
pub mod transport;
