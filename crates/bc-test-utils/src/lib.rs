//! # BC Test Utilities
//!
//! Shared test utilities for the Broadcast Controller.
//!
//! This crate provides mock collaborators and fixtures for exercising a
//! session without a real peer transport, signaling server or display.
//!
//! ## Modules
//!
//! - `mock_transport` - Scripted peer transport (succeed, fail, or hold dials)
//! - `mock_signaling` - Recording signaling sink
//! - `mock_capture` - Capture device with configurable results
//! - `fixtures` - Viewer IDs, test configuration and a spawned test session
//! - `snapshots` - Waiting on published session snapshots
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bc_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let session = TestSession::builder()
//!         .transport(MockPeerTransport::builder().fail_viewer("v3").build())
//!         .spawn();
//!
//!     session.handle.viewer_joined(viewer("v3")).await.unwrap();
//!     session.handle.start_capture().await.unwrap();
//!
//!     session
//!         .wait_for(|s| s.state_of(&viewer("v3")) == Some(ConnectionState::Failed))
//!         .await;
//! }
//! ```

pub mod fixtures;
pub mod mock_capture;
pub mod mock_signaling;
pub mod mock_transport;
pub mod snapshots;

pub use fixtures::*;
pub use mock_capture::MockCaptureDevice;
pub use mock_signaling::MockSignalingSink;
pub use mock_transport::{DialOutcome, MockPeerTransport, MockPeerTransportBuilder};
pub use snapshots::{wait_for_snapshot, DEFAULT_WAIT};

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Honors `RUST_LOG`. Safe to call from every test; only the first call
/// installs.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
