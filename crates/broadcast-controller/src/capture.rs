//! Capture device boundary.
//!
//! The capture device produces the local media source (a display capture) and
//! releases it again. The session only ever sees an opaque [`MediaHandle`],
//! which it passes unchanged to the peer transport.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;

/// 16:9, applied only when the platform supports aspect-ratio constraints.
pub const DISPLAY_ASPECT_RATIO: f64 = 1.777_777_777_8;

static NEXT_MEDIA_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle to a captured media stream.
///
/// Cloning is cheap; all clones refer to the same stream. Transports that
/// need the platform stream object downcast the payload with
/// [`MediaHandle::payload`].
#[derive(Clone)]
pub struct MediaHandle {
    id: u64,
    label: String,
    payload: Option<Arc<dyn Any + Send + Sync>>,
}

impl MediaHandle {
    /// Create a handle with no platform payload.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: NEXT_MEDIA_ID.fetch_add(1, Ordering::Relaxed),
            label: label.into(),
            payload: None,
        }
    }

    /// Create a handle carrying a platform stream object.
    pub fn with_payload<T: Any + Send + Sync>(label: impl Into<String>, payload: T) -> Self {
        Self {
            payload: Some(Arc::new(payload)),
            ..Self::new(label)
        }
    }

    /// Process-unique handle ID.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Human-readable label (e.g. the captured display's name).
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Downcast the platform payload.
    #[must_use]
    pub fn payload<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.payload.as_deref().and_then(|p| p.downcast_ref::<T>())
    }
}

impl PartialEq for MediaHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MediaHandle {}

impl fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaHandle")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

/// The live media source owned by a session.
#[derive(Debug, Clone)]
pub struct MediaSource {
    /// Handle passed to the peer transport.
    pub handle: MediaHandle,
    /// When the stream started.
    pub started_at: Instant,
}

impl MediaSource {
    /// Wrap a freshly acquired handle.
    #[must_use]
    pub fn new(handle: MediaHandle) -> Self {
        Self {
            handle,
            started_at: Instant::now(),
        }
    }

    /// How long the stream has been live.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Why a stream stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The broadcaster pressed stop.
    UserRequested,
    /// The platform revoked the capture (display unplugged, permission withdrawn,
    /// sharing ended from the system UI).
    DeviceRevoked,
    /// A different media source was started in its place.
    Replaced,
    /// The session is shutting down.
    SessionEnded,
}

impl StopReason {
    /// Returns the reason as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            StopReason::UserRequested => "user_requested",
            StopReason::DeviceRevoked => "device_revoked",
            StopReason::Replaced => "replaced",
            StopReason::SessionEnded => "session_ended",
        }
    }
}

/// Cursor rendering in the captured video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorMode {
    /// Always draw the cursor.
    Always,
    /// Draw the cursor only while it moves.
    Motion,
    /// Never draw the cursor.
    Never,
}

/// Constraints the platform's capture API understands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupportedConstraints {
    /// Frame-rate constraint supported.
    pub frame_rate: bool,
    /// Aspect-ratio constraint supported.
    pub aspect_ratio: bool,
}

/// Display-media constraints requested from the capture device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureOptions {
    /// Cursor rendering.
    pub cursor: CursorMode,
    /// Ideal video width.
    pub ideal_width: u32,
    /// Maximum video width.
    pub max_width: u32,
    /// Ideal video height.
    pub ideal_height: u32,
    /// Maximum frame rate, when the platform supports it.
    pub max_frame_rate: Option<u32>,
    /// Aspect ratio, when the platform supports it.
    pub aspect_ratio: Option<f64>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            cursor: CursorMode::Always,
            ideal_width: 1920,
            max_width: 1920,
            ideal_height: 1080,
            max_frame_rate: None,
            aspect_ratio: None,
        }
    }
}

impl CaptureOptions {
    /// Build options from configuration and the platform's supported constraints.
    ///
    /// Frame rate and aspect ratio are only requested when the platform supports
    /// both; otherwise neither is sent.
    #[must_use]
    pub fn from_config(config: &Config, supported: SupportedConstraints) -> Self {
        let mut options = Self {
            ideal_width: config.capture_max_width,
            max_width: config.capture_max_width,
            ideal_height: config.capture_ideal_height,
            ..Self::default()
        };

        if supported.frame_rate && supported.aspect_ratio {
            options.max_frame_rate = Some(config.capture_max_frame_rate);
            options.aspect_ratio = Some(DISPLAY_ASPECT_RATIO);
        }

        options
    }
}

/// Capture failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// The user or platform denied capture permission.
    #[error("Capture permission denied")]
    PermissionDenied,

    /// No capturable source was selected.
    #[error("No capture source selected")]
    NoSource,

    /// The device failed.
    #[error("Capture device error: {0}")]
    Device(String),
}

/// Local capture device.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Constraints this platform understands.
    fn supported_constraints(&self) -> SupportedConstraints {
        SupportedConstraints::default()
    }

    /// Acquire a display capture. May wait on a user prompt.
    async fn start_capture(&self, options: &CaptureOptions) -> Result<MediaHandle, CaptureError>;

    /// Release a capture (stop all its tracks). Must not block and must
    /// tolerate handles that were already released by the platform.
    fn stop_capture(&self, handle: &MediaHandle);
}
