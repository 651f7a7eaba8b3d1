//! Mock capture device.
//!
//! Produces fresh [`MediaHandle`]s (or a configured error) and records every
//! release. A holding device parks `start_capture` until the test completes
//! it, for exercising stop-while-pending.

use std::sync::Mutex;

use async_trait::async_trait;
use broadcast_controller::capture::{
    CaptureDevice, CaptureError, CaptureOptions, MediaHandle, SupportedConstraints,
};
use tokio::sync::{oneshot, Notify};

#[derive(Debug, Clone)]
enum Mode {
    Succeed,
    Fail(CaptureError),
    Hold,
}

#[derive(Default)]
struct Inner {
    requests: Vec<CaptureOptions>,
    produced: Vec<MediaHandle>,
    released: Vec<u64>,
    held: Vec<oneshot::Sender<Result<MediaHandle, CaptureError>>>,
}

/// Mock capture device.
pub struct MockCaptureDevice {
    mode: Mode,
    constraints: SupportedConstraints,
    inner: Mutex<Inner>,
    changed: Notify,
}

impl Default for MockCaptureDevice {
    fn default() -> Self {
        Self::succeeding()
    }
}

impl MockCaptureDevice {
    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            constraints: SupportedConstraints::default(),
            inner: Mutex::new(Inner::default()),
            changed: Notify::new(),
        }
    }

    /// Every capture succeeds with a new handle.
    #[must_use]
    pub fn succeeding() -> Self {
        Self::with_mode(Mode::Succeed)
    }

    /// Every capture fails with `err`.
    #[must_use]
    pub fn failing(err: CaptureError) -> Self {
        Self::with_mode(Mode::Fail(err))
    }

    /// Every capture waits for [`complete_held`](Self::complete_held).
    #[must_use]
    pub fn holding() -> Self {
        Self::with_mode(Mode::Hold)
    }

    /// Report these supported constraints to the session.
    #[must_use]
    pub fn with_constraints(mut self, constraints: SupportedConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Options passed to each `start_capture` call.
    #[must_use]
    pub fn requests(&self) -> Vec<CaptureOptions> {
        self.inner.lock().unwrap().requests.clone()
    }

    /// Handles produced so far.
    #[must_use]
    pub fn produced(&self) -> Vec<MediaHandle> {
        self.inner.lock().unwrap().produced.clone()
    }

    /// IDs of released handles, in release order.
    #[must_use]
    pub fn released(&self) -> Vec<u64> {
        self.inner.lock().unwrap().released.clone()
    }

    /// Whether a handle was released.
    #[must_use]
    pub fn was_released(&self, handle: &MediaHandle) -> bool {
        self.released().contains(&handle.id())
    }

    /// Wait until a capture is held.
    ///
    /// # Panics
    ///
    /// Panics if no capture is held within [`crate::DEFAULT_WAIT`].
    pub async fn wait_for_held(&self) {
        let deadline = tokio::time::Instant::now() + crate::DEFAULT_WAIT;
        loop {
            let changed = self.changed.notified();
            if !self.inner.lock().unwrap().held.is_empty() {
                return;
            }
            if tokio::time::timeout_at(deadline, changed).await.is_err() {
                panic!("no capture was held");
            }
        }
    }

    /// Complete the oldest held capture. On success returns the produced handle.
    ///
    /// # Panics
    ///
    /// Panics if no capture is held.
    pub fn complete_held(&self, succeed: bool) -> Option<MediaHandle> {
        let (tx, handle) = {
            let mut inner = self.inner.lock().unwrap();
            assert!(!inner.held.is_empty(), "no capture is held");
            let tx = inner.held.remove(0);
            let handle = succeed.then(|| MediaHandle::new("held-display"));
            if let Some(handle) = &handle {
                inner.produced.push(handle.clone());
            }
            (tx, handle)
        };

        let result = handle.clone().ok_or(CaptureError::PermissionDenied);
        let _ = tx.send(result);
        handle
    }
}

#[async_trait]
impl CaptureDevice for MockCaptureDevice {
    fn supported_constraints(&self) -> SupportedConstraints {
        self.constraints
    }

    async fn start_capture(&self, options: &CaptureOptions) -> Result<MediaHandle, CaptureError> {
        self.inner.lock().unwrap().requests.push(options.clone());

        match &self.mode {
            Mode::Succeed => {
                let handle = MediaHandle::new("mock-display");
                self.inner.lock().unwrap().produced.push(handle.clone());
                Ok(handle)
            }
            Mode::Fail(err) => Err(err.clone()),
            Mode::Hold => {
                let (tx, rx) = oneshot::channel();
                self.inner.lock().unwrap().held.push(tx);
                self.changed.notify_waiters();
                rx.await
                    .unwrap_or(Err(CaptureError::Device("held capture abandoned".to_string())))
            }
        }
    }

    fn stop_capture(&self, handle: &MediaHandle) {
        self.inner.lock().unwrap().released.push(handle.id());
    }
}
