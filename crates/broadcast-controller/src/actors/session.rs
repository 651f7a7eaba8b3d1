//! `SessionActor` - reconciles viewer connection state with the media stream.
//!
//! The session actor is the only writer to the [`ViewerRegistry`] and the only
//! caller of [`PeerTransport::dial`]. Signaling notifications, capture
//! toggles, and the asynchronous completions of dials and captures all arrive
//! as [`SessionMessage`]s on one mailbox and are applied one at a time, in
//! arrival order.
//!
//! Nothing on the event loop waits for the network or the capture device:
//! dials and captures run on spawned tasks that post their result back to the
//! mailbox. The actor keeps only a weak sender for that, so the session ends
//! once every [`SessionActorHandle`] is dropped.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn, Instrument};

use crate::actors::messages::{SessionMessage, SessionSnapshot};
use crate::actors::metrics::MailboxMonitor;
use crate::capture::{CaptureDevice, CaptureError, CaptureOptions, MediaHandle, MediaSource, StopReason};
use crate::config::Config;
use crate::errors::BcError;
use crate::observability::metrics::{
    record_capture_result, record_dial_attempt, record_dial_outcome,
    record_signaling_connectivity, record_stale_dial_outcome, record_stream_transition,
    set_viewers_active, set_viewers_joined,
};
use crate::registry::{ConnectionState, DialAttemptId, DialResolution, ViewerId, ViewerRegistry};
use crate::signaling::{ConnectivityState, SignalingCommand, SignalingEvent, SignalingSink};
use crate::transport::{DialError, PeerTransport};

/// External collaborators a session drives.
#[derive(Clone)]
pub struct SessionCollaborators {
    /// Dials viewers.
    pub transport: Arc<dyn PeerTransport>,
    /// Produces and releases the media source.
    pub capture: Arc<dyn CaptureDevice>,
    /// Outbound half of the signaling channel.
    pub signaling: Arc<dyn SignalingSink>,
}

/// Handle to a `SessionActor`.
#[derive(Clone)]
pub struct SessionActorHandle {
    sender: mpsc::Sender<SessionMessage>,
    cancel_token: CancellationToken,
    broadcaster_id: String,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl SessionActorHandle {
    /// Get the broadcaster ID.
    #[must_use]
    pub fn broadcaster_id(&self) -> &str {
        &self.broadcaster_id
    }

    /// A viewer joined.
    pub async fn viewer_joined(&self, viewer_id: ViewerId) -> Result<(), BcError> {
        self.notify(SessionMessage::ViewerJoined { viewer_id }).await
    }

    /// A viewer left.
    pub async fn viewer_left(&self, viewer_id: ViewerId) -> Result<(), BcError> {
        self.notify(SessionMessage::ViewerLeft { viewer_id }).await
    }

    /// The signaling channel's connectivity changed.
    pub async fn connectivity_changed(&self, state: ConnectivityState) -> Result<(), BcError> {
        self.notify(SessionMessage::ConnectivityChanged { state })
            .await
    }

    /// Forward an inbound signaling event.
    pub async fn signaling_event(&self, event: SignalingEvent) -> Result<(), BcError> {
        let message = match event {
            SignalingEvent::ViewerJoined { viewer_id } => SessionMessage::ViewerJoined { viewer_id },
            SignalingEvent::ViewerLeft { viewer_id } => SessionMessage::ViewerLeft { viewer_id },
            SignalingEvent::ConnectivityChanged { state } => {
                SessionMessage::ConnectivityChanged { state }
            }
        };
        self.notify(message).await
    }

    /// A media source became available outside [`start_capture`](Self::start_capture).
    ///
    /// The session takes ownership of the handle and releases it through the
    /// capture device when the stream stops.
    pub async fn stream_started(&self, handle: MediaHandle) -> Result<(), BcError> {
        self.notify(SessionMessage::StreamStarted { handle }).await
    }

    /// The media source went away.
    pub async fn stream_stopped(&self, reason: StopReason) -> Result<(), BcError> {
        self.notify(SessionMessage::StreamStopped { reason }).await
    }

    /// The platform revoked the capture (e.g. sharing ended from the system UI).
    pub async fn device_revoked(&self) -> Result<(), BcError> {
        self.stream_stopped(StopReason::DeviceRevoked).await
    }

    /// Acquire a media source and go live.
    ///
    /// Resolves once the capture device has answered.
    ///
    /// # Errors
    ///
    /// - `AlreadyLive` if a stream is present
    /// - `CaptureInProgress` if another acquisition is pending
    /// - `CaptureUnavailable` if the device failed (no state change)
    /// - `CaptureCancelled` if `stop_capture` was called before the device answered
    pub async fn start_capture(&self) -> Result<(), BcError> {
        let (tx, rx) = oneshot::channel();
        self.notify(SessionMessage::StartCapture { respond_to: tx })
            .await?;

        rx.await.map_err(|e| self.reply_error(&e))?
    }

    /// Release the media source, or abandon a pending acquisition.
    ///
    /// A no-op when nothing is live or pending.
    pub async fn stop_capture(&self) -> Result<(), BcError> {
        let (tx, rx) = oneshot::channel();
        self.notify(SessionMessage::StopCapture { respond_to: tx })
            .await?;

        rx.await.map_err(|e| self.reply_error(&e))?
    }

    /// Get the session snapshot after all previously sent messages.
    pub async fn get_snapshot(&self) -> Result<SessionSnapshot, BcError> {
        let (tx, rx) = oneshot::channel();
        self.notify(SessionMessage::GetSnapshot { respond_to: tx })
            .await?;

        rx.await.map_err(|e| self.reply_error(&e))
    }

    /// Most recently published snapshot, without a round trip to the actor.
    #[must_use]
    pub fn latest_snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Subscribe to snapshot updates.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Cancel the session actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Get a child token for tasks tied to this session.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    async fn notify(&self, message: SessionMessage) -> Result<(), BcError> {
        self.sender.send(message).await.map_err(|e| {
            if self.is_cancelled() {
                BcError::ShuttingDown
            } else {
                BcError::Internal(format!("channel send failed: {e}"))
            }
        })
    }

    fn reply_error(&self, err: &oneshot::error::RecvError) -> BcError {
        if self.is_cancelled() {
            BcError::ShuttingDown
        } else {
            BcError::Internal(format!("response receive failed: {err}"))
        }
    }
}

/// The session actor.
pub struct SessionActor {
    /// Broadcaster ID.
    broadcaster_id: String,
    /// Message receiver.
    receiver: mpsc::Receiver<SessionMessage>,
    /// Weak sender for dial and capture tasks to post completions.
    mailbox: mpsc::WeakSender<SessionMessage>,
    /// Cancellation token.
    cancel_token: CancellationToken,
    /// Viewer connection states.
    registry: ViewerRegistry,
    /// The live media source, if any.
    media: Option<MediaSource>,
    /// Signaling connectivity.
    connectivity: ConnectivityState,
    /// Generation of the pending capture acquisition, if any.
    pending_capture: Option<u64>,
    /// Last capture generation issued.
    capture_generation: u64,
    /// Last dial attempt issued.
    dial_sequence: u64,
    /// Options passed to the capture device.
    capture_options: CaptureOptions,
    transport: Arc<dyn PeerTransport>,
    capture: Arc<dyn CaptureDevice>,
    signaling: Arc<dyn SignalingSink>,
    /// Snapshot publisher.
    snapshots: watch::Sender<SessionSnapshot>,
    /// Mailbox monitor.
    monitor: MailboxMonitor,
}

impl SessionActor {
    /// Spawn a new session actor.
    ///
    /// Returns a handle and the task join handle. The actor announces itself
    /// to the signaling channel once, as its first action.
    pub fn spawn(
        config: &Config,
        collaborators: SessionCollaborators,
        cancel_token: CancellationToken,
    ) -> (SessionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(config.mailbox_capacity);
        let broadcaster_id = config.broadcaster_id.clone();

        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot {
            broadcaster_id: broadcaster_id.clone(),
            ..SessionSnapshot::default()
        });

        let capture_options = CaptureOptions::from_config(
            config,
            collaborators.capture.supported_constraints(),
        );

        let actor = Self {
            broadcaster_id: broadcaster_id.clone(),
            receiver,
            mailbox: sender.downgrade(),
            cancel_token: cancel_token.clone(),
            registry: ViewerRegistry::new(),
            media: None,
            connectivity: ConnectivityState::default(),
            pending_capture: None,
            capture_generation: 0,
            dial_sequence: 0,
            capture_options,
            transport: collaborators.transport,
            capture: collaborators.capture,
            signaling: collaborators.signaling,
            snapshots: snapshot_tx,
            monitor: MailboxMonitor::new(&broadcaster_id, config.mailbox_capacity),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = SessionActorHandle {
            sender,
            cancel_token,
            broadcaster_id,
            snapshots: snapshot_rx,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "bc.actor.session", fields(broadcaster_id = %self.broadcaster_id))]
    async fn run(mut self) {
        info!(
            target: "bc.actor.session",
            broadcaster_id = %self.broadcaster_id,
            "SessionActor started"
        );

        self.register();

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "bc.actor.session",
                        broadcaster_id = %self.broadcaster_id,
                        "SessionActor received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.monitor.observe_depth(self.receiver.len());
                            self.handle_message(message);
                            self.monitor.record_processed();
                            self.publish_snapshot();
                        }
                        None => {
                            info!(
                                target: "bc.actor.session",
                                broadcaster_id = %self.broadcaster_id,
                                "SessionActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        self.graceful_shutdown();

        info!(
            target: "bc.actor.session",
            broadcaster_id = %self.broadcaster_id,
            viewers = self.registry.len(),
            messages_processed = self.monitor.messages_processed(),
            peak_mailbox_depth = self.monitor.peak_depth(),
            "SessionActor stopped"
        );
    }

    /// Handle a single message.
    fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::ViewerJoined { viewer_id } => {
                self.handle_viewer_joined(viewer_id);
            }

            SessionMessage::ViewerLeft { viewer_id } => {
                self.handle_viewer_left(&viewer_id);
            }

            SessionMessage::ConnectivityChanged { state } => {
                self.handle_connectivity_changed(state);
            }

            SessionMessage::StreamStarted { handle } => {
                self.apply_stream_started(handle);
            }

            SessionMessage::StreamStopped { reason } => {
                self.apply_stream_stopped(reason);
            }

            SessionMessage::StartCapture { respond_to } => {
                self.handle_start_capture(respond_to);
            }

            SessionMessage::StopCapture { respond_to } => {
                self.handle_stop_capture();
                let _ = respond_to.send(Ok(()));
            }

            SessionMessage::CaptureCompleted {
                generation,
                result,
                respond_to,
            } => {
                let reply = self.handle_capture_completed(generation, result);
                let _ = respond_to.send(reply);
            }

            SessionMessage::DialCompleted {
                viewer_id,
                attempt,
                result,
            } => {
                self.handle_dial_completed(&viewer_id, attempt, result);
            }

            SessionMessage::GetSnapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
        }
    }

    /// Announce this broadcaster to the signaling channel.
    fn register(&self) {
        let command = SignalingCommand::Register {
            broadcaster_id: self.broadcaster_id.clone(),
        };

        match self.signaling.send(command) {
            Ok(()) => {
                info!(
                    target: "bc.signaling",
                    broadcaster_id = %self.broadcaster_id,
                    "Registration sent"
                );
            }
            Err(e) => {
                warn!(
                    target: "bc.signaling",
                    broadcaster_id = %self.broadcaster_id,
                    error = %e,
                    "Registration could not be sent"
                );
            }
        }
    }

    fn handle_viewer_joined(&mut self, viewer_id: ViewerId) {
        let inserted = self.registry.upsert(&viewer_id);

        debug!(
            target: "bc.actor.session",
            viewer_id = %viewer_id,
            new = inserted,
            live = self.media.is_some(),
            "Viewer joined"
        );

        // Dials only from NotConnected or Failed, so a duplicate join never
        // issues a second concurrent dial.
        if let Some(media) = self.media.as_ref().map(|m| m.handle.clone()) {
            self.dial_viewer(&viewer_id, &media);
        }
    }

    fn handle_viewer_left(&mut self, viewer_id: &ViewerId) {
        if self.registry.remove(viewer_id) {
            debug!(
                target: "bc.actor.session",
                viewer_id = %viewer_id,
                "Viewer left"
            );
        } else {
            debug!(
                target: "bc.actor.session",
                viewer_id = %viewer_id,
                "Leave for unknown viewer ignored"
            );
        }
    }

    fn handle_connectivity_changed(&mut self, state: ConnectivityState) {
        if self.connectivity == state {
            return;
        }
        self.connectivity = state;
        record_signaling_connectivity(state.as_str());

        match state {
            ConnectivityState::Disconnected => {
                warn!(
                    target: "bc.signaling",
                    broadcaster_id = %self.broadcaster_id,
                    "Signaling channel disconnected"
                );
            }
            ConnectivityState::Connected | ConnectivityState::Connecting => {
                info!(
                    target: "bc.signaling",
                    broadcaster_id = %self.broadcaster_id,
                    state = state.as_str(),
                    "Signaling connectivity changed"
                );
            }
        }
    }

    /// Go live with `handle` and dial every `NotConnected` or `Failed` viewer.
    ///
    /// Starting again with the live handle only redials. Starting with a
    /// different handle stops the current stream first (reason `Replaced`).
    fn apply_stream_started(&mut self, handle: MediaHandle) {
        let restart = match &self.media {
            Some(current) if current.handle == handle => true,
            Some(_) => {
                self.apply_stream_stopped(StopReason::Replaced);
                false
            }
            None => false,
        };

        if !restart {
            self.media = Some(MediaSource::new(handle.clone()));
        }
        record_stream_transition("started", if restart { "restart" } else { "new" });

        let candidates = self.registry.dial_candidates();
        info!(
            target: "bc.actor.session",
            broadcaster_id = %self.broadcaster_id,
            media_id = handle.id(),
            restart = restart,
            dialing = candidates.len(),
            "Stream started"
        );

        for viewer_id in &candidates {
            self.dial_viewer(viewer_id, &handle);
        }
    }

    /// Drop the media source and reset every viewer to `NotConnected`.
    ///
    /// Viewers stay in the registry. Outcomes of dials still in flight are
    /// discarded when they arrive.
    fn apply_stream_stopped(&mut self, reason: StopReason) {
        if let Some(source) = self.media.take() {
            self.capture.stop_capture(&source.handle);
            record_stream_transition("stopped", reason.as_str());
            info!(
                target: "bc.actor.session",
                broadcaster_id = %self.broadcaster_id,
                media_id = source.handle.id(),
                reason = reason.as_str(),
                uptime_secs = source.uptime().as_secs(),
                "Stream stopped"
            );
        }

        let reset = self.registry.reset_all();
        if reset > 0 {
            debug!(
                target: "bc.actor.session",
                reset = reset,
                "Viewers reset to not_connected"
            );
        }
    }

    fn handle_start_capture(&mut self, respond_to: oneshot::Sender<Result<(), BcError>>) {
        if self.media.is_some() {
            let _ = respond_to.send(Err(BcError::AlreadyLive));
            return;
        }
        if self.pending_capture.is_some() {
            let _ = respond_to.send(Err(BcError::CaptureInProgress));
            return;
        }

        self.capture_generation += 1;
        let generation = self.capture_generation;
        self.pending_capture = Some(generation);

        debug!(
            target: "bc.capture",
            generation = generation,
            "Requesting capture"
        );

        let device = Arc::clone(&self.capture);
        let options = self.capture_options.clone();
        let mailbox = self.mailbox.clone();

        tokio::spawn(
            async move {
                let result = device.start_capture(&options).await;

                let Some(sender) = mailbox.upgrade() else {
                    if let Ok(handle) = &result {
                        device.stop_capture(handle);
                    }
                    return;
                };

                let message = SessionMessage::CaptureCompleted {
                    generation,
                    result,
                    respond_to,
                };
                if let Err(mpsc::error::SendError(SessionMessage::CaptureCompleted {
                    result: Ok(handle),
                    ..
                })) = sender.send(message).await
                {
                    device.stop_capture(&handle);
                }
            }
            .in_current_span(),
        );
    }

    fn handle_stop_capture(&mut self) {
        if let Some(generation) = self.pending_capture.take() {
            debug!(
                target: "bc.capture",
                generation = generation,
                "Pending capture abandoned"
            );
        }
        self.apply_stream_stopped(StopReason::UserRequested);
    }

    fn handle_capture_completed(
        &mut self,
        generation: u64,
        result: Result<MediaHandle, CaptureError>,
    ) -> Result<(), BcError> {
        if self.pending_capture != Some(generation) {
            if let Ok(handle) = &result {
                self.capture.stop_capture(handle);
            }
            record_capture_result("cancelled");
            debug!(
                target: "bc.capture",
                generation = generation,
                "Abandoned capture completed, released"
            );
            return Err(BcError::CaptureCancelled);
        }
        self.pending_capture = None;

        match result {
            Ok(handle) if self.media.is_some() => {
                // A stream was started externally while the device was prompting
                self.capture.stop_capture(&handle);
                record_capture_result("cancelled");
                Err(BcError::AlreadyLive)
            }
            Ok(handle) => {
                record_capture_result("success");
                self.apply_stream_started(handle);
                Ok(())
            }
            Err(e) => {
                record_capture_result("unavailable");
                warn!(
                    target: "bc.capture",
                    error = %e,
                    "Capture unavailable"
                );
                Err(e.into())
            }
        }
    }

    /// Issue a dial to `viewer_id` if it is dialable.
    #[instrument(skip_all, fields(viewer_id = %viewer_id))]
    fn dial_viewer(&mut self, viewer_id: &ViewerId, media: &MediaHandle) {
        self.dial_sequence += 1;
        let attempt = DialAttemptId(self.dial_sequence);

        if !self.registry.begin_dial(viewer_id, attempt) {
            return;
        }
        record_dial_attempt();

        debug!(
            target: "bc.actor.session",
            viewer_id = %viewer_id,
            attempt = %attempt,
            "Dialing viewer"
        );

        let transport = Arc::clone(&self.transport);
        let mailbox = self.mailbox.clone();
        let viewer_id = viewer_id.clone();
        let media = media.clone();

        tokio::spawn(
            async move {
                let result = transport.dial(&viewer_id, &media).await;

                if let Some(sender) = mailbox.upgrade() {
                    let _ = sender
                        .send(SessionMessage::DialCompleted {
                            viewer_id,
                            attempt,
                            result,
                        })
                        .await;
                }
            }
            .in_current_span(),
        );
    }

    fn handle_dial_completed(
        &mut self,
        viewer_id: &ViewerId,
        attempt: DialAttemptId,
        result: Result<(), DialError>,
    ) {
        match self
            .registry
            .complete_dial(viewer_id, attempt, result.is_ok())
        {
            DialResolution::Applied(state) => match result {
                Ok(()) => {
                    record_dial_outcome("success");
                    debug!(
                        target: "bc.actor.session",
                        viewer_id = %viewer_id,
                        attempt = %attempt,
                        state = state.as_str(),
                        "Viewer connected"
                    );
                }
                Err(e) => {
                    record_dial_outcome(e.as_label());
                    warn!(
                        target: "bc.actor.session",
                        viewer_id = %viewer_id,
                        attempt = %attempt,
                        error = %e,
                        "Dial failed"
                    );
                }
            },
            DialResolution::UnknownViewer => {
                record_stale_dial_outcome("unknown_viewer");
                warn!(
                    target: "bc.actor.session",
                    viewer_id = %viewer_id,
                    attempt = %attempt,
                    "Dial outcome for departed viewer discarded"
                );
            }
            DialResolution::Superseded => {
                record_stale_dial_outcome("superseded");
                debug!(
                    target: "bc.actor.session",
                    viewer_id = %viewer_id,
                    attempt = %attempt,
                    "Superseded dial outcome discarded"
                );
            }
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            broadcaster_id: self.broadcaster_id.clone(),
            viewers: self.registry.snapshot(),
            media_present: self.media.is_some(),
            capture_pending: self.pending_capture.is_some(),
            connectivity: self.connectivity,
        }
    }

    /// Publish the current snapshot if it changed.
    fn publish_snapshot(&self) {
        set_viewers_joined(self.registry.len());
        set_viewers_active(self.registry.count_in(ConnectionState::Active));

        let snapshot = self.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    /// Release the media source and abandon any pending capture.
    fn graceful_shutdown(&mut self) {
        self.pending_capture = None;
        self.apply_stream_stopped(StopReason::SessionEnded);

        // Queued completions may still carry a captured handle
        self.receiver.close();
        let mut drained = 0usize;
        while let Ok(message) = self.receiver.try_recv() {
            drained += 1;
            match message {
                SessionMessage::CaptureCompleted {
                    result, respond_to, ..
                } => {
                    if let Ok(handle) = &result {
                        self.capture.stop_capture(handle);
                    }
                    let _ = respond_to.send(Err(BcError::ShuttingDown));
                }
                SessionMessage::StartCapture { respond_to }
                | SessionMessage::StopCapture { respond_to } => {
                    let _ = respond_to.send(Err(BcError::ShuttingDown));
                }
                SessionMessage::StreamStarted { handle } => {
                    self.capture.stop_capture(&handle);
                }
                _ => {}
            }
        }

        self.publish_snapshot();

        debug!(
            target: "bc.actor.session",
            broadcaster_id = %self.broadcaster_id,
            drained = drained,
            "Graceful shutdown complete"
        );
    }
}
