//! Capture session coordinator: the serialized control loop.
//!
//! Every input (trigger requests, permission answers, host frames and
//! terminations, settle and timeout timers) is an event on one unbounded
//! channel, handled in order by a single task that owns the session. No
//! callback ever mutates session state in place.
//!
//! ```text
//! Idle --capture, no grant--> AwaitingPermission --grant--> PermissionGranted
//!   --capture + settle--> MirroringActive --reader armed--> FrameRequested
//!   --frame stored--> Completed
//! any --cancel/stop/revoke/timeout--> Idle      denial --> Failed
//! ```

use crate::capture::acquisition::{self, FrameReader};
use crate::capture::frame::FrameBuffer;
use crate::capture::host::{
    HostError, HostEventSink, MirrorTarget, MirroringHost, PermissionBroker, PermissionReply,
    PermissionToken,
};
use crate::capture::scratch::{ScratchImage, ScratchStore};
use crate::capture::session::{CaptureSession, SessionState};
use crate::config::CaptureConfig;
use crate::error::SnipError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Inputs to the control loop.
pub(crate) enum ControlEvent {
    RequestPermission,
    PermissionResult {
        ticket: u64,
        granted: bool,
        token: Option<PermissionToken>,
    },
    RequestCapture {
        delay: Option<Duration>,
    },
    SettleElapsed {
        generation: u64,
    },
    FrameReady {
        generation: u64,
        frame: FrameBuffer,
    },
    FrameStored {
        generation: u64,
        result: Result<ScratchImage, String>,
    },
    HostTerminated {
        generation: u64,
        reason: String,
    },
    CaptureTimeout {
        generation: u64,
    },
    Cancel,
    Stop,
    Shutdown,
}

/// What the coordinator tells the rest of the app.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// The permission prompt was started.
    PermissionRequested,
    PermissionGranted,
    /// A frame was accepted and stored; the overlay can open.
    FrameCaptured(ScratchImage),
    /// The attempt ended without a frame. The coordinator is already back
    /// in a safe state.
    Failed(SnipError),
}

/// Cloneable front door to the coordinator task.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<ControlEvent>,
    state: watch::Receiver<SessionState>,
}

impl CoordinatorHandle {
    pub fn request_permission(&self) {
        self.send(ControlEvent::RequestPermission);
    }

    /// Ask for one capture. `None` uses the configured settle delay.
    ///
    /// Dropped if a capture is already in flight.
    pub fn request_capture(&self, delay: Option<Duration>) {
        self.send(ControlEvent::RequestCapture { delay });
    }

    /// Release mirroring and the reader, back to Idle. Keeps the grant.
    pub fn cancel(&self) {
        self.send(ControlEvent::Cancel);
    }

    /// Tear the session down completely, grant included.
    pub fn stop(&self) {
        self.send(ControlEvent::Stop);
    }

    /// Stop and end the control loop.
    pub fn shutdown(&self) {
        self.send(ControlEvent::Shutdown);
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    fn send(&self, event: ControlEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("[CAPTURE] Coordinator gone, request dropped");
        }
    }
}

/// Start the coordinator task on the current tokio runtime.
pub fn spawn_coordinator(
    host: Arc<dyn MirroringHost>,
    broker: Arc<dyn PermissionBroker>,
    config: CaptureConfig,
    scratch: ScratchStore,
) -> (
    CoordinatorHandle,
    mpsc::UnboundedReceiver<CaptureEvent>,
    JoinHandle<()>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(SessionState::Idle);

    let coordinator = Coordinator {
        host,
        broker,
        config,
        scratch,
        tx: tx.downgrade(),
        events: events_tx,
        state_tx,
        session: None,
        next_generation: 0,
    };
    let task = tokio::spawn(coordinator.run(rx));

    (
        CoordinatorHandle {
            tx,
            state: state_rx,
        },
        events_rx,
        task,
    )
}

struct Coordinator {
    host: Arc<dyn MirroringHost>,
    broker: Arc<dyn PermissionBroker>,
    config: CaptureConfig,
    scratch: ScratchStore,
    /// Weak so the loop ends once every handle, sink and timer is gone.
    tx: mpsc::WeakUnboundedSender<ControlEvent>,
    events: mpsc::UnboundedSender<CaptureEvent>,
    state_tx: watch::Sender<SessionState>,
    session: Option<CaptureSession>,
    next_generation: u64,
}

impl Coordinator {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ControlEvent>) {
        log::info!("[CAPTURE] Coordinator started");
        while let Some(event) = rx.recv().await {
            match event {
                ControlEvent::RequestPermission => self.request_permission(),
                ControlEvent::PermissionResult {
                    ticket,
                    granted,
                    token,
                } => self.on_permission_result(ticket, granted, token),
                ControlEvent::RequestCapture { delay } => self.request_capture(delay),
                ControlEvent::SettleElapsed { generation } => self.on_settle_elapsed(generation),
                ControlEvent::FrameReady { generation, frame } => {
                    self.on_frame_ready(generation, frame)
                }
                ControlEvent::FrameStored { generation, result } => {
                    self.on_frame_stored(generation, result)
                }
                ControlEvent::HostTerminated { generation, reason } => {
                    self.on_host_terminated(generation, reason)
                }
                ControlEvent::CaptureTimeout { generation } => self.on_capture_timeout(generation),
                ControlEvent::Cancel => self.cancel(),
                ControlEvent::Stop => self.stop(),
                ControlEvent::Shutdown => {
                    self.stop();
                    break;
                }
            }
        }
        self.stop();
        log::info!("[CAPTURE] Coordinator stopped");
    }

    // ── Operations ──────────────────────────────────────────────────

    fn request_permission(&mut self) {
        let ticket = self.bump_generation();
        let session = self.session.get_or_insert_with(CaptureSession::new);
        if session.has_grant() {
            log::debug!("[CAPTURE] Permission already held");
            return;
        }
        if session.state == SessionState::AwaitingPermission {
            log::debug!("[CAPTURE] Permission prompt already open");
            return;
        }

        session.state = SessionState::AwaitingPermission;
        session.permission_ticket = ticket;
        self.publish_state();

        let Some(tx) = self.tx.upgrade() else { return };
        log::info!("[CAPTURE] Requesting mirroring permission");
        self.broker.request(PermissionReply::new(tx, ticket));
        self.emit(CaptureEvent::PermissionRequested);
    }

    fn on_permission_result(&mut self, ticket: u64, granted: bool, token: Option<PermissionToken>) {
        let Some(session) = self.session.as_mut() else {
            log::debug!("[CAPTURE] Permission result with no session, ignoring");
            return;
        };
        if session.state != SessionState::AwaitingPermission || session.permission_ticket != ticket {
            log::debug!("[CAPTURE] Stale permission result, ignoring");
            return;
        }
        session.permission_ticket = 0;

        match (granted, token) {
            (true, Some(token)) => {
                log::info!("[CAPTURE] Permission granted");
                session.grant = Some(token);
                session.state = SessionState::PermissionGranted;
                let wanted = std::mem::take(&mut session.capture_wanted);
                self.publish_state();
                self.emit(CaptureEvent::PermissionGranted);
                if wanted {
                    self.begin_capture(self.config.post_grant_delay());
                }
            }
            _ => {
                log::warn!("[CAPTURE] Permission denied");
                session.capture_wanted = false;
                session.state = SessionState::Failed;
                self.publish_state();
                self.emit(CaptureEvent::Failed(SnipError::PermissionDenied));
            }
        }
    }

    fn request_capture(&mut self, delay: Option<Duration>) {
        let session = self.session.get_or_insert_with(CaptureSession::new);
        if session.in_flight() {
            log::info!("[CAPTURE] Capture already in flight, dropping request");
            return;
        }
        if !session.has_grant() {
            session.capture_wanted = true;
            self.request_permission();
            return;
        }
        let delay = delay.unwrap_or_else(|| self.config.settle_delay());
        self.begin_capture(delay);
    }

    fn cancel(&mut self) {
        if let Some(session) = self.session.as_mut() {
            if session.state != SessionState::Idle {
                log::info!("[CAPTURE] Cancelled from {:?}", session.state);
            }
            session.reset();
        }
        self.publish_state();
    }

    fn stop(&mut self) {
        if self.session.take().is_some() {
            log::info!("[CAPTURE] Session stopped");
        }
        self.publish_state();
    }

    // ── Capture attempt ─────────────────────────────────────────────

    fn begin_capture(&mut self, delay: Duration) {
        let generation = self.bump_generation();
        let Some(session) = self.session.as_mut() else { return };
        session.generation = generation;
        session.settle_pending = true;
        log::info!(
            "[CAPTURE] Capture #{} scheduled after {}ms settle",
            generation,
            delay.as_millis()
        );
        self.schedule(delay, ControlEvent::SettleElapsed { generation });
    }

    fn on_settle_elapsed(&mut self, generation: u64) {
        let Some(session) = self.session.as_mut() else { return };
        if session.generation != generation || !session.settle_pending {
            return;
        }
        session.settle_pending = false;

        let Some(token) = session.grant.clone() else {
            self.fail_capture(SnipError::CaptureFailure("grant missing".into()));
            return;
        };
        let metrics = match self.host.display_metrics() {
            Ok(m) => m,
            Err(e) => {
                self.fail_capture(SnipError::CaptureFailure(e.to_string()));
                return;
            }
        };
        let target = MirrorTarget::for_display(metrics);
        let Some(tx) = self.tx.upgrade() else { return };
        let sink = HostEventSink::new(tx, generation);

        let start = std::time::Instant::now();
        let mirroring = match self.host.start_mirroring(&token, &target, sink) {
            Ok(m) => m,
            Err(HostError::Revoked(reason)) => {
                log::warn!("[CAPTURE] Grant revoked before mirroring: {}", reason);
                self.session = None;
                self.publish_state();
                self.emit(CaptureEvent::Failed(SnipError::SessionLost(reason)));
                return;
            }
            Err(e) => {
                self.fail_capture(SnipError::CaptureFailure(e.to_string()));
                return;
            }
        };
        log::info!(
            "[CAPTURE] Mirroring {}x{} @ {}dpi started in {}ms",
            target.width,
            target.height,
            target.density_dpi,
            start.elapsed().as_millis()
        );

        let Some(session) = self.session.as_mut() else { return };
        session.mirroring = Some(mirroring);
        session.state = SessionState::MirroringActive;
        self.publish_state();

        let Some(session) = self.session.as_mut() else { return };
        session.reader = Some(FrameReader::new(target));
        session.state = SessionState::FrameRequested;
        self.publish_state();

        self.schedule(self.config.timeout(), ControlEvent::CaptureTimeout { generation });
    }

    fn on_frame_ready(&mut self, generation: u64, frame: FrameBuffer) {
        let Some(session) = self.session.as_mut() else { return };
        if session.generation != generation {
            log::debug!("[FRAME] Discarding frame from stale attempt #{}", generation);
            return;
        }
        let Some(reader) = session.reader.as_mut() else {
            log::debug!("[FRAME] Discarding frame, no reader armed");
            return;
        };

        match reader.accept(frame) {
            Ok(Some(frame)) => {
                // One frame per request: stop mirroring before encoding.
                session.release_capture();
                let scratch = self.scratch.clone();
                let Some(tx) = self.tx.upgrade() else { return };
                tokio::task::spawn_blocking(move || {
                    let result =
                        acquisition::store_frame(frame, &scratch).map_err(|e| e.to_string());
                    let _ = tx.send(ControlEvent::FrameStored { generation, result });
                });
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!("[FRAME] Rejected frame: {}", e);
                self.fail_capture(SnipError::CaptureFailure(e.to_string()));
            }
        }
    }

    fn on_frame_stored(&mut self, generation: u64, result: Result<ScratchImage, String>) {
        let current = self
            .session
            .as_ref()
            .map(|s| s.generation == generation && s.state == SessionState::FrameRequested)
            .unwrap_or(false);
        if !current {
            if let Ok(stale) = result {
                log::debug!("[FRAME] Attempt #{} was cancelled, dropping capture", generation);
                self.scratch.remove(&stale);
            }
            return;
        }

        match result {
            Ok(image) => {
                if let Some(session) = self.session.as_mut() {
                    session.generation = 0;
                    session.state = SessionState::Completed;
                }
                self.publish_state();
                log::info!("[CAPTURE] Capture #{} completed", generation);
                self.emit(CaptureEvent::FrameCaptured(image));
            }
            Err(e) => self.fail_capture(SnipError::CaptureFailure(e)),
        }
    }

    fn on_host_terminated(&mut self, generation: u64, reason: String) {
        let live = self
            .session
            .as_ref()
            .map(|s| s.generation == generation && s.mirroring.is_some())
            .unwrap_or(false);
        if !live {
            log::debug!("[CAPTURE] Termination of released session #{}, ignoring", generation);
            return;
        }
        log::warn!("[CAPTURE] Host revoked mirroring: {}", reason);
        // Revocation invalidates the grant too; drop the whole session.
        self.session = None;
        self.publish_state();
        self.emit(CaptureEvent::Failed(SnipError::SessionLost(reason)));
    }

    fn on_capture_timeout(&mut self, generation: u64) {
        let waiting = self
            .session
            .as_ref()
            .map(|s| s.generation == generation && s.reader.is_some())
            .unwrap_or(false);
        if !waiting {
            return;
        }
        let ms = self.config.timeout_ms;
        log::warn!("[CAPTURE] No frame within {}ms, resetting", ms);
        self.fail_capture(SnipError::CaptureTimeout(ms));
    }

    // ── Helpers ─────────────────────────────────────────────────────

    /// End the current attempt, keep the grant, report `error`.
    fn fail_capture(&mut self, error: SnipError) {
        if let Some(session) = self.session.as_mut() {
            session.reset();
        }
        self.publish_state();
        self.emit(CaptureEvent::Failed(error));
    }

    fn schedule(&self, after: Duration, event: ControlEvent) {
        let Some(tx) = self.tx.upgrade() else { return };
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(event);
        });
    }

    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn current_state(&self) -> SessionState {
        self.session
            .as_ref()
            .map(CaptureSession::state)
            .unwrap_or(SessionState::Idle)
    }

    fn publish_state(&self) {
        let state = self.current_state();
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            log::debug!("[CAPTURE] {:?} -> {:?}", current, state);
            *current = state;
            true
        });
    }

    fn emit(&self, event: CaptureEvent) {
        let _ = self.events.send(event);
    }
}
