//! Core snip pipeline.
//!
//! Consumes coordinator events and drives each capture to an end:
//! scratch capture → decode → overlay → handoff outcome → teardown.
//! Teardown always closes the overlay, returns the coordinator to Idle
//! (grant kept) and deletes the scratch capture.

use crate::capture::{CaptureEvent, CoordinatorHandle, ScratchImage, ScratchStore};
use crate::config::OverlayConfig;
use crate::error::SnipError;
use crate::handoff::HandoffClient;
use crate::overlay::{open_overlay, OverlayHandle, OverlayOutcome};
use crate::signals::SignalSink;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What the pipeline tells the shell.
#[derive(Clone)]
pub enum PipelineEvent {
    /// A capture is on screen; drive it through the handle.
    OverlayOpened(OverlayHandle),
    OverlayClosed(OverlayOutcome),
    /// A capture attempt ended before an overlay could open.
    CaptureFailed(SnipError),
}

impl std::fmt::Debug for PipelineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineEvent::OverlayOpened(_) => f.write_str("OverlayOpened"),
            PipelineEvent::OverlayClosed(o) => f.debug_tuple("OverlayClosed").field(o).finish(),
            PipelineEvent::CaptureFailed(e) => f.debug_tuple("CaptureFailed").field(e).finish(),
        }
    }
}

pub struct SnipPipeline {
    pub coordinator: CoordinatorHandle,
    pub scratch: ScratchStore,
    pub handoff: HandoffClient,
    pub overlay: OverlayConfig,
    /// Size of the surface the overlay is shown on.
    pub view: (u32, u32),
    pub signals: SignalSink,
}

struct OpenOverlay {
    capture: ScratchImage,
    task: JoinHandle<OverlayOutcome>,
}

impl SnipPipeline {
    /// Run until the coordinator's event stream ends.
    pub fn spawn(
        self,
        captures: mpsc::UnboundedReceiver<CaptureEvent>,
    ) -> (mpsc::UnboundedReceiver<PipelineEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(captures, tx));
        (rx, task)
    }

    async fn run(
        self,
        mut captures: mpsc::UnboundedReceiver<CaptureEvent>,
        out: mpsc::UnboundedSender<PipelineEvent>,
    ) {
        let stale = self.scratch.prune(0);
        if stale > 0 {
            log::info!("[PIPELINE] Pruned {} stale capture(s)", stale);
        }

        let mut open: Option<OpenOverlay> = None;
        loop {
            tokio::select! {
                event = captures.recv() => {
                    let Some(event) = event else { break };
                    if let Some(opened) = self.on_capture_event(event, open.is_some(), &out).await {
                        open = Some(opened);
                    }
                }
                outcome = wait_overlay(&mut open) => {
                    if let Some(closed) = open.take() {
                        self.teardown(&closed.capture, outcome, &out);
                    }
                }
            }
        }

        if let Some(closed) = open.take() {
            closed.task.abort();
            self.scratch.remove(&closed.capture);
        }
        log::info!("[PIPELINE] Stopped");
    }

    async fn on_capture_event(
        &self,
        event: CaptureEvent,
        overlay_open: bool,
        out: &mpsc::UnboundedSender<PipelineEvent>,
    ) -> Option<OpenOverlay> {
        match event {
            CaptureEvent::PermissionRequested => {
                log::info!("[PIPELINE] Waiting for mirroring permission");
                None
            }
            CaptureEvent::PermissionGranted => {
                log::info!("[PIPELINE] Mirroring permission granted");
                None
            }
            CaptureEvent::Failed(error) => {
                self.report(&error);
                let _ = out.send(PipelineEvent::CaptureFailed(error));
                None
            }
            CaptureEvent::FrameCaptured(capture) if overlay_open => {
                log::info!(
                    "[PIPELINE] Overlay already open, dropping capture {}",
                    capture.path.display()
                );
                self.scratch.remove(&capture);
                None
            }
            CaptureEvent::FrameCaptured(capture) => self.open(capture, out).await,
        }
    }

    async fn open(
        &self,
        capture: ScratchImage,
        out: &mpsc::UnboundedSender<PipelineEvent>,
    ) -> Option<OpenOverlay> {
        let start = std::time::Instant::now();
        let path = capture.path.clone();
        let decoded = tokio::task::spawn_blocking(move || ScratchStore::load(&path))
            .await
            .map_err(|e| SnipError::DecodeFailure(e.to_string()))
            .and_then(|r| r.map_err(|e| SnipError::DecodeFailure(e.to_string())));

        let image = match decoded {
            Ok(image) => image,
            Err(error) => {
                self.report(&error);
                self.scratch.remove(&capture);
                self.coordinator.cancel();
                let _ = out.send(PipelineEvent::CaptureFailed(error));
                return None;
            }
        };
        log::info!(
            "[LATENCY] scratch_decode={}ms ({}x{})",
            start.elapsed().as_millis(),
            image.width(),
            image.height()
        );

        let (handle, task) = open_overlay(
            Arc::new(image),
            self.view,
            self.overlay.clone(),
            self.handoff.clone(),
            self.signals.clone(),
        );
        let _ = out.send(PipelineEvent::OverlayOpened(handle));
        Some(OpenOverlay { capture, task })
    }

    fn teardown(
        &self,
        capture: &ScratchImage,
        outcome: OverlayOutcome,
        out: &mpsc::UnboundedSender<PipelineEvent>,
    ) {
        self.scratch.remove(capture);
        self.coordinator.cancel();
        log::info!("[PIPELINE] Snip finished: {}", outcome_label(&outcome));
        let _ = out.send(PipelineEvent::OverlayClosed(outcome));
    }

    fn report(&self, error: &SnipError) {
        match error.signal() {
            Some(signal) => {
                log::warn!("[PIPELINE] {}", error);
                self.signals.emit(signal);
            }
            None => log::info!("[PIPELINE] {} (reset silently)", error),
        }
    }
}

async fn wait_overlay(open: &mut Option<OpenOverlay>) -> OverlayOutcome {
    match open {
        Some(overlay) => match (&mut overlay.task).await {
            Ok(outcome) => outcome,
            Err(e) => OverlayOutcome::Failed(SnipError::HandoffFailure(format!(
                "overlay task ended abnormally: {}",
                e
            ))),
        },
        None => std::future::pending().await,
    }
}

fn outcome_label(outcome: &OverlayOutcome) -> &'static str {
    match outcome {
        OverlayOutcome::Sent(_) => "sent",
        OverlayOutcome::Cancelled => "cancelled",
        OverlayOutcome::Failed(_) => "failed",
    }
}
