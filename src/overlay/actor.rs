//! The overlay as an actor.
//!
//! One task owns the selection, the view transform and the scaled preview.
//! Pointer input, resizes, confirm and cancel arrive on a channel; every
//! visible change publishes a new composed frame on a `watch`. Confirm maps
//! the selection through a snapshot of the transform and hands the crop to
//! the handoff worker, then waits for its answer without blocking input.

use crate::config::OverlayConfig;
use crate::error::SnipError;
use crate::handoff::{HandoffClient, HandoffJob, HandoffReceipt, HandoffResult};
use crate::overlay::mapper::map_to_buffer;
use crate::overlay::render;
use crate::overlay::selection::{DisplayRect, Point, SelectionRect};
use crate::overlay::transform::ViewTransform;
use crate::signals::{SignalSink, UserSignal};
use image::RgbaImage;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq)]
pub enum OverlayInput {
    Press(Point),
    Move(Point),
    Release(Point),
    PointerCancel,
    Clear,
    Resize { width: u32, height: u32 },
    Confirm,
    Cancel,
}

/// One composed overlay image and what it shows.
#[derive(Debug, Clone)]
pub struct OverlayFrame {
    /// Increases with every published frame.
    pub seq: u64,
    pub transform: ViewTransform,
    pub selection: Option<DisplayRect>,
    pub image: RgbaImage,
}

/// How the overlay closed.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayOutcome {
    Sent(HandoffReceipt),
    Cancelled,
    Failed(SnipError),
}

#[derive(Clone)]
pub struct OverlayHandle {
    tx: mpsc::UnboundedSender<OverlayInput>,
    frames: watch::Receiver<Arc<OverlayFrame>>,
}

impl OverlayHandle {
    pub fn send(&self, input: OverlayInput) {
        if self.tx.send(input).is_err() {
            log::debug!("[OVERLAY] Overlay closed, input dropped");
        }
    }

    pub fn press(&self, x: f64, y: f64) {
        self.send(OverlayInput::Press(Point::new(x, y)));
    }

    pub fn drag(&self, x: f64, y: f64) {
        self.send(OverlayInput::Move(Point::new(x, y)));
    }

    pub fn release(&self, x: f64, y: f64) {
        self.send(OverlayInput::Release(Point::new(x, y)));
    }

    pub fn resize(&self, width: u32, height: u32) {
        self.send(OverlayInput::Resize { width, height });
    }

    pub fn confirm(&self) {
        self.send(OverlayInput::Confirm);
    }

    pub fn cancel(&self) {
        self.send(OverlayInput::Cancel);
    }

    pub fn frames(&self) -> watch::Receiver<Arc<OverlayFrame>> {
        self.frames.clone()
    }

    pub fn latest(&self) -> Arc<OverlayFrame> {
        self.frames.borrow().clone()
    }
}

/// Show `image` in a `view`-sized overlay.
///
/// The returned task resolves once the overlay closes. Dropping every
/// handle counts as cancel.
pub fn open_overlay(
    image: Arc<RgbaImage>,
    view: (u32, u32),
    style: OverlayConfig,
    handoff: HandoffClient,
    signals: SignalSink,
) -> (OverlayHandle, JoinHandle<OverlayOutcome>) {
    let transform = ViewTransform::aspect_fit(image.dimensions(), view, 1);
    let preview = render::scale_preview(&image, &transform);
    let first = OverlayFrame {
        seq: 0,
        transform,
        selection: None,
        image: render::compose(&preview, &transform, view, None, &style),
    };
    let (frames_tx, frames_rx) = watch::channel(Arc::new(first));
    let (tx, rx) = mpsc::unbounded_channel();

    log::info!(
        "[OVERLAY] Opened {}x{} capture in {}x{} view (scale {:.3})",
        image.width(),
        image.height(),
        view.0,
        view.1,
        transform.sx
    );

    let overlay = Overlay {
        image,
        view,
        transform,
        preview,
        selection: SelectionRect::new(),
        style,
        handoff,
        signals,
        frames: frames_tx,
        seq: 0,
        pending: None,
    };
    let task = tokio::spawn(overlay.run(rx));

    (
        OverlayHandle {
            tx,
            frames: frames_rx,
        },
        task,
    )
}

struct Overlay {
    image: Arc<RgbaImage>,
    view: (u32, u32),
    transform: ViewTransform,
    preview: RgbaImage,
    selection: SelectionRect,
    style: OverlayConfig,
    handoff: HandoffClient,
    signals: SignalSink,
    frames: watch::Sender<Arc<OverlayFrame>>,
    seq: u64,
    /// Answer of the submitted handoff job, if one is running.
    pending: Option<oneshot::Receiver<HandoffResult>>,
}

impl Overlay {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<OverlayInput>) -> OverlayOutcome {
        let outcome = loop {
            tokio::select! {
                input = rx.recv() => match input {
                    Some(input) => {
                        if let Some(outcome) = self.handle(input) {
                            break outcome;
                        }
                    }
                    None => match self.pending.take() {
                        Some(pending) => break self.finish(pending.await),
                        None => break OverlayOutcome::Cancelled,
                    },
                },
                result = wait_pending(&mut self.pending) => {
                    self.pending = None;
                    break self.finish(result);
                }
            }
        };
        log::info!("[OVERLAY] Closed: {}", describe(&outcome));
        outcome
    }

    fn handle(&mut self, input: OverlayInput) -> Option<OverlayOutcome> {
        if self.pending.is_some() {
            log::debug!("[OVERLAY] Sending in progress, ignoring {:?}", input);
            return None;
        }
        match input {
            OverlayInput::Press(p) => self.selection.press(p),
            OverlayInput::Move(p) => self.selection.drag(p),
            OverlayInput::Release(p) => self.selection.release(p),
            OverlayInput::PointerCancel => self.selection.cancel_gesture(),
            OverlayInput::Clear => self.selection.clear(),
            OverlayInput::Resize { width, height } => self.relayout((width, height)),
            OverlayInput::Confirm => return self.confirm(),
            OverlayInput::Cancel => return Some(OverlayOutcome::Cancelled),
        }
        self.publish();
        None
    }

    fn confirm(&mut self) -> Option<OverlayOutcome> {
        let Some(rect) = self.selection.selection_rect() else {
            log::info!("[OVERLAY] Confirm without a selection");
            self.signals.emit(UserSignal::NoRegionSelected);
            return None;
        };
        // Snapshot: later resizes cannot change what this crop means.
        let transform = self.transform;
        let Some(crop) = map_to_buffer(&rect, &transform, self.image.dimensions()) else {
            log::warn!(
                "[OVERLAY] Selection {:?} not mappable through {:?}",
                rect,
                transform
            );
            self.signals.emit(UserSignal::CropFailed);
            return None;
        };
        log::info!(
            "[OVERLAY] Confirmed ({:.1},{:.1})-({:.1},{:.1}) -> buffer ({},{})-({},{}) @v{}",
            rect.left,
            rect.top,
            rect.right,
            rect.bottom,
            crop.left,
            crop.top,
            crop.right,
            crop.bottom,
            transform.version
        );

        let job = HandoffJob {
            image: self.image.clone(),
            crop,
            transform_version: transform.version,
        };
        match self.handoff.submit(job) {
            Ok(rx) => {
                self.pending = Some(rx);
                None
            }
            Err(e) => Some(self.fail(e)),
        }
    }

    fn finish(&self, result: Result<HandoffResult, oneshot::error::RecvError>) -> OverlayOutcome {
        match result {
            Ok(Ok(receipt)) => {
                self.signals.emit(UserSignal::Sent);
                OverlayOutcome::Sent(receipt)
            }
            Ok(Err(e)) => self.fail(e),
            Err(_) => self.fail(SnipError::HandoffFailure("handoff worker dropped the job".into())),
        }
    }

    fn fail(&self, error: SnipError) -> OverlayOutcome {
        log::warn!("[OVERLAY] Handoff failed: {}", error);
        if let Some(signal) = error.signal() {
            self.signals.emit(signal);
        }
        OverlayOutcome::Failed(error)
    }

    fn relayout(&mut self, view: (u32, u32)) {
        let start = std::time::Instant::now();
        self.view = view;
        self.transform = ViewTransform::aspect_fit(
            self.image.dimensions(),
            view,
            self.transform.version + 1,
        );
        self.preview = render::scale_preview(&self.image, &self.transform);
        // Display coordinates of the old layout mean nothing in the new one.
        self.selection.clear();
        log::debug!(
            "[OVERLAY] Relayout to {}x{} (v{}) in {}ms",
            view.0,
            view.1,
            self.transform.version,
            start.elapsed().as_millis()
        );
    }

    fn publish(&mut self) {
        self.seq += 1;
        let selection = self.selection.rect();
        let image = render::compose(
            &self.preview,
            &self.transform,
            self.view,
            selection,
            &self.style,
        );
        self.frames.send_replace(Arc::new(OverlayFrame {
            seq: self.seq,
            transform: self.transform,
            selection,
            image,
        }));
    }
}

async fn wait_pending(
    pending: &mut Option<oneshot::Receiver<HandoffResult>>,
) -> Result<HandoffResult, oneshot::error::RecvError> {
    match pending {
        Some(rx) => rx.await,
        None => std::future::pending().await,
    }
}

fn describe(outcome: &OverlayOutcome) -> String {
    match outcome {
        OverlayOutcome::Sent(r) => format!("sent to {}", r.conversation_id),
        OverlayOutcome::Cancelled => "cancelled".to_string(),
        OverlayOutcome::Failed(e) => format!("failed ({})", e),
    }
}
