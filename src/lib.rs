//! snip-chat: capture the screen once, drag out a region, send the crop to
//! a chat conversation as an image attachment.
//!
//! Domains:
//!   - capture  : session coordinator, one-shot frame acquisition, scratch storage
//!   - overlay  : selection gesture, view transform, coordinate mapper, rendering
//!   - handoff  : crop/encode, attachment blobs, messaging, background worker
//!   - pipeline : wires the three together and tears down after each snip
//!
//! `run()` is the headless desktop driver used by the binary.

pub mod capture;
pub mod config;
pub mod error;
pub mod handoff;
pub mod overlay;
pub mod pipeline;
pub mod signals;

use capture::{spawn_coordinator, AutoGrantBroker, ScratchStore, XcapHost};
use error::SnipError;
use handoff::{BlobStore, HandoffWorker, OutboxMessenger, PreferenceStore};
use overlay::{OverlayHandle, OverlayOutcome};
use pipeline::{PipelineEvent, SnipPipeline};
use signals::{SignalSink, UserSignal};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Inputs of one headless snip.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Drag from `(x0, y0)` to `(x1, y1)` in view coordinates. `None`
    /// selects the middle half of the view.
    pub select: Option<(f64, f64, f64, f64)>,
    pub view: (u32, u32),
    pub conversation: Option<Uuid>,
    pub config: Option<PathBuf>,
}

/// What a headless snip ended with.
#[derive(Debug, Clone)]
pub struct SnipReport {
    /// `None` if the capture failed before the overlay opened.
    pub outcome: Option<OverlayOutcome>,
    pub signals: Vec<UserSignal>,
}

/// Load `.env.local` or `.env` from the working directory, falling back to
/// the crate root. The first file found wins.
pub fn load_env_files() {
    let manifest_dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    let roots = [std::env::current_dir().ok(), Some(manifest_dir.to_path_buf())];

    for root in roots.iter().flatten() {
        for env_file in [".env.local", ".env"] {
            let path = root.join(env_file);
            if path.exists() {
                match dotenvy::from_path(&path) {
                    Ok(_) => eprintln!("[STARTUP] Loaded {}", path.display()),
                    Err(e) => eprintln!("[STARTUP] Failed to load {}: {}", path.display(), e),
                }
                return;
            }
        }
    }
}

/// Capture the primary monitor, replay a drag over the overlay, confirm,
/// and deliver the crop to the outbox.
pub async fn run(options: RunOptions) -> Result<SnipReport, SnipError> {
    load_env_files();
    let _ = env_logger::try_init();

    let cfg = config::load_config(options.config.as_deref());
    let scratch = ScratchStore::new(cfg.storage.scratch_dir());
    log::info!(
        "[PIPELINE] scratch={} blobs={} outbox={}",
        scratch.dir().display(),
        cfg.storage.blob_dir().display(),
        cfg.storage.outbox_path().display()
    );

    let messenger = OutboxMessenger::open(cfg.storage.outbox_path())
        .await
        .map_err(SnipError::from)?;
    let mut worker = HandoffWorker::new(
        Arc::new(messenger),
        BlobStore::new(cfg.storage.blob_dir()),
        PreferenceStore::new(cfg.storage.preferences_path()),
        cfg.handoff.clone(),
    );
    if let Some(id) = options.conversation {
        worker = worker.with_conversation(id);
    }
    let (handoff, worker_task) = worker.spawn();

    let (coordinator, captures, coordinator_task) = spawn_coordinator(
        Arc::new(XcapHost),
        Arc::new(AutoGrantBroker),
        cfg.capture.clone(),
        scratch.clone(),
    );
    let (signals, mut signal_rx) = SignalSink::channel();
    let (mut events, pipeline_task) = SnipPipeline {
        coordinator: coordinator.clone(),
        scratch,
        handoff,
        overlay: cfg.overlay.clone(),
        view: options.view,
        signals,
    }
    .spawn(captures);

    coordinator.request_capture(None);

    let mut outcome = None;
    let mut signals = Vec::new();
    let mut overlay: Option<OverlayHandle> = None;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(PipelineEvent::OverlayOpened(handle)) => {
                    replay_selection(&handle, &options);
                    overlay = Some(handle);
                }
                Some(PipelineEvent::OverlayClosed(closed)) => {
                    outcome = Some(closed);
                    break;
                }
                Some(PipelineEvent::CaptureFailed(error)) => {
                    log::warn!("[PIPELINE] Capture failed: {}", error);
                    break;
                }
                None => break,
            },
            Some(signal) = signal_rx.recv() => {
                signals.push(signal);
                // A rejected confirm leaves the overlay open; nobody is
                // there to drag again.
                if matches!(signal, UserSignal::NoRegionSelected | UserSignal::CropFailed) {
                    if let Some(handle) = &overlay {
                        handle.cancel();
                    }
                }
            }
        }
    }

    coordinator.shutdown();
    let _ = coordinator_task.await;
    let _ = pipeline_task.await;
    let _ = worker_task.await;

    while let Ok(signal) = signal_rx.try_recv() {
        signals.push(signal);
    }
    Ok(SnipReport { outcome, signals })
}

fn replay_selection(overlay: &OverlayHandle, options: &RunOptions) {
    let (vw, vh) = (options.view.0 as f64, options.view.1 as f64);
    let (x0, y0, x1, y1) = options
        .select
        .unwrap_or((vw * 0.25, vh * 0.25, vw * 0.75, vh * 0.75));
    log::info!(
        "[OVERLAY] Replaying drag ({:.0},{:.0}) -> ({:.0},{:.0})",
        x0,
        y0,
        x1,
        y1
    );
    overlay.press(x0, y0);
    overlay.drag((x0 + x1) / 2.0, (y0 + y1) / 2.0);
    overlay.release(x1, y1);
    overlay.confirm();
}
