//! Fake collaborators shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use snip_chat_lib::capture::{
    CaptureEvent, DisplayMetrics, FrameBuffer, HostError, HostEventSink, MirrorTarget,
    MirroringHost, MirroringSession, PermissionBroker, PermissionReply, PermissionToken,
    PixelFormat, SessionState,
};
use snip_chat_lib::config::CaptureConfig;
use snip_chat_lib::handoff::{ConversationId, MessagePart, Messenger, MessagingError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

pub const WAIT: Duration = Duration::from_secs(10);

/// Short delays so real-time tests stay fast.
pub fn fast_capture_config() -> CaptureConfig {
    CaptureConfig {
        settle_delay_ms: 5,
        post_grant_delay_ms: 5,
        timeout_ms: 5_000,
    }
}

// ── Permission ─────────────────────────────────────────────────────────────

/// Records every prompt. Either answers at once or holds the reply until
/// the test resolves it.
pub struct FakeBroker {
    auto_grant: bool,
    requests: AtomicUsize,
    held: Mutex<Vec<PermissionReply>>,
}

impl FakeBroker {
    pub fn granting() -> Arc<Self> {
        Arc::new(Self {
            auto_grant: true,
            requests: AtomicUsize::new(0),
            held: Mutex::new(Vec::new()),
        })
    }

    pub fn holding() -> Arc<Self> {
        Arc::new(Self {
            auto_grant: false,
            requests: AtomicUsize::new(0),
            held: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn grant_held(&self) {
        let reply = self.held.lock().unwrap().pop().expect("no prompt open");
        reply.grant(PermissionToken("fake-grant".into()));
    }

    pub fn deny_held(&self) {
        let reply = self.held.lock().unwrap().pop().expect("no prompt open");
        reply.deny();
    }
}

impl PermissionBroker for FakeBroker {
    fn request(&self, reply: PermissionReply) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.auto_grant {
            reply.grant(PermissionToken("fake-grant".into()));
        } else {
            self.held.lock().unwrap().push(reply);
        }
    }
}

// ── Mirroring ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMode {
    /// Deliver one frame as soon as mirroring starts.
    Immediate,
    /// Deliver nothing; the test drives the sink.
    Manual,
}

pub struct FakeHost {
    metrics: DisplayMetrics,
    mode: Mutex<FrameMode>,
    starts: AtomicUsize,
    releases: Arc<AtomicUsize>,
    sinks: Mutex<Vec<(HostEventSink, MirrorTarget)>>,
}

impl FakeHost {
    pub fn new(width: u32, height: u32, mode: FrameMode) -> Arc<Self> {
        Arc::new(Self {
            metrics: DisplayMetrics {
                width,
                height,
                density_dpi: 420,
            },
            mode: Mutex::new(mode),
            starts: AtomicUsize::new(0),
            releases: Arc::new(AtomicUsize::new(0)),
            sinks: Mutex::new(Vec::new()),
        })
    }

    pub fn set_mode(&self, mode: FrameMode) {
        *self.mode.lock().unwrap() = mode;
    }

    /// Mirroring sessions started so far.
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Sessions started and not yet released.
    pub fn live(&self) -> usize {
        self.starts() - self.releases.load(Ordering::SeqCst)
    }

    /// Push a frame through the most recent session's sink.
    pub fn deliver_frame(&self) -> bool {
        let sinks = self.sinks.lock().unwrap();
        let (sink, target) = sinks.last().expect("mirroring never started");
        sink.frame_ready(test_frame(target.width, target.height))
    }

    /// Terminate the most recent session as if the user revoked it.
    pub fn revoke(&self, reason: &str) {
        let sinks = self.sinks.lock().unwrap();
        let (sink, _) = sinks.last().expect("mirroring never started");
        sink.terminated(reason);
    }
}

impl MirroringHost for FakeHost {
    fn display_metrics(&self) -> Result<DisplayMetrics, HostError> {
        Ok(self.metrics)
    }

    fn start_mirroring(
        &self,
        token: &PermissionToken,
        target: &MirrorTarget,
        sink: HostEventSink,
    ) -> Result<Box<dyn MirroringSession>, HostError> {
        assert_eq!(token.0, "fake-grant");
        self.starts.fetch_add(1, Ordering::SeqCst);
        if *self.mode.lock().unwrap() == FrameMode::Immediate {
            sink.frame_ready(test_frame(target.width, target.height));
        }
        self.sinks.lock().unwrap().push((sink, *target));
        Ok(Box::new(FakeMirror {
            releases: self.releases.clone(),
            released: false,
        }))
    }
}

struct FakeMirror {
    releases: Arc<AtomicUsize>,
    released: bool,
}

impl MirroringSession for FakeMirror {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for FakeMirror {
    fn drop(&mut self) {
        self.release();
    }
}

/// RGBA value the fake display shows at `(x, y)`.
pub fn pixel_at(x: u32, y: u32) -> [u8; 4] {
    [(x % 251) as u8, (y % 241) as u8, ((x + y) % 7) as u8 * 30, 255]
}

/// BGRA frame with 8 bytes of padding per row.
pub fn test_frame(width: u32, height: u32) -> FrameBuffer {
    let row_stride = width as usize * 4 + 8;
    let mut data = vec![0xEE; row_stride * height as usize];
    for y in 0..height {
        for x in 0..width {
            let [r, g, b, a] = pixel_at(x, y);
            let at = y as usize * row_stride + x as usize * 4;
            data[at..at + 4].copy_from_slice(&[b, g, r, a]);
        }
    }
    FrameBuffer {
        width,
        height,
        pixel_stride: 4,
        row_stride,
        format: PixelFormat::Bgra8888,
        data,
    }
}

// ── Messaging ──────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeMessenger {
    pub fail_send: bool,
    pub ensured: Mutex<Vec<ConversationId>>,
    pub sent: Mutex<Vec<(ConversationId, Vec<MessagePart>, bool)>>,
}

impl FakeMessenger {
    pub fn failing() -> Self {
        Self {
            fail_send: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<(ConversationId, Vec<MessagePart>, bool)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn ensure_conversation(&self, id: ConversationId) -> Result<(), MessagingError> {
        self.ensured.lock().unwrap().push(id);
        Ok(())
    }

    async fn send_message(
        &self,
        id: ConversationId,
        parts: Vec<MessagePart>,
        trigger_reply: bool,
    ) -> Result<(), MessagingError> {
        if self.fail_send {
            return Err(MessagingError::Send("network unreachable".into()));
        }
        self.sent.lock().unwrap().push((id, parts, trigger_reply));
        Ok(())
    }
}

// ── Waiting ────────────────────────────────────────────────────────────────

pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<CaptureEvent>) -> CaptureEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a capture event")
        .expect("coordinator gone")
}

/// Skip permission chatter and return the first terminal event.
pub async fn next_outcome(rx: &mut mpsc::UnboundedReceiver<CaptureEvent>) -> CaptureEvent {
    loop {
        match next_event(rx).await {
            CaptureEvent::PermissionRequested | CaptureEvent::PermissionGranted => continue,
            other => return other,
        }
    }
}

pub async fn wait_for_state(state: &mut watch::Receiver<SessionState>, wanted: SessionState) {
    tokio::time::timeout(WAIT, state.wait_for(|s| *s == wanted))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {:?}", wanted))
        .expect("coordinator gone");
}

/// Let spawned tasks run without advancing a paused clock.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
