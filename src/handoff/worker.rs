//! Background handoff worker.
//!
//! Jobs arrive over a channel from the overlay; each one is cropped,
//! encoded and persisted on the blocking pool, then delivered through the
//! `Messenger`. The answer goes back on the job's oneshot. Jobs run one at
//! a time. The handoff timeout bounds encoding, persisting and opening the
//! conversation; a send that has started always runs to completion.

use crate::config::HandoffConfig;
use crate::error::SnipError;
use crate::handoff::blob::{BlobStore, ChatAttachmentRef, StoredBlob};
use crate::handoff::messaging::{ConversationId, MessagePart, Messenger, MessagingError};
use crate::handoff::preferences::PreferenceStore;
use crate::handoff::region;
use crate::overlay::CropRect;
use image::RgbaImage;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

/// Jobs that may queue behind the one running.
const QUEUE_DEPTH: usize = 4;

/// Everything needed to turn a confirmed selection into a message.
#[derive(Debug, Clone)]
pub struct HandoffJob {
    pub image: Arc<RgbaImage>,
    pub crop: CropRect,
    /// Version of the view transform the crop was mapped through.
    pub transform_version: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandoffReceipt {
    pub conversation_id: ConversationId,
    pub attachment: ChatAttachmentRef,
    pub transform_version: u64,
}

pub type HandoffResult = Result<HandoffReceipt, SnipError>;

type Request = (HandoffJob, oneshot::Sender<HandoffResult>);

/// Cloneable sender side of the worker.
#[derive(Clone)]
pub struct HandoffClient {
    tx: mpsc::Sender<Request>,
}

impl HandoffClient {
    /// Queue `job`. The receiver resolves once it has been delivered or
    /// has failed.
    pub fn submit(&self, job: HandoffJob) -> Result<oneshot::Receiver<HandoffResult>, SnipError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.try_send((job, reply_tx)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SnipError::HandoffFailure("handoff queue full".into()),
            mpsc::error::TrySendError::Closed(_) => {
                SnipError::HandoffFailure("handoff worker stopped".into())
            }
        })?;
        Ok(reply_rx)
    }
}

pub struct HandoffWorker {
    messenger: Arc<dyn Messenger>,
    blobs: BlobStore,
    preferences: PreferenceStore,
    config: HandoffConfig,
    conversation: Option<ConversationId>,
    /// Cleanup of an encode that outlived its deadline.
    abandoned: Mutex<Option<JoinHandle<()>>>,
}

impl HandoffWorker {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        blobs: BlobStore,
        preferences: PreferenceStore,
        config: HandoffConfig,
    ) -> Self {
        Self {
            messenger,
            blobs,
            preferences,
            config,
            conversation: None,
            abandoned: Mutex::new(None),
        }
    }

    /// Always deliver to `id` instead of the remembered conversation.
    pub fn with_conversation(mut self, id: ConversationId) -> Self {
        self.conversation = Some(id);
        self
    }

    /// Start the worker task. It ends when every client is dropped.
    pub fn spawn(self) -> (HandoffClient, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let task = tokio::spawn(self.run(rx));
        (HandoffClient { tx }, task)
    }

    async fn run(self, mut rx: mpsc::Receiver<Request>) {
        log::info!("[HANDOFF] Worker started");
        while let Some((job, reply)) = rx.recv().await {
            let result = self.process(job).await;
            if reply.send(result).is_err() {
                log::debug!("[HANDOFF] Requester went away before the result");
            }
        }
        log::info!("[HANDOFF] Worker stopped");
    }

    /// Crop, encode, persist and deliver one job.
    ///
    /// A blob this job created is removed again if delivery fails. Once
    /// `send_message` is called it is awaited without a deadline: the
    /// message may already be committed, so its attachment must stay.
    pub async fn process(&self, job: HandoffJob) -> HandoffResult {
        self.await_abandoned().await;

        let start = std::time::Instant::now();
        let deadline = Instant::now() + self.config.timeout();
        let version = job.transform_version;

        let stored = self.encode_and_persist(job, deadline).await?;
        let encode_ms = start.elapsed().as_millis();

        let conversation_id = match tokio::time::timeout_at(deadline, self.open_conversation()).await {
            Ok(Ok(id)) => id,
            Ok(Err(e)) => {
                self.discard(&stored);
                return Err(e.into());
            }
            Err(_) => {
                self.discard(&stored);
                return Err(self.timed_out("opening the conversation"));
            }
        };

        let parts = vec![MessagePart::Image {
            url: stored.attachment.uri.clone(),
        }];
        if let Err(e) = self
            .messenger
            .send_message(conversation_id, parts, self.config.trigger_reply)
            .await
        {
            self.discard(&stored);
            return Err(e.into());
        }
        if Instant::now() > deadline {
            log::warn!(
                "[HANDOFF] Send to {} finished past the {}ms deadline",
                conversation_id,
                self.config.timeout_ms
            );
        }

        log::info!(
            "[LATENCY] handoff={}ms (encode+persist={}ms, deliver={}ms)",
            start.elapsed().as_millis(),
            encode_ms,
            start.elapsed().as_millis() - encode_ms
        );
        Ok(HandoffReceipt {
            conversation_id,
            attachment: stored.attachment,
            transform_version: version,
        })
    }

    /// Let the cleanup of a timed-out encode finish before the next job
    /// can persist a blob under the same name.
    async fn await_abandoned(&self) {
        let pending = self.abandoned.lock().ok().and_then(|mut slot| slot.take());
        if let Some(cleanup) = pending {
            if let Err(e) = cleanup.await {
                log::warn!("[HANDOFF] Cleanup of timed-out encode failed: {}", e);
            }
        }
    }

    async fn encode_and_persist(&self, job: HandoffJob, deadline: Instant) -> Result<StoredBlob, SnipError> {
        let blobs = self.blobs.clone();
        let mut handle = tokio::task::spawn_blocking(move || -> Result<StoredBlob, SnipError> {
            let bytes = region::crop_to_png_bytes(&job.image, &job.crop)?;
            log::info!(
                "[HANDOFF] Encoded {}x{} crop at ({},{}) to {} bytes",
                job.crop.width(),
                job.crop.height(),
                job.crop.left,
                job.crop.top,
                bytes.len()
            );
            Ok(blobs.persist(&bytes, job.crop.width(), job.crop.height())?)
        });

        match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(SnipError::HandoffFailure(format!("encode task failed: {}", join))),
            Err(_) => {
                // The blocking task cannot be interrupted; clean up after it.
                // Its blob was never handed out, and the next job waits for
                // this cleanup before persisting anything.
                let blobs = self.blobs.clone();
                let cleanup = tokio::spawn(async move {
                    if let Ok(Ok(stored)) = handle.await {
                        if stored.fresh {
                            blobs.remove(&stored.attachment);
                        }
                    }
                });
                if let Ok(mut slot) = self.abandoned.lock() {
                    *slot = Some(cleanup);
                }
                Err(self.timed_out("encoding"))
            }
        }
    }

    /// Resolve the target conversation and make sure it exists.
    async fn open_conversation(&self) -> Result<ConversationId, MessagingError> {
        let id = self
            .conversation
            .or_else(|| self.preferences.last_conversation())
            .unwrap_or_else(Uuid::new_v4);

        self.messenger.ensure_conversation(id).await?;
        if let Err(e) = self.preferences.remember_conversation(id) {
            log::warn!("[HANDOFF] Could not remember conversation {}: {}", id, e);
        }
        Ok(id)
    }

    fn discard(&self, stored: &StoredBlob) {
        if stored.fresh {
            self.blobs.remove(&stored.attachment);
        }
    }

    fn timed_out(&self, stage: &str) -> SnipError {
        log::warn!(
            "[HANDOFF] Timed out {} after {}ms",
            stage,
            self.config.timeout_ms
        );
        SnipError::HandoffFailure(format!("timed out {}", stage))
    }
}
