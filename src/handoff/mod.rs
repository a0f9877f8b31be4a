//! Crop & handoff: turn a confirmed selection into a chat message.
//!
//! `region` is the pure crop/encode core, `blob` and `preferences` are
//! storage, `messaging` is the seam to the chat side, and `worker` runs the
//! whole sequence off the overlay's task.

mod blob;
mod messaging;
mod preferences;
mod region;
mod worker;

pub use blob::{BlobStore, ChatAttachmentRef, PersistError, StoredBlob, PNG_MIME};
pub use messaging::{
    read_records, ConversationId, MessagePart, Messenger, MessagingError, OutboxMessenger,
    OutboxRecord,
};
pub use preferences::{PreferenceStore, Preferences};
pub use region::{crop_to_png_bytes, CropError};
pub use worker::{HandoffClient, HandoffJob, HandoffReceipt, HandoffResult, HandoffWorker};
