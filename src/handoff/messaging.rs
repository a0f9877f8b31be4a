//! Messaging collaborator seam plus a file-backed implementation.
//!
//! The conversation store, the assistant and the chat UI all live behind
//! `Messenger`. This crate only ever asks for a conversation to exist and
//! posts one message into it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

pub type ConversationId = Uuid;

/// One part of an outgoing user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    Text { text: String },
    Image { url: String },
}

#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("Conversation {0} unavailable: {1}")]
    Conversation(ConversationId, String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Outbox I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Outbox record could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[async_trait]
pub trait Messenger: Send + Sync {
    /// Make sure `id` names an existing conversation, creating it if not.
    async fn ensure_conversation(&self, id: ConversationId) -> Result<(), MessagingError>;

    /// Post `parts` as one user message. `trigger_reply` asks the
    /// assistant to answer it.
    async fn send_message(
        &self,
        id: ConversationId,
        parts: Vec<MessagePart>,
        trigger_reply: bool,
    ) -> Result<(), MessagingError>;
}

/// One line of the outbox file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutboxRecord {
    ConversationCreated {
        conversation_id: ConversationId,
    },
    Message {
        conversation_id: ConversationId,
        parts: Vec<MessagePart>,
        trigger_reply: bool,
        sent_at_ms: u64,
    },
}

/// Appends every conversation and message as JSON lines to a file for
/// whatever chat front end tails it.
pub struct OutboxMessenger {
    path: PathBuf,
    known: Mutex<HashSet<ConversationId>>,
}

impl OutboxMessenger {
    /// Open an outbox, learning the conversations it already holds.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, MessagingError> {
        let path = path.into();
        let known = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => read_records(&raw)
                .filter_map(|r| match r {
                    OutboxRecord::ConversationCreated { conversation_id } => Some(conversation_id),
                    OutboxRecord::Message { .. } => None,
                })
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(e.into()),
        };
        log::info!(
            "[HANDOFF] Outbox {} ({} known conversations)",
            path.display(),
            known.len()
        );
        Ok(Self {
            path,
            known: Mutex::new(known),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, record: &OutboxRecord) -> Result<(), MessagingError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Parse outbox lines. Malformed lines are logged and skipped.
pub fn read_records(raw: &str) -> impl Iterator<Item = OutboxRecord> + '_ {
    raw.lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .filter_map(|(n, l)| match serde_json::from_str(l) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("[HANDOFF] Skipping outbox line {}: {}", n + 1, e);
                None
            }
        })
}

#[async_trait]
impl Messenger for OutboxMessenger {
    async fn ensure_conversation(&self, id: ConversationId) -> Result<(), MessagingError> {
        let mut known = self.known.lock().await;
        if known.contains(&id) {
            return Ok(());
        }
        self.append(&OutboxRecord::ConversationCreated { conversation_id: id })
            .await
            .map_err(|e| MessagingError::Conversation(id, e.to_string()))?;
        known.insert(id);
        log::info!("[HANDOFF] Created conversation {}", id);
        Ok(())
    }

    async fn send_message(
        &self,
        id: ConversationId,
        parts: Vec<MessagePart>,
        trigger_reply: bool,
    ) -> Result<(), MessagingError> {
        if !self.known.lock().await.contains(&id) {
            return Err(MessagingError::Conversation(id, "not initialized".into()));
        }
        let sent_at_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let count = parts.len();
        self.append(&OutboxRecord::Message {
            conversation_id: id,
            parts,
            trigger_reply,
            sent_at_ms,
        })
        .await
        .map_err(|e| MessagingError::Send(e.to_string()))?;
        log::info!(
            "[HANDOFF] Sent {} part(s) to {} (reply={})",
            count,
            id,
            trigger_reply
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn outbox_records_conversation_once_then_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("outbox.jsonl");
        let outbox = OutboxMessenger::open(&path).await.unwrap();
        let id = Uuid::new_v4();

        outbox.ensure_conversation(id).await.unwrap();
        outbox.ensure_conversation(id).await.unwrap();
        outbox
            .send_message(id, vec![MessagePart::Image { url: "file:///x.png".into() }], true)
            .await
            .unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let records: Vec<_> = read_records(&raw).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], OutboxRecord::ConversationCreated { conversation_id: id });
        match &records[1] {
            OutboxRecord::Message {
                conversation_id,
                parts,
                trigger_reply,
                ..
            } => {
                assert_eq!(*conversation_id, id);
                assert_eq!(parts, &vec![MessagePart::Image { url: "file:///x.png".into() }]);
                assert!(*trigger_reply);
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[tokio::test]
    async fn reopened_outbox_remembers_conversations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.jsonl");
        let id = Uuid::new_v4();
        OutboxMessenger::open(&path)
            .await
            .unwrap()
            .ensure_conversation(id)
            .await
            .unwrap();

        let reopened = OutboxMessenger::open(&path).await.unwrap();
        reopened.send_message(id, vec![], false).await.unwrap();
    }

    #[tokio::test]
    async fn send_to_unknown_conversation_fails() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = OutboxMessenger::open(dir.path().join("o.jsonl")).await.unwrap();
        let err = outbox.send_message(Uuid::new_v4(), vec![], true).await.unwrap_err();
        assert!(matches!(err, MessagingError::Conversation(..)));
    }

    #[test]
    fn image_part_serializes_with_type_tag() {
        let json = serde_json::to_string(&MessagePart::Image { url: "u".into() }).unwrap();
        assert_eq!(json, r#"{"type":"image","url":"u"}"#);
    }

    #[test]
    fn message_line_with_timestamp_parses_and_garbage_is_skipped() {
        let id = Uuid::new_v4();
        let message = OutboxRecord::Message {
            conversation_id: id,
            parts: vec![MessagePart::Text { text: "hi".into() }],
            trigger_reply: false,
            sent_at_ms: 1_760_000_000_123,
        };
        let raw = format!(
            "{}\nnot json\n\n{}\n",
            serde_json::to_string(&message).unwrap(),
            serde_json::to_string(&OutboxRecord::ConversationCreated { conversation_id: id }).unwrap()
        );

        let records: Vec<_> = read_records(&raw).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], message);
    }
}
