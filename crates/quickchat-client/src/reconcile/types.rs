use quickchat_common::{Message, MessageId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConversationStatus {
    #[default]
    Closed,
    Open,
}

impl ConversationStatus {
    pub fn is_open(self) -> bool {
        self == ConversationStatus::Open
    }
}

/// One displayed row of a conversation
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub message: Message,
    /// Set once translation succeeded; the original stays in `message.text`
    pub translated: Option<String>,
    /// Optimistic local copy of a send that has not been confirmed yet
    pub pending: bool,
}

impl HistoryEntry {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            translated: None,
            pending: false,
        }
    }

    /// Text to show: the translation if there is one, else the original.
    pub fn display_text(&self) -> Option<&str> {
        self.translated
            .as_deref()
            .or(self.message.text.as_deref())
    }
}

/// Per-viewer state that survives restarts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerCacheState {
    /// Messages received while the conversation was closed
    #[serde(default)]
    pub unseen: HashMap<UserId, u32>,
    /// Latest message touching each peer, either direction
    #[serde(default)]
    pub last_messages: HashMap<UserId, Message>,
    /// Oldest message received while closed, since last opened
    #[serde(default)]
    pub first_unread: HashMap<UserId, MessageId>,
    /// Peers opened at least once
    #[serde(default)]
    pub read_peers: BTreeSet<UserId>,
}

/// Handle for an in-flight send
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SendToken(pub(crate) MessageId);

impl SendToken {
    /// Id of the optimistic local entry.
    pub fn local_id(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranslationJob {
    pub peer: UserId,
    pub message_id: MessageId,
    pub text: String,
    pub source: String,
    pub target: String,
}

/// Work the driver performs on behalf of the store
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Pull the full history; `generation` identifies the open it belongs to
    FetchHistory { peer: UserId, generation: u64 },
    /// Tell `peer` that `viewer` looked at the conversation
    NotifySeen { viewer: UserId, peer: UserId },
    /// Record in the message store that the viewer saw a pushed message
    MarkMessageSeen { peer: UserId, message_id: MessageId },
    Translate(TranslationJob),
    /// Durable peer cache changed
    PersistCache,
}
