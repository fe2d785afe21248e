//! Message persistence
//!
//! The live core only relays what has already been written here.

pub mod json_store;

pub use json_store::JsonMessageStore;

use crate::error::Result;
use async_trait::async_trait;
use quickchat_common::{ConversationSummary, Message, SendMessageInput};

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a new message from `sender` to `receiver`.
    async fn insert(&self, sender: &str, receiver: &str, input: SendMessageInput)
        -> Result<Message>;

    /// Full history between `viewer` and `peer`, oldest first. Messages from
    /// `peer` to `viewer` are marked seen as a side effect.
    async fn history(&self, viewer: &str, peer: &str) -> Result<Vec<Message>>;

    async fn mark_seen(&self, id: &str) -> Result<()>;

    /// Every peer `viewer` has exchanged messages with, most recent first.
    async fn conversations(&self, viewer: &str) -> Result<Vec<ConversationSummary>>;
}
