//! JSON file message store
//!
//! Keeps every message in memory and rewrites one JSON file per mutation,
//! using a temp file and rename so a crash never leaves a torn file.

use super::MessageStore;
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use anyhow::Context;
use async_trait::async_trait;
use quickchat_common::{ConversationSummary, Message, SendMessageInput};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{error, info};

const STORE_FILE: &str = "messages.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    messages: Vec<Message>,
}

pub struct JsonMessageStore {
    path: PathBuf,
    /// Insertion order, which is also `created_at` order.
    messages: RwLock<Vec<Message>>,
}

impl JsonMessageStore {
    pub async fn new(config: &ServerConfig) -> anyhow::Result<Self> {
        config.ensure_dirs().await?;
        Self::open(config.store_dir()).await
    }

    /// Open (or create) the store inside `dir`.
    pub async fn open(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).await?;
        let path = dir.join(STORE_FILE);

        let messages = if path.exists() {
            let content = fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read {:?}", path))?;
            let file: StoreFile = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse message store {:?}", path))?;
            file.messages
        } else {
            Vec::new()
        };

        info!(
            "JSON MessageStore initialized with {} messages at {:?}",
            messages.len(),
            path
        );

        Ok(Self {
            path,
            messages: RwLock::new(messages),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn save(&self, messages: &[Message]) -> Result<()> {
        let temp_path = self.path.with_extension("tmp");
        let json = serde_json::to_string_pretty(&StoreFile {
            messages: messages.to_vec(),
        })?;

        fs::write(&temp_path, json).await?;
        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl MessageStore for JsonMessageStore {
    async fn insert(
        &self,
        sender: &str,
        receiver: &str,
        input: SendMessageInput,
    ) -> Result<Message> {
        if receiver.trim().is_empty() || receiver == sender {
            return Err(Error::BadRequest("Invalid user IDs".to_string()));
        }
        if input.is_empty() {
            return Err(Error::BadRequest(
                "Message needs text or an image".to_string(),
            ));
        }

        let message = Message::new(sender, receiver, input);
        let mut messages = self.messages.write().await;
        messages.push(message.clone());

        if let Err(e) = self.save(&messages).await {
            messages.pop();
            error!("Failed to persist message from {} to {}: {}", sender, receiver, e);
            return Err(e);
        }

        info!("Stored message {} ({} -> {})", message.id, sender, receiver);
        Ok(message)
    }

    async fn history(&self, viewer: &str, peer: &str) -> Result<Vec<Message>> {
        let mut messages = self.messages.write().await;

        let mut flipped = Vec::new();
        for (index, msg) in messages.iter_mut().enumerate() {
            if msg.sender_id == peer && msg.receiver_id == viewer && !msg.seen {
                msg.seen = true;
                flipped.push(index);
            }
        }
        if !flipped.is_empty() {
            if let Err(e) = self.save(&messages).await {
                for index in flipped {
                    messages[index].seen = false;
                }
                error!("Failed to persist seen flags for {} from {}: {}", viewer, peer, e);
                return Err(e);
            }
        }

        let mut history: Vec<Message> = messages
            .iter()
            .filter(|m| m.between(viewer, peer))
            .cloned()
            .collect();
        history.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(history)
    }

    async fn mark_seen(&self, id: &str) -> Result<()> {
        let mut messages = self.messages.write().await;
        let msg = messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| Error::MessageNotFound(id.to_string()))?;

        if msg.seen {
            return Ok(());
        }
        msg.seen = true;

        if let Err(e) = self.save(&messages).await {
            if let Some(msg) = messages.iter_mut().find(|m| m.id == id) {
                msg.seen = false;
            }
            error!("Failed to persist seen flag for {}: {}", id, e);
            return Err(e);
        }
        Ok(())
    }

    async fn conversations(&self, viewer: &str) -> Result<Vec<ConversationSummary>> {
        let messages = self.messages.read().await;
        let mut by_peer: HashMap<&str, ConversationSummary> = HashMap::new();

        for msg in messages.iter() {
            let Some(peer) = msg.peer_of(viewer) else {
                continue;
            };
            let summary = by_peer
                .entry(peer)
                .or_insert_with(|| ConversationSummary {
                    peer_id: peer.to_string(),
                    last_message: None,
                    unseen: 0,
                });

            let newer = summary
                .last_message
                .as_ref()
                .map(|last| msg.created_at >= last.created_at)
                .unwrap_or(true);
            if newer {
                summary.last_message = Some(msg.clone());
            }
            if msg.sender_id == peer && !msg.seen {
                summary.unseen += 1;
            }
        }

        let mut summaries: Vec<ConversationSummary> = by_peer.into_values().collect();
        summaries.sort_by(|a, b| {
            let at = a.last_message.as_ref().map(|m| m.created_at);
            let bt = b.last_message.as_ref().map(|m| m.created_at);
            bt.cmp(&at).then_with(|| a.peer_id.cmp(&b.peer_id))
        });
        Ok(summaries)
    }
}
