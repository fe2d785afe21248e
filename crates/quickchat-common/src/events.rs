//! Live channel frames
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.

use crate::models::{Message, UserId};
use serde::{Deserialize, Serialize};

/// Frames sent by a client over the live channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "typing")]
    Typing { to: UserId },
    #[serde(rename = "markSeen")]
    MarkSeen { from: UserId, to: UserId },
}

/// Frames pushed by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Ordered list of connected identities
    #[serde(rename = "online-users")]
    OnlineUsers(Vec<UserId>),
    #[serde(rename = "typing")]
    Typing { from: UserId },
    /// `user_id` viewed the recipient's messages
    #[serde(rename = "seen-update")]
    SeenUpdate {
        #[serde(rename = "userId")]
        user_id: UserId,
    },
    #[serde(rename = "new-message")]
    NewMessage { message: Message },
}

impl ClientEvent {
    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_frame(frame: &str) -> serde_json::Result<Self> {
        serde_json::from_str(frame)
    }
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::OnlineUsers(_) => "online-users",
            ServerEvent::Typing { .. } => "typing",
            ServerEvent::SeenUpdate { .. } => "seen-update",
            ServerEvent::NewMessage { .. } => "new-message",
        }
    }

    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_frame(frame: &str) -> serde_json::Result<Self> {
        serde_json::from_str(frame)
    }
}
